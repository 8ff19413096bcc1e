//! UAV Pilot - 视觉模型驱动的无人机任务编排服务
//!
//! 入口：加载配置、初始化日志，启动静态帧服务、（可选）内置仿真器与观众 WebSocket 网关，
//! 然后等待 Ctrl+C / SIGTERM。
//!
//! 运行方式：
//! ```bash
//! cargo run -- --simulate
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::Mutex;

use uav_pilot::config::{load_config, AppConfig};
use uav_pilot::control::{files, sim, HttpActionGateway, VehicleSim};
use uav_pilot::core::{
    EventBusDrain, MissionDrain, OrchestratorSettings, ShutdownCoordinator, ShutdownManager,
    TaskOrchestrator,
};
use uav_pilot::gateway::{ConnectionHub, EventBus};
use uav_pilot::llm::create_agent_from_config;
use uav_pilot::mission::MissionCatalog;
use uav_pilot::observability;

#[derive(Parser)]
#[command(name = "uav-pilot")]
#[command(about = "Vision-model driven drone mission orchestrator", long_about = None)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long)]
    config_file: Option<PathBuf>,

    /// 在 control_port 上运行内置运动学仿真器
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (mut cfg, config_error) = match load_config(cli.config_file.clone()) {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };
    if cli.simulate {
        cfg.sim.enabled = true;
    }

    let _log_guard = observability::init(&cfg.app.log_dir);
    if let Some(e) = config_error {
        tracing::warn!("Config load failed ({}), using defaults", e);
    }

    std::fs::create_dir_all(cfg.app.images_dir()).context("Failed to create images dir")?;
    std::fs::create_dir_all(cfg.app.segmentation_dir()).context("Failed to create segmentation dir")?;

    let shutdown = Arc::new(ShutdownManager::new());
    shutdown.install_signal_handlers();
    let host = cfg.server.host.clone();

    // 静态帧服务
    let file_listener = TcpListener::bind((host.as_str(), cfg.server.file_port))
        .await
        .context("Failed to bind file server")?;
    tokio::spawn(files::serve(
        file_listener,
        files::router(cfg.app.images_dir()),
        shutdown.token(),
    ));

    if cfg.sim.enabled {
        let sim_listener = TcpListener::bind((host.as_str(), cfg.server.control_port))
            .await
            .context("Failed to bind simulator control endpoint")?;
        let vehicle = Arc::new(Mutex::new(VehicleSim::new(&cfg)));
        tracing::info!("Built-in simulator enabled");
        tokio::spawn(files::serve(sim_listener, sim::router(vehicle), shutdown.token()));
    }

    let gateway = HttpActionGateway::new(&cfg.server.control_base_url(), cfg.task.gateway_timeout_secs)
        .context("Failed to create control client")?;
    let agent = create_agent_from_config(&cfg.agent);
    tracing::info!(provider = %cfg.agent.provider, model = agent.model_name(), "Decision agent ready");

    let catalog = MissionCatalog::builtin(cfg.task.ship_visible_threshold);
    tracing::info!("Missions: {}", catalog.keys().join(", "));

    let bus = EventBus::new(Duration::from_millis(cfg.task.send_timeout_ms));
    let orchestrator = Arc::new(
        TaskOrchestrator::new(
            catalog,
            Arc::new(gateway),
            agent,
            bus.clone(),
            OrchestratorSettings::from_config(&cfg),
        )
        .with_shutdown(shutdown.token()),
    );

    let ws_listener = TcpListener::bind((host.as_str(), cfg.server.ws_port))
        .await
        .context("Failed to bind viewer gateway")?;
    let hub = Arc::new(ConnectionHub::new(Arc::clone(&orchestrator), bus.clone()));
    tokio::spawn(hub.serve(ws_listener, shutdown.token()));

    tracing::info!("Press Ctrl+C to stop");
    shutdown.wait_for_shutdown().await;

    // 先等当前任务跑完这一步并发出中止事件，再清空事件队列
    let mut coordinator = ShutdownCoordinator::new().with_timeout(cfg.agent.timeout_secs + 5);
    coordinator.register(MissionDrain::new(Arc::clone(&orchestrator)));
    coordinator.register(EventBusDrain::new(bus));
    coordinator.run_cleanup().await;

    Ok(())
}
