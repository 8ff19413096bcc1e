//! 端到端：内置仿真器 + HTTP 动作网关 + 脚本化模型 + 事件总线 + 观众 WebSocket

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_util::sync::CancellationToken;

use uav_pilot::config::AppConfig;
use uav_pilot::control::{files, sim, HttpActionGateway, VehicleSim};
use uav_pilot::core::orchestrator::MSG_TASK_DONE;
use uav_pilot::core::{MissionOutcome, MissionPhase, OrchestratorSettings, TaskOrchestrator};
use uav_pilot::gateway::{ConnectionHub, Event, EventBody, EventBus, Role};
use uav_pilot::llm::ScriptedAgent;
use uav_pilot::mission::MissionCatalog;

const FLY_TO_CARRIER: &str = r#"```json
{"action_name": "fly_to", "params": {"x": 600, "y": 2350}, "analysis": "carrier ahead", "current_goal": "reach the carrier"}
```"#;
const LAND: &str = r#"{"action_name": "land", "params": {}, "analysis": "above the deck", "current_goal": "land"}"#;

struct World {
    orchestrator: Arc<TaskOrchestrator>,
    bus: EventBus,
    cfg: AppConfig,
    shutdown: CancellationToken,
    _cache: tempfile::TempDir,
}

async fn world(agent: Arc<ScriptedAgent>) -> World {
    let cache = tempfile::tempdir().unwrap();
    let mut cfg = AppConfig::default();
    cfg.app.cache_dir = cache.path().to_path_buf();
    cfg.task.step_delay_secs = 0.0;
    cfg.task.max_steps = 5;

    let shutdown = CancellationToken::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let control_url = format!("http://{}", listener.local_addr().unwrap());
    let vehicle = Arc::new(Mutex::new(VehicleSim::new(&cfg)));
    tokio::spawn(files::serve(listener, sim::router(vehicle), shutdown.clone()));

    let gateway = HttpActionGateway::new(&control_url, 10).unwrap();
    let bus = EventBus::new(Duration::from_millis(cfg.task.send_timeout_ms));
    let orchestrator = Arc::new(
        TaskOrchestrator::new(
            MissionCatalog::builtin(cfg.task.ship_visible_threshold),
            Arc::new(gateway),
            agent,
            bus.clone(),
            OrchestratorSettings::from_config(&cfg),
        )
        .with_shutdown(shutdown.clone()),
    );
    World {
        orchestrator,
        bus,
        cfg,
        shutdown,
        _cache: cache,
    }
}

#[tokio::test]
async fn test_landing_mission_against_simulator() {
    let agent = Arc::new(ScriptedAgent::new([FLY_TO_CARRIER, LAND]));
    let w = world(agent.clone()).await;

    let outcome = w.orchestrator.start_mission("drone_landing").await.unwrap().await.unwrap();
    assert_eq!(outcome, MissionOutcome::Completed);

    let snapshot = w.orchestrator.snapshot();
    assert_eq!(snapshot.phase, MissionPhase::Completed);
    assert_eq!(snapshot.step_count, 2);
    assert_eq!(snapshot.mission.as_deref(), Some("LandOnShip"));

    let prompts = agent.prompts();
    assert!(prompts[0].contains("(500, 2100, -50)"));
    assert!(prompts[1].contains("(600, 2350, -50)"));
    assert!(prompts[1].contains("reach the carrier"));

    // 每一步的帧都真实写到了缓存目录
    for image in agent.images() {
        let image = image.unwrap();
        assert!(image.starts_with(w.cfg.app.images_dir()));
        assert!(Path::new(&image).exists());
    }
    w.shutdown.cancel();
}

#[tokio::test]
async fn test_landing_off_deck_is_retried_with_force_prompt() {
    // 原地直接降落：不在航母上方，判定失败后带强制提示重试
    let agent = Arc::new(ScriptedAgent::new([LAND, FLY_TO_CARRIER, LAND]));
    let w = world(agent.clone()).await;

    let outcome = w.orchestrator.start_mission("drone_landing").await.unwrap().await.unwrap();
    assert_eq!(outcome, MissionOutcome::Completed);
    let prompts = agent.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(prompts[1].contains("NOT directly above the aircraft carrier"));
    assert!(!prompts[2].contains("NOT directly above the aircraft carrier"));
    w.shutdown.cancel();
}

async fn next_event(
    ws: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Event {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(10), ws.next())
            .await
            .expect("event within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let WsMessage::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

fn response_text(event: &Event) -> &str {
    match &event.body {
        EventBody::Response(text) => text,
        EventBody::Image(name) => name,
    }
}

#[tokio::test]
async fn test_viewer_protocol_over_websocket() {
    let agent = Arc::new(ScriptedAgent::new(["I can see open sea.", FLY_TO_CARRIER, LAND]));
    let w = world(agent.clone()).await;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hub = Arc::new(ConnectionHub::new(Arc::clone(&w.orchestrator), w.bus.clone()));
    tokio::spawn(hub.serve(listener, w.shutdown.clone()));

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}", addr)).await.unwrap();

    // 协议错误只回给本连接
    ws.send(WsMessage::Text(r#"{"type":"ping","content":""}"#.to_string())).await.unwrap();
    let err = next_event(&mut ws).await;
    assert_eq!(err.role, Role::System);
    assert!(response_text(&err).contains("ping"));

    // 未知任务：配置错误，任务不会启动
    ws.send(WsMessage::Text(r#"{"type":"task","content":"rescue_cat"}"#.to_string())).await.unwrap();
    let rejected = next_event(&mut ws).await;
    assert!(response_text(&rejected).contains("rescue_cat"));
    assert!(!w.orchestrator.is_running());

    // 一次性提问：先回帧，再回答案
    ws.send(WsMessage::Text(r#"{"type":"message","content":"what do you see?"}"#.to_string())).await.unwrap();
    let frame = next_event(&mut ws).await;
    assert_eq!(frame.role, Role::System);
    assert!(matches!(frame.body, EventBody::Image(ref name) if name.ends_with(".png")));
    let answer = next_event(&mut ws).await;
    assert_eq!(answer, Event::model("I can see open sea."));
    assert_eq!(agent.prompts(), vec!["what do you see?"]);

    // 启动任务：图像、决策交替到达，以 task_done 结束
    ws.send(WsMessage::Text(r#"{"type":"task","content":"drone_landing"}"#.to_string())).await.unwrap();
    let mut events = Vec::new();
    loop {
        let event = next_event(&mut ws).await;
        let done = event == Event::system(MSG_TASK_DONE);
        events.push(event);
        if done {
            break;
        }
    }
    assert_eq!(events.len(), 5);
    assert!(matches!(events[0].body, EventBody::Image(_)));
    assert!(response_text(&events[1]).contains("动作命令: fly_to"));
    assert!(matches!(events[2].body, EventBody::Image(_)));
    assert!(response_text(&events[3]).contains("动作命令: land"));

    ws.close(None).await.unwrap();
    w.shutdown.cancel();
}
