//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `UAV__*` 覆盖（双下划线表示嵌套，如 `UAV__TASK__MAX_STEPS=30`）。
//! 默认值与仿真服务端的 defaults 保持一致。

use std::path::PathBuf;

use serde::Deserialize;

/// 前视相机
pub const FRONT_VIEW: &str = "forward-looking";
/// 下视相机
pub const BOTTOM_VIEW: &str = "downward-looking";

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub agent: AgentSection,
    pub task: TaskSection,
    pub sim: SimSection,
}

/// [app] 段：缓存目录、日志目录、初始视角
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 帧图像写入 `<cache_dir>/images`，分割掩码写入 `<cache_dir>/segmentation`
    pub cache_dir: PathBuf,
    pub log_dir: PathBuf,
    pub default_view: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("cache"),
            log_dir: PathBuf::from("logs"),
            default_view: FRONT_VIEW.to_string(),
        }
    }
}

impl AppSection {
    pub fn images_dir(&self) -> PathBuf {
        self.cache_dir.join("images")
    }

    pub fn segmentation_dir(&self) -> PathBuf {
        self.cache_dir.join("segmentation")
    }
}

/// [server] 段：三个监听端口
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    /// 观众 WebSocket
    pub ws_port: u16,
    /// 帧图像静态文件服务
    pub file_port: u16,
    /// 飞行器控制端点
    pub control_port: u16,
    /// 控制端点完整地址，未设置时用 http://{host}:{control_port}
    pub control_url: Option<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            ws_port: 38080,
            file_port: 18080,
            control_port: 28080,
            control_url: None,
        }
    }
}

impl ServerSection {
    pub fn control_base_url(&self) -> String {
        self.control_url
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.host, self.control_port))
    }
}

/// [agent] 段：视觉模型后端
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// ollama / openai / mock
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub max_tokens: u32,
    /// 单次模型调用超时（秒）
    pub timeout_secs: u64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5vl:7b".to_string(),
            base_url: None,
            api_key: None,
            max_tokens: 300,
            timeout_secs: 30,
        }
    }
}

/// 任务开始时是否下发初始位姿
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum InitialPosePolicy {
    /// 仅当任务描述提供了初始位姿
    #[default]
    WhenProvided,
    /// 总是下发（未提供的分量由控制端保持当前值）
    Always,
}

/// [task] 段：步数预算、步间延时、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskSection {
    pub max_steps: usize,
    /// 动作执行后的等待时间（秒），模拟真实机动耗时
    pub step_delay_secs: f64,
    /// 单个观众连接的投递超时（毫秒）
    pub send_timeout_ms: u64,
    /// 单次控制请求超时（秒）
    pub gateway_timeout_secs: u64,
    /// 掩码像素占比阈值
    pub ship_visible_threshold: f64,
    pub initial_pose_policy: InitialPosePolicy,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            max_steps: 50,
            step_delay_secs: 3.0,
            send_timeout_ms: 1000,
            gateway_timeout_secs: 120,
            ship_visible_threshold: 0.015,
            initial_pose_policy: InitialPosePolicy::WhenProvided,
        }
    }
}

/// [sim] 段：内置运动学仿真器（替代真实模拟器）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimSection {
    pub enabled: bool,
    /// NED 坐标，z 为负表示高于地面
    pub init_position: [f64; 3],
    pub step_dist: f64,
    pub turn_degrees: f64,
    /// 在分割掩码中被渲染为“船”的区域（x, y 顶点）
    pub target_area: Vec<[f64; 2]>,
}

impl Default for SimSection {
    fn default() -> Self {
        Self {
            enabled: false,
            init_position: [500.0, 2100.0, -50.0],
            step_dist: 20.0,
            turn_degrees: 90.0,
            target_area: crate::mission::geometry::CARRIER_AREA.to_vec(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 UAV__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 UAV__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!("Config file {} not found, ignored", path.display());
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("UAV")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
