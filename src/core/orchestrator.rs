//! 任务编排器：步循环状态机
//!
//! startMission 解析任务描述、按策略设置初始位姿、占用单任务标志，然后在后台任务中驱动步循环：
//! 取帧 → 发布图像 → 构建提示（必要时追加强制提示）→ 模型决策 → 发布格式化决策 →
//! 终止动作走完成判定，否则下发动作并等待执行间隔。
//! 每一步返回 StepOutcome，由 run 驱动状态迁移；单步致命错误转成 system 事件并结束任务。
//! 步循环外另有一层监督任务：步循环 panic 时同样以 FAILED 收尾，单任务标志总会释放。

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::config::{AppConfig, InitialPosePolicy};
use crate::control::{ActionGateway, Pose};
use crate::core::{AgentError, MissionError, MissionOutcome, MissionPhase, StepOutcome, TaskSnapshot, TaskState};
use crate::gateway::{Event, EventBus, Role};
use crate::llm::VisionAgent;
use crate::mission::{Mission, MissionCatalog, StepContext};

pub const MSG_CONTINUE: &str = "任务未完成，继续执行。";
pub const MSG_TASK_DONE: &str = "task_done";
pub const MSG_LIMIT_FAILED: &str = "任务执行超过最大步数，任务失败。";
pub const MSG_LIMIT_COMPLETED: &str = "任务执行超过最大步数，但任务完成。";
pub const MSG_ABORTED: &str = "任务已中止。";

/// 步循环参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub max_steps: usize,
    /// 每个动作执行后的等待（模拟真实执行时间）
    pub step_delay: Duration,
    pub agent_timeout_secs: u64,
    pub initial_pose_policy: InitialPosePolicy,
}

impl OrchestratorSettings {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_steps: cfg.task.max_steps,
            step_delay: Duration::from_secs_f64(cfg.task.step_delay_secs.max(0.0)),
            agent_timeout_secs: cfg.agent.timeout_secs,
            initial_pose_policy: cfg.task.initial_pose_policy,
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl MissionOutcome {
    pub fn phase(&self) -> MissionPhase {
        match self {
            Self::Completed | Self::CompletedAtStepLimit => MissionPhase::Completed,
            Self::StepLimitExceeded | Self::Failed(_) => MissionPhase::Failed,
            Self::Aborted => MissionPhase::Aborted,
        }
    }
}

/// 单任务编排器
pub struct TaskOrchestrator {
    catalog: MissionCatalog,
    gateway: Arc<dyn ActionGateway>,
    agent: Arc<dyn VisionAgent>,
    bus: EventBus,
    settings: OrchestratorSettings,
    /// 单任务标志；true 表示有任务在跑
    running: Arc<watch::Sender<bool>>,
    state_tx: Arc<watch::Sender<TaskSnapshot>>,
    shutdown: CancellationToken,
}

/// 持有期间占用单任务标志，drop（含 panic 展开、任务被取消）时释放
struct RunningGuard(Arc<watch::Sender<bool>>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl TaskOrchestrator {
    pub fn new(
        catalog: MissionCatalog,
        gateway: Arc<dyn ActionGateway>,
        agent: Arc<dyn VisionAgent>,
        bus: EventBus,
        settings: OrchestratorSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(TaskSnapshot::default());
        Self {
            catalog,
            gateway,
            agent,
            bus,
            settings,
            running: Arc::new(watch::channel(false).0),
            state_tx: Arc::new(state_tx),
            shutdown: CancellationToken::new(),
        }
    }

    /// 关闭信号：步与步之间检查，置位后任务以 ABORTED 结束
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn gateway(&self) -> Arc<dyn ActionGateway> {
        Arc::clone(&self.gateway)
    }

    pub fn agent(&self) -> Arc<dyn VisionAgent> {
        Arc::clone(&self.agent)
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// 等到当前任务（如果有）结束并释放单任务标志
    pub async fn wait_idle(&self) {
        let mut rx = self.running.subscribe();
        let _ = rx.wait_for(|busy| !*busy).await;
    }

    /// 订阅状态快照；终态快照保留到下一次任务开始
    pub fn subscribe(&self) -> watch::Receiver<TaskSnapshot> {
        self.state_tx.subscribe()
    }

    pub fn snapshot(&self) -> TaskSnapshot {
        self.state_tx.borrow().clone()
    }

    /// 启动任务：IDLE → RUNNING，步循环在后台任务中运行，返回其句柄
    ///
    /// 未知 key 与已有任务运行时都直接拒绝，不影响当前任务。
    pub async fn start_mission(&self, key: &str) -> Result<JoinHandle<MissionOutcome>, MissionError> {
        let mission = self.catalog.resolve(key)?;

        let claimed = self.running.send_if_modified(|busy| {
            if *busy {
                return false;
            }
            *busy = true;
            true
        });
        if !claimed {
            let current = self.snapshot().mission.unwrap_or_else(|| key.to_string());
            tracing::warn!(requested = key, current = %current, "Mission already running, start rejected");
            return Err(MissionError::AlreadyRunning(current));
        }
        let guard = RunningGuard(Arc::clone(&self.running));

        tracing::info!(mission = mission.name(), "Starting mission: {}", mission.description());
        if let Err(e) = self.apply_initial_pose(mission.as_ref()).await {
            tracing::error!(mission = mission.name(), "Failed to set initial pose: {}", e);
            self.bus.publish(&Event::system(format!("任务执行过程中发生错误: {}", e)));
            return Err(e.into());
        }

        let state = TaskState::begin(mission);
        self.state_tx.send_replace(state.snapshot(MissionPhase::Running));

        let runner = MissionRunner {
            state,
            gateway: Arc::clone(&self.gateway),
            agent: Arc::clone(&self.agent),
            bus: self.bus.clone(),
            settings: self.settings.clone(),
            state_tx: Arc::clone(&self.state_tx),
            shutdown: self.shutdown.clone(),
        };
        let bus = self.bus.clone();
        let state_tx = Arc::clone(&self.state_tx);
        let steps = tokio::spawn(runner.run());
        Ok(tokio::spawn(async move {
            let _guard = guard;
            match steps.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    let reason = join_failure(e);
                    tracing::error!("Mission step loop crashed: {}", reason);
                    bus.publish(&Event::system(format!("任务执行过程中发生错误: {}", reason)));
                    state_tx.send_modify(|snapshot| snapshot.phase = MissionPhase::Failed);
                    MissionOutcome::Failed(reason)
                }
            }
        }))
    }

    async fn apply_initial_pose(&self, mission: &dyn Mission) -> Result<(), crate::core::GatewayError> {
        let pose = match (mission.initial_pose(), self.settings.initial_pose_policy) {
            (Some(pose), _) => pose,
            (None, InitialPosePolicy::Always) => Pose::default(),
            (None, InitialPosePolicy::WhenProvided) => return Ok(()),
        };
        tracing::info!(?pose, "Applying initial pose");
        self.gateway.set_pose(&pose).await
    }
}

fn join_failure(err: JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("step loop panicked: {}", message)
}

/// 单次任务的步循环；独占 TaskState
struct MissionRunner {
    state: TaskState,
    gateway: Arc<dyn ActionGateway>,
    agent: Arc<dyn VisionAgent>,
    bus: EventBus,
    settings: OrchestratorSettings,
    state_tx: Arc<watch::Sender<TaskSnapshot>>,
    shutdown: CancellationToken,
}

impl MissionRunner {
    async fn run(mut self) -> MissionOutcome {
        let outcome = loop {
            if self.shutdown.is_cancelled() {
                self.bus.publish(&Event::system(MSG_ABORTED));
                break MissionOutcome::Aborted;
            }
            match self.step().await {
                StepOutcome::Advanced | StepOutcome::Retry => continue,
                StepOutcome::Finished(outcome) => break outcome,
                StepOutcome::Fatal(reason) => {
                    tracing::error!(step = self.state.step_count, "Mission failed: {}", reason);
                    self.bus
                        .publish(&Event::system(format!("任务执行过程中发生错误: {}", reason)));
                    break MissionOutcome::Failed(reason);
                }
            }
        };

        if outcome.is_success() {
            tracing::info!(steps = self.state.step_count, ?outcome, "Mission finished");
        } else {
            tracing::warn!(steps = self.state.step_count, ?outcome, "Mission ended without success");
        }
        self.state.completed = true;
        self.state_tx.send_replace(self.state.snapshot(outcome.phase()));
        self.state.reset();
        outcome
    }

    fn publish_state(&self) {
        self.state_tx.send_replace(self.state.snapshot(MissionPhase::Running));
    }

    /// 一步：取帧 → 决策 → 判定或执行
    async fn step(&mut self) -> StepOutcome {
        let Some(mission) = self.state.mission.clone() else {
            return StepOutcome::Fatal("no active mission".to_string());
        };

        if self.state.step_count >= self.settings.max_steps {
            return self.finish_at_step_limit(mission.as_ref()).await;
        }
        self.state.step_count += 1;
        self.publish_state();
        let step = self.state.step_count;

        let frame = match self.gateway.get_image().await {
            Ok(path) => path,
            Err(e) => return StepOutcome::Fatal(e.to_string()),
        };
        // 先发图，观众看到的正是模型推理所用的帧
        self.bus.publish(&Event::image(Role::Model, &frame));

        let position = match self.gateway.get_state().await {
            Ok(state) => state,
            Err(e) => return StepOutcome::Fatal(e.to_string()),
        };
        let ctx = StepContext {
            step,
            state: position,
            last_goal: self.state.last_goal.clone(),
        };

        let mut prompt = mission.build_prompt(&ctx);
        if self.state.needs_enforcement {
            prompt.push_str(mission.force_prompt());
            self.state.needs_enforcement = false;
            self.publish_state();
        }
        tracing::info!(step, "Prompt:\n{}", prompt);

        let timeout = Duration::from_secs(self.settings.agent_timeout_secs);
        let decision = match tokio::time::timeout(
            timeout,
            mission.decide(self.agent.as_ref(), &prompt, &frame, &ctx),
        )
        .await
        {
            Ok(Ok(decision)) => decision,
            Ok(Err(e)) => return StepOutcome::Fatal(e.to_string()),
            Err(_) => return StepOutcome::Fatal(AgentError::Timeout(self.settings.agent_timeout_secs).to_string()),
        };

        self.state.last_goal = decision.current_goal.clone();
        let content = mission.format(&decision, &ctx);
        tracing::info!(step, "Decision:\n{}", content);
        self.bus.publish(&Event::model(content));

        if mission.is_terminal(&decision.action_name) {
            return match mission.check_complete(self.gateway.as_ref()).await {
                Ok(true) => {
                    self.bus.publish(&Event::system(MSG_TASK_DONE));
                    StepOutcome::Finished(MissionOutcome::Completed)
                }
                Ok(false) => {
                    self.state.needs_enforcement = true;
                    self.publish_state();
                    self.bus.publish(&Event::system(MSG_CONTINUE));
                    StepOutcome::Retry
                }
                Err(e) => StepOutcome::Fatal(e.to_string()),
            };
        }

        tracing::info!(step, action = %decision.action_name, "Executing action");
        if let Err(e) = self
            .gateway
            .execute(&decision.action_name, Value::Object(decision.params))
            .await
        {
            return StepOutcome::Fatal(e.to_string());
        }
        tokio::time::sleep(self.settings.step_delay).await;
        StepOutcome::Advanced
    }

    /// 步数耗尽：最后判定一次
    async fn finish_at_step_limit(&mut self, mission: &dyn Mission) -> StepOutcome {
        tracing::warn!(steps = self.state.step_count, "Step budget exhausted, running final check");
        match mission.check_complete(self.gateway.as_ref()).await {
            Ok(true) => {
                self.bus.publish(&Event::system(MSG_LIMIT_COMPLETED));
                StepOutcome::Finished(MissionOutcome::CompletedAtStepLimit)
            }
            Ok(false) => {
                self.bus.publish(&Event::system(MSG_LIMIT_FAILED));
                StepOutcome::Finished(MissionOutcome::StepLimitExceeded)
            }
            Err(e) => StepOutcome::Fatal(e.to_string()),
        }
    }
}
