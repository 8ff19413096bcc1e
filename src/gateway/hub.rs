//! 连接中枢：接受观众 WebSocket 连接，注册到事件总线，转发启动任务/提问请求
//!
//! - `{type:"task"}` → TaskOrchestrator::start_mission；启动失败只回复给该连接
//! - `{type:"message"}` → 取当前帧直接问模型，绕过步循环，不触碰 TaskState
//! - 其他 type 属于协议错误，只回复给该连接

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;

use crate::core::TaskOrchestrator;
use crate::llm::ask_with_timeout;

use super::bus::{EventBus, EventSink};
use super::message::{Event, Inbound, Role};

/// 一个观众连接的发送端；总线广播与直接回复共用
pub struct WsSink {
    sink: Mutex<SplitSink<WebSocketStream<TcpStream>, WsMessage>>,
}

impl WsSink {
    pub async fn send_event(&self, event: &Event) -> Result<(), String> {
        self.deliver(&event.to_json()).await
    }
}

#[async_trait]
impl EventSink for WsSink {
    async fn deliver(&self, payload: &str) -> Result<(), String> {
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(payload.to_string()))
            .await
            .map_err(|e| e.to_string())
    }
}

/// 连接中枢
pub struct ConnectionHub {
    orchestrator: Arc<TaskOrchestrator>,
    bus: EventBus,
}

impl ConnectionHub {
    pub fn new(orchestrator: Arc<TaskOrchestrator>, bus: EventBus) -> Self {
        Self { orchestrator, bus }
    }

    /// 接受连接直到 token 被取消
    pub async fn serve(self: Arc<Self>, listener: TcpListener, shutdown: CancellationToken) {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!("Viewer gateway listening on ws://{}", addr);
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Viewer gateway stopped accepting connections");
                    break;
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, addr)) => {
                            let hub = Arc::clone(&self);
                            tokio::spawn(async move {
                                if let Err(e) = hub.handle_connection(stream, addr).await {
                                    tracing::error!("Connection error from {}: {}", addr, e);
                                }
                            });
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
            }
        }
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) -> Result<(), String> {
        let ws_stream = tokio_tungstenite::accept_async(stream)
            .await
            .map_err(|e| format!("WebSocket handshake failed: {}", e))?;
        let (ws_tx, mut ws_rx) = ws_stream.split();
        let sink = Arc::new(WsSink {
            sink: Mutex::new(ws_tx),
        });

        let consumer_id = format!("ws_{}_{}", addr, uuid::Uuid::new_v4());
        tracing::info!("New viewer connection from {}", addr);
        self.bus.register(consumer_id.clone(), sink.clone()).await;

        while let Some(msg) = ws_rx.next().await {
            let msg = match msg {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!("WebSocket receive error: {}", e);
                    break;
                }
            };
            match msg {
                WsMessage::Text(text) => self.handle_text(&text, &sink).await,
                WsMessage::Close(_) => break,
                _ => {}
            }
        }

        self.bus.unregister(&consumer_id).await;
        tracing::info!("Viewer connection closed: {}", addr);
        Ok(())
    }

    async fn handle_text(&self, text: &str, sink: &Arc<WsSink>) {
        tracing::info!("Received message: {}", text);
        match Inbound::parse(text) {
            Ok(Inbound::Task(key)) => {
                if let Err(e) = self.orchestrator.start_mission(&key).await {
                    tracing::warn!(mission = %key, "Mission start rejected: {}", e);
                    let _ = sink.send_event(&Event::system(format!("任务启动失败: {}", e))).await;
                }
            }
            Ok(Inbound::Message(question)) => {
                let orchestrator = Arc::clone(&self.orchestrator);
                let sink = Arc::clone(sink);
                tokio::spawn(async move { answer_question(&orchestrator, &question, &sink).await });
            }
            Err(e) => {
                tracing::warn!("Protocol error: {}", e);
                let _ = sink.send_event(&Event::system(e)).await;
            }
        }
    }
}

/// 一次性提问：只回复提问的连接
async fn answer_question(orchestrator: &TaskOrchestrator, question: &str, sink: &WsSink) {
    let gateway = orchestrator.gateway();
    let agent = orchestrator.agent();
    let frame = match gateway.get_image().await {
        Ok(frame) => frame,
        Err(e) => {
            let _ = sink.send_event(&Event::system(format!("遇到错误: {}", e))).await;
            return;
        }
    };
    if sink.send_event(&Event::image(Role::System, &frame)).await.is_err() {
        return;
    }

    let timeout = orchestrator.settings().agent_timeout_secs;
    let reply = match ask_with_timeout(agent.as_ref(), question, Some(&frame), timeout).await {
        Ok(answer) => {
            tracing::info!("Model response: {}", answer);
            Event::model(answer)
        }
        Err(e) => Event::system(format!("遇到错误: {}", e)),
    };
    let _ = sink.send_event(&reply).await;
}
