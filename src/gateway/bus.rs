//! 事件总线：有序、多消费者的广播通道
//!
//! publish 只入队并立即返回；单个分发任务按 FIFO 取出事件，并发投递给当前注册的每个消费者。
//! 每次投递有超时上限，失败或超时的消费者直接移除（不重试、不反压其他消费者）。
//! 事件在 publish 时打上序号；消费者只会收到注册之后发布的事件。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::sync::{mpsc, oneshot, RwLock};

use super::message::Event;

/// 事件消费者（一个观众连接）
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, payload: &str) -> Result<(), String>;
}

struct Consumer {
    /// 注册时的下一个序号；更早的事件不投递
    start_seq: u64,
    sink: Arc<dyn EventSink>,
}

type Registry = Arc<RwLock<HashMap<String, Consumer>>>;

enum Dispatch {
    Event { seq: u64, payload: String },
    /// 屏障：之前入队的事件全部投递完成后应答
    Flush(oneshot::Sender<()>),
}

/// 事件总线句柄（可克隆）；所有句柄释放后分发任务退出
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::UnboundedSender<Dispatch>,
    next_seq: Arc<AtomicU64>,
    consumers: Registry,
}

impl EventBus {
    /// 创建总线并启动分发任务（需在 tokio 运行时内调用）
    pub fn new(send_timeout: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let consumers: Registry = Arc::new(RwLock::new(HashMap::new()));
        tokio::spawn(dispatch_loop(rx, Arc::clone(&consumers), send_timeout));
        Self {
            tx,
            next_seq: Arc::new(AtomicU64::new(0)),
            consumers,
        }
    }

    /// 入队一个事件，返回其序号；不阻塞
    pub fn publish(&self, event: &Event) -> u64 {
        self.publish_raw(event.to_json())
    }

    pub fn publish_raw(&self, payload: String) -> u64 {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        if self.tx.send(Dispatch::Event { seq, payload }).is_err() {
            tracing::warn!(seq, "Event bus dispatcher is gone, event dropped");
        }
        seq
    }

    /// 注册消费者；同 id 覆盖
    pub async fn register(&self, id: impl Into<String>, sink: Arc<dyn EventSink>) {
        let id = id.into();
        let mut consumers = self.consumers.write().await;
        let start_seq = self.next_seq.load(Ordering::SeqCst);
        tracing::info!(consumer = %id, start_seq, "Consumer registered");
        consumers.insert(id, Consumer { start_seq, sink });
    }

    pub async fn unregister(&self, id: &str) -> bool {
        let removed = self.consumers.write().await.remove(id).is_some();
        if removed {
            tracing::info!(consumer = %id, "Consumer unregistered");
        }
        removed
    }

    pub async fn consumer_count(&self) -> usize {
        self.consumers.read().await.len()
    }

    /// 等待此前发布的事件全部投递完毕
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Dispatch::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn dispatch_loop(mut rx: mpsc::UnboundedReceiver<Dispatch>, consumers: Registry, send_timeout: Duration) {
    while let Some(item) = rx.recv().await {
        match item {
            Dispatch::Event { seq, payload } => deliver_all(&consumers, seq, &payload, send_timeout).await,
            Dispatch::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }
    tracing::debug!("Event bus dispatcher stopped");
}

async fn deliver_all(consumers: &Registry, seq: u64, payload: &str, send_timeout: Duration) {
    // 快照后释放锁，投递期间允许并发注册/注销
    let targets: Vec<(String, Arc<dyn EventSink>)> = consumers
        .read()
        .await
        .iter()
        .filter(|(_, c)| seq >= c.start_seq)
        .map(|(id, c)| (id.clone(), Arc::clone(&c.sink)))
        .collect();
    if targets.is_empty() {
        return;
    }

    let attempts = targets.iter().map(|(id, sink)| async move {
        match tokio::time::timeout(send_timeout, sink.deliver(payload)).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => {
                tracing::warn!(consumer = %id, seq, "Delivery failed: {}", e);
                Some((id.clone(), Arc::clone(sink)))
            }
            Err(_) => {
                tracing::warn!(consumer = %id, seq, "Delivery timed out after {:?}", send_timeout);
                Some((id.clone(), Arc::clone(sink)))
            }
        }
    });
    let failed: Vec<_> = join_all(attempts).await.into_iter().flatten().collect();

    if !failed.is_empty() {
        let mut registry = consumers.write().await;
        for (id, sink) in failed {
            // 同 id 已被重新注册时保留新连接
            if registry.get(&id).is_some_and(|c| Arc::ptr_eq(&c.sink, &sink)) {
                registry.remove(&id);
                tracing::warn!(consumer = %id, "Consumer pruned");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl EventSink for Recorder {
        async fn deliver(&self, payload: &str) -> Result<(), String> {
            self.seen.lock().unwrap().push(payload.to_string());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl EventSink for Broken {
        async fn deliver(&self, _payload: &str) -> Result<(), String> {
            Err("connection reset".to_string())
        }
    }

    struct Stalled;

    #[async_trait]
    impl EventSink for Stalled {
        async fn deliver(&self, _payload: &str) -> Result<(), String> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_all_consumers_see_publish_order() {
        let bus = EventBus::new(Duration::from_millis(200));
        let a = Arc::new(Recorder::default());
        let b = Arc::new(Recorder::default());
        bus.register("a", a.clone()).await;
        bus.register("b", b.clone()).await;

        let sent: Vec<String> = (0..50).map(|i| format!("e{}", i)).collect();
        for s in &sent {
            bus.publish_raw(s.clone());
        }
        bus.flush().await;

        assert_eq!(a.seen(), sent);
        assert_eq!(b.seen(), sent);
    }

    #[tokio::test]
    async fn test_failing_consumer_is_pruned() {
        let bus = EventBus::new(Duration::from_millis(200));
        let ok = Arc::new(Recorder::default());
        bus.register("ok", ok.clone()).await;
        bus.register("broken", Arc::new(Broken)).await;

        bus.publish_raw("one".to_string());
        bus.publish_raw("two".to_string());
        bus.flush().await;

        assert_eq!(ok.seen(), vec!["one", "two"]);
        assert_eq!(bus.consumer_count().await, 1);
    }

    #[tokio::test]
    async fn test_stalled_consumer_bounded_by_timeout() {
        let bus = EventBus::new(Duration::from_millis(100));
        let ok = Arc::new(Recorder::default());
        bus.register("ok", ok.clone()).await;
        bus.register("stalled", Arc::new(Stalled)).await;

        let started = std::time::Instant::now();
        bus.publish_raw("x".to_string());
        bus.publish_raw("y".to_string());
        bus.flush().await;

        assert_eq!(ok.seen(), vec!["x", "y"]);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(bus.consumer_count().await, 1);
    }

    #[tokio::test]
    async fn test_late_consumer_only_sees_later_events() {
        let bus = EventBus::new(Duration::from_millis(200));
        let early = Arc::new(Recorder::default());
        bus.register("early", early.clone()).await;

        bus.publish_raw("before".to_string());
        let late = Arc::new(Recorder::default());
        // 注册时 "before" 可能仍在队列中，序号过滤保证不会收到
        bus.register("late", late.clone()).await;
        bus.publish_raw("after".to_string());
        bus.flush().await;

        assert_eq!(early.seen(), vec!["before", "after"]);
        assert_eq!(late.seen(), vec!["after"]);
    }

    #[tokio::test]
    async fn test_unregister_stops_delivery() {
        let bus = EventBus::new(Duration::from_millis(200));
        let r = Arc::new(Recorder::default());
        bus.register("r", r.clone()).await;
        bus.publish(&Event::system("hello"));
        bus.flush().await;
        assert!(bus.unregister("r").await);
        bus.publish(&Event::system("bye"));
        bus.flush().await;
        assert_eq!(r.seen(), vec![r#"{"role":"system","response":"hello"}"#]);
    }
}
