//! Task / TaskState value objects (§3).
//!
//! A `Task` is the immutable description a caller submits; `TaskState` is
//! the dispatcher's live bookkeeping around it (result slot, peer-notified
//! flag, resource handles). Grounded on `net/connection.rs`'s split between
//! a connection's static identity and its mutable `PeerState`.

use std::sync::Arc;

use crate::protocol::framing::{AlgorithmId, TaskType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartyRole {
    Client,
    Server,
}

/// Where a task reads its input set / writes its output, independent of
/// the wire protocol. The dispatcher never opens these itself — it hands
/// them to the state machine, which drives them via `crate::transport`.
#[derive(Debug, Clone)]
pub enum ResourceDescriptor {
    File(String),
    Mysql { dsn: String, sql: String },
    Hdfs { path: String },
    InMemory,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub task_id: String,
    pub algorithm_id: AlgorithmId,
    pub task_type: TaskType,
    pub role: PartyRole,
    pub peer_id: String,
    pub sync_results_back: bool,
    pub low_bandwidth: bool,
    pub input: ResourceDescriptor,
    pub output: ResourceDescriptor,
    /// Free-form algorithm parameters (bucket counts, prefix length, ...),
    /// kept as an opaque JSON string the state machine parses for itself —
    /// the dispatcher never interprets it (§3).
    pub params_json: String,
}

impl Task {
    pub fn new(
        task_id: impl Into<String>,
        algorithm_id: AlgorithmId,
        task_type: TaskType,
        role: PartyRole,
        peer_id: impl Into<String>,
        input: ResourceDescriptor,
        output: ResourceDescriptor,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            algorithm_id,
            task_type,
            role,
            peer_id: peer_id.into(),
            sync_results_back: false,
            low_bandwidth: false,
            input,
            output,
            params_json: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    IntersectionSize(u64),
    IndicesFound(Vec<u64>),
    RecordFound(Option<Vec<u8>>),
    Acknowledged,
}

/// Mutable dispatcher-side state for one running task. `finished` and
/// `peer_notified_finish` are distinct: a party can be locally done while
/// still owing its peer a finish notification (e.g. the low-bandwidth
/// party in ECDH-PSI that doesn't sync results back).
pub struct TaskState {
    pub task: Arc<Task>,
    pub peer_id: String,
    pub finished: bool,
    pub peer_notified_finish: bool,
    pub result: Option<TaskResult>,
    pub error: Option<String>,
}

impl TaskState {
    pub fn new(task: Arc<Task>) -> Self {
        let peer_id = task.peer_id.clone();
        Self {
            task,
            peer_id,
            finished: false,
            peer_notified_finish: false,
            result: None,
            error: None,
        }
    }

    pub fn mark_finished(&mut self, result: TaskResult) {
        self.finished = true;
        self.result = Some(result);
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.finished = true;
        self.error = Some(reason.into());
    }

    pub fn is_done(&self) -> bool {
        self.finished && (self.peer_notified_finish || !self.task.sync_results_back)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_state_not_done_until_peer_notified_when_syncing_results() {
        let mut task = Task::new(
            "t1",
            AlgorithmId::EcdhPsi,
            TaskType::Psi,
            PartyRole::Server,
            "peer-a",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        );
        task.sync_results_back = true;
        let mut state = TaskState::new(Arc::new(task));
        state.mark_finished(TaskResult::IntersectionSize(3));
        assert!(!state.is_done());
        state.peer_notified_finish = true;
        assert!(state.is_done());
    }

    #[test]
    fn task_state_done_immediately_when_not_syncing_results() {
        let task = Task::new(
            "t2",
            AlgorithmId::OtPir,
            TaskType::Pir,
            PartyRole::Client,
            "peer-b",
            ResourceDescriptor::InMemory,
            ResourceDescriptor::InMemory,
        );
        let mut state = TaskState::new(Arc::new(task));
        state.mark_finished(TaskResult::RecordFound(Some(b"row".to_vec())));
        assert!(state.is_done());
    }
}
