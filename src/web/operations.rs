// Server-tracked install/delete operations, pollable over HTTP.
//
// Each operation mirrors one orchestrator run: progress-store updates feed
// the progress field and the log, and the final result flips the status.
// Terminal operations are garbage-collected after a retention window.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::web::model_manager::ModelManager;
use crate::web::progress::{ProgressRecord, ProgressStore};
use crate::{sys_debug, sys_info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Install,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationLog {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub op_id: String,
    #[serde(rename = "type")]
    pub kind: OperationKind,
    pub model_name: String,
    pub progress: u8,
    pub logs: Vec<OperationLog>,
    pub status: OperationStatus,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Operation {
    fn is_terminal(&self) -> bool {
        self.status != OperationStatus::Running
    }

    fn push_log(&mut self, level: &str, message: impl Into<String>) {
        self.logs.push(OperationLog {
            timestamp: Utc::now(),
            message: message.into(),
            level: level.to_string(),
        });
    }
}

pub struct OperationRegistry {
    ops: Mutex<HashMap<String, Operation>>,
    retention: Duration,
}

impl OperationRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            ops: Mutex::new(HashMap::new()),
            retention,
        }
    }

    pub fn create(&self, kind: OperationKind, model_name: &str) -> String {
        let op_id = Uuid::new_v4().to_string();
        let verb = match kind {
            OperationKind::Install => "install",
            OperationKind::Delete => "delete",
        };
        let mut op = Operation {
            op_id: op_id.clone(),
            kind,
            model_name: model_name.to_string(),
            progress: 0,
            logs: Vec::new(),
            status: OperationStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
        };
        op.push_log("info", format!("Starting {verb} of {model_name}"));
        sys_info!("[OPS] {} {} of {}", op_id, verb, model_name);

        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        ops.insert(op_id.clone(), op);
        op_id
    }

    pub fn get(&self, op_id: &str) -> Option<Operation> {
        let ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        ops.get(op_id).cloned()
    }

    /// Fold one progress record into the operation: progress follows the
    /// percentage, and each distinct phase line gets logged once.
    pub fn observe(&self, op_id: &str, record: &ProgressRecord) {
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        let Some(op) = ops.get_mut(op_id) else { return };
        if op.is_terminal() {
            return;
        }
        op.progress = record.percentage;
        let line = format!("{} {}%", record.status, record.percentage);
        if op.logs.last().map(|l| l.message.as_str()) != Some(line.as_str()) {
            op.push_log("info", line);
        }
    }

    pub fn complete(&self, op_id: &str) {
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(op) = ops.get_mut(op_id) {
            op.status = OperationStatus::Completed;
            op.progress = 100;
            op.completed_at = Some(Utc::now());
            op.push_log("info", "Operation completed");
        }
    }

    pub fn fail(&self, op_id: &str, message: &str) {
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(op) = ops.get_mut(op_id) {
            op.status = OperationStatus::Failed;
            op.completed_at = Some(Utc::now());
            op.push_log("error", message);
        }
    }

    /// Drop terminal operations whose completion is older than the
    /// retention window. Returns how many were removed.
    pub fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let retention = chrono::TimeDelta::from_std(self.retention)
            .unwrap_or_else(|_| chrono::TimeDelta::zero());
        let mut ops = self.ops.lock().unwrap_or_else(|e| e.into_inner());
        let before = ops.len();
        ops.retain(|_, op| match (op.is_terminal(), op.completed_at) {
            (true, Some(completed_at)) => now - completed_at < retention,
            _ => true,
        });
        let removed = before - ops.len();
        if removed > 0 {
            sys_debug!("[OPS] Swept {} finished operations", removed);
        }
        removed
    }

    pub fn sweep(&self) -> usize {
        self.sweep_at(Utc::now())
    }
}

/// Start a tracked install: returns the operation id immediately, the pull
/// runs in the background with store updates folded into the record.
pub fn start_install(
    registry: Arc<OperationRegistry>,
    manager: Arc<ModelManager>,
    progress: Arc<ProgressStore>,
    model_name: String,
) -> String {
    let op_id = registry.create(OperationKind::Install, &model_name);
    let task_op = op_id.clone();
    tokio::spawn(async move {
        let (sub_id, mut rx) = progress.subscribe();
        let pull = manager.pull(&model_name);
        tokio::pin!(pull);
        loop {
            tokio::select! {
                result = &mut pull => {
                    match result {
                        Ok(()) => registry.complete(&task_op),
                        Err(e) => registry.fail(&task_op, &e.user_message()),
                    }
                    break;
                }
                snapshot = rx.recv() => {
                    if let Some(snapshot) = snapshot {
                        if let Some(record) = snapshot.get(&model_name) {
                            registry.observe(&task_op, record);
                        }
                    }
                }
            }
        }
        progress.unsubscribe(sub_id);
    });
    op_id
}

/// Start a tracked delete.
pub fn start_delete(
    registry: Arc<OperationRegistry>,
    manager: Arc<ModelManager>,
    model_name: String,
) -> String {
    let op_id = registry.create(OperationKind::Delete, &model_name);
    let task_op = op_id.clone();
    tokio::spawn(async move {
        match manager.remove(&model_name).await {
            Ok(()) => registry.complete(&task_op),
            Err(e) => registry.fail(&task_op, &e.user_message()),
        }
    });
    op_id
}
