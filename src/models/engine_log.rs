#![allow(dead_code)]
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Log line appended by the engine after every committed heartbeat.
/// External verifiers count these rows to decide when the queue has drained.
pub const HEARTBEAT_FINISHED: &str = "Heartbeat finished";

/// Database-side activity log of a matching engine process.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct EngineLog {
    pub log_id: i64,
    pub hostname: String,
    pub pid: i32,
    pub log_dttm: DateTime<Utc>,
    pub log_msg: Option<String>,
    pub ext_ref: Option<String>,
    pub ext_ref_id: Option<i64>,
}
