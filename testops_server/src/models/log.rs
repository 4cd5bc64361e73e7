//! Log ledger rows: backend events persisted for operators.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::schema::logs;

#[derive(Debug, Clone, Queryable, Selectable, Serialize)]
#[diesel(table_name = logs)]
pub struct LogEntry {
    pub id: i64,
    pub level: String,
    pub message: String,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = logs)]
pub struct NewLogEntry {
    pub level: String,
    pub message: String,
    pub source: String,
}

impl NewLogEntry {
    pub fn backend(level: &str, message: impl Into<String>) -> Self {
        Self {
            level: level.to_string(),
            message: message.into(),
            source: "backend".to_string(),
        }
    }
}
