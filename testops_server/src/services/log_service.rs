//! Log ledger writes and reads.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::log::{LogEntry, NewLogEntry};
use crate::schema::logs;

pub async fn append(conn: &mut AsyncPgConnection, entry: NewLogEntry) -> anyhow::Result<()> {
    diesel::insert_into(logs::table)
        .values(&entry)
        .execute(conn)
        .await?;
    Ok(())
}

/// Most recent entries first.
pub async fn recent(conn: &mut AsyncPgConnection, limit: i64) -> anyhow::Result<Vec<LogEntry>> {
    let results = logs::table
        .order((logs::created_at.desc(), logs::id.desc()))
        .limit(limit)
        .select(LogEntry::as_select())
        .load(conn)
        .await?;
    Ok(results)
}
