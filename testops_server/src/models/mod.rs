//! Data models: projects, the three task kinds, reports and the log ledger.

pub mod log;
pub mod project;
pub mod report;
pub mod task;
