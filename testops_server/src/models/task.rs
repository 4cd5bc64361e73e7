//! Tasks: executions, plans and CI/CD entries, each backed by a Jenkins job.
//!
//! The three kinds live in separate tables with their own id space. Code
//! outside the store works with the unified [`Task`] view and addresses rows
//! through [`TaskRef`].

use std::fmt;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::{cicd_tasks, executions, plans};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Execution,
    Plan,
    Cicd,
}

impl TaskKind {
    pub const ALL: [TaskKind; 3] = [TaskKind::Execution, TaskKind::Plan, TaskKind::Cicd];

    /// Prefix of the external task code (`TASK-001`, `PLAN-001`, `CICD-001`).
    pub fn prefix(self) -> &'static str {
        match self {
            Self::Execution => "TASK",
            Self::Plan => "PLAN",
            Self::Cicd => "CICD",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Execution => "execution",
            Self::Plan => "plan",
            Self::Cicd => "cicd",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "execution" => Some(Self::Execution),
            "plan" => Some(Self::Plan),
            "cicd" => Some(Self::Cicd),
            _ => None,
        }
    }

    /// Kind owning a code, judged by its prefix. Only used for inbound codes
    /// that arrive without any other type information.
    pub fn from_code(code: &str) -> Option<Self> {
        let (prefix, _) = code.split_once('-')?;
        Self::ALL.into_iter().find(|kind| kind.prefix() == prefix)
    }

    /// Plural name used by the history filters (`executions`, `plans`, `cicd`).
    pub fn collection(self) -> &'static str {
        match self {
            Self::Execution => "executions",
            Self::Plan => "plans",
            Self::Cicd => "cicd",
        }
    }

    pub fn from_collection(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.collection() == value)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Execution => "Execution",
            Self::Plan => "Plan",
            Self::Cicd => "CI/CD task",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Address of one task row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TaskRef {
    pub kind: TaskKind,
    pub id: i32,
}

impl TaskRef {
    pub fn new(kind: TaskKind, id: i32) -> Self {
        Self { kind, id }
    }
}

impl fmt::Display for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.label(), self.id)
    }
}

/// Task lifecycle states written by the reconciliation engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Initialized,
    Configuring,
    Configured,
    Running,
    Active,
    Deactive,
    Success,
    Failed,
    Cancelled,
    Error,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Initialized => "initialized",
            Self::Configuring => "configuring",
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Active => "active",
            Self::Deactive => "deactive",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unified view over the three task tables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub kind: TaskKind,
    pub id: i32,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub project_id: i32,
    pub jenkins_job: Option<String>,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cicd_type: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Task {
    pub fn task_ref(&self) -> TaskRef {
        TaskRef::new(self.kind, self.id)
    }

    /// Configured Jenkins job, ignoring blank values.
    pub fn job(&self) -> Option<&str> {
        self.jenkins_job
            .as_deref()
            .map(str::trim)
            .filter(|job| !job.is_empty())
    }

    pub fn has_status(&self, status: TaskStatus) -> bool {
        self.status == status.as_str()
    }
}

/// Input for creating a task of any kind.
#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub name: String,
    pub description: Option<String>,
    pub project_id: i32,
    pub jenkins_job: Option<String>,
    /// Plans only.
    pub schedule_time: Option<String>,
    /// CI/CD tasks only.
    pub cicd_type: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskChanges {
    pub name: Option<String>,
    pub description: Option<String>,
    pub jenkins_job: Option<String>,
    pub schedule_time: Option<String>,
    pub cicd_type: Option<String>,
}

// ── Table rows ──

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = executions)]
pub struct ExecutionRow {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub project_id: i32,
    pub jenkins_job: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = plans)]
pub struct PlanRow {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub description: Option<String>,
    pub project_id: i32,
    pub jenkins_job: Option<String>,
    pub schedule_time: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = cicd_tasks)]
pub struct CicdRow {
    pub id: i32,
    pub code: String,
    pub name: String,
    pub cicd_type: String,
    pub description: Option<String>,
    pub project_id: i32,
    pub jenkins_job: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl From<ExecutionRow> for Task {
    fn from(row: ExecutionRow) -> Self {
        Self {
            kind: TaskKind::Execution,
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            project_id: row.project_id,
            jenkins_job: row.jenkins_job,
            status: row.status,
            schedule_time: None,
            cicd_type: None,
            created_at: row.created_at,
        }
    }
}

impl From<PlanRow> for Task {
    fn from(row: PlanRow) -> Self {
        Self {
            kind: TaskKind::Plan,
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            project_id: row.project_id,
            jenkins_job: row.jenkins_job,
            status: row.status,
            schedule_time: Some(row.schedule_time),
            cicd_type: None,
            created_at: row.created_at,
        }
    }
}

impl From<CicdRow> for Task {
    fn from(row: CicdRow) -> Self {
        Self {
            kind: TaskKind::Cicd,
            id: row.id,
            code: row.code,
            name: row.name,
            description: row.description,
            project_id: row.project_id,
            jenkins_job: row.jenkins_job,
            status: row.status,
            schedule_time: None,
            cicd_type: Some(row.cicd_type),
            created_at: row.created_at,
        }
    }
}

impl Task {
    pub fn to_execution_row(&self) -> ExecutionRow {
        ExecutionRow {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            project_id: self.project_id,
            jenkins_job: self.jenkins_job.clone(),
            status: self.status.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_plan_row(&self) -> PlanRow {
        PlanRow {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            project_id: self.project_id,
            jenkins_job: self.jenkins_job.clone(),
            schedule_time: self.schedule_time.clone().unwrap_or_default(),
            status: self.status.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_cicd_row(&self) -> CicdRow {
        CicdRow {
            id: self.id,
            code: self.code.clone(),
            name: self.name.clone(),
            cicd_type: self.cicd_type.clone().unwrap_or_default(),
            description: self.description.clone(),
            project_id: self.project_id,
            jenkins_job: self.jenkins_job.clone(),
            status: self.status.clone(),
            created_at: self.created_at,
        }
    }
}
