//! A project groups tasks and may point at a source repository.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::projects;

#[derive(Debug, Clone, PartialEq, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = projects)]
pub struct Project {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub status: String,
    pub repo_link: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = projects)]
pub struct NewProject {
    pub name: String,
    pub description: Option<String>,
    #[serde(default = "default_status")]
    pub status: String,
    pub repo_link: Option<String>,
}

fn default_status() -> String {
    "active".to_string()
}
