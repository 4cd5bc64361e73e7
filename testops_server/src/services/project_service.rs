//! Project lookup and registration.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::project::{NewProject, Project};
use crate::schema::projects;

/// List all projects, oldest first.
pub async fn list_projects(conn: &mut AsyncPgConnection) -> anyhow::Result<Vec<Project>> {
    let results = projects::table
        .order(projects::id.asc())
        .select(Project::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn get_project(conn: &mut AsyncPgConnection, id: i32) -> anyhow::Result<Option<Project>> {
    let result = projects::table
        .find(id)
        .select(Project::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}

/// Create a new project.
pub async fn create_project(
    conn: &mut AsyncPgConnection,
    new_project: NewProject,
) -> anyhow::Result<Project> {
    let result = diesel::insert_into(projects::table)
        .values(&new_project)
        .returning(Project::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}
