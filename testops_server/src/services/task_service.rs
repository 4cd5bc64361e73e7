//! Task table access. The three kinds share one [`Task`] view; each function
//! dispatches on [`TaskKind`] to the matching table.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::task::{CicdRow, ExecutionRow, PlanRow, Task, TaskKind, TaskRef};
use crate::schema::{cicd_tasks, executions, plans};

/// List tasks of one kind, optionally for a single project.
pub async fn list_tasks(
    conn: &mut AsyncPgConnection,
    kind: TaskKind,
    project_id: Option<i32>,
) -> anyhow::Result<Vec<Task>> {
    let tasks = match kind {
        TaskKind::Execution => {
            let mut query = executions::table
                .select(ExecutionRow::as_select())
                .order(executions::id.asc())
                .into_boxed();
            if let Some(project_id) = project_id {
                query = query.filter(executions::project_id.eq(project_id));
            }
            query.load::<ExecutionRow>(conn).await?.into_iter().map(Task::from).collect()
        }
        TaskKind::Plan => {
            let mut query = plans::table
                .select(PlanRow::as_select())
                .order(plans::id.asc())
                .into_boxed();
            if let Some(project_id) = project_id {
                query = query.filter(plans::project_id.eq(project_id));
            }
            query.load::<PlanRow>(conn).await?.into_iter().map(Task::from).collect()
        }
        TaskKind::Cicd => {
            let mut query = cicd_tasks::table
                .select(CicdRow::as_select())
                .order(cicd_tasks::id.asc())
                .into_boxed();
            if let Some(project_id) = project_id {
                query = query.filter(cicd_tasks::project_id.eq(project_id));
            }
            query.load::<CicdRow>(conn).await?.into_iter().map(Task::from).collect()
        }
    };
    Ok(tasks)
}

pub async fn get_task(conn: &mut AsyncPgConnection, task: TaskRef) -> anyhow::Result<Option<Task>> {
    let result = match task.kind {
        TaskKind::Execution => executions::table
            .find(task.id)
            .select(ExecutionRow::as_select())
            .first::<ExecutionRow>(conn)
            .await
            .optional()?
            .map(Task::from),
        TaskKind::Plan => plans::table
            .find(task.id)
            .select(PlanRow::as_select())
            .first::<PlanRow>(conn)
            .await
            .optional()?
            .map(Task::from),
        TaskKind::Cicd => cicd_tasks::table
            .find(task.id)
            .select(CicdRow::as_select())
            .first::<CicdRow>(conn)
            .await
            .optional()?
            .map(Task::from),
    };
    Ok(result)
}

/// Find a task by its external code (`TASK-001`, ...).
pub async fn find_by_code(
    conn: &mut AsyncPgConnection,
    kind: TaskKind,
    code: &str,
) -> anyhow::Result<Option<Task>> {
    let result = match kind {
        TaskKind::Execution => executions::table
            .filter(executions::code.eq(code))
            .select(ExecutionRow::as_select())
            .first::<ExecutionRow>(conn)
            .await
            .optional()?
            .map(Task::from),
        TaskKind::Plan => plans::table
            .filter(plans::code.eq(code))
            .select(PlanRow::as_select())
            .first::<PlanRow>(conn)
            .await
            .optional()?
            .map(Task::from),
        TaskKind::Cicd => cicd_tasks::table
            .filter(cicd_tasks::code.eq(code))
            .select(CicdRow::as_select())
            .first::<CicdRow>(conn)
            .await
            .optional()?
            .map(Task::from),
    };
    Ok(result)
}

/// All tasks, of any kind, whose Jenkins job is `job`.
pub async fn find_by_job(conn: &mut AsyncPgConnection, job: &str) -> anyhow::Result<Vec<Task>> {
    let mut tasks: Vec<Task> = executions::table
        .filter(executions::jenkins_job.eq(job))
        .select(ExecutionRow::as_select())
        .load::<ExecutionRow>(conn)
        .await?
        .into_iter()
        .map(Task::from)
        .collect();
    tasks.extend(
        plans::table
            .filter(plans::jenkins_job.eq(job))
            .select(PlanRow::as_select())
            .load::<PlanRow>(conn)
            .await?
            .into_iter()
            .map(Task::from),
    );
    tasks.extend(
        cicd_tasks::table
            .filter(cicd_tasks::jenkins_job.eq(job))
            .select(CicdRow::as_select())
            .load::<CicdRow>(conn)
            .await?
            .into_iter()
            .map(Task::from),
    );
    Ok(tasks)
}

pub async fn insert_task(conn: &mut AsyncPgConnection, task: &Task) -> anyhow::Result<()> {
    match task.kind {
        TaskKind::Execution => {
            diesel::insert_into(executions::table)
                .values(&task.to_execution_row())
                .execute(conn)
                .await?
        }
        TaskKind::Plan => {
            diesel::insert_into(plans::table)
                .values(&task.to_plan_row())
                .execute(conn)
                .await?
        }
        TaskKind::Cicd => {
            diesel::insert_into(cicd_tasks::table)
                .values(&task.to_cicd_row())
                .execute(conn)
                .await?
        }
    };
    Ok(())
}

/// Write name, description, job, status and the kind-specific column.
pub async fn update_task(conn: &mut AsyncPgConnection, task: &Task) -> anyhow::Result<()> {
    match task.kind {
        TaskKind::Execution => {
            diesel::update(executions::table.find(task.id))
                .set((
                    executions::name.eq(&task.name),
                    executions::description.eq(&task.description),
                    executions::jenkins_job.eq(&task.jenkins_job),
                    executions::status.eq(&task.status),
                ))
                .execute(conn)
                .await?
        }
        TaskKind::Plan => {
            diesel::update(plans::table.find(task.id))
                .set((
                    plans::name.eq(&task.name),
                    plans::description.eq(&task.description),
                    plans::jenkins_job.eq(&task.jenkins_job),
                    plans::schedule_time.eq(task.schedule_time.clone().unwrap_or_default()),
                    plans::status.eq(&task.status),
                ))
                .execute(conn)
                .await?
        }
        TaskKind::Cicd => {
            diesel::update(cicd_tasks::table.find(task.id))
                .set((
                    cicd_tasks::name.eq(&task.name),
                    cicd_tasks::description.eq(&task.description),
                    cicd_tasks::jenkins_job.eq(&task.jenkins_job),
                    cicd_tasks::cicd_type.eq(task.cicd_type.clone().unwrap_or_default()),
                    cicd_tasks::status.eq(&task.status),
                ))
                .execute(conn)
                .await?
        }
    };
    Ok(())
}

pub async fn set_status(
    conn: &mut AsyncPgConnection,
    task: TaskRef,
    status: &str,
) -> anyhow::Result<()> {
    match task.kind {
        TaskKind::Execution => {
            diesel::update(executions::table.find(task.id))
                .set(executions::status.eq(status))
                .execute(conn)
                .await?
        }
        TaskKind::Plan => {
            diesel::update(plans::table.find(task.id))
                .set(plans::status.eq(status))
                .execute(conn)
                .await?
        }
        TaskKind::Cicd => {
            diesel::update(cicd_tasks::table.find(task.id))
                .set(cicd_tasks::status.eq(status))
                .execute(conn)
                .await?
        }
    };
    Ok(())
}

/// Returns whether a row was deleted.
pub async fn delete_task(conn: &mut AsyncPgConnection, task: TaskRef) -> anyhow::Result<bool> {
    let deleted = match task.kind {
        TaskKind::Execution => {
            diesel::delete(executions::table.find(task.id))
                .execute(conn)
                .await?
        }
        TaskKind::Plan => diesel::delete(plans::table.find(task.id)).execute(conn).await?,
        TaskKind::Cicd => {
            diesel::delete(cicd_tasks::table.find(task.id))
                .execute(conn)
                .await?
        }
    };
    Ok(deleted > 0)
}
