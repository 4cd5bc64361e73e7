//! Report ledger access.

use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use crate::models::report::{NewReport, Report, ReportFilter};
use crate::schema::reports;

pub async fn insert_report(conn: &mut AsyncPgConnection, report: NewReport) -> anyhow::Result<Report> {
    let result = diesel::insert_into(reports::table)
        .values(&report)
        .returning(Report::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

/// Newest row for a build of a task; duplicates may exist.
pub async fn find_for_build(
    conn: &mut AsyncPgConnection,
    code: &str,
    build_number: i64,
) -> anyhow::Result<Option<Report>> {
    let result = reports::table
        .filter(reports::task_code.eq(code))
        .filter(reports::build_number.eq(build_number))
        .order((reports::created_at.desc(), reports::id.desc()))
        .select(Report::as_select())
        .first(conn)
        .await
        .optional()?;
    Ok(result)
}

pub async fn update_report(
    conn: &mut AsyncPgConnection,
    id: i64,
    report: NewReport,
) -> anyhow::Result<Report> {
    let result = diesel::update(reports::table.find(id))
        .set(&report)
        .returning(Report::as_returning())
        .get_result(conn)
        .await?;
    Ok(result)
}

/// All reports for a task code, newest first.
pub async fn list_for_task(conn: &mut AsyncPgConnection, code: &str) -> anyhow::Result<Vec<Report>> {
    let results = reports::table
        .filter(reports::task_code.eq(code))
        .order((reports::created_at.desc(), reports::id.desc()))
        .select(Report::as_select())
        .load(conn)
        .await?;
    Ok(results)
}

pub async fn list_filtered(
    conn: &mut AsyncPgConnection,
    filter: &ReportFilter,
) -> anyhow::Result<Vec<Report>> {
    let mut query = reports::table
        .select(Report::as_select())
        .order((reports::created_at.desc(), reports::id.desc()))
        .limit(filter.limit)
        .into_boxed();
    if let Some(project_id) = filter.project_id {
        query = query.filter(reports::project_id.eq(project_id));
    }
    if let Some(kind) = filter.kind {
        query = query.filter(reports::task_kind.eq(kind.as_str()));
    }
    if let Some(from) = filter.created_from {
        query = query.filter(reports::created_at.ge(from));
    }
    if let Some(before) = filter.created_before {
        query = query.filter(reports::created_at.lt(before));
    }
    let results = query.load(conn).await?;
    Ok(results)
}

pub async fn delete_for_task(conn: &mut AsyncPgConnection, code: &str) -> anyhow::Result<usize> {
    let deleted = diesel::delete(reports::table.filter(reports::task_code.eq(code)))
        .execute(conn)
        .await?;
    Ok(deleted)
}
