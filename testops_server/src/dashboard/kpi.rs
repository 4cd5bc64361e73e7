//! KPI queries for the dashboard.

use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{KindCounts, ProjectCounts, TestcaseCounts, TrendDay};
use crate::models::task::TaskKind;

fn task_table(kind: TaskKind) -> &'static str {
    match kind {
        TaskKind::Execution => "executions",
        TaskKind::Plan => "plans",
        TaskKind::Cicd => "cicd_tasks",
    }
}

pub async fn query_project_counts(conn: &mut AsyncPgConnection) -> anyhow::Result<ProjectCounts> {
    let result = diesel::sql_query(
        "SELECT \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'active') AS active, \
            COUNT(*) FILTER (WHERE status <> 'active') AS inactive \
         FROM projects",
    )
    .get_result(conn)
    .await?;
    Ok(result)
}

/// Status counts for one task table. "Today" is the current UTC date.
pub async fn query_kind_counts(
    conn: &mut AsyncPgConnection,
    kind: TaskKind,
) -> anyhow::Result<KindCounts> {
    let table = task_table(kind);
    let result = diesel::sql_query(format!(
        "SELECT \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'running') AS running, \
            COUNT(*) FILTER (WHERE status = 'success') AS success, \
            COUNT(*) FILTER (WHERE status = 'failed') AS failed, \
            COUNT(*) FILTER (WHERE status = 'cancelled') AS cancelled, \
            COUNT(*) FILTER (WHERE (created_at AT TIME ZONE 'UTC')::date = (NOW() AT TIME ZONE 'UTC')::date) AS today \
         FROM {table}"
    ))
    .get_result(conn)
    .await?;
    Ok(result)
}

pub async fn query_testcase_counts(
    conn: &mut AsyncPgConnection,
) -> anyhow::Result<TestcaseCounts> {
    let result = diesel::sql_query(
        "SELECT \
            COALESCE(SUM(total_tests), 0)::bigint AS total, \
            COALESCE(SUM(passed_tests + failed_tests), 0)::bigint AS active \
         FROM reports",
    )
    .get_result(conn)
    .await?;
    Ok(result)
}

/// Reports per UTC day over the last N days; days without reports are absent.
pub async fn query_trend_days(
    conn: &mut AsyncPgConnection,
    days: i64,
) -> anyhow::Result<Vec<TrendDay>> {
    let results = diesel::sql_query(format!(
        "SELECT \
            (created_at AT TIME ZONE 'UTC')::date AS date, \
            COUNT(*) AS total, \
            COUNT(*) FILTER (WHERE status = 'success') AS success, \
            COUNT(*) FILTER (WHERE status IN ('failed', 'failure')) AS failed, \
            COUNT(*) FILTER (WHERE status IN ('cancelled', 'aborted')) AS cancelled \
         FROM reports \
         WHERE created_at >= NOW() - INTERVAL '{days} days' \
         GROUP BY 1 \
         ORDER BY 1"
    ))
    .load(conn)
    .await?;
    Ok(results)
}
