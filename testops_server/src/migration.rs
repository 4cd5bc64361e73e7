//! Startup schema migration.

use diesel_async::{AsyncPgConnection, SimpleAsyncConnection};

/// Idempotent DDL for every table in [`crate::schema`].
pub const MIGRATION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS projects (
    id              SERIAL PRIMARY KEY,
    name            VARCHAR(100) NOT NULL,
    description     TEXT,
    status          VARCHAR(20) NOT NULL DEFAULT 'active',
    repo_link       VARCHAR(500),
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS executions (
    id              INTEGER PRIMARY KEY,
    code            VARCHAR(50) NOT NULL,
    name            VARCHAR(200) NOT NULL,
    description     TEXT,
    project_id      INTEGER NOT NULL REFERENCES projects(id),
    jenkins_job     VARCHAR(200),
    status          VARCHAR(20) NOT NULL DEFAULT 'initialized',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_executions_job ON executions (jenkins_job);
CREATE UNIQUE INDEX IF NOT EXISTS idx_executions_code ON executions (code);

CREATE TABLE IF NOT EXISTS plans (
    id              INTEGER PRIMARY KEY,
    code            VARCHAR(50) NOT NULL,
    name            VARCHAR(200) NOT NULL,
    description     TEXT,
    project_id      INTEGER NOT NULL REFERENCES projects(id),
    jenkins_job     VARCHAR(200),
    schedule_time   VARCHAR(100) NOT NULL,
    status          VARCHAR(20) NOT NULL DEFAULT 'initialized',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_plans_job ON plans (jenkins_job);
CREATE UNIQUE INDEX IF NOT EXISTS idx_plans_code ON plans (code);

CREATE TABLE IF NOT EXISTS cicd_tasks (
    id              INTEGER PRIMARY KEY,
    code            VARCHAR(50) NOT NULL,
    name            VARCHAR(200) NOT NULL,
    cicd_type       VARCHAR(50) NOT NULL,
    description     TEXT,
    project_id      INTEGER NOT NULL REFERENCES projects(id),
    jenkins_job     VARCHAR(200),
    status          VARCHAR(20) NOT NULL DEFAULT 'initialized',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_cicd_tasks_job ON cicd_tasks (jenkins_job);
CREATE UNIQUE INDEX IF NOT EXISTS idx_cicd_tasks_code ON cicd_tasks (code);

-- task_code is a lookup key, not a foreign key: reports outlive their task.
CREATE TABLE IF NOT EXISTS reports (
    id               BIGSERIAL PRIMARY KEY,
    task_code        VARCHAR(50) NOT NULL,
    task_kind        VARCHAR(20) NOT NULL,
    task_row_id      INTEGER NOT NULL,
    project_id       INTEGER,
    project_name     VARCHAR(200),
    jenkins_job      VARCHAR(200),
    build_number     BIGINT,
    status           VARCHAR(20) NOT NULL,
    total_tests      INTEGER NOT NULL DEFAULT 0,
    passed_tests     INTEGER NOT NULL DEFAULT 0,
    failed_tests     INTEGER NOT NULL DEFAULT 0,
    skipped_tests    INTEGER NOT NULL DEFAULT 0,
    duration_seconds BIGINT NOT NULL DEFAULT 0,
    start_time       TIMESTAMPTZ,
    end_time         TIMESTAMPTZ,
    created_at       TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_reports_task ON reports (task_code, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_reports_build ON reports (task_code, build_number);
CREATE INDEX IF NOT EXISTS idx_reports_created ON reports (created_at DESC);

CREATE TABLE IF NOT EXISTS logs (
    id              BIGSERIAL PRIMARY KEY,
    level           VARCHAR(20) NOT NULL,
    message         TEXT NOT NULL,
    source          VARCHAR(50) NOT NULL DEFAULT 'backend',
    created_at      TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_logs_created ON logs (created_at DESC);
"#;

/// Create any missing tables and indexes.
pub async fn run_migration(conn: &mut AsyncPgConnection) -> anyhow::Result<()> {
    conn.batch_execute(MIGRATION_SQL).await?;
    Ok(())
}
