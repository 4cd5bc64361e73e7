//! Diesel table definitions.
//!
//! Tables: projects, executions, plans, cicd_tasks, reports, logs.
//! Task tables carry an explicit `id` chosen by the service (smallest free
//! slot) rather than a sequence value.

diesel::table! {
    projects (id) {
        id -> Int4,
        name -> Varchar,
        description -> Nullable<Text>,
        status -> Varchar,
        repo_link -> Nullable<Varchar>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    executions (id) {
        id -> Int4,
        code -> Varchar,
        name -> Varchar,
        description -> Nullable<Text>,
        project_id -> Int4,
        jenkins_job -> Nullable<Varchar>,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    plans (id) {
        id -> Int4,
        code -> Varchar,
        name -> Varchar,
        description -> Nullable<Text>,
        project_id -> Int4,
        jenkins_job -> Nullable<Varchar>,
        schedule_time -> Varchar,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    cicd_tasks (id) {
        id -> Int4,
        code -> Varchar,
        name -> Varchar,
        cicd_type -> Varchar,
        description -> Nullable<Text>,
        project_id -> Int4,
        jenkins_job -> Nullable<Varchar>,
        status -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    reports (id) {
        id -> Int8,
        task_code -> Varchar,
        task_kind -> Varchar,
        task_row_id -> Int4,
        project_id -> Nullable<Int4>,
        project_name -> Nullable<Varchar>,
        jenkins_job -> Nullable<Varchar>,
        build_number -> Nullable<Int8>,
        status -> Varchar,
        total_tests -> Int4,
        passed_tests -> Int4,
        failed_tests -> Int4,
        skipped_tests -> Int4,
        duration_seconds -> Int8,
        start_time -> Nullable<Timestamptz>,
        end_time -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    logs (id) {
        id -> Int8,
        level -> Varchar,
        message -> Text,
        source -> Varchar,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(executions -> projects (project_id));
diesel::joinable!(plans -> projects (project_id));
diesel::joinable!(cicd_tasks -> projects (project_id));

diesel::allow_tables_to_appear_in_same_query!(
    projects,
    executions,
    plans,
    cicd_tasks,
    reports,
    logs,
);
