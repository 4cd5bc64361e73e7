//! TestOps services: Jenkins and GitHub gateways, persistence, and the
//! reconciliation engine that ties tasks to Jenkins builds.

pub mod github_service;
pub mod jenkins_gateway;
pub mod ledger;
pub mod log_service;
pub mod pg_store;
pub mod project_service;
pub mod reconciler;
pub mod report_service;
pub mod robot_output;
pub mod store;
pub mod task_codes;
pub mod task_service;
pub mod xml_trigger;

#[cfg(test)]
pub mod memory_store;
