#![allow(dead_code)]

use entity_ingest::config::{PostgresConfig, SourceConfig};
use entity_ingest::store::RetryPolicy;
use std::env;
use std::path::Path;
use std::time::Duration;

/// Get test PostgreSQL configuration from environment variables.
/// Each call gets its own schema so tests do not see each other's rows.
pub fn get_test_postgres_config(schema: &str) -> PostgresConfig {
    PostgresConfig {
        host: env::var("TEST_PG_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: env::var("TEST_PG_PORT")
            .unwrap_or_else(|_| "5432".to_string())
            .parse()
            .unwrap_or(5432),
        database: env::var("TEST_PG_DATABASE").unwrap_or_else(|_| "postgres".to_string()),
        username: env::var("TEST_PG_USERNAME").unwrap_or_else(|_| "postgres".to_string()),
        password: env::var("TEST_PG_PASSWORD").unwrap_or_else(|_| "postgres".to_string()),
        search_path: Some(format!("{}_{}", schema, std::process::id())),
        connect_timeout_secs: 10,
        write_timeout_secs: 10,
        create_schema: true,
    }
}

pub fn test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 5,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(10),
        max_elapsed: None,
    }
}

pub fn finite_source(path: &Path) -> SourceConfig {
    SourceConfig {
        path: path.to_path_buf(),
        reopen_on_eof: false,
    }
}

pub fn reopening_source(path: &Path) -> SourceConfig {
    SourceConfig {
        path: path.to_path_buf(),
        reopen_on_eof: true,
    }
}

pub const ACME: &str =
    r#"{"type":"Company","data":{"company_id":1,"company_name":"Acme","headcount":50}}"#;
pub const GLOBEX: &str = r#"{"type":"Company","data":{"company_id":7,"company_name":"Globex"}}"#;
pub const ADA: &str = r#"{"type":"Person","data":{"person_id":2,"name":"Ada"}}"#;
pub const ADA_AT_ACME: &str = r#"{"type":"PersonEmployment","data":{"company_id":1,"person_id":2,"employment_title":"Engineer"}}"#;
pub const ACME_BUYS_GLOBEX: &str = r#"{"type":"CompanyAcquisition","data":{"parent_company_id":1,"acquired_company_id":7,"merged_into_parent_company":true}}"#;
