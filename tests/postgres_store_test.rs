mod common;

use chrono::{TimeZone, Utc};
use common::*;
use entity_ingest::config::PostgresConfig;
use entity_ingest::schema::{Company, CompanyAcquisition, Person, PersonEmployment, Record};
use entity_ingest::source::PipeSource;
use entity_ingest::store::{PostgresStore, RecordStore, StorageAdapter, StoreError};
use entity_ingest::Ingestor;
use std::io::Write;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio_postgres::{Client, NoTls};

async fn setup(schema: &str) -> (Client, PostgresConfig, PostgresStore) {
    tracing_subscriber::fmt()
        .with_env_filter("entity_ingest=debug")
        .try_init()
        .ok();

    let config = get_test_postgres_config(schema);
    let search_path = config.search_path.clone().unwrap();

    let mut client_config = config.client_config();
    client_config.application_name("entity-ingest-tests");
    let (client, connection) = client_config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            eprintln!("Connection error: {}", e);
        }
    });

    client
        .batch_execute(&format!(
            "DROP SCHEMA IF EXISTS {0} CASCADE; CREATE SCHEMA {0};",
            search_path
        ))
        .await
        .unwrap();

    let mut store = PostgresStore::connect(&config).await.unwrap();
    store.ensure_schema().await.unwrap();

    (client, config, store)
}

async fn cleanup(client: &Client, config: &PostgresConfig) {
    let search_path = config.search_path.as_deref().unwrap();
    client
        .batch_execute(&format!("DROP SCHEMA IF EXISTS {} CASCADE", search_path))
        .await
        .ok();
}

fn company(id: i32, headcount: Option<i32>) -> Record {
    Record::Company(Company {
        company_id: id,
        company_name: format!("company-{}", id),
        headcount,
    })
}

fn person(id: i32) -> Record {
    Record::Person(Person {
        person_id: id,
        name: format!("person-{}", id),
    })
}

#[tokio::test]
#[ignore] // Run with: cargo test --test postgres_store_test -- --ignored
async fn test_writes_each_record_kind() {
    let (client, config, mut store) = setup("ingest_kinds").await;

    store.write(&company(1, Some(50))).await.unwrap();
    store.write(&company(7, None)).await.unwrap();
    store.write(&person(2)).await.unwrap();
    store
        .write(&Record::CompanyAcquisition(CompanyAcquisition {
            parent_company_id: 1,
            acquired_company_id: 7,
            merged_into_parent_company: true,
        }))
        .await
        .unwrap();
    let start = Utc.with_ymd_and_hms(2020, 1, 15, 9, 30, 0).unwrap();
    store
        .write(&Record::PersonEmployment(PersonEmployment {
            company_id: 1,
            person_id: 2,
            employment_title: "Engineer".to_string(),
            start_date: Some(start),
            end_date: None,
        }))
        .await
        .unwrap();

    let schema = config.search_path.as_deref().unwrap();
    let row = client
        .query_one(
            &format!("SELECT name, headcount FROM {}.company WHERE company_id = 1", schema),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>(0), "company-1");
    assert_eq!(row.get::<_, Option<i32>>(1), Some(50));

    let row = client
        .query_one(
            &format!(
                "SELECT acquired_by, merged_into_parent_company FROM {}.company WHERE company_id = 7",
                schema
            ),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, Option<i32>>(0), Some(1));
    assert_eq!(row.get::<_, Option<bool>>(1), Some(true));

    let row = client
        .query_one(
            &format!(
                "SELECT employment_title, start_date, end_date FROM {}.employment \
                 WHERE company_id = 1 AND person_id = 2",
                schema
            ),
            &[],
        )
        .await
        .unwrap();
    assert_eq!(row.get::<_, String>(0), "Engineer");
    assert_eq!(row.get::<_, Option<chrono::DateTime<Utc>>>(1), Some(start));
    assert_eq!(row.get::<_, Option<chrono::DateTime<Utc>>>(2), None);

    store.close().await.unwrap();
    cleanup(&client, &config).await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test postgres_store_test -- --ignored
async fn test_permanent_failures_are_classified() {
    let (client, config, mut store) = setup("ingest_failures").await;

    store.write(&person(2)).await.unwrap();
    let err = store.write(&person(2)).await.unwrap_err();
    assert!(matches!(err, StoreError::Duplicate(_)), "{:?}", err);

    let err = store
        .write(&Record::PersonEmployment(PersonEmployment {
            company_id: 99,
            person_id: 2,
            employment_title: "Ghost".to_string(),
            start_date: None,
            end_date: None,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(_)), "{:?}", err);

    store.write(&company(1, None)).await.unwrap();
    let err = store
        .write(&Record::CompanyAcquisition(CompanyAcquisition {
            parent_company_id: 1,
            acquired_company_id: 42,
            merged_into_parent_company: false,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(_)), "{:?}", err);

    let err = store
        .write(&Record::CompanyAcquisition(CompanyAcquisition {
            parent_company_id: 42,
            acquired_company_id: 1,
            merged_into_parent_company: false,
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::MissingReference(_)), "{:?}", err);

    store.close().await.unwrap();
    cleanup(&client, &config).await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test postgres_store_test -- --ignored
async fn test_reconnects_after_connection_is_terminated() {
    let (client, config, store) = setup("ingest_reconnect").await;
    let mut adapter = StorageAdapter::new(store, test_retry_policy());

    adapter.apply(&person(1)).await.unwrap();

    client
        .execute(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE application_name = 'entity-ingest' AND pid <> pg_backend_pid()",
            &[],
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let applied = adapter.apply(&person(3)).await.unwrap();
    assert!(applied.attempts >= 1);

    let schema = config.search_path.as_deref().unwrap();
    let count: i64 = client
        .query_one(&format!("SELECT count(*) FROM {}.person", schema), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(count, 2);

    adapter.close().await.unwrap();
    cleanup(&client, &config).await;
}

#[tokio::test]
#[ignore] // Run with: cargo test --test postgres_store_test -- --ignored
async fn test_end_to_end_file_replay() {
    let (client, config, store) = setup("ingest_e2e").await;

    let mut file = NamedTempFile::new().unwrap();
    for line in [ACME, GLOBEX, ADA, ADA_AT_ACME, ACME_BUYS_GLOBEX, r#"{"type":"Bogus","data":{}}"#] {
        writeln!(file, "{}", line).unwrap();
    }
    file.flush().unwrap();

    let mut ingestor = Ingestor::new(
        PipeSource::new(file.path()),
        StorageAdapter::new(store, test_retry_policy()),
        &finite_source(file.path()),
    );
    let stats = ingestor.run(std::future::pending::<()>()).await.unwrap();
    ingestor.close(Duration::from_secs(5)).await.unwrap();

    assert_eq!(stats.applied, 5);
    assert_eq!(stats.unknown_types, 1);

    let schema = config.search_path.as_deref().unwrap();
    let edges: i64 = client
        .query_one(&format!("SELECT count(*) FROM {}.employment", schema), &[])
        .await
        .unwrap()
        .get(0);
    assert_eq!(edges, 1);

    cleanup(&client, &config).await;
}
