use async_trait::async_trait;
use std::error::Error as _;
use tokio::task::JoinHandle;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, IsolationLevel, NoTls, Transaction};
use tracing::{debug, error, info, warn};

use super::statements::{INSERT_COMPANY, INSERT_PERSON, SCHEMA, UPDATE_ACQUISITION, UPSERT_EMPLOYMENT};
use super::{RecordStore, StoreError};
use crate::config::PostgresConfig;
use crate::schema::Record;
use crate::Result;

/// PostgreSQL-backed [`RecordStore`].
///
/// Owns a single connection; writes run one at a time in serializable
/// transactions. A closed connection is re-established on the next write.
pub struct PostgresStore {
    config: PostgresConfig,
    client: Option<Client>,
    connection_task: Option<JoinHandle<()>>,
}

impl PostgresStore {
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let (client, connection_task) = open_connection(config).await?;
        info!("Successfully connected to PostgreSQL");

        Ok(Self {
            config: config.clone(),
            client: Some(client),
            connection_task: Some(connection_task),
        })
    }

    /// Creates the person, company and employment tables if missing.
    pub async fn ensure_schema(&mut self) -> Result<()> {
        info!("Ensuring storage tables exist");
        let client = self.client().await.map_err(|e| crate::Error::Connection(e.to_string()))?;
        client.batch_execute(SCHEMA).await?;
        Ok(())
    }

    async fn client(&mut self) -> std::result::Result<&mut Client, StoreError> {
        if self.client.as_ref().map_or(true, Client::is_closed) {
            warn!("PostgreSQL connection closed, reconnecting");
            self.client = None;
            if let Some(task) = self.connection_task.take() {
                task.abort();
            }

            let (client, connection_task) = open_connection(&self.config)
                .await
                .map_err(|e| StoreError::Transient(format!("reconnect failed: {}", e)))?;
            self.client = Some(client);
            self.connection_task = Some(connection_task);
            info!("Reconnected to PostgreSQL");
        }

        self.client
            .as_mut()
            .ok_or_else(|| StoreError::Transient("no PostgreSQL connection".to_string()))
    }
}

async fn open_connection(
    config: &PostgresConfig,
) -> std::result::Result<(Client, JoinHandle<()>), tokio_postgres::Error> {
    info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        "Connecting to PostgreSQL"
    );
    let (client, connection) = config.client_config().connect(NoTls).await?;

    let connection_task = tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!("Connection error: {}", e);
        }
    });

    Ok((client, connection_task))
}

#[async_trait]
impl RecordStore for PostgresStore {
    async fn write(&mut self, record: &Record) -> std::result::Result<(), StoreError> {
        let write_timeout = self.config.write_timeout();
        let client = self.client().await?;

        // Dropping the transaction on timeout rolls it back.
        match tokio::time::timeout(write_timeout, write_in_transaction(client, record)).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Transient(format!(
                "write did not complete within {:?}",
                write_timeout
            ))),
        }
    }

    async fn close(&mut self) -> std::result::Result<(), StoreError> {
        info!("Closing PostgreSQL connection");
        self.client = None;

        if let Some(task) = self.connection_task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    return Err(StoreError::Rejected(format!("connection task failed: {}", e)));
                }
            }
        }

        debug!("PostgreSQL connection closed");
        Ok(())
    }
}

async fn write_in_transaction(
    client: &mut Client,
    record: &Record,
) -> std::result::Result<(), StoreError> {
    let tx = client
        .build_transaction()
        .isolation_level(IsolationLevel::Serializable)
        .start()
        .await
        .map_err(classify)?;

    execute(&tx, record).await?;
    tx.commit().await.map_err(classify)
}

async fn execute(tx: &Transaction<'_>, record: &Record) -> std::result::Result<(), StoreError> {
    match record {
        Record::Person(person) => {
            tx.execute(INSERT_PERSON, &[&person.person_id, &person.name])
                .await
                .map_err(classify)?;
        }
        Record::Company(company) => {
            tx.execute(
                INSERT_COMPANY,
                &[&company.company_id, &company.company_name, &company.headcount],
            )
            .await
            .map_err(classify)?;
        }
        Record::CompanyAcquisition(acquisition) => {
            let updated = tx
                .execute(
                    UPDATE_ACQUISITION,
                    &[
                        &acquisition.acquired_company_id,
                        &acquisition.parent_company_id,
                        &acquisition.merged_into_parent_company,
                    ],
                )
                .await
                .map_err(classify)?;
            if updated == 0 {
                return Err(StoreError::MissingReference(format!(
                    "company {} does not exist",
                    acquisition.acquired_company_id
                )));
            }
        }
        Record::PersonEmployment(employment) => {
            tx.execute(
                UPSERT_EMPLOYMENT,
                &[
                    &employment.company_id,
                    &employment.person_id,
                    &employment.employment_title,
                    &employment.start_date,
                    &employment.end_date,
                ],
            )
            .await
            .map_err(classify)?;
        }
    }
    Ok(())
}

/// Maps a driver error onto the storage error taxonomy.
pub fn classify(err: tokio_postgres::Error) -> StoreError {
    let io_failure = err
        .source()
        .map_or(false, |source| source.is::<std::io::Error>());
    classify_parts(err.code(), err.is_closed() || io_failure, err.to_string())
}

fn classify_parts(code: Option<&SqlState>, connection_lost: bool, message: String) -> StoreError {
    let Some(code) = code else {
        return if connection_lost {
            StoreError::Transient(message)
        } else {
            StoreError::Rejected(message)
        };
    };

    if is_transient_state(code) {
        StoreError::Transient(message)
    } else if *code == SqlState::UNIQUE_VIOLATION {
        StoreError::Duplicate(message)
    } else if *code == SqlState::FOREIGN_KEY_VIOLATION {
        StoreError::MissingReference(message)
    } else {
        StoreError::Rejected(message)
    }
}

fn is_transient_state(code: &SqlState) -> bool {
    // Class 08: connection exceptions.
    code.code().starts_with("08")
        || [
            SqlState::T_R_SERIALIZATION_FAILURE,
            SqlState::T_R_DEADLOCK_DETECTED,
            SqlState::LOCK_NOT_AVAILABLE,
            SqlState::QUERY_CANCELED,
            SqlState::ADMIN_SHUTDOWN,
            SqlState::CRASH_SHUTDOWN,
            SqlState::CANNOT_CONNECT_NOW,
            SqlState::TOO_MANY_CONNECTIONS,
        ]
        .contains(code)
}
