//! libSQL backend: durable contact registry and noise archive.
//!
//! Supports local file and in-memory databases. One connection is reused
//! for all operations.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::RegistryError;
use crate::store::key::normalize_identity;
use crate::store::migrations;
use crate::store::model::{ArchivedNoiseEntry, ContactRecord, ContactUpsert};
use crate::store::traits::{ArchiveStore, ContactRegistry};

/// libSQL-backed [`ContactRegistry`] and [`ArchiveStore`].
pub struct LibSqlRegistry {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlRegistry {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RegistryError::Connection(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| RegistryError::Connection(format!("Failed to open libSQL database: {e}")))?;

        let registry = Self::from_database(db)?;
        registry.init_schema().await?;
        info!(path = %path.display(), "Contact registry opened");
        Ok(registry)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, RegistryError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                RegistryError::Connection(format!("Failed to create in-memory database: {e}"))
            })?;

        let registry = Self::from_database(db)?;
        registry.init_schema().await?;
        Ok(registry)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, RegistryError> {
        let conn = db
            .connect()
            .map_err(|e| RegistryError::Connection(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn init_schema(&self) -> Result<(), RegistryError> {
        migrations::run_migrations(&self.conn).await
    }

    /// Archived noise for one partition date, oldest first. Audit use only.
    pub async fn archived_on(
        &self,
        date: NaiveDate,
    ) -> Result<Vec<ArchivedNoiseEntry>, RegistryError> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {ARCHIVE_COLUMNS} FROM noise_archive WHERE partition_date = ?1 ORDER BY received_at ASC"
                ),
                params![date.format(DATE_FORMAT).to_string()],
            )
            .await
            .map_err(|e| RegistryError::Query(format!("archived_on: {e}")))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RegistryError::Query(format!("archived_on: {e}")))?
        {
            entries.push(row_to_archive_entry(&row)?);
        }
        Ok(entries)
    }

    async fn query_contacts(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
        op: &str,
    ) -> Result<Vec<ContactRecord>, RegistryError> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(|e| RegistryError::Query(format!("{op}: {e}")))?;

        let mut contacts = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| RegistryError::Query(format!("{op}: {e}")))?
        {
            contacts.push(row_to_contact(&row)?);
        }
        Ok(contacts)
    }
}

// ── Helper functions ────────────────────────────────────────────────

const DATE_FORMAT: &str = "%Y-%m-%d";

const CONTACT_COLUMNS: &str =
    "identity, display_name, priority, last_message_at, last_replied_at, notes";

const ARCHIVE_COLUMNS: &str =
    "id, partition_date, provider, sender, sender_name, body, received_at, session_key";

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
fn format_datetime(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RegistryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RegistryError::Serialization(format!("bad timestamp '{s}': {e}")))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, RegistryError> {
    s.as_deref().map(parse_datetime).transpose()
}

fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_datetime(at: Option<DateTime<Utc>>) -> libsql::Value {
    match at {
        Some(at) => libsql::Value::Text(format_datetime(at)),
        None => libsql::Value::Null,
    }
}

fn opt_flag(flag: Option<bool>) -> libsql::Value {
    match flag {
        Some(flag) => libsql::Value::Integer(i64::from(flag)),
        None => libsql::Value::Null,
    }
}

fn column_err(e: libsql::Error) -> RegistryError {
    RegistryError::Serialization(format!("row parse: {e}"))
}

/// Column order matches CONTACT_COLUMNS.
fn row_to_contact(row: &libsql::Row) -> Result<ContactRecord, RegistryError> {
    let priority: i64 = row.get(2).map_err(column_err)?;
    Ok(ContactRecord {
        identity: row.get(0).map_err(column_err)?,
        display_name: row.get(1).map_err(column_err)?,
        priority: priority != 0,
        last_message_at: parse_optional_datetime(row.get(3).ok())?,
        last_replied_at: parse_optional_datetime(row.get(4).ok())?,
        notes: row.get(5).ok(),
    })
}

/// Column order matches ARCHIVE_COLUMNS.
fn row_to_archive_entry(row: &libsql::Row) -> Result<ArchivedNoiseEntry, RegistryError> {
    let date_str: String = row.get(1).map_err(column_err)?;
    let received_str: String = row.get(6).map_err(column_err)?;
    Ok(ArchivedNoiseEntry {
        id: row.get(0).map_err(column_err)?,
        partition_date: NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
            RegistryError::Serialization(format!("bad partition date '{date_str}': {e}"))
        })?,
        provider: row.get(2).map_err(column_err)?,
        sender: row.get(3).map_err(column_err)?,
        sender_name: row.get(4).ok(),
        body: row.get(5).map_err(column_err)?,
        received_at: parse_datetime(&received_str)?,
        session_key: row.get(7).ok(),
    })
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ContactRegistry for LibSqlRegistry {
    async fn get_contact(&self, identity: &str) -> Result<Option<ContactRecord>, RegistryError> {
        let mut contacts = self
            .query_contacts(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                params![normalize_identity(identity)],
                "get_contact",
            )
            .await?;
        Ok(contacts.pop())
    }

    async fn list_contacts(&self) -> Result<Vec<ContactRecord>, RegistryError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts ORDER BY rowid ASC"),
            (),
            "list_contacts",
        )
        .await
    }

    async fn upsert_contact(&self, upsert: &ContactUpsert) -> Result<ContactRecord, RegistryError> {
        let key = normalize_identity(&upsert.identity);
        let now = format_datetime(Utc::now());

        self.conn
            .execute(
                "INSERT INTO contacts (id, identity, display_name, priority, last_message_at,
                    last_replied_at, notes, created_at, updated_at)
                 VALUES (?1, ?2, COALESCE(?3, ?2), COALESCE(?4, 0), ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    display_name = COALESCE(?3, contacts.display_name),
                    priority = COALESCE(?4, contacts.priority),
                    last_message_at = COALESCE(?5, contacts.last_message_at),
                    last_replied_at = COALESCE(?6, contacts.last_replied_at),
                    notes = COALESCE(?7, contacts.notes),
                    updated_at = ?8",
                params![
                    key.clone(),
                    upsert.identity.clone(),
                    opt_text(upsert.display_name.as_deref()),
                    opt_flag(upsert.priority),
                    opt_datetime(upsert.last_message_at),
                    opt_datetime(upsert.last_replied_at),
                    opt_text(upsert.notes.as_deref()),
                    now,
                ],
            )
            .await
            .map_err(|e| RegistryError::Query(format!("upsert_contact: {e}")))?;

        debug!(key = %key, "Contact upserted");

        self.get_contact(&upsert.identity).await?.ok_or_else(|| {
            RegistryError::Query(format!("upsert_contact: {key} missing after write"))
        })
    }

    async fn touch_last_message(
        &self,
        identity: &str,
        at: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let key = normalize_identity(identity);
        let updated = self
            .conn
            .execute(
                "UPDATE contacts SET last_message_at = ?1, updated_at = ?2
                 WHERE id = ?3 AND (last_message_at IS NULL OR last_message_at < ?1)",
                params![format_datetime(at), format_datetime(Utc::now()), key.clone()],
            )
            .await
            .map_err(|e| RegistryError::Query(format!("touch_last_message: {e}")))?;

        debug!(key = %key, updated, "Touched last message timestamp");
        Ok(())
    }

    async fn list_silent_contacts(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<ContactRecord>, RegistryError> {
        self.query_contacts(
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts
                 WHERE last_message_at IS NULL OR last_message_at < ?1
                 ORDER BY rowid ASC"
            ),
            params![format_datetime(cutoff)],
            "list_silent_contacts",
        )
        .await
    }
}

#[async_trait]
impl ArchiveStore for LibSqlRegistry {
    async fn archive_noise(&self, entry: &ArchivedNoiseEntry) -> Result<(), RegistryError> {
        self.conn
            .execute(
                &format!(
                    "INSERT OR REPLACE INTO noise_archive ({ARCHIVE_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    entry.id.clone(),
                    entry.partition_date.format(DATE_FORMAT).to_string(),
                    entry.provider.clone(),
                    entry.sender.clone(),
                    opt_text(entry.sender_name.as_deref()),
                    entry.body.clone(),
                    format_datetime(entry.received_at),
                    opt_text(entry.session_key.as_deref()),
                ],
            )
            .await
            .map_err(|e| RegistryError::Query(format!("archive_noise: {e}")))?;

        debug!(id = %entry.id, sender = %entry.sender, "Noise archived");
        Ok(())
    }
}
