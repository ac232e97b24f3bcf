//! Database connection and initialization

use async_trait::async_trait;
use pecoin_core::{EntityKind, Error, Participant, ParticipantDirectory, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;

/// Entity store backed by SQLite
pub struct Database {
    pool: SqlitePool,
}

fn db_err(e: impl std::fmt::Display) -> Error {
    Error::DatabaseError(e.to_string())
}

impl Database {
    /// Open (or create) the database file at `path` and apply the schema
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(dir).await.map_err(db_err)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal);
        Self::open(options, 5).await
    }

    /// Private in-memory store; a single connection keeps it alive
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        Self::open(options, 1).await
    }

    async fn open(options: SqliteConnectOptions, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(db_err)?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Create the three entity tables. They share one shape so the CRUD
    /// functions can address them by `EntityKind`.
    async fn run_migrations(&self) -> Result<()> {
        for kind in EntityKind::ALL {
            let ddl = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL,
                    wallet_address TEXT,
                    logo_path TEXT,
                    description TEXT,
                    created_at TIMESTAMP NOT NULL,
                    updated_at TIMESTAMP NOT NULL
                )
                "#,
                table = kind.table_name()
            );
            sqlx::query(&ddl)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;

            let index = format!(
                "CREATE INDEX IF NOT EXISTS idx_{table}_wallet ON {table} (wallet_address)",
                table = kind.table_name()
            );
            sqlx::query(&index)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
        }

        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl ParticipantDirectory for Database {
    async fn list_participants(&self, kind: EntityKind) -> Result<Vec<Participant>> {
        let entities = super::list_entities(&self.pool, kind).await?;
        Ok(entities.iter().filter_map(|e| e.to_participant()).collect())
    }
}
