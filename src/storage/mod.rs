//! Local embedded project store (SQLite).
//!
//! One row per project with the document serialized into a JSON column, plus
//! a key-value `settings` table. The [`ProjectStore`] impl is deliberately
//! best-effort: open/transaction failures are logged and callers get `()` or
//! an empty list back, never an error — persistence problems must not take
//! the interactive session down. The fallible `try_*` layer underneath is
//! what the tests exercise.

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteConnectOptions, ConnectOptions, SqlitePool};
use std::{path::Path, str::FromStr};
use tracing::error;

use crate::project::{Project, ProjectStore};

/// Well-known settings keys.
pub mod keys {
    pub const USER_NAME: &str = "user_name";
    pub const AUTO_BACKUP: &str = "auto_backup";
    pub const LAST_AUTO_BACKUP: &str = "last_auto_backup";
    pub const AI_USAGE: &str = "ai_usage";
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const ACCESS_TOKEN_EXPIRES: &str = "access_token_expires";
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct ProjectRow {
    id: String,
    document: String,
}

#[derive(Clone)]
pub struct LocalStore {
    pool: SqlitePool,
}

impl LocalStore {
    pub async fn open(data_dir: &Path) -> Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let db_path = data_dir.join("idealog.db");
        let opts =
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", db_path.display()))?
                .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
                .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
                .create_if_missing(true)
                .log_slow_statements(
                    log::LevelFilter::Warn,
                    std::time::Duration::from_millis(250),
                );
        let pool = SqlitePool::connect_with(opts).await?;
        sqlx::migrate!("src/storage/migrations")
            .run(&pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(Self { pool })
    }

    /// Return a clone of the connection pool (cheap — Arc-backed).
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    // ─── Projects (fallible layer) ───────────────────────────────────────────

    pub async fn try_put(&self, project: &Project) -> Result<()> {
        let document = serde_json::to_string(project)?;
        sqlx::query(
            "INSERT INTO projects (id, name, created_at, updated_at, document)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
               name = excluded.name,
               updated_at = excluded.updated_at,
               document = excluded.document",
        )
        .bind(&project.id)
        .bind(&project.name)
        .bind(&project.created_at)
        .bind(&project.updated_at)
        .bind(&document)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn try_get_all(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as("SELECT id, document FROM projects")
            .fetch_all(&self.pool)
            .await?;
        let mut projects = Vec::with_capacity(rows.len());
        for row in rows {
            match serde_json::from_str::<Project>(&row.document) {
                Ok(p) => projects.push(p),
                // A corrupt row loses that project, not the whole list.
                Err(e) => error!(id = %row.id, err = %e, "skipping unparseable project row"),
            }
        }
        Ok(projects)
    }

    pub async fn try_get(&self, id: &str) -> Result<Option<Project>> {
        let row: Option<ProjectRow> =
            sqlx::query_as("SELECT id, document FROM projects WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        match row {
            Some(row) => Ok(Some(serde_json::from_str(&row.document)?)),
            None => Ok(None),
        }
    }

    pub async fn try_delete(&self, id: &str) -> Result<()> {
        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Total bytes of stored project documents.
    pub async fn document_bytes(&self) -> Result<u64> {
        let row: (Option<i64>,) = sqlx::query_as("SELECT SUM(LENGTH(document)) FROM projects")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0.unwrap_or(0) as u64)
    }

    // ─── Settings ────────────────────────────────────────────────────────────

    pub async fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|(v,)| v))
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO settings (key, value) VALUES (?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_setting(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM settings WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// ─── Best-effort store contract ───────────────────────────────────────────────

#[async_trait]
impl ProjectStore for LocalStore {
    async fn put(&self, project: &Project) -> Result<()> {
        if let Err(e) = self.try_put(project).await {
            error!(id = %project.id, err = %e, "local project save failed");
        }
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Project>> {
        match self.try_get_all().await {
            Ok(projects) => Ok(projects),
            Err(e) => {
                error!(err = %e, "local project load failed");
                Ok(Vec::new())
            }
        }
    }

    async fn delete(&self, id: &str) -> Result<()> {
        if let Err(e) = self.try_delete(id).await {
            error!(id = %id, err = %e, "local project delete failed");
        }
        Ok(())
    }
}
