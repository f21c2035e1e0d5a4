use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Error as SqlxError, Row};
use std::time::Duration;
use tracing::{error, info};

use super::{ProjectStore, StoreFuture};
use crate::drawing::Snapshot;

/// PostgreSQL backed project store
///
/// One row per room in the `projects` table:
///
/// ```sql
/// CREATE TABLE projects (
///     room       TEXT PRIMARY KEY,
///     snapshot   TEXT NOT NULL,
///     updated_at TIMESTAMPTZ NOT NULL
/// );
/// ```
pub struct PgProjectStore {
    pool: PgPool,
}

impl PgProjectStore {
    /// Create a new database connection pool
    ///
    /// # Arguments
    /// * `database_url` - PostgreSQL connection string
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Create the `projects` table if it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        let create_sql = r#"
            CREATE TABLE IF NOT EXISTS projects (
                room TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL
            )
        "#;
        sqlx::query(create_sql).execute(&self.pool).await?;
        Ok(())
    }

    /// Load the snapshot stored for a room
    ///
    /// # Returns
    /// * `Result<Option<Snapshot>, SqlxError>` - The snapshot, or None if the room was never saved
    pub async fn load_project(&self, room: &str) -> Result<Option<Snapshot>, SqlxError> {
        // Log pool stats before acquiring connection
        let pool_idle = self.pool.num_idle() as u32;
        let pool_size = self.pool.size();
        info!(
            "Loading project for room {}. Pool connections: {} idle, {} in use",
            room,
            pool_idle,
            pool_size.saturating_sub(pool_idle)
        );

        let row = sqlx::query("SELECT snapshot, updated_at FROM projects WHERE room = $1")
            .bind(room)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let snapshot: String = row.try_get("snapshot")?;
                let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
                info!(
                    "Project for room '{}' loaded ({} bytes, saved {})",
                    room,
                    snapshot.len(),
                    updated_at.to_rfc3339()
                );
                Ok(Some(Snapshot::new(snapshot)))
            }
            None => {
                info!("No project stored for room '{}'", room);
                Ok(None)
            }
        }
    }

    /// Insert or replace the snapshot for a room
    pub async fn save_project(&self, room: &str, snapshot: &Snapshot) -> Result<(), SqlxError> {
        let upsert_sql = r#"
            INSERT INTO projects (room, snapshot, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (room)
            DO UPDATE SET snapshot = EXCLUDED.snapshot, updated_at = EXCLUDED.updated_at
        "#;

        let result = sqlx::query(upsert_sql)
            .bind(room)
            .bind(snapshot.as_str())
            .bind(Utc::now())
            .execute(&self.pool)
            .await;

        match result {
            Ok(_) => {
                info!("Project for room '{}' saved ({} bytes)", room, snapshot.len());
                Ok(())
            }
            Err(e) => {
                error!(
                    "Failed to save project for room '{}': {}. Pool state: {} idle, {} total",
                    room,
                    e,
                    self.pool.num_idle(),
                    self.pool.size()
                );
                Err(e)
            }
        }
    }
}

impl ProjectStore for PgProjectStore {
    fn get<'a>(&'a self, room: &'a str) -> StoreFuture<'a, Option<Snapshot>> {
        Box::pin(async move { Ok(self.load_project(room).await?) })
    }

    fn put<'a>(&'a self, room: &'a str, snapshot: &'a Snapshot) -> StoreFuture<'a, ()> {
        Box::pin(async move { Ok(self.save_project(room, snapshot).await?) })
    }

    fn close(&self) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            info!("Closing database connection pool");
            self.pool.close().await;
            Ok(())
        })
    }
}
