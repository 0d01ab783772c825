use std::{
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow},
    Pool, Row, Sqlite,
};
use tracing::debug;

use shared::domain::{
    AccountId, Event, EventId, FileId, StoredFile, Task, TaskId, User, UserId,
};

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub deadline: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub file_ref: String,
    pub file_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreStats {
    pub users: i64,
    pub tasks: i64,
    pub events: i64,
    pub files: i64,
}

/// Repository seam between the command handlers and the database.
///
/// Every child-record query is keyed by the internal [`UserId`]; deletes are
/// scoped to the owner so one account can never remove another's rows.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn health_check(&self) -> Result<()>;

    async fn find_user_by_account(&self, account_id: AccountId) -> Result<Option<User>>;
    /// Returns the user and whether this call inserted it.
    async fn get_or_create_user(
        &self,
        account_id: AccountId,
        display_name: &str,
    ) -> Result<(User, bool)>;
    async fn list_users(&self) -> Result<Vec<User>>;

    async fn insert_task(&self, owner: UserId, task: &NewTask) -> Result<TaskId>;
    async fn list_tasks_for_user(&self, owner: UserId) -> Result<Vec<Task>>;
    async fn delete_task(&self, owner: UserId, task_id: TaskId) -> Result<bool>;

    async fn insert_event(&self, owner: UserId, event: &NewEvent) -> Result<EventId>;
    async fn list_events_for_user(&self, owner: UserId) -> Result<Vec<Event>>;
    async fn delete_event(&self, owner: UserId, event_id: EventId) -> Result<bool>;

    async fn insert_file(&self, owner: UserId, file: &NewFile) -> Result<FileId>;
    async fn list_files_for_user(&self, owner: UserId) -> Result<Vec<StoredFile>>;
    async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<bool>;

    async fn stats(&self) -> Result<StoreStats>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::with_timeout(database_url, DEFAULT_STORE_TIMEOUT).await
    }

    /// Opens the pool with `timeout` bounding both connection checkout and SQLite lock waits.
    pub async fn with_timeout(database_url: &str, timeout: Duration) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid database url '{database_url}'"))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(timeout);

        // Every in-memory connection is its own database, so keep exactly one alive.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
        };

        let pool = pool_options
            .acquire_timeout(timeout)
            .connect_with(connect_options)
            .await
            .context("failed to open sqlite pool")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to apply migrations")?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl RecordStore for Storage {
    async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn find_user_by_account(&self, account_id: AccountId) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, account_id, display_name, created_at FROM users WHERE account_id = ?",
        )
        .bind(account_id.0)
        .fetch_optional(&self.pool)
        .await
        .context("failed to look up user by account")?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn get_or_create_user(
        &self,
        account_id: AccountId,
        display_name: &str,
    ) -> Result<(User, bool)> {
        let mut tx = self.pool.begin().await?;
        let inserted = sqlx::query(
            "INSERT INTO users (account_id, display_name) VALUES (?, ?)
             ON CONFLICT(account_id) DO NOTHING",
        )
        .bind(account_id.0)
        .bind(display_name)
        .execute(&mut *tx)
        .await
        .context("failed to insert user")?
        .rows_affected();

        let row = sqlx::query(
            "SELECT id, account_id, display_name, created_at FROM users WHERE account_id = ?",
        )
        .bind(account_id.0)
        .fetch_one(&mut *tx)
        .await
        .context("failed to read back user")?;
        tx.commit().await?;

        let user = user_from_row(&row)?;
        debug!(account = %account_id, user = %user.user_id, created = inserted > 0, "resolved user");
        Ok((user, inserted > 0))
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(
            "SELECT id, account_id, display_name, created_at FROM users ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list users")?;
        rows.iter().map(user_from_row).collect()
    }

    async fn insert_task(&self, owner: UserId, task: &NewTask) -> Result<TaskId> {
        ensure!(!task.title.trim().is_empty(), "task title must not be empty");
        let rec = sqlx::query(
            "INSERT INTO tasks (user_id, title, description, deadline) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(owner.0)
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.deadline)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert task")?;
        Ok(TaskId(rec.try_get::<i64, _>(0)?))
    }

    async fn list_tasks_for_user(&self, owner: UserId) -> Result<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, description, deadline
             FROM tasks
             WHERE user_id = ?
             ORDER BY deadline IS NULL, deadline ASC, id ASC",
        )
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list tasks")?;

        rows.iter()
            .map(|r| -> Result<Task> {
                Ok(Task {
                    task_id: TaskId(r.try_get::<i64, _>(0)?),
                    user_id: UserId(r.try_get::<i64, _>(1)?),
                    title: r.try_get::<String, _>(2)?,
                    description: r.try_get::<String, _>(3)?,
                    deadline: r.try_get::<Option<NaiveDate>, _>(4)?,
                })
            })
            .collect()
    }

    async fn delete_task(&self, owner: UserId, task_id: TaskId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(task_id.0)
            .bind(owner.0)
            .execute(&self.pool)
            .await
            .context("failed to delete task")?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn insert_event(&self, owner: UserId, event: &NewEvent) -> Result<EventId> {
        ensure!(!event.title.trim().is_empty(), "event title must not be empty");
        let rec = sqlx::query(
            "INSERT INTO events (user_id, title, description, date) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(owner.0)
        .bind(&event.title)
        .bind(event.description.as_deref())
        .bind(event.date)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert event")?;
        Ok(EventId(rec.try_get::<i64, _>(0)?))
    }

    async fn list_events_for_user(&self, owner: UserId) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT id, user_id, title, description, date
             FROM events
             WHERE user_id = ?
             ORDER BY date ASC, id ASC",
        )
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list events")?;

        rows.iter()
            .map(|r| -> Result<Event> {
                Ok(Event {
                    event_id: EventId(r.try_get::<i64, _>(0)?),
                    user_id: UserId(r.try_get::<i64, _>(1)?),
                    title: r.try_get::<String, _>(2)?,
                    description: r.try_get::<Option<String>, _>(3)?,
                    date: r.try_get::<NaiveDate, _>(4)?,
                })
            })
            .collect()
    }

    async fn delete_event(&self, owner: UserId, event_id: EventId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM events WHERE id = ? AND user_id = ?")
            .bind(event_id.0)
            .bind(owner.0)
            .execute(&self.pool)
            .await
            .context("failed to delete event")?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn insert_file(&self, owner: UserId, file: &NewFile) -> Result<FileId> {
        ensure!(!file.file_ref.is_empty(), "file reference must not be empty");
        let rec = sqlx::query(
            "INSERT INTO files (user_id, file_ref, file_name) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(owner.0)
        .bind(&file.file_ref)
        .bind(&file.file_name)
        .fetch_one(&self.pool)
        .await
        .context("failed to insert file")?;
        Ok(FileId(rec.try_get::<i64, _>(0)?))
    }

    async fn list_files_for_user(&self, owner: UserId) -> Result<Vec<StoredFile>> {
        let rows = sqlx::query(
            "SELECT id, user_id, file_ref, file_name FROM files WHERE user_id = ? ORDER BY id ASC",
        )
        .bind(owner.0)
        .fetch_all(&self.pool)
        .await
        .context("failed to list files")?;

        rows.iter()
            .map(|r| -> Result<StoredFile> {
                Ok(StoredFile {
                    file_id: FileId(r.try_get::<i64, _>(0)?),
                    user_id: UserId(r.try_get::<i64, _>(1)?),
                    file_ref: r.try_get::<String, _>(2)?,
                    file_name: r.try_get::<String, _>(3)?,
                })
            })
            .collect()
    }

    async fn delete_file(&self, owner: UserId, file_id: FileId) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM files WHERE id = ? AND user_id = ?")
            .bind(file_id.0)
            .bind(owner.0)
            .execute(&self.pool)
            .await
            .context("failed to delete file")?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let row = sqlx::query(
            "SELECT
                (SELECT COUNT(*) FROM users),
                (SELECT COUNT(*) FROM tasks),
                (SELECT COUNT(*) FROM events),
                (SELECT COUNT(*) FROM files)",
        )
        .fetch_one(&self.pool)
        .await
        .context("failed to collect store stats")?;
        Ok(StoreStats {
            users: row.try_get(0)?,
            tasks: row.try_get(1)?,
            events: row.try_get(2)?,
            files: row.try_get(3)?,
        })
    }
}

fn user_from_row(row: &SqliteRow) -> Result<User> {
    Ok(User {
        user_id: UserId(row.try_get::<i64, _>(0)?),
        account_id: AccountId(row.try_get::<i64, _>(1)?),
        display_name: row.try_get::<String, _>(2)?,
        created_at: row.try_get::<DateTime<Utc>, _>(3)?,
    })
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

pub fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
