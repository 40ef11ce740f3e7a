//! Database migrations module
//!
//! Migrations are embedded in the binary as SQL strings and tracked in the
//! `_migrations` table, so a fresh deployment only needs the executable.
//!
//! # Usage
//!
//! ```ignore
//! use cyclone::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::DynDatabasePool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements, separated by semicolons
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All migrations, in application order.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(254) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                gender CHAR(1) NOT NULL DEFAULT 'N' CHECK (gender IN ('M', 'F', 'O', 'N')),
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_user_profiles",
        up: r#"
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id INTEGER PRIMARY KEY REFERENCES users(id) ON DELETE CASCADE,
                about TEXT NOT NULL DEFAULT '',
                profile_picture VARCHAR(255),
                cover_picture VARCHAR(255),
                website VARCHAR(200) NOT NULL DEFAULT '',
                country VARCHAR(100) NOT NULL DEFAULT '',
                language VARCHAR(100) NOT NULL DEFAULT '',
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 3,
        name: "create_sessions",
        up: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_user_follows",
        up: r#"
            CREATE TABLE IF NOT EXISTS user_follows (
                follower_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                followed_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (follower_id, followed_id),
                CHECK (follower_id <> followed_id)
            );
            CREATE INDEX IF NOT EXISTS idx_user_follows_followed ON user_follows(followed_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_categories",
        up: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS user_interests (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (user_id, category_id)
            );
        "#,
    },
    Migration {
        version: 6,
        name: "create_pins",
        up: r#"
            CREATE TABLE IF NOT EXISTS pins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                title VARCHAR(65) NOT NULL,
                about VARCHAR(250) NOT NULL DEFAULT '',
                alter_text TEXT NOT NULL DEFAULT '',
                destination_link VARCHAR(1000) NOT NULL DEFAULT '',
                pin_file VARCHAR(255) NOT NULL,
                status INTEGER NOT NULL DEFAULT 1 CHECK (status IN (0, 1, 2)),
                is_idea BOOLEAN NOT NULL DEFAULT 0,
                is_private BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_pins_user_id ON pins(user_id);
            CREATE INDEX IF NOT EXISTS idx_pins_created_at ON pins(created_at);
            CREATE TABLE IF NOT EXISTS pin_categories (
                pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
                PRIMARY KEY (pin_id, category_id)
            );
            CREATE INDEX IF NOT EXISTS idx_pin_categories_category ON pin_categories(category_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_saved_pins",
        up: r#"
            CREATE TABLE IF NOT EXISTS saved_pins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, pin_id)
            );
        "#,
    },
    Migration {
        version: 8,
        name: "create_boards",
        up: r#"
            CREATE TABLE IF NOT EXISTS boards (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                name VARCHAR(50) NOT NULL,
                is_private BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                UNIQUE (user_id, name)
            );
            CREATE TABLE IF NOT EXISTS board_pins (
                board_id INTEGER NOT NULL REFERENCES boards(id) ON DELETE CASCADE,
                pin_id INTEGER NOT NULL REFERENCES pins(id) ON DELETE CASCADE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                PRIMARY KEY (board_id, pin_id)
            );
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool.sqlite()).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool.sqlite(), migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply one migration and record it, atomically.
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Truncate SQL for error messages
fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

/// Check if a string contains only SQL comments
fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

/// Check if migrations are up to date
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool.sqlite()).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

/// Get the total number of migrations defined
pub fn total_migrations() -> usize {
    MIGRATIONS.len()
}

/// Get migration by version
pub fn get_migration(version: i32) -> Option<&'static Migration> {
    MIGRATIONS.iter().find(|m| m.version == version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    async fn insert_user(pool: &SqlitePool, username: &str) -> i64 {
        sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, 'x')")
            .bind(username)
            .bind(format!("{}@example.com", username))
            .execute(pool)
            .await
            .unwrap()
            .last_insert_rowid()
    }

    #[tokio::test]
    async fn test_run_migrations() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.unwrap();
        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_user_gender_constraint() {
        let pool = migrated_pool().await;
        let result = sqlx::query(
            "INSERT INTO users (username, email, password_hash, gender) VALUES ('a', 'a@x.io', 'x', 'Q')",
        )
        .execute(pool.sqlite())
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_follow_pair_is_unique_and_not_reflexive() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite();
        let a = insert_user(sqlite, "alice").await;
        let b = insert_user(sqlite, "bob").await;

        let insert = "INSERT INTO user_follows (follower_id, followed_id) VALUES (?, ?)";
        sqlx::query(insert).bind(a).bind(b).execute(sqlite).await.unwrap();
        assert!(sqlx::query(insert).bind(a).bind(b).execute(sqlite).await.is_err());
        assert!(sqlx::query(insert).bind(a).bind(a).execute(sqlite).await.is_err());
        // The relation is asymmetric, so the reverse edge is a different row.
        sqlx::query(insert).bind(b).bind(a).execute(sqlite).await.unwrap();
    }

    #[tokio::test]
    async fn test_saved_pin_and_board_uniqueness() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite();
        let user = insert_user(sqlite, "carol").await;
        let pin = sqlx::query("INSERT INTO pins (user_id, title, pin_file) VALUES (?, 'T', 'f.png')")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap()
            .last_insert_rowid();

        let save = "INSERT INTO saved_pins (user_id, pin_id) VALUES (?, ?)";
        sqlx::query(save).bind(user).bind(pin).execute(sqlite).await.unwrap();
        assert!(sqlx::query(save).bind(user).bind(pin).execute(sqlite).await.is_err());

        let board = "INSERT INTO boards (user_id, name) VALUES (?, 'Travel')";
        sqlx::query(board).bind(user).execute(sqlite).await.unwrap();
        assert!(sqlx::query(board).bind(user).execute(sqlite).await.is_err());
    }

    #[tokio::test]
    async fn test_user_delete_cascades() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite();
        let user = insert_user(sqlite, "dave").await;
        sqlx::query("INSERT INTO pins (user_id, title, pin_file) VALUES (?, 'T', 'f.png')")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap();

        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(user)
            .execute(sqlite)
            .await
            .unwrap();

        let count: i64 = sqlx::query("SELECT COUNT(*) FROM pins")
            .fetch_one(sqlite)
            .await
            .unwrap()
            .get(0);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_get_migration() {
        assert_eq!(get_migration(1).map(|m| m.name), Some("create_users"));
        assert!(get_migration(999).is_none());
        assert_eq!(total_migrations(), 8);
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT); CREATE TABLE b (id INT);";
        assert_eq!(split_sql_statements(sql).len(), 2);

        let sql_with_comments = "-- Comment\nCREATE TABLE a (id INT);\n-- trailing";
        assert_eq!(split_sql_statements(sql_with_comments).len(), 1);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- This is a comment"));
        assert!(is_comment_only("-- Line 1\n-- Line 2"));
        assert!(!is_comment_only("CREATE TABLE test"));
        assert!(!is_comment_only("-- Comment\nCREATE TABLE test"));
    }
}
