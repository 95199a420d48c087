use sqlx::SqlitePool;

/// In-memory pools must stay on a single connection: every SQLite `:memory:`
/// connection is its own database.
#[cfg(test)]
pub async fn mem_pool() -> SqlitePool {
    sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = mem_pool().await;
    migrate(&pool).await.unwrap();
    pool
}

pub async fn init_db(database_url: &str) -> SqlitePool {
    let pool = SqlitePool::connect(database_url)
        .await
        .expect("Failed to connect to database");
    migrate(&pool).await.expect("Failed to run schema setup");
    pool
}

/// Idempotent schema setup. The UNIQUE key on (student_id, subject_id,
/// attendance_date) is what makes concurrent check-ins race-safe; legacy rows
/// carry subject_id NULL and never collide with subject-scoped rows.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS attendance (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id      INTEGER NOT NULL,
            subject_id      INTEGER,
            attendance_date TEXT NOT NULL,
            status          TEXT NOT NULL,
            time_in         TEXT,
            time_out        TEXT,
            recorder_id     INTEGER NOT NULL,
            source          TEXT NOT NULL DEFAULT 'scan',
            remarks         TEXT NOT NULL DEFAULT '',
            UNIQUE (student_id, subject_id, attendance_date)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS notification_log (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id      INTEGER NOT NULL,
            subject_id      INTEGER,
            attendance_date TEXT NOT NULL,
            kind            TEXT NOT NULL,
            delivered       INTEGER NOT NULL,
            detail          TEXT NOT NULL DEFAULT '',
            sent_at         TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS students (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            roll       TEXT NOT NULL UNIQUE,
            full_name  TEXT NOT NULL,
            qr_token   TEXT UNIQUE,
            section_id INTEGER,
            active     INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS subjects (
            id     INTEGER PRIMARY KEY AUTOINCREMENT,
            name   TEXT NOT NULL,
            code   TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sections (
            id   INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guardians (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            student_id INTEGER NOT NULL,
            full_name  TEXT NOT NULL,
            phone      TEXT,
            is_primary INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enrolments (
            student_id INTEGER NOT NULL,
            subject_id INTEGER NOT NULL,
            PRIMARY KEY (student_id, subject_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
