use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (users, bookmarks)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id                  TEXT PRIMARY KEY,
                provider_id         TEXT NOT NULL UNIQUE,
                username            TEXT,
                name                TEXT,
                provider_email      TEXT,
                email               TEXT,
                avatar_url          TEXT,
                access_token        TEXT,
                refresh_token       TEXT,
                digest_enabled      INTEGER NOT NULL DEFAULT 1,
                digest_time         TEXT NOT NULL DEFAULT '08:00:00',
                timezone            TEXT NOT NULL DEFAULT 'UTC',
                last_sync_at        TEXT,
                last_digest_sent    TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL
            );

            CREATE TABLE bookmarks (
                id                  TEXT PRIMARY KEY,
                user_id             TEXT NOT NULL REFERENCES users(id),
                external_id         TEXT NOT NULL,
                content             TEXT NOT NULL,
                cleaned_content     TEXT NOT NULL,
                author_name         TEXT,
                author_username     TEXT,
                author_avatar_url   TEXT,
                author_verified     INTEGER NOT NULL DEFAULT 0,
                url                 TEXT,
                expanded_urls       TEXT NOT NULL DEFAULT '[]',
                media               TEXT NOT NULL DEFAULT '[]',
                metrics             TEXT NOT NULL DEFAULT '{}',
                content_type        TEXT NOT NULL DEFAULT 'tweet',
                summary             TEXT,
                category            TEXT,
                topics              TEXT NOT NULL DEFAULT '[]',
                suggested_actions   TEXT NOT NULL DEFAULT '[]',
                status              TEXT NOT NULL DEFAULT 'new',
                snooze_until        TEXT,
                processed_at        TEXT,
                posted_at           TEXT,
                created_at          TEXT NOT NULL,
                updated_at          TEXT NOT NULL,
                UNIQUE(user_id, external_id)
            );

            CREATE INDEX idx_bookmarks_user_status
                ON bookmarks(user_id, status, created_at);

            CREATE INDEX idx_bookmarks_unprocessed
                ON bookmarks(processed_at);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
