use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

const V1_INITIAL: &str = "
    CREATE TABLE accounts (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        email       TEXT NOT NULL UNIQUE,
        login       TEXT NOT NULL UNIQUE,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE password_hashes (
        account_id  INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        hash        BLOB NOT NULL
    );

    CREATE TABLE sessions (
        id          BLOB PRIMARY KEY,
        account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE INDEX idx_sessions_account ON sessions(account_id);

    CREATE TABLE files (
        id          BLOB PRIMARY KEY,
        extension   TEXT NOT NULL,
        mime_type   TEXT NOT NULL,
        size        INTEGER NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE TABLE profiles (
        account_id  INTEGER PRIMARY KEY REFERENCES accounts(id) ON DELETE CASCADE,
        name        TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        avatar_id   BLOB REFERENCES files(id) ON DELETE SET NULL
    );

    CREATE TABLE friendships (
        account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        friend_id   INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL,
        PRIMARY KEY (account_id, friend_id),
        CHECK (account_id <> friend_id)
    );

    CREATE TABLE friendship_requests (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        sender_id   INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        receiver_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        status      TEXT NOT NULL DEFAULT 'pending',
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        UNIQUE (sender_id, receiver_id),
        CHECK (sender_id <> receiver_id)
    );

    CREATE INDEX idx_friendship_requests_receiver ON friendship_requests(receiver_id);

    CREATE TABLE wishes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        title       TEXT NOT NULL,
        description TEXT NOT NULL DEFAULT '',
        avatar_id   BLOB REFERENCES files(id) ON DELETE SET NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    );

    CREATE INDEX idx_wishes_account ON wishes(account_id, created_at);

    CREATE TABLE wish_bookings (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        wish_id     INTEGER NOT NULL UNIQUE REFERENCES wishes(id) ON DELETE CASCADE,
        account_id  INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
        created_at  TEXT NOT NULL
    );
";

/// Uploads remember who made them; only the uploader may attach a file.
/// Rows from before this step have no owner.
const V2_FILE_OWNERS: &str = "
    ALTER TABLE files ADD COLUMN owner_id INTEGER REFERENCES accounts(id) ON DELETE CASCADE;

    CREATE INDEX idx_files_owner ON files(owner_id);
";

/// Ordered schema steps. Index + 1 is the version number recorded in
/// `schema_version`; append only.
const MIGRATIONS: &[&str] = &[V1_INITIAL, V2_FILE_OWNERS];

pub fn run(conn: &mut Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let current: i64 =
        conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    for (idx, sql) in MIGRATIONS.iter().enumerate() {
        let version = idx as i64 + 1;
        if version <= current {
            continue;
        }

        info!("Running migration v{}", version);
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
        tx.commit()?;
    }

    info!("Database migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_idempotent() {
        let mut conn = Connection::open_in_memory().unwrap();
        run(&mut conn).unwrap();
        run(&mut conn).unwrap();

        let version: i64 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |r| r.get(0))
            .unwrap();
        assert_eq!(version, MIGRATIONS.len() as i64);
    }

    #[test]
    fn reopening_a_file_database_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wishlist.db");

        {
            let db = crate::Database::open(&path).unwrap();
            db.create_account("ann@example.com", "ann", b"hash", uuid::Uuid::new_v4())
                .unwrap();
        }

        let db = crate::Database::open(&path).unwrap();
        assert!(db.get_account_by_identifier("ann").unwrap().is_some());
    }
}
