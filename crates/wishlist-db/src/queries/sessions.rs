use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::Database;
use crate::models::SessionRow;

impl Database {
    pub fn create_session(&self, account_id: i64, id: Uuid) -> Result<SessionRow> {
        self.with_conn(|conn| insert_session(conn, account_id, id))
    }

    /// The token check: a session is valid only while its row exists and
    /// belongs to the account named in the token.
    pub fn session_exists(&self, id: Uuid, account_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM sessions WHERE id = ?1 AND account_id = ?2)",
                params![id, account_id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn list_sessions(&self, account_id: i64) -> Result<Vec<SessionRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, account_id, created_at, updated_at
                 FROM sessions WHERE account_id = ?1
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([account_id], |row| {
                    Ok(SessionRow {
                        id: row.get(0)?,
                        account_id: row.get(1)?,
                        created_at: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Returns false when no session with that id belongs to the account.
    pub fn delete_session(&self, id: Uuid, account_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE id = ?1 AND account_id = ?2",
                params![id, account_id],
            )?;
            Ok(deleted > 0)
        })
    }

    pub fn delete_other_sessions(&self, account_id: i64, keep: Uuid) -> Result<usize> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM sessions WHERE account_id = ?1 AND id <> ?2",
                params![account_id, keep],
            )?;
            Ok(deleted)
        })
    }
}

pub(super) fn insert_session(conn: &Connection, account_id: i64, id: Uuid) -> Result<SessionRow> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO sessions (id, account_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        params![id, account_id, now],
    )?;
    Ok(SessionRow {
        id,
        account_id,
        created_at: now,
        updated_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, db};
    use uuid::Uuid;

    #[test]
    fn session_is_bound_to_its_account() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        let id = Uuid::new_v4();
        db.create_session(ann.id, id).unwrap();

        assert!(db.session_exists(id, ann.id).unwrap());
        assert!(!db.session_exists(id, bob.id).unwrap());
        assert!(!db.delete_session(id, bob.id).unwrap());
        assert!(db.delete_session(id, ann.id).unwrap());
        assert!(!db.session_exists(id, ann.id).unwrap());
    }

    #[test]
    fn delete_other_sessions_keeps_current() {
        let db = db();
        let ann = account(&db, "ann");
        let keep = Uuid::new_v4();
        db.create_session(ann.id, keep).unwrap();
        db.create_session(ann.id, Uuid::new_v4()).unwrap();

        // one from sign-up plus the extra
        assert_eq!(db.delete_other_sessions(ann.id, keep).unwrap(), 2);
        let left = db.list_sessions(ann.id).unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].id, keep);
    }
}
