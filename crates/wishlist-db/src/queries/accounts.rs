use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::OptionalExt;
use super::files::delete_if_unreferenced;
use super::sessions::insert_session;
use crate::Database;
use crate::models::{AccountRow, SessionRow};

const ACCOUNT_COLUMNS: &str = "id, email, login, created_at, updated_at";

impl Database {
    /// Creates the account together with its password hash, a default
    /// profile named after the login, and the first session.
    pub fn create_account(
        &self,
        email: &str,
        login: &str,
        password_hash: &[u8],
        session_id: Uuid,
    ) -> Result<(AccountRow, SessionRow)> {
        self.with_conn_mut(|conn| {
            let now = Utc::now();
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT INTO accounts (email, login, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
                params![email, login, now],
            )?;
            let id = tx.last_insert_rowid();

            tx.execute(
                "INSERT INTO password_hashes (account_id, hash) VALUES (?1, ?2)",
                params![id, password_hash],
            )?;
            tx.execute(
                "INSERT INTO profiles (account_id, name) VALUES (?1, ?2)",
                params![id, login],
            )?;
            let session = insert_session(&tx, id, session_id)?;

            tx.commit()?;

            let account = AccountRow {
                id,
                email: email.to_string(),
                login: login.to_string(),
                created_at: now,
                updated_at: now,
            };
            Ok((account, session))
        })
    }

    pub fn get_account(&self, id: i64) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id = ?1", &id))
    }

    /// Looks an account up by login, or by email (case-insensitively).
    pub fn get_account_by_identifier(&self, identifier: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "login = ?1 OR email = lower(?1)", &identifier))
    }

    pub fn email_taken(&self, email: &str, except: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM accounts WHERE email = ?1 AND id IS NOT ?2)",
                params![email, except],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn login_taken(&self, login: &str, except: Option<i64>) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM accounts WHERE login = ?1 AND id IS NOT ?2)",
                params![login, except],
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn update_account(
        &self,
        id: i64,
        email: Option<&str>,
        login: Option<&str>,
    ) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE accounts
                 SET email = COALESCE(?2, email),
                     login = COALESCE(?3, login),
                     updated_at = ?4
                 WHERE id = ?1",
                params![id, email, login, Utc::now()],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_account(conn, "id = ?1", &id)
        })
    }

    pub fn get_password_hash(&self, account_id: i64) -> Result<Option<Vec<u8>>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT hash FROM password_hashes WHERE account_id = ?1",
                [account_id],
                |row| row.get(0),
            )
            .optional()
        })
    }

    /// Replaces the password hash and signs out every session except `keep`.
    pub fn set_password_hash(&self, account_id: i64, hash: &[u8], keep: Uuid) -> Result<usize> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE password_hashes SET hash = ?2 WHERE account_id = ?1",
                params![account_id, hash],
            )?;
            tx.execute(
                "UPDATE accounts SET updated_at = ?2 WHERE id = ?1",
                params![account_id, Utc::now()],
            )?;
            let revoked = tx.execute(
                "DELETE FROM sessions WHERE account_id = ?1 AND id <> ?2",
                params![account_id, keep],
            )?;
            tx.commit()?;
            Ok(revoked)
        })
    }

    /// Deletes the account and everything hanging off it, its uploads
    /// included. Returns the ids of every file row removed so their blobs
    /// can go too.
    pub fn delete_account(&self, id: i64) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            // owned rows go with the account through the cascade
            let mut removed: Vec<Uuid> = {
                let mut stmt = tx.prepare("SELECT id FROM files WHERE owner_id = ?1")?;
                stmt.query_map([id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let avatars: Vec<Uuid> = {
                let mut stmt = tx.prepare(
                    "SELECT avatar_id FROM wishes WHERE account_id = ?1 AND avatar_id IS NOT NULL
                     UNION
                     SELECT avatar_id FROM profiles WHERE account_id = ?1 AND avatar_id IS NOT NULL",
                )?;
                stmt.query_map([id], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            tx.execute("DELETE FROM accounts WHERE id = ?1", [id])?;

            for file_id in avatars {
                if delete_if_unreferenced(&tx, file_id)? {
                    removed.push(file_id);
                }
            }

            tx.commit()?;
            Ok(removed)
        })
    }
}

fn query_account(
    conn: &Connection,
    filter: &str,
    param: &dyn rusqlite::ToSql,
) -> Result<Option<AccountRow>> {
    let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {filter}");
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([param], |row| {
        Ok(AccountRow {
            id: row.get(0)?,
            email: row.get(1)?,
            login: row.get(2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
        })
    })
    .optional()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, befriend, db, sample_file};
    use crate::models::{FileRow, WishChanges};
    use uuid::Uuid;

    #[test]
    fn create_account_seeds_profile_and_session() {
        let db = db();
        let session_id = Uuid::new_v4();
        let (acc, session) = db
            .create_account("ann@example.com", "ann", b"hash", session_id)
            .unwrap();

        assert_eq!(session.id, session_id);
        assert!(db.session_exists(session_id, acc.id).unwrap());

        let profile = db.get_profile(acc.id).unwrap().unwrap();
        assert_eq!(profile.name, "ann");
        assert_eq!(profile.login, "ann");
        assert_eq!(db.get_password_hash(acc.id).unwrap().unwrap(), b"hash");
    }

    #[test]
    fn duplicate_login_is_a_constraint_violation() {
        let db = db();
        account(&db, "ann");
        let err = db
            .create_account("other@example.com", "ann", b"hash", Uuid::new_v4())
            .unwrap_err();
        let sqlite = err.downcast_ref::<rusqlite::Error>().unwrap();
        assert_eq!(
            sqlite.sqlite_error_code(),
            Some(rusqlite::ErrorCode::ConstraintViolation)
        );
    }

    #[test]
    fn identifier_matches_login_or_email() {
        let db = db();
        let acc = account(&db, "ann");
        assert_eq!(db.get_account_by_identifier("ann").unwrap().unwrap().id, acc.id);
        assert_eq!(
            db.get_account_by_identifier("ANN@example.com").unwrap().unwrap().id,
            acc.id
        );
        assert!(db.get_account_by_identifier("bob").unwrap().is_none());
    }

    #[test]
    fn taken_checks_ignore_the_caller() {
        let db = db();
        let ann = account(&db, "ann");
        assert!(db.login_taken("ann", None).unwrap());
        assert!(!db.login_taken("ann", Some(ann.id)).unwrap());
        assert!(db.email_taken("ann@example.com", None).unwrap());
        assert!(!db.email_taken("ann@example.com", Some(ann.id)).unwrap());
    }

    #[test]
    fn update_account_keeps_unset_columns() {
        let db = db();
        let ann = account(&db, "ann");
        let updated = db.update_account(ann.id, None, Some("annie")).unwrap().unwrap();
        assert_eq!(updated.login, "annie");
        assert_eq!(updated.email, "ann@example.com");
        assert!(db.update_account(9999, None, Some("x")).unwrap().is_none());
    }

    #[test]
    fn password_change_revokes_other_sessions() {
        let db = db();
        let ann = account(&db, "ann");
        let keep = Uuid::new_v4();
        db.create_session(ann.id, keep).unwrap();

        let revoked = db.set_password_hash(ann.id, b"new", keep).unwrap();
        assert_eq!(revoked, 1);
        assert_eq!(db.list_sessions(ann.id).unwrap().len(), 1);
        assert_eq!(db.get_password_hash(ann.id).unwrap().unwrap(), b"new");
    }

    #[test]
    fn delete_account_cascades() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        befriend(&db, ann.id, bob.id);

        let file = sample_file();
        db.insert_file(&file).unwrap();
        let wish = db.create_wish(ann.id, "Bike", "", Some(file.id)).unwrap();
        db.create_booking(wish.id, bob.id).unwrap();

        let removed = db.delete_account(ann.id).unwrap();
        assert_eq!(removed, vec![file.id]);
        assert!(db.get_account(ann.id).unwrap().is_none());
        assert!(db.get_file(file.id).unwrap().is_none());
        assert!(db.get_wish(wish.id).unwrap().is_none());
        assert!(db.list_friends(bob.id).unwrap().is_empty());
        assert!(db.update_wish(wish.id, &WishChanges::default()).unwrap().is_none());
    }

    #[test]
    fn delete_account_takes_unattached_uploads() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        let mine = FileRow {
            owner_id: Some(ann.id),
            ..sample_file()
        };
        let theirs = FileRow {
            owner_id: Some(bob.id),
            ..sample_file()
        };
        db.insert_file(&mine).unwrap();
        db.insert_file(&theirs).unwrap();

        let removed = db.delete_account(ann.id).unwrap();
        assert_eq!(removed, vec![mine.id]);
        assert!(!db.file_exists(mine.id).unwrap());
        assert!(db.file_exists(theirs.id).unwrap());
    }
}
