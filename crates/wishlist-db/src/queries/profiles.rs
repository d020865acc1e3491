use anyhow::Result;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::OptionalExt;
use super::files::delete_if_unreferenced;
use crate::Database;
use crate::models::{ProfileChanges, ProfileRow};

pub(super) const PROFILE_SELECT: &str =
    "SELECT p.account_id, a.login, p.name, p.description, p.avatar_id
     FROM profiles p JOIN accounts a ON a.id = p.account_id";

pub(super) fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRow> {
    Ok(ProfileRow {
        account_id: row.get(0)?,
        login: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        avatar_id: row.get(4)?,
    })
}

impl Database {
    pub fn get_profile(&self, account_id: i64) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| query_profile(conn, account_id))
    }

    /// Applies `changes` and returns the updated profile plus the id of the
    /// replaced avatar when its file row was dropped.
    pub fn update_profile(
        &self,
        account_id: i64,
        changes: &ProfileChanges,
    ) -> Result<Option<(ProfileRow, Option<Uuid>)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let previous: Option<Option<Uuid>> = tx
                .query_row(
                    "SELECT avatar_id FROM profiles WHERE account_id = ?1",
                    [account_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(previous) = previous else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE profiles
                 SET name = COALESCE(?2, name),
                     description = COALESCE(?3, description)
                 WHERE account_id = ?1",
                params![account_id, changes.name, changes.description],
            )?;

            let mut replaced = None;
            if let Some(avatar) = changes.avatar_id {
                tx.execute(
                    "UPDATE profiles SET avatar_id = ?2 WHERE account_id = ?1",
                    params![account_id, avatar],
                )?;
                if let Some(old) = previous.filter(|old| Some(*old) != avatar) {
                    if delete_if_unreferenced(&tx, old)? {
                        replaced = Some(old);
                    }
                }
            }

            let profile = query_profile(&tx, account_id)?
                .ok_or_else(|| anyhow::anyhow!("profile {} vanished mid-update", account_id))?;
            tx.commit()?;
            Ok(Some((profile, replaced)))
        })
    }

    /// Profiles whose login starts with `prefix`, ordered by login.
    pub fn search_profiles(&self, prefix: &str, limit: u32) -> Result<Vec<ProfileRow>> {
        let pattern = format!("{}%", escape_like(prefix));
        self.with_conn(|conn| {
            let sql = format!("{PROFILE_SELECT} WHERE a.login LIKE ?1 ESCAPE '\\' ORDER BY a.login LIMIT ?2");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![pattern, limit], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_profile(conn: &Connection, account_id: i64) -> Result<Option<ProfileRow>> {
    let sql = format!("{PROFILE_SELECT} WHERE p.account_id = ?1");
    conn.query_row(&sql, [account_id], profile_from_row).optional()
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, db, sample_file};
    use super::escape_like;
    use crate::models::ProfileChanges;

    #[test]
    fn update_changes_only_given_fields() {
        let db = db();
        let ann = account(&db, "ann");
        let changes = ProfileChanges {
            description: Some("likes bikes".into()),
            ..Default::default()
        };
        let (profile, replaced) = db.update_profile(ann.id, &changes).unwrap().unwrap();
        assert_eq!(profile.name, "ann");
        assert_eq!(profile.description, "likes bikes");
        assert!(replaced.is_none());
    }

    #[test]
    fn replacing_avatar_drops_old_file() {
        let db = db();
        let ann = account(&db, "ann");
        let first = sample_file();
        let second = sample_file();
        db.insert_file(&first).unwrap();
        db.insert_file(&second).unwrap();

        let set_first = ProfileChanges {
            avatar_id: Some(Some(first.id)),
            ..Default::default()
        };
        db.update_profile(ann.id, &set_first).unwrap();

        let set_second = ProfileChanges {
            avatar_id: Some(Some(second.id)),
            ..Default::default()
        };
        let (profile, replaced) = db.update_profile(ann.id, &set_second).unwrap().unwrap();
        assert_eq!(profile.avatar_id, Some(second.id));
        assert_eq!(replaced, Some(first.id));
        assert!(!db.file_exists(first.id).unwrap());

        // setting the same avatar again is a no-op for files
        let (_, replaced) = db.update_profile(ann.id, &set_second).unwrap().unwrap();
        assert!(replaced.is_none());
        assert!(db.file_exists(second.id).unwrap());
    }

    #[test]
    fn missing_profile_is_none() {
        let db = db();
        assert!(db.update_profile(404, &ProfileChanges::default()).unwrap().is_none());
        assert!(db.get_profile(404).unwrap().is_none());
    }

    #[test]
    fn search_matches_prefix_literally() {
        let db = db();
        account(&db, "ann");
        account(&db, "anna");
        account(&db, "bob");
        account(&db, "a_b");

        let logins: Vec<String> = db
            .search_profiles("ann", 10)
            .unwrap()
            .into_iter()
            .map(|p| p.login)
            .collect();
        assert_eq!(logins, vec!["ann", "anna"]);

        // '_' is not a wildcard
        let hits = db.search_profiles("a_", 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].login, "a_b");
    }

    #[test]
    fn like_escape() {
        assert_eq!(escape_like(r"50%_a\b"), r"50\%\_a\\b");
    }
}
