use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};

use super::profiles::{PROFILE_SELECT, profile_from_row};
use super::{OptionalExt, status_column};
use crate::Database;
use crate::models::{FriendshipRequestRow, FriendshipRow, ProfileRow};
use wishlist_types::models::FriendshipRequestStatus;

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, status, created_at, updated_at";

fn request_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<FriendshipRequestRow> {
    Ok(FriendshipRequestRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        receiver_id: row.get(2)?,
        status: status_column(row, 3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
    })
}

impl Database {
    // -- Friendships --

    pub fn are_friends(&self, account_id: i64, other_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let friends = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM friendships WHERE account_id = ?1 AND friend_id = ?2)",
                params![account_id, other_id],
                |row| row.get(0),
            )?;
            Ok(friends)
        })
    }

    pub fn list_friends(&self, account_id: i64) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "{PROFILE_SELECT}
                 JOIN friendships f ON f.friend_id = p.account_id
                 WHERE f.account_id = ?1
                 ORDER BY a.login"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([account_id], profile_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Removes both mirrored rows. Returns false if the two were not friends.
    pub fn delete_friendship(&self, account_id: i64, friend_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM friendships
                 WHERE (account_id = ?1 AND friend_id = ?2)
                    OR (account_id = ?2 AND friend_id = ?1)",
                params![account_id, friend_id],
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Friendship requests --

    pub fn create_friendship_request(
        &self,
        sender_id: i64,
        receiver_id: i64,
    ) -> Result<FriendshipRequestRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO friendship_requests (sender_id, receiver_id, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                params![sender_id, receiver_id, FriendshipRequestStatus::Pending.as_str(), now],
            )?;
            Ok(FriendshipRequestRow {
                id: conn.last_insert_rowid(),
                sender_id,
                receiver_id,
                status: FriendshipRequestStatus::Pending,
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn get_friendship_request(&self, id: i64) -> Result<Option<FriendshipRequestRow>> {
        self.with_conn(|conn| query_request(conn, id))
    }

    /// A request between the two accounts in either direction, if any.
    pub fn find_friendship_request_between(
        &self,
        a: i64,
        b: i64,
    ) -> Result<Option<FriendshipRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friendship_requests
                 WHERE (sender_id = ?1 AND receiver_id = ?2)
                    OR (sender_id = ?2 AND receiver_id = ?1)
                 LIMIT 1"
            );
            conn.query_row(&sql, params![a, b], request_from_row).optional()
        })
    }

    /// Pending requests addressed to the account.
    pub fn incoming_friendship_requests(&self, account_id: i64) -> Result<Vec<FriendshipRequestRow>> {
        self.list_requests(
            "receiver_id = ?1 AND status = 'pending'",
            account_id,
        )
    }

    /// Every request the account has sent, whatever its status.
    pub fn outgoing_friendship_requests(&self, account_id: i64) -> Result<Vec<FriendshipRequestRow>> {
        self.list_requests("sender_id = ?1", account_id)
    }

    fn list_requests(&self, filter: &str, account_id: i64) -> Result<Vec<FriendshipRequestRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {REQUEST_COLUMNS} FROM friendship_requests WHERE {filter} ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([account_id], request_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Deletes a pending request and inserts the two mirrored friendship
    /// rows in one transaction. Returns the receiver's side of the
    /// friendship, or `None` if no pending request has that id.
    pub fn accept_friendship_request(&self, id: i64) -> Result<Option<FriendshipRow>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(request) = query_request(&tx, id)? else {
                return Ok(None);
            };
            if request.status != FriendshipRequestStatus::Pending {
                return Ok(None);
            }

            let now = Utc::now();
            tx.execute("DELETE FROM friendship_requests WHERE id = ?1", [id])?;
            tx.execute(
                "INSERT OR IGNORE INTO friendships (account_id, friend_id, created_at)
                 VALUES (?1, ?2, ?3), (?2, ?1, ?3)",
                params![request.receiver_id, request.sender_id, now],
            )?;
            tx.commit()?;

            Ok(Some(FriendshipRow {
                account_id: request.receiver_id,
                friend_id: request.sender_id,
                created_at: now,
            }))
        })
    }

    /// Marks a pending request rejected. `None` if no pending request matched.
    pub fn reject_friendship_request(&self, id: i64) -> Result<Option<FriendshipRequestRow>> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE friendship_requests SET status = ?2, updated_at = ?3
                 WHERE id = ?1 AND status = ?4",
                params![
                    id,
                    FriendshipRequestStatus::Rejected.as_str(),
                    Utc::now(),
                    FriendshipRequestStatus::Pending.as_str()
                ],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            query_request(conn, id)
        })
    }

    pub fn delete_friendship_request(&self, id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM friendship_requests WHERE id = ?1", [id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_request(conn: &Connection, id: i64) -> Result<Option<FriendshipRequestRow>> {
    let sql = format!("SELECT {REQUEST_COLUMNS} FROM friendship_requests WHERE id = ?1");
    conn.query_row(&sql, [id], request_from_row).optional()
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{account, befriend, db};
    use wishlist_types::models::FriendshipRequestStatus;

    #[test]
    fn accept_creates_mirrored_rows_and_deletes_request() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");

        let req = db.create_friendship_request(ann.id, bob.id).unwrap();
        assert_eq!(req.status, FriendshipRequestStatus::Pending);

        let friendship = db.accept_friendship_request(req.id).unwrap().unwrap();
        assert_eq!(friendship.account_id, bob.id);
        assert_eq!(friendship.friend_id, ann.id);

        assert!(db.are_friends(ann.id, bob.id).unwrap());
        assert!(db.are_friends(bob.id, ann.id).unwrap());
        assert!(db.get_friendship_request(req.id).unwrap().is_none());

        // second accept finds nothing
        assert!(db.accept_friendship_request(req.id).unwrap().is_none());
    }

    #[test]
    fn rejected_request_cannot_be_accepted() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        let req = db.create_friendship_request(ann.id, bob.id).unwrap();

        let rejected = db.reject_friendship_request(req.id).unwrap().unwrap();
        assert_eq!(rejected.status, FriendshipRequestStatus::Rejected);
        assert!(db.reject_friendship_request(req.id).unwrap().is_none());
        assert!(db.accept_friendship_request(req.id).unwrap().is_none());
        assert!(!db.are_friends(ann.id, bob.id).unwrap());

        // rejected requests leave the incoming list but stay in outgoing
        assert!(db.incoming_friendship_requests(bob.id).unwrap().is_empty());
        assert_eq!(db.outgoing_friendship_requests(ann.id).unwrap().len(), 1);
    }

    #[test]
    fn pair_is_unique_and_self_requests_fail() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        db.create_friendship_request(ann.id, bob.id).unwrap();

        assert!(db.create_friendship_request(ann.id, bob.id).is_err());
        assert!(db.create_friendship_request(ann.id, ann.id).is_err());

        let found = db.find_friendship_request_between(bob.id, ann.id).unwrap().unwrap();
        assert_eq!(found.sender_id, ann.id);
    }

    #[test]
    fn unfriending_removes_both_rows() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        befriend(&db, ann.id, bob.id);

        assert_eq!(db.list_friends(ann.id).unwrap()[0].login, "bob");
        assert!(db.delete_friendship(bob.id, ann.id).unwrap());
        assert!(!db.are_friends(ann.id, bob.id).unwrap());
        assert!(!db.are_friends(bob.id, ann.id).unwrap());
        assert!(!db.delete_friendship(ann.id, bob.id).unwrap());
    }

    #[test]
    fn cancelled_request_frees_the_pair() {
        let db = db();
        let ann = account(&db, "ann");
        let bob = account(&db, "bob");
        let req = db.create_friendship_request(ann.id, bob.id).unwrap();

        assert!(db.delete_friendship_request(req.id).unwrap());
        assert!(!db.delete_friendship_request(req.id).unwrap());
        db.create_friendship_request(ann.id, bob.id).unwrap();
    }
}
