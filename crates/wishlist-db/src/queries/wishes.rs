use anyhow::Result;
use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::files::delete_if_unreferenced;
use super::{OptionalExt, placeholders};
use crate::Database;
use crate::models::{BookingRow, WishChanges, WishRow};

const WISH_COLUMNS: &str = "id, account_id, title, description, avatar_id, created_at, updated_at";

fn wish_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<WishRow> {
    Ok(WishRow {
        id: row.get(0)?,
        account_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        avatar_id: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn booking_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BookingRow> {
    Ok(BookingRow {
        id: row.get(0)?,
        wish_id: row.get(1)?,
        account_id: row.get(2)?,
        created_at: row.get(3)?,
    })
}

impl Database {
    // -- Wishes --

    pub fn create_wish(
        &self,
        account_id: i64,
        title: &str,
        description: &str,
        avatar_id: Option<Uuid>,
    ) -> Result<WishRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO wishes (account_id, title, description, avatar_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                params![account_id, title, description, avatar_id, now],
            )?;
            Ok(WishRow {
                id: conn.last_insert_rowid(),
                account_id,
                title: title.to_string(),
                description: description.to_string(),
                avatar_id,
                created_at: now,
                updated_at: now,
            })
        })
    }

    pub fn get_wish(&self, id: i64) -> Result<Option<WishRow>> {
        self.with_conn(|conn| query_wish(conn, id))
    }

    /// Newest first.
    pub fn list_wishes(&self, account_id: i64) -> Result<Vec<WishRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {WISH_COLUMNS} FROM wishes WHERE account_id = ?1 ORDER BY created_at DESC, id DESC"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([account_id], wish_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Applies `changes`. Returns the updated wish plus the id of the
    /// replaced avatar when its file row was dropped.
    pub fn update_wish(
        &self,
        id: i64,
        changes: &WishChanges,
    ) -> Result<Option<(WishRow, Option<Uuid>)>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let Some(current) = query_wish(&tx, id)? else {
                return Ok(None);
            };

            let avatar_id = changes.avatar_id.unwrap_or(current.avatar_id);
            tx.execute(
                "UPDATE wishes
                 SET title = COALESCE(?2, title),
                     description = COALESCE(?3, description),
                     avatar_id = ?4,
                     updated_at = ?5
                 WHERE id = ?1",
                params![id, changes.title, changes.description, avatar_id, Utc::now()],
            )?;

            let mut replaced = None;
            if let Some(old) = current.avatar_id.filter(|old| Some(*old) != avatar_id) {
                if delete_if_unreferenced(&tx, old)? {
                    replaced = Some(old);
                }
            }

            let wish = query_wish(&tx, id)?
                .ok_or_else(|| anyhow::anyhow!("wish {} vanished mid-update", id))?;
            tx.commit()?;
            Ok(Some((wish, replaced)))
        })
    }

    /// Deletes the wish (its booking goes with it) and its avatar file row.
    /// Returns the avatar id when that row was dropped.
    pub fn delete_wish(&self, id: i64) -> Result<Option<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let avatar: Option<Uuid> = tx
                .query_row("SELECT avatar_id FROM wishes WHERE id = ?1", [id], |row| row.get(0))
                .optional()?
                .flatten();

            tx.execute("DELETE FROM wishes WHERE id = ?1", [id])?;

            let removed = match avatar {
                Some(file_id) if delete_if_unreferenced(&tx, file_id)? => Some(file_id),
                _ => None,
            };

            tx.commit()?;
            Ok(removed)
        })
    }

    // -- Bookings --

    pub fn get_booking(&self, wish_id: i64) -> Result<Option<BookingRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, wish_id, account_id, created_at FROM wish_bookings WHERE wish_id = ?1",
                [wish_id],
                booking_from_row,
            )
            .optional()
        })
    }

    /// Batch-fetch bookings for a set of wish IDs.
    pub fn get_bookings_for_wishes(&self, wish_ids: &[i64]) -> Result<Vec<BookingRow>> {
        if wish_ids.is_empty() {
            return Ok(vec![]);
        }

        self.with_conn(|conn| {
            let sql = format!(
                "SELECT id, wish_id, account_id, created_at FROM wish_bookings WHERE wish_id IN ({})",
                placeholders(wish_ids.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params_from_iter(wish_ids.iter()), booking_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn create_booking(&self, wish_id: i64, account_id: i64) -> Result<BookingRow> {
        self.with_conn(|conn| {
            let now = Utc::now();
            conn.execute(
                "INSERT INTO wish_bookings (wish_id, account_id, created_at) VALUES (?1, ?2, ?3)",
                params![wish_id, account_id, now],
            )?;
            Ok(BookingRow {
                id: conn.last_insert_rowid(),
                wish_id,
                account_id,
                created_at: now,
            })
        })
    }

    pub fn delete_booking(&self, wish_id: i64) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM wish_bookings WHERE wish_id = ?1", [wish_id])?;
            Ok(deleted > 0)
        })
    }
}

fn query_wish(conn: &Connection, id: i64) -> Result<Option<WishRow>> {
    let sql = format!("SELECT {WISH_COLUMNS} FROM wishes WHERE id = ?1");
    conn.query_row(&sql, [id], wish_from_row).optional()
}
