use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, params};
use uuid::Uuid;

use super::OptionalExt;
use crate::Database;
use crate::models::FileRow;

impl Database {
    pub fn insert_file(&self, file: &FileRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO files (id, owner_id, extension, mime_type, size, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    file.id,
                    file.owner_id,
                    file.extension,
                    file.mime_type,
                    file.size,
                    file.created_at,
                    file.updated_at
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_file(&self, id: Uuid) -> Result<Option<FileRow>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT id, owner_id, extension, mime_type, size, created_at, updated_at
                 FROM files WHERE id = ?1",
                [id],
                |row| {
                    Ok(FileRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        extension: row.get(2)?,
                        mime_type: row.get(3)?,
                        size: row.get(4)?,
                        created_at: row.get(5)?,
                        updated_at: row.get(6)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn file_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM files WHERE id = ?1)",
                [id],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    /// Drops file rows created before `cutoff` that no profile or wish uses.
    /// Returns their ids so the blobs can be removed.
    pub fn delete_orphan_files(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;

            let candidates: Vec<Uuid> = {
                let mut stmt = tx.prepare(
                    "SELECT id FROM files f
                     WHERE created_at < ?1
                       AND NOT EXISTS (SELECT 1 FROM profiles WHERE avatar_id = f.id)
                       AND NOT EXISTS (SELECT 1 FROM wishes WHERE avatar_id = f.id)",
                )?;
                stmt.query_map([cutoff], |row| row.get(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut removed = Vec::with_capacity(candidates.len());
            for id in candidates {
                if delete_if_unreferenced(&tx, id)? {
                    removed.push(id);
                }
            }

            tx.commit()?;
            Ok(removed)
        })
    }
}

/// Drops a file row unless a profile or wish still uses it as an avatar.
/// Returns true if the row was removed.
pub(super) fn delete_if_unreferenced(conn: &Connection, id: Uuid) -> Result<bool> {
    let deleted = conn.execute(
        "DELETE FROM files WHERE id = ?1
           AND NOT EXISTS (SELECT 1 FROM profiles WHERE avatar_id = ?1)
           AND NOT EXISTS (SELECT 1 FROM wishes WHERE avatar_id = ?1)",
        [id],
    )?;
    Ok(deleted > 0)
}
