use std::fmt::Write;

use chrono::{SecondsFormat, Utc};
use rusqlite::{OptionalExtension, params};
use sha2::{Digest, Sha256};

use crate::Db;
use crate::error::{DbError, Result};
use crate::types::StoredDocument;

impl Db {
    pub fn get_document(&self, id: &str) -> Result<Option<StoredDocument>> {
        self.conn
            .query_row(
                r#"
                SELECT id, rev, body, updated_at
                FROM document
                WHERE id = ?1
                "#,
                params![id],
                |row| {
                    Ok(StoredDocument {
                        id: row.get(0)?,
                        rev: row.get(1)?,
                        body: row.get(2)?,
                        updated_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)
    }

    /// Writes `body` under `id` if the stored revision still equals
    /// `expected_rev` (`None` meaning the document must not exist yet).
    /// Returns the new revision.
    pub fn put_document(
        &mut self,
        id: &str,
        body: &str,
        expected_rev: Option<&str>,
    ) -> Result<String> {
        let tx = self.conn.transaction()?;
        let current: Option<String> = tx
            .query_row(
                "SELECT rev FROM document WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        if current.as_deref() != expected_rev {
            return Err(DbError::Conflict {
                id: id.to_string(),
                expected: expected_rev.map(str::to_string),
                actual: current,
            });
        }
        let generation = current.as_deref().and_then(rev_generation).unwrap_or(0) + 1;
        let rev = format!("{}-{}", generation, body_digest(body));
        tx.execute(
            r#"
            INSERT INTO document (id, rev, body, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
              rev = excluded.rev,
              body = excluded.body,
              updated_at = excluded.updated_at
            "#,
            params![
                id,
                rev,
                body,
                Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
            ],
        )?;
        tx.commit()?;
        Ok(rev)
    }
}

fn rev_generation(rev: &str) -> Option<u64> {
    rev.split_once('-')
        .and_then(|(generation, _)| generation.parse().ok())
}

fn body_digest(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    let mut out = String::with_capacity(32);
    for byte in &digest[..16] {
        let _ = write!(&mut out, "{:02x}", byte);
    }
    out
}
