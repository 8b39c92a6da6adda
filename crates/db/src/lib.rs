mod cursor;
mod documents;
mod error;
mod migrations;
mod types;

use std::path::Path;

use rusqlite::Connection;

pub use cursor::CURSOR_DOCUMENT_ID;
pub use error::{DbError, Result};
pub use types::StoredDocument;

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "temp_store", "MEMORY")?;
        Ok(Self { conn })
    }
}
