use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};

/// Index entry written for every stored message.
#[derive(Debug, Clone)]
pub struct EmailMetadata {
    pub message_id: String,
    pub sender: String,
    pub recipient: String,
    pub subject: String,
    pub path: PathBuf,
}

impl EmailMetadata {
    pub fn new(
        message_id: String,
        sender: String,
        recipient: String,
        subject: String,
        path: PathBuf,
    ) -> Self {
        Self {
            message_id,
            sender,
            recipient,
            subject,
            path,
        }
    }

    /// Inserts this entry into the SQLite database at `db`, creating the
    /// table when missing.
    pub fn store_sqlite(&self, db: impl AsRef<Path>) -> rusqlite::Result<()> {
        let conn = Connection::open(db)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (id TEXT PRIMARY KEY, sender TEXT, recipient TEXT, subject TEXT, path TEXT)",
            [],
        )?;
        conn.execute(
            "INSERT INTO metadata (id, sender, recipient, subject, path) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.message_id,
                self.sender,
                self.recipient,
                self.subject,
                self.path.to_string_lossy()
            ],
        )?;
        Ok(())
    }

    /// Loads every entry stored for `recipient`.
    pub fn load_sqlite(db: impl AsRef<Path>, recipient: &str) -> rusqlite::Result<Vec<Self>> {
        let conn = Connection::open(db)?;
        let mut statement = conn.prepare(
            "SELECT id, sender, recipient, subject, path FROM metadata WHERE recipient = ?1",
        )?;
        let rows = statement.query_map(params![recipient], |row| {
            Ok(Self {
                message_id: row.get(0)?,
                sender: row.get(1)?,
                recipient: row.get(2)?,
                subject: row.get(3)?,
                path: PathBuf::from(row.get::<_, String>(4)?),
            })
        })?;
        rows.collect()
    }
}
