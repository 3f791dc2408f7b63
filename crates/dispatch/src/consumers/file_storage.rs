//! Filesystem-backed message consumer.
//!
//! Provides [`FileStorageConsumer`], a [`MessageConsumer`](crate::MessageConsumer)
//! storing each delivered email as an `.eml` file under a per-recipient
//! directory, optionally indexing it in a SQLite metadata database.

use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use chrono::Utc;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    consumer::{read_limited, DeliveryError, DeliveryResult, MessageConsumer},
    is_mime_valid, parse_mime_headers, AddressFilter, EmailMetadata,
};

const METADATA_DB: &str = "metadata.db";

/// Message consumer that stores emails as files on disk.
#[derive(Debug)]
pub struct FileStorageConsumer {
    name: String,
    base_path: PathBuf,
    filter: AddressFilter,
    metadata: bool,
    max_size: Option<u64>,
}

impl FileStorageConsumer {
    /// Creates a new [`FileStorageConsumer`] rooted at `base_path`, accepting
    /// the recipients matched by `filter`.
    pub fn new(
        name: impl Into<String>,
        base_path: PathBuf,
        filter: AddressFilter,
        metadata: bool,
    ) -> Self {
        let name = name.into();
        info!(
            consumer = %name,
            path = %base_path.display(),
            metadata = metadata,
            "File storage consumer initialized"
        );
        Self {
            name,
            base_path,
            filter,
            metadata,
            max_size: None,
        }
    }

    /// Limits the size (in bytes) of the bodies this consumer stores.
    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Directory holding the messages of `recipient`.
    pub fn mailbox_path(&self, recipient: &str) -> PathBuf {
        let safe_rcpt = recipient.replace(|c: char| !c.is_ascii_alphanumeric(), "_");
        self.base_path.join(safe_rcpt)
    }

    /// Path of the SQLite metadata database.
    pub fn metadata_path(&self) -> PathBuf {
        self.base_path.join(METADATA_DB)
    }

    /// Lists the message IDs stored for `recipient`.
    pub fn list(&self, recipient: &str) -> DeliveryResult<Vec<String>> {
        let path = self.mailbox_path(recipient);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(path)? {
            let path = entry?.path();
            if path.extension().is_some_and(|ext| ext == "eml") {
                if let Some(stem) = path.file_stem() {
                    ids.push(stem.to_string_lossy().into_owned());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Reads back a stored message.
    pub fn retrieve(&self, recipient: &str, message_id: &str) -> DeliveryResult<Vec<u8>> {
        let path = self
            .mailbox_path(recipient)
            .join(format!("{message_id}.eml"));
        Ok(fs::read(path)?)
    }

    fn write_message(
        &self,
        file_path: &Path,
        sender: &str,
        recipient: &str,
        body: &[u8],
    ) -> DeliveryResult<()> {
        let mut file = File::create(file_path)?;
        if !is_mime_valid(&String::from_utf8_lossy(body)) {
            write!(file, "From: {sender}\r\n")?;
            write!(file, "To: {recipient}\r\n")?;
            write!(file, "Date: {}\r\n\r\n", Utc::now().to_rfc2822())?;
        }
        file.write_all(body)?;
        file.flush()?;
        Ok(())
    }
}

impl MessageConsumer for FileStorageConsumer {
    fn accepts(&self, _sender: &str, recipient: &str) -> bool {
        self.filter.matches(recipient)
    }

    fn deliver(&self, sender: &str, recipient: &str, body: &mut dyn Read) -> DeliveryResult<()> {
        let body = read_limited(body, self.max_size)?;

        let path = self.mailbox_path(recipient);
        fs::create_dir_all(&path)?;
        let message_id = Uuid::new_v4().to_string();
        let file_path = path.join(format!("{message_id}.eml"));
        debug!(
            consumer = %self.name,
            message_id = %message_id,
            to = %recipient,
            "Storing email to filesystem"
        );

        // the message is written under a temporary name and only renamed
        // into the mailbox once complete, a failure never leaves a listed file
        let temp_path = path.join(format!(".{message_id}.tmp"));
        let written = self
            .write_message(&temp_path, sender, recipient, &body)
            .and_then(|()| fs::rename(&temp_path, &file_path).map_err(DeliveryError::from));
        if let Err(e) = written {
            error!(
                consumer = %self.name,
                message_id = %message_id,
                error = %e,
                "Failed to store email to filesystem"
            );
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        // checks if the metadata should be stored, if so, it will
        // parse the headers and index the message in the database
        if self.metadata {
            let headers = parse_mime_headers(&String::from_utf8_lossy(&body));
            let subject = headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case("Subject"))
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            let metadata = EmailMetadata::new(
                message_id.clone(),
                sender.to_string(),
                recipient.to_string(),
                subject,
                file_path.clone(),
            );
            if let Err(e) = metadata.store_sqlite(self.metadata_path()) {
                error!(
                    consumer = %self.name,
                    message_id = %message_id,
                    error = %e,
                    "Failed to index email metadata"
                );
                let _ = fs::remove_file(&file_path);
                return Err(DeliveryError::Storage(e.to_string()));
            }
        }

        info!(
            consumer = %self.name,
            message_id = %message_id,
            from = %sender,
            to = %recipient,
            path = %file_path.display(),
            "Stored email to filesystem"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}
