//! The capability interface every delivery destination implements.
//!
//! A [`MessageConsumer`] is asked per `(sender, recipient)` pair whether it
//! wants a message and, if it was chosen for the transaction, receives the
//! body stream exactly once.

use std::io::{self, Read};

use thiserror::Error;

/// Result type for consumer delivery operations.
pub type DeliveryResult<T> = Result<T, DeliveryError>;

/// Errors that can occur while a consumer takes delivery of a body.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The body stream was larger than what the consumer can buffer.
    #[error("Message exceeds the limit of {limit} bytes")]
    TooMuchData { limit: u64 },

    /// An I/O error occurred while reading the body or writing it out.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The backing storage of the consumer failed.
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Trait for the destinations a message may be dispatched to.
///
/// Implementations are shared between every in-flight transaction, so they
/// must be `Send + Sync` and take care of their own interior locking.
pub trait MessageConsumer: Send + Sync {
    /// Decides whether this consumer wants mail from `sender` to `recipient`.
    ///
    /// Expected to be a pure decision without side effects.
    fn accepts(&self, sender: &str, recipient: &str) -> bool;

    /// Takes delivery of the message body for the given envelope pair.
    fn deliver(&self, sender: &str, recipient: &str, body: &mut dyn Read) -> DeliveryResult<()>;

    /// Returns the name of this consumer, used in logs.
    fn name(&self) -> &str;
}

/// Reads the whole body into memory, failing once more than `limit` bytes
/// are available in the stream.
pub fn read_limited(body: &mut dyn Read, limit: Option<u64>) -> DeliveryResult<Vec<u8>> {
    let mut buffer = Vec::new();
    match limit {
        Some(limit) => {
            body.take(limit.saturating_add(1)).read_to_end(&mut buffer)?;
            if buffer.len() as u64 > limit {
                return Err(DeliveryError::TooMuchData { limit });
            }
        }
        None => {
            body.read_to_end(&mut buffer)?;
        }
    }
    Ok(buffer)
}
