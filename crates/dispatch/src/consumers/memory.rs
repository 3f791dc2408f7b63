use std::{
    io::Read,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::debug;

use crate::{
    consumer::{read_limited, DeliveryResult, MessageConsumer},
    AddressFilter,
};

/// A message as handed over to a [`MemoryConsumer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredMessage {
    pub from: String,
    pub to: String,
    pub body: Vec<u8>,
}

/// Consumer keeping every delivered message in memory.
#[derive(Debug)]
pub struct MemoryConsumer {
    name: String,
    filter: AddressFilter,
    max_size: Option<u64>,
    messages: Mutex<Vec<StoredMessage>>,
}

impl MemoryConsumer {
    /// Creates a consumer accepting every recipient.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_filter(name, AddressFilter::any())
    }

    /// Creates a consumer accepting only recipients matched by `filter`.
    pub fn with_filter(name: impl Into<String>, filter: AddressFilter) -> Self {
        Self {
            name: name.into(),
            filter,
            max_size: None,
            messages: Mutex::new(Vec::new()),
        }
    }

    /// Limits the size (in bytes) of the bodies this consumer buffers.
    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Returns a snapshot of the delivered messages, in delivery order.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredMessage>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageConsumer for MemoryConsumer {
    fn accepts(&self, _sender: &str, recipient: &str) -> bool {
        self.filter.matches(recipient)
    }

    fn deliver(&self, sender: &str, recipient: &str, body: &mut dyn Read) -> DeliveryResult<()> {
        let body = read_limited(body, self.max_size)?;
        debug!(
            consumer = %self.name,
            from = %sender,
            to = %recipient,
            size = body.len(),
            "Stored email in memory"
        );
        self.lock().push(StoredMessage {
            from: sender.to_string(),
            to: recipient.to_string(),
            body,
        });
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AddressRule, DeliveryError, MatchType};

    #[test]
    fn test_memory_consumer_deliver() {
        let consumer = MemoryConsumer::new("memory");
        let mut body: &[u8] = b"Hello";
        consumer.deliver("s@d", "u@d", &mut body).unwrap();

        assert_eq!(
            consumer.messages(),
            vec![StoredMessage {
                from: "s@d".to_string(),
                to: "u@d".to_string(),
                body: b"Hello".to_vec(),
            }]
        );
        assert_eq!(consumer.name(), "memory");
    }

    #[test]
    fn test_memory_consumer_filter() {
        let consumer = MemoryConsumer::with_filter(
            "example",
            AddressFilter::new(vec![AddressRule::new(MatchType::Domain, "example.com")]),
        );
        assert!(consumer.accepts("anyone@else.org", "user@example.com"));
        assert!(!consumer.accepts("anyone@else.org", "user@other.com"));
    }

    #[test]
    fn test_memory_consumer_max_size() {
        let consumer = MemoryConsumer::new("memory").with_max_size(Some(4));
        let mut body: &[u8] = b"Hello";
        let result = consumer.deliver("s@d", "u@d", &mut body);
        assert!(matches!(
            result,
            Err(DeliveryError::TooMuchData { limit: 4 })
        ));
        assert!(consumer.messages().is_empty());
    }
}
