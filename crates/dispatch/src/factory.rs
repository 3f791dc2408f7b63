use std::sync::Arc;

use tracing::debug;

use crate::{MessageConsumer, SessionContext, SessionHandler};

/// 5 megs by default, the protocol engine buffers incoming messages to disk
/// once the `DATA` received reaches this size.
pub const DEFAULT_DATA_DEFERRED_SIZE: usize = 1024 * 1024 * 5;

/// Produces one [`SessionHandler`] per inbound SMTP transaction.
///
/// Holds the configured consumers, in order, and the deferred size hint
/// for the protocol engine. Both are read-only once constructed, so the
/// factory can be shared between threads and `create` called concurrently.
#[derive(Clone)]
pub struct HandlerFactory {
    consumers: Arc<[Arc<dyn MessageConsumer>]>,
    deferred_size: usize,
}

impl std::fmt::Debug for HandlerFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerFactory")
            .field(
                "consumers",
                &self.consumers.iter().map(|c| c.name()).collect::<Vec<_>>(),
            )
            .field("deferred_size", &self.deferred_size)
            .finish()
    }
}

impl HandlerFactory {
    /// Creates a factory for the given consumers with the default
    /// deferred size of 5 megs.
    pub fn new(consumers: Vec<Arc<dyn MessageConsumer>>) -> Self {
        Self::with_deferred_size(consumers, DEFAULT_DATA_DEFERRED_SIZE)
    }

    /// Creates a factory with a single consumer.
    pub fn single(consumer: Arc<dyn MessageConsumer>) -> Self {
        Self::new(vec![consumer])
    }

    /// Creates a factory for the given consumers, `deferred_size` being the
    /// amount of `DATA` (in bytes) after which the protocol engine should
    /// spool the body to disk.
    pub fn with_deferred_size(
        consumers: Vec<Arc<dyn MessageConsumer>>,
        deferred_size: usize,
    ) -> Self {
        debug!(
            consumers = consumers.len(),
            deferred_size = deferred_size,
            "Handler factory initialized"
        );
        Self {
            consumers: consumers.into(),
            deferred_size,
        }
    }

    /// Creates a fresh handler for a new transaction.
    pub fn create(&self) -> SessionHandler {
        self.create_with_context(SessionContext::default())
    }

    /// Creates a fresh handler carrying the connection details of the
    /// transaction.
    pub fn create_with_context(&self, context: SessionContext) -> SessionHandler {
        SessionHandler::new(self.consumers.clone(), context)
    }

    pub fn deferred_size(&self) -> usize {
        self.deferred_size
    }

    pub fn consumers(&self) -> &[Arc<dyn MessageConsumer>] {
        &self.consumers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryConsumer, SessionState};

    #[test]
    fn test_default_deferred_size() {
        let factory = HandlerFactory::single(Arc::new(MemoryConsumer::new("memory")));
        assert_eq!(factory.deferred_size(), 5 * 1024 * 1024);
        assert_eq!(factory.consumers().len(), 1);
    }

    #[test]
    fn test_custom_deferred_size() {
        let factory =
            HandlerFactory::with_deferred_size(vec![Arc::new(MemoryConsumer::new("memory"))], 1024);
        assert_eq!(factory.deferred_size(), 1024);
    }

    #[test]
    fn test_create_independent_handlers() {
        let factory = HandlerFactory::single(Arc::new(MemoryConsumer::new("memory")));

        let mut first = factory.create();
        let second = factory.create();
        first.set_sender("s@d");

        assert_eq!(first.state(), SessionState::AwaitingRecipients);
        assert_eq!(second.state(), SessionState::AwaitingSender);
        assert_eq!(second.sender(), None);
    }

    #[test]
    fn test_create_concurrently() {
        let consumer = Arc::new(MemoryConsumer::new("memory"));
        let factory = HandlerFactory::single(consumer.clone());

        std::thread::scope(|scope| {
            for index in 0..8 {
                let factory = &factory;
                scope.spawn(move || {
                    let mut handler = factory.create();
                    handler.set_sender("s@d");
                    handler.add_recipient(&format!("u{index}@d")).unwrap();
                    let mut body: &[u8] = b"Hello";
                    handler.deliver_body(&mut body).unwrap();
                    handler.complete();
                });
            }
        });

        assert_eq!(consumer.messages().len(), 8);
    }
}
