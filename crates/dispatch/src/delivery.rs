use std::{fmt, sync::Arc};

use crate::MessageConsumer;

/// One accepted pairing of a consumer with a recipient address.
///
/// Created when a recipient is accepted and never changed afterwards.
#[derive(Clone)]
pub struct Delivery {
    consumer: Arc<dyn MessageConsumer>,
    recipient: String,
}

impl Delivery {
    pub fn new(consumer: Arc<dyn MessageConsumer>, recipient: impl Into<String>) -> Self {
        Self {
            consumer,
            recipient: recipient.into(),
        }
    }

    pub fn consumer(&self) -> &Arc<dyn MessageConsumer> {
        &self.consumer
    }

    pub fn recipient(&self) -> &str {
        &self.recipient
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("consumer", &self.consumer.name())
            .field("recipient", &self.recipient)
            .finish()
    }
}
