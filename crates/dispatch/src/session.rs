//! Per-transaction envelope handling.
//!
//! A [`SessionHandler`] accumulates the sender and the accepted
//! `(consumer, recipient)` pairs of one SMTP transaction and hands the body
//! to the consumer of the very first accepted pair only. Recipients expanded
//! from `Cc`/`Bcc` headers into several `RCPT TO` commands therefore produce
//! a single physical delivery instead of one per recipient.

use std::{io::Read, net::SocketAddr, sync::Arc};

use tracing::{debug, error, info, warn};

use crate::{Delivery, DispatchError, DispatchResult, MessageConsumer};

/// Phase of the transaction, mirroring the SMTP command sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingSender,
    AwaitingRecipients,
    AwaitingBody,
    Done,
}

/// Connection details the protocol engine may attach to a handler.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Address of the connecting SMTP client.
    pub peer: Option<SocketAddr>,

    /// HELO/EHLO domain presented by the client.
    pub helo: Option<String>,
}

/// Short-lived handler for a single SMTP transaction.
///
/// Not meant to be shared: the protocol engine drives it sequentially
/// through [`set_sender`](Self::set_sender), [`add_recipient`](Self::add_recipient),
/// [`deliver_body`](Self::deliver_body) and [`complete`](Self::complete).
pub struct SessionHandler {
    consumers: Arc<[Arc<dyn MessageConsumer>]>,
    context: SessionContext,
    state: SessionState,
    sender: Option<String>,
    deliveries: Vec<Delivery>,
}

impl std::fmt::Debug for SessionHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandler")
            .field("context", &self.context)
            .field("state", &self.state)
            .field("sender", &self.sender)
            .field("deliveries", &self.deliveries)
            .finish()
    }
}

impl SessionHandler {
    pub(crate) fn new(consumers: Arc<[Arc<dyn MessageConsumer>]>, context: SessionContext) -> Self {
        Self {
            consumers,
            context,
            state: SessionState::AwaitingSender,
            sender: None,
            deliveries: Vec::new(),
        }
    }

    /// Records the envelope sender, no validation is done at this layer.
    ///
    /// Ignored once the transaction is [`Done`](SessionState::Done).
    pub fn set_sender(&mut self, sender: &str) {
        if self.state == SessionState::Done {
            warn!(from = %sender, "Sender ignored, transaction already finished");
            return;
        }
        debug!(
            peer = ?self.context.peer,
            helo = ?self.context.helo,
            from = %sender,
            "Sender set"
        );
        self.sender = Some(sender.to_string());
        self.state = SessionState::AwaitingRecipients;
    }

    /// Offers a recipient to every consumer, in configuration order.
    ///
    /// Each consumer accepting the `(sender, recipient)` pair gets a
    /// [`Delivery`] appended. Fails with [`DispatchError::RecipientRejected`]
    /// when none does, leaving the accepted deliveries untouched, and with
    /// [`DispatchError::TransactionFinished`] once the transaction ended.
    pub fn add_recipient(&mut self, recipient: &str) -> DispatchResult<()> {
        if self.state == SessionState::Done {
            warn!(to = %recipient, "Recipient refused, transaction already finished");
            return Err(DispatchError::TransactionFinished);
        }
        let sender = self.sender.as_deref().unwrap_or_default();
        let accepted: Vec<Delivery> = self
            .consumers
            .iter()
            .filter(|consumer| consumer.accepts(sender, recipient))
            .map(|consumer| Delivery::new(consumer.clone(), recipient))
            .collect();

        if accepted.is_empty() {
            warn!(from = %sender, to = %recipient, "Recipient rejected by all consumers");
            return Err(DispatchError::RecipientRejected {
                recipient: recipient.to_string(),
            });
        }

        for delivery in &accepted {
            debug!(
                from = %sender,
                to = %recipient,
                consumer = delivery.consumer().name(),
                "Recipient accepted"
            );
        }
        self.deliveries.extend(accepted);
        self.state = SessionState::AwaitingBody;
        Ok(())
    }

    /// Hands the body to the consumer of the first accepted delivery, once.
    ///
    /// Every other accepted delivery is ignored. Fails with
    /// [`DispatchError::NoAcceptedRecipients`] if nothing was accepted, or
    /// with the consumer's own failure. Any call after the first one fails
    /// with [`DispatchError::TransactionFinished`].
    pub fn deliver_body(&mut self, body: &mut dyn Read) -> DispatchResult<()> {
        let sender = self.sender.clone().unwrap_or_default();
        if self.state == SessionState::Done {
            error!(from = %sender, "Body received after the transaction finished");
            return Err(DispatchError::TransactionFinished);
        }
        let Some(delivery) = self.deliveries.first() else {
            error!(from = %sender, "Body received without any accepted recipient");
            return Err(DispatchError::NoAcceptedRecipients);
        };

        let consumer = delivery.consumer();
        let recipient = delivery.recipient();
        let result = consumer.deliver(&sender, recipient, body);
        self.state = SessionState::Done;

        match result {
            Ok(()) => {
                info!(
                    from = %sender,
                    to = %recipient,
                    consumer = consumer.name(),
                    skipped = self.deliveries.len() - 1,
                    "Delivered message"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    from = %sender,
                    to = %recipient,
                    consumer = consumer.name(),
                    error = %err,
                    "Failed to deliver message"
                );
                Err(err.into())
            }
        }
    }

    /// Ends the transaction, discarding the envelope. No-op after the first call.
    pub fn complete(&mut self) {
        if self.state == SessionState::Done && self.deliveries.is_empty() {
            return;
        }
        self.sender = None;
        self.deliveries.clear();
        self.state = SessionState::Done;
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// Accepted deliveries, in recipient arrival and configuration order.
    pub fn deliveries(&self) -> &[Delivery] {
        &self.deliveries
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::{AddressFilter, AddressRule, DeliveryError, MatchType, MemoryConsumer};

    fn only(name: &str, address: &str) -> Arc<MemoryConsumer> {
        Arc::new(MemoryConsumer::with_filter(
            name,
            AddressFilter::new(vec![AddressRule::new(MatchType::ExactAddress, address)]),
        ))
    }

    fn handler(consumers: Vec<Arc<dyn MessageConsumer>>) -> SessionHandler {
        SessionHandler::new(consumers.into(), SessionContext::default())
    }

    #[test]
    fn test_state_transitions() {
        let mut handler = handler(vec![Arc::new(MemoryConsumer::new("memory"))]);
        assert_eq!(handler.state(), SessionState::AwaitingSender);

        handler.set_sender("s@d");
        assert_eq!(handler.state(), SessionState::AwaitingRecipients);
        assert_eq!(handler.sender(), Some("s@d"));

        handler.add_recipient("u1@d").unwrap();
        assert_eq!(handler.state(), SessionState::AwaitingBody);

        let mut body: &[u8] = b"Hello";
        handler.deliver_body(&mut body).unwrap();
        assert_eq!(handler.state(), SessionState::Done);

        handler.complete();
        assert_eq!(handler.state(), SessionState::Done);
        assert!(handler.deliveries().is_empty());
        assert_eq!(handler.sender(), None);
    }

    #[test]
    fn test_rejected_recipient_keeps_deliveries() {
        let mut handler = handler(vec![only("admin", "admin@d")]);
        handler.set_sender("s@d");
        handler.add_recipient("admin@d").unwrap();

        let err = handler.add_recipient("bad@d").unwrap_err();
        assert!(matches!(
            &err,
            DispatchError::RecipientRejected { recipient } if recipient == "bad@d"
        ));
        assert_eq!(err.reply().code, 553);
        assert_eq!(handler.deliveries().len(), 1);
        assert_eq!(handler.state(), SessionState::AwaitingBody);
    }

    #[test]
    fn test_rejected_first_recipient_stays_awaiting() {
        let mut handler = handler(vec![only("admin", "admin@d")]);
        handler.set_sender("s@d");
        assert!(handler.add_recipient("bad@d").is_err());
        assert_eq!(handler.state(), SessionState::AwaitingRecipients);
        assert!(handler.deliveries().is_empty());
    }

    #[test]
    fn test_every_accepting_consumer_recorded() {
        let first = Arc::new(MemoryConsumer::new("first"));
        let second = Arc::new(MemoryConsumer::new("second"));
        let mut handler = handler(vec![first, second]);
        handler.set_sender("s@d");
        handler.add_recipient("a@d").unwrap();
        handler.add_recipient("a@d").unwrap();

        let pairs: Vec<_> = handler
            .deliveries()
            .iter()
            .map(|d| (d.consumer().name().to_string(), d.recipient().to_string()))
            .collect();
        assert_eq!(
            pairs,
            vec![
                ("first".to_string(), "a@d".to_string()),
                ("second".to_string(), "a@d".to_string()),
                ("first".to_string(), "a@d".to_string()),
                ("second".to_string(), "a@d".to_string()),
            ]
        );
    }

    #[test]
    fn test_deliver_without_recipients() {
        let consumer = Arc::new(MemoryConsumer::new("memory"));
        let mut handler = handler(vec![consumer.clone()]);
        handler.set_sender("s@d");

        let mut body: &[u8] = b"Hello";
        let err = handler.deliver_body(&mut body).unwrap_err();
        assert!(matches!(err, DispatchError::NoAcceptedRecipients));
        assert!(consumer.messages().is_empty());
    }

    #[test]
    fn test_deliver_after_complete() {
        let consumer = Arc::new(MemoryConsumer::new("memory"));
        let mut handler = handler(vec![consumer.clone()]);
        handler.set_sender("s@d");
        handler.add_recipient("u@d").unwrap();
        handler.complete();

        let mut body: &[u8] = b"Hello";
        let err = handler.deliver_body(&mut body).unwrap_err();
        assert!(matches!(err, DispatchError::TransactionFinished));
        assert!(consumer.messages().is_empty());
    }

    #[test]
    fn test_deliver_body_twice() {
        let consumer = Arc::new(MemoryConsumer::new("memory"));
        let mut handler = handler(vec![consumer.clone()]);
        handler.set_sender("s@d");
        handler.add_recipient("u1@d").unwrap();

        let mut body: &[u8] = b"Hello";
        handler.deliver_body(&mut body).unwrap();

        let mut body: &[u8] = b"Hello again";
        let err = handler.deliver_body(&mut body).unwrap_err();
        assert!(matches!(err, DispatchError::TransactionFinished));
        assert_eq!(err.reply().code, 503);
        assert_eq!(consumer.messages().len(), 1);
        assert_eq!(handler.state(), SessionState::Done);
    }

    #[test]
    fn test_finished_transaction_stays_closed() {
        let consumer = Arc::new(MemoryConsumer::new("memory"));
        let mut handler = handler(vec![consumer.clone()]);
        handler.set_sender("s@d");
        handler.add_recipient("u@d").unwrap();
        handler.complete();

        handler.set_sender("other@d");
        assert_eq!(handler.sender(), None);
        let err = handler.add_recipient("u@d").unwrap_err();
        assert!(matches!(err, DispatchError::TransactionFinished));
        assert_eq!(handler.state(), SessionState::Done);
        assert!(handler.deliveries().is_empty());

        let mut body: &[u8] = b"Hello";
        assert!(handler.deliver_body(&mut body).is_err());
        assert!(consumer.messages().is_empty());
    }

    #[test]
    fn test_delivery_failure_propagates() {
        struct Failing;

        impl MessageConsumer for Failing {
            fn accepts(&self, _sender: &str, _recipient: &str) -> bool {
                true
            }

            fn deliver(
                &self,
                _sender: &str,
                _recipient: &str,
                _body: &mut dyn Read,
            ) -> crate::DeliveryResult<()> {
                Err(DeliveryError::Io(io::Error::new(io::ErrorKind::Other, "boom")))
            }

            fn name(&self) -> &str {
                "failing"
            }
        }

        let mut handler = handler(vec![Arc::new(Failing)]);
        handler.set_sender("s@d");
        handler.add_recipient("u@d").unwrap();

        let mut body: &[u8] = b"Hello";
        let err = handler.deliver_body(&mut body).unwrap_err();
        assert!(matches!(err, DispatchError::Delivery(DeliveryError::Io(_))));
        assert_eq!(err.reply().code, 451);
    }

    #[test]
    fn test_complete_twice() {
        let mut handler = handler(vec![Arc::new(MemoryConsumer::new("memory"))]);
        handler.set_sender("s@d");
        handler.add_recipient("u@d").unwrap();
        handler.complete();
        handler.complete();
        assert_eq!(handler.state(), SessionState::Done);
        assert_eq!(handler.sender(), None);
        assert!(handler.deliveries().is_empty());
    }

    #[test]
    fn test_context_kept() {
        let context = SessionContext {
            peer: Some("127.0.0.1:2525".parse().unwrap()),
            helo: Some("client.example.com".to_string()),
        };
        let consumers: Vec<Arc<dyn MessageConsumer>> = Vec::new();
        let handler = SessionHandler::new(consumers.into(), context);
        assert_eq!(
            handler.context().helo.as_deref(),
            Some("client.example.com")
        );
    }
}
