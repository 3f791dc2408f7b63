//! Errors surfaced by a [`SessionHandler`](crate::SessionHandler) and their
//! translation into SMTP replies for the protocol engine.

use std::fmt::{self, Display};

use thiserror::Error;

use crate::DeliveryError;

/// Result type for session handler operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Errors that can occur while driving a transaction.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No consumer accepted the recipient.
    #[error("<{recipient}> address unknown.")]
    RecipientRejected { recipient: String },

    /// The body phase was reached without any accepted recipient.
    #[error("No accepted recipient to deliver to")]
    NoAcceptedRecipients,

    /// The transaction already ended, by delivery or completion.
    #[error("Transaction already finished")]
    TransactionFinished,

    /// The chosen consumer failed to take the body.
    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

impl DispatchError {
    /// Returns the SMTP reply the protocol engine should send for this error.
    pub fn reply(&self) -> Reply {
        match self {
            DispatchError::RecipientRejected { .. } => Reply::new(553, self.to_string()),
            DispatchError::NoAcceptedRecipients | DispatchError::TransactionFinished => {
                Reply::new(503, "Bad sequence of commands")
            }
            DispatchError::Delivery(DeliveryError::TooMuchData { .. }) => {
                Reply::new(552, "Exceeded storage allocation")
            }
            DispatchError::Delivery(_) => {
                Reply::new(451, "Requested action aborted: local error in processing")
            }
        }
    }

    /// Whether the failure is permanent (5xx) rather than transient (4xx).
    pub fn is_permanent(&self) -> bool {
        self.reply().code >= 500
    }
}

/// An SMTP reply code with its human readable text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub message: String,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.message)
    }
}
