//! Deliver-first dispatching of SMTP envelopes.
//!
//! A [`HandlerFactory`] hands out one [`SessionHandler`] per transaction.
//! The handler offers every recipient to the configured [`MessageConsumer`]s
//! and, once the body arrives, delivers it to the consumer of the first
//! accepted recipient only, so that a message addressed to several
//! recipients of the same destination is written once.

pub mod config;
pub mod consumer;
pub mod consumers;
pub mod delivery;
pub mod error;
pub mod factory;
pub mod matcher;
pub mod metadata;
pub mod mime;
pub mod session;

pub use config::*;
pub use consumer::*;
pub use consumers::*;
pub use delivery::*;
pub use error::*;
pub use factory::*;
pub use matcher::*;
pub use metadata::*;
pub use mime::*;
pub use session::*;
