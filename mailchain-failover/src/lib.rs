//! Failover dispatch across interchangeable mail senders.
//!
//! A [`FailoverDispatcher`] holds an ordered, non-empty chain of senders. Each
//! dispatch tries the chain strictly in registration order, stopping at the
//! first sender that accepts the message. A sender may carry its own
//! [`RetryPolicy`]; its retries happen before the dispatcher moves on. When
//! every sender has failed the caller receives a single
//! [`FailoverError::AllDeliveryFailed`] listing each sender's final failure in
//! chain order.
//!
//! ```ignore
//! let dispatcher = FailoverBuilder::new()
//!     .register(smtp)
//!     .with_retry_policy(RetryPolicy::retries(2))
//!     .register(http_api)
//!     .without_retry_policy()
//!     .build()?;
//!
//! dispatcher.dispatch(&message).await?;
//! ```

mod builder;
mod config;
mod dispatcher;
mod entry;
mod error;
mod mailer;
pub mod retry;

pub use builder::{EntryHandle, FailoverBuilder};
pub use config::{EntryConfig, FailoverConfig, MailerRegistry};
pub use dispatcher::{DispatchOptions, DispatchReceipt, DispatchRequest, FailoverDispatcher};
pub use entry::ChainEntry;
pub use error::{
    AllDeliveryFailed, EntryFailure, FailoverError, PermanentError, SendError, TemporaryError,
};
pub use mailchain_common::{ComposeError, Message, MessageBuilder};
pub use mailer::Mailer;
pub use retry::{Backoff, Retry, RetryConfig, RetryPolicy, RetryPolicyBuilder};
pub use tokio_util::sync::CancellationToken;
