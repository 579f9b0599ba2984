use std::sync::Arc;

use async_trait::async_trait;
use mailchain_common::{Message, MessageBuilder};

use crate::SendError;

/// A single way of getting a message out: one SMTP relay, one HTTP provider.
///
/// Implementations wrap the actual transport. The dispatcher only relies on
/// [`Mailer::send`] reporting success or a classified [`SendError`], and may
/// call it concurrently from several dispatches.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Name used in logs, receipts and failure reports.
    fn name(&self) -> &str;

    /// Builder handed to compose functions before delivering through this
    /// mailer. Override to seed per-provider defaults such as a verified
    /// `From` address.
    fn message_builder(&self) -> MessageBuilder {
        MessageBuilder::default()
    }

    /// Make one delivery attempt.
    ///
    /// # Errors
    ///
    /// Any failure to hand the message over, classified so that retry
    /// policies can tell transient problems from permanent rejections.
    async fn send(&self, message: &Message) -> Result<(), SendError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn message_builder(&self) -> MessageBuilder {
        (**self).message_builder()
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        (**self).send(message).await
    }
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Box<M> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn message_builder(&self) -> MessageBuilder {
        (**self).message_builder()
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        (**self).send(message).await
    }
}
