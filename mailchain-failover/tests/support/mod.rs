#![allow(dead_code, clippy::unwrap_used)]

use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU32, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use mailchain_failover::{
    Mailer, Message, MessageBuilder, PermanentError, SendError, TemporaryError,
};

/// Outcome of one scripted attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Accept,
    Busy,
    Reject,
}

impl Step {
    fn outcome(self, mailer: &str, attempt: u32) -> Result<(), SendError> {
        match self {
            Self::Accept => Ok(()),
            Self::Busy => {
                Err(TemporaryError::ServerBusy(format!("{mailer} attempt {attempt}")).into())
            }
            Self::Reject => {
                Err(PermanentError::MessageRejected(format!("{mailer} attempt {attempt}")).into())
            }
        }
    }
}

/// Sender that plays back a script of outcomes, then repeats a fallback
/// outcome forever.
#[derive(Clone)]
pub struct ScriptedMailer {
    name: String,
    script: Arc<Mutex<VecDeque<Step>>>,
    then: Step,
    calls: Arc<AtomicU32>,
    sent: Arc<Mutex<Vec<Message>>>,
    latency: Option<Duration>,
    from: Option<String>,
}

impl ScriptedMailer {
    fn with(name: &str, then: Step) -> Self {
        Self {
            name: name.to_string(),
            script: Arc::default(),
            then,
            calls: Arc::default(),
            sent: Arc::default(),
            latency: None,
            from: None,
        }
    }

    pub fn succeeding(name: &str) -> Self {
        Self::with(name, Step::Accept)
    }

    /// Fails every attempt with a temporary error.
    pub fn failing(name: &str) -> Self {
        Self::with(name, Step::Busy)
    }

    /// Fails every attempt with a permanent error.
    pub fn rejecting(name: &str) -> Self {
        Self::with(name, Step::Reject)
    }

    /// Play `steps` before falling back to the default outcome.
    #[must_use]
    pub fn script(self, steps: impl IntoIterator<Item = Step>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(steps);
        }
        self
    }

    /// Sleep for `latency` inside every attempt.
    #[must_use]
    pub const fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Seed composed messages with this sender address.
    #[must_use]
    pub fn from_address(mut self, from: &str) -> Self {
        self.from = Some(from.to_string());
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<Message> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    pub fn shared(&self) -> Arc<dyn Mailer> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl Mailer for ScriptedMailer {
    fn name(&self) -> &str {
        &self.name
    }

    fn message_builder(&self) -> MessageBuilder {
        match &self.from {
            Some(from) => MessageBuilder::new().from(from.as_str()),
            None => MessageBuilder::new(),
        }
    }

    async fn send(&self, message: &Message) -> Result<(), SendError> {
        let attempt = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let step = self
            .script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or(self.then);

        if step == Step::Accept
            && let Ok(mut sent) = self.sent.lock()
        {
            sent.push(message.clone());
        }

        step.outcome(&self.name, attempt)
    }
}

pub fn message() -> Message {
    Message::builder()
        .from("Notifications <noreply@example.com>")
        .to("user@example.com")
        .subject("Your order has shipped")
        .text_body("It is on its way.")
        .build()
        .unwrap()
}
