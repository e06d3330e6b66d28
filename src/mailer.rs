use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("delivery failed: {0}")]
    Delivery(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub from: String,
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Outbound mail used to deliver confirmation codes.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: Message) -> Result<(), MailError>;
}

/// Writes messages to the log instead of sending them. Intended for local
/// development, where the confirmation code is read from the server output.
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        log::info!(
            "mail from={} to={} subject={:?}\n{}",
            message.from, message.to, message.subject, message.body
        );
        Ok(())
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct MemoryMailer {
    outbox: Mutex<Vec<Message>>,
}

impl MemoryMailer {
    pub fn new() -> Self { Self::default() }

    pub fn sent(&self) -> Vec<Message> {
        self.outbox.lock().map(|m| m.clone()).unwrap_or_default()
    }

    pub fn last_to(&self, to: &str) -> Option<Message> {
        self.sent().into_iter().rev().find(|m| m.to == to)
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, message: Message) -> Result<(), MailError> {
        self.outbox
            .lock()
            .map_err(|_| MailError::Delivery("outbox lock poisoned".into()))?
            .push(message);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_mailer_records_in_order() {
        let m = MemoryMailer::new();
        for body in ["one", "two"] {
            m.send(Message { from: "f@x".into(), to: "a@x".into(), subject: "s".into(), body: body.into() })
                .await
                .unwrap();
        }
        assert_eq!(m.sent().len(), 2);
        assert_eq!(m.last_to("a@x").unwrap().body, "two");
        assert!(m.last_to("b@x").is_none());
    }
}
