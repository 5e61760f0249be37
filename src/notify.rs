//! Deliver alerts through every configured channel
//!
//! Each channel is tried on its own: a failure is logged and recorded in the [`DeliveryReport`],
//! then the next channel is attempted. A channel that isn't configured simply isn't in the list.

use async_trait::async_trait;
use log::{error, info};

use crate::config::NotificationConfig;
use crate::error::NotifyError;

/// SMTP mail channel
pub mod mail;

/// Slack-style incoming webhook channel
pub mod chat;

/// Message templates shared by the monitors
pub mod message;

pub use message::Message;

#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError>;
}

/// How one notification went, per channel
#[derive(Debug, Default)]
pub struct DeliveryReport {
    pub deliveries: Vec<(&'static str, Result<(), String>)>,
}

impl DeliveryReport {
    pub fn delivered(&self) -> usize {
        self.deliveries.iter().filter(|(_, outcome)| outcome.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.delivered()
    }
}

pub struct Notifier {
    channels: Vec<Box<dyn Channel>>,
}

impl Notifier {
    /// Mail is always configured; chat only when a webhook is set
    pub fn from_config(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let mut channels: Vec<Box<dyn Channel>> = vec![Box::new(mail::MailChannel::new(config)?)];
        if let Some(webhook) = &config.slack_webhook {
            channels.push(Box::new(chat::ChatChannel::new(webhook)?));
        }
        Ok(Notifier::with_channels(channels))
    }

    pub fn with_channels(channels: Vec<Box<dyn Channel>>) -> Self {
        Notifier { channels }
    }

    pub fn channel_names(&self) -> Vec<&'static str> {
        self.channels.iter().map(|c| c.name()).collect()
    }

    /// Attempt every channel; never fails as a whole
    pub async fn notify(&self, subject: &str, body: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for channel in &self.channels {
            let outcome = match channel.send(subject, body).await {
                Ok(()) => {
                    info!("Sent '{}' via {}", subject, channel.name());
                    Ok(())
                }
                Err(err) => {
                    error!("Failed to send '{}' via {}: {}", subject, channel.name(), err);
                    Err(err.to_string())
                }
            };
            report.deliveries.push((channel.name(), outcome));
        }
        report
    }

    pub async fn send(&self, message: &Message) -> DeliveryReport {
        self.notify(&message.subject, &message.body).await
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    pub(crate) type Outbox = Arc<Mutex<Vec<(String, String)>>>;

    /// Records every message it's asked to send, optionally failing afterwards
    pub(crate) struct Recording {
        pub name: &'static str,
        pub outbox: Outbox,
        pub fail: bool,
    }

    impl Recording {
        pub(crate) fn channel(name: &'static str, fail: bool) -> (Box<dyn Channel>, Outbox) {
            let outbox: Outbox = Default::default();
            (Box::new(Recording { name, outbox: outbox.clone(), fail }), outbox)
        }
    }

    #[async_trait]
    impl Channel for Recording {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
            self.outbox.lock().expect("outbox").push((subject.to_string(), body.to_string()));
            match self.fail {
                true => Err(NotifyError::Chat(format!("{} is down", self.name))),
                false => Ok(()),
            }
        }
    }

    /// Accepts a message and never finishes delivering it
    pub(crate) struct Stalled;

    #[async_trait]
    impl Channel for Stalled {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn send(&self, _subject: &str, _body: &str) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::Recording;
    use super::*;

    #[tokio::test]
    async fn test_chat_failure_does_not_stop_mail() {
        let (chat, chat_outbox) = Recording::channel("chat", true);
        let (mail, mail_outbox) = Recording::channel("mail", false);
        let notifier = Notifier::with_channels(vec![chat, mail]);

        let report = notifier.notify("Cost Alert", "over budget").await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(chat_outbox.lock().expect("outbox").len(), 1);
        assert_eq!(*mail_outbox.lock().expect("outbox"), vec![("Cost Alert".to_string(), "over budget".to_string())]);
    }

    #[tokio::test]
    async fn test_mail_failure_does_not_stop_chat() {
        let (mail, _) = Recording::channel("mail", true);
        let (chat, chat_outbox) = Recording::channel("chat", false);
        let report = Notifier::with_channels(vec![mail, chat]).notify("s", "b").await;
        assert!(report.deliveries[0].1.is_err());
        assert!(report.deliveries[1].1.is_ok());
        assert_eq!(chat_outbox.lock().expect("outbox").len(), 1);
    }

    #[tokio::test]
    async fn test_no_channels_is_a_no_op() {
        let report = Notifier::with_channels(vec![]).notify("s", "b").await;
        assert!(report.deliveries.is_empty());
    }

    #[tokio::test]
    async fn test_webhook_is_optional() {
        let mut config = NotificationConfig::from_yaml("email_to: ops@example.org\nsmtp_host: localhost\n").expect("config");
        let notifier = Notifier::from_config(&config).expect("notifier");
        assert_eq!(notifier.channel_names(), vec!["mail"]);

        config.slack_webhook = Some("https://hooks.slack.com/services/T/B/X".to_string());
        let notifier = Notifier::from_config(&config).expect("notifier");
        assert_eq!(notifier.channel_names(), vec!["mail", "chat"]);
    }
}
