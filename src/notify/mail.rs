use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::NotificationConfig;
use crate::error::NotifyError;
use crate::notify::Channel;

/// Plain SMTP to the configured relay
///
/// Credentials are only used when both user and password are configured. `email_to` may list
/// several recipients separated by commas.
pub struct MailChannel {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.trim().parse::<Mailbox>().map_err(|err| NotifyError::Address {
        address: address.trim().to_string(),
        message: err.to_string(),
    })
}

impl MailChannel {
    pub fn new(config: &NotificationConfig) -> Result<Self, NotifyError> {
        let from = parse_mailbox(config.sender())?;
        let to = config.email_to
            .split(',')
            .filter(|address| !address.trim().is_empty())
            .map(parse_mailbox)
            .collect::<Result<Vec<Mailbox>, NotifyError>>()?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.smtp_host)
            .port(config.smtp_port);
        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(MailChannel { transport: builder.build(), from, to })
    }
}

#[async_trait]
impl Channel for MailChannel {
    fn name(&self) -> &'static str {
        "mail"
    }

    async fn send(&self, subject: &str, body: &str) -> Result<(), NotifyError> {
        let mut message = Message::builder()
            .from(self.from.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            message = message.to(recipient.clone());
        }
        let message = message
            .body(body.to_string())
            .map_err(|err| NotifyError::Mail(err.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|err| NotifyError::Mail(err.to_string()))?;
        Ok(())
    }
}
