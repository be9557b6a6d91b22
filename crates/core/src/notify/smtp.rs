use anyhow::Context;
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use super::{template::render_text, ChangeAlert, Notifier, NotifyConfig, SmtpTls};

pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

impl SmtpNotifier {
    pub fn new(config: &NotifyConfig) -> anyhow::Result<Self> {
        let host = config.smtp_host.as_deref().context("SMTP_HOST not set")?;
        let from: Mailbox = config
            .smtp_from
            .as_deref()
            .context("SMTP_FROM_ADDRESS not set")?
            .parse()
            .context("invalid SMTP_FROM_ADDRESS")?;

        let to: Vec<Mailbox> = config
            .smtp_to
            .iter()
            .filter_map(|addr| match addr.parse() {
                Ok(m) => Some(m),
                Err(err) => {
                    tracing::warn!(address = %addr, error = %err, "skipping invalid recipient");
                    None
                }
            })
            .collect();
        anyhow::ensure!(!to.is_empty(), "no valid NOTIFICATION_EMAIL_TO addresses");

        let mut builder = match config.smtp_tls {
            SmtpTls::Tls => AsyncSmtpTransport::<Tokio1Executor>::relay(host),
            SmtpTls::StartTls => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host),
            SmtpTls::None => Ok(AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)),
        }
        .context("failed to build SMTP transport")?
        .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_username, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            from,
            to,
        })
    }

    fn build_message(&self, alert: &ChangeAlert) -> anyhow::Result<Message> {
        let mut builder = Message::builder()
            .from(self.from.clone())
            .subject(alert.subject())
            .header(ContentType::TEXT_PLAIN);
        for recipient in &self.to {
            builder = builder.to(recipient.clone());
        }
        builder
            .body(render_text(alert))
            .context("failed to build email")
    }
}

#[async_trait::async_trait]
impl Notifier for SmtpNotifier {
    async fn send(&self, alert: &ChangeAlert) -> anyhow::Result<()> {
        let message = self.build_message(alert)?;
        self.transport
            .send(message)
            .await
            .context("failed to send email")?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::{ChangeEntry, GradeCounts};
    use crate::domain::ticker::Ticker;

    fn config() -> NotifyConfig {
        NotifyConfig {
            smtp_host: Some("localhost".to_string()),
            smtp_port: 2525,
            smtp_from: Some("Screener <screener@example.com>".to_string()),
            smtp_to: vec![
                "a@example.com".to_string(),
                "not an address".to_string(),
                "b@example.com".to_string(),
            ],
            smtp_tls: SmtpTls::None,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn invalid_recipients_are_dropped() {
        let n = SmtpNotifier::new(&config()).unwrap();
        assert_eq!(n.to.len(), 2);
    }

    #[tokio::test]
    async fn message_goes_to_every_recipient_at_once() {
        let n = SmtpNotifier::new(&config()).unwrap();
        let alert = ChangeAlert::new(vec![ChangeEntry {
            ticker: Ticker::parse("AAPL").unwrap(),
            previous: GradeCounts { buy: 1, hold: 0, sell: 0 },
            current: GradeCounts { buy: 2, hold: 0, sell: 0 },
        }]);

        let message = n.build_message(&alert).unwrap();
        assert_eq!(message.envelope().to().len(), 2);
        let raw = String::from_utf8(message.formatted()).unwrap();
        assert!(raw.contains("Subject: Analyst recommendations changed for AAPL"));
    }

    #[test]
    fn all_invalid_recipients_is_a_config_error() {
        let mut c = config();
        c.smtp_to = vec!["nope".to_string()];
        assert!(SmtpNotifier::new(&c).is_err());
    }
}
