mod smtp;
mod template;

pub use smtp::SmtpNotifier;
pub use template::render_text;

use crate::domain::snapshot::ChangeEntry;
use chrono::{DateTime, Utc};

/// Recommendation changes found by one run.
#[derive(Debug, Clone)]
pub struct ChangeAlert {
    pub generated_at: DateTime<Utc>,
    pub changes: Vec<ChangeEntry>,
}

impl ChangeAlert {
    pub fn new(changes: Vec<ChangeEntry>) -> Self {
        Self {
            generated_at: Utc::now(),
            changes,
        }
    }

    pub fn subject(&self) -> String {
        match self.changes.len() {
            1 => format!("Analyst recommendations changed for {}", self.changes[0].ticker),
            n => format!("Analyst recommendations changed for {n} tickers"),
        }
    }
}

#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, alert: &ChangeAlert) -> anyhow::Result<()>;
    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SmtpTls {
    #[default]
    StartTls,
    Tls,
    None,
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub smtp_from: Option<String>,
    pub smtp_to: Vec<String>,
    pub smtp_tls: SmtpTls,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            smtp_host: None,
            smtp_port: 587,
            smtp_username: None,
            smtp_password: None,
            smtp_from: None,
            smtp_to: Vec::new(),
            smtp_tls: SmtpTls::default(),
        }
    }
}

impl NotifyConfig {
    pub fn from_env() -> Self {
        let var = |key: &str| {
            std::env::var(key)
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        };

        let smtp_tls = match var("SMTP_TLS").as_deref() {
            Some("tls") => SmtpTls::Tls,
            Some("none") => SmtpTls::None,
            _ => SmtpTls::StartTls,
        };

        Self {
            smtp_host: var("SMTP_HOST"),
            smtp_port: var("SMTP_PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(587),
            smtp_username: var("SMTP_USERNAME"),
            smtp_password: var("SMTP_PASSWORD"),
            smtp_from: var("SMTP_FROM_ADDRESS"),
            smtp_to: parse_recipients(var("NOTIFICATION_EMAIL_TO").as_deref().unwrap_or("")),
            smtp_tls,
        }
    }

    pub fn smtp_configured(&self) -> bool {
        self.smtp_host.is_some() && self.smtp_from.is_some() && !self.smtp_to.is_empty()
    }
}

fn parse_recipients(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// The configured notifier, or `None` when email is not set up. A broken SMTP config is logged
/// and disables notification rather than failing the run.
pub fn build_notifier(config: &NotifyConfig) -> Option<Box<dyn Notifier>> {
    if !config.smtp_configured() {
        tracing::info!("email notifications disabled (set SMTP_HOST, SMTP_FROM_ADDRESS, NOTIFICATION_EMAIL_TO)");
        return None;
    }
    match SmtpNotifier::new(config) {
        Ok(n) => {
            tracing::info!(recipients = config.smtp_to.len(), "email notifications enabled");
            Some(Box::new(n))
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to initialise SMTP notifier; notifications disabled");
            None
        }
    }
}

/// Sends `alert` when there is anything to report. Returns whether a message went out; delivery
/// failure is only a warning.
pub async fn notify_changes(notifier: &dyn Notifier, alert: &ChangeAlert) -> bool {
    if alert.changes.is_empty() {
        return false;
    }
    match notifier.send(alert).await {
        Ok(()) => {
            tracing::info!(channel = notifier.name(), changes = alert.changes.len(), "sent change notification");
            true
        }
        Err(err) => {
            tracing::warn!(channel = notifier.name(), error = %err, "failed to send change notification");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::snapshot::GradeCounts;
    use crate::domain::ticker::Ticker;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait::async_trait]
    impl Notifier for Recording {
        async fn send(&self, alert: &ChangeAlert) -> anyhow::Result<()> {
            if self.fail {
                anyhow::bail!("connection refused");
            }
            self.sent.lock().unwrap().push(alert.subject());
            Ok(())
        }

        fn name(&self) -> &'static str {
            "recording"
        }
    }

    fn change(ticker: &str) -> ChangeEntry {
        ChangeEntry {
            ticker: Ticker::parse(ticker).unwrap(),
            previous: GradeCounts { buy: 1, hold: 1, sell: 0 },
            current: GradeCounts { buy: 3, hold: 1, sell: 0 },
        }
    }

    #[tokio::test]
    async fn nothing_is_sent_without_changes() {
        let n = Recording::default();
        assert!(!notify_changes(&n, &ChangeAlert::new(Vec::new())).await);
        assert!(n.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn sends_one_message_for_all_changes() {
        let n = Recording::default();
        let alert = ChangeAlert::new(vec![change("AAPL"), change("MSFT")]);

        assert!(notify_changes(&n, &alert).await);
        assert_eq!(
            *n.sent.lock().unwrap(),
            vec!["Analyst recommendations changed for 2 tickers".to_string()]
        );
    }

    #[tokio::test]
    async fn delivery_failure_is_not_an_error() {
        let n = Recording {
            fail: true,
            ..Default::default()
        };
        assert!(!notify_changes(&n, &ChangeAlert::new(vec![change("AAPL")])).await);
    }

    #[test]
    fn single_change_subject_names_the_ticker() {
        let alert = ChangeAlert::new(vec![change("nvda")]);
        assert_eq!(alert.subject(), "Analyst recommendations changed for NVDA");
    }

    #[test]
    fn recipients_are_split_and_trimmed() {
        assert_eq!(
            parse_recipients(" a@example.com, ,b@example.com "),
            vec!["a@example.com".to_string(), "b@example.com".to_string()]
        );
        assert!(parse_recipients("").is_empty());
    }

    #[test]
    fn incomplete_smtp_config_disables_email() {
        let config = NotifyConfig {
            smtp_host: Some("smtp.example.com".to_string()),
            ..Default::default()
        };
        assert!(!config.smtp_configured());
        assert!(build_notifier(&config).is_none());
    }
}
