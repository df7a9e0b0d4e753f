use anyhow::{Context, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::{authentication::Credentials, AsyncSmtpTransport};
use lettre::{AsyncTransport, Tokio1Executor};

use super::Notifier;
use crate::alert::Alert;

pub struct EmailSender {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Vec<Mailbox>,
}

fn env_var(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{name} missing"))
}

impl EmailSender {
    /// Needs `SMTP_HOST`, `SMTP_USER`, `SMTP_PASS`, `NOTIFY_EMAIL_FROM` and a
    /// comma-separated `NOTIFY_EMAIL_TO`.
    pub fn from_env() -> Result<Self> {
        let host = env_var("SMTP_HOST")?;
        let user = env_var("SMTP_USER")?;
        let pass = env_var("SMTP_PASS")?;
        let from_addr = env_var("NOTIFY_EMAIL_FROM")?;
        let to_addrs = env_var("NOTIFY_EMAIL_TO")?;

        let creds = Credentials::new(user, pass);
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&host)
            .context("invalid SMTP_HOST")?
            .credentials(creds)
            .build();

        let from = from_addr.parse().context("invalid NOTIFY_EMAIL_FROM")?;
        let to = to_addrs
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<Mailbox>().with_context(|| format!("invalid NOTIFY_EMAIL_TO entry `{s}`")))
            .collect::<Result<Vec<_>>>()?;
        anyhow::ensure!(!to.is_empty(), "NOTIFY_EMAIL_TO is empty");

        Ok(Self { mailer, from, to })
    }
}

#[async_trait::async_trait]
impl Notifier for EmailSender {
    fn name(&self) -> &'static str {
        "email"
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let subject = format!("[{}] Mental health hotspot {}", alert.tier, alert.hotspot_id);

        let mut body = alert.message.clone();
        body.push_str("\n\nRecommended actions:\n");
        for (i, a) in alert.actions.iter().enumerate() {
            body.push_str(&format!("{}. {}\n", i + 1, a));
        }
        body.push_str(&format!("\nRouting: {}\n", alert.recipients.join(", ")));
        body.push_str(&format!("Created: {}\n", alert.created_at.to_rfc3339()));

        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for to in &self.to {
            builder = builder.to(to.clone());
        }
        let msg = builder
            .header(header::ContentType::TEXT_PLAIN)
            .body(body)
            .context("build email")?;

        self.mailer.send(msg).await.context("send email")?;
        Ok(())
    }
}
