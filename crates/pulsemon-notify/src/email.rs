use crate::digest::ATTACHMENT_FILENAME;
use crate::error::{NotifyError, Result};
use crate::NotificationTransport;
use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

/// SMTP digest transport.
pub struct EmailTransport {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl EmailTransport {
    pub fn new(
        smtp_host: &str,
        smtp_port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> Result<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)
            .map_err(|e| NotifyError::InvalidConfig(e.to_string()))?
            .port(smtp_port);

        if let (Some(user), Some(pass)) = (username, password) {
            builder = builder.credentials(Credentials::new(user.to_string(), pass.to_string()));
        }

        let from = from
            .parse()
            .map_err(|_| NotifyError::InvalidAddress(from.to_string()))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl NotificationTransport for EmailTransport {
    async fn send_digest(
        &self,
        recipients: &[String],
        subject: &str,
        body_text: &str,
        body_html: &str,
        attachment: &str,
    ) -> Result<()> {
        let mut builder = Message::builder().from(self.from.clone()).subject(subject);
        for recipient in recipients {
            let to: Mailbox = recipient
                .parse()
                .map_err(|_| NotifyError::InvalidAddress(recipient.clone()))?;
            builder = builder.to(to);
        }

        let report_part = Attachment::new(ATTACHMENT_FILENAME.to_string()).body(
            attachment.to_string(),
            ContentType::parse("application/json")
                .map_err(|e| NotifyError::MessageBuild(e.to_string()))?,
        );

        let email = builder
            .multipart(
                MultiPart::mixed()
                    .multipart(MultiPart::alternative_plain_html(
                        body_text.to_string(),
                        body_html.to_string(),
                    ))
                    .singlepart(report_part),
            )
            .map_err(|e| NotifyError::MessageBuild(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| NotifyError::Smtp(e.to_string()))?;

        Ok(())
    }

    fn transport_name(&self) -> &str {
        "smtp"
    }
}
