use std::{error::Error, fmt};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use curl::easy::{Auth, Easy, Form};
use log::info;

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct SendError(pub(crate) String);

impl Error for SendError {}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub(crate) trait ReminderMailer {
    fn send_reminder(
        &self,
        to: &str,
        pet_name: &str,
        reminder_type: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), SendError>;
}

impl<T> ReminderMailer for Box<T>
where
    T: ReminderMailer + ?Sized,
{
    fn send_reminder(
        &self,
        to: &str,
        pet_name: &str,
        reminder_type: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), SendError> {
        (**self).send_reminder(to, pet_name, reminder_type, due_date)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ReminderMessage {
    pub(crate) subject: String,
    pub(crate) html: String,
}

fn describe(reminder_type: &str, pet_name: &str) -> (&'static str, String) {
    match reminder_type {
        "deworming" => (
            "External deworming reminder",
            format!("{pet_name} is due for external deworming!"),
        ),
        "internal_deworming" => (
            "Internal deworming reminder",
            format!("{pet_name} is due for internal deworming!"),
        ),
        "vaccine" => (
            "Vaccination reminder",
            format!("{pet_name} is due for a vaccination!"),
        ),
        "bathing" => ("Bathing reminder", format!("{pet_name} is due for a bath!")),
        _ => (
            "Health reminder",
            format!("{pet_name} has a health record coming due!"),
        ),
    }
}

pub(crate) fn render_message(
    pet_name: &str,
    reminder_type: &str,
    due_date: DateTime<Utc>,
    app_url: &str,
) -> ReminderMessage {
    let (title, description) = describe(reminder_type, pet_name);
    let due = due_date.format("%A, %B %-d, %Y");

    let html = format!(
        r#"<!DOCTYPE html>
<html>
  <head><meta charset="utf-8"></head>
  <body style="font-family: sans-serif; line-height: 1.6; color: #333;">
    <div style="max-width: 600px; margin: 0 auto; padding: 20px;">
      <h1>Pet health reminder</h1>
      <h2 style="color: #ec4899;">{title}</h2>
      <p>{description}</p>
      <p style="font-size: 28px; font-weight: bold;">{pet_name}</p>
      <p style="background: #fef3c7; border-left: 4px solid #f59e0b; padding: 15px;">
        <strong>Due date:</strong> {due}
      </p>
      <p>Please arrange the care your pet needs in good time.</p>
      <p><a href="{app_url}">View details</a></p>
      <p style="color: #666; font-size: 14px;">Sent automatically by the pet care reminder service.</p>
    </div>
  </body>
</html>
"#
    );

    ReminderMessage {
        subject: format!("{title} - {pet_name}"),
        html,
    }
}

pub(crate) struct MailgunMailer {
    apikey: String,
    domain: String,
    from: String,
    app_url: String,
}

impl MailgunMailer {
    pub(crate) fn new(apikey: String, domain: String, from: String, app_url: String) -> Self {
        Self {
            apikey,
            domain,
            from,
            app_url,
        }
    }

    fn post(&self, to: &str, message: &ReminderMessage) -> Result<u32> {
        let mut form = Form::new();
        form.part("from")
            .contents(self.from.as_bytes())
            .add()
            .context("Failed to add from")?;
        form.part("to")
            .contents(to.as_bytes())
            .add()
            .context("Failed to add to")?;
        form.part("subject")
            .contents(message.subject.as_bytes())
            .add()
            .context("Failed to add subject")?;
        form.part("html")
            .contents(message.html.as_bytes())
            .add()
            .context("Failed to add html")?;

        let mut easy = Easy::new();
        easy.httppost(form)?;
        easy.http_auth(Auth::new().basic(true))?;
        easy.username("api")?;
        easy.password(&self.apikey)?;
        easy.url(&format!(
            "https://api.mailgun.net/v3/{}/messages",
            self.domain
        ))?;
        easy.perform().context("Mailgun request failed")?;

        Ok(easy.response_code()?)
    }
}

impl ReminderMailer for MailgunMailer {
    fn send_reminder(
        &self,
        to: &str,
        pet_name: &str,
        reminder_type: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), SendError> {
        let message = render_message(pet_name, reminder_type, due_date, &self.app_url);
        match self.post(to, &message) {
            Ok(200) => {
                info!("Sent email \"{}\" to {to} via Mailgun", message.subject);
                Ok(())
            }
            Ok(code) => Err(SendError(format!("Mailgun returned status {code}"))),
            Err(err) => Err(SendError(format!("{err:#}"))),
        }
    }
}

/// Used when no mail provider is configured: the message is logged and
/// treated as delivered.
pub(crate) struct LogMailer {
    app_url: String,
}

impl LogMailer {
    pub(crate) fn new(app_url: String) -> Self {
        Self { app_url }
    }
}

impl ReminderMailer for LogMailer {
    fn send_reminder(
        &self,
        to: &str,
        pet_name: &str,
        reminder_type: &str,
        due_date: DateTime<Utc>,
    ) -> Result<(), SendError> {
        let message = render_message(pet_name, reminder_type, due_date, &self.app_url);
        info!(
            "Email service not configured, reminder email to {to}: {}",
            message.subject
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod testhelper {
    use std::cell::RefCell;

    use chrono::{DateTime, Utc};

    use super::{ReminderMailer, SendError};

    #[derive(Debug, PartialEq, Eq)]
    pub(crate) struct SentEmail {
        pub(crate) to: String,
        pub(crate) pet_name: String,
        pub(crate) reminder_type: String,
        pub(crate) due_date: DateTime<Utc>,
    }

    #[derive(Default)]
    pub(crate) struct FakeMailer {
        pub(crate) sent: RefCell<Vec<SentEmail>>,
        fail_for: Option<String>,
    }

    impl FakeMailer {
        pub(crate) fn failing_for(address: &str) -> Self {
            Self {
                sent: RefCell::default(),
                fail_for: Some(address.to_owned()),
            }
        }
    }

    impl ReminderMailer for FakeMailer {
        fn send_reminder(
            &self,
            to: &str,
            pet_name: &str,
            reminder_type: &str,
            due_date: DateTime<Utc>,
        ) -> Result<(), SendError> {
            if self.fail_for.as_deref() == Some(to) {
                return Err(SendError("mailbox unavailable".to_owned()));
            }
            self.sent.borrow_mut().push(SentEmail {
                to: to.to_owned(),
                pet_name: pet_name.to_owned(),
                reminder_type: reminder_type.to_owned(),
                due_date,
            });
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use crate::reminder::testhelper::at;

    use super::{render_message, LogMailer, MailgunMailer, ReminderMailer};

    #[test]
    fn renders_known_type() {
        let message = render_message(
            "Mochi",
            "vaccine",
            at("2024-01-10T00:00:00Z"),
            "https://pets.example.org",
        );
        assert_eq!(message.subject, "Vaccination reminder - Mochi");
        assert!(message.html.contains("Mochi is due for a vaccination!"));
        assert!(message.html.contains("Wednesday, January 10, 2024"));
        assert!(message.html.contains("href=\"https://pets.example.org\""));
    }

    #[test]
    fn renders_unknown_type_with_fallback() {
        let message = render_message("Rex", "grooming", at("2024-01-10T00:00:00Z"), "");
        assert_eq!(message.subject, "Health reminder - Rex");
        assert!(message.html.contains("Rex has a health record coming due!"));
    }

    #[test]
    fn log_mailer_always_succeeds() {
        let mailer = LogMailer::new(String::new());
        assert!(mailer
            .send_reminder("a@example.org", "Rex", "bathing", at("2024-01-10T00:00:00Z"))
            .is_ok());
    }

    #[ignore]
    #[test]
    fn send_an_email() {
        let mailgun_api_key = fs::read_to_string("./mailgun-apikey").unwrap();
        let to_address = fs::read_to_string("./to-address").unwrap();
        let mailgun_domain = fs::read_to_string("./mailgun-domain").unwrap();
        let mailer = MailgunMailer::new(
            mailgun_api_key.trim().to_owned(),
            mailgun_domain.trim().to_owned(),
            format!("Pet Care <noreply@{}>", mailgun_domain.trim()),
            "https://example.org".to_owned(),
        );

        mailer
            .send_reminder(to_address.trim(), "Mochi", "vaccine", at("2024-01-10T00:00:00Z"))
            .unwrap();
    }
}
