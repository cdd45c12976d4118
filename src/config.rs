use std::{env, fs, io::ErrorKind, str::FromStr};

use anyhow::{Context, Result};
use chrono::NaiveTime;

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct MailgunConfig {
    pub(crate) apikey: String,
    pub(crate) domain: String,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Config {
    pub(crate) db_path: String,
    // None means reminders are only logged
    pub(crate) mailgun: Option<MailgunConfig>,
    pub(crate) from_address: String,
    pub(crate) app_url: String,
    pub(crate) check_at: NaiveTime,
    pub(crate) run_on_startup: bool,
}

impl Config {
    pub(crate) fn load() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let apikey_file =
            lookup("PETCARE_MAILGUN_APIKEY_FILE").unwrap_or("./mailgun-apikey".to_owned());
        let mailgun = read_secret(&apikey_file)?.map(|apikey| MailgunConfig {
            apikey,
            domain: lookup("PETCARE_MAILGUN_DOMAIN").unwrap_or("mg.example.org".to_owned()),
        });

        let check_at = match lookup("PETCARE_CHECK_AT") {
            Some(time) => NaiveTime::from_str(&time)
                .or_else(|_| NaiveTime::parse_from_str(&time, "%H:%M"))
                .with_context(|| format!("Invalid PETCARE_CHECK_AT: {time}"))?,
            None => NaiveTime::from_hms_opt(9, 0, 0).context("Invalid default check time")?,
        };

        Ok(Self {
            db_path: lookup("PETCARE_DB").unwrap_or("./db".to_owned()),
            mailgun,
            from_address: lookup("PETCARE_FROM")
                .unwrap_or("Pet Care <noreply@example.org>".to_owned()),
            app_url: lookup("PETCARE_APP_URL").unwrap_or("http://localhost:3000".to_owned()),
            check_at,
            run_on_startup: lookup("PETCARE_RUN_ON_STARTUP").is_some(),
        })
    }
}

// A missing file isn't an error, just an unconfigured secret
fn read_secret(path: &str) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(contents) => Ok(Some(contents.trim().to_owned())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("Failed to read {path}")),
    }
}
