use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::Serialize;

use crate::{
    email::{ReminderMailer, SendError},
    reminder::{DueVerdict, ReminderSettings},
};

/// A stored reminder that could not be turned into `ReminderSettings`.
#[derive(Debug)]
pub(crate) struct MalformedReminder {
    pub(crate) id: i64,
    pub(crate) error: anyhow::Error,
}

#[derive(Debug, Default)]
pub(crate) struct EnabledReminders {
    pub(crate) reminders: Vec<ReminderSettings>,
    pub(crate) malformed: Vec<MalformedReminder>,
}

/// Where the batch reads enabled reminders from and writes send bookkeeping to.
pub(crate) trait ReminderStore {
    fn load_enabled_reminders(&self) -> Result<EnabledReminders>;
    fn mark_sent(
        &self,
        reminder_id: i64,
        last_sent: DateTime<Utc>,
        next_due_date: DateTime<Utc>,
    ) -> Result<()>;
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct RunSummary {
    pub(crate) total: usize,
    pub(crate) sent: usize,
    pub(crate) skipped: usize,
    pub(crate) error_messages: Vec<String>,
}

impl RunSummary {
    fn new(total: usize) -> Self {
        Self {
            total,
            ..Self::default()
        }
    }

    pub(crate) fn errors(&self) -> usize {
        self.error_messages.len()
    }

    fn record_error(&mut self, message: String) {
        error!("{message}");
        self.error_messages.push(message);
    }
}

enum Outcome {
    Skipped(DueVerdict),
    Sent,
    SendFailed(SendError),
    // The email went out but the new schedule could not be saved
    SentNotRecorded(anyhow::Error),
}

/// One pass over `reminders`. Every per-reminder failure ends up in the
/// summary; nothing is retried and nothing escapes.
pub(crate) fn run_batch<M, S>(
    reminders: &[ReminderSettings],
    now: DateTime<Utc>,
    mailer: &M,
    store: &S,
) -> RunSummary
where
    M: ReminderMailer + ?Sized,
    S: ReminderStore + ?Sized,
{
    let mut summary = RunSummary::new(reminders.len());

    for reminder in reminders {
        match process_reminder(reminder, now, mailer, store) {
            Ok(Outcome::Skipped(verdict)) => {
                debug!(
                    "Skipping {} ({}) reminder {}: {verdict:?}",
                    reminder.pet.name, reminder.reminder_type, reminder.id
                );
                summary.skipped += 1;
            }
            Ok(Outcome::Sent) => {
                info!("Reminder sent successfully to {}", reminder.email);
                summary.sent += 1;
            }
            Ok(Outcome::SendFailed(err)) => {
                summary.record_error(format!("Failed to send to {}: {err}", reminder.email));
            }
            Ok(Outcome::SentNotRecorded(err)) => {
                summary.sent += 1;
                summary.record_error(format!(
                    "Error processing reminder {}: {err:#}",
                    reminder.id
                ));
            }
            Err(err) => {
                summary.record_error(format!(
                    "Error processing reminder {}: {err:#}",
                    reminder.id
                ));
            }
        }
    }

    summary
}

fn process_reminder<M, S>(
    reminder: &ReminderSettings,
    now: DateTime<Utc>,
    mailer: &M,
    store: &S,
) -> Result<Outcome>
where
    M: ReminderMailer + ?Sized,
    S: ReminderStore + ?Sized,
{
    let verdict = reminder.evaluate(now);
    if !verdict.is_due() {
        return Ok(Outcome::Skipped(verdict));
    }

    // Worked out before sending so a reminder that can't be rescheduled
    // doesn't get emailed on every run.
    let next_due_date = reminder
        .next_due_after(now)
        .context("Failed to compute next due date")?;

    info!(
        "Sending reminder for {} ({}): {verdict:?}",
        reminder.pet.name, reminder.reminder_type
    );
    let due_date = reminder.next_due_date.unwrap_or(now);
    if let Err(err) = mailer.send_reminder(
        &reminder.email,
        &reminder.pet.name,
        &reminder.reminder_type,
        due_date,
    ) {
        return Ok(Outcome::SendFailed(err));
    }

    // Not atomic with the send: a failure here leaves the old due date in
    // place and the reminder will be sent again next run.
    if let Err(err) = store
        .mark_sent(reminder.id, now, next_due_date)
        .context("Failed to record sent reminder")
    {
        return Ok(Outcome::SentNotRecorded(err));
    }

    Ok(Outcome::Sent)
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct SummaryCounts {
    pub(crate) total: usize,
    pub(crate) sent: usize,
    pub(crate) skipped: usize,
    pub(crate) errors: usize,
}

/// What a trigger gets back from a reminder check.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct BatchReport {
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) summary: Option<SummaryCounts>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) errors: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

impl BatchReport {
    fn failed(err: &anyhow::Error) -> Self {
        Self {
            success: false,
            summary: None,
            errors: None,
            error: Some(format!("{err:#}")),
        }
    }
}

impl From<RunSummary> for BatchReport {
    fn from(summary: RunSummary) -> Self {
        let counts = SummaryCounts {
            total: summary.total,
            sent: summary.sent,
            skipped: summary.skipped,
            errors: summary.errors(),
        };
        Self {
            success: true,
            summary: Some(counts),
            errors: if summary.error_messages.is_empty() {
                None
            } else {
                Some(summary.error_messages)
            },
            error: None,
        }
    }
}

/// Loads the enabled reminders and runs one batch over them. Only a failure
/// to load the reminders makes the report unsuccessful.
pub(crate) fn run_reminder_check<M, S>(store: &S, mailer: &M, now: DateTime<Utc>) -> BatchReport
where
    M: ReminderMailer + ?Sized,
    S: ReminderStore + ?Sized,
{
    info!("Starting reminder check");
    let loaded = match store
        .load_enabled_reminders()
        .context("Failed to load enabled reminders")
    {
        Ok(loaded) => loaded,
        Err(err) => {
            error!("Reminder check failed: {err:#}");
            return BatchReport::failed(&err);
        }
    };
    info!(
        "Found {} active reminders",
        loaded.reminders.len() + loaded.malformed.len()
    );

    let mut summary = run_batch(&loaded.reminders, now, mailer, store);
    for malformed in loaded.malformed {
        summary.total += 1;
        summary.record_error(format!(
            "Error processing reminder {}: {:#}",
            malformed.id, malformed.error
        ));
    }
    info!(
        "Reminder check finished: total {} sent {} skipped {} errors {}",
        summary.total,
        summary.sent,
        summary.skipped,
        summary.errors()
    );

    summary.into()
}
