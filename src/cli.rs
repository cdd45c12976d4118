use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use clap::{Args, Parser, Subcommand};

use crate::records::{NewHealthRecord, RecordDetails, RecordKind};

/// Pet care reminder service
#[derive(Parser, Debug)]
#[command(name = "petcare")]
#[command(about = "Keeps pet health records and emails care reminders when they come due")]
#[command(version)]
pub(crate) struct Cli {
    // None runs the daemon
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum Command {
    /// Run the daily reminder check until stopped
    Daemon,
    /// Run one reminder check now and print the JSON report
    RunOnce,
    /// Apply database migrations and exit
    Migrate,
    /// Add a pet and print its id
    AddPet {
        name: String,
        breed: Option<String>,
    },
    ShowPet {
        pet_id: i64,
    },
    ListPets,
    /// Add a reminder, first due one interval from now, and print its id
    AddReminder {
        pet_id: i64,
        /// e.g. `deworming`, `internal_deworming`, `vaccine`, `bathing`
        reminder_type: String,
        email: String,
        interval_days: i64,
        /// Create the reminder switched off
        #[arg(long)]
        disabled: bool,
    },
    ShowReminder {
        reminder_id: i64,
    },
    ListReminders {
        pet_id: Option<i64>,
    },
    /// Change a reminder. A new interval restarts its schedule from now.
    SetReminder {
        reminder_id: i64,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        interval_days: Option<i64>,
        #[arg(long)]
        enabled: Option<bool>,
    },
    DeleteReminder {
        reminder_id: i64,
    },
    /// Add a health record and print its id
    AddRecord {
        #[command(subcommand)]
        record: RecordCommand,
    },
    /// List records of one kind (deworming, vaccine, bathing, weight), newest first
    ListRecords {
        kind: RecordKind,
        pet_id: Option<i64>,
    },
    /// Weight points for one pet, oldest first
    WeightHistory {
        pet_id: i64,
    },
}

#[derive(Args, Debug, PartialEq)]
pub(crate) struct RecordArgs {
    pet_id: i64,
    /// RFC 3339 timestamp or YYYY-MM-DD, defaults to now
    #[arg(long, value_parser = parse_date)]
    date: Option<DateTime<Utc>>,
    #[arg(long)]
    notes: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub(crate) enum RecordCommand {
    Deworming {
        #[command(flatten)]
        record: RecordArgs,
        #[arg(long)]
        brand: String,
        #[arg(long)]
        dosage: String,
        #[arg(long, value_parser = parse_date)]
        next_due_date: Option<DateTime<Utc>>,
    },
    Vaccine {
        #[command(flatten)]
        record: RecordArgs,
        #[arg(long = "type")]
        vaccine_type: String,
        #[arg(long)]
        institution: Option<String>,
        #[arg(long, value_parser = parse_date)]
        next_due_date: Option<DateTime<Utc>>,
    },
    Bathing {
        #[command(flatten)]
        record: RecordArgs,
        #[arg(long)]
        products: Option<String>,
        #[arg(long)]
        location: Option<String>,
    },
    Weight {
        #[command(flatten)]
        record: RecordArgs,
        #[arg(long)]
        weight: f64,
        #[arg(long, default_value = "kg")]
        unit: String,
        #[arg(long)]
        location: Option<String>,
    },
}

impl RecordCommand {
    /// Blank optional text is stored as missing.
    pub(crate) fn into_record(self, now: DateTime<Utc>) -> NewHealthRecord {
        let (record, details) = match self {
            RecordCommand::Deworming {
                record,
                brand,
                dosage,
                next_due_date,
            } => (
                record,
                RecordDetails::Deworming {
                    brand,
                    dosage,
                    next_due_date,
                },
            ),
            RecordCommand::Vaccine {
                record,
                vaccine_type,
                institution,
                next_due_date,
            } => (
                record,
                RecordDetails::Vaccine {
                    vaccine_type,
                    institution: non_blank(institution),
                    next_due_date,
                },
            ),
            RecordCommand::Bathing {
                record,
                products,
                location,
            } => (
                record,
                RecordDetails::Bathing {
                    products: non_blank(products),
                    location: non_blank(location),
                },
            ),
            RecordCommand::Weight {
                record,
                weight,
                unit,
                location,
            } => (
                record,
                RecordDetails::Weight {
                    weight,
                    unit: non_blank(Some(unit)).unwrap_or_else(|| "kg".to_owned()),
                    location: non_blank(location),
                },
            ),
        };

        NewHealthRecord {
            pet_id: record.pet_id,
            date: record.date.unwrap_or(now),
            notes: non_blank(record.notes),
            details,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_date(value: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(datetime) = DateTime::parse_from_rfc3339(value) {
        return Ok(datetime.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
        .ok_or_else(|| format!("expected an RFC 3339 timestamp or YYYY-MM-DD, got {value}"))
}
