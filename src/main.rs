#![deny(warnings)]
#![deny(clippy::all)]
#![deny(clippy::pedantic)]

mod actor;
mod batch;
mod cli;
mod config;
mod db;
mod email;
mod petdb;
mod records;
mod reminder;
mod supervisor;
mod trigger;

use std::{process, time::Duration};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use log::info;
use supervisor::supervisor::Supervisor;

use crate::{
    actor::{
        reminder_actor::{ReminderActor, ReminderActorMessage},
        tick_actor::TickActor,
    },
    batch::run_reminder_check,
    cli::{Cli, Command},
    config::Config,
    email::{LogMailer, MailgunMailer, ReminderMailer},
    petdb::{NewPet, NewReminder, PetDb, ReminderUpdate},
    reminder::ReminderSettings,
    trigger::BatchTrigger,
};

type Mailer = Box<dyn ReminderMailer + Send>;

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    info!("Initialising");
    let (config, db) = initialise()?;

    match cli.command.unwrap_or(Command::Daemon) {
        Command::Daemon => {
            let mailer = build_mailer(&config);
            info!("Running actors");
            run_actors(&config, db, mailer).context("Abnormal shutdown")
        }
        Command::RunOnce => {
            let mailer = build_mailer(&config);
            let report = run_reminder_check(&db, &mailer, Utc::now());
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success {
                process::exit(1);
            }
            Ok(())
        }
        // Migrations already ran in initialise
        Command::Migrate => Ok(()),
        command => run_store_command(&db, command),
    }
}

fn run_store_command(db: &PetDb, command: Command) -> Result<()> {
    match command {
        Command::AddPet { name, breed } => {
            let id = db.create_pet(&NewPet {
                name,
                breed,
                ..NewPet::default()
            })?;
            println!("{id}");
        }
        Command::ShowPet { pet_id } => {
            let Some(pet) = db.get_pet(pet_id)? else {
                bail!("No pet {pet_id}");
            };
            println!("{pet:#?}");
        }
        Command::ListPets => {
            for pet in db.list_pets()? {
                println!(
                    "{}\t{}\t{}",
                    pet.id,
                    pet.details.name,
                    pet.details.breed.as_deref().unwrap_or("-")
                );
            }
        }
        Command::AddReminder {
            pet_id,
            reminder_type,
            email,
            interval_days,
            disabled,
        } => {
            let reminder = db.create_reminder(
                &NewReminder {
                    pet_id,
                    reminder_type,
                    email,
                    interval_days,
                    is_enabled: !disabled,
                },
                Utc::now(),
            )?;
            println!("{}", reminder.id);
        }
        Command::ShowReminder { reminder_id } => {
            let Some(reminder) = db.get_reminder(reminder_id)? else {
                bail!("No reminder {reminder_id}");
            };
            println!("{reminder:#?}");
        }
        Command::ListReminders { pet_id } => {
            let now = Utc::now();
            for reminder in db.list_reminders(pet_id)? {
                println!("{}", reminder_line(&reminder, now));
            }
        }
        Command::SetReminder {
            reminder_id,
            email,
            interval_days,
            enabled,
        } => {
            let update = ReminderUpdate {
                email,
                interval_days,
                is_enabled: enabled,
            };
            let Some(reminder) = db.update_reminder(reminder_id, &update, Utc::now())? else {
                bail!("No reminder {reminder_id}");
            };
            println!("{reminder:#?}");
        }
        Command::DeleteReminder { reminder_id } => {
            if !db.delete_reminder(reminder_id)? {
                bail!("No reminder {reminder_id}");
            }
        }
        Command::AddRecord { record } => {
            let id = db.add_record(&record.into_record(Utc::now()))?;
            println!("{id}");
        }
        Command::ListRecords { kind, pet_id } => {
            for record in db.list_records(kind, pet_id)? {
                println!("{record}");
            }
        }
        Command::WeightHistory { pet_id } => {
            for point in db.weight_history(pet_id)? {
                println!("{}\t{}\t{}", point.date.to_rfc3339(), point.weight, point.unit);
            }
        }
        Command::Daemon | Command::RunOnce | Command::Migrate => {
            bail!("{command:?} does not use the store directly")
        }
    }

    Ok(())
}

fn reminder_line(reminder: &ReminderSettings, now: DateTime<Utc>) -> String {
    // Disabled reminders are never picked up by the batch
    let due = reminder.is_enabled && reminder.is_due(now);
    format!(
        "{}\t{} (pet {})\t{}\t{}\tevery {} days\t{}\tnext due {}{}",
        reminder.id,
        reminder.pet.name,
        reminder.pet.id,
        reminder.reminder_type,
        reminder.email,
        reminder.interval_days,
        if reminder.is_enabled {
            "enabled"
        } else {
            "disabled"
        },
        reminder
            .next_due_date
            .map_or_else(|| "never".to_owned(), |due| due.to_rfc3339()),
        if due { " (due)" } else { "" },
    )
}

fn initialise() -> Result<(Config, PetDb)> {
    let config = Config::load().context("Failed to load configuration")?;
    let db = PetDb::new(config.db_path.clone());

    db.run_migrations().context("Failed to run migrations")?;

    Ok((config, db))
}

fn build_mailer(config: &Config) -> Mailer {
    match &config.mailgun {
        Some(mailgun) => Box::new(MailgunMailer::new(
            mailgun.apikey.clone(),
            mailgun.domain.clone(),
            config.from_address.clone(),
            config.app_url.clone(),
        )),
        None => {
            info!("No Mailgun API key found, reminder emails will only be logged");
            Box::new(LogMailer::new(config.app_url.clone()))
        }
    }
}

fn run_actors(config: &Config, db: PetDb, mailer: Mailer) -> Result<()> {
    let mut supervisor = Supervisor::new();

    let trigger = BatchTrigger::new(config.check_at, config.run_on_startup);
    let tx_reminder = supervisor
        .start(ReminderActor::new(db, mailer, trigger), "ReminderActor")
        .context("Failed to start Reminder Actor")?;

    supervisor
        .start_message_source(
            TickActor::new(Duration::from_millis(1000), tx_reminder, |_| {
                ReminderActorMessage::Tick
            }),
            "Reminder Tick Actor",
        )
        .context("Failed to start Reminder Tick Actor")?;

    supervisor.supervise()
}

#[cfg(test)]
mod tests {
    use crate::reminder::testhelper::{at, reminder};

    use super::reminder_line;

    #[test]
    fn due_reminders_are_flagged() {
        let now = at("2024-01-05T00:00:00Z");
        let line = reminder_line(&reminder(1, Some("2024-01-01T00:00:00Z")), now);
        assert_eq!(
            line,
            "1\tMochi (pet 1)\tvaccine\towner1@example.org\tevery 30 days\tenabled\tnext due 2024-01-01T00:00:00+00:00 (due)"
        );

        let later = reminder_line(&reminder(2, Some("2024-02-01T00:00:00Z")), now);
        assert!(!later.ends_with("(due)"));
        let unscheduled = reminder_line(&reminder(3, None), now);
        assert!(unscheduled.ends_with("next due never"));
    }

    #[test]
    fn disabled_reminders_are_never_flagged_due() {
        let mut disabled = reminder(1, Some("2024-01-01T00:00:00Z"));
        disabled.is_enabled = false;

        let line = reminder_line(&disabled, at("2024-01-05T00:00:00Z"));

        assert!(line.contains("\tdisabled\t"));
        assert!(!line.ends_with("(due)"));
    }
}
