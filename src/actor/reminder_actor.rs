use chrono::Utc;
use log::{error, info};

use crate::{
    batch::run_reminder_check,
    email::ReminderMailer,
    petdb::PetDb,
    trigger::{BatchTrigger, TriggerReason},
};

use super::actor::{Actor, Flow};

pub(crate) enum ReminderActorMessage {
    Tick,
}

/// Owns the store and the mailer and runs a reminder check whenever the
/// trigger fires. Checks run one at a time on this actor's thread.
pub(crate) struct ReminderActor<TMailer>
where
    TMailer: ReminderMailer,
{
    store: PetDb,
    mailer: TMailer,
    trigger: BatchTrigger,
}

impl<TMailer> ReminderActor<TMailer>
where
    TMailer: ReminderMailer,
{
    pub(crate) fn new(store: PetDb, mailer: TMailer, trigger: BatchTrigger) -> Self {
        Self {
            store,
            mailer,
            trigger,
        }
    }

    fn check(&self, reason: TriggerReason) {
        info!("Reminder check triggered: {reason:?}");
        let report = run_reminder_check(&self.store, &self.mailer, Utc::now());
        if let Some(err) = report.error {
            error!("Reminder check did not run: {err}");
        } else {
            info!("Reminder check report: {:?}", report.summary);
        }
    }
}

impl<TMailer> Actor<ReminderActorMessage> for ReminderActor<TMailer>
where
    TMailer: ReminderMailer,
{
    fn startup(&mut self) -> anyhow::Result<()> {
        info!("Reminder actor started");
        Ok(())
    }

    fn handle_message(&mut self, msg: ReminderActorMessage) -> anyhow::Result<Flow> {
        match msg {
            ReminderActorMessage::Tick => {
                for reason in self.trigger.tick() {
                    // A failed check is retried on the next firing
                    self.check(reason);
                }
            }
        }

        Ok(Flow::Continue)
    }
}
