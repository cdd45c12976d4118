use chrono::NaiveTime;
use clokwerk::{Job, TimeUnits};
use crossbeam_channel::{unbounded, Receiver};
use log::debug;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum TriggerReason {
    Startup,
    Daily,
}

/// Decides when a reminder check should run. Firings are queued and handed
/// out by `tick`.
pub(crate) struct BatchTrigger {
    clokwerk: clokwerk::Scheduler,
    fired: Receiver<TriggerReason>,
}

impl BatchTrigger {
    pub(crate) fn new(check_at: NaiveTime, run_on_startup: bool) -> Self {
        let mut clokwerk = clokwerk::Scheduler::new();
        let (tx, fired) = unbounded();

        if run_on_startup {
            // The receiver is held by self, so this can't fail
            let _ = tx.send(TriggerReason::Startup);
        }

        clokwerk.every(1.day()).at_time(check_at).run(move || {
            debug!("Trigger firing daily reminder check");
            let _ = tx.send(TriggerReason::Daily);
        });

        Self { clokwerk, fired }
    }

    pub(crate) fn tick(&mut self) -> Vec<TriggerReason> {
        self.clokwerk.run_pending();
        self.fired.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Local};

    use super::{BatchTrigger, TriggerReason};

    #[test]
    fn fires_once_on_startup() {
        // Pick a check time well away from now so the daily job stays quiet
        let check_at = (Local::now() + Duration::hours(12)).time();
        let mut trigger = BatchTrigger::new(check_at, true);

        assert_eq!(trigger.tick(), vec![TriggerReason::Startup]);
        assert!(trigger.tick().is_empty());
    }

    #[test]
    fn quiet_without_startup_run() {
        let check_at = (Local::now() + Duration::hours(12)).time();
        let mut trigger = BatchTrigger::new(check_at, false);

        assert!(trigger.tick().is_empty());
    }
}
