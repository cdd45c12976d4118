use std::{error::Error, fmt};

use chrono::{DateTime, Days, Utc};

/// How far ahead of the due date a reminder already counts as due.
pub(crate) const EARLY_WARNING: Days = Days::new(3);

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PetRef {
    pub(crate) id: i64,
    pub(crate) name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ReminderSettings {
    pub(crate) id: i64,
    pub(crate) pet: PetRef,
    // Free-form tag such as "vaccine" or "bathing", only used for email content
    pub(crate) reminder_type: String,
    pub(crate) email: String,
    pub(crate) interval_days: i64,
    pub(crate) is_enabled: bool,
    pub(crate) last_sent: Option<DateTime<Utc>>,
    pub(crate) next_due_date: Option<DateTime<Utc>>,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub(crate) enum DueVerdict {
    NoSchedule,
    FirstSend,
    Overdue,
    DueSoon,
    NotYet,
}

impl DueVerdict {
    pub(crate) fn is_due(self) -> bool {
        matches!(
            self,
            DueVerdict::FirstSend | DueVerdict::Overdue | DueVerdict::DueSoon
        )
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct InvalidInterval(pub(crate) i64);

impl Error for InvalidInterval {}

impl fmt::Display for InvalidInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "interval of {} days is not a schedulable number of days",
            self.0
        )
    }
}

/// Checks a user supplied interval, returning it as a day count.
pub(crate) fn validate_interval(interval_days: i64) -> Result<Days, InvalidInterval> {
    u64::try_from(interval_days)
        .ok()
        .filter(|days| *days > 0)
        .map(Days::new)
        .ok_or(InvalidInterval(interval_days))
}

/// Adds `interval_days` to `from`, failing for non-positive intervals or
/// dates chrono can't represent.
pub(crate) fn advance(
    from: DateTime<Utc>,
    interval_days: i64,
) -> Result<DateTime<Utc>, InvalidInterval> {
    from.checked_add_days(validate_interval(interval_days)?)
        .ok_or(InvalidInterval(interval_days))
}

impl ReminderSettings {
    /// The due date after a send at `sent_at`. Anchored on the send time, not
    /// on the previous due date, so a late send shifts every later occurrence.
    pub(crate) fn next_due_after(
        &self,
        sent_at: DateTime<Utc>,
    ) -> Result<DateTime<Utc>, InvalidInterval> {
        advance(sent_at, self.interval_days)
    }

    pub(crate) fn evaluate(&self, now: DateTime<Utc>) -> DueVerdict {
        let Some(next_due_date) = self.next_due_date else {
            return DueVerdict::NoSchedule;
        };

        // Never true: a missing next_due_date has already returned above.
        // Kept so the rule order matches the documented policy.
        if self.last_sent.is_none() && self.next_due_date.is_none() {
            return DueVerdict::FirstSend;
        }

        if next_due_date < now {
            return DueVerdict::Overdue;
        }

        match now.checked_add_days(EARLY_WARNING) {
            Some(window_end) if next_due_date < window_end => DueVerdict::DueSoon,
            _ => DueVerdict::NotYet,
        }
    }

    pub(crate) fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.evaluate(now).is_due()
    }
}

#[cfg(test)]
pub(crate) mod testhelper {
    use std::str::FromStr;

    use chrono::{DateTime, Utc};

    use super::{PetRef, ReminderSettings};

    pub(crate) fn at(datetime: &str) -> DateTime<Utc> {
        DateTime::from_str(datetime).unwrap()
    }

    pub(crate) fn reminder(id: i64, next_due_date: Option<&str>) -> ReminderSettings {
        ReminderSettings {
            id,
            pet: PetRef {
                id: 1,
                name: "Mochi".to_owned(),
            },
            reminder_type: "vaccine".to_owned(),
            email: format!("owner{id}@example.org"),
            interval_days: 30,
            is_enabled: true,
            last_sent: None,
            next_due_date: next_due_date.map(at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        advance,
        testhelper::{at, reminder},
        validate_interval, DueVerdict, InvalidInterval,
    };

    #[test]
    fn no_due_date_is_never_due() {
        let mut r = reminder(1, None);
        for now in ["1970-01-01T00:00:00Z", "2024-01-05T00:00:00Z", "2999-12-31T00:00:00Z"] {
            assert_eq!(r.evaluate(at(now)), DueVerdict::NoSchedule);
            r.last_sent = Some(at("2023-12-01T00:00:00Z"));
            assert!(!r.is_due(at(now)));
            r.last_sent = None;
        }
    }

    #[test]
    fn overdue() {
        let r = reminder(1, Some("2024-01-01T00:00:00Z"));
        assert_eq!(r.evaluate(at("2024-01-05T00:00:00Z")), DueVerdict::Overdue);
        assert!(r.is_due(at("2024-01-05T00:00:00Z")));
    }

    #[test]
    fn due_within_three_days() {
        let r = reminder(1, Some("2024-01-10T00:00:00Z"));
        assert_eq!(r.evaluate(at("2024-01-08T00:00:00Z")), DueVerdict::DueSoon);
    }

    #[test]
    fn due_exactly_now_is_in_warning_window() {
        let r = reminder(1, Some("2024-01-08T00:00:00Z"));
        assert_eq!(r.evaluate(at("2024-01-08T00:00:00Z")), DueVerdict::DueSoon);
    }

    #[test]
    fn not_due_far_ahead() {
        let r = reminder(1, Some("2024-01-20T00:00:00Z"));
        assert_eq!(r.evaluate(at("2024-01-08T00:00:00Z")), DueVerdict::NotYet);
        assert!(!r.is_due(at("2024-01-08T00:00:00Z")));
    }

    #[test]
    fn warning_window_end_is_exclusive() {
        let r = reminder(1, Some("2024-01-11T00:00:00Z"));
        assert!(!r.is_due(at("2024-01-08T00:00:00Z")));
        assert!(r.is_due(at("2024-01-08T00:00:01Z")));
    }

    #[test]
    fn next_due_is_anchored_on_send_time() {
        let r = reminder(1, Some("2024-01-01T00:00:00Z"));
        assert_eq!(
            r.next_due_after(at("2024-01-05T00:00:00Z")).unwrap(),
            at("2024-02-04T00:00:00Z")
        );
    }

    #[test]
    fn rejects_non_positive_intervals() {
        assert_eq!(validate_interval(0), Err(InvalidInterval(0)));
        assert_eq!(validate_interval(-7), Err(InvalidInterval(-7)));
        assert!(validate_interval(1).is_ok());
        assert_eq!(
            advance(at("2024-01-01T00:00:00Z"), -1),
            Err(InvalidInterval(-1))
        );
    }

    #[test]
    fn rejects_unrepresentable_due_dates() {
        assert_eq!(
            advance(at("2024-01-01T00:00:00Z"), i64::MAX),
            Err(InvalidInterval(i64::MAX))
        );
    }
}
