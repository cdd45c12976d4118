use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::{
    batch::{EnabledReminders, MalformedReminder, ReminderStore},
    db::{fmt_datetime_for_sqlite, parse_datetime_from_sqlite, Db, Migration},
    records::{HealthRecord, NewHealthRecord, RecordDetails, RecordKind, WeightPoint},
    reminder::{advance, PetRef, ReminderSettings},
};

pub(crate) const MIGRATIONS: &[Migration] = &[
    Migration {
        id: "001",
        sql: "CREATE TABLE pets (
                  id          INTEGER PRIMARY KEY
                , name        TEXT NOT NULL
                , breed       TEXT
                , birthday    TIMESTAMP
                , gender      TEXT
                , color       TEXT
                , photo       TEXT
                , notes       TEXT
                , created_on  DEFAULT CURRENT_TIMESTAMP
            )",
    },
    Migration {
        id: "002",
        sql: "CREATE TABLE reminder_settings (
                  id             INTEGER PRIMARY KEY
                , pet_id         INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE
                , reminder_type  TEXT NOT NULL
                , email          TEXT NOT NULL
                , interval_days  INTEGER NOT NULL
                , is_enabled     INTEGER NOT NULL DEFAULT 1
                , last_sent      TIMESTAMP
                , next_due_date  TIMESTAMP
                , created_on     DEFAULT CURRENT_TIMESTAMP
                , updated_on     TIMESTAMP
            );
            CREATE INDEX reminder_settings_pet_id ON reminder_settings (pet_id);",
    },
    Migration {
        id: "003",
        sql: "CREATE TABLE deworming_records (
                  id             INTEGER PRIMARY KEY
                , pet_id         INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE
                , date           TIMESTAMP NOT NULL
                , brand          TEXT NOT NULL
                , dosage         TEXT NOT NULL
                , next_due_date  TIMESTAMP
                , notes          TEXT
            );
            CREATE TABLE vaccine_records (
                  id             INTEGER PRIMARY KEY
                , pet_id         INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE
                , date           TIMESTAMP NOT NULL
                , vaccine_type   TEXT NOT NULL
                , institution    TEXT
                , next_due_date  TIMESTAMP
                , notes          TEXT
            );
            CREATE TABLE bathing_records (
                  id        INTEGER PRIMARY KEY
                , pet_id    INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE
                , date      TIMESTAMP NOT NULL
                , products  TEXT
                , location  TEXT
                , notes     TEXT
            );
            CREATE TABLE weight_records (
                  id        INTEGER PRIMARY KEY
                , pet_id    INTEGER NOT NULL REFERENCES pets(id) ON DELETE CASCADE
                , date      TIMESTAMP NOT NULL
                , weight    REAL NOT NULL
                , unit      TEXT NOT NULL DEFAULT 'kg'
                , location  TEXT
                , notes     TEXT
            );",
    },
];

#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub(crate) struct NewPet {
    pub(crate) name: String,
    pub(crate) breed: Option<String>,
    pub(crate) birthday: Option<DateTime<Utc>>,
    pub(crate) gender: Option<String>,
    pub(crate) color: Option<String>,
    pub(crate) photo: Option<String>,
    pub(crate) notes: Option<String>,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct Pet {
    pub(crate) id: i64,
    pub(crate) details: NewPet,
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub(crate) struct NewReminder {
    pub(crate) pet_id: i64,
    pub(crate) reminder_type: String,
    pub(crate) email: String,
    pub(crate) interval_days: i64,
    pub(crate) is_enabled: bool,
}

/// Fields left as `None` are not touched.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
pub(crate) struct ReminderUpdate {
    pub(crate) email: Option<String>,
    pub(crate) interval_days: Option<i64>,
    pub(crate) is_enabled: Option<bool>,
}

const REMINDER_SELECT: &str = "
    SELECT
          r.id
        , r.pet_id
        , p.name
        , r.reminder_type
        , r.email
        , r.interval_days
        , r.is_enabled
        , r.last_sent
        , r.next_due_date
    FROM reminder_settings r
    JOIN pets p ON p.id = r.pet_id
";

// A reminder row before its timestamps have been parsed
struct ReminderRow {
    id: i64,
    pet: PetRef,
    reminder_type: String,
    email: String,
    interval_days: i64,
    is_enabled: bool,
    last_sent: Option<String>,
    next_due_date: Option<String>,
}

impl ReminderRow {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            pet: PetRef {
                id: row.get(1)?,
                name: row.get(2)?,
            },
            reminder_type: row.get(3)?,
            email: row.get(4)?,
            interval_days: row.get(5)?,
            is_enabled: row.get(6)?,
            last_sent: row.get(7)?,
            next_due_date: row.get(8)?,
        })
    }

    fn parse(self) -> Result<ReminderSettings> {
        let last_sent = parse_opt(self.last_sent)?;
        let next_due_date = parse_opt(self.next_due_date)?;
        Ok(ReminderSettings {
            id: self.id,
            pet: self.pet,
            reminder_type: self.reminder_type,
            email: self.email,
            interval_days: self.interval_days,
            is_enabled: self.is_enabled,
            last_sent,
            next_due_date,
        })
    }
}

fn fmt_opt(datetime: Option<DateTime<Utc>>) -> Option<String> {
    datetime.map(|dt| fmt_datetime_for_sqlite(&dt))
}

fn parse_opt(encoded: Option<String>) -> Result<Option<DateTime<Utc>>> {
    encoded
        .map(|dt| parse_datetime_from_sqlite(&dt))
        .transpose()
}

pub(crate) struct PetDb {
    db: Db,
}

impl PetDb {
    pub(crate) fn new(path: String) -> Self {
        Self { db: Db::new(path) }
    }

    pub(crate) fn run_migrations(&self) -> Result<()> {
        self.db.upgrade(MIGRATIONS)
    }

    pub(crate) fn create_pet(&self, pet: &NewPet) -> Result<i64> {
        let conn = self.db.new_conn()?;
        conn.execute(
            "
                INSERT INTO pets (name, breed, birthday, gender, color, photo, notes)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ",
            params![
                pet.name,
                pet.breed,
                fmt_opt(pet.birthday),
                pet.gender,
                pet.color,
                pet.photo,
                pet.notes
            ],
        )
        .context("Failed to create pet")?;
        Ok(conn.last_insert_rowid())
    }

    pub(crate) fn get_pet(&self, pet_id: i64) -> Result<Option<Pet>> {
        let conn = self.db.new_conn()?;
        let mut stmt = conn.prepare(
            "
                SELECT id, name, breed, birthday, gender, color, photo, notes
                FROM pets
                WHERE id = ?1
            ",
        )?;
        let row = stmt
            .query_row([pet_id], pet_columns)
            .optional()
            .context("Failed to load pet")?;
        row.map(Self::pet_from_columns).transpose()
    }

    /// Newest first.
    pub(crate) fn list_pets(&self) -> Result<Vec<Pet>> {
        let conn = self.db.new_conn()?;
        let mut stmt = conn.prepare(
            "
                SELECT id, name, breed, birthday, gender, color, photo, notes
                FROM pets
                ORDER BY id DESC
            ",
        )?;
        let rows = stmt
            .query_map((), pet_columns)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list pets")?;
        rows.into_iter().map(Self::pet_from_columns).collect()
    }

    fn pet_from_columns(columns: PetColumns) -> Result<Pet> {
        let (id, name, breed, birthday, gender, color, photo, notes) = columns;
        Ok(Pet {
            id,
            details: NewPet {
                name,
                breed,
                birthday: parse_opt(birthday)?,
                gender,
                color,
                photo,
                notes,
            },
        })
    }

    /// Creates an enabled or disabled reminder whose first due date is
    /// `interval_days` after `now`.
    pub(crate) fn create_reminder(
        &self,
        reminder: &NewReminder,
        now: DateTime<Utc>,
    ) -> Result<ReminderSettings> {
        let next_due_date = advance(now, reminder.interval_days)?;
        let conn = self.db.new_conn()?;
        conn.execute(
            "
                INSERT INTO reminder_settings (
                    pet_id
                  , reminder_type
                  , email
                  , interval_days
                  , is_enabled
                  , next_due_date
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
            params![
                reminder.pet_id,
                reminder.reminder_type,
                reminder.email,
                reminder.interval_days,
                reminder.is_enabled,
                fmt_datetime_for_sqlite(&next_due_date)
            ],
        )
        .context("Failed to create reminder")?;
        let id = conn.last_insert_rowid();
        info!(
            "Created {} reminder {id} for pet {}, first due {next_due_date}",
            reminder.reminder_type, reminder.pet_id
        );

        Self::query_reminder(&conn, id)?.context("Reminder vanished after insert")
    }

    pub(crate) fn get_reminder(&self, reminder_id: i64) -> Result<Option<ReminderSettings>> {
        let conn = self.db.new_conn()?;
        Self::query_reminder(&conn, reminder_id)
    }

    fn query_reminder(conn: &Connection, reminder_id: i64) -> Result<Option<ReminderSettings>> {
        let mut stmt = conn.prepare(&format!("{REMINDER_SELECT} WHERE r.id = ?1"))?;
        stmt.query_row([reminder_id], ReminderRow::from_row)
            .optional()
            .context("Failed to load reminder")?
            .map(ReminderRow::parse)
            .transpose()
    }

    /// Newest first, optionally only for one pet.
    pub(crate) fn list_reminders(&self, pet_id: Option<i64>) -> Result<Vec<ReminderSettings>> {
        let conn = self.db.new_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{REMINDER_SELECT} WHERE ?1 IS NULL OR r.pet_id = ?1 ORDER BY r.id DESC"
        ))?;
        let rows = stmt
            .query_map([pet_id], ReminderRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("Failed to list reminders")?;
        rows.into_iter().map(ReminderRow::parse).collect()
    }

    /// Changing the interval restarts the schedule from `now`.
    pub(crate) fn update_reminder(
        &self,
        reminder_id: i64,
        update: &ReminderUpdate,
        now: DateTime<Utc>,
    ) -> Result<Option<ReminderSettings>> {
        let next_due_date = update
            .interval_days
            .map(|days| advance(now, days))
            .transpose()?;

        let conn = self.db.new_conn()?;
        let changed = conn
            .execute(
                "
                    UPDATE reminder_settings
                    SET email = COALESCE(?2, email)
                      , interval_days = COALESCE(?3, interval_days)
                      , is_enabled = COALESCE(?4, is_enabled)
                      , next_due_date = COALESCE(?5, next_due_date)
                      , updated_on = ?6
                    WHERE id = ?1
                ",
                params![
                    reminder_id,
                    update.email,
                    update.interval_days,
                    update.is_enabled,
                    fmt_opt(next_due_date),
                    fmt_datetime_for_sqlite(&now)
                ],
            )
            .context("Failed to update reminder")?;

        if changed == 0 {
            return Ok(None);
        }
        Self::query_reminder(&conn, reminder_id)
    }

    pub(crate) fn delete_reminder(&self, reminder_id: i64) -> Result<bool> {
        let conn = self.db.new_conn()?;
        let deleted = conn
            .execute("DELETE FROM reminder_settings WHERE id = ?1", [reminder_id])
            .context("Failed to delete reminder")?;
        Ok(deleted > 0)
    }

    pub(crate) fn add_record(&self, record: &NewHealthRecord) -> Result<i64> {
        let conn = self.db.new_conn()?;
        let date = fmt_datetime_for_sqlite(&record.date);
        let inserted = match &record.details {
            RecordDetails::Deworming {
                brand,
                dosage,
                next_due_date,
            } => conn.execute(
                "
                    INSERT INTO deworming_records (pet_id, date, brand, dosage, next_due_date, notes)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    record.pet_id,
                    date,
                    brand,
                    dosage,
                    fmt_opt(*next_due_date),
                    record.notes
                ],
            ),
            RecordDetails::Vaccine {
                vaccine_type,
                institution,
                next_due_date,
            } => conn.execute(
                "
                    INSERT INTO vaccine_records (pet_id, date, vaccine_type, institution, next_due_date, notes)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![
                    record.pet_id,
                    date,
                    vaccine_type,
                    institution,
                    fmt_opt(*next_due_date),
                    record.notes
                ],
            ),
            RecordDetails::Bathing { products, location } => conn.execute(
                "
                    INSERT INTO bathing_records (pet_id, date, products, location, notes)
                    VALUES (?1, ?2, ?3, ?4, ?5)
                ",
                params![record.pet_id, date, products, location, record.notes],
            ),
            RecordDetails::Weight {
                weight,
                unit,
                location,
            } => conn.execute(
                "
                    INSERT INTO weight_records (pet_id, date, weight, unit, location, notes)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ",
                params![record.pet_id, date, weight, unit, location, record.notes],
            ),
        };
        inserted.with_context(|| format!("Failed to add {:?} record", record.details.kind()))?;

        Ok(conn.last_insert_rowid())
    }

    /// Newest date first, optionally only for one pet.
    pub(crate) fn list_records(
        &self,
        kind: RecordKind,
        pet_id: Option<i64>,
    ) -> Result<Vec<HealthRecord>> {
        // Every table is read as (id, pet_id, date, notes, a, b, c)
        let select = match kind {
            RecordKind::Deworming => {
                "SELECT id, pet_id, date, notes, brand, dosage, next_due_date FROM deworming_records"
            }
            RecordKind::Vaccine => {
                "SELECT id, pet_id, date, notes, vaccine_type, institution, next_due_date FROM vaccine_records"
            }
            RecordKind::Bathing => {
                "SELECT id, pet_id, date, notes, products, location, NULL FROM bathing_records"
            }
            RecordKind::Weight => {
                "SELECT id, pet_id, date, notes, weight, unit, location FROM weight_records"
            }
        };

        let conn = self.db.new_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{select} WHERE ?1 IS NULL OR pet_id = ?1 ORDER BY date DESC, id DESC"
        ))?;
        let mut rows = stmt.query([pet_id])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let details = match kind {
                RecordKind::Deworming => RecordDetails::Deworming {
                    brand: row.get(4)?,
                    dosage: row.get(5)?,
                    next_due_date: parse_opt(row.get(6)?)?,
                },
                RecordKind::Vaccine => RecordDetails::Vaccine {
                    vaccine_type: row.get(4)?,
                    institution: row.get(5)?,
                    next_due_date: parse_opt(row.get(6)?)?,
                },
                RecordKind::Bathing => RecordDetails::Bathing {
                    products: row.get(4)?,
                    location: row.get(5)?,
                },
                RecordKind::Weight => RecordDetails::Weight {
                    weight: row.get(4)?,
                    unit: row.get(5)?,
                    location: row.get(6)?,
                },
            };
            records.push(HealthRecord {
                id: row.get(0)?,
                pet_id: row.get(1)?,
                date: parse_datetime_from_sqlite(&row.get::<usize, String>(2)?)?,
                notes: row.get(3)?,
                details,
            });
        }

        Ok(records)
    }

    /// Oldest first, for plotting.
    pub(crate) fn weight_history(&self, pet_id: i64) -> Result<Vec<WeightPoint>> {
        let mut points: Vec<WeightPoint> = self
            .list_records(RecordKind::Weight, Some(pet_id))?
            .into_iter()
            .filter_map(|record| match record.details {
                RecordDetails::Weight { weight, unit, .. } => Some(WeightPoint {
                    date: record.date,
                    weight: (weight * 100.0).round() / 100.0,
                    unit,
                }),
                _ => None,
            })
            .collect();
        points.reverse();
        Ok(points)
    }
}

type PetColumns = (
    i64,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn pet_columns(row: &Row) -> rusqlite::Result<PetColumns> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

impl ReminderStore for PetDb {
    fn load_enabled_reminders(&self) -> Result<EnabledReminders> {
        let conn = self.db.new_conn()?;
        let mut stmt = conn.prepare(&format!(
            "{REMINDER_SELECT} WHERE r.is_enabled = 1 ORDER BY r.id"
        ))?;
        let rows = stmt
            .query_map((), ReminderRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut loaded = EnabledReminders::default();
        for row in rows {
            let id = row.id;
            match row.parse() {
                Ok(reminder) => loaded.reminders.push(reminder),
                Err(error) => loaded.malformed.push(MalformedReminder { id, error }),
            }
        }
        Ok(loaded)
    }

    fn mark_sent(
        &self,
        reminder_id: i64,
        last_sent: DateTime<Utc>,
        next_due_date: DateTime<Utc>,
    ) -> Result<()> {
        let conn = self.db.new_conn()?;
        let changed = conn.execute(
            "
                UPDATE reminder_settings
                SET last_sent = ?2
                  , next_due_date = ?3
                WHERE id = ?1
            ",
            params![
                reminder_id,
                fmt_datetime_for_sqlite(&last_sent),
                fmt_datetime_for_sqlite(&next_due_date)
            ],
        )?;
        if changed == 0 {
            anyhow::bail!("reminder {reminder_id} no longer exists");
        }
        Ok(())
    }
}
