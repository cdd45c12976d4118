use std::{error::Error, fmt};

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::info;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, PartialEq, PartialOrd)]
struct UnknownMigrationError(String);

impl Error for UnknownMigrationError {}

impl fmt::Display for UnknownMigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "migration ID {} in database doesn't appear in migration history",
            self.0
        )
    }
}

// Fixed width for years 0 to 9999, so those timestamps sort as text.
// Later years gain a sign and still round trip.
static SQLITE_DATETIME_FMT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

// Lets tests swap in a temporary file that cleans itself up.
trait DbFilePath {
    fn path(&self) -> String;
}

impl DbFilePath for String {
    fn path(&self) -> String {
        self.clone()
    }
}

pub(crate) struct Migration<'a> {
    pub(crate) id: &'a str,
    pub(crate) sql: &'a str,
}

pub(crate) struct Db {
    file_path: Box<dyn DbFilePath + Send + Sync + 'static>,
}

impl Db {
    pub(crate) fn new(file_path: String) -> Self {
        Self {
            file_path: Box::new(file_path),
        }
    }

    pub(crate) fn upgrade(&self, migrations: &[Migration]) -> Result<()> {
        let mut conn = self.new_conn()?;
        let pending = Self::pending_migrations(&conn, migrations)?;
        for migration in pending {
            info!("Running migration {}", migration.id);
            let tx = conn.transaction()?;
            tx.execute_batch(migration.sql)?;
            tx.execute(
                "INSERT INTO migrations (migration_id) VALUES (?1)",
                [&migration.id],
            )?;
            tx.commit()?;
        }

        Ok(())
    }

    fn pending_migrations<'a, 'b>(
        conn: &Connection,
        migrations: &'a [Migration<'b>],
    ) -> Result<&'a [Migration<'b>]> {
        conn.execute(
            "
                CREATE TABLE IF NOT EXISTS migrations (
                    id             INTEGER PRIMARY KEY
                    , migration_id TEXT NOT NULL
                    , created_on   DEFAULT CURRENT_TIMESTAMP
                )
            ",
            (),
        )?;

        let current_migration = conn
            .query_row(
                "SELECT migration_id FROM migrations ORDER BY id DESC LIMIT 1",
                (),
                |row| row.get::<usize, String>(0),
            )
            .optional()?;

        match current_migration {
            Some(current_migration_id) => {
                info!("Current DB migration: {current_migration_id}");
                migrations
                    .iter()
                    .position(|m| m.id == current_migration_id)
                    .map(|idx| &migrations[idx + 1..])
                    .ok_or(UnknownMigrationError(current_migration_id).into())
            }
            None => {
                info!("Current DB migration: None");
                Ok(migrations)
            }
        }
    }

    pub(crate) fn new_conn(&self) -> Result<Connection> {
        let conn = Connection::open(self.file_path.path())
            .context("Failed to open new sqlite connection")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;
        Ok(conn)
    }
}

pub(crate) fn parse_datetime_from_sqlite(encoded: &str) -> Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(encoded, SQLITE_DATETIME_FMT)
        .with_context(|| format!("Invalid timestamp in database: {encoded}"))?;
    Ok(Utc.from_utc_datetime(&naive))
}

pub(crate) fn fmt_datetime_for_sqlite(datetime: &DateTime<Utc>) -> String {
    datetime.format(SQLITE_DATETIME_FMT).to_string()
}

#[cfg(test)]
pub(crate) mod testhelper {
    use std::{
        env, process,
        sync::atomic::{AtomicU32, Ordering},
    };

    use super::{Db, DbFilePath};

    static NEXT_TMP_ID: AtomicU32 = AtomicU32::new(0);

    // Removed as soon as it goes out of scope
    pub(crate) struct TmpFile {
        path: String,
    }

    impl TmpFile {
        pub(crate) fn new() -> Self {
            let name = format!(
                "petcare-test-{}-{}.sqlite",
                process::id(),
                NEXT_TMP_ID.fetch_add(1, Ordering::SeqCst)
            );
            Self {
                path: env::temp_dir().join(name).to_str().unwrap().to_string(),
            }
        }
    }

    impl Drop for TmpFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    impl DbFilePath for TmpFile {
        fn path(&self) -> String {
            self.path.clone()
        }
    }

    impl Db {
        pub(crate) fn new_tmp() -> Self {
            Self {
                file_path: Box::new(TmpFile::new()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Days;
    use rusqlite::{Connection, OptionalExtension};

    use crate::reminder::testhelper::at;

    use super::{
        fmt_datetime_for_sqlite, parse_datetime_from_sqlite, Db, Migration,
        UnknownMigrationError,
    };

    static MIGRATIONS: &[Migration] = &[
        Migration {
            id: "001",
            sql: "CREATE TABLE pets (
                id    INTEGER PRIMARY KEY
              , name  TEXT NOT NULL
            )",
        },
        Migration {
            id: "002",
            sql: "CREATE TABLE visits (
                id      INTEGER PRIMARY KEY
              , pet_id  INTEGER NOT NULL REFERENCES pets(id)
            );
            CREATE INDEX visits_pet_id ON visits (pet_id);",
        },
    ];

    #[test]
    fn upgrade_from_empty_db() {
        let db = Db::new_tmp();

        db.upgrade(MIGRATIONS).unwrap();

        let conn = db.new_conn().unwrap();
        assert!(table_exists(&conn, "migrations"));
        assert!(table_exists(&conn, "pets"));
        assert!(table_exists(&conn, "visits"));
    }

    #[test]
    fn upgrade_is_incremental() {
        let db = Db::new_tmp();

        db.upgrade(&MIGRATIONS[0..1]).unwrap();
        {
            let conn = db.new_conn().unwrap();
            assert!(table_exists(&conn, "pets"));
            assert!(!table_exists(&conn, "visits"));
        }

        db.upgrade(MIGRATIONS).unwrap();
        // Running again with nothing pending is a no-op
        db.upgrade(MIGRATIONS).unwrap();

        let conn = db.new_conn().unwrap();
        assert!(table_exists(&conn, "visits"));
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", (), |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 2);
    }

    #[test]
    fn fail_on_unknown_migration() {
        let db = Db::new_tmp();
        db.upgrade(MIGRATIONS).unwrap();

        let err: UnknownMigrationError = db
            .upgrade(&MIGRATIONS[0..1])
            .unwrap_err()
            .downcast()
            .unwrap();

        assert_eq!(err, UnknownMigrationError("002".to_owned()));
    }

    #[test]
    fn failed_migration_is_not_recorded() {
        let db = Db::new_tmp();

        let err: rusqlite::Error = db
            .upgrade(&[Migration {
                id: "001",
                sql: "oh no",
            }])
            .unwrap_err()
            .downcast()
            .unwrap();
        assert!(matches!(err, rusqlite::Error::SqlInputError { .. }));

        let conn = db.new_conn().unwrap();
        let applied: i64 = conn
            .query_row("SELECT COUNT(*) FROM migrations", (), |row| row.get(0))
            .unwrap();
        assert_eq!(applied, 0);
    }

    #[test]
    fn foreign_keys_are_enforced() {
        let db = Db::new_tmp();
        db.upgrade(MIGRATIONS).unwrap();

        let conn = db.new_conn().unwrap();
        assert!(conn
            .execute("INSERT INTO visits (pet_id) VALUES (42)", ())
            .is_err());
    }

    #[test]
    fn datetime_survives_sqlite_format() {
        let dt = at("2024-01-05T13:45:10.250Z");
        let encoded = fmt_datetime_for_sqlite(&dt);
        assert_eq!(encoded, "2024-01-05T13:45:10.250Z");
        assert_eq!(parse_datetime_from_sqlite(&encoded).unwrap(), dt);
        assert_eq!(
            fmt_datetime_for_sqlite(&at("2024-01-05T00:00:00Z")),
            "2024-01-05T00:00:00.000Z"
        );
        assert!(parse_datetime_from_sqlite("yesterday").is_err());
    }

    #[test]
    fn datetime_past_year_9999_round_trips() {
        let far = at("2024-01-01T00:00:00Z")
            .checked_add_days(Days::new(3_000_000))
            .unwrap();
        let encoded = fmt_datetime_for_sqlite(&far);
        assert!(encoded.starts_with('+'));
        assert_eq!(parse_datetime_from_sqlite(&encoded).unwrap(), far);
    }

    fn table_exists(conn: &Connection, table_name: &str) -> bool {
        conn.query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name=:name",
            &[(":name", table_name)],
            |row| row.get::<usize, i32>(0),
        )
        .optional()
        .unwrap()
        .is_some()
    }
}
