use std::{error::Error, fmt, str::FromStr};

use chrono::{DateTime, Utc};

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub(crate) enum RecordKind {
    Deworming,
    Vaccine,
    Bathing,
    Weight,
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) struct UnknownRecordKind(String);

impl Error for UnknownRecordKind {}

impl fmt::Display for UnknownRecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown record kind {}", self.0)
    }
}

impl FromStr for RecordKind {
    type Err = UnknownRecordKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deworming" => Ok(RecordKind::Deworming),
            "vaccine" => Ok(RecordKind::Vaccine),
            "bathing" => Ok(RecordKind::Bathing),
            "weight" => Ok(RecordKind::Weight),
            other => Err(UnknownRecordKind(other.to_owned())),
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) enum RecordDetails {
    Deworming {
        brand: String,
        dosage: String,
        next_due_date: Option<DateTime<Utc>>,
    },
    Vaccine {
        vaccine_type: String,
        institution: Option<String>,
        next_due_date: Option<DateTime<Utc>>,
    },
    Bathing {
        products: Option<String>,
        location: Option<String>,
    },
    Weight {
        weight: f64,
        unit: String,
        location: Option<String>,
    },
}

impl RecordDetails {
    pub(crate) fn kind(&self) -> RecordKind {
        match self {
            RecordDetails::Deworming { .. } => RecordKind::Deworming,
            RecordDetails::Vaccine { .. } => RecordKind::Vaccine,
            RecordDetails::Bathing { .. } => RecordKind::Bathing,
            RecordDetails::Weight { .. } => RecordKind::Weight,
        }
    }
}

impl fmt::Display for RecordDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordDetails::Deworming {
                brand,
                dosage,
                next_due_date,
            } => {
                write!(f, "deworming {brand} {dosage}")?;
                if let Some(due) = next_due_date {
                    write!(f, ", next due {}", due.format("%Y-%m-%d"))?;
                }
                Ok(())
            }
            RecordDetails::Vaccine {
                vaccine_type,
                institution,
                next_due_date,
            } => {
                write!(f, "vaccine {vaccine_type}")?;
                if let Some(institution) = institution {
                    write!(f, " at {institution}")?;
                }
                if let Some(due) = next_due_date {
                    write!(f, ", next due {}", due.format("%Y-%m-%d"))?;
                }
                Ok(())
            }
            RecordDetails::Bathing { products, location } => {
                write!(f, "bath")?;
                if let Some(products) = products {
                    write!(f, " with {products}")?;
                }
                if let Some(location) = location {
                    write!(f, " at {location}")?;
                }
                Ok(())
            }
            RecordDetails::Weight {
                weight,
                unit,
                location,
            } => {
                write!(f, "weight {weight} {unit}")?;
                if let Some(location) = location {
                    write!(f, " at {location}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct NewHealthRecord {
    pub(crate) pet_id: i64,
    pub(crate) date: DateTime<Utc>,
    pub(crate) notes: Option<String>,
    pub(crate) details: RecordDetails,
}

#[derive(Debug, PartialEq, Clone)]
pub(crate) struct HealthRecord {
    pub(crate) id: i64,
    pub(crate) pet_id: i64,
    pub(crate) date: DateTime<Utc>,
    pub(crate) notes: Option<String>,
    pub(crate) details: RecordDetails,
}

impl fmt::Display for HealthRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\tpet {}\t{}\t{}",
            self.id,
            self.pet_id,
            self.date.format("%Y-%m-%d"),
            self.details
        )?;
        if let Some(notes) = &self.notes {
            write!(f, "\t{notes}")?;
        }
        Ok(())
    }
}

/// One point of a pet's weight curve.
#[derive(Debug, PartialEq, Clone)]
pub(crate) struct WeightPoint {
    pub(crate) date: DateTime<Utc>,
    // Rounded to two decimal places
    pub(crate) weight: f64,
    pub(crate) unit: String,
}
