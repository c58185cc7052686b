//! SQLite-Backend fuer alle Repository-Traits

pub mod groups;
pub mod permissions;
pub mod pool;
pub mod tokens;
pub mod users;

pub use pool::SqliteDb;

use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::DbError;
use crate::repository::DbResult;

/// Formatiert einen Zeitstempel mit fester Breite, damit Textvergleiche
/// in SQL der zeitlichen Reihenfolge entsprechen
pub(crate) fn zeitstempel(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn zeit_parsen(spalte: &str, wert: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(wert)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DbError::intern(format!("Ungueltiger Zeitstempel in {spalte} '{wert}': {e}")))
}

pub(crate) fn zeit_parsen_opt(spalte: &str, wert: Option<String>) -> DbResult<Option<DateTime<Utc>>> {
    wert.as_deref().map(|s| zeit_parsen(spalte, s)).transpose()
}

pub(crate) fn uuid_parsen(wert: &str) -> DbResult<Uuid> {
    Uuid::parse_str(wert).map_err(|e| DbError::intern(format!("Ungueltige UUID '{wert}': {e}")))
}
