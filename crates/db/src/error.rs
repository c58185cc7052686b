//! Fehlertypen fuer das Datenbank-Crate

use thiserror::Error;

/// Datenbank-Fehlertypen
#[derive(Debug, Error)]
pub enum DbError {
    #[error("Datensatz nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Eindeutigkeitsverletzung; enthaelt den Namen des betroffenen Feldes
    #[error("Eindeutigkeitsverletzung: {0}")]
    Eindeutigkeit(String),

    #[error("Ungueltige Daten: {0}")]
    UngueltigeDaten(String),

    #[error("SQLx-Fehler: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration-Fehler: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("JSON-Fehler: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Interner DB-Fehler: {0}")]
    Intern(String),
}

impl DbError {
    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    /// Uebersetzt einen SQLx-Fehler; UNIQUE-Verletzungen werden dem Feld
    /// aus `felder` zugeordnet, dessen Spaltenname in der Meldung vorkommt.
    ///
    /// SQLite meldet z.B. `UNIQUE constraint failed: users.email`.
    pub(crate) fn aus_sqlx(e: sqlx::Error, tabelle: &str, felder: &[&str]) -> Self {
        let msg = e.to_string();
        if !(msg.contains("UNIQUE") || msg.contains("unique")) {
            return Self::Sqlx(e);
        }
        let feld = felder
            .iter()
            .find(|f| msg.contains(&format!("{tabelle}.{f}")))
            .or(felder.first())
            .copied()
            .unwrap_or("unbekannt");
        Self::Eindeutigkeit(feld.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nicht_eindeutige_sqlx_fehler_bleiben_erhalten() {
        let e = DbError::aus_sqlx(sqlx::Error::RowNotFound, "users", &["username"]);
        assert!(matches!(e, DbError::Sqlx(_)));
    }
}
