//! Gemeinsame Domain-Typen fuer Pforte
//!
//! Alle Enums haben eine stabile String-Darstellung, die 1:1 in der
//! Datenbank abgelegt wird. `FromStr` und `als_str` muessen daher
//! immer synchron bleiben.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Kontostatus
// ---------------------------------------------------------------------------

/// Lebenszyklus-Zustand eines Benutzerkontos
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KontoStatus {
    /// Registriert, E-Mail-Adresse noch nicht bestaetigt
    VerifizierungAusstehend,
    /// Normal nutzbares Konto
    Aktiv,
    /// Von einem Administrator gesperrt
    Gesperrt,
    /// Temporaer ausgesperrt nach zu vielen Fehlversuchen
    Ausgesperrt,
}

impl KontoStatus {
    /// Alle Zustaende, z.B. fuer Metriken
    pub const ALLE: [KontoStatus; 4] = [
        Self::VerifizierungAusstehend,
        Self::Aktiv,
        Self::Gesperrt,
        Self::Ausgesperrt,
    ];

    pub fn als_str(&self) -> &'static str {
        match self {
            Self::VerifizierungAusstehend => "pending",
            Self::Aktiv => "active",
            Self::Gesperrt => "suspended",
            Self::Ausgesperrt => "locked",
        }
    }
}

impl std::str::FromStr for KontoStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::VerifizierungAusstehend),
            "active" => Ok(Self::Aktiv),
            "suspended" => Ok(Self::Gesperrt),
            "locked" => Ok(Self::Ausgesperrt),
            other => Err(format!("Unbekannter Kontostatus: {other}")),
        }
    }
}

impl std::fmt::Display for KontoStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Token-Zweck
// ---------------------------------------------------------------------------

/// Wofuer ein Verifizierungs-Token ausgestellt wurde
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenZweck {
    /// Konto aktivieren (E-Mail-Bestaetigung)
    KontoAktivieren,
    /// Passwort setzen bzw. zuruecksetzen
    PasswortSetzen,
}

impl TokenZweck {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::KontoAktivieren => "activate",
            Self::PasswortSetzen => "set_password",
        }
    }
}

impl std::str::FromStr for TokenZweck {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "activate" => Ok(Self::KontoAktivieren),
            "set_password" => Ok(Self::PasswortSetzen),
            other => Err(format!("Unbekannter Token-Zweck: {other}")),
        }
    }
}

impl std::fmt::Display for TokenZweck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.als_str())
    }
}

// ---------------------------------------------------------------------------
// Edition
// ---------------------------------------------------------------------------

/// Editionsstufe der Installation
///
/// Die Gruppenverwaltung steht nur ab `Pro` zur Verfuegung.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditionsStufe {
    #[default]
    Solo,
    Pro,
}

impl EditionsStufe {
    /// Gibt `true` zurueck wenn Gruppen angelegt, umbenannt und geloescht werden duerfen
    pub fn gruppenverwaltung_erlaubt(&self) -> bool {
        matches!(self, Self::Pro)
    }
}

impl std::fmt::Display for EditionsStufe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Solo => write!(f, "solo"),
            Self::Pro => write!(f, "pro"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn kontostatus_string_darstellung_ist_stabil() {
        for status in KontoStatus::ALLE {
            assert_eq!(KontoStatus::from_str(status.als_str()).unwrap(), status);
        }
        assert!(KontoStatus::from_str("deleted").is_err());
    }

    #[test]
    fn token_zweck_parsen() {
        assert_eq!(
            TokenZweck::from_str("set_password").unwrap(),
            TokenZweck::PasswortSetzen
        );
        assert!(TokenZweck::from_str("reset").is_err());
    }

    #[test]
    fn nur_pro_erlaubt_gruppenverwaltung() {
        assert!(!EditionsStufe::Solo.gruppenverwaltung_erlaubt());
        assert!(EditionsStufe::Pro.gruppenverwaltung_erlaubt());
        assert_eq!(EditionsStufe::default(), EditionsStufe::Solo);
    }

    #[test]
    fn edition_aus_json() {
        let e: EditionsStufe = serde_json::from_str("\"pro\"").unwrap();
        assert_eq!(e, EditionsStufe::Pro);
    }
}
