//! Fehlertypen fuer den Auth-Service

use pforte_core::KontoStatus;
use thiserror::Error;

/// Alle moeglichen Fehler im Auth-Service
#[derive(Debug, Error)]
pub enum AuthError {
    // --- Eingaben ---
    /// Ungueltige Eingabe; `feld` benennt das betroffene Feld
    #[error("Ungueltiger Wert fuer '{feld}': {grund}")]
    Validierung { feld: String, grund: String },

    // --- Zustandsautomat ---
    #[error("Aktion '{aktion}' ist im Zustand '{von}' nicht erlaubt")]
    UngueltigerUebergang { von: KontoStatus, aktion: String },

    /// Einheitliches Ergebnis fuer unbekannte, fremde, abgelaufene oder
    /// bereits verbrauchte Tokens
    #[error("Verifizierungscode ungueltig")]
    TokenUngueltig,

    // --- Anmeldung ---
    #[error("Unbekannter Benutzername oder E-Mail-Adresse")]
    UnbekannteKennung,

    #[error("Falsches Passwort")]
    FalschesPasswort,

    #[error("Konto gesperrt")]
    KontoGesperrt,

    #[error("Konto nach zu vielen Fehlversuchen voruebergehend gesperrt")]
    KontoAusgesperrt,

    #[error("Konto noch nicht verifiziert")]
    VerifizierungAusstehend,

    // --- Berechtigungen ---
    #[error("Funktion in dieser Edition nicht verfuegbar")]
    EditionNichtUnterstuetzt,

    #[error("Zugriff verweigert: {0}")]
    ZugriffVerweigert(String),

    #[error("Nicht gefunden: {0}")]
    NichtGefunden(String),

    /// Ein Gruppen-Beobachter hat die Aenderung abgelehnt
    #[error("Aenderung abgelehnt: {0}")]
    Abgelehnt(String),

    // --- Passwort ---
    #[error("Passwort-Hashing fehlgeschlagen: {0}")]
    PasswortHashing(String),

    // --- Session ---
    #[error("Session nicht gefunden")]
    SessionUngueltig,

    #[error("Session abgelaufen")]
    SessionAbgelaufen,

    // --- Datenbank ---
    #[error("Datenbankfehler: {0}")]
    Datenbank(#[source] pforte_db::DbError),

    // --- Intern ---
    #[error("Interner Fehler: {0}")]
    Intern(String),
}

impl AuthError {
    pub fn intern(msg: impl Into<String>) -> Self {
        Self::Intern(msg.into())
    }

    pub fn validierung(feld: impl Into<String>, grund: impl Into<String>) -> Self {
        Self::Validierung {
            feld: feld.into(),
            grund: grund.into(),
        }
    }

    pub fn zugriff_verweigert(msg: impl Into<String>) -> Self {
        Self::ZugriffVerweigert(msg.into())
    }

    pub fn nicht_gefunden(msg: impl Into<String>) -> Self {
        Self::NichtGefunden(msg.into())
    }

    pub(crate) fn uebergang(von: KontoStatus, aktion: &str) -> Self {
        Self::UngueltigerUebergang {
            von,
            aktion: aktion.to_string(),
        }
    }
}

impl From<pforte_db::DbError> for AuthError {
    fn from(e: pforte_db::DbError) -> Self {
        match e {
            pforte_db::DbError::Eindeutigkeit(feld) => Self::Validierung {
                grund: format!("{feld} bereits vergeben"),
                feld,
            },
            pforte_db::DbError::NichtGefunden(msg) => Self::NichtGefunden(msg),
            andere => Self::Datenbank(andere),
        }
    }
}

/// Result-Alias fuer den Auth-Service
pub type AuthResult<T> = Result<T, AuthError>;

/// Nicht-fatale Probleme einer ansonsten erfolgreichen Operation
///
/// Der Zustandswechsel ist bereits gespeichert; die Warnung wird nur
/// gemeldet und protokolliert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warnung {
    /// Die Aktivierungs- oder Reset-Mail konnte nicht versendet werden
    MailVersandFehlgeschlagen(String),
    /// Nach dem Passwort-Reset konnte nicht automatisch angemeldet werden
    AutoAnmeldungFehlgeschlagen(String),
}

impl std::fmt::Display for Warnung {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MailVersandFehlgeschlagen(g) => write!(f, "Mailversand fehlgeschlagen: {g}"),
            Self::AutoAnmeldungFehlgeschlagen(g) => {
                write!(f, "Automatische Anmeldung fehlgeschlagen: {g}")
            }
        }
    }
}
