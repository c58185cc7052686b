//! Datenbankmodelle fuer Pforte
//!
//! Diese Typen repraesentieren Datensaetze aus der Datenbank.
//! Sie sind von den Service-Typen getrennt und dienen als reine Datenuebertragungsobjekte.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use pforte_core::{KontoStatus, TokenZweck};

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Benutzer-Datensatz aus der Datenbank
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenutzerRecord {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    /// `None` solange der Benutzer noch kein Passwort gesetzt hat
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub locale: Option<String>,
    /// Dateiname des zugeschnittenen Profilfotos
    pub photo: Option<String>,
    pub is_admin: bool,
    pub status: KontoStatus,
    pub password_reset_required: bool,
    pub failed_login_count: i64,
    pub last_failed_login: Option<DateTime<Utc>>,
    pub locked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl BenutzerRecord {
    /// Gibt `true` zurueck wenn ein Passwort gesetzt ist
    pub fn hat_passwort(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }
}

/// Daten zum Erstellen eines neuen Benutzers
#[derive(Debug, Clone)]
pub struct NeuerBenutzer<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password_hash: Option<&'a str>,
    pub first_name: Option<&'a str>,
    pub last_name: Option<&'a str>,
    pub locale: Option<&'a str>,
    pub is_admin: bool,
    pub status: KontoStatus,
    pub password_reset_required: bool,
}

impl Default for NeuerBenutzer<'_> {
    fn default() -> Self {
        Self {
            username: "",
            email: "",
            password_hash: None,
            first_name: None,
            last_name: None,
            locale: None,
            is_admin: false,
            status: KontoStatus::VerifizierungAusstehend,
            password_reset_required: false,
        }
    }
}

/// Registrierung: Benutzer, optionales Aktivierungs-Token und
/// Gruppenmitgliedschaften werden gemeinsam geschrieben
#[derive(Debug, Clone)]
pub struct NeueRegistrierung<'a> {
    pub benutzer: NeuerBenutzer<'a>,
    /// Hash des Aktivierungscodes (Zweck `activate`)
    pub activation_code_hash: Option<&'a str>,
    pub issued_at: DateTime<Utc>,
    pub group_ids: &'a [Uuid],
}

/// Daten zum Aktualisieren eines Benutzers
///
/// Kontostatus und Admin-Flag fehlen hier; Statuswechsel laufen ausschliesslich
/// ueber die Compare-and-Swap-Methoden des Repositories, das Admin-Flag ueber
/// `PermissionRepository::replace_user_permissions`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BenutzerUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
    pub first_name: Option<Option<String>>,
    pub last_name: Option<Option<String>>,
    pub locale: Option<Option<String>>,
    pub photo: Option<Option<String>>,
    pub password_reset_required: Option<bool>,
}

impl BenutzerUpdate {
    /// Gibt `true` zurueck wenn kein Feld gesetzt ist
    pub fn ist_leer(&self) -> bool {
        *self == Self::default()
    }
}

// ---------------------------------------------------------------------------
// Benutzergruppen
// ---------------------------------------------------------------------------

/// Gruppen-Datensatz
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GruppeRecord {
    pub id: Uuid,
    pub name: String,
    /// Eindeutiger, unveraenderlicher Bezeichner
    pub handle: String,
    /// Normalisierte Berechtigungsnamen
    pub permissions: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Daten zum Erstellen einer neuen Gruppe
#[derive(Debug, Clone)]
pub struct NeueGruppe<'a> {
    pub name: &'a str,
    pub handle: &'a str,
    pub permissions: &'a [String],
}

// ---------------------------------------------------------------------------
// Verifizierungs-Tokens
// ---------------------------------------------------------------------------

/// Gespeichertes Verifizierungs-Token
///
/// Der Klartext-Code wird nie gespeichert, nur sein Hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRecord {
    pub user_id: Uuid,
    pub purpose: TokenZweck,
    pub code_hash: String,
    pub issued_at: DateTime<Utc>,
}

/// Daten zum Ausstellen eines Tokens
#[derive(Debug, Clone)]
pub struct NeuerToken<'a> {
    pub user_id: Uuid,
    pub purpose: TokenZweck,
    pub code_hash: &'a str,
    pub issued_at: DateTime<Utc>,
}
