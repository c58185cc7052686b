//! Typisierte Konfiguration des Auth-Service

use chrono::Duration;
use serde::{Deserialize, Serialize};

use pforte_core::EditionsStufe;

/// Verhalten von Registrierung, Tokens, Anmeldung und Gruppenverwaltung
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthKonfig {
    /// Anonyme Besucher duerfen sich selbst registrieren
    pub oeffentliche_registrierung: bool,
    /// Handle der Gruppe fuer oeffentlich registrierte Benutzer
    pub standard_gruppe: Option<String>,
    pub edition: EditionsStufe,
    pub token_gueltigkeit_sekunden: i64,
    /// Fehlversuche innerhalb des Fensters bis zur Aussperrung
    pub max_fehlversuche: i64,
    pub fehlversuch_fenster_sekunden: i64,
    pub sperrdauer_sekunden: i64,
    pub session_ttl_sekunden: i64,
    pub angemeldet_bleiben_ttl_sekunden: i64,
    pub min_passwort_laenge: usize,
}

impl Default for AuthKonfig {
    fn default() -> Self {
        Self {
            oeffentliche_registrierung: false,
            standard_gruppe: None,
            edition: EditionsStufe::Solo,
            token_gueltigkeit_sekunden: 24 * 60 * 60,
            max_fehlversuche: 5,
            fehlversuch_fenster_sekunden: 300,
            sperrdauer_sekunden: 300,
            session_ttl_sekunden: 24 * 60 * 60,
            angemeldet_bleiben_ttl_sekunden: 14 * 24 * 60 * 60,
            min_passwort_laenge: 6,
        }
    }
}

impl AuthKonfig {
    pub fn token_gueltigkeit(&self) -> Duration {
        Duration::seconds(self.token_gueltigkeit_sekunden)
    }

    pub fn fehlversuch_fenster(&self) -> Duration {
        Duration::seconds(self.fehlversuch_fenster_sekunden)
    }

    pub fn sperrdauer(&self) -> Duration {
        Duration::seconds(self.sperrdauer_sekunden)
    }

    /// Session-Lebensdauer abhaengig von "angemeldet bleiben"
    pub fn session_ttl(&self, angemeldet_bleiben: bool) -> Duration {
        if angemeldet_bleiben {
            Duration::seconds(self.angemeldet_bleiben_ttl_sekunden)
        } else {
            Duration::seconds(self.session_ttl_sekunden)
        }
    }
}
