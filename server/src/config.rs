//! Server-Konfiguration
//!
//! Wird beim Start aus einer TOML-Datei geladen. Alle Felder haben
//! sinnvolle Standardwerte, sodass der Server ohne Konfigurationsdatei
//! lauffaehig ist.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use pforte_auth::AuthKonfig;
use pforte_db::DatabaseConfig;
use pforte_observability::logging::{log_format_gueltig, log_level_gueltig};

/// Fehler bei der Pruefung einer geladenen Konfiguration
#[derive(Debug, Error, PartialEq)]
pub enum KonfigFehler {
    #[error("Ungueltiges Log-Level '{0}'")]
    LogLevel(String),

    #[error("Ungueltiges Log-Format '{0}'")]
    LogFormat(String),

    #[error("datenbank.max_verbindungen muss groesser als 0 sein")]
    KeineVerbindungen,

    #[error("benutzer.{0} muss groesser als 0 sein")]
    NichtPositiv(&'static str),

    #[error("bootstrap: {0}")]
    Bootstrap(String),
}

/// Vollstaendige Server-Konfiguration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Datenbank-Einstellungen
    pub datenbank: DatenbankEinstellungen,
    /// Logging-Einstellungen
    pub logging: LoggingEinstellungen,
    /// Observability-Einstellungen (Metriken, Health)
    pub observability: ObservabilityEinstellungen,
    /// Registrierung, Tokens, Anmeldung, Edition
    pub benutzer: AuthKonfig,
    /// Erster Administrator, falls die Datenbank leer ist
    pub bootstrap: Option<BootstrapEinstellungen>,
    /// Periodische Aufraeumarbeiten
    pub wartung: WartungsEinstellungen,
}

/// Datenbank-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatenbankEinstellungen {
    /// Verbindungs-URL
    pub url: String,
    /// Maximale Verbindungspool-Groesse
    pub max_verbindungen: u32,
    pub wal: bool,
}

impl Default for DatenbankEinstellungen {
    fn default() -> Self {
        Self {
            url: "sqlite://pforte.db".into(),
            max_verbindungen: 5,
            wal: true,
        }
    }
}

impl DatenbankEinstellungen {
    pub fn als_db_config(&self) -> DatabaseConfig {
        DatabaseConfig {
            url: self.url.clone(),
            max_verbindungen: self.max_verbindungen,
            sqlite_wal: self.wal,
        }
    }
}

/// Logging-Einstellungen
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingEinstellungen {
    /// Log-Level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Format: "json" oder "text"
    pub format: String,
}

impl Default for LoggingEinstellungen {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

/// Observability-Einstellungen (Metriken + Health-Check)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityEinstellungen {
    /// Aktiviert den Observability-Server
    pub aktiviert: bool,
    pub bind_adresse: String,
    /// Port fuer Metriken und Health (Standard: 9300)
    pub port: u16,
}

impl Default for ObservabilityEinstellungen {
    fn default() -> Self {
        Self {
            aktiviert: true,
            bind_adresse: "127.0.0.1".into(),
            port: 9300,
        }
    }
}

/// Erster Administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapEinstellungen {
    pub username: String,
    pub email: String,
    pub passwort: String,
}

/// Intervall der Wartungsaufgaben
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WartungsEinstellungen {
    /// Abgelaufene Tokens und Sessions entfernen, Metriken aktualisieren
    pub intervall_sekunden: u64,
}

impl Default for WartungsEinstellungen {
    fn default() -> Self {
        Self {
            intervall_sekunden: 60,
        }
    }
}

impl ServerConfig {
    /// Laedt die Konfiguration aus einer TOML-Datei.
    /// Gibt die Standardkonfiguration zurueck wenn die Datei nicht existiert.
    pub fn laden(pfad: &str) -> anyhow::Result<Self> {
        let config: Self = match std::fs::read_to_string(pfad) {
            Ok(inhalt) => toml::from_str(&inhalt)
                .map_err(|e| anyhow::anyhow!("Konfigurationsfehler in '{pfad}': {e}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(
                    pfad = pfad,
                    "Konfigurationsdatei nicht gefunden, verwende Standardwerte"
                );
                Self::default()
            }
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "Konfigurationsdatei '{pfad}' nicht lesbar: {e}"
                ))
            }
        };
        config.pruefen()?;
        Ok(config)
    }

    /// Prueft Werte, die serde allein nicht abdeckt
    pub fn pruefen(&self) -> Result<(), KonfigFehler> {
        if !log_level_gueltig(&self.logging.level) {
            return Err(KonfigFehler::LogLevel(self.logging.level.clone()));
        }
        if !log_format_gueltig(&self.logging.format) {
            return Err(KonfigFehler::LogFormat(self.logging.format.clone()));
        }
        if self.datenbank.max_verbindungen == 0 {
            return Err(KonfigFehler::KeineVerbindungen);
        }

        let b = &self.benutzer;
        for (name, wert) in [
            ("token_gueltigkeit_sekunden", b.token_gueltigkeit_sekunden),
            ("max_fehlversuche", b.max_fehlversuche),
            ("fehlversuch_fenster_sekunden", b.fehlversuch_fenster_sekunden),
            ("sperrdauer_sekunden", b.sperrdauer_sekunden),
            ("session_ttl_sekunden", b.session_ttl_sekunden),
            ("angemeldet_bleiben_ttl_sekunden", b.angemeldet_bleiben_ttl_sekunden),
        ] {
            if wert <= 0 {
                return Err(KonfigFehler::NichtPositiv(name));
            }
        }

        if let Some(admin) = &self.bootstrap {
            if admin.username.trim().is_empty() || admin.email.trim().is_empty() {
                return Err(KonfigFehler::Bootstrap(
                    "username und email muessen gesetzt sein".into(),
                ));
            }
            if admin.passwort.chars().count() < b.min_passwort_laenge {
                return Err(KonfigFehler::Bootstrap(format!(
                    "passwort muss mindestens {} Zeichen haben",
                    b.min_passwort_laenge
                )));
            }
        }
        Ok(())
    }

    /// Gibt die Bind-Adresse fuer den Observability-Server zurueck
    pub fn observability_bind_adresse(&self) -> String {
        format!(
            "{}:{}",
            self.observability.bind_adresse, self.observability.port
        )
    }
}
