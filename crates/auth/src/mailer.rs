//! Mailversand als austauschbarer Kollaborateur
//!
//! Der Auth-Service uebergibt Verifizierungscodes ausschliesslich an den
//! [`Mailer`]. Fehler beim Versand sind nie fatal: der bereits gespeicherte
//! Zustandswechsel bleibt bestehen, der Aufrufer erhaelt eine
//! [`Warnung`](crate::error::Warnung).

use parking_lot::Mutex;
use pforte_core::TokenZweck;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use pforte_db::models::BenutzerRecord;

#[derive(Debug, Error)]
#[error("Mailversand fehlgeschlagen: {0}")]
pub struct MailFehler(pub String);

/// Versand von Aktivierungs- und Passwort-Mails
pub trait Mailer: Send + Sync {
    fn aktivierungs_mail_senden(&self, benutzer: &BenutzerRecord, code: &str)
        -> Result<(), MailFehler>;

    fn passwort_reset_mail_senden(
        &self,
        benutzer: &BenutzerRecord,
        code: &str,
    ) -> Result<(), MailFehler>;
}

/// Protokolliert statt zu versenden. Der Code selbst wird nicht geloggt.
#[derive(Debug, Clone, Default)]
pub struct ProtokollMailer;

impl Mailer for ProtokollMailer {
    fn aktivierungs_mail_senden(
        &self,
        benutzer: &BenutzerRecord,
        _code: &str,
    ) -> Result<(), MailFehler> {
        info!(user_id = %benutzer.id, email = %benutzer.email, "Aktivierungs-Mail (nicht versendet)");
        Ok(())
    }

    fn passwort_reset_mail_senden(
        &self,
        benutzer: &BenutzerRecord,
        _code: &str,
    ) -> Result<(), MailFehler> {
        info!(user_id = %benutzer.id, email = %benutzer.email, "Passwort-Mail (nicht versendet)");
        Ok(())
    }
}

/// Eine zugestellte Mail im [`SpeicherMailer`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GesendeteMail {
    pub user_id: Uuid,
    pub zweck: TokenZweck,
    pub code: String,
}

/// Sammelt Mails im Speicher, z.B. fuer Tests oder lokale Entwicklung
#[derive(Debug, Default)]
pub struct SpeicherMailer {
    mails: Mutex<Vec<GesendeteMail>>,
    fehlschlagen: Mutex<bool>,
}

impl SpeicherMailer {
    pub fn neu() -> Self {
        Self::default()
    }

    /// Laesst alle folgenden Versuche fehlschlagen
    pub fn fehler_simulieren(&self, an: bool) {
        *self.fehlschlagen.lock() = an;
    }

    pub fn gesendet(&self) -> Vec<GesendeteMail> {
        self.mails.lock().clone()
    }

    /// Letzter Code fuer Benutzer und Zweck
    pub fn letzter_code(&self, user_id: Uuid, zweck: TokenZweck) -> Option<String> {
        self.mails
            .lock()
            .iter()
            .rev()
            .find(|m| m.user_id == user_id && m.zweck == zweck)
            .map(|m| m.code.clone())
    }

    fn ablegen(&self, benutzer: &BenutzerRecord, zweck: TokenZweck, code: &str) -> Result<(), MailFehler> {
        if *self.fehlschlagen.lock() {
            return Err(MailFehler("SMTP nicht erreichbar".into()));
        }
        self.mails.lock().push(GesendeteMail {
            user_id: benutzer.id,
            zweck,
            code: code.to_string(),
        });
        Ok(())
    }
}

impl Mailer for SpeicherMailer {
    fn aktivierungs_mail_senden(
        &self,
        benutzer: &BenutzerRecord,
        code: &str,
    ) -> Result<(), MailFehler> {
        self.ablegen(benutzer, TokenZweck::KontoAktivieren, code)
    }

    fn passwort_reset_mail_senden(
        &self,
        benutzer: &BenutzerRecord,
        code: &str,
    ) -> Result<(), MailFehler> {
        self.ablegen(benutzer, TokenZweck::PasswortSetzen, code)
    }
}
