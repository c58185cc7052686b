//! Profilfotos: Vertrag zum externen Bilddienst
//!
//! Speicherung, Skalierung und Zuschnitt erledigt der [`Bilddienst`].
//! Der Benutzer-Datensatz haelt nur den resultierenden Dateinamen.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use thiserror::Error;
use uuid::Uuid;

use crate::error::AuthError;

#[derive(Debug, Error)]
pub enum BildFehler {
    #[error("Nicht genug Speicher fuer die Bildverarbeitung")]
    SpeicherUnzureichend,

    #[error("Bildverarbeitung fehlgeschlagen: {0}")]
    Verarbeitung(String),
}

impl From<BildFehler> for AuthError {
    fn from(e: BildFehler) -> Self {
        match e {
            BildFehler::SpeicherUnzureichend => {
                AuthError::validierung("foto", "Nicht genug Speicher fuer die Bildverarbeitung")
            }
            BildFehler::Verarbeitung(msg) => AuthError::intern(msg),
        }
    }
}

/// Zuschnitt-Rechteck in Pixeln des hochgeladenen Bildes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ausschnitt {
    pub x1: u32,
    pub x2: u32,
    pub y1: u32,
    pub y2: u32,
}

impl Ausschnitt {
    pub fn ist_gueltig(&self) -> bool {
        self.x2 > self.x1 && self.y2 > self.y1
    }
}

/// Bildverarbeitung fuer Profilfotos
pub trait Bilddienst: Send + Sync {
    /// Reicht der Speicher, um ein Bild dieser Groesse zu verarbeiten?
    fn speicher_ausreichend(&self, datei: &Path) -> bool;

    /// Entfernt fruehere temporaere Uploads des Benutzers
    fn temporaere_bereinigen(&self, user_id: Uuid) -> Result<(), BildFehler>;

    /// Legt den Upload temporaer ab und gibt den Pfad zurueck
    fn temporaer_ablegen(&self, user_id: Uuid, datei: &Path) -> Result<PathBuf, BildFehler>;

    /// Schneidet das temporaere Bild zu und gibt den endgueltigen Dateinamen zurueck
    fn zuschneiden(
        &self,
        user_id: Uuid,
        quelle: &str,
        ausschnitt: Ausschnitt,
    ) -> Result<String, BildFehler>;

    fn loeschen(&self, dateiname: &str) -> Result<(), BildFehler>;
}

/// Fuer Installationen ohne Bildverarbeitung: jeder Upload wird abgewiesen
#[derive(Debug, Clone, Default)]
pub struct DeaktivierterBilddienst;

impl Bilddienst for DeaktivierterBilddienst {
    fn speicher_ausreichend(&self, _datei: &Path) -> bool {
        true
    }

    fn temporaere_bereinigen(&self, _user_id: Uuid) -> Result<(), BildFehler> {
        Ok(())
    }

    fn temporaer_ablegen(&self, _user_id: Uuid, _datei: &Path) -> Result<PathBuf, BildFehler> {
        Err(BildFehler::Verarbeitung("Kein Bilddienst konfiguriert".into()))
    }

    fn zuschneiden(&self, _user_id: Uuid, _quelle: &str, _ausschnitt: Ausschnitt) -> Result<String, BildFehler> {
        Err(BildFehler::Verarbeitung("Kein Bilddienst konfiguriert".into()))
    }

    fn loeschen(&self, _dateiname: &str) -> Result<(), BildFehler> {
        Ok(())
    }
}

/// Haelt Dateinamen im Speicher; fuer Tests
#[derive(Debug, Default)]
pub struct SpeicherBilddienst {
    dateien: Mutex<HashSet<String>>,
    speicher_knapp: Mutex<bool>,
}

impl SpeicherBilddienst {
    pub fn neu() -> Self {
        Self::default()
    }

    pub fn speicher_knapp(&self, knapp: bool) {
        *self.speicher_knapp.lock() = knapp;
    }

    pub fn existiert(&self, dateiname: &str) -> bool {
        self.dateien.lock().contains(dateiname)
    }
}

impl Bilddienst for SpeicherBilddienst {
    fn speicher_ausreichend(&self, _datei: &Path) -> bool {
        !*self.speicher_knapp.lock()
    }

    fn temporaere_bereinigen(&self, user_id: Uuid) -> Result<(), BildFehler> {
        let praefix = format!("tmp-{user_id}");
        self.dateien.lock().retain(|d| !d.starts_with(&praefix));
        Ok(())
    }

    fn temporaer_ablegen(&self, user_id: Uuid, datei: &Path) -> Result<PathBuf, BildFehler> {
        let name = datei
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| BildFehler::Verarbeitung("Ungueltiger Dateiname".into()))?;
        let temporaer = format!("tmp-{user_id}-{name}");
        self.dateien.lock().insert(temporaer.clone());
        Ok(PathBuf::from(temporaer))
    }

    fn zuschneiden(&self, user_id: Uuid, quelle: &str, ausschnitt: Ausschnitt) -> Result<String, BildFehler> {
        let mut dateien = self.dateien.lock();
        if !dateien.remove(quelle) {
            return Err(BildFehler::Verarbeitung(format!("{quelle} nicht vorhanden")));
        }
        let name = format!(
            "{user_id}-{}x{}.jpg",
            ausschnitt.x2 - ausschnitt.x1,
            ausschnitt.y2 - ausschnitt.y1
        );
        dateien.insert(name.clone());
        Ok(name)
    }

    fn loeschen(&self, dateiname: &str) -> Result<(), BildFehler> {
        self.dateien.lock().remove(dateiname);
        Ok(())
    }
}
