//! Gruppen-Ereignisse und Beobachter
//!
//! Statt eines globalen Event-Bus erhaelt der Gruppen-Service eine explizite
//! Liste von Beobachtern. Vor jeder Aenderung darf jeder Beobachter die
//! Aenderung mit einem Grund ablehnen, danach wird er nur benachrichtigt.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Eine Aenderung an einer Benutzergruppe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GruppenEreignis {
    /// Gruppe wird angelegt oder umbenannt bzw. ihre Berechtigungen geaendert
    ///
    /// `gruppe_id` ist bei neuen Gruppen vor dem Speichern `None`.
    Speichern {
        gruppe_id: Option<Uuid>,
        name: String,
        handle: String,
        neu: bool,
    },
    /// Gruppe wird geloescht
    Loeschen { gruppe_id: Uuid, handle: String },
}

impl GruppenEreignis {
    pub fn handle(&self) -> &str {
        match self {
            Self::Speichern { handle, .. } | Self::Loeschen { handle, .. } => handle,
        }
    }
}

/// Erweiterungspunkt fuer Gruppen-Aenderungen
pub trait GruppenBeobachter: Send + Sync {
    /// Wird vor der Aenderung aufgerufen. `Err(grund)` bricht die Aenderung ab.
    fn vor_aenderung(&self, _ereignis: &GruppenEreignis) -> Result<(), String> {
        Ok(())
    }

    /// Wird nach erfolgreicher Aenderung aufgerufen
    fn nach_aenderung(&self, _ereignis: &GruppenEreignis) {}
}
