//! pforte-core – Gemeinsame Typen und Traits
//!
//! Dieses Crate stellt die Bausteine bereit, die Datenbank- und Auth-Crate
//! gemeinsam nutzen: Kontostatus, Token-Zwecke, Editionsstufen,
//! Berechtigungsnamen und Gruppen-Ereignisse.

pub mod berechtigungen;
pub mod event;
pub mod types;

// Re-Exporte fuer bequemen Zugriff
pub use event::{GruppenBeobachter, GruppenEreignis};
pub use types::{EditionsStufe, KontoStatus, TokenZweck};
