//! Namen der eingebauten Berechtigungen
//!
//! Berechtigungen sind einfache Strings. Sie werden vor dem Speichern und
//! vor jedem Vergleich normalisiert (getrimmt, Kleinschreibung), damit
//! `editUsers` und `editusers` dieselbe Berechtigung bezeichnen.

use uuid::Uuid;

/// Andere Benutzer bearbeiten
pub const BENUTZER_BEARBEITEN: &str = "editusers";

/// Neue Benutzer registrieren (als angemeldeter Benutzer)
pub const BENUTZER_REGISTRIEREN: &str = "registerusers";

/// Gruppen, Berechtigungen und Kontostatus anderer Benutzer verwalten
pub const BENUTZER_VERWALTEN: &str = "administrateusers";

/// Praefix der gruppenbezogenen Zuweisungsberechtigung
pub const GRUPPE_ZUWEISEN_PRAEFIX: &str = "assigngroup:";

/// Berechtigung, Benutzer der angegebenen Gruppe zuzuweisen
pub fn gruppe_zuweisen(gruppe_id: Uuid) -> String {
    format!("{GRUPPE_ZUWEISEN_PRAEFIX}{gruppe_id}")
}

/// Normalisiert einen Berechtigungsnamen
pub fn normalisieren(name: &str) -> String {
    name.trim().to_lowercase()
}
