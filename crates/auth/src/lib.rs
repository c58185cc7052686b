//! pforte-auth – Zugangskontrolle fuer Pforte
//!
//! Dieses Crate implementiert:
//! - Passwort- und Token-Hashing mit Argon2id
//! - Verifizierungs-Tokens (Aktivierung, Passwort setzen)
//! - Zustandsautomat des Kontolebenszyklus
//! - Berechtigungsaufloesung ueber direkte Rechte und Gruppen (mit Cache)
//! - Gruppenverwaltung mit Beobachtern
//! - Anmeldung, Aussperrung und Session-Verwaltung (in-memory mit TTL)
//! - Speichern von Benutzern, Profilen und Profilfotos

pub mod benutzer_service;
pub mod berechtigungen;
pub mod bilddienst;
pub mod dienste;
pub mod error;
pub mod gruppen_service;
pub mod konfig;
pub mod konto;
pub mod mailer;
pub mod password;
pub mod session;
pub mod tokens;
pub mod zugang;

// Bequeme Re-Exporte
pub use benutzer_service::{BenutzerEingabe, BenutzerService, Gespeichert, ProfilEingabe};
pub use berechtigungen::{BerechtigungsService, EffektiveBerechtigungen};
pub use bilddienst::{Ausschnitt, BildFehler, Bilddienst, DeaktivierterBilddienst, SpeicherBilddienst};
pub use dienste::Dienste;
pub use error::{AuthError, AuthResult, Warnung};
pub use gruppen_service::GruppenService;
pub use konfig::AuthKonfig;
pub use konto::{Aktivierung, KontoAktion, KontoService, NeuesKonto, PasswortGesetzt, Registrierung};
pub use mailer::{MailFehler, Mailer, ProtokollMailer, SpeicherMailer};
pub use password::{passwort_hashen, passwort_verifizieren};
pub use session::{Session, SessionStore};
pub use tokens::{AusgestellterToken, TokenService};
pub use zugang::{Anmeldung, Entscheidung, ZugangsService};
