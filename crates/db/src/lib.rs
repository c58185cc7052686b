//! pforte-db – Datenbank-Abstraktion
//!
//! Dieses Crate stellt das Repository-Pattern fuer Benutzer, Gruppen,
//! direkte Berechtigungen und Verifizierungs-Tokens bereit. Die
//! Geschaeftslogik kennt nur die Traits aus [`repository`]; die
//! SQLite-Implementierung liegt in [`sqlite`].

pub mod error;
pub mod models;
pub mod repository;
pub mod sqlite;

pub use error::DbError;
pub use repository::{
    DatabaseConfig, DbResult, GroupRepository, PermissionRepository, TokenRepository,
    UserRepository,
};
pub use sqlite::SqliteDb;
