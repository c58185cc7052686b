//! Repository-Trait-Definitionen
//!
//! Das Repository-Pattern entkoppelt die Geschaeftslogik von der konkreten
//! Datenbank-Implementierung. Alle Zustandswechsel, die unter Nebenlaeufigkeit
//! korrekt bleiben muessen, sind als einzelne bedingte Updates formuliert
//! (Compare-and-Swap) und nicht als Lesen-dann-Schreiben.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use pforte_core::{KontoStatus, TokenZweck};

use crate::error::DbError;
use crate::models::{
    BenutzerRecord, BenutzerUpdate, GruppeRecord, NeueGruppe, NeueRegistrierung, NeuerBenutzer,
    NeuerToken, TokenRecord,
};

/// Result-Alias fuer Datenbankoperationen
pub type DbResult<T> = Result<T, DbError>;

/// Konfiguration fuer die Datenbankverbindung
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Verbindungs-URL (z.B. "sqlite://pforte.db")
    pub url: String,
    /// Maximale Anzahl gleichzeitiger Verbindungen im Pool
    pub max_verbindungen: u32,
    /// Ob WAL-Modus bei SQLite aktiviert werden soll
    pub sqlite_wal: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://pforte.db".into(),
            max_verbindungen: 5,
            sqlite_wal: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Benutzer
// ---------------------------------------------------------------------------

/// Repository fuer Benutzer-Datenzugriffe (Credential Store)
#[allow(async_fn_in_trait)]
pub trait UserRepository: Send + Sync {
    /// Legt einen Benutzer an. Doppelte Benutzernamen oder E-Mail-Adressen
    /// ergeben `DbError::Eindeutigkeit` mit dem Feldnamen.
    async fn create(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord>;

    /// Legt Benutzer, Aktivierungs-Token und Gruppenmitgliedschaften in einer
    /// Transaktion an. Schlaegt ein Teil fehl, bleibt nichts davon gespeichert;
    /// eine unbekannte Gruppe ergibt `DbError::NichtGefunden`.
    async fn register(&self, data: NeueRegistrierung<'_>) -> DbResult<BenutzerRecord>;

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BenutzerRecord>>;

    /// Sucht nach Benutzername (Gross-/Kleinschreibung egal)
    async fn get_by_name(&self, username: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Sucht nach E-Mail-Adresse (Gross-/Kleinschreibung egal)
    async fn get_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Sucht nach Benutzername oder E-Mail; ein Treffer beim Benutzernamen hat Vorrang
    async fn get_by_identifier(&self, kennung: &str) -> DbResult<Option<BenutzerRecord>>;

    /// Aktualisiert die gesetzten Felder in einer einzigen Anweisung
    async fn update(&self, id: Uuid, data: BenutzerUpdate) -> DbResult<BenutzerRecord>;

    /// Anzahl Benutzer je Kontostatus
    async fn count_by_status(&self) -> DbResult<Vec<(KontoStatus, i64)>>;

    /// Setzt den Status nur, wenn der aktuelle Status `erwartet` ist.
    /// Gibt `false` zurueck wenn der Wechsel nicht stattgefunden hat.
    async fn compare_and_set_status(
        &self,
        id: Uuid,
        erwartet: KontoStatus,
        neu: KontoStatus,
    ) -> DbResult<bool>;

    /// Zaehlt einen Fehlversuch. Liegt der letzte Fehlversuch vor
    /// `fenster_start`, beginnt die Zaehlung neu. Gibt den neuen Zaehlerstand zurueck.
    async fn record_failed_login(
        &self,
        id: Uuid,
        fenster_start: DateTime<Utc>,
        jetzt: DateTime<Utc>,
    ) -> DbResult<i64>;

    /// `Aktiv` -> `Ausgesperrt` (CAS). Gibt `false` zurueck wenn der Benutzer nicht aktiv war.
    async fn lock_out(&self, id: Uuid, jetzt: DateTime<Utc>) -> DbResult<bool>;

    /// `Ausgesperrt` -> `Aktiv` (CAS), setzt zusaetzlich die Fehlversuche zurueck
    async fn unlock(&self, id: Uuid) -> DbResult<bool>;

    async fn reset_failed_logins(&self, id: Uuid) -> DbResult<()>;

    async fn update_last_login(&self, id: Uuid) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// Gruppen
// ---------------------------------------------------------------------------

/// Repository fuer Benutzergruppen und Mitgliedschaften
#[allow(async_fn_in_trait)]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, data: NeueGruppe<'_>) -> DbResult<GruppeRecord>;

    async fn get(&self, id: Uuid) -> DbResult<Option<GruppeRecord>>;

    async fn get_by_handle(&self, handle: &str) -> DbResult<Option<GruppeRecord>>;

    /// Alle Gruppen, nach Namen sortiert
    async fn list(&self) -> DbResult<Vec<GruppeRecord>>;

    async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<GruppeRecord>>;

    /// Aendert nur den Anzeigenamen; der Handle bleibt unveraendert
    async fn rename(&self, id: Uuid, name: &str) -> DbResult<GruppeRecord>;

    async fn set_permissions(&self, id: Uuid, permissions: &[String]) -> DbResult<GruppeRecord>;

    /// Loescht die Gruppe samt Mitgliedschaften, nicht aber die Benutzer
    async fn delete(&self, id: Uuid) -> DbResult<bool>;

    async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<()>;

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<bool>;

    /// Ersetzt alle Mitgliedschaften eines Benutzers in einer Transaktion
    async fn set_groups_for_user(&self, user_id: Uuid, group_ids: &[Uuid]) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// Direkte Berechtigungen
// ---------------------------------------------------------------------------

/// Repository fuer direkt vergebene Benutzer-Berechtigungen
#[allow(async_fn_in_trait)]
pub trait PermissionRepository: Send + Sync {
    async fn get_user_permissions(&self, user_id: Uuid) -> DbResult<Vec<String>>;

    /// Ersetzt die direkten Berechtigungen und optional das Admin-Flag
    /// in einer Transaktion
    async fn replace_user_permissions(
        &self,
        user_id: Uuid,
        is_admin: Option<bool>,
        permissions: &[String],
    ) -> DbResult<()>;
}

// ---------------------------------------------------------------------------
// Verifizierungs-Tokens
// ---------------------------------------------------------------------------

/// Repository fuer Verifizierungs-Tokens
///
/// Pro (Benutzer, Zweck) existiert hoechstens ein Token.
#[allow(async_fn_in_trait)]
pub trait TokenRepository: Send + Sync {
    /// Stellt ein Token aus und ersetzt dabei atomar ein vorhandenes
    async fn upsert(&self, data: NeuerToken<'_>) -> DbResult<TokenRecord>;

    async fn get(&self, user_id: Uuid, purpose: TokenZweck) -> DbResult<Option<TokenRecord>>;

    /// Loescht das Token nur, wenn es noch genau diesen Hash traegt (CAS).
    /// Gibt `false` zurueck wenn es inzwischen ersetzt oder verbraucht wurde.
    async fn consume(&self, user_id: Uuid, purpose: TokenZweck, code_hash: &str)
        -> DbResult<bool>;

    async fn delete(&self, user_id: Uuid, purpose: TokenZweck) -> DbResult<bool>;

    /// Entfernt alle vor `vor` ausgestellten Tokens
    async fn cleanup_expired(&self, vor: DateTime<Utc>) -> DbResult<u64>;
}
