//! Anmeldung, Aussperrung und Autorisierung
//!
//! Reihenfolge einer Anmeldung:
//! 1. Benutzer per Benutzername oder E-Mail suchen
//! 2. Ausgesperrte Konten: waehrend der Sperrdauer abweisen, danach entriegeln
//! 3. Passwort pruefen; Fehlversuche im Fenster zaehlen und ggf. aussperren
//! 4. Kontostatus pruefen
//! 5. Zaehler zuruecksetzen, letzte Anmeldung setzen, Session erstellen

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use pforte_core::KontoStatus;
use pforte_db::{
    models::BenutzerRecord,
    repository::{GroupRepository, PermissionRepository, UserRepository},
};

use crate::berechtigungen::BerechtigungsService;
use crate::error::{AuthError, AuthResult};
use crate::konfig::AuthKonfig;
use crate::konto::{naechster_status, KontoAktion};
use crate::password::passwort_verifizieren;
use crate::session::{Session, SessionStore};

/// Ergebnis einer erfolgreichen Anmeldung
#[derive(Debug, Clone)]
pub struct Anmeldung {
    pub benutzer: BenutzerRecord,
    pub session: Session,
}

/// Ergebnis einer Autorisierungspruefung
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entscheidung {
    Erlauben,
    Verweigern,
}

/// Fehler fuer Konten, die sich nicht anmelden duerfen
pub(crate) fn status_fehler(status: KontoStatus) -> Option<AuthError> {
    match status {
        KontoStatus::Aktiv => None,
        KontoStatus::Gesperrt => Some(AuthError::KontoGesperrt),
        KontoStatus::Ausgesperrt => Some(AuthError::KontoAusgesperrt),
        KontoStatus::VerifizierungAusstehend => Some(AuthError::VerifizierungAusstehend),
    }
}

pub struct ZugangsService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    user_repo: Arc<U>,
    sessions: Arc<SessionStore>,
    berechtigungen: Arc<BerechtigungsService<U, P, G>>,
    konfig: Arc<AuthKonfig>,
}

impl<U, P, G> ZugangsService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    pub fn neu(
        user_repo: Arc<U>,
        sessions: Arc<SessionStore>,
        berechtigungen: Arc<BerechtigungsService<U, P, G>>,
        konfig: Arc<AuthKonfig>,
    ) -> Self {
        Self {
            user_repo,
            sessions,
            berechtigungen,
            konfig,
        }
    }

    /// Meldet einen Benutzer an und erstellt eine Session
    pub async fn anmelden(
        &self,
        kennung: &str,
        passwort: &str,
        angemeldet_bleiben: bool,
    ) -> AuthResult<Anmeldung> {
        let Some(mut benutzer) = self.user_repo.get_by_identifier(kennung).await? else {
            warn!("Anmeldung mit unbekannter Kennung");
            return Err(AuthError::UnbekannteKennung);
        };

        let jetzt = Utc::now();

        if benutzer.status == KontoStatus::Ausgesperrt {
            let gesperrt_seit = benutzer.locked_at.unwrap_or(jetzt);
            if gesperrt_seit + self.konfig.sperrdauer() > jetzt {
                warn!(user_id = %benutzer.id, "Anmeldung waehrend Aussperrung");
                return Err(AuthError::KontoAusgesperrt);
            }
            if self.user_repo.unlock(benutzer.id).await? {
                info!(user_id = %benutzer.id, "Aussperrung abgelaufen, Konto entriegelt");
            }
            benutzer = self
                .user_repo
                .get_by_id(benutzer.id)
                .await?
                .ok_or(AuthError::UnbekannteKennung)?;
        }

        let korrekt = match benutzer.password_hash.as_deref() {
            Some(hash) if !hash.is_empty() => passwort_verifizieren(passwort, hash)?,
            _ => false,
        };

        if !korrekt {
            let anzahl = self
                .user_repo
                .record_failed_login(benutzer.id, jetzt - self.konfig.fehlversuch_fenster(), jetzt)
                .await?;
            warn!(user_id = %benutzer.id, fehlversuche = anzahl, "Fehlgeschlagener Anmeldeversuch");

            let aussperrbar = naechster_status(benutzer.status, KontoAktion::Aussperren).is_some();
            if anzahl >= self.konfig.max_fehlversuche
                && aussperrbar
                && self.user_repo.lock_out(benutzer.id, jetzt).await?
            {
                warn!(user_id = %benutzer.id, "Konto nach zu vielen Fehlversuchen ausgesperrt");
                self.sessions.alle_invalidieren(benutzer.id).await;
                return Err(AuthError::KontoAusgesperrt);
            }
            return Err(AuthError::FalschesPasswort);
        }

        if let Some(fehler) = status_fehler(benutzer.status) {
            warn!(user_id = %benutzer.id, status = %benutzer.status, "Anmeldung abgewiesen");
            return Err(fehler);
        }

        self.user_repo.reset_failed_logins(benutzer.id).await?;
        self.user_repo.update_last_login(benutzer.id).await?;

        let session = self
            .sessions
            .erstellen(
                benutzer.id,
                self.konfig.session_ttl(angemeldet_bleiben),
                angemeldet_bleiben,
            )
            .await;

        info!(user_id = %benutzer.id, username = %benutzer.username, "Benutzer angemeldet");

        Ok(Anmeldung { benutzer, session })
    }

    pub async fn abmelden(&self, session_token: &str) -> bool {
        let entfernt = self.sessions.invalidieren(session_token).await;
        if entfernt {
            tracing::debug!("Session beendet (Abmeldung)");
        }
        entfernt
    }

    /// Liefert den Benutzer zu einer Session
    ///
    /// Ist das Konto inzwischen nicht mehr aktiv, wird die Session beendet.
    pub async fn session_validieren(&self, token: &str) -> AuthResult<BenutzerRecord> {
        let session = self.sessions.validieren(token).await?;

        let Some(benutzer) = self.user_repo.get_by_id(session.user_id).await? else {
            self.sessions.invalidieren(token).await;
            return Err(AuthError::SessionUngueltig);
        };

        if let Some(fehler) = status_fehler(benutzer.status) {
            self.sessions.invalidieren(token).await;
            return Err(fehler);
        }

        Ok(benutzer)
    }

    /// Prueft eine Berechtigung fuer den Benutzer einer Session
    ///
    /// Administratoren werden immer zugelassen.
    pub async fn autorisieren(&self, token: &str, berechtigung: &str) -> AuthResult<Entscheidung> {
        let benutzer = self.session_validieren(token).await?;
        if benutzer.is_admin {
            return Ok(Entscheidung::Erlauben);
        }

        if self.berechtigungen.hat_berechtigung(benutzer.id, berechtigung).await? {
            Ok(Entscheidung::Erlauben)
        } else {
            tracing::debug!(user_id = %benutzer.id, berechtigung, "Zugriff verweigert");
            Ok(Entscheidung::Verweigern)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::password::passwort_hashen;
    use pforte_db::{models::NeuerBenutzer, SqliteDb};

    type Service = ZugangsService<SqliteDb, SqliteDb, SqliteDb>;

    async fn setup(konfig: AuthKonfig) -> (Arc<SqliteDb>, Service) {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let berechtigungen =
            BerechtigungsService::neu(Arc::clone(&db), Arc::clone(&db), Arc::clone(&db));
        let svc = ZugangsService::neu(
            Arc::clone(&db),
            SessionStore::neu(),
            berechtigungen,
            Arc::new(konfig),
        );
        (db, svc)
    }

    async fn benutzer(db: &SqliteDb, name: &str, status: KontoStatus) -> BenutzerRecord {
        let email = format!("{name}@example.com");
        let hash = passwort_hashen("geheim123").unwrap();
        UserRepository::create(
            db,
            NeuerBenutzer {
                username: name,
                email: &email,
                password_hash: Some(&hash),
                status,
                ..Default::default()
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn anmelden_per_name_oder_email() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        let user = benutzer(&db, "ida", KontoStatus::Aktiv).await;

        let a = svc.anmelden("ida", "geheim123", false).await.unwrap();
        assert_eq!(a.benutzer.id, user.id);
        let b = svc.anmelden("IDA@example.com", "geheim123", true).await.unwrap();
        assert!(b.session.angemeldet_bleiben);
        assert!(b.session.laeuft_ab_am > a.session.laeuft_ab_am);
    }

    #[tokio::test]
    async fn fehlerarten() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        benutzer(&db, "jan", KontoStatus::Aktiv).await;
        benutzer(&db, "ken", KontoStatus::Gesperrt).await;
        benutzer(&db, "lou", KontoStatus::VerifizierungAusstehend).await;

        assert!(matches!(
            svc.anmelden("niemand", "x", false).await,
            Err(AuthError::UnbekannteKennung)
        ));
        assert!(matches!(
            svc.anmelden("jan", "falsch", false).await,
            Err(AuthError::FalschesPasswort)
        ));
        assert!(matches!(
            svc.anmelden("ken", "geheim123", false).await,
            Err(AuthError::KontoGesperrt)
        ));
        assert!(matches!(
            svc.anmelden("lou", "geheim123", false).await,
            Err(AuthError::VerifizierungAusstehend)
        ));
    }

    #[tokio::test]
    async fn erfolgreiche_anmeldung_setzt_zaehler_zurueck() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        let user = benutzer(&db, "max", KontoStatus::Aktiv).await;

        let _ = svc.anmelden("max", "falsch", false).await;
        let _ = svc.anmelden("max", "falsch", false).await;
        svc.anmelden("max", "geheim123", false).await.unwrap();

        let geladen = UserRepository::get_by_id(db.as_ref(), user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(geladen.failed_login_count, 0);
        assert!(geladen.last_login.is_some());
    }

    #[tokio::test]
    async fn aussperrung_nach_fehlversuchen() {
        let konfig = AuthKonfig {
            max_fehlversuche: 3,
            ..Default::default()
        };
        let (db, svc) = setup(konfig).await;
        let user = benutzer(&db, "nina", KontoStatus::Aktiv).await;

        for _ in 0..2 {
            assert!(matches!(
                svc.anmelden("nina", "falsch", false).await,
                Err(AuthError::FalschesPasswort)
            ));
        }
        assert!(matches!(
            svc.anmelden("nina", "falsch", false).await,
            Err(AuthError::KontoAusgesperrt)
        ));
        assert!(matches!(
            svc.anmelden("nina", "geheim123", false).await,
            Err(AuthError::KontoAusgesperrt)
        ));

        let geladen = UserRepository::get_by_id(db.as_ref(), user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(geladen.status, KontoStatus::Ausgesperrt);
    }

    #[tokio::test]
    async fn abgelaufene_aussperrung_wird_aufgehoben() {
        let konfig = AuthKonfig {
            max_fehlversuche: 1,
            sperrdauer_sekunden: 0,
            ..Default::default()
        };
        let (db, svc) = setup(konfig).await;
        benutzer(&db, "otto", KontoStatus::Aktiv).await;

        assert!(matches!(
            svc.anmelden("otto", "falsch", false).await,
            Err(AuthError::KontoAusgesperrt)
        ));
        let anmeldung = svc.anmelden("otto", "geheim123", false).await.unwrap();
        assert_eq!(anmeldung.benutzer.status, KontoStatus::Aktiv);
    }

    #[tokio::test]
    async fn session_und_autorisierung() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        benutzer(&db, "pia", KontoStatus::Aktiv).await;
        let admin = benutzer(&db, "quentin", KontoStatus::Aktiv).await;
        PermissionRepository::replace_user_permissions(db.as_ref(), admin.id, Some(true), &[])
            .await
            .unwrap();

        let pia = svc.anmelden("pia", "geheim123", false).await.unwrap();
        assert_eq!(
            svc.autorisieren(&pia.session.token, "editusers").await.unwrap(),
            Entscheidung::Verweigern
        );

        let q = svc.anmelden("quentin", "geheim123", false).await.unwrap();
        assert_eq!(
            svc.autorisieren(&q.session.token, "editusers").await.unwrap(),
            Entscheidung::Erlauben
        );

        assert!(svc.abmelden(&pia.session.token).await);
        assert!(matches!(
            svc.session_validieren(&pia.session.token).await,
            Err(AuthError::SessionUngueltig)
        ));
    }

    #[tokio::test]
    async fn gesperrter_benutzer_verliert_session() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        let user = benutzer(&db, "rolf", KontoStatus::Aktiv).await;
        let a = svc.anmelden("rolf", "geheim123", false).await.unwrap();

        UserRepository::compare_and_set_status(
            db.as_ref(),
            user.id,
            KontoStatus::Aktiv,
            KontoStatus::Gesperrt,
        )
        .await
        .unwrap();

        assert!(matches!(
            svc.session_validieren(&a.session.token).await,
            Err(AuthError::KontoGesperrt)
        ));
        assert!(matches!(
            svc.session_validieren(&a.session.token).await,
            Err(AuthError::SessionUngueltig)
        ));
    }

    #[tokio::test]
    async fn gesperrtes_konto_wird_nicht_ausgesperrt() {
        let (db, svc) = setup(AuthKonfig::default()).await;
        let user = benutzer(&db, "udo", KontoStatus::Gesperrt).await;

        for _ in 0..AuthKonfig::default().max_fehlversuche {
            assert!(matches!(
                svc.anmelden("udo", "falsch", false).await,
                Err(AuthError::FalschesPasswort)
            ));
        }

        let geladen = UserRepository::get_by_id(db.as_ref(), user.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(geladen.status, KontoStatus::Gesperrt);
        assert!(geladen.locked_at.is_none());
    }
}
