//! Verdrahtung aller Dienste ueber einem gemeinsamen Repository
//!
//! [`Dienste::neu`] baut die Dienste in Abhaengigkeitsreihenfolge auf.
//! Ein Repository-Typ wie `SqliteDb`, der alle Repository-Traits
//! implementiert, wird dabei nur einmal geteilt.

use std::sync::Arc;

use pforte_db::repository::{
    GroupRepository, PermissionRepository, TokenRepository, UserRepository,
};

use crate::benutzer_service::BenutzerService;
use crate::berechtigungen::BerechtigungsService;
use crate::bilddienst::Bilddienst;
use crate::gruppen_service::GruppenService;
use crate::konfig::AuthKonfig;
use crate::konto::KontoService;
use crate::mailer::Mailer;
use crate::session::SessionStore;
use crate::tokens::TokenService;
use crate::zugang::ZugangsService;

pub struct Dienste<R>
where
    R: UserRepository + GroupRepository + PermissionRepository + TokenRepository,
{
    pub repo: Arc<R>,
    pub konfig: Arc<AuthKonfig>,
    pub sessions: Arc<SessionStore>,
    pub tokens: Arc<TokenService<R, R>>,
    pub berechtigungen: Arc<BerechtigungsService<R, R, R>>,
    pub zugang: Arc<ZugangsService<R, R, R>>,
    pub konto: Arc<KontoService<R, R, R, R>>,
    pub gruppen: Arc<GruppenService<R, R, R>>,
    pub benutzer: Arc<BenutzerService<R, R, R, R>>,
}

impl<R> Dienste<R>
where
    R: UserRepository + GroupRepository + PermissionRepository + TokenRepository,
{
    pub fn neu(
        repo: Arc<R>,
        konfig: AuthKonfig,
        mailer: Arc<dyn Mailer>,
        bilddienst: Arc<dyn Bilddienst>,
    ) -> Self {
        Self::mit_gruppen_beobachtern(repo, konfig, mailer, bilddienst, Vec::new())
    }

    pub fn mit_gruppen_beobachtern(
        repo: Arc<R>,
        konfig: AuthKonfig,
        mailer: Arc<dyn Mailer>,
        bilddienst: Arc<dyn Bilddienst>,
        beobachter: Vec<Arc<dyn pforte_core::GruppenBeobachter>>,
    ) -> Self {
        let konfig = Arc::new(konfig);
        let sessions = SessionStore::neu();
        let tokens = Arc::new(TokenService::neu(
            Arc::clone(&repo),
            Arc::clone(&repo),
            konfig.token_gueltigkeit(),
        ));
        let berechtigungen =
            BerechtigungsService::neu(Arc::clone(&repo), Arc::clone(&repo), Arc::clone(&repo));
        let zugang = Arc::new(ZugangsService::neu(
            Arc::clone(&repo),
            Arc::clone(&sessions),
            Arc::clone(&berechtigungen),
            Arc::clone(&konfig),
        ));
        let konto = Arc::new(KontoService::neu(
            Arc::clone(&repo),
            Arc::clone(&tokens),
            Arc::clone(&berechtigungen),
            Arc::clone(&zugang),
            Arc::clone(&sessions),
            mailer,
            Arc::clone(&konfig),
        ));

        let mut gruppen = GruppenService::neu(
            Arc::clone(&repo),
            Arc::clone(&repo),
            Arc::clone(&berechtigungen),
            konfig.edition,
        );
        for b in beobachter {
            gruppen = gruppen.mit_beobachter(b);
        }

        let benutzer = Arc::new(BenutzerService::neu(
            Arc::clone(&repo),
            Arc::clone(&repo),
            Arc::clone(&konto),
            Arc::clone(&berechtigungen),
            Arc::clone(&sessions),
            bilddienst,
            Arc::clone(&konfig),
        ));

        Self {
            repo,
            konfig,
            sessions,
            tokens,
            berechtigungen,
            zugang,
            konto,
            gruppen: Arc::new(gruppen),
            benutzer,
        }
    }
}
