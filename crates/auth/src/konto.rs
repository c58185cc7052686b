//! Zustandsautomat des Kontolebenszyklus
//!
//! ```text
//! registrieren ──► VerifizierungAusstehend ──aktivieren──► Aktiv
//!                                                         │  ▲
//!                                           sperren ──────┘  └────── entsperren
//!                                                         ▼  │
//!                                                       Gesperrt
//! Aktiv ──aussperren (Fehlversuche)──► Ausgesperrt ──entriegeln──► Aktiv
//! ```
//!
//! Jeder Wechsel wird als Compare-and-Swap auf den aktuellen Status
//! geschrieben. Schlaegt er fehl, bleibt der Zustand unveraendert und der
//! Aufrufer erhaelt `UngueltigerUebergang`.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use pforte_core::{berechtigungen::BENUTZER_VERWALTEN, KontoStatus, TokenZweck};
use pforte_db::{
    models::{BenutzerRecord, BenutzerUpdate, NeueRegistrierung, NeuerBenutzer},
    repository::{GroupRepository, PermissionRepository, TokenRepository, UserRepository},
};

use crate::berechtigungen::BerechtigungsService;
use crate::error::{AuthError, AuthResult, Warnung};
use crate::konfig::AuthKonfig;
use crate::mailer::Mailer;
use crate::password::{passwort_hashen, passwort_richtlinie_pruefen};
use crate::session::{Session, SessionStore};
use crate::tokens::{GeprueftesToken, TokenService};
use crate::zugang::ZugangsService;

/// Aktionen des Zustandsautomaten
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KontoAktion {
    Aktivieren,
    Sperren,
    Entsperren,
    Entriegeln,
    Aussperren,
}

impl KontoAktion {
    pub fn als_str(&self) -> &'static str {
        match self {
            Self::Aktivieren => "aktivieren",
            Self::Sperren => "sperren",
            Self::Entsperren => "entsperren",
            Self::Entriegeln => "entriegeln",
            Self::Aussperren => "aussperren",
        }
    }
}

/// Zielzustand einer Aktion oder `None` wenn sie im Zustand `von` unzulaessig ist
pub fn naechster_status(von: KontoStatus, aktion: KontoAktion) -> Option<KontoStatus> {
    use KontoAktion::*;
    use KontoStatus::*;

    match (von, aktion) {
        (VerifizierungAusstehend, Aktivieren) => Some(Aktiv),
        (Aktiv, Sperren) => Some(Gesperrt),
        (Gesperrt, Entsperren) => Some(Aktiv),
        (Ausgesperrt, Entriegeln) => Some(Aktiv),
        (Aktiv, Aussperren) => Some(Ausgesperrt),
        _ => None,
    }
}

/// Daten fuer ein neues Konto
#[derive(Debug, Clone, Default)]
pub struct NeuesKonto {
    pub username: String,
    pub email: String,
    pub passwort: Option<String>,
    pub vorname: Option<String>,
    pub nachname: Option<String>,
    pub locale: Option<String>,
    pub is_admin: bool,
    pub password_reset_required: bool,
    /// `false` legt das Konto direkt als aktiv an
    pub verifizierung_erforderlich: bool,
    /// Gruppen, denen das Konto bei der Anlage beitritt
    pub gruppen: Vec<Uuid>,
}

#[derive(Debug, Clone)]
pub struct Registrierung {
    pub benutzer: BenutzerRecord,
    pub warnung: Option<Warnung>,
}

/// Ergebnis einer Kontoaktivierung
#[derive(Debug, Clone)]
pub enum Aktivierung {
    /// Konto ist aktiv und sofort nutzbar
    Aktiv(BenutzerRecord),
    /// Konto ist aktiv, der Benutzer muss aber zuerst ein Passwort setzen
    PasswortSetzen { benutzer: BenutzerRecord, code: String },
}

impl Aktivierung {
    pub fn benutzer(&self) -> &BenutzerRecord {
        match self {
            Self::Aktiv(b) | Self::PasswortSetzen { benutzer: b, .. } => b,
        }
    }
}

/// Ergebnis eines Passwort-Resets
#[derive(Debug, Clone)]
pub struct PasswortGesetzt {
    pub benutzer: BenutzerRecord,
    /// Session der automatischen Anmeldung, falls sie gelungen ist
    pub session: Option<Session>,
    pub warnung: Option<Warnung>,
}

pub struct KontoService<U, T, P, G>
where
    U: UserRepository,
    T: TokenRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    user_repo: Arc<U>,
    tokens: Arc<TokenService<T, U>>,
    berechtigungen: Arc<BerechtigungsService<U, P, G>>,
    zugang: Arc<ZugangsService<U, P, G>>,
    sessions: Arc<SessionStore>,
    mailer: Arc<dyn Mailer>,
    konfig: Arc<AuthKonfig>,
}

impl<U, T, P, G> KontoService<U, T, P, G>
where
    U: UserRepository,
    T: TokenRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn neu(
        user_repo: Arc<U>,
        tokens: Arc<TokenService<T, U>>,
        berechtigungen: Arc<BerechtigungsService<U, P, G>>,
        zugang: Arc<ZugangsService<U, P, G>>,
        sessions: Arc<SessionStore>,
        mailer: Arc<dyn Mailer>,
        konfig: Arc<AuthKonfig>,
    ) -> Self {
        Self {
            user_repo,
            tokens,
            berechtigungen,
            zugang,
            sessions,
            mailer,
            konfig,
        }
    }

    /// Legt ein Konto an
    ///
    /// Mit Verifizierung startet es als `VerifizierungAusstehend` und erhaelt
    /// ein Aktivierungs-Token per Mail. Benutzer, Token und Gruppen werden
    /// gemeinsam gespeichert oder gar nicht. Ein Mailfehler macht die
    /// Registrierung nicht rueckgaengig, sondern wird als Warnung gemeldet.
    pub async fn registrieren(&self, konto: NeuesKonto) -> AuthResult<Registrierung> {
        let username = konto.username.trim();
        let email = konto.email.trim();
        eingaben_pruefen(username, email)?;

        let hash = match konto.passwort.as_deref() {
            Some(pw) => {
                passwort_richtlinie_pruefen(pw, self.konfig.min_passwort_laenge)?;
                Some(passwort_hashen(pw)?)
            }
            None => None,
        };

        let status = if konto.verifizierung_erforderlich {
            KontoStatus::VerifizierungAusstehend
        } else {
            KontoStatus::Aktiv
        };

        let aktivierungscode = if status == KontoStatus::VerifizierungAusstehend {
            Some(TokenService::<T, U>::code_erzeugen()?)
        } else {
            None
        };

        let benutzer = self
            .user_repo
            .register(NeueRegistrierung {
                benutzer: NeuerBenutzer {
                    username,
                    email,
                    password_hash: hash.as_deref(),
                    first_name: konto.vorname.as_deref(),
                    last_name: konto.nachname.as_deref(),
                    locale: konto.locale.as_deref(),
                    is_admin: konto.is_admin,
                    status,
                    password_reset_required: konto.password_reset_required,
                },
                activation_code_hash: aktivierungscode.as_ref().map(|(_, h)| h.as_str()),
                issued_at: Utc::now(),
                group_ids: &konto.gruppen,
            })
            .await?;

        info!(
            user_id = %benutzer.id,
            username = %benutzer.username,
            status = %status,
            gruppen = konto.gruppen.len(),
            "Konto angelegt"
        );

        let warnung = match aktivierungscode {
            Some((code, _)) => self.mail_senden(&benutzer, TokenZweck::KontoAktivieren, &code),
            None => None,
        };

        Ok(Registrierung { benutzer, warnung })
    }

    /// Aktiviert ein Konto per Aktivierungscode
    ///
    /// Braucht der Benutzer danach ein Passwort, wird ein Passwort-Token
    /// ausgestellt und zurueckgegeben.
    pub async fn aktivieren(&self, code: &str, user_id: Uuid) -> AuthResult<Aktivierung> {
        let geprueft = self
            .tokens
            .validieren(code, user_id, TokenZweck::KontoAktivieren)
            .await?;

        let von = geprueft.benutzer.status;
        let nach = naechster_status(von, KontoAktion::Aktivieren)
            .ok_or_else(|| AuthError::uebergang(von, KontoAktion::Aktivieren.als_str()))?;

        self.tokens.verbrauchen(&geprueft).await?;
        self.uebergang_schreiben(user_id, von, nach, KontoAktion::Aktivieren)
            .await?;

        let benutzer = self.benutzer_laden(user_id).await?;
        info!(user_id = %user_id, "Konto aktiviert");

        if benutzer.password_reset_required || !benutzer.hat_passwort() {
            let token = self
                .tokens
                .ausstellen(user_id, TokenZweck::PasswortSetzen)
                .await?;
            return Ok(Aktivierung::PasswortSetzen {
                benutzer,
                code: token.code,
            });
        }

        Ok(Aktivierung::Aktiv(benutzer))
    }

    /// Prueft einen Passwort-Code ohne ihn zu verbrauchen (z.B. fuer das Formular)
    pub async fn passwort_code_pruefen(&self, code: &str, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        let geprueft = self
            .tokens
            .validieren(code, user_id, TokenZweck::PasswortSetzen)
            .await?;
        Ok(geprueft.benutzer)
    }

    /// Setzt ein neues Passwort per Passwort-Code und meldet danach automatisch an
    ///
    /// Ein noch nicht verifiziertes Konto wird dabei aktiviert, da der Code
    /// an seine E-Mail-Adresse ging. Scheitert die automatische Anmeldung,
    /// bleibt das Passwort trotzdem gesetzt.
    pub async fn passwort_zuruecksetzen(
        &self,
        code: &str,
        user_id: Uuid,
        neues_passwort: &str,
    ) -> AuthResult<PasswortGesetzt> {
        let geprueft: GeprueftesToken = self
            .tokens
            .validieren(code, user_id, TokenZweck::PasswortSetzen)
            .await?;
        passwort_richtlinie_pruefen(neues_passwort, self.konfig.min_passwort_laenge)?;
        let hash = passwort_hashen(neues_passwort)?;

        self.tokens.verbrauchen(&geprueft).await?;
        let benutzer = self
            .user_repo
            .update(
                user_id,
                BenutzerUpdate {
                    password_hash: Some(hash),
                    password_reset_required: Some(false),
                    ..Default::default()
                },
            )
            .await?;
        self.sessions.alle_invalidieren(user_id).await;

        if benutzer.status == KontoStatus::VerifizierungAusstehend
            && self
                .user_repo
                .compare_and_set_status(
                    user_id,
                    KontoStatus::VerifizierungAusstehend,
                    KontoStatus::Aktiv,
                )
                .await?
        {
            self.tokens.verwerfen(user_id, TokenZweck::KontoAktivieren).await?;
            info!(user_id = %user_id, "Konto beim Passwort-Setzen aktiviert");
        }

        info!(user_id = %user_id, "Passwort per Code gesetzt");

        let (session, warnung) = match self
            .zugang
            .anmelden(&benutzer.username, neues_passwort, false)
            .await
        {
            Ok(anmeldung) => (Some(anmeldung.session), None),
            Err(e) => {
                warn!(user_id = %user_id, grund = %e, "Automatische Anmeldung nach Passwort-Reset fehlgeschlagen");
                (None, Some(Warnung::AutoAnmeldungFehlgeschlagen(e.to_string())))
            }
        };

        let benutzer = self.benutzer_laden(user_id).await?;
        Ok(PasswortGesetzt {
            benutzer,
            session,
            warnung,
        })
    }

    /// Stellt einen Passwort-Code aus und verschickt ihn
    pub async fn passwort_vergessen(&self, kennung: &str) -> AuthResult<Option<Warnung>> {
        let Some(benutzer) = self.user_repo.get_by_identifier(kennung).await? else {
            return Err(AuthError::UnbekannteKennung);
        };

        let token = self
            .tokens
            .ausstellen(benutzer.id, TokenZweck::PasswortSetzen)
            .await?;
        Ok(self.mail_senden(&benutzer, TokenZweck::PasswortSetzen, &token.code))
    }

    /// Schickt die Aktivierungs-Mail erneut; der alte Code wird ungueltig
    pub async fn aktivierungs_mail_senden(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
    ) -> AuthResult<Option<Warnung>> {
        self.berechtigungen
            .erfordern(akteur_id, BENUTZER_VERWALTEN)
            .await?;
        let benutzer = self.benutzer_laden(user_id).await?;
        if naechster_status(benutzer.status, KontoAktion::Aktivieren).is_none() {
            return Err(AuthError::uebergang(
                benutzer.status,
                KontoAktion::Aktivieren.als_str(),
            ));
        }

        let token = self
            .tokens
            .ausstellen(user_id, TokenZweck::KontoAktivieren)
            .await?;
        Ok(self.mail_senden(&benutzer, TokenZweck::KontoAktivieren, &token.code))
    }

    /// `Aktiv` -> `Gesperrt`; beendet alle Sessions des Benutzers
    pub async fn sperren(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        if akteur_id == user_id {
            return Err(AuthError::zugriff_verweigert(
                "Das eigene Konto kann nicht gesperrt werden",
            ));
        }
        let benutzer = self
            .verwaltende_aktion(akteur_id, user_id, KontoAktion::Sperren)
            .await?;
        self.sessions.alle_invalidieren(user_id).await;
        Ok(benutzer)
    }

    /// `Gesperrt` -> `Aktiv`
    pub async fn entsperren(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        self.verwaltende_aktion(akteur_id, user_id, KontoAktion::Entsperren)
            .await
    }

    /// `Ausgesperrt` -> `Aktiv`, ohne die Sperrdauer abzuwarten
    pub async fn entriegeln(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        self.berechtigungen
            .erfordern(akteur_id, BENUTZER_VERWALTEN)
            .await?;
        let ziel = self.ziel_fuer_akteur(akteur_id, user_id).await?;

        if !self.user_repo.unlock(user_id).await? {
            return Err(AuthError::uebergang(
                ziel.status,
                KontoAktion::Entriegeln.als_str(),
            ));
        }
        info!(akteur = %akteur_id, user_id = %user_id, "Konto entriegelt");
        self.benutzer_laden(user_id).await
    }

    // --- Interne Hilfsmethoden ---

    async fn verwaltende_aktion(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        aktion: KontoAktion,
    ) -> AuthResult<BenutzerRecord> {
        self.berechtigungen
            .erfordern(akteur_id, BENUTZER_VERWALTEN)
            .await?;
        let ziel = self.ziel_fuer_akteur(akteur_id, user_id).await?;

        let nach = naechster_status(ziel.status, aktion)
            .ok_or_else(|| AuthError::uebergang(ziel.status, aktion.als_str()))?;
        self.uebergang_schreiben(user_id, ziel.status, nach, aktion)
            .await?;

        info!(akteur = %akteur_id, user_id = %user_id, aktion = aktion.als_str(), "Kontostatus geaendert");
        self.benutzer_laden(user_id).await
    }

    /// Laedt das Ziel; Nicht-Administratoren duerfen nicht auf Administratoren wirken
    async fn ziel_fuer_akteur(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        let akteur = self.benutzer_laden(akteur_id).await?;
        let ziel = self.benutzer_laden(user_id).await?;
        if ziel.is_admin && !akteur.is_admin {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen Administratorkonten verwalten",
            ));
        }
        Ok(ziel)
    }

    async fn uebergang_schreiben(
        &self,
        user_id: Uuid,
        von: KontoStatus,
        nach: KontoStatus,
        aktion: KontoAktion,
    ) -> AuthResult<()> {
        if self
            .user_repo
            .compare_and_set_status(user_id, von, nach)
            .await?
        {
            return Ok(());
        }
        // Zwischenzeitlich geaendert: mit dem aktuellen Zustand melden
        let aktuell = self.benutzer_laden(user_id).await?.status;
        Err(AuthError::uebergang(aktuell, aktion.als_str()))
    }

    async fn benutzer_laden(&self, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::nicht_gefunden(format!("Benutzer {user_id}")))
    }

    fn mail_senden(&self, benutzer: &BenutzerRecord, zweck: TokenZweck, code: &str) -> Option<Warnung> {
        let ergebnis = match zweck {
            TokenZweck::KontoAktivieren => self.mailer.aktivierungs_mail_senden(benutzer, code),
            TokenZweck::PasswortSetzen => self.mailer.passwort_reset_mail_senden(benutzer, code),
        };
        match ergebnis {
            Ok(()) => None,
            Err(e) => {
                warn!(user_id = %benutzer.id, zweck = %zweck, grund = %e, "Mail konnte nicht versendet werden");
                Some(Warnung::MailVersandFehlgeschlagen(e.to_string()))
            }
        }
    }
}

/// Grundlegende Pruefung von Benutzername und E-Mail-Adresse
pub(crate) fn eingaben_pruefen(username: &str, email: &str) -> AuthResult<()> {
    if username.is_empty() {
        return Err(AuthError::validierung("username", "Benutzername fehlt"));
    }
    if username.chars().count() > 100 {
        return Err(AuthError::validierung("username", "Benutzername ist zu lang"));
    }
    email_pruefen(email)
}

pub(crate) fn email_pruefen(email: &str) -> AuthResult<()> {
    let gueltig = match email.split_once('@') {
        Some((lokal, domain)) => {
            !lokal.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    if !gueltig || email.chars().any(char::is_whitespace) {
        return Err(AuthError::validierung("email", "Ungueltige E-Mail-Adresse"));
    }
    Ok(())
}
