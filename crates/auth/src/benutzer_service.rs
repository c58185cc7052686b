//! Speichern von Benutzern, Profilen und Profilfotos
//!
//! Sensible Felder (Benutzername, E-Mail, Passwort) darf nur ein
//! Administrator oder der Benutzer selbst aendern. Aendert ein
//! Nicht-Administrator seinen Benutzernamen oder seine E-Mail-Adresse, oder
//! aendert jemand sein eigenes Passwort, muss das aktuelle Passwort mitgeschickt
//! werden. Diese Pruefung erfolgt einmal vor jeder Aenderung; schlaegt sie
//! fehl, bleibt der Datensatz unveraendert.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use pforte_core::berechtigungen::{BENUTZER_BEARBEITEN, BENUTZER_REGISTRIEREN};
use pforte_db::{
    models::{BenutzerRecord, BenutzerUpdate},
    repository::{GroupRepository, PermissionRepository, TokenRepository, UserRepository},
};

use crate::berechtigungen::BerechtigungsService;
use crate::bilddienst::{Ausschnitt, Bilddienst};
use crate::error::{AuthError, AuthResult, Warnung};
use crate::konfig::AuthKonfig;
use crate::konto::{eingaben_pruefen, email_pruefen, KontoService, NeuesKonto};
use crate::password::{passwort_hashen, passwort_richtlinie_pruefen, passwort_verifizieren};
use crate::session::SessionStore;

/// Eingabe fuer [`BenutzerService::benutzer_speichern`]
///
/// `None` bedeutet "unveraendert". Ohne `user_id` wird ein neuer Benutzer
/// registriert.
#[derive(Debug, Clone, Default)]
pub struct BenutzerEingabe {
    pub user_id: Option<Uuid>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub neues_passwort: Option<String>,
    /// Nachweis fuer Aenderungen an sensiblen Feldern des eigenen Kontos
    pub aktuelles_passwort: Option<String>,
    pub vorname: Option<String>,
    pub nachname: Option<String>,
    pub locale: Option<String>,
    pub password_reset_required: Option<bool>,
    /// Nur fuer Administratoren: neues Konto ohne E-Mail-Verifizierung anlegen
    pub vorab_verifiziert: bool,
}

/// Profilfelder; ein leerer String loescht den Wert
#[derive(Debug, Clone, Default)]
pub struct ProfilEingabe {
    pub vorname: Option<String>,
    pub nachname: Option<String>,
    pub locale: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Gespeichert {
    pub benutzer: BenutzerRecord,
    pub neu: bool,
    pub warnung: Option<Warnung>,
}

pub struct BenutzerService<U, T, P, G>
where
    U: UserRepository,
    T: TokenRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    user_repo: Arc<U>,
    group_repo: Arc<G>,
    konto: Arc<KontoService<U, T, P, G>>,
    berechtigungen: Arc<BerechtigungsService<U, P, G>>,
    sessions: Arc<SessionStore>,
    bilddienst: Arc<dyn Bilddienst>,
    konfig: Arc<AuthKonfig>,
}

impl<U, T, P, G> BenutzerService<U, T, P, G>
where
    U: UserRepository,
    T: TokenRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    #[allow(clippy::too_many_arguments)]
    pub fn neu(
        user_repo: Arc<U>,
        group_repo: Arc<G>,
        konto: Arc<KontoService<U, T, P, G>>,
        berechtigungen: Arc<BerechtigungsService<U, P, G>>,
        sessions: Arc<SessionStore>,
        bilddienst: Arc<dyn Bilddienst>,
        konfig: Arc<AuthKonfig>,
    ) -> Self {
        Self {
            user_repo,
            group_repo,
            konto,
            berechtigungen,
            sessions,
            bilddienst,
            konfig,
        }
    }

    /// Registriert einen neuen Benutzer oder aktualisiert einen bestehenden
    ///
    /// `akteur` ist der angemeldete Benutzer oder `None` fuer anonyme Besucher.
    pub async fn benutzer_speichern(
        &self,
        akteur: Option<Uuid>,
        eingabe: BenutzerEingabe,
    ) -> AuthResult<Gespeichert> {
        match eingabe.user_id {
            Some(user_id) => self.bestehenden_speichern(akteur, user_id, eingabe).await,
            None => self.neuen_registrieren(akteur, eingabe).await,
        }
    }

    async fn neuen_registrieren(
        &self,
        akteur: Option<Uuid>,
        eingabe: BenutzerEingabe,
    ) -> AuthResult<Gespeichert> {
        let akteur = match akteur {
            None => {
                if !self.konfig.oeffentliche_registrierung {
                    return Err(AuthError::zugriff_verweigert(
                        "Oeffentliche Registrierung ist deaktiviert",
                    ));
                }
                None
            }
            Some(id) => {
                self.berechtigungen.erfordern(id, BENUTZER_REGISTRIEREN).await?;
                Some(self.benutzer_laden(id).await?)
            }
        };
        let akteur_ist_admin = akteur.as_ref().is_some_and(|a| a.is_admin);

        let email = eingabe.email.as_deref().map(str::trim).unwrap_or_default();
        if email.is_empty() {
            return Err(AuthError::validierung("email", "E-Mail-Adresse fehlt"));
        }
        let username = match eingabe.username.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => email,
        };
        eingaben_pruefen(username, email)?;

        let passwort = eingabe.neues_passwort.filter(|p| !p.is_empty());
        if akteur.is_none() && passwort.is_none() {
            return Err(AuthError::validierung("password", "Passwort fehlt"));
        }
        if eingabe.password_reset_required == Some(true) && !akteur_ist_admin {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen einen Passwortwechsel erzwingen",
            ));
        }

        self.eindeutigkeit_pruefen(None, Some(username), Some(email)).await?;

        let gruppen: Vec<Uuid> = match &akteur {
            None => self.standard_gruppe_ermitteln().await?.into_iter().collect(),
            Some(_) => Vec::new(),
        };

        let registrierung = self
            .konto
            .registrieren(NeuesKonto {
                username: username.to_string(),
                email: email.to_string(),
                passwort,
                vorname: leer_zu_none(eingabe.vorname),
                nachname: leer_zu_none(eingabe.nachname),
                locale: leer_zu_none(eingabe.locale),
                is_admin: false,
                password_reset_required: eingabe.password_reset_required.unwrap_or(false),
                verifizierung_erforderlich: !(akteur_ist_admin && eingabe.vorab_verifiziert),
                gruppen,
            })
            .await?;

        Ok(Gespeichert {
            benutzer: registrierung.benutzer,
            neu: true,
            warnung: registrierung.warnung,
        })
    }

    async fn bestehenden_speichern(
        &self,
        akteur: Option<Uuid>,
        user_id: Uuid,
        eingabe: BenutzerEingabe,
    ) -> AuthResult<Gespeichert> {
        let akteur_id =
            akteur.ok_or_else(|| AuthError::zugriff_verweigert("Anmeldung erforderlich"))?;
        let ziel = self.benutzer_laden(user_id).await?;
        let ist_selbst = akteur_id == user_id;
        if !ist_selbst {
            self.berechtigungen.erfordern(akteur_id, BENUTZER_BEARBEITEN).await?;
        }
        let akteur = self.benutzer_laden(akteur_id).await?;

        if ziel.is_admin && !akteur.is_admin && !ist_selbst {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen Administratorkonten bearbeiten",
            ));
        }

        // Nur tatsaechlich geaenderte Werte zaehlen
        let username_neu = eingabe
            .username
            .as_deref()
            .map(str::trim)
            .filter(|u| *u != ziel.username);
        let email_neu = eingabe
            .email
            .as_deref()
            .map(str::trim)
            .filter(|e| *e != ziel.email);
        let passwort_neu = eingabe.neues_passwort.as_deref().filter(|p| !p.is_empty());

        if (username_neu.is_some() || email_neu.is_some()) && !(akteur.is_admin || ist_selbst) {
            return Err(AuthError::zugriff_verweigert(
                "Benutzername und E-Mail darf nur der Benutzer selbst oder ein Administrator aendern",
            ));
        }
        if passwort_neu.is_some() && !ist_selbst {
            return Err(AuthError::zugriff_verweigert(
                "Das Passwort darf nur der Benutzer selbst aendern",
            ));
        }

        let nachweis_noetig = ist_selbst
            && (passwort_neu.is_some()
                || (!akteur.is_admin && (username_neu.is_some() || email_neu.is_some())));
        if nachweis_noetig {
            self.aktuelles_passwort_pruefen(&ziel, eingabe.aktuelles_passwort.as_deref())?;
        }

        let reset_neu = eingabe
            .password_reset_required
            .filter(|r| *r != ziel.password_reset_required);
        if reset_neu.is_some() && !akteur.is_admin {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen einen Passwortwechsel erzwingen",
            ));
        }

        if let Some(username) = username_neu {
            eingaben_pruefen(username, &ziel.email)?;
        }
        if let Some(email) = email_neu {
            email_pruefen(email)?;
        }
        let password_hash = match passwort_neu {
            Some(pw) => {
                passwort_richtlinie_pruefen(pw, self.konfig.min_passwort_laenge)?;
                Some(passwort_hashen(pw)?)
            }
            None => None,
        };

        self.eindeutigkeit_pruefen(Some(user_id), username_neu, email_neu)
            .await?;

        let passwort_geaendert = password_hash.is_some();
        let update = BenutzerUpdate {
            username: username_neu.map(str::to_string),
            email: email_neu.map(str::to_string),
            password_hash,
            first_name: eingabe.vorname.map(|v| leer_zu_none(Some(v))),
            last_name: eingabe.nachname.map(|v| leer_zu_none(Some(v))),
            locale: eingabe.locale.map(|v| leer_zu_none(Some(v))),
            password_reset_required: if passwort_geaendert && reset_neu.is_none() {
                Some(false)
            } else {
                reset_neu
            },
            ..Default::default()
        };

        let benutzer = self.user_repo.update(user_id, update).await?;
        if passwort_geaendert {
            let anzahl = self.sessions.alle_invalidieren(user_id).await;
            info!(user_id = %user_id, invalidierte_sessions = anzahl, "Passwort geaendert, Sessions invalidiert");
        }
        info!(akteur = %akteur_id, user_id = %user_id, "Benutzer gespeichert");

        Ok(Gespeichert {
            benutzer,
            neu: false,
            warnung: None,
        })
    }

    /// Speichert Vorname, Nachname und Sprache
    pub async fn profil_speichern(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        profil: ProfilEingabe,
    ) -> AuthResult<BenutzerRecord> {
        self.bearbeiten_erlaubt(akteur_id, user_id).await?;

        let update = BenutzerUpdate {
            first_name: profil.vorname.map(|v| leer_zu_none(Some(v))),
            last_name: profil.nachname.map(|v| leer_zu_none(Some(v))),
            locale: profil.locale.map(|v| leer_zu_none(Some(v))),
            ..Default::default()
        };
        let benutzer = self.user_repo.update(user_id, update).await?;
        info!(akteur = %akteur_id, user_id = %user_id, "Profil gespeichert");
        Ok(benutzer)
    }

    /// Prueft das Passwort eines Benutzers; unbekannte Benutzer ergeben `false`
    pub async fn passwort_validieren(&self, user_id: Uuid, passwort: &str) -> AuthResult<bool> {
        let Some(benutzer) = self.user_repo.get_by_id(user_id).await? else {
            return Ok(false);
        };
        match benutzer.password_hash.as_deref() {
            Some(hash) if !hash.is_empty() => passwort_verifizieren(passwort, hash),
            _ => Ok(false),
        }
    }

    // --- Profilfotos ---

    /// Legt ein hochgeladenes Foto temporaer ab und gibt den Pfad zum Zuschneiden zurueck
    pub async fn foto_hochladen(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        datei: &Path,
    ) -> AuthResult<PathBuf> {
        self.bearbeiten_erlaubt(akteur_id, user_id).await?;

        if !self.bilddienst.speicher_ausreichend(datei) {
            return Err(AuthError::validierung(
                "foto",
                "Nicht genug Speicher fuer die Bildverarbeitung",
            ));
        }
        self.bilddienst.temporaere_bereinigen(user_id)?;
        let pfad = self.bilddienst.temporaer_ablegen(user_id, datei)?;
        tracing::debug!(user_id = %user_id, "Profilfoto temporaer abgelegt");
        Ok(pfad)
    }

    /// Schneidet das temporaere Foto zu und ersetzt das bisherige Profilfoto
    pub async fn foto_zuschneiden(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        quelle: &str,
        ausschnitt: Ausschnitt,
    ) -> AuthResult<BenutzerRecord> {
        let ziel = self.bearbeiten_erlaubt(akteur_id, user_id).await?;
        if !ausschnitt.ist_gueltig() {
            return Err(AuthError::validierung("foto", "Ungueltiger Bildausschnitt"));
        }

        let dateiname = self.bilddienst.zuschneiden(user_id, quelle, ausschnitt)?;
        if let Some(alt) = ziel.photo.as_deref().filter(|alt| *alt != dateiname) {
            if let Err(e) = self.bilddienst.loeschen(alt) {
                warn!(user_id = %user_id, grund = %e, "Altes Profilfoto konnte nicht geloescht werden");
            }
        }

        let benutzer = self
            .user_repo
            .update(
                user_id,
                BenutzerUpdate {
                    photo: Some(Some(dateiname)),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user_id, "Profilfoto gespeichert");
        Ok(benutzer)
    }

    pub async fn foto_loeschen(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        let ziel = self.bearbeiten_erlaubt(akteur_id, user_id).await?;
        let Some(foto) = ziel.photo.as_deref() else {
            return Ok(ziel);
        };

        if let Err(e) = self.bilddienst.loeschen(foto) {
            warn!(user_id = %user_id, grund = %e, "Profilfoto konnte nicht geloescht werden");
        }
        let benutzer = self
            .user_repo
            .update(
                user_id,
                BenutzerUpdate {
                    photo: Some(None),
                    ..Default::default()
                },
            )
            .await?;
        info!(user_id = %user_id, "Profilfoto entfernt");
        Ok(benutzer)
    }

    // --- Interne Hilfsmethoden ---

    /// Selbst oder `editusers`; Administratorkonten nur durch Administratoren
    async fn bearbeiten_erlaubt(&self, akteur_id: Uuid, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        let ziel = self.benutzer_laden(user_id).await?;
        if akteur_id == user_id {
            return Ok(ziel);
        }
        self.berechtigungen.erfordern(akteur_id, BENUTZER_BEARBEITEN).await?;
        if ziel.is_admin && !self.benutzer_laden(akteur_id).await?.is_admin {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen Administratorkonten bearbeiten",
            ));
        }
        Ok(ziel)
    }

    fn aktuelles_passwort_pruefen(
        &self,
        benutzer: &BenutzerRecord,
        passwort: Option<&str>,
    ) -> AuthResult<()> {
        let korrekt = match (passwort, benutzer.password_hash.as_deref()) {
            (Some(pw), Some(hash)) if !pw.is_empty() && !hash.is_empty() => {
                passwort_verifizieren(pw, hash)?
            }
            _ => false,
        };
        if !korrekt {
            warn!(user_id = %benutzer.id, "Aenderung ohne gueltiges aktuelles Passwort abgewiesen");
            return Err(AuthError::validierung(
                "current_password",
                "Aktuelles Passwort falsch oder nicht angegeben",
            ));
        }
        Ok(())
    }

    async fn eindeutigkeit_pruefen(
        &self,
        eigene_id: Option<Uuid>,
        username: Option<&str>,
        email: Option<&str>,
    ) -> AuthResult<()> {
        let fremd = |b: &BenutzerRecord| Some(b.id) != eigene_id;

        if let Some(username) = username {
            if self.user_repo.get_by_name(username).await?.is_some_and(|b| fremd(&b)) {
                return Err(AuthError::validierung("username", "Benutzername bereits vergeben"));
            }
        }
        if let Some(email) = email {
            if self.user_repo.get_by_email(email).await?.is_some_and(|b| fremd(&b)) {
                return Err(AuthError::validierung("email", "E-Mail-Adresse bereits vergeben"));
            }
        }
        Ok(())
    }

    /// Id der Standardgruppe fuer oeffentliche Registrierungen
    async fn standard_gruppe_ermitteln(&self) -> AuthResult<Option<Uuid>> {
        let Some(handle) = self.konfig.standard_gruppe.as_deref() else {
            return Ok(None);
        };
        match self.group_repo.get_by_handle(handle).await? {
            Some(gruppe) => Ok(Some(gruppe.id)),
            None => {
                warn!(handle, "Standardgruppe existiert nicht");
                Ok(None)
            }
        }
    }

    async fn benutzer_laden(&self, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::nicht_gefunden(format!("Benutzer {user_id}")))
    }
}

fn leer_zu_none(wert: Option<String>) -> Option<String> {
    wert.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bilddienst::SpeicherBilddienst;
    use crate::dienste::Dienste;
    use crate::mailer::SpeicherMailer;
    use pforte_core::KontoStatus;
    use pforte_db::{models::NeueGruppe, SqliteDb};

    struct Umgebung {
        dienste: Dienste<SqliteDb>,
        bilder: Arc<SpeicherBilddienst>,
    }

    async fn umgebung(konfig: AuthKonfig) -> Umgebung {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let bilder = Arc::new(SpeicherBilddienst::neu());
        let dienste = Dienste::neu(db, konfig, Arc::new(SpeicherMailer::neu()), bilder.clone());
        Umgebung { dienste, bilder }
    }

    async fn konto(u: &Umgebung, name: &str, admin: bool) -> BenutzerRecord {
        u.dienste
            .konto
            .registrieren(NeuesKonto {
                username: name.into(),
                email: format!("{name}@example.com"),
                passwort: Some("geheim123".into()),
                is_admin: admin,
                verifizierung_erforderlich: false,
                ..Default::default()
            })
            .await
            .unwrap()
            .benutzer
    }

    fn aenderung(user_id: Uuid) -> BenutzerEingabe {
        BenutzerEingabe {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn anonyme_registrierung_nur_wenn_erlaubt() {
        let u = umgebung(AuthKonfig::default()).await;
        let eingabe = BenutzerEingabe {
            email: Some("eva@example.com".into()),
            neues_passwort: Some("geheim123".into()),
            ..Default::default()
        };

        let ergebnis = u.dienste.benutzer.benutzer_speichern(None, eingabe).await;
        assert!(matches!(ergebnis, Err(AuthError::ZugriffVerweigert(_))));
    }

    #[tokio::test]
    async fn anonyme_registrierung_braucht_passwort_und_nutzt_email_als_name() {
        let u = umgebung(AuthKonfig {
            oeffentliche_registrierung: true,
            ..Default::default()
        })
        .await;

        let ohne_passwort = BenutzerEingabe {
            email: Some("eva@example.com".into()),
            ..Default::default()
        };
        assert!(matches!(
            u.dienste.benutzer.benutzer_speichern(None, ohne_passwort).await,
            Err(AuthError::Validierung { ref feld, .. }) if feld == "password"
        ));

        let gespeichert = u
            .dienste
            .benutzer
            .benutzer_speichern(
                None,
                BenutzerEingabe {
                    email: Some("eva@example.com".into()),
                    neues_passwort: Some("geheim123".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(gespeichert.neu);
        assert_eq!(gespeichert.benutzer.username, "eva@example.com");
        assert_eq!(gespeichert.benutzer.status, KontoStatus::VerifizierungAusstehend);
    }

    #[tokio::test]
    async fn fehlende_standardgruppe_verhindert_registrierung_nicht() {
        let u = umgebung(AuthKonfig {
            oeffentliche_registrierung: true,
            standard_gruppe: Some("gibt-es-nicht".into()),
            ..Default::default()
        })
        .await;

        let gespeichert = u
            .dienste
            .benutzer
            .benutzer_speichern(
                None,
                BenutzerEingabe {
                    username: Some("finn".into()),
                    email: Some("finn@example.com".into()),
                    neues_passwort: Some("geheim123".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let gruppen = u.dienste.gruppen.fuer_benutzer(gespeichert.benutzer.id).await.unwrap();
        assert!(gruppen.is_empty());
    }

    #[tokio::test]
    async fn admin_registriert_vorab_verifiziert() {
        let u = umgebung(AuthKonfig::default()).await;
        let admin = konto(&u, "root", true).await;

        let gespeichert = u
            .dienste
            .benutzer
            .benutzer_speichern(
                Some(admin.id),
                BenutzerEingabe {
                    username: Some("gina".into()),
                    email: Some("gina@example.com".into()),
                    password_reset_required: Some(true),
                    vorab_verifiziert: true,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(gespeichert.benutzer.status, KontoStatus::Aktiv);
        assert!(gespeichert.benutzer.password_reset_required);
    }

    #[tokio::test]
    async fn registrieren_ohne_berechtigung_verweigert() {
        let u = umgebung(AuthKonfig::default()).await;
        let normal = konto(&u, "hugo", false).await;

        let ergebnis = u
            .dienste
            .benutzer
            .benutzer_speichern(
                Some(normal.id),
                BenutzerEingabe {
                    email: Some("neu@example.com".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(ergebnis, Err(AuthError::ZugriffVerweigert(_))));
    }

    #[tokio::test]
    async fn doppelte_email_wird_dem_feld_zugeordnet() {
        let u = umgebung(AuthKonfig::default()).await;
        let admin = konto(&u, "root", true).await;
        konto(&u, "ines", false).await;

        let ergebnis = u
            .dienste
            .benutzer
            .benutzer_speichern(
                Some(admin.id),
                BenutzerEingabe {
                    username: Some("ines2".into()),
                    email: Some("INES@example.com".into()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(ergebnis, Err(AuthError::Validierung { ref feld, .. }) if feld == "email"));
    }

    #[tokio::test]
    async fn eigene_email_nur_mit_aktuellem_passwort() {
        let u = umgebung(AuthKonfig::default()).await;
        let jan = konto(&u, "jan", false).await;

        let mut eingabe = aenderung(jan.id);
        eingabe.email = Some("jan@neu.example.com".into());
        eingabe.aktuelles_passwort = Some("falsch".into());
        let ergebnis = u.dienste.benutzer.benutzer_speichern(Some(jan.id), eingabe.clone()).await;
        assert!(matches!(
            ergebnis,
            Err(AuthError::Validierung { ref feld, .. }) if feld == "current_password"
        ));

        eingabe.aktuelles_passwort = Some("geheim123".into());
        let gespeichert = u.dienste.benutzer.benutzer_speichern(Some(jan.id), eingabe).await.unwrap();
        assert_eq!(gespeichert.benutzer.email, "jan@neu.example.com");
    }

    #[tokio::test]
    async fn unveraenderte_werte_brauchen_keinen_nachweis() {
        let u = umgebung(AuthKonfig::default()).await;
        let kim = konto(&u, "kim", false).await;

        let mut eingabe = aenderung(kim.id);
        eingabe.username = Some("kim".into());
        eingabe.email = Some("kim@example.com".into());
        eingabe.vorname = Some("Kim".into());
        let gespeichert = u.dienste.benutzer.benutzer_speichern(Some(kim.id), eingabe).await.unwrap();
        assert_eq!(gespeichert.benutzer.first_name.as_deref(), Some("Kim"));
    }

    #[tokio::test]
    async fn admin_aendert_fremde_email_ohne_nachweis_aber_kein_passwort() {
        let u = umgebung(AuthKonfig::default()).await;
        let admin = konto(&u, "root", true).await;
        let lea = konto(&u, "lea", false).await;

        let mut eingabe = aenderung(lea.id);
        eingabe.email = Some("lea@anders.example.com".into());
        let gespeichert = u.dienste.benutzer.benutzer_speichern(Some(admin.id), eingabe).await.unwrap();
        assert_eq!(gespeichert.benutzer.email, "lea@anders.example.com");

        let mut eingabe = aenderung(lea.id);
        eingabe.neues_passwort = Some("neuesgeheim".into());
        let ergebnis = u.dienste.benutzer.benutzer_speichern(Some(admin.id), eingabe).await;
        assert!(matches!(ergebnis, Err(AuthError::ZugriffVerweigert(_))));
    }

    #[tokio::test]
    async fn passwortwechsel_beendet_sessions() {
        let u = umgebung(AuthKonfig::default()).await;
        let max = konto(&u, "max", false).await;
        let anmeldung = u.dienste.zugang.anmelden("max", "geheim123", false).await.unwrap();

        let mut eingabe = aenderung(max.id);
        eingabe.neues_passwort = Some("anderesgeheim".into());
        eingabe.aktuelles_passwort = Some("geheim123".into());
        u.dienste.benutzer.benutzer_speichern(Some(max.id), eingabe).await.unwrap();

        assert!(u.dienste.zugang.session_validieren(&anmeldung.session.token).await.is_err());
        assert!(u.dienste.benutzer.passwort_validieren(max.id, "anderesgeheim").await.unwrap());
        assert!(!u.dienste.benutzer.passwort_validieren(max.id, "geheim123").await.unwrap());
    }

    #[tokio::test]
    async fn reset_flag_nur_fuer_admins() {
        let u = umgebung(AuthKonfig::default()).await;
        let admin = konto(&u, "root", true).await;
        let redakteur = konto(&u, "nora", false).await;
        let ziel = konto(&u, "otto", false).await;
        u.dienste
            .berechtigungen
            .berechtigungen_speichern(admin.id, redakteur.id, None, &["editUsers".into()])
            .await
            .unwrap();

        let mut eingabe = aenderung(ziel.id);
        eingabe.password_reset_required = Some(true);
        let ergebnis = u.dienste.benutzer.benutzer_speichern(Some(redakteur.id), eingabe.clone()).await;
        assert!(matches!(ergebnis, Err(AuthError::ZugriffVerweigert(_))));

        let gespeichert = u.dienste.benutzer.benutzer_speichern(Some(admin.id), eingabe).await.unwrap();
        assert!(gespeichert.benutzer.password_reset_required);
    }

    #[tokio::test]
    async fn profil_fremder_benutzer_braucht_editusers() {
        let u = umgebung(AuthKonfig::default()).await;
        let paul = konto(&u, "paul", false).await;
        let quinn = konto(&u, "quinn", false).await;

        let profil = ProfilEingabe {
            nachname: Some("Quast".into()),
            ..Default::default()
        };
        let ergebnis = u.dienste.benutzer.profil_speichern(paul.id, quinn.id, profil.clone()).await;
        assert!(matches!(ergebnis, Err(AuthError::ZugriffVerweigert(_))));

        let gespeichert = u.dienste.benutzer.profil_speichern(quinn.id, quinn.id, profil).await.unwrap();
        assert_eq!(gespeichert.last_name.as_deref(), Some("Quast"));

        let geleert = u
            .dienste
            .benutzer
            .profil_speichern(
                quinn.id,
                quinn.id,
                ProfilEingabe {
                    nachname: Some(String::new()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(geleert.last_name, None);
    }

    #[tokio::test]
    async fn passwort_validieren_unbekannter_benutzer() {
        let u = umgebung(AuthKonfig::default()).await;
        assert!(!u.dienste.benutzer.passwort_validieren(Uuid::new_v4(), "x").await.unwrap());
    }

    #[tokio::test]
    async fn foto_hochladen_zuschneiden_loeschen() {
        let u = umgebung(AuthKonfig::default()).await;
        let rita = konto(&u, "rita", false).await;
        let svc = &u.dienste.benutzer;

        let temporaer = svc
            .foto_hochladen(rita.id, rita.id, Path::new("/tmp/urlaub.png"))
            .await
            .unwrap();
        let quelle = temporaer.to_str().unwrap();
        let ausschnitt = Ausschnitt { x1: 0, x2: 200, y1: 0, y2: 200 };

        let mit_foto = svc.foto_zuschneiden(rita.id, rita.id, quelle, ausschnitt).await.unwrap();
        let dateiname = mit_foto.photo.clone().unwrap();
        assert!(u.bilder.existiert(&dateiname));
        assert!(!u.bilder.existiert(quelle));

        let ohne_foto = svc.foto_loeschen(rita.id, rita.id).await.unwrap();
        assert_eq!(ohne_foto.photo, None);
        assert!(!u.bilder.existiert(&dateiname));
    }

    #[tokio::test]
    async fn foto_bei_speichermangel_abgewiesen() {
        let u = umgebung(AuthKonfig::default()).await;
        let sam = konto(&u, "sam", false).await;
        u.bilder.speicher_knapp(true);

        let ergebnis = u
            .dienste
            .benutzer
            .foto_hochladen(sam.id, sam.id, Path::new("/tmp/gross.jpg"))
            .await;
        assert!(matches!(ergebnis, Err(AuthError::Validierung { ref feld, .. }) if feld == "foto"));
    }

    #[tokio::test]
    async fn ungueltiger_ausschnitt_abgewiesen() {
        let u = umgebung(AuthKonfig::default()).await;
        let tom = konto(&u, "tom", false).await;

        let ergebnis = u
            .dienste
            .benutzer
            .foto_zuschneiden(tom.id, tom.id, "tmp-x", Ausschnitt { x1: 5, x2: 5, y1: 0, y2: 1 })
            .await;
        assert!(matches!(ergebnis, Err(AuthError::Validierung { .. })));
    }

    #[tokio::test]
    async fn standardgruppe_wird_zugewiesen() {
        let u = umgebung(AuthKonfig {
            oeffentliche_registrierung: true,
            standard_gruppe: Some("subscribers".into()),
            ..Default::default()
        })
        .await;
        let gruppe = GroupRepository::create(
            &*u.dienste.repo,
            NeueGruppe {
                name: "Subscribers",
                handle: "subscribers",
                permissions: &[],
            },
        )
        .await
        .unwrap();

        let gespeichert = u
            .dienste
            .benutzer
            .benutzer_speichern(
                None,
                BenutzerEingabe {
                    username: Some("uwe".into()),
                    email: Some("uwe@example.com".into()),
                    neues_passwort: Some("geheim123".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let gruppen = u.dienste.gruppen.fuer_benutzer(gespeichert.benutzer.id).await.unwrap();
        assert_eq!(gruppen.len(), 1);
        assert_eq!(gruppen[0].id, gruppe.id);
    }
}
