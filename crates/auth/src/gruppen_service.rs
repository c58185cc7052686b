//! Verwaltung der Benutzergruppen
//!
//! Alle aendernden Operationen pruefen zuerst die Edition, dann die
//! Administratorrolle des Akteurs und erst danach die Eingaben.
//! Registrierte [`GruppenBeobachter`] koennen Aenderungen vorab ablehnen.

use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use pforte_core::{EditionsStufe, GruppenBeobachter, GruppenEreignis};
use pforte_db::{
    models::{GruppeRecord, NeueGruppe},
    repository::{GroupRepository, PermissionRepository, UserRepository},
};

use crate::berechtigungen::{berechtigungen_normalisieren, BerechtigungsService};
use crate::error::{AuthError, AuthResult};

pub struct GruppenService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    group_repo: Arc<G>,
    user_repo: Arc<U>,
    berechtigungen: Arc<BerechtigungsService<U, P, G>>,
    edition: EditionsStufe,
    beobachter: Vec<Arc<dyn GruppenBeobachter>>,
}

impl<U, P, G> GruppenService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    pub fn neu(
        group_repo: Arc<G>,
        user_repo: Arc<U>,
        berechtigungen: Arc<BerechtigungsService<U, P, G>>,
        edition: EditionsStufe,
    ) -> Self {
        Self {
            group_repo,
            user_repo,
            berechtigungen,
            edition,
            beobachter: Vec::new(),
        }
    }

    pub fn mit_beobachter(mut self, beobachter: Arc<dyn GruppenBeobachter>) -> Self {
        self.beobachter.push(beobachter);
        self
    }

    // --- Abfragen ---

    /// Alle Gruppen, nach Namen sortiert
    pub async fn alle(&self) -> AuthResult<Vec<GruppeRecord>> {
        Ok(self.group_repo.list().await?)
    }

    pub async fn nach_id(&self, id: Uuid) -> AuthResult<Option<GruppeRecord>> {
        Ok(self.group_repo.get(id).await?)
    }

    pub async fn nach_handle(&self, handle: &str) -> AuthResult<Option<GruppeRecord>> {
        Ok(self.group_repo.get_by_handle(handle).await?)
    }

    pub async fn fuer_benutzer(&self, user_id: Uuid) -> AuthResult<Vec<GruppeRecord>> {
        Ok(self.group_repo.list_for_user(user_id).await?)
    }

    // --- Aenderungen ---

    pub async fn erstellen(
        &self,
        akteur_id: Uuid,
        name: &str,
        handle: &str,
        berechtigungen: &[String],
    ) -> AuthResult<GruppeRecord> {
        self.aenderung_erlaubt(akteur_id).await?;

        let name = name_pruefen(name)?;
        let handle = handle_pruefen(handle)?;
        if self.group_repo.get_by_handle(handle).await?.is_some() {
            return Err(AuthError::validierung("handle", "Handle bereits vergeben"));
        }
        let berechtigungen = berechtigungen_normalisieren(berechtigungen);

        let ereignis = GruppenEreignis::Speichern {
            gruppe_id: None,
            name: name.to_string(),
            handle: handle.to_string(),
            neu: true,
        };
        self.vorab_pruefen(&ereignis)?;

        let gruppe = self
            .group_repo
            .create(NeueGruppe {
                name,
                handle,
                permissions: &berechtigungen,
            })
            .await?;

        info!(akteur = %akteur_id, gruppe_id = %gruppe.id, handle = %gruppe.handle, "Gruppe angelegt");
        self.benachrichtigen(&GruppenEreignis::Speichern {
            gruppe_id: Some(gruppe.id),
            name: gruppe.name.clone(),
            handle: gruppe.handle.clone(),
            neu: true,
        });
        Ok(gruppe)
    }

    /// Aendert den Anzeigenamen; der Handle bleibt unveraendert
    pub async fn umbenennen(&self, akteur_id: Uuid, id: Uuid, name: &str) -> AuthResult<GruppeRecord> {
        self.aenderung_erlaubt(akteur_id).await?;
        let name = name_pruefen(name)?;
        let bestehend = self.gruppe_laden(id).await?;

        let ereignis = GruppenEreignis::Speichern {
            gruppe_id: Some(id),
            name: name.to_string(),
            handle: bestehend.handle.clone(),
            neu: false,
        };
        self.vorab_pruefen(&ereignis)?;

        let gruppe = self.group_repo.rename(id, name).await?;
        info!(akteur = %akteur_id, gruppe_id = %id, "Gruppe umbenannt");
        self.benachrichtigen(&ereignis);
        Ok(gruppe)
    }

    pub async fn berechtigungen_setzen(
        &self,
        akteur_id: Uuid,
        id: Uuid,
        berechtigungen: &[String],
    ) -> AuthResult<GruppeRecord> {
        self.aenderung_erlaubt(akteur_id).await?;
        let bestehend = self.gruppe_laden(id).await?;
        let berechtigungen = berechtigungen_normalisieren(berechtigungen);

        let ereignis = GruppenEreignis::Speichern {
            gruppe_id: Some(id),
            name: bestehend.name.clone(),
            handle: bestehend.handle.clone(),
            neu: false,
        };
        self.vorab_pruefen(&ereignis)?;

        let gruppe = self.group_repo.set_permissions(id, &berechtigungen).await?;
        self.berechtigungen.cache_komplett_invalidieren().await;
        info!(akteur = %akteur_id, gruppe_id = %id, anzahl = berechtigungen.len(), "Gruppenberechtigungen gespeichert");
        self.benachrichtigen(&ereignis);
        Ok(gruppe)
    }

    /// Loescht die Gruppe; Mitglieder bleiben erhalten
    pub async fn loeschen(&self, akteur_id: Uuid, id: Uuid) -> AuthResult<()> {
        self.aenderung_erlaubt(akteur_id).await?;
        let bestehend = self.gruppe_laden(id).await?;

        let ereignis = GruppenEreignis::Loeschen {
            gruppe_id: id,
            handle: bestehend.handle,
        };
        self.vorab_pruefen(&ereignis)?;

        if !self.group_repo.delete(id).await? {
            return Err(AuthError::nicht_gefunden(format!("Gruppe {id}")));
        }
        self.berechtigungen.cache_komplett_invalidieren().await;
        info!(akteur = %akteur_id, gruppe_id = %id, "Gruppe geloescht");
        self.benachrichtigen(&ereignis);
        Ok(())
    }

    // --- Interne Hilfsmethoden ---

    async fn aenderung_erlaubt(&self, akteur_id: Uuid) -> AuthResult<()> {
        if !self.edition.gruppenverwaltung_erlaubt() {
            return Err(AuthError::EditionNichtUnterstuetzt);
        }
        let akteur = self
            .user_repo
            .get_by_id(akteur_id)
            .await?
            .ok_or_else(|| AuthError::zugriff_verweigert("Unbekannter Akteur"))?;
        if !akteur.is_admin {
            return Err(AuthError::zugriff_verweigert(
                "Nur Administratoren duerfen Gruppen verwalten",
            ));
        }
        Ok(())
    }

    async fn gruppe_laden(&self, id: Uuid) -> AuthResult<GruppeRecord> {
        self.group_repo
            .get(id)
            .await?
            .ok_or_else(|| AuthError::nicht_gefunden(format!("Gruppe {id}")))
    }

    fn vorab_pruefen(&self, ereignis: &GruppenEreignis) -> AuthResult<()> {
        for b in &self.beobachter {
            b.vor_aenderung(ereignis).map_err(|grund| {
                tracing::warn!(handle = ereignis.handle(), grund = %grund, "Gruppenaenderung abgelehnt");
                AuthError::Abgelehnt(grund)
            })?;
        }
        Ok(())
    }

    fn benachrichtigen(&self, ereignis: &GruppenEreignis) {
        for b in &self.beobachter {
            b.nach_aenderung(ereignis);
        }
    }
}

fn name_pruefen(name: &str) -> AuthResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AuthError::validierung("name", "Name fehlt"));
    }
    if name.chars().count() > 255 {
        return Err(AuthError::validierung("name", "Name ist zu lang"));
    }
    Ok(name)
}

/// Handles beginnen mit einem Buchstaben und enthalten nur ASCII-Buchstaben,
/// Ziffern, `_` und `-`
fn handle_pruefen(handle: &str) -> AuthResult<&str> {
    let handle = handle.trim();
    let mut zeichen = handle.chars();
    let gueltig = zeichen.next().is_some_and(|c| c.is_ascii_alphabetic())
        && zeichen.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && handle.len() <= 255;
    if !gueltig {
        return Err(AuthError::validierung("handle", "Ungueltiger Handle"));
    }
    Ok(handle)
}
