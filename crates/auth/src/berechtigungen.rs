//! Berechtigungs- und Gruppenaufloesung
//!
//! Die effektiven Berechtigungen eines Benutzers sind die Vereinigung seiner
//! direkten Berechtigungen mit denen aller seiner Gruppen. Administratoren
//! besitzen implizit alle Berechtigungen. Ergebnisse werden pro Benutzer
//! gecached; jede Aenderung an Mitgliedschaften, direkten Berechtigungen oder
//! Gruppen invalidiert den Cache. Jede Invalidierung erhoeht eine Generation;
//! ein Ergebnis, dessen Laden vor einer Invalidierung begann, wird nicht
//! mehr in den Cache geschrieben.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use pforte_core::berechtigungen::{self as namen, BENUTZER_VERWALTEN};
use pforte_db::{
    models::{BenutzerRecord, GruppeRecord},
    repository::{GroupRepository, PermissionRepository, UserRepository},
};

use crate::error::{AuthError, AuthResult};

/// Aufgeloeste Berechtigungen eines Benutzers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffektiveBerechtigungen {
    /// Administrator: jede Berechtigung
    Alle,
    Menge(BTreeSet<String>),
}

impl EffektiveBerechtigungen {
    pub fn enthaelt(&self, name: &str) -> bool {
        match self {
            Self::Alle => true,
            Self::Menge(menge) => menge.contains(&namen::normalisieren(name)),
        }
    }
}

/// Normalisiert und dedupliziert Berechtigungsnamen; leere Namen entfallen
pub fn berechtigungen_normalisieren(namen_liste: &[String]) -> Vec<String> {
    namen_liste
        .iter()
        .map(|n| namen::normalisieren(n))
        .filter(|n| !n.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub struct BerechtigungsService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    user_repo: Arc<U>,
    perm_repo: Arc<P>,
    group_repo: Arc<G>,
    cache: RwLock<HashMap<Uuid, EffektiveBerechtigungen>>,
    generation: AtomicU64,
}

impl<U, P, G> BerechtigungsService<U, P, G>
where
    U: UserRepository,
    P: PermissionRepository,
    G: GroupRepository,
{
    pub fn neu(user_repo: Arc<U>, perm_repo: Arc<P>, group_repo: Arc<G>) -> Arc<Self> {
        Arc::new(Self {
            user_repo,
            perm_repo,
            group_repo,
            cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        })
    }

    /// Effektive Berechtigungen (aus Cache oder DB)
    pub async fn effektive_berechtigungen(
        &self,
        user_id: Uuid,
    ) -> AuthResult<EffektiveBerechtigungen> {
        if let Some(treffer) = self.cache.read().await.get(&user_id) {
            return Ok(treffer.clone());
        }

        let generation = self.generation.load(Ordering::Acquire);
        let benutzer = self.benutzer_laden(user_id).await?;
        let effektiv = self.aufloesen(&benutzer).await?;

        let mut cache = self.cache.write().await;
        if self.generation.load(Ordering::Acquire) == generation {
            cache.insert(user_id, effektiv.clone());
        } else {
            tracing::debug!(user_id = %user_id, "Cache waehrend des Ladens invalidiert, Ergebnis nicht gecached");
        }
        Ok(effektiv)
    }

    pub async fn hat_berechtigung(&self, user_id: Uuid, name: &str) -> AuthResult<bool> {
        Ok(self.effektive_berechtigungen(user_id).await?.enthaelt(name))
    }

    /// Gibt `ZugriffVerweigert` zurueck wenn die Berechtigung fehlt
    pub async fn erfordern(&self, user_id: Uuid, name: &str) -> AuthResult<()> {
        if self.hat_berechtigung(user_id, name).await? {
            Ok(())
        } else {
            Err(AuthError::zugriff_verweigert(format!(
                "Berechtigung '{name}' fehlt"
            )))
        }
    }

    /// Gruppen, die `akteur` dem Benutzer `ziel` zuweisen darf
    ///
    /// Ist einer der beiden Administrator, sind es alle Gruppen. Sonst die
    /// Gruppen des Akteurs, die Gruppen mit passender `assigngroup:`-Berechtigung
    /// und die Gruppen, in denen das Ziel bereits Mitglied ist.
    pub async fn zuweisbare_gruppen(
        &self,
        akteur: Option<Uuid>,
        ziel: Option<Uuid>,
    ) -> AuthResult<Vec<GruppeRecord>> {
        let akteur = match akteur {
            Some(id) => Some(self.benutzer_laden(id).await?),
            None => None,
        };
        let ziel = match ziel {
            Some(id) => Some(self.benutzer_laden(id).await?),
            None => None,
        };

        let alle = self.group_repo.list().await?;
        if akteur.as_ref().is_some_and(|a| a.is_admin) || ziel.as_ref().is_some_and(|z| z.is_admin)
        {
            return Ok(alle);
        }

        let mut erlaubt: BTreeSet<Uuid> = BTreeSet::new();
        if let Some(akteur) = &akteur {
            for gruppe in self.group_repo.list_for_user(akteur.id).await? {
                erlaubt.insert(gruppe.id);
            }
            let effektiv = self.effektive_berechtigungen(akteur.id).await?;
            for gruppe in &alle {
                if effektiv.enthaelt(&namen::gruppe_zuweisen(gruppe.id)) {
                    erlaubt.insert(gruppe.id);
                }
            }
        }
        if let Some(ziel) = &ziel {
            for gruppe in self.group_repo.list_for_user(ziel.id).await? {
                erlaubt.insert(gruppe.id);
            }
        }

        Ok(alle.into_iter().filter(|g| erlaubt.contains(&g.id)).collect())
    }

    /// Ersetzt die Gruppenmitgliedschaften eines Benutzers
    ///
    /// Erfordert `administrateusers`; Nicht-Administratoren duerfen nur
    /// zuweisbare Gruppen waehlen.
    pub async fn gruppen_zuweisen(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        gruppen_ids: &[Uuid],
    ) -> AuthResult<()> {
        self.erfordern(akteur_id, BENUTZER_VERWALTEN).await?;
        self.benutzer_laden(user_id).await?;

        for id in gruppen_ids {
            if self.group_repo.get(*id).await?.is_none() {
                return Err(AuthError::nicht_gefunden(format!("Gruppe {id}")));
            }
        }

        let zuweisbar: BTreeSet<Uuid> = self
            .zuweisbare_gruppen(Some(akteur_id), Some(user_id))
            .await?
            .into_iter()
            .map(|g| g.id)
            .collect();
        if let Some(id) = gruppen_ids.iter().find(|id| !zuweisbar.contains(id)) {
            return Err(AuthError::zugriff_verweigert(format!(
                "Gruppe {id} darf nicht zugewiesen werden"
            )));
        }

        self.group_repo.set_groups_for_user(user_id, gruppen_ids).await?;
        self.cache_invalidieren(user_id).await;

        tracing::info!(
            akteur = %akteur_id,
            user_id = %user_id,
            anzahl = gruppen_ids.len(),
            "Gruppenmitgliedschaften gespeichert"
        );
        Ok(())
    }

    pub async fn mitgliedschaft_hinzufuegen(&self, gruppe_id: Uuid, user_id: Uuid) -> AuthResult<()> {
        self.group_repo.add_member(gruppe_id, user_id).await?;
        self.cache_invalidieren(user_id).await;
        Ok(())
    }

    pub async fn mitgliedschaft_entfernen(&self, gruppe_id: Uuid, user_id: Uuid) -> AuthResult<bool> {
        let entfernt = self.group_repo.remove_member(gruppe_id, user_id).await?;
        self.cache_invalidieren(user_id).await;
        Ok(entfernt)
    }

    /// Ersetzt die direkten Berechtigungen eines Benutzers
    ///
    /// Erfordert `administrateusers`. Das Admin-Flag darf nur ein Administrator
    /// aendern; Administratoren behalten keine direkten Berechtigungen.
    pub async fn berechtigungen_speichern(
        &self,
        akteur_id: Uuid,
        user_id: Uuid,
        admin: Option<bool>,
        berechtigungen: &[String],
    ) -> AuthResult<()> {
        self.erfordern(akteur_id, BENUTZER_VERWALTEN).await?;
        let akteur = self.benutzer_laden(akteur_id).await?;
        let ziel = self.benutzer_laden(user_id).await?;

        let admin_neu = match admin {
            Some(wert) if wert != ziel.is_admin => {
                if !akteur.is_admin {
                    return Err(AuthError::zugriff_verweigert(
                        "Nur Administratoren duerfen Administratoren ernennen",
                    ));
                }
                Some(wert)
            }
            _ => None,
        };

        let ist_admin = admin_neu.unwrap_or(ziel.is_admin);
        let gespeichert = if ist_admin {
            Vec::new()
        } else {
            berechtigungen_normalisieren(berechtigungen)
        };

        self.perm_repo
            .replace_user_permissions(user_id, admin_neu, &gespeichert)
            .await?;
        self.cache_invalidieren(user_id).await;

        tracing::info!(
            akteur = %akteur_id,
            user_id = %user_id,
            admin = ist_admin,
            anzahl = gespeichert.len(),
            "Benutzerberechtigungen gespeichert"
        );
        Ok(())
    }

    pub async fn cache_invalidieren(&self, user_id: Uuid) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        cache.remove(&user_id);
        tracing::debug!(user_id = %user_id, "Berechtigungs-Cache invalidiert");
    }

    /// Invalidiert den gesamten Cache (nach Gruppen-Aenderungen)
    pub async fn cache_komplett_invalidieren(&self) {
        let mut cache = self.cache.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let anzahl = cache.len();
        cache.clear();
        tracing::debug!(eintraege = anzahl, "Berechtigungs-Cache komplett invalidiert");
    }

    // --- Interne Hilfsmethoden ---

    async fn benutzer_laden(&self, user_id: Uuid) -> AuthResult<BenutzerRecord> {
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| AuthError::nicht_gefunden(format!("Benutzer {user_id}")))
    }

    async fn aufloesen(&self, benutzer: &BenutzerRecord) -> AuthResult<EffektiveBerechtigungen> {
        if benutzer.is_admin {
            return Ok(EffektiveBerechtigungen::Alle);
        }

        let mut menge: BTreeSet<String> = self
            .perm_repo
            .get_user_permissions(benutzer.id)
            .await?
            .iter()
            .map(|p| namen::normalisieren(p))
            .collect();

        for gruppe in self.group_repo.list_for_user(benutzer.id).await? {
            menge.extend(gruppe.permissions.iter().map(|p| namen::normalisieren(p)));
        }

        Ok(EffektiveBerechtigungen::Menge(menge))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pforte_core::berechtigungen::{BENUTZER_BEARBEITEN, BENUTZER_REGISTRIEREN};
    use pforte_db::{
        models::{NeueGruppe, NeuerBenutzer},
        SqliteDb,
    };

    type Service = BerechtigungsService<SqliteDb, SqliteDb, SqliteDb>;

    async fn setup() -> (Arc<SqliteDb>, Arc<Service>) {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let svc = BerechtigungsService::neu(Arc::clone(&db), Arc::clone(&db), Arc::clone(&db));
        (db, svc)
    }

    async fn benutzer(db: &SqliteDb, name: &str, admin: bool) -> Uuid {
        let email = format!("{name}@example.com");
        UserRepository::create(
            db,
            NeuerBenutzer {
                username: name,
                email: &email,
                is_admin: admin,
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .id
    }

    async fn gruppe(db: &SqliteDb, handle: &str, perms: &[&str]) -> Uuid {
        let perms: Vec<String> = perms.iter().map(|p| p.to_string()).collect();
        GroupRepository::create(
            db,
            NeueGruppe {
                name: handle,
                handle,
                permissions: &perms,
            },
        )
        .await
        .unwrap()
        .id
    }

    #[test]
    fn normalisieren_entfernt_duplikate_und_leere() {
        let roh = vec![
            "EditUsers".to_string(),
            "editusers ".to_string(),
            "  ".to_string(),
            "registerUsers".to_string(),
        ];
        assert_eq!(
            berechtigungen_normalisieren(&roh),
            vec!["editusers", "registerusers"]
        );
    }

    #[tokio::test]
    async fn vereinigung_aus_direkten_und_gruppen() {
        let (db, svc) = setup().await;
        let user = benutzer(&db, "wanda", false).await;
        let g = gruppe(&db, "redaktion", &["editUsers"]).await;
        GroupRepository::add_member(db.as_ref(), g, user).await.unwrap();
        PermissionRepository::replace_user_permissions(
            db.as_ref(),
            user,
            None,
            &[BENUTZER_REGISTRIEREN.to_string()],
        )
        .await
        .unwrap();

        let effektiv = svc.effektive_berechtigungen(user).await.unwrap();
        assert_eq!(
            effektiv,
            EffektiveBerechtigungen::Menge(
                [BENUTZER_BEARBEITEN, BENUTZER_REGISTRIEREN]
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            )
        );
        assert!(svc.hat_berechtigung(user, "EDITUSERS").await.unwrap());
        assert!(matches!(
            svc.erfordern(user, BENUTZER_VERWALTEN).await,
            Err(AuthError::ZugriffVerweigert(_))
        ));
    }

    #[tokio::test]
    async fn admin_hat_alle_berechtigungen() {
        let (db, svc) = setup().await;
        let admin = benutzer(&db, "root", true).await;

        assert_eq!(
            svc.effektive_berechtigungen(admin).await.unwrap(),
            EffektiveBerechtigungen::Alle
        );
        assert!(svc.hat_berechtigung(admin, "irgendwas").await.unwrap());
    }

    #[tokio::test]
    async fn mitgliedschaft_aendert_berechtigungen_sofort() {
        let (db, svc) = setup().await;
        let user = benutzer(&db, "xaver", false).await;
        let g = gruppe(&db, "team", &["a"]).await;

        let vorher = svc.effektive_berechtigungen(user).await.unwrap();
        svc.mitgliedschaft_hinzufuegen(g, user).await.unwrap();
        assert!(svc.hat_berechtigung(user, "a").await.unwrap());

        svc.mitgliedschaft_entfernen(g, user).await.unwrap();
        assert_eq!(svc.effektive_berechtigungen(user).await.unwrap(), vorher);
    }

    #[tokio::test]
    async fn zuweisbare_gruppen_fuer_nicht_admins() {
        let (db, svc) = setup().await;
        let akteur = benutzer(&db, "yara", false).await;
        let ziel = benutzer(&db, "zoe", false).await;
        let eigene = gruppe(&db, "eigene", &[]).await;
        let freigegeben = gruppe(&db, "freigegeben", &[]).await;
        let vom_ziel = gruppe(&db, "vom-ziel", &[]).await;
        let _fremd = gruppe(&db, "fremd", &[]).await;

        GroupRepository::add_member(db.as_ref(), eigene, akteur).await.unwrap();
        GroupRepository::add_member(db.as_ref(), vom_ziel, ziel).await.unwrap();
        PermissionRepository::replace_user_permissions(
            db.as_ref(),
            akteur,
            None,
            &[namen::gruppe_zuweisen(freigegeben)],
        )
        .await
        .unwrap();

        let mut ids: Vec<Uuid> = svc
            .zuweisbare_gruppen(Some(akteur), Some(ziel))
            .await
            .unwrap()
            .into_iter()
            .map(|g| g.id)
            .collect();
        ids.sort();
        let mut erwartet = vec![eigene, freigegeben, vom_ziel];
        erwartet.sort();
        assert_eq!(ids, erwartet);
    }

    #[tokio::test]
    async fn admin_ziel_macht_alle_gruppen_zuweisbar() {
        let (db, svc) = setup().await;
        let akteur = benutzer(&db, "anton", false).await;
        let ziel = benutzer(&db, "berta", true).await;
        gruppe(&db, "a", &[]).await;
        gruppe(&db, "b", &[]).await;

        let gruppen = svc.zuweisbare_gruppen(Some(akteur), Some(ziel)).await.unwrap();
        assert_eq!(gruppen.len(), 2);
    }

    #[tokio::test]
    async fn gruppen_zuweisen_erfordert_verwaltungsrecht() {
        let (db, svc) = setup().await;
        let akteur = benutzer(&db, "caesar", false).await;
        let ziel = benutzer(&db, "dora", false).await;
        let g = gruppe(&db, "g", &[]).await;

        let err = svc.gruppen_zuweisen(akteur, ziel, &[g]).await.unwrap_err();
        assert!(matches!(err, AuthError::ZugriffVerweigert(_)));

        let admin = benutzer(&db, "emil", true).await;
        svc.gruppen_zuweisen(admin, ziel, &[g]).await.unwrap();
        assert_eq!(
            GroupRepository::list_for_user(db.as_ref(), ziel).await.unwrap().len(),
            1
        );

        let err = svc
            .gruppen_zuweisen(admin, ziel, &[Uuid::new_v4()])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NichtGefunden(_)));
        // Nichts veraendert
        assert_eq!(
            GroupRepository::list_for_user(db.as_ref(), ziel).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn nur_admins_ernennen_admins() {
        let (db, svc) = setup().await;
        let verwalter = benutzer(&db, "fritz", false).await;
        PermissionRepository::replace_user_permissions(
            db.as_ref(),
            verwalter,
            None,
            &[BENUTZER_VERWALTEN.to_string()],
        )
        .await
        .unwrap();
        let ziel = benutzer(&db, "grete", false).await;

        let err = svc
            .berechtigungen_speichern(verwalter, ziel, Some(true), &[])
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ZugriffVerweigert(_)));

        svc.berechtigungen_speichern(verwalter, ziel, Some(false), &["EditUsers".into()])
            .await
            .unwrap();
        assert!(svc.hat_berechtigung(ziel, BENUTZER_BEARBEITEN).await.unwrap());

        let admin = benutzer(&db, "hugo", true).await;
        svc.berechtigungen_speichern(admin, ziel, Some(true), &["x".into()])
            .await
            .unwrap();
        assert_eq!(
            svc.effektive_berechtigungen(ziel).await.unwrap(),
            EffektiveBerechtigungen::Alle
        );
        assert!(PermissionRepository::get_user_permissions(db.as_ref(), ziel)
            .await
            .unwrap()
            .is_empty());
    }

    /// Haelt das erste Lesen der direkten Berechtigungen an, nachdem die
    /// Daten gelesen wurden
    struct AngehaltenesLesen {
        db: Arc<SqliteDb>,
        anhalten: std::sync::atomic::AtomicBool,
        gelesen: tokio::sync::Notify,
        weiter: tokio::sync::Notify,
    }

    impl PermissionRepository for AngehaltenesLesen {
        async fn get_user_permissions(&self, user_id: Uuid) -> pforte_db::DbResult<Vec<String>> {
            let ergebnis = PermissionRepository::get_user_permissions(self.db.as_ref(), user_id).await;
            if self.anhalten.swap(false, Ordering::SeqCst) {
                self.gelesen.notify_one();
                self.weiter.notified().await;
            }
            ergebnis
        }

        async fn replace_user_permissions(
            &self,
            user_id: Uuid,
            is_admin: Option<bool>,
            permissions: &[String],
        ) -> pforte_db::DbResult<()> {
            PermissionRepository::replace_user_permissions(
                self.db.as_ref(),
                user_id,
                is_admin,
                permissions,
            )
            .await
        }
    }

    #[tokio::test]
    async fn entzug_waehrend_laufendem_laden_bleibt_wirksam() {
        let db = Arc::new(SqliteDb::in_memory().await.unwrap());
        let admin = benutzer(&db, "admin", true).await;
        let ziel = benutzer(&db, "ida", false).await;
        PermissionRepository::replace_user_permissions(db.as_ref(), ziel, None, &["x".into()])
            .await
            .unwrap();

        let lesen = Arc::new(AngehaltenesLesen {
            db: Arc::clone(&db),
            anhalten: std::sync::atomic::AtomicBool::new(true),
            gelesen: tokio::sync::Notify::new(),
            weiter: tokio::sync::Notify::new(),
        });
        let svc = BerechtigungsService::neu(Arc::clone(&db), Arc::clone(&lesen), Arc::clone(&db));

        let leser = svc.hat_berechtigung(ziel, "x");
        let entzug = async {
            lesen.gelesen.notified().await;
            svc.berechtigungen_speichern(admin, ziel, None, &[])
                .await
                .unwrap();
            lesen.weiter.notify_one();
        };
        let (waehrenddessen, ()) = tokio::join!(leser, entzug);
        assert!(waehrenddessen.unwrap());

        assert!(PermissionRepository::get_user_permissions(db.as_ref(), ziel)
            .await
            .unwrap()
            .is_empty());
        assert!(!svc.hat_berechtigung(ziel, "x").await.unwrap());
    }
}
