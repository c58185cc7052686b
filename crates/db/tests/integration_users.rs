//! Integration-Tests fuer UserRepository (In-Memory SQLite)

use chrono::{Duration, Utc};
use pforte_core::{KontoStatus, TokenZweck};
use pforte_db::{
    models::{BenutzerUpdate, NeueGruppe, NeueRegistrierung, NeuerBenutzer},
    DbError, GroupRepository, SqliteDb, TokenRepository, UserRepository,
};
use uuid::Uuid;

async fn db() -> SqliteDb {
    SqliteDb::in_memory()
        .await
        .expect("In-Memory DB konnte nicht erstellt werden")
}

fn neu<'a>(username: &'a str, email: &'a str) -> NeuerBenutzer<'a> {
    NeuerBenutzer {
        username,
        email,
        password_hash: Some("hash"),
        ..Default::default()
    }
}

#[tokio::test]
async fn benutzer_erstellen_und_laden() {
    let db = db().await;

    let user = UserRepository::create(&db, neu("alice", "alice@example.com"))
        .await
        .expect("Benutzer erstellen fehlgeschlagen");

    assert_eq!(user.username, "alice");
    assert_eq!(user.status, KontoStatus::VerifizierungAusstehend);
    assert_eq!(user.failed_login_count, 0);
    assert!(user.hat_passwort());

    let geladen = UserRepository::get_by_id(&db, user.id)
        .await
        .unwrap()
        .expect("Benutzer sollte gefunden werden");
    assert_eq!(geladen, user);
}

#[tokio::test]
async fn suche_ignoriert_gross_kleinschreibung() {
    let db = db().await;
    UserRepository::create(&db, neu("Bob", "Bob@Example.com"))
        .await
        .unwrap();

    assert!(UserRepository::get_by_name(&db, "bob").await.unwrap().is_some());
    assert!(UserRepository::get_by_email(&db, "BOB@example.COM")
        .await
        .unwrap()
        .is_some());
    assert!(UserRepository::get_by_name(&db, "niemand").await.unwrap().is_none());
}

#[tokio::test]
async fn kennung_bevorzugt_benutzernamen() {
    let db = db().await;
    // carol heisst per E-Mail so wie dave per Benutzername
    let dave = UserRepository::create(&db, neu("dave", "dave@example.com"))
        .await
        .unwrap();
    let carol = UserRepository::create(&db, neu("carol", "DAVE"))
        .await
        .unwrap();

    let treffer = UserRepository::get_by_identifier(&db, "dave")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(treffer.id, dave.id);

    let per_mail = UserRepository::get_by_identifier(&db, "dave@example.com")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(per_mail.id, dave.id);

    let carol_per_name = UserRepository::get_by_identifier(&db, " carol ")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(carol_per_name.id, carol.id);
}

#[tokio::test]
async fn doppelte_werte_nennen_das_feld() {
    let db = db().await;
    UserRepository::create(&db, neu("erin", "erin@example.com"))
        .await
        .unwrap();

    let err = UserRepository::create(&db, neu("ERIN", "andere@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Eindeutigkeit(ref f) if f == "username"), "{err:?}");

    let err = UserRepository::create(&db, neu("frank", "Erin@example.com"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Eindeutigkeit(ref f) if f == "email"), "{err:?}");
}

#[tokio::test]
async fn update_aendert_nur_gesetzte_felder() {
    let db = db().await;
    let user = UserRepository::create(
        &db,
        NeuerBenutzer {
            first_name: Some("Gina"),
            ..neu("gina", "gina@example.com")
        },
    )
    .await
    .unwrap();

    let aktualisiert = UserRepository::update(
        &db,
        user.id,
        BenutzerUpdate {
            password_hash: Some("neues_hash".into()),
            last_name: Some(Some("Muster".into())),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    assert_eq!(aktualisiert.password_hash.as_deref(), Some("neues_hash"));
    assert_eq!(aktualisiert.first_name.as_deref(), Some("Gina"));
    assert_eq!(aktualisiert.last_name.as_deref(), Some("Muster"));
    assert_eq!(aktualisiert.username, "gina");

    let geleert = UserRepository::update(
        &db,
        user.id,
        BenutzerUpdate {
            first_name: Some(None),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert!(geleert.first_name.is_none());
}

#[tokio::test]
async fn update_mit_doppelter_email_schlaegt_fehl() {
    let db = db().await;
    UserRepository::create(&db, neu("hank", "hank@example.com"))
        .await
        .unwrap();
    let ivy = UserRepository::create(&db, neu("ivy", "ivy@example.com"))
        .await
        .unwrap();

    let err = UserRepository::update(
        &db,
        ivy.id,
        BenutzerUpdate {
            email: Some("hank@example.com".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::Eindeutigkeit(ref f) if f == "email"));

    let unveraendert = UserRepository::get_by_id(&db, ivy.id).await.unwrap().unwrap();
    assert_eq!(unveraendert.email, "ivy@example.com");
}

#[tokio::test]
async fn status_cas_greift_nur_bei_erwartetem_status() {
    let db = db().await;
    let user = UserRepository::create(&db, neu("jack", "jack@example.com"))
        .await
        .unwrap();

    let ok = UserRepository::compare_and_set_status(
        &db,
        user.id,
        KontoStatus::VerifizierungAusstehend,
        KontoStatus::Aktiv,
    )
    .await
    .unwrap();
    assert!(ok);

    // Zweiter Versuch mit veraltetem Erwartungswert
    let nochmal = UserRepository::compare_and_set_status(
        &db,
        user.id,
        KontoStatus::VerifizierungAusstehend,
        KontoStatus::Aktiv,
    )
    .await
    .unwrap();
    assert!(!nochmal);
}

#[tokio::test]
async fn fehlversuche_zaehlen_im_fenster() {
    let db = db().await;
    let user = UserRepository::create(&db, neu("kim", "kim@example.com"))
        .await
        .unwrap();

    let jetzt = Utc::now();
    let fenster = Duration::seconds(300);

    let n1 = UserRepository::record_failed_login(&db, user.id, jetzt - fenster, jetzt)
        .await
        .unwrap();
    let spaeter = jetzt + Duration::seconds(10);
    let n2 = UserRepository::record_failed_login(&db, user.id, spaeter - fenster, spaeter)
        .await
        .unwrap();
    assert_eq!((n1, n2), (1, 2));

    // Nach Ablauf des Fensters beginnt die Zaehlung neu
    let viel_spaeter = spaeter + Duration::seconds(301);
    let n3 = UserRepository::record_failed_login(
        &db,
        user.id,
        viel_spaeter - fenster,
        viel_spaeter,
    )
    .await
    .unwrap();
    assert_eq!(n3, 1);

    UserRepository::reset_failed_logins(&db, user.id).await.unwrap();
    let geladen = UserRepository::get_by_id(&db, user.id).await.unwrap().unwrap();
    assert_eq!(geladen.failed_login_count, 0);
    assert!(geladen.last_failed_login.is_none());
}

#[tokio::test]
async fn aussperren_und_entriegeln() {
    let db = db().await;
    let user = UserRepository::create(
        &db,
        NeuerBenutzer {
            status: KontoStatus::Aktiv,
            ..neu("lea", "lea@example.com")
        },
    )
    .await
    .unwrap();

    let jetzt = Utc::now();
    UserRepository::record_failed_login(&db, user.id, jetzt, jetzt)
        .await
        .unwrap();

    assert!(UserRepository::lock_out(&db, user.id, jetzt).await.unwrap());
    // Ein zweites Aussperren findet keinen aktiven Benutzer mehr
    assert!(!UserRepository::lock_out(&db, user.id, jetzt).await.unwrap());

    let gesperrt = UserRepository::get_by_id(&db, user.id).await.unwrap().unwrap();
    assert_eq!(gesperrt.status, KontoStatus::Ausgesperrt);
    assert!(gesperrt.locked_at.is_some());

    assert!(UserRepository::unlock(&db, user.id).await.unwrap());
    let frei = UserRepository::get_by_id(&db, user.id).await.unwrap().unwrap();
    assert_eq!(frei.status, KontoStatus::Aktiv);
    assert_eq!(frei.failed_login_count, 0);
    assert!(frei.locked_at.is_none());

    assert!(!UserRepository::unlock(&db, user.id).await.unwrap());
}

#[tokio::test]
async fn zaehlung_nach_status() {
    let db = db().await;
    UserRepository::create(&db, neu("mia", "mia@example.com"))
        .await
        .unwrap();
    UserRepository::create(
        &db,
        NeuerBenutzer {
            status: KontoStatus::Aktiv,
            ..neu("nick", "nick@example.com")
        },
    )
    .await
    .unwrap();
    UserRepository::create(
        &db,
        NeuerBenutzer {
            status: KontoStatus::Aktiv,
            ..neu("olga", "olga@example.com")
        },
    )
    .await
    .unwrap();

    let mut zaehlung = UserRepository::count_by_status(&db).await.unwrap();
    zaehlung.sort_by_key(|(s, _)| s.als_str());
    assert_eq!(
        zaehlung,
        vec![
            (KontoStatus::Aktiv, 2),
            (KontoStatus::VerifizierungAusstehend, 1)
        ]
    );
}

#[tokio::test]
async fn letzte_anmeldung_wird_gesetzt() {
    let db = db().await;
    let user = UserRepository::create(&db, neu("paul", "paul@example.com"))
        .await
        .unwrap();
    assert!(user.last_login.is_none());

    UserRepository::update_last_login(&db, user.id).await.unwrap();

    let geladen = UserRepository::get_by_id(&db, user.id).await.unwrap().unwrap();
    assert!(geladen.last_login.is_some());
}

#[tokio::test]
async fn registrierung_schreibt_benutzer_token_und_gruppe() {
    let db = db().await;
    let gruppe = GroupRepository::create(
        &db,
        NeueGruppe {
            name: "Abonnenten",
            handle: "subscribers",
            permissions: &[],
        },
    )
    .await
    .unwrap();

    let user = UserRepository::register(
        &db,
        NeueRegistrierung {
            benutzer: neu("rita", "rita@example.com"),
            activation_code_hash: Some("code-hash"),
            issued_at: Utc::now(),
            group_ids: &[gruppe.id],
        },
    )
    .await
    .expect("Registrierung fehlgeschlagen");

    assert_eq!(user.status, KontoStatus::VerifizierungAusstehend);
    let token = TokenRepository::get(&db, user.id, TokenZweck::KontoAktivieren)
        .await
        .unwrap()
        .expect("Aktivierungs-Token fehlt");
    assert_eq!(token.code_hash, "code-hash");
    let gruppen = GroupRepository::list_for_user(&db, user.id).await.unwrap();
    assert_eq!(gruppen.len(), 1);
    assert_eq!(gruppen[0].id, gruppe.id);
}

#[tokio::test]
async fn registrierung_mit_unbekannter_gruppe_hinterlaesst_nichts() {
    let db = db().await;

    let err = UserRepository::register(
        &db,
        NeueRegistrierung {
            benutzer: neu("sven", "sven@example.com"),
            activation_code_hash: Some("code-hash"),
            issued_at: Utc::now(),
            group_ids: &[Uuid::new_v4()],
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, DbError::NichtGefunden(_)));

    assert!(UserRepository::get_by_name(&db, "sven").await.unwrap().is_none());
    assert_eq!(TokenRepository::cleanup_expired(&db, Utc::now()).await.unwrap(), 0);

    // Ein erneuter Versuch scheitert nicht an der Eindeutigkeit
    let user = UserRepository::register(
        &db,
        NeueRegistrierung {
            benutzer: neu("sven", "sven@example.com"),
            activation_code_hash: None,
            issued_at: Utc::now(),
            group_ids: &[],
        },
    )
    .await
    .unwrap();
    assert_eq!(user.username, "sven");
}
