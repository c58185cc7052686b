//! pforte-server – Bibliotheks-Root
//!
//! Verdrahtet Datenbank, Dienste und Observability und stellt den
//! oeffentlichen Einstiegspunkt fuer Integrationstests bereit.

pub mod config;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use config::{BootstrapEinstellungen, ServerConfig};
use pforte_auth::{DeaktivierterBilddienst, Dienste, NeuesKonto, ProtokollMailer};
use pforte_core::KontoStatus;
use pforte_db::{SqliteDb, UserRepository};
use pforte_observability::{HealthState, PforteMetriken};

/// Haelt den laufenden Server-Zustand zusammen
pub struct Server {
    pub config: ServerConfig,
}

impl Server {
    /// Erstellt einen neuen Server aus der gegebenen Konfiguration
    pub fn neu(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Startet alle Server-Subsysteme und laeuft bis zum Shutdown-Signal
    ///
    /// Reihenfolge:
    /// 1. Datenbank oeffnen und migrieren
    /// 2. Dienste verdrahten, ggf. ersten Administrator anlegen
    /// 3. Wartungs-Task starten (Tokens, Sessions, Metriken)
    /// 4. Observability-Server starten
    /// 5. Auf Ctrl-C warten
    pub async fn starten(self) -> Result<()> {
        let db = SqliteDb::oeffnen(&self.config.datenbank.als_db_config())
            .await
            .context("Datenbank konnte nicht geoeffnet werden")?;

        let dienste = Arc::new(Dienste::neu(
            Arc::new(db.clone()),
            self.config.benutzer.clone(),
            Arc::new(ProtokollMailer),
            Arc::new(DeaktivierterBilddienst),
        ));

        if let Some(admin) = &self.config.bootstrap {
            admin_anlegen(&dienste, admin).await?;
        }

        let metriken = PforteMetriken::neu()?;
        let health = HealthState::neu();

        wartung_starten(
            Arc::clone(&dienste),
            metriken.clone(),
            health.clone(),
            Duration::from_secs(self.config.wartung.intervall_sekunden.max(1)),
        );

        if self.config.observability.aktiviert {
            let addr: SocketAddr = self
                .config
                .observability_bind_adresse()
                .parse()
                .context("Ungueltige Observability-Adresse")?;
            tokio::spawn(async move {
                if let Err(e) =
                    pforte_observability::observability_server_starten(addr, metriken, health).await
                {
                    tracing::error!("Observability-Server beendet: {e:#}");
                }
            });
        }

        tracing::info!(
            edition = %self.config.benutzer.edition,
            oeffentliche_registrierung = self.config.benutzer.oeffentliche_registrierung,
            "Server laeuft. Warte auf Shutdown-Signal (Ctrl-C)..."
        );
        tokio::signal::ctrl_c().await?;
        tracing::info!("Shutdown-Signal empfangen, Server wird beendet");

        db.schliessen().await;
        Ok(())
    }
}

/// Legt den ersten Administrator an, solange noch kein Benutzer existiert
///
/// Gibt `true` zurueck wenn ein Konto angelegt wurde.
pub async fn admin_anlegen(
    dienste: &Dienste<SqliteDb>,
    admin: &BootstrapEinstellungen,
) -> Result<bool> {
    let vorhanden: i64 = UserRepository::count_by_status(&*dienste.repo)
        .await?
        .iter()
        .map(|(_, anzahl)| anzahl)
        .sum();
    if vorhanden > 0 {
        tracing::debug!(benutzer = vorhanden, "Benutzer vorhanden, kein Bootstrap");
        return Ok(false);
    }

    let registrierung = dienste
        .konto
        .registrieren(NeuesKonto {
            username: admin.username.clone(),
            email: admin.email.clone(),
            passwort: Some(admin.passwort.clone()),
            is_admin: true,
            verifizierung_erforderlich: false,
            ..Default::default()
        })
        .await
        .context("Erster Administrator konnte nicht angelegt werden")?;

    tracing::info!(
        user_id = %registrierung.benutzer.id,
        username = %registrierung.benutzer.username,
        "Erster Administrator angelegt"
    );
    Ok(true)
}

/// Ein Wartungsdurchlauf: abgelaufene Tokens und Sessions entfernen,
/// Gauges und DB-Status aktualisieren
pub async fn wartung_ausfuehren(
    dienste: &Dienste<SqliteDb>,
    metriken: &PforteMetriken,
    health: &HealthState,
) {
    match dienste.tokens.abgelaufene_bereinigen().await {
        Ok(anzahl) => metriken.tokens_bereinigt.inc_by(anzahl),
        Err(e) => tracing::error!("Fehler beim Token-Cleanup: {e}"),
    }

    let entfernt = dienste.sessions.cleanup_abgelaufene().await;
    if entfernt > 0 {
        tracing::debug!(anzahl = entfernt, "Abgelaufene Sessions bereinigt");
    }
    metriken
        .aktive_sessions
        .set(dienste.sessions.anzahl_aktive().await as i64);

    match UserRepository::count_by_status(&*dienste.repo).await {
        Ok(zaehlung) => {
            let alle: Vec<&str> = KontoStatus::ALLE.iter().map(|s| s.als_str()).collect();
            metriken.benutzer_setzen(
                &alle,
                zaehlung.iter().map(|(status, anzahl)| (status.als_str(), *anzahl)),
            );
            health.db_status_setzen(true);
        }
        Err(e) => {
            tracing::error!("Datenbank nicht erreichbar: {e}");
            health.db_status_setzen(false);
        }
    }
}

/// Startet die periodische Wartung auf einem eigenen Thread
///
/// Die Repository-Futures sind nicht `Send`, daher kein `tokio::spawn`.
fn wartung_starten(
    dienste: Arc<Dienste<SqliteDb>>,
    metriken: PforteMetriken,
    health: HealthState,
    intervall: Duration,
) {
    let handle = tokio::runtime::Handle::current();
    std::thread::spawn(move || {
        handle.block_on(async move {
            loop {
                wartung_ausfuehren(&dienste, &metriken, &health).await;
                tokio::time::sleep(intervall).await;
            }
        });
    });
}
