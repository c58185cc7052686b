//! Session-Verwaltung
//!
//! Sessions leben nur im Speicher und verfallen nach ihrer TTL. "Angemeldet
//! bleiben" verlaengert lediglich die TTL. Das Bereinigen abgelaufener
//! Sessions stoesst der Server periodisch an.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AuthError, AuthResult};
use crate::password::zufalls_token;

/// Eine angemeldete Session
#[derive(Debug, Clone)]
pub struct Session {
    /// Der Token-String (URL-sicheres Base64)
    pub token: String,
    pub user_id: Uuid,
    pub erstellt_am: DateTime<Utc>,
    pub laeuft_ab_am: DateTime<Utc>,
    pub angemeldet_bleiben: bool,
}

impl Session {
    pub fn ist_gueltig(&self) -> bool {
        Utc::now() < self.laeuft_ab_am
    }
}

/// In-Memory Session-Store
#[derive(Debug, Default)]
pub struct SessionStore {
    /// token -> Session
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn neu() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Erstellt eine Session mit der angegebenen Lebensdauer
    pub async fn erstellen(
        &self,
        user_id: Uuid,
        ttl: Duration,
        angemeldet_bleiben: bool,
    ) -> Session {
        let jetzt = Utc::now();
        let session = Session {
            token: zufalls_token(),
            user_id,
            erstellt_am: jetzt,
            laeuft_ab_am: jetzt + ttl,
            angemeldet_bleiben,
        };

        self.sessions
            .write()
            .await
            .insert(session.token.clone(), session.clone());
        tracing::debug!(user_id = %user_id, angemeldet_bleiben, "Session erstellt");
        session
    }

    /// Liefert die Session zu einem Token
    ///
    /// Abgelaufene Sessions werden dabei entfernt.
    pub async fn validieren(&self, token: &str) -> AuthResult<Session> {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(token) {
                None => return Err(AuthError::SessionUngueltig),
                Some(session) if session.ist_gueltig() => return Ok(session.clone()),
                Some(_) => {}
            }
        }
        self.sessions.write().await.remove(token);
        Err(AuthError::SessionAbgelaufen)
    }

    /// Entfernt eine Session; gibt `true` zurueck wenn sie existierte
    pub async fn invalidieren(&self, token: &str) -> bool {
        self.sessions.write().await.remove(token).is_some()
    }

    /// Invalidiert alle Sessions eines Benutzers (Sperrung, Passwortwechsel)
    pub async fn alle_invalidieren(&self, user_id: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| s.user_id != user_id);
        let entfernt = vorher - sessions.len();
        if entfernt > 0 {
            tracing::debug!(user_id = %user_id, anzahl = entfernt, "Sessions des Benutzers invalidiert");
        }
        entfernt
    }

    /// Entfernt abgelaufene Sessions und gibt deren Anzahl zurueck
    pub async fn cleanup_abgelaufene(&self) -> usize {
        let jetzt = Utc::now();
        let mut sessions = self.sessions.write().await;
        let vorher = sessions.len();
        sessions.retain(|_, s| s.laeuft_ab_am > jetzt);
        vorher - sessions.len()
    }

    pub async fn anzahl_aktive(&self) -> usize {
        let jetzt = Utc::now();
        let sessions = self.sessions.read().await;
        sessions.values().filter(|s| s.laeuft_ab_am > jetzt).count()
    }
}
