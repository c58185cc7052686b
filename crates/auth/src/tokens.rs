//! Ausstellung und Pruefung von Verifizierungs-Tokens
//!
//! Pro (Benutzer, Zweck) gibt es hoechstens ein gueltiges Token. Gespeichert
//! wird nur der Argon2-Hash des Codes. Jeder Fehlschlag bei der Pruefung
//! ergibt dasselbe [`AuthError::TokenUngueltig`].
//!
//! Die Pruefung verbraucht das Token nicht. Erst [`TokenService::verbrauchen`]
//! loescht es, und zwar nur, wenn es seit der Pruefung nicht ersetzt wurde.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use pforte_core::TokenZweck;
use pforte_db::{
    models::{BenutzerRecord, NeuerToken, TokenRecord},
    repository::{TokenRepository, UserRepository},
};

use crate::error::{AuthError, AuthResult};
use crate::password::{passwort_hashen, passwort_verifizieren, zufalls_token};

/// Frisch ausgestelltes Token; `code` existiert nur hier im Klartext
#[derive(Debug, Clone)]
pub struct AusgestellterToken {
    pub user_id: Uuid,
    pub zweck: TokenZweck,
    pub code: String,
    pub ausgestellt_am: DateTime<Utc>,
}

/// Erfolgreich geprueftes, noch nicht verbrauchtes Token
#[derive(Debug, Clone)]
pub struct GeprueftesToken {
    pub benutzer: BenutzerRecord,
    pub(crate) record: TokenRecord,
}

impl GeprueftesToken {
    pub fn zweck(&self) -> TokenZweck {
        self.record.purpose
    }
}

pub struct TokenService<T: TokenRepository, U: UserRepository> {
    token_repo: Arc<T>,
    user_repo: Arc<U>,
    gueltigkeit: Duration,
}

impl<T: TokenRepository, U: UserRepository> TokenService<T, U> {
    pub fn neu(token_repo: Arc<T>, user_repo: Arc<U>, gueltigkeit: Duration) -> Self {
        Self {
            token_repo,
            user_repo,
            gueltigkeit,
        }
    }

    /// Erzeugt einen Code und seinen Hash, ohne etwas zu speichern
    pub(crate) fn code_erzeugen() -> AuthResult<(String, String)> {
        let code = zufalls_token();
        let code_hash = passwort_hashen(&code)?;
        Ok((code, code_hash))
    }

    /// Stellt ein neues Token aus und ersetzt ein vorhandenes desselben Zwecks
    pub async fn ausstellen(&self, user_id: Uuid, zweck: TokenZweck) -> AuthResult<AusgestellterToken> {
        let (code, code_hash) = Self::code_erzeugen()?;
        let jetzt = Utc::now();

        self.token_repo
            .upsert(NeuerToken {
                user_id,
                purpose: zweck,
                code_hash: &code_hash,
                issued_at: jetzt,
            })
            .await?;

        info!(user_id = %user_id, zweck = %zweck, "Verifizierungs-Token ausgestellt");

        Ok(AusgestellterToken {
            user_id,
            zweck,
            code,
            ausgestellt_am: jetzt,
        })
    }

    /// Prueft Code, Benutzer, Zweck und Ablauf
    pub async fn validieren(
        &self,
        code: &str,
        user_id: Uuid,
        zweck: TokenZweck,
    ) -> AuthResult<GeprueftesToken> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::TokenUngueltig);
        }

        let Some(record) = self.token_repo.get(user_id, zweck).await? else {
            debug!(user_id = %user_id, zweck = %zweck, "Kein Token vorhanden");
            return Err(AuthError::TokenUngueltig);
        };

        if record.issued_at + self.gueltigkeit <= Utc::now() {
            debug!(user_id = %user_id, zweck = %zweck, "Token abgelaufen");
            return Err(AuthError::TokenUngueltig);
        }

        if !passwort_verifizieren(code, &record.code_hash).unwrap_or(false) {
            debug!(user_id = %user_id, zweck = %zweck, "Token passt nicht");
            return Err(AuthError::TokenUngueltig);
        }

        let benutzer = self
            .user_repo
            .get_by_id(user_id)
            .await?
            .ok_or(AuthError::TokenUngueltig)?;

        Ok(GeprueftesToken { benutzer, record })
    }

    /// Verbraucht ein gepruftes Token genau einmal
    pub async fn verbrauchen(&self, token: &GeprueftesToken) -> AuthResult<()> {
        let verbraucht = self
            .token_repo
            .consume(token.record.user_id, token.record.purpose, &token.record.code_hash)
            .await?;
        if !verbraucht {
            return Err(AuthError::TokenUngueltig);
        }
        debug!(user_id = %token.record.user_id, zweck = %token.record.purpose, "Token verbraucht");
        Ok(())
    }

    pub async fn verwerfen(&self, user_id: Uuid, zweck: TokenZweck) -> AuthResult<bool> {
        Ok(self.token_repo.delete(user_id, zweck).await?)
    }

    /// Loescht alle abgelaufenen Tokens
    pub async fn abgelaufene_bereinigen(&self) -> AuthResult<u64> {
        let anzahl = self
            .token_repo
            .cleanup_expired(Utc::now() - self.gueltigkeit)
            .await?;
        if anzahl > 0 {
            debug!(anzahl, "Abgelaufene Verifizierungs-Tokens entfernt");
        }
        Ok(anzahl)
    }
}
