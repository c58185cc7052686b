//! SQLite-Implementierung des TokenRepository

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use pforte_core::TokenZweck;

use crate::error::DbError;
use crate::models::{NeuerToken, TokenRecord};
use crate::repository::{DbResult, TokenRepository};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{uuid_parsen, zeit_parsen, zeitstempel};

impl TokenRepository for SqliteDb {
    async fn upsert(&self, data: NeuerToken<'_>) -> DbResult<TokenRecord> {
        sqlx::query(
            "INSERT INTO verification_tokens (user_id, purpose, code_hash, issued_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT (user_id, purpose)
             DO UPDATE SET code_hash = excluded.code_hash, issued_at = excluded.issued_at",
        )
        .bind(data.user_id.to_string())
        .bind(data.purpose.als_str())
        .bind(data.code_hash)
        .bind(zeitstempel(data.issued_at))
        .execute(&self.pool)
        .await?;

        Ok(TokenRecord {
            user_id: data.user_id,
            purpose: data.purpose,
            code_hash: data.code_hash.to_string(),
            issued_at: data.issued_at,
        })
    }

    async fn get(&self, user_id: Uuid, purpose: TokenZweck) -> DbResult<Option<TokenRecord>> {
        let row = sqlx::query(
            "SELECT user_id, purpose, code_hash, issued_at
             FROM verification_tokens WHERE user_id = ? AND purpose = ?",
        )
        .bind(user_id.to_string())
        .bind(purpose.als_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_token(&r)).transpose()
    }

    async fn consume(
        &self,
        user_id: Uuid,
        purpose: TokenZweck,
        code_hash: &str,
    ) -> DbResult<bool> {
        let affected = sqlx::query(
            "DELETE FROM verification_tokens
             WHERE user_id = ? AND purpose = ? AND code_hash = ?",
        )
        .bind(user_id.to_string())
        .bind(purpose.als_str())
        .bind(code_hash)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn delete(&self, user_id: Uuid, purpose: TokenZweck) -> DbResult<bool> {
        let affected =
            sqlx::query("DELETE FROM verification_tokens WHERE user_id = ? AND purpose = ?")
                .bind(user_id.to_string())
                .bind(purpose.als_str())
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(affected > 0)
    }

    async fn cleanup_expired(&self, vor: DateTime<Utc>) -> DbResult<u64> {
        let affected = sqlx::query("DELETE FROM verification_tokens WHERE issued_at < ?")
            .bind(zeitstempel(vor))
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected)
    }
}

fn row_to_token(row: &sqlx::sqlite::SqliteRow) -> DbResult<TokenRecord> {
    let user_id: String = row.try_get("user_id")?;
    let purpose: String = row.try_get("purpose")?;
    let issued_at: String = row.try_get("issued_at")?;

    Ok(TokenRecord {
        user_id: uuid_parsen(&user_id)?,
        purpose: TokenZweck::from_str(&purpose).map_err(DbError::UngueltigeDaten)?,
        code_hash: row.try_get("code_hash")?,
        issued_at: zeit_parsen("issued_at", &issued_at)?,
    })
}
