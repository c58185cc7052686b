//! SQLite-Implementierung des PermissionRepository

use sqlx::Row;
use uuid::Uuid;

use crate::repository::{DbResult, PermissionRepository};
use crate::sqlite::pool::SqliteDb;

impl PermissionRepository for SqliteDb {
    async fn get_user_permissions(&self, user_id: Uuid) -> DbResult<Vec<String>> {
        let rows = sqlx::query(
            "SELECT permission FROM user_permissions WHERE user_id = ? ORDER BY permission",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| r.try_get::<String, _>("permission").map_err(Into::into))
            .collect()
    }

    async fn replace_user_permissions(
        &self,
        user_id: Uuid,
        is_admin: Option<bool>,
        permissions: &[String],
    ) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        if let Some(admin) = is_admin {
            sqlx::query("UPDATE users SET is_admin = ? WHERE id = ?")
                .bind(admin as i64)
                .bind(user_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query("DELETE FROM user_permissions WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        for permission in permissions {
            sqlx::query("INSERT OR IGNORE INTO user_permissions (user_id, permission) VALUES (?, ?)")
                .bind(user_id.to_string())
                .bind(permission)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
