//! SQLite-Implementierung des GroupRepository
//!
//! Die Berechtigungen einer Gruppe liegen als JSON-Array in der Spalte
//! `permissions`.

use chrono::Utc;
use sqlx::Row;
use uuid::Uuid;

use crate::error::DbError;
use crate::models::{GruppeRecord, NeueGruppe};
use crate::repository::{DbResult, GroupRepository};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{uuid_parsen, zeit_parsen, zeitstempel};

impl GroupRepository for SqliteDb {
    async fn create(&self, data: NeueGruppe<'_>) -> DbResult<GruppeRecord> {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let permissions = serde_json::to_string(data.permissions)?;

        sqlx::query(
            "INSERT INTO user_groups (id, name, handle, permissions, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(id.to_string())
        .bind(data.name)
        .bind(data.handle)
        .bind(&permissions)
        .bind(zeitstempel(now))
        .execute(&self.pool)
        .await
        .map_err(|e| DbError::aus_sqlx(e, "user_groups", &["handle"]))?;

        self.get(id)
            .await?
            .ok_or_else(|| DbError::intern("Gruppe nach Insert nicht gefunden"))
    }

    async fn get(&self, id: Uuid) -> DbResult<Option<GruppeRecord>> {
        let row = sqlx::query(
            "SELECT id, name, handle, permissions, created_at FROM user_groups WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_gruppe(&r)).transpose()
    }

    async fn get_by_handle(&self, handle: &str) -> DbResult<Option<GruppeRecord>> {
        let row = sqlx::query(
            "SELECT id, name, handle, permissions, created_at FROM user_groups WHERE handle = ?",
        )
        .bind(handle.trim())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| row_to_gruppe(&r)).transpose()
    }

    async fn list(&self) -> DbResult<Vec<GruppeRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, handle, permissions, created_at FROM user_groups ORDER BY name, handle",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_gruppe).collect()
    }

    async fn list_for_user(&self, user_id: Uuid) -> DbResult<Vec<GruppeRecord>> {
        let rows = sqlx::query(
            "SELECT g.id, g.name, g.handle, g.permissions, g.created_at
             FROM user_groups g
             JOIN user_group_members m ON m.group_id = g.id
             WHERE m.user_id = ?
             ORDER BY g.name, g.handle",
        )
        .bind(user_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_gruppe).collect()
    }

    async fn rename(&self, id: Uuid, name: &str) -> DbResult<GruppeRecord> {
        let affected = sqlx::query("UPDATE user_groups SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Gruppe {id}")));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::intern("Gruppe nach Update nicht gefunden"))
    }

    async fn set_permissions(&self, id: Uuid, permissions: &[String]) -> DbResult<GruppeRecord> {
        let json = serde_json::to_string(permissions)?;
        let affected = sqlx::query("UPDATE user_groups SET permissions = ? WHERE id = ?")
            .bind(&json)
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Gruppe {id}")));
        }

        self.get(id)
            .await?
            .ok_or_else(|| DbError::intern("Gruppe nach Update nicht gefunden"))
    }

    async fn delete(&self, id: Uuid) -> DbResult<bool> {
        // Mitgliedschaften fallen per ON DELETE CASCADE weg
        let affected = sqlx::query("DELETE FROM user_groups WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn add_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<()> {
        sqlx::query("INSERT OR IGNORE INTO user_group_members (user_id, group_id) VALUES (?, ?)")
            .bind(user_id.to_string())
            .bind(group_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn remove_member(&self, group_id: Uuid, user_id: Uuid) -> DbResult<bool> {
        let affected =
            sqlx::query("DELETE FROM user_group_members WHERE user_id = ? AND group_id = ?")
                .bind(user_id.to_string())
                .bind(group_id.to_string())
                .execute(&self.pool)
                .await?
                .rows_affected();
        Ok(affected > 0)
    }

    async fn set_groups_for_user(&self, user_id: Uuid, group_ids: &[Uuid]) -> DbResult<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM user_group_members WHERE user_id = ?")
            .bind(user_id.to_string())
            .execute(&mut *tx)
            .await?;

        for group_id in group_ids {
            sqlx::query("INSERT OR IGNORE INTO user_group_members (user_id, group_id) VALUES (?, ?)")
                .bind(user_id.to_string())
                .bind(group_id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

fn row_to_gruppe(row: &sqlx::sqlite::SqliteRow) -> DbResult<GruppeRecord> {
    let id_str: String = row.try_get("id")?;
    let permissions: String = row.try_get("permissions")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(GruppeRecord {
        id: uuid_parsen(&id_str)?,
        name: row.try_get("name")?,
        handle: row.try_get("handle")?,
        permissions: serde_json::from_str(&permissions)?,
        created_at: zeit_parsen("created_at", &created_at)?,
    })
}
