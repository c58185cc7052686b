//! SQLite-Implementierung des UserRepository

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use pforte_core::{KontoStatus, TokenZweck};

use crate::error::DbError;
use crate::models::{BenutzerRecord, BenutzerUpdate, NeueRegistrierung, NeuerBenutzer};
use crate::repository::{DbResult, UserRepository};
use crate::sqlite::pool::SqliteDb;
use crate::sqlite::{uuid_parsen, zeit_parsen, zeit_parsen_opt, zeitstempel};

const SPALTEN: &str = "id, username, email, password_hash, first_name, last_name, locale, photo,
    is_admin, status, password_reset_required, failed_login_count, last_failed_login,
    locked_at, created_at, last_login";

const EINDEUTIGE_FELDER: &[&str] = &["username", "email"];

impl UserRepository for SqliteDb {
    async fn create(&self, data: NeuerBenutzer<'_>) -> DbResult<BenutzerRecord> {
        let id = Uuid::new_v4();
        benutzer_einfuegen(&self.pool, id, &data, Utc::now()).await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::intern("Benutzer nach Insert nicht gefunden"))
    }

    async fn register(&self, data: NeueRegistrierung<'_>) -> DbResult<BenutzerRecord> {
        let id = Uuid::new_v4();
        let mut tx = self.pool.begin().await?;

        benutzer_einfuegen(&mut *tx, id, &data.benutzer, data.issued_at).await?;

        if let Some(code_hash) = data.activation_code_hash {
            sqlx::query(
                "INSERT INTO verification_tokens (user_id, purpose, code_hash, issued_at)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id.to_string())
            .bind(TokenZweck::KontoAktivieren.als_str())
            .bind(code_hash)
            .bind(zeitstempel(data.issued_at))
            .execute(&mut *tx)
            .await?;
        }

        for group_id in data.group_ids {
            sqlx::query("INSERT OR IGNORE INTO user_group_members (user_id, group_id) VALUES (?, ?)")
                .bind(id.to_string())
                .bind(group_id.to_string())
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if e.to_string().contains("FOREIGN KEY") {
                        DbError::nicht_gefunden(format!("Gruppe {group_id}"))
                    } else {
                        DbError::Sqlx(e)
                    }
                })?;
        }

        tx.commit().await?;

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::intern("Benutzer nach Registrierung nicht gefunden"))
    }

    async fn get_by_id(&self, id: Uuid) -> DbResult<Option<BenutzerRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM users WHERE id = ?");
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_benutzer(&r)).transpose()
    }

    async fn get_by_name(&self, username: &str) -> DbResult<Option<BenutzerRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM users WHERE username = ?");
        let row = sqlx::query(&sql)
            .bind(username.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_benutzer(&r)).transpose()
    }

    async fn get_by_email(&self, email: &str) -> DbResult<Option<BenutzerRecord>> {
        let sql = format!("SELECT {SPALTEN} FROM users WHERE email = ?");
        let row = sqlx::query(&sql)
            .bind(email.trim())
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_benutzer(&r)).transpose()
    }

    async fn get_by_identifier(&self, kennung: &str) -> DbResult<Option<BenutzerRecord>> {
        let kennung = kennung.trim();
        // Die Spalten-Collation (NOCASE) gilt auch fuer den ORDER BY-Vergleich
        let sql = format!(
            "SELECT {SPALTEN} FROM users
             WHERE username = ? OR email = ?
             ORDER BY CASE WHEN username = ? THEN 0 ELSE 1 END
             LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(kennung)
            .bind(kennung)
            .bind(kennung)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| row_to_benutzer(&r)).transpose()
    }

    async fn update(&self, id: Uuid, data: BenutzerUpdate) -> DbResult<BenutzerRecord> {
        // Dynamisches UPDATE – nur gesetzte Felder aendern
        let mut sets: Vec<&str> = Vec::new();
        if data.username.is_some() {
            sets.push("username = ?");
        }
        if data.email.is_some() {
            sets.push("email = ?");
        }
        if data.password_hash.is_some() {
            sets.push("password_hash = ?");
        }
        if data.first_name.is_some() {
            sets.push("first_name = ?");
        }
        if data.last_name.is_some() {
            sets.push("last_name = ?");
        }
        if data.locale.is_some() {
            sets.push("locale = ?");
        }
        if data.photo.is_some() {
            sets.push("photo = ?");
        }
        if data.password_reset_required.is_some() {
            sets.push("password_reset_required = ?");
        }

        if sets.is_empty() {
            return self
                .get_by_id(id)
                .await?
                .ok_or_else(|| DbError::nicht_gefunden(format!("Benutzer {id}")));
        }

        let sql = format!("UPDATE users SET {} WHERE id = ?", sets.join(", "));
        let mut q = sqlx::query(&sql);

        if let Some(ref v) = data.username {
            q = q.bind(v.trim().to_string());
        }
        if let Some(ref v) = data.email {
            q = q.bind(v.trim().to_string());
        }
        if let Some(ref v) = data.password_hash {
            q = q.bind(v);
        }
        if let Some(ref v) = data.first_name {
            q = q.bind(v.clone());
        }
        if let Some(ref v) = data.last_name {
            q = q.bind(v.clone());
        }
        if let Some(ref v) = data.locale {
            q = q.bind(v.clone());
        }
        if let Some(ref v) = data.photo {
            q = q.bind(v.clone());
        }
        if let Some(v) = data.password_reset_required {
            q = q.bind(v as i64);
        }
        q = q.bind(id.to_string());

        let affected = q
            .execute(&self.pool)
            .await
            .map_err(|e| DbError::aus_sqlx(e, "users", EINDEUTIGE_FELDER))?
            .rows_affected();
        if affected == 0 {
            return Err(DbError::nicht_gefunden(format!("Benutzer {id}")));
        }

        self.get_by_id(id)
            .await?
            .ok_or_else(|| DbError::intern("Benutzer nach Update nicht gefunden"))
    }

    async fn count_by_status(&self) -> DbResult<Vec<(KontoStatus, i64)>> {
        let rows = sqlx::query("SELECT status, COUNT(*) AS anzahl FROM users GROUP BY status")
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(|r| {
                let status: String = r.try_get("status")?;
                let anzahl: i64 = r.try_get("anzahl")?;
                Ok((status_parsen(&status)?, anzahl))
            })
            .collect()
    }

    async fn compare_and_set_status(
        &self,
        id: Uuid,
        erwartet: KontoStatus,
        neu: KontoStatus,
    ) -> DbResult<bool> {
        let affected = sqlx::query("UPDATE users SET status = ? WHERE id = ? AND status = ?")
            .bind(neu.als_str())
            .bind(id.to_string())
            .bind(erwartet.als_str())
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        fenster_start: DateTime<Utc>,
        jetzt: DateTime<Utc>,
    ) -> DbResult<i64> {
        let row = sqlx::query(
            "UPDATE users
             SET failed_login_count = CASE
                     WHEN last_failed_login IS NOT NULL AND last_failed_login >= ?
                     THEN failed_login_count + 1
                     ELSE 1
                 END,
                 last_failed_login = ?
             WHERE id = ?
             RETURNING failed_login_count",
        )
        .bind(zeitstempel(fenster_start))
        .bind(zeitstempel(jetzt))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(r) => Ok(r.try_get("failed_login_count")?),
            None => Err(DbError::nicht_gefunden(format!("Benutzer {id}"))),
        }
    }

    async fn lock_out(&self, id: Uuid, jetzt: DateTime<Utc>) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE users SET status = 'locked', locked_at = ?
             WHERE id = ? AND status = 'active'",
        )
        .bind(zeitstempel(jetzt))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn unlock(&self, id: Uuid) -> DbResult<bool> {
        let affected = sqlx::query(
            "UPDATE users
             SET status = 'active', locked_at = NULL,
                 failed_login_count = 0, last_failed_login = NULL
             WHERE id = ? AND status = 'locked'",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    async fn reset_failed_logins(&self, id: Uuid) -> DbResult<()> {
        sqlx::query(
            "UPDATE users SET failed_login_count = 0, last_failed_login = NULL WHERE id = ?",
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_last_login(&self, id: Uuid) -> DbResult<()> {
        sqlx::query("UPDATE users SET last_login = ? WHERE id = ?")
            .bind(zeitstempel(Utc::now()))
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

async fn benutzer_einfuegen<'e, E>(
    executor: E,
    id: Uuid,
    data: &NeuerBenutzer<'_>,
    jetzt: DateTime<Utc>,
) -> DbResult<()>
where
    E: sqlx::SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO users (id, username, email, password_hash, first_name, last_name, locale,
                            is_admin, status, password_reset_required, created_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(id.to_string())
    .bind(data.username)
    .bind(data.email)
    .bind(data.password_hash)
    .bind(data.first_name)
    .bind(data.last_name)
    .bind(data.locale)
    .bind(data.is_admin as i64)
    .bind(data.status.als_str())
    .bind(data.password_reset_required as i64)
    .bind(zeitstempel(jetzt))
    .execute(executor)
    .await
    .map_err(|e| DbError::aus_sqlx(e, "users", EINDEUTIGE_FELDER))?;
    Ok(())
}

fn status_parsen(wert: &str) -> DbResult<KontoStatus> {
    KontoStatus::from_str(wert).map_err(DbError::UngueltigeDaten)
}

fn row_to_benutzer(row: &sqlx::sqlite::SqliteRow) -> DbResult<BenutzerRecord> {
    let id_str: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    let is_admin: i64 = row.try_get("is_admin")?;
    let reset: i64 = row.try_get("password_reset_required")?;

    Ok(BenutzerRecord {
        id: uuid_parsen(&id_str)?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        locale: row.try_get("locale")?,
        photo: row.try_get("photo")?,
        is_admin: is_admin != 0,
        status: status_parsen(&status)?,
        password_reset_required: reset != 0,
        failed_login_count: row.try_get("failed_login_count")?,
        last_failed_login: zeit_parsen_opt("last_failed_login", row.try_get("last_failed_login")?)?,
        locked_at: zeit_parsen_opt("locked_at", row.try_get("locked_at")?)?,
        created_at: zeit_parsen("created_at", &created_at)?,
        last_login: zeit_parsen_opt("last_login", row.try_get("last_login")?)?,
    })
}
