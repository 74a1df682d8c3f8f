// src/db/appointment_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::appointment::{AppointmentRow, AppointmentStatus, CreateAppointmentPayload},
};

/// Escopo de listagem já resolvido pelo papel de quem pergunta.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppointmentQuery {
    pub user_id: Option<Uuid>,
    pub garage_id: Option<Uuid>,
    // Todas as oficinas deste dono
    pub owner_id: Option<Uuid>,
}

/// Alterações calculadas pelo serviço para uma resposta do dono.
/// `None` mantém o valor atual.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentUpdate {
    pub cost_estimate: Option<Decimal>,
    pub duration_days: Option<i32>,
    pub appointment_date: Option<DateTime<Utc>>,
    pub owner_notes: Option<String>,
    pub status: Option<AppointmentStatus>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

// Colunas do agendamento + resumo do cliente e da oficina.
// Espera um CTE ou tabela chamado `ap`.
const DETAIL_COLUMNS: &str = r#"
    ap.*,
    u.name AS user_name,
    u.email AS user_email,
    g.name AS garage_name,
    g.location AS garage_location,
    g.phone AS garage_phone,
    g.owner_id AS garage_owner_id
"#;

const DETAIL_JOINS: &str = r#"
    JOIN accounts u ON u.id = ap.user_id
    JOIN garages g ON g.id = ap.garage_id
"#;

#[derive(Clone)]
pub struct AppointmentRepository {
    pool: PgPool,
}

impl AppointmentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self, query: &AppointmentQuery) -> Result<Vec<AppointmentRow>, AppError> {
        let sql = format!(
            r#"
            SELECT {DETAIL_COLUMNS}
            FROM appointments ap
            {DETAIL_JOINS}
            WHERE ($1::uuid IS NULL OR ap.user_id = $1)
              AND ($2::uuid IS NULL OR ap.garage_id = $2)
              AND ($3::uuid IS NULL OR g.owner_id = $3)
            ORDER BY ap.created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(query.user_id)
            .bind(query.garage_id)
            .bind(query.owner_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn find_detail<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<AppointmentRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("SELECT {DETAIL_COLUMNS} FROM appointments ap {DETAIL_JOINS} WHERE ap.id = $1");

        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row)
    }

    // Trava a linha do agendamento até o fim da transação
    pub async fn find_detail_for_update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
    ) -> Result<Option<AppointmentRow>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {DETAIL_COLUMNS} FROM appointments ap {DETAIL_JOINS} WHERE ap.id = $1 FOR UPDATE OF ap"
        );

        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(row)
    }

    // Todo agendamento nasce PENDING
    pub async fn create<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        input: &CreateAppointmentPayload,
    ) -> Result<AppointmentRow, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            WITH ap AS (
                INSERT INTO appointments (user_id, garage_id, car_model, car_year, description, photos, status)
                VALUES ($1, $2, $3, $4, $5, $6, 'PENDING')
                RETURNING *
            )
            SELECT {DETAIL_COLUMNS} FROM ap {DETAIL_JOINS}
            "#
        );

        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(user_id)
            .bind(input.garage_id)
            .bind(&input.car_model)
            .bind(&input.car_year)
            .bind(&input.description)
            .bind(&input.photos)
            .fetch_one(executor)
            .await?;

        Ok(row)
    }

    // Os carimbos só são gravados se ainda estiverem vazios
    pub async fn apply_update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        update: &AppointmentUpdate,
    ) -> Result<AppointmentRow, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            WITH ap AS (
                UPDATE appointments SET
                    cost_estimate = COALESCE($2, cost_estimate),
                    duration_days = COALESCE($3, duration_days),
                    appointment_date = COALESCE($4, appointment_date),
                    owner_notes = COALESCE($5, owner_notes),
                    status = COALESCE($6, status),
                    confirmed_at = COALESCE(confirmed_at, $7),
                    completed_at = COALESCE(completed_at, $8),
                    updated_at = NOW()
                WHERE id = $1
                RETURNING *
            )
            SELECT {DETAIL_COLUMNS} FROM ap {DETAIL_JOINS}
            "#
        );

        let row = sqlx::query_as::<_, AppointmentRow>(&sql)
            .bind(id)
            .bind(update.cost_estimate)
            .bind(update.duration_days)
            .bind(update.appointment_date)
            .bind(&update.owner_notes)
            .bind(update.status)
            .bind(update.confirmed_at)
            .bind(update.completed_at)
            .fetch_optional(executor)
            .await?
            .ok_or(AppError::AppointmentNotFound)?;

        Ok(row)
    }

    pub async fn delete<'e, E>(&self, executor: E, id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn delete_by_garage<'e, E>(&self, executor: E, garage_id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM appointments WHERE garage_id = $1")
            .bind(garage_id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{db::fixtures, models::auth::Role};
    use chrono::TimeZone;

    struct Seed {
        owner_id: Uuid,
        user_id: Uuid,
        garage_id: Uuid,
    }

    async fn seed(pool: &PgPool) -> anyhow::Result<Seed> {
        let owner = fixtures::account(pool, Role::Owner).await?;
        let user = fixtures::account(pool, Role::User).await?;
        let garage = fixtures::garage(pool, owner.id, "G1", true, true).await?;
        Ok(Seed { owner_id: owner.id, user_id: user.id, garage_id: garage.id })
    }

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 10, hour, 0, 0).unwrap()
    }

    #[sqlx::test]
    async fn new_appointments_start_pending_without_stamps(pool: PgPool) -> anyhow::Result<()> {
        let repo = AppointmentRepository::new(pool.clone());
        let s = seed(&pool).await?;

        let row = repo.create(&pool, s.user_id, &fixtures::appointment_payload(s.garage_id)).await?;

        assert_eq!(row.appointment.status, AppointmentStatus::Pending);
        assert_eq!(row.appointment.user_id, s.user_id);
        assert_eq!(row.appointment.car_model, "Toyota Camry");
        assert_eq!(row.appointment.car_year, "2019");
        assert!(row.appointment.confirmed_at.is_none());
        assert!(row.appointment.completed_at.is_none());
        // Resumos desnormalizados já vêm no retorno
        assert_eq!(row.garage_name, "G1");
        assert_eq!(row.garage_owner_id, s.owner_id);
        assert_eq!(row.user_name, "Alice");
        Ok(())
    }

    #[sqlx::test]
    async fn confirmed_at_is_written_once(pool: PgPool) -> anyhow::Result<()> {
        let repo = AppointmentRepository::new(pool.clone());
        let s = seed(&pool).await?;
        let id = repo
            .create(&pool, s.user_id, &fixtures::appointment_payload(s.garage_id))
            .await?
            .appointment
            .id;

        let confirm = AppointmentUpdate {
            status: Some(AppointmentStatus::Confirmed),
            cost_estimate: Some(Decimal::new(35000, 2)),
            duration_days: Some(2),
            confirmed_at: Some(at(9)),
            ..Default::default()
        };
        let first = repo.apply_update(&pool, id, &confirm).await?;
        assert_eq!(first.appointment.status, AppointmentStatus::Confirmed);
        assert_eq!(first.appointment.confirmed_at, Some(at(9)));
        assert_eq!(first.appointment.cost_estimate, Some(Decimal::new(35000, 2)));

        // Um segundo carimbo não substitui o primeiro
        let again = AppointmentUpdate { confirmed_at: Some(at(15)), ..confirm.clone() };
        let second = repo.apply_update(&pool, id, &again).await?;
        assert_eq!(second.appointment.confirmed_at, Some(at(9)));

        let done = AppointmentUpdate {
            status: Some(AppointmentStatus::Done),
            completed_at: Some(at(18)),
            ..Default::default()
        };
        let finished = repo.apply_update(&pool, id, &done).await?;
        assert_eq!(finished.appointment.status, AppointmentStatus::Done);
        assert_eq!(finished.appointment.completed_at, Some(at(18)));
        // Campos não enviados continuam como estavam
        assert_eq!(finished.appointment.confirmed_at, Some(at(9)));
        assert_eq!(finished.appointment.duration_days, Some(2));
        Ok(())
    }

    #[sqlx::test]
    async fn updating_a_missing_appointment_is_not_found(pool: PgPool) -> anyhow::Result<()> {
        let repo = AppointmentRepository::new(pool.clone());
        let result = repo.apply_update(&pool, Uuid::new_v4(), &AppointmentUpdate::default()).await;
        assert!(matches!(result, Err(AppError::AppointmentNotFound)));
        Ok(())
    }

    #[sqlx::test]
    async fn listing_scopes_by_user_garage_and_owner(pool: PgPool) -> anyhow::Result<()> {
        let repo = AppointmentRepository::new(pool.clone());
        let s = seed(&pool).await?;
        let other_owner = fixtures::account(&pool, Role::Owner).await?;
        let other_user = fixtures::account(&pool, Role::User).await?;
        let other_garage = fixtures::garage(&pool, other_owner.id, "G2", true, true).await?;

        repo.create(&pool, s.user_id, &fixtures::appointment_payload(s.garage_id)).await?;
        repo.create(&pool, other_user.id, &fixtures::appointment_payload(s.garage_id)).await?;
        repo.create(&pool, s.user_id, &fixtures::appointment_payload(other_garage.id)).await?;

        let mine = repo.list(&AppointmentQuery { user_id: Some(s.user_id), ..Default::default() }).await?;
        assert_eq!(mine.len(), 2);
        assert!(mine.iter().all(|r| r.appointment.user_id == s.user_id));

        let owned = repo.list(&AppointmentQuery { owner_id: Some(s.owner_id), ..Default::default() }).await?;
        assert_eq!(owned.len(), 2);
        assert!(owned.iter().all(|r| r.garage_owner_id == s.owner_id));

        let one_garage = repo
            .list(&AppointmentQuery { garage_id: Some(other_garage.id), ..Default::default() })
            .await?;
        assert_eq!(one_garage.len(), 1);

        assert_eq!(repo.list(&AppointmentQuery::default()).await?.len(), 3);
        Ok(())
    }

    #[sqlx::test]
    async fn hard_delete_removes_only_the_target(pool: PgPool) -> anyhow::Result<()> {
        let repo = AppointmentRepository::new(pool.clone());
        let s = seed(&pool).await?;
        let a = repo.create(&pool, s.user_id, &fixtures::appointment_payload(s.garage_id)).await?;
        let b = repo.create(&pool, s.user_id, &fixtures::appointment_payload(s.garage_id)).await?;

        assert_eq!(repo.delete(&pool, a.appointment.id).await?, 1);
        assert_eq!(repo.delete(&pool, a.appointment.id).await?, 0);
        assert!(repo.find_detail(&pool, b.appointment.id).await?.is_some());

        assert_eq!(repo.delete_by_garage(&pool, s.garage_id).await?, 1);
        assert!(repo.find_detail(&pool, b.appointment.id).await?.is_none());
        Ok(())
    }
}
