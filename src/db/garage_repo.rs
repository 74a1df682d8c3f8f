// src/db/garage_repo.rs

use chrono::{DateTime, Utc};
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::garage::{
        CreateGaragePayload, Garage, GarageListingRow, Specialty, SubscriptionPlan,
        UpdateGaragePayload,
    },
};

/// Filtro já resolvido pelas regras de visibilidade do serviço.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GarageQuery {
    pub owner_id: Option<Uuid>,
    pub specialty: Option<Specialty>,
    /// Só oficinas aprovadas E com assinatura ativa
    pub visible_only: bool,
}

/// Dados de ativação vindos do billing (checkout ou ativação manual).
#[derive(Debug, Clone, Default)]
pub struct SubscriptionActivation {
    pub plan: Option<SubscriptionPlan>,
    pub subscription_id: Option<String>,
    pub customer_id: Option<String>,
    pub ends_at: Option<DateTime<Utc>>,
}

const LISTING_SELECT: &str = r#"
    SELECT
        g.*,
        a.name AS owner_name,
        a.email AS owner_email,
        (SELECT COUNT(*) FROM appointments ap WHERE ap.garage_id = g.id) AS appointment_count
    FROM garages g
    JOIN accounts a ON a.id = g.owner_id
"#;

#[derive(Clone)]
pub struct GarageRepository {
    pool: PgPool,
}

impl GarageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    //  LEITURA
    // =========================================================================

    pub async fn list(&self, query: &GarageQuery) -> Result<Vec<GarageListingRow>, AppError> {
        let sql = format!(
            r#"{LISTING_SELECT}
            WHERE ($1::uuid IS NULL OR g.owner_id = $1)
              AND (NOT $2 OR (g.is_approved AND g.subscription_active))
              AND ($3::specialty IS NULL OR $3 = ANY(g.specialties))
            ORDER BY g.created_at DESC
            "#
        );

        let rows = sqlx::query_as::<_, GarageListingRow>(&sql)
            .bind(query.owner_id)
            .bind(query.visible_only)
            .bind(query.specialty)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows)
    }

    pub async fn find_listing(&self, id: Uuid) -> Result<Option<GarageListingRow>, AppError> {
        let sql = format!("{LISTING_SELECT} WHERE g.id = $1");

        let row = sqlx::query_as::<_, GarageListingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row)
    }

    pub async fn find_by_id<'e, E>(&self, executor: E, id: Uuid) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>("SELECT * FROM garages WHERE id = $1")
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(garage)
    }

    pub async fn find_by_subscription_id<'e, E>(
        &self,
        executor: E,
        subscription_id: &str,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>("SELECT * FROM garages WHERE subscription_id = $1")
            .bind(subscription_id)
            .fetch_optional(executor)
            .await?;

        Ok(garage)
    }

    // =========================================================================
    //  ESCRITA (DONO / ADMIN)
    // =========================================================================

    // Aprovação e assinatura sempre nascem desligadas
    pub async fn create<'e, E>(
        &self,
        executor: E,
        owner_id: Uuid,
        input: &CreateGaragePayload,
    ) -> Result<Garage, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            r#"
            INSERT INTO garages (
                owner_id, name, location, address, phone, description, specialties, photos,
                is_approved, subscription_active
            )
            VALUES ($1, $2, $3, $3, $4, $5, $6, $7, FALSE, FALSE)
            RETURNING *
            "#,
        )
        .bind(owner_id)
        .bind(&input.name)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.description)
        .bind(&input.specialties)
        .bind(&input.photos)
        .fetch_one(executor)
        .await?;

        Ok(garage)
    }

    // Atualização parcial; `location` acompanha `address`
    pub async fn update<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        input: &UpdateGaragePayload,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            r#"
            UPDATE garages SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                address = COALESCE($4, address),
                location = COALESCE($4, location),
                phone = COALESCE($5, phone),
                specialties = COALESCE($6, specialties),
                photos = COALESCE($7, photos),
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&input.name)
        .bind(&input.description)
        .bind(&input.address)
        .bind(&input.phone)
        .bind(&input.specialties)
        .bind(&input.photos)
        .fetch_optional(executor)
        .await?;

        Ok(garage)
    }

    pub async fn delete<'e, E>(&self, executor: E, id: Uuid) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM garages WHERE id = $1")
            .bind(id)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }

    pub async fn set_approval<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        approved: bool,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            "UPDATE garages SET is_approved = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(approved)
        .fetch_optional(executor)
        .await?;

        Ok(garage)
    }

    // =========================================================================
    //  ASSINATURA (BILLING)
    // =========================================================================

    pub async fn activate_subscription<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        activation: &SubscriptionActivation,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            r#"
            UPDATE garages SET
                subscription_active = TRUE,
                subscription_plan = COALESCE($2, subscription_plan),
                subscription_id = COALESCE($3, subscription_id),
                stripe_customer_id = COALESCE($4, stripe_customer_id),
                subscription_ends_at = $5,
                updated_at = NOW()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(activation.plan)
        .bind(&activation.subscription_id)
        .bind(&activation.customer_id)
        .bind(activation.ends_at)
        .fetch_optional(executor)
        .await?;

        Ok(garage)
    }

    // Status e fim de período informados pelo provedor
    pub async fn refresh_subscription<'e, E>(
        &self,
        executor: E,
        subscription_id: &str,
        active: bool,
        ends_at: Option<DateTime<Utc>>,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            r#"
            UPDATE garages SET
                subscription_active = $2,
                -- Evento sem fim de período mantém o já gravado
                subscription_ends_at = COALESCE($3, subscription_ends_at),
                updated_at = NOW()
            WHERE subscription_id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .bind(active)
        .bind(ends_at)
        .fetch_optional(executor)
        .await?;

        Ok(garage)
    }

    // O customer id fica guardado para reativação pelo portal
    pub async fn clear_subscription<'e, E>(
        &self,
        executor: E,
        subscription_id: &str,
    ) -> Result<Option<Garage>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let garage = sqlx::query_as::<_, Garage>(
            r#"
            UPDATE garages SET
                subscription_active = FALSE,
                subscription_id = NULL,
                subscription_plan = NULL,
                subscription_ends_at = NULL,
                updated_at = NOW()
            WHERE subscription_id = $1
            RETURNING *
            "#,
        )
        .bind(subscription_id)
        .fetch_optional(executor)
        .await?;

        Ok(garage)
    }
}
