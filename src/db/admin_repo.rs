// src/db/admin_repo.rs

use sqlx::PgPool;

use crate::{
    common::error::AppError,
    models::admin::{AdminStats, MonthlyCount, RoleCount, StatusCount},
};

// Em READ COMMITTED cada consulta veria um snapshot diferente
const SNAPSHOT_ISOLATION: &str = "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY";

#[derive(Clone)]
pub struct AdminRepository {
    pool: PgPool,
}

impl AdminRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // Painel geral da plataforma
    pub async fn get_stats(&self) -> Result<AdminStats, AppError> {
        // Snapshot consistente de todos os contadores
        let mut tx = self.pool.begin().await?;
        sqlx::query(SNAPSHOT_ISOLATION).execute(&mut *tx).await?;

        let total_users = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM accounts")
            .fetch_one(&mut *tx)
            .await?;

        let total_garages = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM garages")
            .fetch_one(&mut *tx)
            .await?;

        let total_appointments = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM appointments")
            .fetch_one(&mut *tx)
            .await?;

        let pending_garages =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM garages WHERE NOT is_approved")
                .fetch_one(&mut *tx)
                .await?;

        let active_subscriptions =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM garages WHERE subscription_active")
                .fetch_one(&mut *tx)
                .await?;

        let recent_users = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM accounts WHERE created_at >= NOW() - INTERVAL '30 days'",
        )
        .fetch_one(&mut *tx)
        .await?;

        let users_by_role = sqlx::query_as::<_, RoleCount>(
            "SELECT role, COUNT(*) AS count FROM accounts GROUP BY role ORDER BY role",
        )
        .fetch_all(&mut *tx)
        .await?;

        let appointments_by_status = sqlx::query_as::<_, StatusCount>(
            "SELECT status, COUNT(*) AS count FROM appointments GROUP BY status ORDER BY status",
        )
        .fetch_all(&mut *tx)
        .await?;

        // Últimos 6 meses, incluindo meses sem agendamento
        let monthly_appointments = sqlx::query_as::<_, MonthlyCount>(
            r#"
            SELECT
                to_char(m.month, 'YYYY-MM') AS month,
                COUNT(ap.id) AS count
            FROM generate_series(
                date_trunc('month', NOW()) - INTERVAL '5 months',
                date_trunc('month', NOW()),
                INTERVAL '1 month'
            ) AS m(month)
            LEFT JOIN appointments ap ON date_trunc('month', ap.created_at) = m.month
            GROUP BY m.month
            ORDER BY m.month
            "#,
        )
        .fetch_all(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(AdminStats {
            total_users,
            total_garages,
            total_appointments,
            users_by_role,
            appointments_by_status,
            pending_garages,
            active_subscriptions,
            recent_users,
            monthly_appointments,
        })
    }
}
