// src/db/billing_repo.rs

use sqlx::{Executor, Postgres};

use crate::common::error::AppError;

// Livro de eventos do provedor de pagamento já aplicados
#[derive(Clone, Default)]
pub struct BillingEventRepository;

impl BillingEventRepository {
    pub fn new() -> Self {
        Self
    }

    pub async fn is_processed<'e, E>(&self, executor: E, event_id: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM billing_events WHERE event_id = $1)",
        )
        .bind(event_id)
        .fetch_one(executor)
        .await?;

        Ok(exists)
    }

    /// Registra o evento. `false` quando outro worker já o registrou.
    pub async fn record<'e, E>(&self, executor: E, event_id: &str, event_type: &str) -> Result<bool, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query(
            r#"
            INSERT INTO billing_events (event_id, event_type)
            VALUES ($1, $2)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .execute(executor)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}
