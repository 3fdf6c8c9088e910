use async_trait::async_trait;
use sqlx::Row;
use uuid::Uuid;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::{
        CreateSubscriptionEventInput, SubscriptionEventProfile, SubscriptionEventRepoTrait,
    },
};

fn row_to_profile(row: sqlx::postgres::PgRow) -> SubscriptionEventProfile {
    SubscriptionEventProfile {
        id: row.get("id"),
        account_id: row.get("account_id"),
        event_type: row.get("event_type"),
        raw_payload: row.get("raw_payload"),
        created_at: row.get("created_at"),
    }
}

#[async_trait]
impl SubscriptionEventRepoTrait for PostgresPersistence {
    async fn create(
        &self,
        input: &CreateSubscriptionEventInput,
    ) -> AppResult<SubscriptionEventProfile> {
        let row = sqlx::query(
            r#"
            INSERT INTO subscription_events (id, account_id, event_type, raw_payload)
            VALUES ($1, $2, $3, $4)
            RETURNING id, account_id, event_type, raw_payload, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&input.account_id)
        .bind(&input.event_type)
        .bind(&input.raw_payload)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_profile(row))
    }
}
