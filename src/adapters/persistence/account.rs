use async_trait::async_trait;
use sqlx::Row;

use crate::{
    adapters::persistence::PostgresPersistence,
    app_error::{AppError, AppResult},
    application::use_cases::subscription::AccountRepoTrait,
    domain::entities::account::{Account, SubscriptionFields},
};

fn row_to_account(row: sqlx::postgres::PgRow) -> Account {
    Account {
        id: row.get("id"),
        email: row.get("email"),
        subscription_status: row.get("subscription_status"),
        subscription_expire_at: row.get("subscription_expire_at"),
        processor_customer_id: row.get("processor_customer_id"),
        processor_subscription_id: row.get("processor_subscription_id"),
    }
}

const SELECT_COLS: &str = r#"
    id, email, subscription_status, subscription_expire_at,
    processor_customer_id, processor_subscription_id
"#;

#[async_trait]
impl AccountRepoTrait for PostgresPersistence {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!("SELECT {} FROM accounts WHERE id = $1", SELECT_COLS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::from)?;
        Ok(row.map(row_to_account))
    }

    async fn get_by_processor_customer_id(&self, customer_id: &str) -> AppResult<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM accounts WHERE processor_customer_id = $1",
            SELECT_COLS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row.map(row_to_account))
    }

    async fn update_subscription(
        &self,
        id: &str,
        fields: &SubscriptionFields,
    ) -> AppResult<Account> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE accounts
            SET subscription_status = $2,
                subscription_expire_at = $3,
                processor_subscription_id = $4,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {}
            "#,
            SELECT_COLS
        ))
        .bind(id)
        .bind(fields.status)
        .bind(fields.expire_at)
        .bind(&fields.subscription_id)
        .fetch_one(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(row_to_account(row))
    }

    async fn set_processor_customer_id(&self, id: &str, customer_id: &str) -> AppResult<()> {
        sqlx::query(
            "UPDATE accounts SET processor_customer_id = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(customer_id)
        .execute(&self.pool)
        .await
        .map_err(AppError::from)?;
        Ok(())
    }
}
