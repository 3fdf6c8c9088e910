//! Test data factories. Use the closure parameter to override fields.

use uuid::Uuid;

use crate::{
    domain::entities::account::{Account, SubscriptionStatus},
    infra::stripe_client::compute_signature,
};

pub const TEST_JWT_SECRET: &str = "test_jwt_secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test_secret";

/// Create a free account with sensible defaults.
pub fn create_test_account(overrides: impl FnOnce(&mut Account)) -> Account {
    let mut account = Account {
        id: Uuid::new_v4().to_string(),
        email: "user@example.com".to_string(),
        subscription_status: SubscriptionStatus::Free,
        subscription_expire_at: None,
        processor_customer_id: None,
        processor_subscription_id: None,
    };
    overrides(&mut account);
    account
}

/// Build a `Stripe-Signature` header for `body`, timestamped now.
pub fn sign_payload(body: &str, secret: &str) -> String {
    let ts = chrono::Utc::now().timestamp().to_string();
    let sig = compute_signature(&ts, body.as_bytes(), secret).expect("signing should not fail");
    format!("t={},v1={}", ts, sig)
}
