use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Free,
    Trial,
    Premium,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Free => "free",
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Premium => "premium",
        }
    }

    /// Trial and premium both grant paid-tier access while unexpired.
    pub fn is_entitled(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Trial | SubscriptionStatus::Premium
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    pub subscription_status: SubscriptionStatus,
    pub subscription_expire_at: Option<DateTime<Utc>>,
    pub processor_customer_id: Option<String>,
    pub processor_subscription_id: Option<String>,
}

impl Account {
    /// Paid-tier access at `now`. Expiry is evaluated lazily: an entitled
    /// status whose expiry is at or before `now` counts as free.
    pub fn is_premium_at(&self, now: DateTime<Utc>) -> bool {
        is_premium(self.subscription_status, self.subscription_expire_at, now)
    }
}

pub fn is_premium(
    status: SubscriptionStatus,
    expire_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    status.is_entitled() && expire_at.is_none_or(|expire_at| expire_at > now)
}

/// The subscription fields a mutation writes. Scalar, last-writer-wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionFields {
    pub status: SubscriptionStatus,
    pub expire_at: Option<DateTime<Utc>>,
    pub subscription_id: Option<String>,
}

impl SubscriptionFields {
    pub fn of(account: &Account) -> Self {
        Self {
            status: account.subscription_status,
            expire_at: account.subscription_expire_at,
            subscription_id: account.processor_subscription_id.clone(),
        }
    }
}
