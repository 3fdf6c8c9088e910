use chrono::{DateTime, Utc};
use serde::Serialize;

use super::account::{Account, SubscriptionStatus};

/// Favorites a non-premium account may keep.
pub const FREE_FAVORITES_LIMIT: u32 = 3;

/// Feature set derived from an account's subscription fields at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlements {
    pub status: SubscriptionStatus,
    pub expire_at: Option<DateTime<Utc>>,
    pub is_premium: bool,
    /// `None` means unlimited.
    pub favorites_limit: Option<u32>,
    pub ai_access: bool,
    pub guides_full_access: bool,
    pub pdf_download: bool,
}

impl Entitlements {
    pub fn derive(account: &Account, now: DateTime<Utc>) -> Self {
        let is_premium = account.is_premium_at(now);
        Self {
            status: account.subscription_status,
            expire_at: account.subscription_expire_at,
            is_premium,
            favorites_limit: (!is_premium).then_some(FREE_FAVORITES_LIMIT),
            ai_access: is_premium,
            guides_full_access: is_premium,
            pdf_download: is_premium,
        }
    }
}
