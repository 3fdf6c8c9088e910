use async_trait::async_trait;

use crate::app_error::{AppError, AppResult};

/// Billing cadence offered on the paywall.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutPlan {
    Monthly,
    Yearly,
}

impl CheckoutPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutPlan::Monthly => "monthly",
            CheckoutPlan::Yearly => "yearly",
        }
    }

    pub fn parse(plan: &str) -> AppResult<Self> {
        match plan {
            "monthly" => Ok(CheckoutPlan::Monthly),
            "yearly" => Ok(CheckoutPlan::Yearly),
            _ => Err(AppError::InvalidInput("Invalid plan".into())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub customer_id: &'a str,
    pub account_id: &'a str,
    pub plan: CheckoutPlan,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub promotion_code: Option<&'a str>,
}

/// Processor-side operations needed to start a paid subscription.
#[async_trait]
pub trait CheckoutGateway: Send + Sync {
    /// Create a processor customer for the account and return its id.
    async fn create_customer(&self, email: &str, account_id: &str) -> AppResult<String>;

    /// Create a hosted checkout session and return its URL.
    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> AppResult<String>;

    /// Create a shareable discount code owned by the account and return the
    /// code customers type at checkout.
    async fn create_referral_code(&self, account_id: &str) -> AppResult<String>;
}
