use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::checkout::{CheckoutGateway, CheckoutPlan, CheckoutRequest},
    infra::stripe_client::StripeClient,
};

/// Price ids configured for each plan. A missing id disables that plan.
#[derive(Debug, Clone, Default)]
pub struct PlanPrices {
    pub monthly: Option<String>,
    pub yearly: Option<String>,
}

impl PlanPrices {
    fn price_for(&self, plan: CheckoutPlan) -> AppResult<&str> {
        let price = match plan {
            CheckoutPlan::Monthly => self.monthly.as_deref(),
            CheckoutPlan::Yearly => self.yearly.as_deref(),
        };
        price.ok_or(AppError::NotConfigured("plan price"))
    }
}

const REFERRAL_PREFIX: &str = "SWZ";

/// `SWZ-` followed by eight uppercase hex characters.
fn generate_referral_code() -> String {
    let token = Uuid::new_v4().simple().to_string().to_uppercase();
    format!("{}-{}", REFERRAL_PREFIX, &token[..8])
}

/// Adapter that wraps `StripeClient` to implement `CheckoutGateway`.
#[derive(Clone)]
pub struct StripeCheckoutGateway {
    client: StripeClient,
    prices: PlanPrices,
    referral_percent_off: u32,
}

impl StripeCheckoutGateway {
    pub fn new(client: StripeClient, prices: PlanPrices, referral_percent_off: u32) -> Self {
        Self {
            client,
            prices,
            referral_percent_off,
        }
    }

    /// Turns the code a customer typed into the promotion id checkout expects.
    async fn resolve_promotion_code(&self, code: &str) -> AppResult<String> {
        match self.client.find_promotion_code(code).await? {
            Some(promo) => Ok(promo.id),
            None => {
                tracing::info!(code = %code, "Unknown promotion code at checkout");
                Err(AppError::InvalidInput("Unknown promotion code".into()))
            }
        }
    }
}

#[async_trait]
impl CheckoutGateway for StripeCheckoutGateway {
    async fn create_customer(&self, email: &str, account_id: &str) -> AppResult<String> {
        let customer = self.client.create_customer(email, account_id).await?;
        Ok(customer.id)
    }

    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> AppResult<String> {
        let price_id = self.prices.price_for(request.plan)?;

        let promotion_code_id = match request.promotion_code.map(str::trim) {
            Some(code) if !code.is_empty() => Some(self.resolve_promotion_code(code).await?),
            _ => None,
        };

        let session = self
            .client
            .create_checkout_session(
                request.customer_id,
                price_id,
                request.success_url,
                request.cancel_url,
                request.account_id,
                promotion_code_id.as_deref(),
            )
            .await?;

        session.url.ok_or_else(|| {
            AppError::Internal(format!("Checkout session {} has no URL", session.id))
        })
    }

    async fn create_referral_code(&self, account_id: &str) -> AppResult<String> {
        let code = generate_referral_code();
        let promo = self
            .client
            .create_promotion_code(&code, self.referral_percent_off, account_id)
            .await?;
        Ok(promo.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_price_is_not_configured() {
        let prices = PlanPrices {
            monthly: Some("price_monthly".into()),
            yearly: None,
        };

        assert_eq!(prices.price_for(CheckoutPlan::Monthly).unwrap(), "price_monthly");
        assert!(matches!(
            prices.price_for(CheckoutPlan::Yearly),
            Err(AppError::NotConfigured(_))
        ));
    }

    #[test]
    fn referral_codes_are_prefixed_and_distinct() {
        let first = generate_referral_code();
        let second = generate_referral_code();

        assert_eq!(first.len(), "SWZ-".len() + 8);
        assert!(first.starts_with("SWZ-"));
        assert!(
            first[4..]
                .chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase())
        );
        assert_ne!(first, second);
    }
}
