use hmac::{Hmac, Mac};
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::Sha256;
use url::Url;

use crate::app_error::{AppError, AppResult};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

#[derive(Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: SecretString,
}

impl StripeClient {
    pub fn new(client: Client, secret_key: SecretString) -> Self {
        Self {
            client,
            secret_key,
        }
    }

    fn auth_header(&self) -> String {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:", self.secret_key.expose_secret()));
        format!("Basic {}", encoded)
    }

    // ========================================================================
    // Customers
    // ========================================================================

    /// Creates a customer tagged with the owning account id.
    pub async fn create_customer(&self, email: &str, account_id: &str) -> AppResult<StripeCustomer> {
        let params = [
            ("email", email),
            ("metadata[account_id]", account_id),
        ];

        let response = self
            .client
            .post(format!("{}/customers", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Checkout Sessions
    // ========================================================================

    /// `promotion_code_id` is a resolved `promo_...` id; without one the
    /// hosted page lets the customer enter a code.
    pub async fn create_checkout_session(
        &self,
        customer_id: &str,
        price_id: &str,
        success_url: &str,
        cancel_url: &str,
        client_reference_id: &str,
        promotion_code_id: Option<&str>,
    ) -> AppResult<StripeCheckoutSession> {
        let params = checkout_session_params(
            customer_id,
            price_id,
            success_url,
            cancel_url,
            client_reference_id,
            promotion_code_id,
        );

        let response = self
            .client
            .post(format!("{}/checkout/sessions", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Promotion Codes
    // ========================================================================

    /// Looks up an active promotion code by the customer-facing code.
    pub async fn find_promotion_code(&self, code: &str) -> AppResult<Option<StripePromotionCode>> {
        let mut url = Url::parse(&format!("{}/promotion_codes", STRIPE_API_BASE))
            .map_err(|e| AppError::Internal(format!("Invalid Stripe URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("code", code)
            .append_pair("active", "true")
            .append_pair("limit", "1");

        let response = self
            .client
            .get(url)
            .header("Authorization", self.auth_header())
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        let list: StripeList<StripePromotionCode> = self.handle_response(response).await?;
        Ok(matching_promotion_code(list, code))
    }

    /// Creates a one-time percent-off coupon and the promotion code `code`
    /// for it, both tagged with the owning account id.
    pub async fn create_promotion_code(
        &self,
        code: &str,
        percent_off: u32,
        account_id: &str,
    ) -> AppResult<StripePromotionCode> {
        let percent_off = percent_off.to_string();
        let coupon_params = [
            ("percent_off", percent_off.as_str()),
            ("duration", "once"),
            ("name", "Referral"),
            ("metadata[account_id]", account_id),
        ];

        let response = self
            .client
            .post(format!("{}/coupons", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&coupon_params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;
        let coupon: StripeCoupon = self.handle_response(response).await?;

        let promotion_params = [
            ("coupon", coupon.id.as_str()),
            ("code", code),
            ("metadata[account_id]", account_id),
        ];

        let response = self
            .client
            .post(format!("{}/promotion_codes", STRIPE_API_BASE))
            .header("Authorization", self.auth_header())
            .form(&promotion_params)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Stripe request failed: {}", e)))?;

        self.handle_response(response).await
    }

    // ========================================================================
    // Webhook Signature Verification
    // ========================================================================

    /// Checks a `Stripe-Signature` header (`t=<unix>,v1=<hex>,...`) against
    /// the raw body. Any failure, including a stale timestamp, is
    /// `InvalidSignature`.
    pub fn verify_webhook_signature(
        payload: &[u8],
        signature_header: &str,
        webhook_secret: &str,
        tolerance_secs: i64,
    ) -> AppResult<()> {
        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();

        for part in signature_header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = Some(value),
                Some(("v1", value)) => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::debug!("Webhook signature header has no timestamp");
            AppError::InvalidSignature
        })?;

        let expected = compute_signature(timestamp, payload, webhook_secret)?;
        if !signatures
            .iter()
            .any(|sig| constant_time_compare(sig, &expected))
        {
            tracing::debug!("Webhook signature mismatch");
            return Err(AppError::InvalidSignature);
        }

        let ts: i64 = timestamp.parse().map_err(|_| AppError::InvalidSignature)?;
        let now = chrono::Utc::now().timestamp();
        if (now - ts).abs() > tolerance_secs {
            tracing::debug!(age_secs = now - ts, "Webhook timestamp outside tolerance");
            return Err(AppError::InvalidSignature);
        }

        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> AppResult<T> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to read response: {}", e)))?;

        if !status.is_success() {
            tracing::error!(status = %status, body = %body, "Stripe API error");

            if let Ok(error) = serde_json::from_str::<StripeErrorResponse>(&body) {
                return Err(AppError::Internal(format!(
                    "Stripe error: {}",
                    error.error.message.unwrap_or(error.error.error_type)
                )));
            }

            return Err(AppError::Internal(format!(
                "Stripe API error: {} - {}",
                status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(body = %body, error = %e, "Failed to parse Stripe response");
            AppError::Internal(format!("Failed to parse Stripe response: {}", e))
        })
    }
}

fn checkout_session_params<'a>(
    customer_id: &'a str,
    price_id: &'a str,
    success_url: &'a str,
    cancel_url: &'a str,
    client_reference_id: &'a str,
    promotion_code_id: Option<&'a str>,
) -> Vec<(&'static str, &'a str)> {
    let mut params = vec![
        ("customer", customer_id),
        ("mode", "subscription"),
        ("line_items[0][price]", price_id),
        ("line_items[0][quantity]", "1"),
        ("success_url", success_url),
        ("cancel_url", cancel_url),
        ("client_reference_id", client_reference_id),
    ];

    match promotion_code_id {
        Some(id) => params.push(("discounts[0][promotion_code]", id)),
        None => params.push(("allow_promotion_codes", "true")),
    }
    params
}

/// Stripe matches codes case-insensitively.
fn matching_promotion_code(
    list: StripeList<StripePromotionCode>,
    code: &str,
) -> Option<StripePromotionCode> {
    list.data
        .into_iter()
        .find(|promo| promo.active && promo.code.eq_ignore_ascii_case(code))
}

/// Hex HMAC-SHA256 of `"{timestamp}.{payload}"`.
pub fn compute_signature(timestamp: &str, payload: &[u8], secret: &str) -> AppResult<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal("HMAC error".into()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}

// ============================================================================
// Stripe Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StripeCoupon {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StripePromotionCode {
    pub id: String,
    pub code: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Deserialize)]
pub struct StripeList<T> {
    pub data: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeError,
}

#[derive(Debug, Deserialize)]
struct StripeError {
    #[serde(rename = "type")]
    error_type: String,
    message: Option<String>,
}
