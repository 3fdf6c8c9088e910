use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::{Instrument, debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            checkout::{CheckoutGateway, CheckoutPlan, CheckoutRequest},
            notifier::OperatorNotifier,
        },
        validators::is_valid_redirect_url,
    },
    domain::entities::{
        account::{Account, SubscriptionFields, SubscriptionStatus},
        entitlements::Entitlements,
        processor_event::{AccountRefs, ParsedEvent, ProcessorEvent},
    },
    infra::stripe_client::StripeClient,
};

// ============================================================================
// Profile Types
// ============================================================================

#[derive(Debug, Clone)]
pub struct CreateSubscriptionEventInput {
    pub account_id: Option<String>,
    pub event_type: String,
    pub raw_payload: JsonValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionEventProfile {
    pub id: Uuid,
    pub account_id: Option<String>,
    pub event_type: String,
    pub raw_payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

/// Status and expiry as shown to the app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub status: SubscriptionStatus,
    pub expire_at: Option<DateTime<Utc>>,
}

impl StatusSnapshot {
    pub fn of(account: &Account) -> Self {
        Self {
            status: account.subscription_status,
            expire_at: account.subscription_expire_at,
        }
    }
}

/// Result of applying a transition. `changed` is false for idempotent replays.
#[derive(Debug, Clone)]
pub struct MutationOutcome {
    pub account: Account,
    pub changed: bool,
}

/// What a verified webhook delivery led to. Every variant is a success for
/// the processor; failures travel as `AppError`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Checkout finished; entitlement waits for the payment confirmation.
    AwaitingPayment,
    Activated { account_id: String },
    Canceled { account_id: String },
    Unchanged { account_id: String },
    /// The event references no tracked account.
    NoAccount,
    /// Event type this service does not act on.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct CheckoutInput<'a> {
    pub plan: &'a str,
    pub success_url: &'a str,
    pub cancel_url: &'a str,
    pub promotion_code: Option<&'a str>,
}

// ============================================================================
// Repository Traits
// ============================================================================

#[async_trait]
pub trait AccountRepoTrait: Send + Sync {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<Account>>;
    async fn get_by_processor_customer_id(&self, customer_id: &str) -> AppResult<Option<Account>>;
    async fn update_subscription(
        &self,
        id: &str,
        fields: &SubscriptionFields,
    ) -> AppResult<Account>;
    async fn set_processor_customer_id(&self, id: &str, customer_id: &str) -> AppResult<()>;
}

#[async_trait]
pub trait SubscriptionEventRepoTrait: Send + Sync {
    async fn create(
        &self,
        input: &CreateSubscriptionEventInput,
    ) -> AppResult<SubscriptionEventProfile>;
}

// ============================================================================
// Use Cases
// ============================================================================

/// Webhook secret plus the timestamp tolerance applied during verification.
#[derive(Clone)]
pub struct WebhookSecret {
    pub secret: SecretString,
    pub tolerance_secs: i64,
}

#[derive(Clone)]
pub struct SubscriptionUseCases {
    accounts: Arc<dyn AccountRepoTrait>,
    events: Arc<dyn SubscriptionEventRepoTrait>,
    notifier: Arc<dyn OperatorNotifier>,
    checkout: Option<Arc<dyn CheckoutGateway>>,
    webhook_secret: Option<WebhookSecret>,
    notify_timeout: Duration,
}

impl SubscriptionUseCases {
    pub fn new(
        accounts: Arc<dyn AccountRepoTrait>,
        events: Arc<dyn SubscriptionEventRepoTrait>,
        notifier: Arc<dyn OperatorNotifier>,
        checkout: Option<Arc<dyn CheckoutGateway>>,
        webhook_secret: Option<WebhookSecret>,
        notify_timeout: Duration,
    ) -> Self {
        Self {
            accounts,
            events,
            notifier,
            checkout,
            webhook_secret,
            notify_timeout,
        }
    }

    pub async fn get_account(&self, account_id: &str) -> AppResult<Option<Account>> {
        self.accounts.get_by_id(account_id).await
    }

    pub fn entitlements(&self, account: &Account) -> Entitlements {
        Entitlements::derive(account, Utc::now())
    }

    // ------------------------------------------------------------------------
    // Webhook receiver
    // ------------------------------------------------------------------------

    /// Verifies, parses and processes one webhook delivery. The signature is
    /// checked over the raw bytes before the body is read as text.
    pub async fn receive_webhook(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> AppResult<WebhookOutcome> {
        let webhook_secret = self
            .webhook_secret
            .as_ref()
            .ok_or(AppError::NotConfigured("webhook secret"))?;

        let signature = signature.ok_or(AppError::InvalidSignature)?;
        StripeClient::verify_webhook_signature(
            body,
            signature,
            webhook_secret.secret.expose_secret(),
            webhook_secret.tolerance_secs,
        )?;

        let body = std::str::from_utf8(body)
            .map_err(|_| AppError::InvalidInput("Webhook payload is not UTF-8".into()))?;
        let parsed = ParsedEvent::parse(body)
            .map_err(|e| AppError::InvalidInput(format!("Invalid webhook payload: {}", e)))?;

        self.process_event(parsed).await
    }

    #[instrument(skip(self, parsed), fields(event_type = %parsed.event_type, event_id = ?parsed.id))]
    pub async fn process_event(&self, parsed: ParsedEvent) -> AppResult<WebhookOutcome> {
        let account = self.resolve_account(&parsed.refs).await?;

        let (outcome, notification) = match (&parsed.event, account.as_ref()) {
            (ProcessorEvent::CheckoutSessionCompleted(_), _) => {
                (WebhookOutcome::AwaitingPayment, None)
            }
            (ProcessorEvent::InvoicePaymentSucceeded(invoice), Some(account)) => {
                let result = self
                    .activate_or_renew(account, invoice.subscription.as_deref(), invoice.period_end())
                    .await?;
                activation_outcome(result)
            }
            (ProcessorEvent::SubscriptionUpdated(subscription), Some(account)) => {
                let result = self
                    .activate_or_renew(account, Some(subscription.id.as_str()), subscription.period_end())
                    .await?;
                activation_outcome(result)
            }
            (ProcessorEvent::SubscriptionDeleted(_), Some(account)) => {
                let result = self.cancel(account).await?;
                if result.changed {
                    (
                        WebhookOutcome::Canceled {
                            account_id: result.account.id.clone(),
                        },
                        Some(format!(
                            "Subscription canceled for {}",
                            result.account.email
                        )),
                    )
                } else {
                    (
                        WebhookOutcome::Unchanged {
                            account_id: result.account.id,
                        },
                        None,
                    )
                }
            }
            (
                ProcessorEvent::InvoicePaymentSucceeded(_)
                | ProcessorEvent::SubscriptionUpdated(_)
                | ProcessorEvent::SubscriptionDeleted(_),
                None,
            ) => (WebhookOutcome::NoAccount, None),
            (ProcessorEvent::Unrecognized, _) => {
                info!(
                    event_type = %parsed.event_type,
                    "Ignoring unrecognized processor event"
                );
                (WebhookOutcome::Ignored, None)
            }
        };

        self.events
            .create(&CreateSubscriptionEventInput {
                account_id: account.map(|a| a.id),
                event_type: parsed.event_type,
                raw_payload: parsed.payload,
            })
            .await?;

        if let Some(text) = notification {
            self.notify_operator(text);
        }

        Ok(outcome)
    }

    // ------------------------------------------------------------------------
    // Resolver
    // ------------------------------------------------------------------------

    /// Client reference id first, then stored processor customer id.
    /// `Ok(None)` is a normal outcome for events about untracked customers.
    pub async fn resolve_account(&self, refs: &AccountRefs) -> AppResult<Option<Account>> {
        if let Some(reference_id) = refs.client_reference_id.as_deref()
            && let Some(account) = self.accounts.get_by_id(reference_id).await?
        {
            debug!(account_id = %account.id, "Resolved account by client reference id");
            return Ok(Some(account));
        }

        if let Some(customer_id) = refs.customer.as_deref()
            && let Some(account) = self
                .accounts
                .get_by_processor_customer_id(customer_id)
                .await?
        {
            debug!(account_id = %account.id, "Resolved account by processor customer id");
            return Ok(Some(account));
        }

        debug!(
            client_reference_id = ?refs.client_reference_id,
            customer = ?refs.customer,
            "No account matches processor event"
        );
        Ok(None)
    }

    // ------------------------------------------------------------------------
    // Entitlement mutator
    // ------------------------------------------------------------------------

    /// Premium until `period_end`. Keeps the stored subscription id when the
    /// event carries none.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn activate_or_renew(
        &self,
        account: &Account,
        subscription_id: Option<&str>,
        period_end: Option<DateTime<Utc>>,
    ) -> AppResult<MutationOutcome> {
        let fields = SubscriptionFields {
            status: SubscriptionStatus::Premium,
            expire_at: period_end,
            subscription_id: subscription_id
                .map(str::to_string)
                .or_else(|| account.processor_subscription_id.clone()),
        };
        self.apply(account, fields).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn start_trial(&self, account: &Account, days: i64) -> AppResult<Account> {
        if account.subscription_status.is_entitled() {
            return Err(AppError::AlreadyEntitled);
        }

        let fields = SubscriptionFields {
            status: SubscriptionStatus::Trial,
            expire_at: Some(Utc::now() + chrono::Duration::days(days)),
            subscription_id: account.processor_subscription_id.clone(),
        };
        Ok(self.apply(account, fields).await?.account)
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn cancel(&self, account: &Account) -> AppResult<MutationOutcome> {
        let fields = SubscriptionFields {
            status: SubscriptionStatus::Free,
            expire_at: None,
            subscription_id: None,
        };
        self.apply(account, fields).await
    }

    async fn apply(&self, account: &Account, fields: SubscriptionFields) -> AppResult<MutationOutcome> {
        if SubscriptionFields::of(account) == fields {
            debug!("Subscription fields already current, skipping write");
            return Ok(MutationOutcome {
                account: account.clone(),
                changed: false,
            });
        }

        let updated = self
            .accounts
            .update_subscription(&account.id, &fields)
            .await?;
        info!(
            from = %account.subscription_status,
            to = %updated.subscription_status,
            expire_at = ?updated.subscription_expire_at,
            "Subscription state changed"
        );
        Ok(MutationOutcome {
            account: updated,
            changed: true,
        })
    }

    /// Sends in the background so the webhook response never waits on it.
    fn notify_operator(&self, text: String) {
        let notifier = self.notifier.clone();
        let notify_timeout = self.notify_timeout;

        tokio::spawn(
            async move {
                match tokio::time::timeout(notify_timeout, notifier.notify(&text)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(error = %e, "Operator notification failed"),
                    Err(_) => warn!(
                        timeout_ms = notify_timeout.as_millis() as u64,
                        "Operator notification timed out"
                    ),
                }
            }
            .instrument(tracing::Span::current()),
        );
    }

    // ------------------------------------------------------------------------
    // Checkout
    // ------------------------------------------------------------------------

    /// Returns the hosted checkout URL. The processor customer is created on
    /// first use and stored on the account so later webhooks resolve to it.
    #[instrument(skip(self, account, input), fields(account_id = %account.id, plan = %input.plan))]
    pub async fn create_checkout(
        &self,
        account: &Account,
        input: CheckoutInput<'_>,
    ) -> AppResult<String> {
        let plan = CheckoutPlan::parse(input.plan)?;
        if !is_valid_redirect_url(input.success_url) || !is_valid_redirect_url(input.cancel_url) {
            return Err(AppError::InvalidInput("Invalid redirect URL".into()));
        }

        let gateway = self
            .checkout
            .as_ref()
            .ok_or(AppError::NotConfigured("checkout"))?;

        let customer_id = match account.processor_customer_id.as_deref() {
            Some(id) => id.to_string(),
            None => {
                let id = gateway.create_customer(&account.email, &account.id).await?;
                self.accounts
                    .set_processor_customer_id(&account.id, &id)
                    .await?;
                id
            }
        };

        gateway
            .create_checkout_session(CheckoutRequest {
                customer_id: &customer_id,
                account_id: &account.id,
                plan,
                success_url: input.success_url,
                cancel_url: input.cancel_url,
                promotion_code: input.promotion_code,
            })
            .await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn create_referral_code(&self, account: &Account) -> AppResult<String> {
        let gateway = self
            .checkout
            .as_ref()
            .ok_or(AppError::NotConfigured("checkout"))?;

        let code = gateway.create_referral_code(&account.id).await?;
        info!(code = %code, "Referral code created");
        Ok(code)
    }
}

fn activation_outcome(result: MutationOutcome) -> (WebhookOutcome, Option<String>) {
    if !result.changed {
        return (
            WebhookOutcome::Unchanged {
                account_id: result.account.id,
            },
            None,
        );
    }

    let until = result
        .account
        .subscription_expire_at
        .map(|d| d.to_rfc3339())
        .unwrap_or_else(|| "n/a".to_string());
    let text = format!(
        "Subscription active for {} (until {})",
        result.account.email, until
    );
    (
        WebhookOutcome::Activated {
            account_id: result.account.id,
        },
        Some(text),
    )
}

// ============================================================================
// Status stream
// ============================================================================

/// Re-reads an account and reports its status when it differs from the
/// last one seen. Performs no writes.
pub struct StatusWatcher {
    use_cases: Arc<SubscriptionUseCases>,
    account_id: String,
    last: StatusSnapshot,
}

impl StatusWatcher {
    pub fn new(use_cases: Arc<SubscriptionUseCases>, account: &Account) -> Self {
        Self {
            use_cases,
            account_id: account.id.clone(),
            last: StatusSnapshot::of(account),
        }
    }

    pub async fn poll(&mut self) -> AppResult<Option<StatusSnapshot>> {
        let Some(account) = self.use_cases.accounts.get_by_id(&self.account_id).await? else {
            return Ok(None);
        };

        let current = StatusSnapshot::of(&account);
        if current == self.last {
            return Ok(None);
        }
        self.last = current.clone();
        Ok(Some(current))
    }
}
