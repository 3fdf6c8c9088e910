//! Test app state builder for HTTP-level testing.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::http::HeaderValue;
use secrecy::SecretString;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{checkout::CheckoutGateway, notifier::OperatorNotifier},
        use_cases::subscription::{SubscriptionUseCases, WebhookSecret},
    },
    domain::entities::account::Account,
    infra::config::AppConfig,
    test_utils::{
        InMemoryAccountRepo, InMemorySubscriptionEventRepo, RecordingNotifier, TEST_JWT_SECRET,
        TEST_WEBHOOK_SECRET,
    },
};

/// Builder for creating `AppState` with in-memory mocks.
///
/// ```ignore
/// let (app_state, accounts, events) = TestAppStateBuilder::new()
///     .with_account(create_test_account(|a| a.id = "acc-1".into()))
///     .build_with_mocks();
/// ```
pub struct TestAppStateBuilder {
    accounts: Vec<Account>,
    webhook_secret: Option<&'static str>,
    checkout: Option<Arc<dyn CheckoutGateway>>,
    notifier: Option<Arc<dyn OperatorNotifier>>,
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            accounts: vec![],
            webhook_secret: Some(TEST_WEBHOOK_SECRET),
            checkout: None,
            notifier: None,
        }
    }

    pub fn with_account(mut self, account: Account) -> Self {
        self.accounts.push(account);
        self
    }

    /// Simulate a deployment without `STRIPE_WEBHOOK_SECRET`.
    pub fn without_webhook_secret(mut self) -> Self {
        self.webhook_secret = None;
        self
    }

    pub fn with_checkout_gateway(mut self, gateway: Arc<dyn CheckoutGateway>) -> Self {
        self.checkout = Some(gateway);
        self
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn OperatorNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn build(self) -> AppState {
        self.build_with_mocks().0
    }

    /// Returns the repositories too, for assertions.
    pub fn build_with_mocks(
        self,
    ) -> (
        AppState,
        Arc<InMemoryAccountRepo>,
        Arc<InMemorySubscriptionEventRepo>,
    ) {
        let accounts = Arc::new(InMemoryAccountRepo::with_accounts(self.accounts));
        let events = Arc::new(InMemorySubscriptionEventRepo::new());
        let notifier = self
            .notifier
            .unwrap_or_else(|| Arc::new(RecordingNotifier::new()));

        let subscription_use_cases = Arc::new(SubscriptionUseCases::new(
            accounts.clone(),
            events.clone(),
            notifier,
            self.checkout,
            self.webhook_secret.map(|s| WebhookSecret {
                secret: SecretString::new(s.into()),
                tolerance_secs: 300,
            }),
            Duration::from_millis(200),
        ));

        let config = Arc::new(AppConfig {
            database_url: String::new(),
            bind_addr: "127.0.0.1:8000".parse::<SocketAddr>().unwrap(),
            cors_origin: HeaderValue::from_static("http://localhost:3000"),
            jwt_secret: SecretString::new(TEST_JWT_SECRET.into()),
            stripe_webhook_secret: self.webhook_secret.map(|s| SecretString::new(s.into())),
            stripe_webhook_tolerance_secs: 300,
            stripe_secret_key: None,
            stripe_price_monthly: None,
            stripe_price_yearly: None,
            referral_percent_off: 10,
            trial_days: 7,
            status_stream_poll_secs: 10,
            status_stream_keepalive_secs: 25,
            telegram_bot_token: None,
            telegram_chat_id: None,
            notify_timeout_ms: 200,
            log_json: false,
        });

        let app_state = AppState {
            config,
            subscription_use_cases,
        };

        (app_state, accounts, events)
    }
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}
