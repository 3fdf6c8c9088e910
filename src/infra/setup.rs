use std::{sync::Arc, time::Duration};

use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{
            checkout::CheckoutGateway,
            notifier::{NoopNotifier, OperatorNotifier},
        },
        use_cases::subscription::{
            AccountRepoTrait, SubscriptionEventRepoTrait, SubscriptionUseCases, WebhookSecret,
        },
    },
    infra::{
        config::AppConfig,
        error::InfraError,
        http_client,
        postgres_persistence,
        stripe_checkout::{PlanPrices, StripeCheckoutGateway},
        stripe_client::StripeClient,
        telegram::TelegramNotifier,
    },
};

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let postgres_arc = Arc::new(postgres_persistence(&config.database_url).await?);
    let http = http_client::try_build_client().map_err(InfraError::HttpClient)?;

    let notifier: Arc<dyn OperatorNotifier> =
        match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::new(
                http.clone(),
                token.clone(),
                chat_id.clone(),
            )),
            _ => {
                info!("Telegram not configured, operator notifications disabled");
                Arc::new(NoopNotifier)
            }
        };

    let checkout: Option<Arc<dyn CheckoutGateway>> = match &config.stripe_secret_key {
        Some(key) => Some(Arc::new(StripeCheckoutGateway::new(
            StripeClient::new(http.clone(), key.clone()),
            PlanPrices {
                monthly: config.stripe_price_monthly.clone(),
                yearly: config.stripe_price_yearly.clone(),
            },
            config.referral_percent_off,
        ))),
        None => {
            warn!("STRIPE_SECRET_KEY not set, checkout disabled");
            None
        }
    };

    let webhook_secret = match &config.stripe_webhook_secret {
        Some(secret) => Some(WebhookSecret {
            secret: secret.clone(),
            tolerance_secs: config.stripe_webhook_tolerance_secs,
        }),
        None => {
            warn!("STRIPE_WEBHOOK_SECRET not set, webhook deliveries will be rejected");
            None
        }
    };

    let subscription_use_cases = SubscriptionUseCases::new(
        postgres_arc.clone() as Arc<dyn AccountRepoTrait>,
        postgres_arc as Arc<dyn SubscriptionEventRepoTrait>,
        notifier,
        checkout,
        webhook_secret,
        Duration::from_millis(config.notify_timeout_ms),
    );

    Ok(AppState {
        config: Arc::new(config),
        subscription_use_cases: Arc::new(subscription_use_cases),
    })
}

/// Pretty console logs by default; JSON lines on stdout when `json` is set.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sweezy_api=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true),
            )
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false).with_level(true).pretty())
            .try_init()
            .ok();
    }
}
