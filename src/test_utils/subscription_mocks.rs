//! In-memory implementations of the subscription repositories and ports.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    app_error::{AppError, AppResult},
    application::{
        ports::{
            checkout::{CheckoutGateway, CheckoutPlan, CheckoutRequest},
            notifier::OperatorNotifier,
        },
        use_cases::subscription::{
            AccountRepoTrait, CreateSubscriptionEventInput, SubscriptionEventProfile,
            SubscriptionEventRepoTrait,
        },
    },
    domain::entities::account::{Account, SubscriptionFields},
};

// ============================================================================
// InMemoryAccountRepo
// ============================================================================

#[derive(Default)]
pub struct InMemoryAccountRepo {
    pub accounts: Mutex<HashMap<String, Account>>,
    updates: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryAccountRepo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_accounts(accounts: Vec<Account>) -> Self {
        let map = accounts.into_iter().map(|a| (a.id.clone(), a)).collect();
        Self {
            accounts: Mutex::new(map),
            ..Default::default()
        }
    }

    /// Get an account (for test assertions).
    pub fn get(&self, id: &str) -> Option<Account> {
        self.accounts.lock().unwrap().get(id).cloned()
    }

    /// Number of subscription writes performed.
    pub fn update_count(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with a database error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> AppResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(AppError::Database("simulated failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl AccountRepoTrait for InMemoryAccountRepo {
    async fn get_by_id(&self, id: &str) -> AppResult<Option<Account>> {
        Ok(self.get(id))
    }

    async fn get_by_processor_customer_id(&self, customer_id: &str) -> AppResult<Option<Account>> {
        Ok(self
            .accounts
            .lock()
            .unwrap()
            .values()
            .find(|a| a.processor_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn update_subscription(
        &self,
        id: &str,
        fields: &SubscriptionFields,
    ) -> AppResult<Account> {
        self.check_writable()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(id).ok_or(AppError::NotFound)?;
        account.subscription_status = fields.status;
        account.subscription_expire_at = fields.expire_at;
        account.processor_subscription_id = fields.subscription_id.clone();
        self.updates.fetch_add(1, Ordering::SeqCst);
        Ok(account.clone())
    }

    async fn set_processor_customer_id(&self, id: &str, customer_id: &str) -> AppResult<()> {
        self.check_writable()?;
        let mut accounts = self.accounts.lock().unwrap();
        let account = accounts.get_mut(id).ok_or(AppError::NotFound)?;
        account.processor_customer_id = Some(customer_id.to_string());
        Ok(())
    }
}

// ============================================================================
// InMemorySubscriptionEventRepo
// ============================================================================

#[derive(Default)]
pub struct InMemorySubscriptionEventRepo {
    pub events: Mutex<Vec<SubscriptionEventProfile>>,
}

impl InMemorySubscriptionEventRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all events (for test assertions).
    pub fn get_all(&self) -> Vec<SubscriptionEventProfile> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubscriptionEventRepoTrait for InMemorySubscriptionEventRepo {
    async fn create(
        &self,
        input: &CreateSubscriptionEventInput,
    ) -> AppResult<SubscriptionEventProfile> {
        let event = SubscriptionEventProfile {
            id: Uuid::new_v4(),
            account_id: input.account_id.clone(),
            event_type: input.event_type.clone(),
            raw_payload: input.raw_payload.clone(),
            created_at: chrono::Utc::now(),
        };
        self.events.lock().unwrap().push(event.clone());
        Ok(event)
    }
}

// ============================================================================
// RecordingNotifier
// ============================================================================

/// Records every message; optionally fails or stalls after recording.
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
    fail: bool,
    delay: Option<Duration>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn delayed(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    /// Notifications run in the background; waits up to a second for `count`
    /// messages and returns whatever has arrived.
    pub async fn wait_for_messages(&self, count: usize) -> Vec<String> {
        for _ in 0..100 {
            if self.messages.lock().unwrap().len() >= count {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.messages()
    }
}

#[async_trait]
impl OperatorNotifier for RecordingNotifier {
    async fn notify(&self, text: &str) -> AppResult<()> {
        self.messages.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(AppError::Internal("notifier unavailable".into()));
        }
        Ok(())
    }
}

// ============================================================================
// RecordingCheckoutGateway
// ============================================================================

#[derive(Default)]
pub struct RecordingCheckoutGateway {
    customers: AtomicUsize,
    sessions: Mutex<Vec<(String, CheckoutPlan)>>,
    promotion_codes: Mutex<Vec<Option<String>>>,
    referrals: Mutex<Vec<String>>,
}

impl RecordingCheckoutGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn customers_created(&self) -> usize {
        self.customers.load(Ordering::SeqCst)
    }

    /// (customer id, plan) per created session.
    pub fn sessions(&self) -> Vec<(String, CheckoutPlan)> {
        self.sessions.lock().unwrap().clone()
    }

    /// Promotion code passed with each created session.
    pub fn promotion_codes(&self) -> Vec<Option<String>> {
        self.promotion_codes.lock().unwrap().clone()
    }

    /// Account id per created referral code.
    pub fn referrals(&self) -> Vec<String> {
        self.referrals.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckoutGateway for RecordingCheckoutGateway {
    async fn create_customer(&self, _email: &str, account_id: &str) -> AppResult<String> {
        self.customers.fetch_add(1, Ordering::SeqCst);
        Ok(format!("cus_{}", account_id))
    }

    async fn create_checkout_session(&self, request: CheckoutRequest<'_>) -> AppResult<String> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.push((request.customer_id.to_string(), request.plan));
        self.promotion_codes
            .lock()
            .unwrap()
            .push(request.promotion_code.map(str::to_string));
        Ok(format!("https://checkout.test/cs_{}", sessions.len()))
    }

    async fn create_referral_code(&self, account_id: &str) -> AppResult<String> {
        let mut referrals = self.referrals.lock().unwrap();
        referrals.push(account_id.to_string());
        Ok(format!("SWZ-TEST{}", referrals.len()))
    }
}
