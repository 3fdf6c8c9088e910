//! Typed view of the payment processor's webhook envelope.
//!
//! The raw body is parsed once here; downstream code matches on
//! [`ProcessorEvent`] instead of probing JSON keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

pub const CHECKOUT_SESSION_COMPLETED: &str = "checkout.session.completed";
pub const INVOICE_PAYMENT_SUCCEEDED: &str = "invoice.payment_succeeded";
pub const SUBSCRIPTION_UPDATED: &str = "customer.subscription.updated";
pub const SUBSCRIPTION_DELETED: &str = "customer.subscription.deleted";

/// Accepts either a bare id or an expanded object carrying an `id`.
fn expandable_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Expandable {
        Id(String),
        Object { id: String },
    }

    Ok(
        Option::<Expandable>::deserialize(deserializer)?.map(|e| match e {
            Expandable::Id(id) => id,
            Expandable::Object { id } => id,
        }),
    )
}

fn timestamp_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct List<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CheckoutSession {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Period {
    #[serde(default)]
    pub end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InvoiceLine {
    #[serde(default)]
    pub period: Option<Period>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Invoice {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub subscription: Option<String>,
    #[serde(default)]
    pub lines: Option<List<InvoiceLine>>,
}

impl Invoice {
    /// End of the billed period, taken from the first invoice line.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.lines
            .as_ref()
            .and_then(|lines| lines.data.first())
            .and_then(|line| line.period.as_ref())
            .and_then(|period| period.end)
            .and_then(timestamp_to_utc)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub current_period_end: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Subscription {
    pub id: String,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
    #[serde(default)]
    pub current_period_end: Option<i64>,
    #[serde(default)]
    pub items: Option<List<SubscriptionItem>>,
}

impl Subscription {
    /// Newer API versions moved `current_period_end` onto the items.
    pub fn period_end(&self) -> Option<DateTime<Utc>> {
        self.current_period_end
            .or_else(|| {
                self.items
                    .as_ref()
                    .and_then(|items| items.data.first())
                    .and_then(|item| item.current_period_end)
            })
            .and_then(timestamp_to_utc)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProcessorEvent {
    CheckoutSessionCompleted(CheckoutSession),
    InvoicePaymentSucceeded(Invoice),
    SubscriptionUpdated(Subscription),
    SubscriptionDeleted(Subscription),
    Unrecognized,
}

/// Opaque references the resolver uses to find the owning account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AccountRefs {
    #[serde(default)]
    pub client_reference_id: Option<String>,
    #[serde(default, deserialize_with = "expandable_id")]
    pub customer: Option<String>,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(default)]
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: Option<EnvelopeData>,
}

#[derive(Deserialize)]
struct EnvelopeData {
    #[serde(default)]
    object: JsonValue,
}

#[derive(Debug, Clone)]
pub struct ParsedEvent {
    pub id: Option<String>,
    pub event_type: String,
    pub event: ProcessorEvent,
    pub refs: AccountRefs,
    /// The full envelope as received, kept for the audit log.
    pub payload: JsonValue,
}

impl ParsedEvent {
    /// Parses a verified webhook body. Fails only when the body is not an
    /// event envelope; a known event type with an unexpected object shape
    /// degrades to [`ProcessorEvent::Unrecognized`].
    pub fn parse(body: &str) -> Result<Self, serde_json::Error> {
        let payload: JsonValue = serde_json::from_str(body)?;
        let envelope: Envelope = serde_json::from_value(payload.clone())?;
        let object = envelope.data.map(|d| d.object).unwrap_or(JsonValue::Null);

        let refs = serde_json::from_value::<AccountRefs>(object.clone()).unwrap_or_default();

        let typed = match envelope.event_type.as_str() {
            CHECKOUT_SESSION_COMPLETED => {
                serde_json::from_value(object).map(ProcessorEvent::CheckoutSessionCompleted)
            }
            INVOICE_PAYMENT_SUCCEEDED => {
                serde_json::from_value(object).map(ProcessorEvent::InvoicePaymentSucceeded)
            }
            SUBSCRIPTION_UPDATED => {
                serde_json::from_value(object).map(ProcessorEvent::SubscriptionUpdated)
            }
            SUBSCRIPTION_DELETED => {
                serde_json::from_value(object).map(ProcessorEvent::SubscriptionDeleted)
            }
            _ => Ok(ProcessorEvent::Unrecognized),
        };

        let event = typed.unwrap_or_else(|err| {
            tracing::warn!(
                event_type = %envelope.event_type,
                event_id = ?envelope.id,
                error = %err,
                "Unexpected object shape for processor event, treating as unrecognized"
            );
            ProcessorEvent::Unrecognized
        });

        Ok(Self {
            id: envelope.id,
            event_type: envelope.event_type,
            event,
            refs,
            payload,
        })
    }
}
