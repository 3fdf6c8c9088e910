use async_trait::async_trait;

use crate::app_error::AppResult;

/// Best-effort message to the operator channel.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, text: &str) -> AppResult<()>;
}

/// Used when no operator channel is configured.
#[derive(Default)]
pub struct NoopNotifier;

#[async_trait]
impl OperatorNotifier for NoopNotifier {
    async fn notify(&self, _text: &str) -> AppResult<()> {
        Ok(())
    }
}
