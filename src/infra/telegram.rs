use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::{
    app_error::{AppError, AppResult},
    application::ports::notifier::OperatorNotifier,
};

/// Posts operator messages to a Telegram chat through the Bot API.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    bot_token: SecretString,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(client: Client, bot_token: SecretString, chat_id: String) -> Self {
        Self {
            client,
            bot_token,
            chat_id,
        }
    }
}

#[derive(Serialize)]
struct SendMessageReq<'a> {
    chat_id: &'a str,
    text: &'a str,
    disable_web_page_preview: bool,
}

#[async_trait]
impl OperatorNotifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> AppResult<()> {
        let body = SendMessageReq {
            chat_id: &self.chat_id,
            text,
            disable_web_page_preview: true,
        };

        self.client
            .post(format!(
                "https://api.telegram.org/bot{}/sendMessage",
                self.bot_token.expose_secret()
            ))
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Failed to send notification: {}", e.without_url())))?
            .error_for_status()
            .map_err(|e| AppError::Internal(format!("Telegram API error: {}", e.without_url())))?;

        Ok(())
    }
}
