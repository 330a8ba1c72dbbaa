//! Telegram Bot API: approval requests out, operator decisions in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::models::{ConfirmationState, TradeInfo};
use crate::trading::ConfirmationRegistry;

use super::types::{
    CallbackQuery, InlineButton, InlineKeyboard, TelegramMessage, TelegramResponse, TelegramUpdate,
};
use super::Notifier;

const TELEGRAM_API_URL: &str = "https://api.telegram.org";
const LONG_POLL_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Sends approval requests and trade results to one chat.
#[derive(Clone)]
pub struct TelegramNotifier {
    http: Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
    quote_currency: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str, quote_currency: &str) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(LONG_POLL_SECS + 10))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http,
            base_url: TELEGRAM_API_URL.to_string(),
            bot_token: bot_token.to_string(),
            chat_id: chat_id.to_string(),
            quote_currency: quote_currency.to_uppercase(),
        })
    }

    /// Create from `TELEGRAM_BOT_TOKEN` and `TELEGRAM_CHAT_ID`.
    pub fn from_env(quote_currency: &str) -> Result<Self> {
        let bot_token = std::env::var("TELEGRAM_BOT_TOKEN").context("TELEGRAM_BOT_TOKEN not set")?;
        let chat_id = std::env::var("TELEGRAM_CHAT_ID").context("TELEGRAM_CHAT_ID not set")?;

        Self::new(&bot_token, &chat_id, quote_currency)
    }

    /// Listener that turns button presses in this chat into resolutions.
    pub fn approval_listener(&self, registry: Arc<ConfirmationRegistry>) -> TelegramApprovalListener {
        TelegramApprovalListener {
            bot: self.clone(),
            registry,
        }
    }

    async fn send_message(&self, text: &str, keyboard: Option<InlineKeyboard>) -> Result<TelegramMessage> {
        let mut body = json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }

        self.call("sendMessage", &body).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: &serde_json::Value) -> Result<T> {
        let url = format!("{}/bot{}/{}", self.base_url, self.bot_token, method);
        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Telegram {} request failed", method))?;

        let status = response.status();
        let parsed: TelegramResponse<T> = response
            .json()
            .await
            .with_context(|| format!("Failed to parse Telegram {} response", method))?;

        match parsed.result {
            Some(result) if parsed.ok => Ok(result),
            _ => anyhow::bail!(
                "Telegram {} failed: {} - {}",
                method,
                status,
                parsed.description.unwrap_or_default()
            ),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn request_confirmation(&self, trade_id: &str, info: &TradeInfo) -> Result<()> {
        let text = confirmation_text(info, &self.quote_currency);
        let keyboard = InlineKeyboard {
            inline_keyboard: vec![vec![
                InlineButton {
                    text: "✅ Confirm".to_string(),
                    callback_data: format!("confirm_{}", trade_id),
                },
                InlineButton {
                    text: "❌ Cancel".to_string(),
                    callback_data: format!("cancel_{}", trade_id),
                },
            ]],
        };

        let message = self.send_message(&text, Some(keyboard)).await?;
        debug!(trade_id = %trade_id, message_id = message.message_id, "Confirmation request sent");
        Ok(())
    }

    async fn report_result(&self, strategy_name: &str, success: bool, message: &str) -> Result<()> {
        let status = if success { "success" } else { "failed" };
        let text = format!(
            "Strategy: {}\nTrade status: {}\nMessage: {}",
            strategy_name, status, message
        );

        self.send_message(&text, None).await?;
        Ok(())
    }
}

fn confirmation_text(info: &TradeInfo, quote: &str) -> String {
    let mut text = format!(
        "⚠️ Trade confirmation request\n\n\
         Strategy: {}\n\
         Action: {}\n\
         Volume: {} {}\n\
         Price: {} {}\n\
         Total: {:.2} {}\n",
        info.strategy_name,
        info.action,
        info.volume.round_dp(8).normalize(),
        info.coin,
        info.price,
        quote,
        info.total_amount,
        quote,
    );
    if let Some(reason) = &info.reason {
        text.push_str(&format!("Reason: {}\n", reason));
    }
    text.push_str("\nExecute this trade?");
    text
}

/// Parse `confirm_<id>` / `cancel_<id>` callback data.
pub fn parse_callback_data(data: &str) -> Option<(bool, &str)> {
    let (action, trade_id) = data.split_once('_')?;
    if trade_id.is_empty() {
        return None;
    }
    match action {
        "confirm" => Some((true, trade_id)),
        "cancel" => Some((false, trade_id)),
        _ => None,
    }
}

/// Long-polls for inline button presses and resolves pending trades.
pub struct TelegramApprovalListener {
    bot: TelegramNotifier,
    registry: Arc<ConfirmationRegistry>,
}

impl TelegramApprovalListener {
    /// Poll until `shutdown` is set.
    pub async fn run(self, shutdown: Arc<AtomicBool>) {
        info!("Telegram approval listener started");
        let mut offset: Option<i64> = None;

        while !shutdown.load(Ordering::SeqCst) {
            let updates = match self.get_updates(offset).await {
                Ok(updates) => updates,
                Err(e) => {
                    warn!(error = %e, "Failed to fetch Telegram updates");
                    tokio::time::sleep(RETRY_DELAY).await;
                    continue;
                }
            };

            for update in updates {
                if let Some(query) = update.callback_query {
                    self.handle_callback(query).await;
                }
                offset = Some(offset.map_or(update.update_id + 1, |o| o.max(update.update_id + 1)));
            }
        }

        info!("Telegram approval listener stopped");
    }

    async fn get_updates(&self, offset: Option<i64>) -> Result<Vec<TelegramUpdate>> {
        let mut body = json!({
            "timeout": LONG_POLL_SECS,
            "allowed_updates": ["callback_query"],
        });
        if let Some(offset) = offset {
            body["offset"] = json!(offset);
        }

        self.bot.call("getUpdates", &body).await
    }

    async fn handle_callback(&self, query: CallbackQuery) {
        let Some((approved, trade_id)) = query.data.as_deref().and_then(parse_callback_data) else {
            debug!(data = ?query.data, "Ignoring unrelated callback");
            return;
        };

        let summary = self
            .registry
            .get(trade_id)
            .await
            .map(|pending| {
                let info = &pending.trade_info;
                format!(
                    "{}: {} {} {}",
                    info.strategy_name,
                    info.action,
                    info.volume.round_dp(8).normalize(),
                    info.coin
                )
            })
            .unwrap_or_default();

        let reply = match self.registry.resolve(trade_id, approved).await {
            Ok(ConfirmationState::Confirmed) => format!("✅ Trade confirmed\n{}", summary),
            Ok(_) => format!("❌ Trade cancelled\n{}", summary),
            Err(_) => "⌛ Trade is no longer pending".to_string(),
        };

        if let Some(message) = &query.message {
            let body = json!({
                "chat_id": self.bot.chat_id,
                "message_id": message.message_id,
                "text": reply,
            });
            if let Err(e) = self.bot.call::<serde_json::Value>("editMessageText", &body).await {
                warn!(error = %e, "Failed to update confirmation message");
            }
        }

        let body = json!({
            "callback_query_id": query.id,
            "text": reply,
        });
        if let Err(e) = self.bot.call::<bool>("answerCallbackQuery", &body).await {
            warn!(error = %e, "Failed to answer callback query");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_callback_data() {
        assert_eq!(parse_callback_data("confirm_abc123"), Some((true, "abc123")));
        assert_eq!(parse_callback_data("cancel_abc123"), Some((false, "abc123")));
        assert_eq!(parse_callback_data("cancel_"), None);
        assert_eq!(parse_callback_data("approve_abc"), None);
        assert_eq!(parse_callback_data("confirm"), None);
    }

    #[test]
    fn test_confirmation_text() {
        let info = TradeInfo {
            strategy_name: "btc-core".to_string(),
            action: TradeAction::Buy,
            volume: dec!(0.02),
            coin: "BTC".to_string(),
            price: dec!(500000),
            total_amount: dec!(10000),
            reason: Some("first position".to_string()),
        };

        let text = confirmation_text(&info, "TWD");
        assert!(text.contains("Strategy: btc-core"));
        assert!(text.contains("Volume: 0.02 BTC"));
        assert!(text.contains("Total: 10000.00 TWD"));
        assert!(text.contains("Reason: first position"));
    }
}
