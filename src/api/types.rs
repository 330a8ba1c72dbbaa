//! API response types for the MAX exchange and the Telegram Bot API.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Public trade from /api/v3/trades.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxTrade {
    pub id: i64,
    pub price: Decimal,
    pub volume: Decimal,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
}

/// Wallet account from /api/v3/wallet/{wallet}/accounts.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxAccount {
    pub currency: String,
    pub balance: Decimal,
    #[serde(default)]
    pub locked: Decimal,
}

/// Order returned after submission.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxOrder {
    pub id: i64,
    #[serde(default)]
    pub market: String,
    #[serde(default)]
    pub side: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub volume: Option<Decimal>,
}

/// Market summary entry from /api/v3/markets.
#[derive(Debug, Clone, Deserialize)]
pub struct MaxMarket {
    pub id: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub base_unit: String,
    #[serde(default)]
    pub quote_unit: String,
}

/// Envelope of every Telegram Bot API response.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramResponse<T> {
    pub ok: bool,
    pub result: Option<T>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Update from getUpdates.
#[derive(Debug, Clone, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Inline keyboard press.
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<TelegramMessage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
}

/// Inline keyboard button sent with approval requests.
#[derive(Debug, Clone, Serialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InlineKeyboard {
    pub inline_keyboard: Vec<Vec<InlineButton>>,
}
