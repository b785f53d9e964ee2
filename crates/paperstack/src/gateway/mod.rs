//! Gateway system for platform integrations.
//!
//! Gateways connect Paperstack to messaging platforms. Built-in gateways are
//! compiled in and communicate over Rust channels; the protocol types are
//! serde-tagged so the same wire format works as JSON Lines for
//! out-of-process gateways.
//!
//! The [`GatewayManager`] owns the channel plumbing and dispatches inbound
//! events to the [`ConversationHandler`], which drives the session state
//! machine and sends the results back out.

pub mod handler;
pub mod manager;

// Re-export protocol types from the protocol crate
pub use paperstack_gateway_protocol::{
    CallbackQueryData, GatewayCommand, GatewayEvent, InlineButton, InlineKeyboard, MediaPayload,
    MessageContent, MessageReceivedData, Sender, capabilities, error_codes,
};

pub use handler::ConversationHandler;
pub use manager::{
    GatewayHandle, GatewayManager, MessageHandler, SendError, build_quality_keyboard,
    build_style_keyboard,
};

// Re-export the Telegram gateway from its crate
pub use paperstack_gateway_telegram::{TelegramConfig, TelegramGateway};
