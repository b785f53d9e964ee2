//! Gateway Protocol types for communication between Paperstack and gateway plugins.
//!
//! The protocol is bidirectional:
//!
//! - **Commands** (Paperstack → Gateway): Instructions from the bot core to the gateway
//! - **Events** (Gateway → Paperstack): Notifications from the gateway to the bot core
//!
//! Built-in gateways exchange these types over Rust mpsc channels. The enums are
//! serde-tagged so the same protocol can be carried as JSON Lines
//! (newline-delimited JSON) by an out-of-process gateway.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Commands (Paperstack → Gateway)
// ============================================================================

/// Commands sent from Paperstack to a gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayCommand {
    /// Send a text message to a chat.
    SendMessage {
        request_id: String,
        chat_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<String>,
        /// Optional inline keyboard for option prompts.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline_keyboard: Option<InlineKeyboard>,
    },

    /// Send media (e.g. the generated document) to a chat.
    SendMedia {
        request_id: String,
        chat_id: String,
        media: MediaPayload,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// Show typing indicator in a chat.
    SendTyping {
        chat_id: String,
        /// Duration in seconds (0 = stop typing indicator).
        #[serde(default)]
        duration: u32,
    },

    /// Edit a previously sent message, optionally replacing its inline keyboard.
    ///
    /// Omitting the keyboard clears any keyboard attached to the message.
    EditMessage {
        request_id: String,
        chat_id: String,
        message_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        inline_keyboard: Option<InlineKeyboard>,
    },

    /// Health check / ping.
    Ping { request_id: String },

    /// Answer a callback query (dismiss loading indicator on button press).
    AnswerCallbackQuery {
        request_id: String,
        callback_query_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },

    /// Request graceful shutdown.
    Shutdown,
}

/// Inline keyboard for interactive buttons in messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineKeyboard {
    /// Rows of buttons (each row is a Vec of buttons).
    pub rows: Vec<Vec<InlineButton>>,
}

/// A button in an inline keyboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InlineButton {
    /// Button text displayed to user.
    pub text: String,
    /// Callback data sent when button is pressed.
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Create a keyboard with one button per row.
    pub fn column(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    /// Create a single-row keyboard with the given buttons.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }
}

impl InlineButton {
    /// Create a new button.
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}

/// Media payload for SendMedia command.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum MediaPayload {
    /// Fetch media from URL.
    Url {
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
    /// Base64-encoded media data.
    Base64 {
        data: String,
        mime_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        filename: Option<String>,
    },
}

// ============================================================================
// Events (Gateway → Paperstack)
// ============================================================================

/// Events sent from a gateway to Paperstack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Gateway is ready to receive commands.
    Ready {
        gateway: String,
        version: String,
        #[serde(default)]
        capabilities: Vec<String>,
    },

    /// Incoming message from a user.
    MessageReceived(Box<MessageReceivedData>),

    /// Callback query from inline keyboard button press.
    CallbackQuery(Box<CallbackQueryData>),

    /// Command completed successfully.
    CommandOk {
        request_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },

    /// Command failed.
    CommandError {
        request_id: String,
        code: String,
        message: String,
    },

    /// Response to Ping command.
    Pong {
        request_id: String,
        uptime_seconds: u64,
        connected: bool,
    },

    /// Gateway-level error (not tied to a specific command).
    Error {
        code: String,
        message: String,
        /// Whether this error is fatal (gateway will shut down).
        #[serde(default)]
        fatal: bool,
    },

    /// Gateway is shutting down.
    Shutdown { reason: String },
}

/// Data for a callback query event (inline keyboard button press).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQueryData {
    /// Unique identifier for this callback query.
    pub callback_query_id: String,
    /// Chat where the callback originated.
    pub chat_id: String,
    /// User who pressed the button.
    pub sender: Sender,
    /// Message ID that contained the inline keyboard.
    pub message_id: String,
    /// Data from the pressed button.
    pub data: String,
}

/// Data for an incoming message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceivedData {
    pub message_id: String,
    pub chat_id: String,
    pub sender: Sender,
    pub content: MessageContent,
    /// Timestamp when the message was sent (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sender information for incoming messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Content of an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text message.
    Text { text: String },

    /// Media message (image, video, audio, document).
    Media {
        media_type: String,
        /// Direct download URL resolved by the gateway, when available.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },

    /// Unknown/unsupported content type.
    Unknown {
        #[serde(default)]
        raw: serde_json::Value,
    },
}

impl MessageContent {
    /// Extract text content if this is a text message.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            MessageContent::Media { caption, .. } => caption.as_deref(),
            _ => None,
        }
    }
}

// ============================================================================
// Gateway Capabilities
// ============================================================================

/// Well-known gateway capabilities.
pub mod capabilities {
    /// Gateway supports sending media.
    pub const MEDIA: &str = "media";
    /// Gateway supports editing messages.
    pub const EDIT: &str = "edit";
    /// Gateway supports typing indicators.
    pub const TYPING: &str = "typing";
    /// Gateway supports inline keyboards for interactive buttons.
    pub const INLINE_KEYBOARD: &str = "inline_keyboard";
}

// ============================================================================
// Error Codes
// ============================================================================

/// Well-known error codes for CommandError and Error events.
pub mod error_codes {
    /// Chat/conversation not found.
    pub const CHAT_NOT_FOUND: &str = "chat_not_found";
    /// Message not found (for edit).
    pub const MESSAGE_NOT_FOUND: &str = "message_not_found";
    /// Rate limited by platform.
    pub const RATE_LIMITED: &str = "rate_limited";
    /// Platform API error.
    pub const PLATFORM_ERROR: &str = "platform_error";
    /// Invalid request from Paperstack.
    pub const INVALID_REQUEST: &str = "invalid_request";
}
