//! Gateway Manager for managing gateway plugins.
//!
//! The Gateway Manager provides a unified interface for:
//! - Registering gateways and wiring their command/event channels
//! - Dispatching inbound events to the registered message handler
//! - Sending replies, option keyboards, and documents back through gateways
//! - Managing gateway lifecycle (start, stop)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tracing::{debug, error, info, warn};

/// Default timeout for message handler execution (5 minutes).
const DEFAULT_MESSAGE_HANDLER_TIMEOUT: Duration = Duration::from_secs(300);

use paperstack_gateway_protocol::{
    CallbackQueryData, GatewayCommand, GatewayEvent, InlineButton, InlineKeyboard, MediaPayload,
    MessageReceivedData,
};

use crate::render::{Quality, Style};

// ============================================================================
// Gateway Manager
// ============================================================================

/// Manager for all gateway plugins.
///
/// Handles registration, lifecycle, and message routing between gateways and
/// the conversation handler.
#[derive(Clone)]
pub struct GatewayManager {
    inner: Arc<RwLock<GatewayManagerInner>>,
}

struct GatewayManagerInner {
    /// Registered gateways by name.
    gateways: HashMap<String, GatewayHandle>,

    /// Message handler for incoming messages.
    handler: Option<Arc<dyn MessageHandler>>,

    /// Timeout for message handler execution.
    message_handler_timeout: Duration,

    /// JoinHandles for event handler tasks, awaited at shutdown.
    event_handles: Vec<tokio::task::JoinHandle<()>>,
}

impl GatewayManager {
    /// Create a new gateway manager with the specified message handler timeout.
    ///
    /// The timeout bounds how long a single inbound event may be processed
    /// (downloads and rendering included) before it is abandoned with an
    /// apology to the user.
    pub fn new(message_handler_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(RwLock::new(GatewayManagerInner {
                gateways: HashMap::new(),
                handler: None,
                message_handler_timeout,
                event_handles: Vec::new(),
            })),
        }
    }

    /// Set the message handler for incoming gateway events.
    pub async fn set_handler(&self, handler: Arc<dyn MessageHandler>) {
        let mut inner = self.inner.write().await;
        inner.handler = Some(handler);
    }

    /// Register a gateway and get channels for communication.
    ///
    /// Returns:
    /// - `Receiver<GatewayCommand>`: Gateway receives commands from Paperstack
    /// - `Sender<GatewayEvent>`: Gateway sends events to Paperstack
    pub async fn register(
        &self,
        name: impl Into<String>,
        capabilities: Vec<String>,
    ) -> (mpsc::Receiver<GatewayCommand>, mpsc::Sender<GatewayEvent>) {
        let name = name.into();
        let (cmd_tx, cmd_rx) = mpsc::channel(100);
        let (evt_tx, evt_rx) = mpsc::channel(100);

        let handle = GatewayHandle {
            name: name.clone(),
            command_tx: cmd_tx,
            capabilities,
        };

        {
            let mut inner = self.inner.write().await;
            inner.gateways.insert(name.clone(), handle);
        }

        // Spawn event handler task
        let manager = self.clone();
        let gateway_name = name.clone();
        let join_handle = tokio::spawn(async move {
            manager.handle_events(gateway_name, evt_rx).await;
        });

        {
            let mut inner = self.inner.write().await;
            inner.event_handles.push(join_handle);
        }

        info!(gateway = %name, "Gateway registered");
        (cmd_rx, evt_tx)
    }

    /// Unregister a gateway.
    pub async fn unregister(&self, name: &str) {
        let mut inner = self.inner.write().await;
        if inner.gateways.remove(name).is_some() {
            info!(gateway = %name, "Gateway unregistered");
        }
    }

    /// Get a gateway handle by name.
    pub async fn get(&self, name: &str) -> Option<GatewayHandle> {
        let inner = self.inner.read().await;
        inner.gateways.get(name).map(|h| GatewayHandle {
            name: h.name.clone(),
            command_tx: h.command_tx.clone(),
            capabilities: h.capabilities.clone(),
        })
    }

    /// List all registered gateways.
    pub async fn list(&self) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.gateways.keys().cloned().collect()
    }

    /// Send a plain text message through a gateway.
    pub async fn send_message(
        &self,
        gateway: &str,
        chat_id: &str,
        content: &str,
    ) -> Result<(), SendError> {
        self.send_message_with_keyboard(gateway, chat_id, content, None)
            .await
    }

    /// Send a message through a gateway with an optional inline keyboard.
    pub async fn send_message_with_keyboard(
        &self,
        gateway: &str,
        chat_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::SendMessage {
            request_id: ulid::Ulid::new().to_string(),
            chat_id: chat_id.to_string(),
            content: content.to_string(),
            reply_to: None,
            inline_keyboard,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Send media (the generated document) through a gateway.
    pub async fn send_media(
        &self,
        gateway: &str,
        chat_id: &str,
        media: MediaPayload,
        caption: Option<String>,
    ) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::SendMedia {
            request_id: ulid::Ulid::new().to_string(),
            chat_id: chat_id.to_string(),
            media,
            caption,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Edit a previously sent message, optionally replacing its keyboard.
    pub async fn edit_message(
        &self,
        gateway: &str,
        chat_id: &str,
        message_id: &str,
        content: &str,
        inline_keyboard: Option<InlineKeyboard>,
    ) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::EditMessage {
            request_id: ulid::Ulid::new().to_string(),
            chat_id: chat_id.to_string(),
            message_id: message_id.to_string(),
            content: content.to_string(),
            inline_keyboard,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Send typing indicator through a gateway.
    pub async fn send_typing(&self, gateway: &str, chat_id: &str) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::SendTyping {
            chat_id: chat_id.to_string(),
            duration: 5,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Answer a callback query with an optional notification text.
    ///
    /// This dismisses the loading indicator on the button and optionally
    /// shows a toast notification to the user.
    pub async fn answer_callback_query(
        &self,
        gateway: &str,
        callback_query_id: &str,
        text: Option<String>,
    ) -> Result<(), SendError> {
        let tx = self.command_tx(gateway).await?;

        let command = GatewayCommand::AnswerCallbackQuery {
            request_id: ulid::Ulid::new().to_string(),
            callback_query_id: callback_query_id.to_string(),
            text,
        };

        tx.send(command).await.map_err(|_| SendError::ChannelClosed)
    }

    /// Shutdown all gateways gracefully.
    pub async fn shutdown(&self) {
        let gateways = {
            let inner = self.inner.read().await;
            inner
                .gateways
                .iter()
                .map(|(k, v)| (k.clone(), v.command_tx.clone()))
                .collect::<Vec<_>>()
        };

        for (name, tx) in gateways {
            debug!(gateway = %name, "Sending shutdown to gateway");
            let _ = tx.send(GatewayCommand::Shutdown).await;
        }

        // Wait for event handler tasks to finish
        let handles = {
            let mut inner = self.inner.write().await;
            std::mem::take(&mut inner.event_handles)
        };
        for handle in handles {
            let _ = handle.await;
        }
    }

    async fn command_tx(&self, gateway: &str) -> Result<mpsc::Sender<GatewayCommand>, SendError> {
        let inner = self.inner.read().await;
        match inner.gateways.get(gateway) {
            Some(h) => Ok(h.command_tx.clone()),
            None => {
                warn!(gateway = %gateway, "Gateway not found");
                Err(SendError::ChannelClosed)
            }
        }
    }

    /// Handle events from a gateway.
    async fn handle_events(&self, gateway: String, mut rx: mpsc::Receiver<GatewayEvent>) {
        let mut inflight = tokio::task::JoinSet::new();

        while let Some(event) = rx.recv().await {
            // Reap completed handler tasks
            while inflight.try_join_next().is_some() {}

            match event {
                GatewayEvent::Ready {
                    gateway: gw_name,
                    version,
                    capabilities,
                } => {
                    info!(
                        gateway = %gateway,
                        reported_name = %gw_name,
                        version = %version,
                        capabilities = ?capabilities,
                        "Gateway ready"
                    );
                }

                GatewayEvent::MessageReceived(data) => {
                    debug!(
                        gateway = %gateway,
                        message_id = %data.message_id,
                        chat_id = %data.chat_id,
                        sender_id = %data.sender.id,
                        "Message received from gateway"
                    );

                    let (handler, handler_timeout) = {
                        let inner = self.inner.read().await;
                        (inner.handler.clone(), inner.message_handler_timeout)
                    };

                    if let Some(handler) = handler {
                        let manager = self.clone();
                        let gateway = gateway.clone();

                        // Per-user ordering comes from the transport; distinct
                        // users may be handled concurrently.
                        inflight.spawn(async move {
                            let handler_result = tokio::time::timeout(
                                handler_timeout,
                                handler.handle_message(&gateway, &data),
                            )
                            .await;

                            let response = match handler_result {
                                Ok(resp) => resp,
                                Err(_elapsed) => {
                                    warn!(
                                        gateway = %gateway,
                                        chat_id = %data.chat_id,
                                        timeout_secs = handler_timeout.as_secs(),
                                        "Message handler timed out"
                                    );
                                    Some(
                                        "Sorry, the request timed out. Please try again."
                                            .to_string(),
                                    )
                                }
                            };

                            if let Some(response) = response {
                                // Send response back through gateway
                                if let Err(e) = manager
                                    .send_message(&gateway, &data.chat_id, &response)
                                    .await
                                {
                                    error!(
                                        gateway = %gateway,
                                        chat_id = %data.chat_id,
                                        error = %e,
                                        "Failed to send response"
                                    );
                                }
                            }
                        });
                    } else {
                        warn!(gateway = %gateway, "No message handler registered");
                    }
                }

                GatewayEvent::CallbackQuery(data) => {
                    debug!(
                        gateway = %gateway,
                        callback_query_id = %data.callback_query_id,
                        chat_id = %data.chat_id,
                        data = %data.data,
                        "Callback query received"
                    );

                    let (handler, handler_timeout) = {
                        let inner = self.inner.read().await;
                        (inner.handler.clone(), inner.message_handler_timeout)
                    };

                    if let Some(handler) = handler {
                        let manager = self.clone();
                        let gateway = gateway.clone();

                        inflight.spawn(async move {
                            let handler_result = tokio::time::timeout(
                                handler_timeout,
                                handler.handle_callback_query(&gateway, &data),
                            )
                            .await;

                            let response = match handler_result {
                                Ok(resp) => resp,
                                Err(_elapsed) => {
                                    warn!(
                                        gateway = %gateway,
                                        callback_query_id = %data.callback_query_id,
                                        timeout_secs = handler_timeout.as_secs(),
                                        "Callback query handler timed out"
                                    );
                                    Some("Request timed out".to_string())
                                }
                            };

                            // Answer the callback query with toast notification
                            if let Err(e) = manager
                                .answer_callback_query(&gateway, &data.callback_query_id, response)
                                .await
                            {
                                warn!(
                                    gateway = %gateway,
                                    callback_query_id = %data.callback_query_id,
                                    error = %e,
                                    "Failed to answer callback query"
                                );
                            }
                        });
                    }
                }

                GatewayEvent::CommandOk {
                    request_id,
                    message_id,
                } => {
                    debug!(
                        gateway = %gateway,
                        request_id = %request_id,
                        message_id = ?message_id,
                        "Command completed"
                    );
                }

                GatewayEvent::CommandError {
                    request_id,
                    code,
                    message,
                } => {
                    error!(
                        gateway = %gateway,
                        request_id = %request_id,
                        code = %code,
                        message = %message,
                        "Command failed"
                    );
                }

                GatewayEvent::Error {
                    code,
                    message,
                    fatal,
                } => {
                    if fatal {
                        error!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Fatal gateway error"
                        );
                        self.unregister(&gateway).await;
                    } else {
                        warn!(
                            gateway = %gateway,
                            code = %code,
                            message = %message,
                            "Gateway error"
                        );
                    }
                }

                GatewayEvent::Shutdown { reason } => {
                    info!(gateway = %gateway, reason = %reason, "Gateway shutdown");
                    self.unregister(&gateway).await;
                    break;
                }

                GatewayEvent::Pong {
                    request_id,
                    uptime_seconds,
                    connected,
                } => {
                    debug!(
                        gateway = %gateway,
                        request_id = %request_id,
                        uptime_seconds = %uptime_seconds,
                        connected = %connected,
                        "Gateway pong"
                    );
                }
            }
        }

        // Wait for in-flight handlers to complete
        while inflight.join_next().await.is_some() {}

        debug!(gateway = %gateway, "Gateway event handler stopped");
    }
}

impl Default for GatewayManager {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_HANDLER_TIMEOUT)
    }
}

// ============================================================================
// Message Handler
// ============================================================================

/// Handler for incoming gateway events.
///
/// Implement this trait to handle messages from gateways.
/// The Gateway Manager calls this when a message or button press arrives.
#[async_trait::async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handle an incoming message from a gateway.
    ///
    /// Returns the response content to send back, or None if no response.
    async fn handle_message(&self, gateway: &str, data: &MessageReceivedData) -> Option<String>;

    /// Handle a callback query from an inline keyboard button press.
    ///
    /// Returns an optional toast notification to show the user; the loading
    /// indicator is dismissed either way.
    async fn handle_callback_query(
        &self,
        _gateway: &str,
        _data: &CallbackQueryData,
    ) -> Option<String> {
        // Default implementation does nothing
        None
    }
}

// ============================================================================
// Gateway Handle
// ============================================================================

/// Handle for communicating with a gateway.
pub struct GatewayHandle {
    /// Gateway name (e.g., "telegram").
    pub name: String,

    /// Channel to send commands to the gateway.
    pub command_tx: mpsc::Sender<GatewayCommand>,

    /// Capabilities reported by the gateway.
    pub capabilities: Vec<String>,
}

impl GatewayHandle {
    /// Send a command to the gateway.
    pub async fn send(&self, command: GatewayCommand) -> Result<(), SendError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SendError::ChannelClosed)
    }

    /// Check if the gateway supports a capability.
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }
}

/// Error sending a command to a gateway.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("gateway channel closed")]
    ChannelClosed,
}

// ============================================================================
// Option Keyboards
// ============================================================================

/// Build the style options keyboard, one button per row.
///
/// The callback data format is `style:{id}`; the session is looked up from
/// the sender when the callback is received.
pub fn build_style_keyboard() -> InlineKeyboard {
    InlineKeyboard::column(
        Style::ALL
            .iter()
            .map(|s| InlineButton::new(s.label(), format!("style:{}", s.as_str())))
            .collect(),
    )
}

/// Build the quality options keyboard, one button per row.
///
/// The callback data format is `quality:{id}`.
pub fn build_quality_keyboard() -> InlineKeyboard {
    InlineKeyboard::column(
        Quality::ALL
            .iter()
            .map(|q| InlineButton::new(q.label(), format!("quality:{}", q.as_str())))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_list() {
        let manager = GatewayManager::default();

        let (_cmd_rx, _evt_tx) = manager
            .register("telegram", vec!["media".to_string()])
            .await;

        let gateways = manager.list().await;
        assert_eq!(gateways.len(), 1);
        assert!(gateways.contains(&"telegram".to_string()));
    }

    #[tokio::test]
    async fn test_unregister() {
        let manager = GatewayManager::default();

        let (_cmd_rx, _evt_tx) = manager.register("telegram", vec![]).await;
        assert_eq!(manager.list().await.len(), 1);

        manager.unregister("telegram").await;
        assert_eq!(manager.list().await.len(), 0);
    }

    #[tokio::test]
    async fn test_get_gateway() {
        let manager = GatewayManager::default();

        let (_cmd_rx, _evt_tx) = manager
            .register("telegram", vec!["media".to_string(), "edit".to_string()])
            .await;

        let handle = manager.get("telegram").await.unwrap();
        assert_eq!(handle.name, "telegram");
        assert!(handle.has_capability("media"));
        assert!(handle.has_capability("edit"));
        assert!(!handle.has_capability("typing"));
    }

    #[tokio::test]
    async fn test_handle_send_reaches_gateway_channel() {
        let manager = GatewayManager::default();
        let (mut cmd_rx, _evt_tx) = manager.register("telegram", vec![]).await;

        let handle = manager.get("telegram").await.unwrap();
        handle
            .send(GatewayCommand::Ping {
                request_id: "req_1".to_string(),
            })
            .await
            .unwrap();

        match cmd_rx.recv().await {
            Some(GatewayCommand::Ping { request_id }) => assert_eq!(request_id, "req_1"),
            other => panic!("expected Ping, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_to_unknown_gateway_fails() {
        let manager = GatewayManager::default();
        let result = manager.send_message("nowhere", "123", "hello").await;
        assert!(matches!(result, Err(SendError::ChannelClosed)));
    }

    #[test]
    fn test_style_keyboard_layout() {
        let keyboard = build_style_keyboard();
        assert_eq!(keyboard.rows.len(), 4);
        assert_eq!(keyboard.rows[0][0].callback_data, "style:original");
        assert_eq!(keyboard.rows[2][0].text, "Black & White");
        assert_eq!(keyboard.rows[2][0].callback_data, "style:black_white");
    }

    #[test]
    fn test_quality_keyboard_layout() {
        let keyboard = build_quality_keyboard();
        assert_eq!(keyboard.rows.len(), 3);
        assert_eq!(keyboard.rows[0][0].callback_data, "quality:high");
        assert_eq!(keyboard.rows[2][0].text, "Low");
    }
}
