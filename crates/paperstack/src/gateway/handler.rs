//! Conversation handler that drives the session state machine.
//!
//! Bridges gateway events to the session system: commands and images become
//! [`ConversationEvent`]s, the pure [`transition`] function decides what
//! happens, and this handler executes the resulting actions: sending replies
//! and keyboards, downloading images into the spool, rendering, and cleaning
//! up.
//!
//! Collaborator failures stop here. Rendering errors become a user-facing
//! message; transport failures are logged and the session is left for the
//! user to retry or cancel. Nothing propagates past this boundary.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine as _;
use tracing::{debug, error, warn};

use paperstack_gateway_protocol::{
    CallbackQueryData, MediaPayload, MessageContent, MessageReceivedData,
};

use super::manager::{GatewayManager, MessageHandler, build_quality_keyboard, build_style_keyboard};
use crate::fetch::ImageFetcher;
use crate::render::{self, Quality, Style};
use crate::session::{
    self, Action, ConversationEvent, ImageDisposition, SessionState, SessionStore, Step,
    image_disposition, transition,
};
use crate::spool::Spool;

// ============================================================================
// Prompts
// ============================================================================

/// Prompt attached to the style options keyboard.
pub const CHOOSE_STYLE: &str = "Choose image style:";

/// Prompt attached to the quality options keyboard.
pub const CHOOSE_QUALITY: &str = "Select PDF quality:";

/// Progress text while the document is being generated.
pub const GENERATING: &str = "Generating your PDF...";

/// Reply when an image download fails; the session is left intact for retry.
pub const DOWNLOAD_FAILED: &str = "Couldn't download that image. Please try sending it again.";

/// Toast for callbacks from users with no session (e.g. after cleanup).
const NO_ACTIVE_SESSION_TOAST: &str = "No active session";

/// Toast for stale or replayed option buttons.
const STALE_CHOICE_TOAST: &str = "That choice isn't available right now";

/// Reply listing the known commands.
const USAGE: &str = "Commands: /start, /done, /cancel, /status.";

// ============================================================================
// Conversation Handler
// ============================================================================

/// Handler that routes gateway events through the session state machine.
pub struct ConversationHandler {
    store: Arc<dyn SessionStore>,
    gateways: GatewayManager,
    spool: Spool,
    fetcher: Arc<dyn ImageFetcher>,
}

impl ConversationHandler {
    pub fn new(
        store: Arc<dyn SessionStore>,
        gateways: GatewayManager,
        spool: Spool,
        fetcher: Arc<dyn ImageFetcher>,
    ) -> Self {
        Self {
            store,
            gateways,
            spool,
            fetcher,
        }
    }
}

// ============================================================================
// MessageHandler Trait Implementation
// ============================================================================

#[async_trait]
impl MessageHandler for ConversationHandler {
    async fn handle_message(&self, gateway: &str, data: &MessageReceivedData) -> Option<String> {
        let user_id = data.sender.id.as_str();
        let chat_id = data.chat_id.as_str();

        match &data.content {
            MessageContent::Text { text } => {
                let text = text.trim();
                if let Some(command) = text.strip_prefix('/') {
                    return self.handle_command(command, gateway, chat_id, user_id).await;
                }
                Some(self.freeform_hint(user_id))
            }

            MessageContent::Media {
                media_type, url, ..
            } if media_type == "image" => {
                self.handle_image(gateway, chat_id, user_id, url.as_deref())
                    .await
            }

            MessageContent::Media { media_type, .. } => {
                debug!(
                    gateway = %gateway,
                    user_id = %user_id,
                    media_type = %media_type,
                    "Ignoring non-image media"
                );
                Some(session::PHOTOS_ONLY_HINT.to_string())
            }

            MessageContent::Unknown { .. } => {
                debug!(gateway = %gateway, user_id = %user_id, "Ignoring unknown content");
                None
            }
        }
    }

    async fn handle_callback_query(
        &self,
        gateway: &str,
        data: &CallbackQueryData,
    ) -> Option<String> {
        let user_id = data.sender.id.as_str();
        let chat_id = data.chat_id.as_str();

        let Some((kind, value)) = data.data.split_once(':') else {
            debug!(callback_data = %data.data, "Ignoring malformed callback data");
            return None;
        };

        let event = match kind {
            "style" => match Style::parse(value) {
                Some(style) => ConversationEvent::StyleChosen {
                    style,
                    message_id: data.message_id.clone(),
                },
                None => {
                    warn!(value = %value, "Unknown style id in callback");
                    return Some(STALE_CHOICE_TOAST.to_string());
                }
            },
            "quality" => match Quality::parse(value) {
                Some(quality) => ConversationEvent::QualityChosen {
                    quality,
                    message_id: data.message_id.clone(),
                },
                None => {
                    warn!(value = %value, "Unknown quality id in callback");
                    return Some(STALE_CHOICE_TOAST.to_string());
                }
            },
            other => {
                debug!(kind = %other, "Ignoring unrecognized callback kind");
                return None;
            }
        };

        let current = self.store.get(user_id);
        if current.is_none() {
            debug!(user_id = %user_id, "Callback for user with no session");
            return Some(NO_ACTIVE_SESSION_TOAST.to_string());
        }

        let Step { session, actions } = transition(user_id, current, event);
        // Rejected choices carry no actions; the session is left untouched.
        let accepted = !actions.is_empty();
        self.store.apply(user_id, session);

        if let Some(reply) = self.execute_actions(gateway, chat_id, user_id, actions).await {
            let _ = self.gateways.send_message(gateway, chat_id, &reply).await;
        }

        if accepted {
            // The button press is acknowledged by dismissing the spinner.
            None
        } else {
            Some(STALE_CHOICE_TOAST.to_string())
        }
    }
}

// ============================================================================
// Event Dispatch
// ============================================================================

impl ConversationHandler {
    /// Dispatch a slash command from the chat.
    async fn handle_command(
        &self,
        command: &str,
        gateway: &str,
        chat_id: &str,
        user_id: &str,
    ) -> Option<String> {
        match command {
            "start" => {
                self.dispatch(gateway, chat_id, user_id, ConversationEvent::Start)
                    .await
            }
            "done" => {
                self.dispatch(gateway, chat_id, user_id, ConversationEvent::Done)
                    .await
            }
            "cancel" => {
                self.dispatch(gateway, chat_id, user_id, ConversationEvent::Cancel)
                    .await
            }
            "status" => Some(self.handle_status(user_id)),
            _ => {
                debug!(command = %command, "Unknown command");
                Some(USAGE.to_string())
            }
        }
    }

    /// Run one event through the state machine and execute its actions.
    async fn dispatch(
        &self,
        gateway: &str,
        chat_id: &str,
        user_id: &str,
        event: ConversationEvent,
    ) -> Option<String> {
        let current = self.store.get(user_id);
        let Step { session, actions } = transition(user_id, current, event);
        self.store.apply(user_id, session);
        self.execute_actions(gateway, chat_id, user_id, actions).await
    }

    /// Execute outbound actions; returns accumulated plain-reply text for the
    /// manager to send.
    async fn execute_actions(
        &self,
        gateway: &str,
        chat_id: &str,
        user_id: &str,
        actions: Vec<Action>,
    ) -> Option<String> {
        let mut reply: Option<String> = None;

        for action in actions {
            match action {
                Action::Reply(text) => {
                    reply = Some(match reply {
                        Some(mut acc) => {
                            acc.push('\n');
                            acc.push_str(&text);
                            acc
                        }
                        None => text,
                    });
                }

                Action::PresentStyleOptions => {
                    if let Err(e) = self
                        .gateways
                        .send_message_with_keyboard(
                            gateway,
                            chat_id,
                            CHOOSE_STYLE,
                            Some(build_style_keyboard()),
                        )
                        .await
                    {
                        error!(gateway = %gateway, error = %e, "Failed to send style options");
                    }
                }

                Action::PresentQualityOptions { message_id } => {
                    if let Err(e) = self
                        .gateways
                        .edit_message(
                            gateway,
                            chat_id,
                            &message_id,
                            CHOOSE_QUALITY,
                            Some(build_quality_keyboard()),
                        )
                        .await
                    {
                        error!(gateway = %gateway, error = %e, "Failed to present quality options");
                    }
                }

                Action::DiscardFiles => {
                    if let Err(e) = self.spool.remove_user(user_id).await {
                        warn!(user_id = %user_id, error = %e, "Failed to remove spool files");
                    }
                }

                Action::Render {
                    images,
                    style,
                    quality,
                    message_id,
                } => {
                    self.render_and_deliver(
                        gateway, chat_id, user_id, &message_id, images, style, quality,
                    )
                    .await;
                }
            }
        }

        reply
    }

    /// Handle an incoming image: download it into the spool if the session is
    /// collecting, then feed the state machine.
    async fn handle_image(
        &self,
        gateway: &str,
        chat_id: &str,
        user_id: &str,
        url: Option<&str>,
    ) -> Option<String> {
        match image_disposition(self.store.get(user_id).as_ref()) {
            ImageDisposition::NoSession => Some(session::NO_SESSION_HINT.to_string()),
            ImageDisposition::NotCollecting => Some(session::USE_BUTTONS_HINT.to_string()),
            ImageDisposition::Accept { index } => {
                let Some(url) = url else {
                    warn!(user_id = %user_id, "Image event without a download URL");
                    return Some(DOWNLOAD_FAILED.to_string());
                };

                if let Err(e) = self.spool.ensure_user_dir(user_id).await {
                    error!(user_id = %user_id, error = %e, "Failed to create spool directory");
                    return Some(DOWNLOAD_FAILED.to_string());
                }

                let dest = self.spool.image_path(user_id, index);
                match self.fetcher.fetch(url, &dest).await {
                    Ok(()) => {
                        self.dispatch(
                            gateway,
                            chat_id,
                            user_id,
                            ConversationEvent::ImageReceived { path: dest },
                        )
                        .await
                    }
                    // Transport failure: report and leave the session as-is so
                    // the user can retry or cancel.
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to download image");
                        Some(DOWNLOAD_FAILED.to_string())
                    }
                }
            }
        }
    }

    /// Report the session's current state.
    fn handle_status(&self, user_id: &str) -> String {
        match self.store.get(user_id) {
            None => format!("No active session. {}", session::NO_SESSION_HINT),
            Some(s) => match s.state {
                SessionState::Collecting => format!(
                    "Collecting images: {} so far. Send /done when you're finished.",
                    s.images.len()
                ),
                SessionState::ChoosingStyle => "Waiting for a style choice.".to_string(),
                SessionState::ChoosingQuality => "Waiting for a quality choice.".to_string(),
                SessionState::Terminal => "Finishing up.".to_string(),
            },
        }
    }

    /// Render the collected images and deliver the document.
    ///
    /// Progress and errors are reported by editing `message_id`. The user's
    /// spool directory is removed whatever the outcome.
    #[allow(clippy::too_many_arguments)]
    async fn render_and_deliver(
        &self,
        gateway: &str,
        chat_id: &str,
        user_id: &str,
        message_id: &str,
        images: Vec<PathBuf>,
        style: Style,
        quality: Quality,
    ) {
        let _ = self
            .gateways
            .edit_message(gateway, chat_id, message_id, GENERATING, None)
            .await;
        let _ = self.gateways.send_typing(gateway, chat_id).await;

        let outcome = tokio::task::spawn_blocking(move || {
            render::render_document(&images, style, quality)
        })
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, "Rendering task aborted");
            Err(render::RenderError::Assembly(
                "rendering task aborted".to_string(),
            ))
        });

        match outcome {
            Ok(bytes) => {
                let media = MediaPayload::Base64 {
                    data: base64::engine::general_purpose::STANDARD.encode(&bytes),
                    mime_type: "application/pdf".to_string(),
                    filename: Some(self.spool.document_name(user_id)),
                };
                if let Err(e) = self.gateways.send_media(gateway, chat_id, media, None).await {
                    error!(
                        gateway = %gateway,
                        user_id = %user_id,
                        error = %e,
                        "Failed to deliver document"
                    );
                }
            }
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Rendering failed");
                let _ = self
                    .gateways
                    .edit_message(
                        gateway,
                        chat_id,
                        message_id,
                        &format!("Error generating PDF: {e}"),
                        None,
                    )
                    .await;
            }
        }

        // Unconditional: failed renders must not leak files either.
        if let Err(e) = self.spool.remove_user(user_id).await {
            warn!(user_id = %user_id, error = %e, "Failed to clean up spool directory");
        }
    }

    fn freeform_hint(&self, user_id: &str) -> String {
        match self.store.get(user_id) {
            None => session::NO_SESSION_HINT.to_string(),
            Some(s) if s.state == SessionState::Collecting => {
                session::COLLECTING_HINT.to_string()
            }
            Some(_) => session::USE_BUTTONS_HINT.to_string(),
        }
    }
}
