//! Per-user conversation sessions and the state machine that drives them.
//!
//! The state machine is a pure function: [`transition`] consumes the current
//! session (if any) and an inbound [`ConversationEvent`], and returns the new
//! session plus the outbound [`Action`]s to execute. All transition legality
//! lives here; the gateway handler only performs I/O.
//!
//! Per-user events are assumed to arrive in order (the transport's per-chat
//! ordering); the store only has to provide atomic per-key operations.

pub mod store;

pub use store::{InMemorySessionStore, SessionStore};

use std::path::PathBuf;

use crate::render::{Quality, Style};

// ============================================================================
// Reply Texts
// ============================================================================

/// Welcome/instruction text sent on session start.
pub const WELCOME: &str = "Welcome! Send me images and I'll convert them to PDF.\n\
Send /done when you're finished sending images.";

/// Guard-failure reply for a done signal with no images collected.
pub const NO_IMAGES_YET: &str =
    "You haven't sent any images yet. Send at least one image, then /done.";

/// Reply sent when a session is cancelled.
pub const CANCELLED: &str = "Operation cancelled.";

/// Hint for plain messages arriving with no active session.
pub const NO_SESSION_HINT: &str = "Send /start to begin.";

/// Hint for free text arriving while images are being collected.
pub const COLLECTING_HINT: &str = "Send me images, or /done when you're finished.";

/// Hint for images or free text arriving while a choice is pending.
pub const USE_BUTTONS_HINT: &str = "Please pick an option from the buttons above.";

/// Hint for non-image media.
pub const PHOTOS_ONLY_HINT: &str = "I can only work with photos. Send images as photos, please.";

/// Running-count reply after each received image.
pub fn image_count_reply(count: usize) -> String {
    format!("Image received! Total: {count}")
}

// ============================================================================
// Session
// ============================================================================

/// State of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Receiving images until a done signal.
    Collecting,
    /// Style options presented, waiting for a choice.
    ChoosingStyle,
    /// Quality options presented, waiting for the terminal choice.
    ChoosingQuality,
    /// Finished (delivered, failed, or cancelled); removed from the store.
    Terminal,
}

/// The per-user record tracking collected images and chosen options
/// across one conversation.
#[derive(Debug, Clone)]
pub struct Session {
    /// Opaque stable identifier of the requester.
    pub user_id: String,
    pub state: SessionState,
    /// Downloaded image files, in arrival order. Order defines page order.
    pub images: Vec<PathBuf>,
    /// Set exactly once, on the transition into ChoosingQuality.
    pub style: Option<Style>,
    /// Set exactly once, by the terminal trigger.
    pub quality: Option<Quality>,
}

impl Session {
    /// Create a fresh session in the Collecting state.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: SessionState::Collecting,
            images: Vec::new(),
            style: None,
            quality: None,
        }
    }
}

// ============================================================================
// Events and Actions
// ============================================================================

/// Inbound events driving the state machine.
#[derive(Debug, Clone)]
pub enum ConversationEvent {
    /// Start (or restart) a session.
    Start,
    /// An image was received and downloaded to `path`.
    ImageReceived { path: PathBuf },
    /// The user signalled they are done sending images.
    Done,
    /// A style button was pressed on message `message_id`.
    StyleChosen { style: Style, message_id: String },
    /// A quality button was pressed on message `message_id`. Terminal trigger.
    QualityChosen { quality: Quality, message_id: String },
    /// The user cancelled the session.
    Cancel,
}

/// Outbound effects requested by a transition, executed by the handler.
#[derive(Debug, Clone)]
pub enum Action {
    /// Send a plain text reply to the user.
    Reply(String),
    /// Send the style options keyboard.
    PresentStyleOptions,
    /// Edit message `message_id` into the quality options keyboard.
    PresentQualityOptions { message_id: String },
    /// Render the collected images and deliver the document, reporting
    /// progress and errors by editing message `message_id`.
    Render {
        images: Vec<PathBuf>,
        style: Style,
        quality: Quality,
        message_id: String,
    },
    /// Remove the user's transient files (partial downloads).
    DiscardFiles,
}

/// Result of a transition: the session to store (None if none existed and
/// none was created; `Terminal` state means removal) and the actions to run.
#[derive(Debug)]
pub struct Step {
    pub session: Option<Session>,
    pub actions: Vec<Action>,
}

impl Step {
    fn new(session: Option<Session>, actions: Vec<Action>) -> Self {
        Self { session, actions }
    }

    /// No state change, no actions. Used for stray and rejected events.
    fn ignore(session: Option<Session>) -> Self {
        Self {
            session,
            actions: Vec::new(),
        }
    }
}

// ============================================================================
// Transition Function
// ============================================================================

/// Advance the state machine for one inbound event.
///
/// Pure: performs no I/O and never panics. Illegal events are rejected with
/// no state change (empty action list), not assumed away.
pub fn transition(user_id: &str, session: Option<Session>, event: ConversationEvent) -> Step {
    match event {
        // A start event always yields a fresh session; any live one is
        // replaced and its partial downloads discarded.
        ConversationEvent::Start => {
            let mut actions = Vec::new();
            if session.is_some() {
                actions.push(Action::DiscardFiles);
            }
            actions.push(Action::Reply(WELCOME.to_string()));
            Step::new(Some(Session::new(user_id)), actions)
        }

        ConversationEvent::ImageReceived { path } => match session {
            Some(mut s) if s.state == SessionState::Collecting => {
                s.images.push(path);
                let count = s.images.len();
                Step::new(Some(s), vec![Action::Reply(image_count_reply(count))])
            }
            other => Step::ignore(other),
        },

        ConversationEvent::Done => match session {
            Some(s) if s.state == SessionState::Collecting && s.images.is_empty() => {
                Step::new(Some(s), vec![Action::Reply(NO_IMAGES_YET.to_string())])
            }
            Some(mut s) if s.state == SessionState::Collecting => {
                s.state = SessionState::ChoosingStyle;
                Step::new(Some(s), vec![Action::PresentStyleOptions])
            }
            other => Step::ignore(other),
        },

        ConversationEvent::StyleChosen { style, message_id } => match session {
            Some(mut s) if s.state == SessionState::ChoosingStyle => {
                s.style = Some(style);
                s.state = SessionState::ChoosingQuality;
                Step::new(Some(s), vec![Action::PresentQualityOptions { message_id }])
            }
            other => Step::ignore(other),
        },

        ConversationEvent::QualityChosen {
            quality,
            message_id,
        } => match session {
            Some(mut s) if s.state == SessionState::ChoosingQuality => {
                // Style is set on entry to ChoosingQuality; a missing one means
                // the session record was tampered with, so reject.
                let Some(style) = s.style else {
                    return Step::ignore(Some(s));
                };
                s.quality = Some(quality);
                s.state = SessionState::Terminal;
                let images = std::mem::take(&mut s.images);
                Step::new(
                    Some(s),
                    vec![Action::Render {
                        images,
                        style,
                        quality,
                        message_id,
                    }],
                )
            }
            other => Step::ignore(other),
        },

        ConversationEvent::Cancel => match session {
            Some(mut s) => {
                s.state = SessionState::Terminal;
                Step::new(
                    Some(s),
                    vec![
                        Action::DiscardFiles,
                        Action::Reply(CANCELLED.to_string()),
                    ],
                )
            }
            // Cancelling with nothing in flight still gets an acknowledgement.
            None => Step::new(None, vec![Action::Reply(CANCELLED.to_string())]),
        },
    }
}

// ============================================================================
// Image Intake Disposition
// ============================================================================

/// Whether an incoming image should be downloaded for this session.
///
/// The handler consults this before fetching so rejected images are never
/// written to the spool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageDisposition {
    /// Download to the given page index, then feed an ImageReceived event.
    Accept { index: usize },
    /// A session exists but is past Collecting.
    NotCollecting,
    /// No active session for this user.
    NoSession,
}

/// Decide what to do with an incoming image for the given session.
pub fn image_disposition(session: Option<&Session>) -> ImageDisposition {
    match session {
        Some(s) if s.state == SessionState::Collecting => ImageDisposition::Accept {
            index: s.images.len(),
        },
        Some(_) => ImageDisposition::NotCollecting,
        None => ImageDisposition::NoSession,
    }
}
