//! End-to-end conversation tests over the gateway channel plumbing.
//!
//! Events are injected the way a gateway would deliver them; assertions run
//! against the commands the bot sends back and the observable session state.

mod common;

use base64::Engine as _;
use lopdf::{Document, Object};
use tempfile::TempDir;

use paperstack::gateway::GatewayCommand;
use paperstack::session::{self, SessionState, SessionStore};

use common::{test_bot, write_sample_image};

// ============================================================================
// Helpers
// ============================================================================

fn pdf_bytes(command: GatewayCommand) -> Vec<u8> {
    match command {
        GatewayCommand::SendMedia {
            media: paperstack::gateway::MediaPayload::Base64 {
                data, mime_type, ..
            },
            ..
        } => {
            assert_eq!(mime_type, "application/pdf");
            base64::engine::general_purpose::STANDARD
                .decode(data)
                .unwrap()
        }
        other => panic!("expected SendMedia, got {other:?}"),
    }
}

fn page_widths(bytes: &[u8]) -> Vec<f32> {
    let doc = Document::load_mem(bytes).unwrap();
    doc.get_pages()
        .into_values()
        .map(|page_id| {
            let page = doc.get_object(page_id).unwrap().as_dict().unwrap();
            let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
            match &media_box[2] {
                Object::Integer(v) => *v as f32,
                Object::Real(v) => *v,
                other => panic!("unexpected MediaBox entry {other:?}"),
            }
        })
        .collect()
}

// ============================================================================
// Full Flow
// ============================================================================

#[tokio::test]
async fn full_flow_delivers_pdf_with_pages_in_order() {
    let mut bot = test_bot().await;
    let sources = TempDir::new().unwrap();

    // Distinct widths let the page order be observed in the output.
    let images = [
        write_sample_image(sources.path(), "a.jpg", 10, 8),
        write_sample_image(sources.path(), "b.jpg", 20, 8),
        write_sample_image(sources.path(), "c.jpg", 30, 8),
    ];

    bot.send_text("u1", "/start").await;
    assert_eq!(bot.expect_reply().await, session::WELCOME);

    for (i, image) in images.iter().enumerate() {
        bot.send_photo("u1", image).await;
        assert_eq!(bot.expect_reply().await, session::image_count_reply(i + 1));
    }

    bot.send_text("u1", "/done").await;
    match bot.next_command().await {
        GatewayCommand::SendMessage {
            content,
            inline_keyboard: Some(keyboard),
            ..
        } => {
            assert_eq!(content, "Choose image style:");
            assert_eq!(keyboard.rows.len(), 4);
        }
        other => panic!("expected the style keyboard, got {other:?}"),
    }

    bot.press_button("u1", "100", "style:original").await;
    match bot.next_command().await {
        GatewayCommand::EditMessage {
            message_id,
            content,
            inline_keyboard: Some(keyboard),
            ..
        } => {
            assert_eq!(message_id, "100");
            assert_eq!(content, "Select PDF quality:");
            assert_eq!(keyboard.rows.len(), 3);
        }
        other => panic!("expected the quality keyboard, got {other:?}"),
    }
    match bot.next_command().await {
        GatewayCommand::AnswerCallbackQuery { text: None, .. } => {}
        other => panic!("expected a silent callback answer, got {other:?}"),
    }

    bot.press_button("u1", "100", "quality:high").await;
    match bot.next_command().await {
        GatewayCommand::EditMessage { content, .. } => {
            assert_eq!(content, "Generating your PDF...");
        }
        other => panic!("expected the progress edit, got {other:?}"),
    }
    assert!(matches!(
        bot.next_command().await,
        GatewayCommand::SendTyping { .. }
    ));

    let bytes = pdf_bytes(bot.next_command().await);
    assert_eq!(page_widths(&bytes), vec![10.0, 20.0, 30.0]);

    assert!(matches!(
        bot.next_command().await,
        GatewayCommand::AnswerCallbackQuery { text: None, .. }
    ));

    // Session and transient files are gone after delivery.
    assert!(bot.store.get("u1").is_none());
    assert!(!bot.spool_dir.path().join("u1").exists());
}

// ============================================================================
// Guards and Cancellation
// ============================================================================

#[tokio::test]
async fn done_with_no_images_stays_in_collecting() {
    let mut bot = test_bot().await;

    bot.send_text("u1", "/start").await;
    assert_eq!(bot.expect_reply().await, session::WELCOME);

    bot.send_text("u1", "/done").await;
    assert_eq!(bot.expect_reply().await, session::NO_IMAGES_YET);

    assert_eq!(bot.store.get("u1").unwrap().state, SessionState::Collecting);
}

#[tokio::test]
async fn cancel_removes_session_and_transient_files() {
    let mut bot = test_bot().await;
    let sources = TempDir::new().unwrap();
    let image = write_sample_image(sources.path(), "a.jpg", 12, 12);

    bot.send_text("u1", "/start").await;
    bot.expect_reply().await;
    bot.send_photo("u1", &image).await;
    bot.expect_reply().await;
    assert!(bot.spool_dir.path().join("u1").exists());

    bot.send_text("u1", "/cancel").await;
    assert_eq!(bot.expect_reply().await, session::CANCELLED);

    assert!(bot.store.get("u1").is_none());
    assert!(!bot.spool_dir.path().join("u1").exists());
}

#[tokio::test]
async fn stray_callback_is_answered_without_state_change() {
    let mut bot = test_bot().await;

    bot.press_button("ghost", "5", "quality:high").await;

    match bot.next_command().await {
        GatewayCommand::AnswerCallbackQuery {
            text: Some(text), ..
        } => assert_eq!(text, "No active session"),
        other => panic!("expected a toast answer, got {other:?}"),
    }
    assert!(bot.store.is_empty());
}

// ============================================================================
// Failure Path
// ============================================================================

#[tokio::test]
async fn rendering_failure_is_reported_and_cleaned_up() {
    let mut bot = test_bot().await;
    let sources = TempDir::new().unwrap();

    // Not an image; decoding will fail at render time.
    let broken = sources.path().join("broken.jpg");
    std::fs::write(&broken, b"definitely not a jpeg").unwrap();

    bot.send_text("u1", "/start").await;
    bot.expect_reply().await;
    bot.send_photo("u1", &broken).await;
    bot.expect_reply().await;
    bot.send_text("u1", "/done").await;
    bot.next_command().await; // style keyboard

    bot.press_button("u1", "100", "style:grayscale").await;
    bot.next_command().await; // quality keyboard
    bot.next_command().await; // callback answer

    bot.press_button("u1", "100", "quality:low").await;
    bot.next_command().await; // progress edit
    bot.next_command().await; // typing

    match bot.next_command().await {
        GatewayCommand::EditMessage { content, .. } => {
            assert!(
                content.starts_with("Error generating PDF:"),
                "unexpected error text: {content}"
            );
            // User-facing text, not a debug dump.
            assert!(!content.contains("RenderError"));
        }
        other => panic!("expected the error edit, got {other:?}"),
    }

    assert!(matches!(
        bot.next_command().await,
        GatewayCommand::AnswerCallbackQuery { .. }
    ));

    // The failed session leaks neither record nor files.
    assert!(bot.store.get("u1").is_none());
    assert!(!bot.spool_dir.path().join("u1").exists());
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test]
async fn concurrent_users_do_not_observe_each_other() {
    let mut bot = test_bot().await;
    let sources = TempDir::new().unwrap();
    let image = write_sample_image(sources.path(), "a.jpg", 12, 12);

    bot.send_text("alice", "/start").await;
    bot.expect_reply().await;
    bot.send_text("bob", "/start").await;
    bot.expect_reply().await;

    bot.send_photo("alice", &image).await;
    bot.expect_reply().await;
    bot.send_photo("bob", &image).await;
    bot.expect_reply().await;
    bot.send_photo("bob", &image).await;
    bot.expect_reply().await;

    let alice = bot.store.get("alice").unwrap();
    let bob = bot.store.get("bob").unwrap();
    assert_eq!(alice.images.len(), 1);
    assert_eq!(bob.images.len(), 2);
    assert!(alice.images[0].starts_with(bot.spool_dir.path().join("alice")));
    assert!(bob.images.iter().all(|p| p.starts_with(bot.spool_dir.path().join("bob"))));

    // Cancelling one leaves the other untouched.
    bot.send_text("alice", "/cancel").await;
    bot.expect_reply().await;
    assert!(bot.store.get("alice").is_none());
    assert_eq!(bot.store.get("bob").unwrap().images.len(), 2);
}
