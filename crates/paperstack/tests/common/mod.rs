//! Common test utilities.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tokio::sync::mpsc;

use paperstack::fetch::{FetchError, ImageFetcher};
use paperstack::gateway::{
    CallbackQueryData, ConversationHandler, GatewayCommand, GatewayEvent, GatewayManager,
    MessageContent, MessageReceivedData, Sender,
};
use paperstack::session::InMemorySessionStore;
use paperstack::spool::Spool;

/// Fetcher that copies local files; the "URL" is a filesystem path.
pub struct LocalFetcher;

#[async_trait]
impl ImageFetcher for LocalFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<(), FetchError> {
        tokio::fs::copy(url, dest)
            .await
            .map_err(|source| FetchError::Io {
                path: dest.to_path_buf(),
                source,
            })?;
        Ok(())
    }
}

/// A bot wired to a fake gateway: events go in via `evt_tx`, the commands the
/// bot would send to the platform come out of `cmd_rx`.
pub struct TestBot {
    pub store: InMemorySessionStore,
    pub spool_dir: TempDir,
    pub cmd_rx: mpsc::Receiver<GatewayCommand>,
    pub evt_tx: mpsc::Sender<GatewayEvent>,
}

/// Create a bot with an in-memory store, a temp spool, and a registered
/// fake gateway named "telegram".
pub async fn test_bot() -> TestBot {
    let spool_dir = TempDir::new().unwrap();
    let store = InMemorySessionStore::new();
    let manager = GatewayManager::new(Duration::from_secs(10));

    let handler = ConversationHandler::new(
        Arc::new(store.clone()),
        manager.clone(),
        Spool::new(spool_dir.path()),
        Arc::new(LocalFetcher),
    );
    manager.set_handler(Arc::new(handler)).await;

    let (cmd_rx, evt_tx) = manager.register("telegram", vec![]).await;

    TestBot {
        store,
        spool_dir,
        cmd_rx,
        evt_tx,
    }
}

impl TestBot {
    pub async fn send_text(&self, user: &str, text: &str) {
        let event = GatewayEvent::MessageReceived(Box::new(MessageReceivedData {
            message_id: "1".to_string(),
            chat_id: user.to_string(),
            sender: sender(user),
            content: MessageContent::Text {
                text: text.to_string(),
            },
            timestamp: None,
        }));
        self.evt_tx.send(event).await.unwrap();
    }

    pub async fn send_photo(&self, user: &str, source: &Path) {
        let event = GatewayEvent::MessageReceived(Box::new(MessageReceivedData {
            message_id: "2".to_string(),
            chat_id: user.to_string(),
            sender: sender(user),
            content: MessageContent::Media {
                media_type: "image".to_string(),
                url: Some(source.to_string_lossy().into_owned()),
                caption: None,
            },
            timestamp: None,
        }));
        self.evt_tx.send(event).await.unwrap();
    }

    pub async fn press_button(&self, user: &str, message_id: &str, data: &str) {
        let event = GatewayEvent::CallbackQuery(Box::new(CallbackQueryData {
            callback_query_id: format!("cq-{user}-{data}"),
            chat_id: user.to_string(),
            sender: sender(user),
            message_id: message_id.to_string(),
            data: data.to_string(),
        }));
        self.evt_tx.send(event).await.unwrap();
    }

    /// Receive the next command the bot issued, failing the test on timeout.
    pub async fn next_command(&mut self) -> GatewayCommand {
        tokio::time::timeout(Duration::from_secs(10), self.cmd_rx.recv())
            .await
            .expect("timed out waiting for a gateway command")
            .expect("gateway command channel closed")
    }

    /// Receive the next command and assert it is a plain text reply.
    pub async fn expect_reply(&mut self) -> String {
        match self.next_command().await {
            GatewayCommand::SendMessage { content, .. } => content,
            other => panic!("expected SendMessage, got {other:?}"),
        }
    }
}

fn sender(user: &str) -> Sender {
    Sender {
        id: user.to_string(),
        username: None,
        display_name: None,
    }
}

/// Write a small solid-color JPEG and return its path.
pub fn write_sample_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbImage::from_pixel(width, height, image::Rgb([90, 120, 150]))
        .save(&path)
        .unwrap();
    path
}
