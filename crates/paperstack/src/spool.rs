//! Transient file spool for in-flight sessions.
//!
//! Each active user gets one subdirectory under the spool root holding their
//! downloaded images. Directories are removed unconditionally when a session
//! ends, whether by delivery, rendering failure, or cancellation.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs;

/// Per-user transient storage, namespaced by user id.
#[derive(Debug, Clone)]
pub struct Spool {
    root: PathBuf,
}

impl Spool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding a user's downloaded images.
    pub fn user_dir(&self, user_id: &str) -> PathBuf {
        self.root.join(sanitize(user_id))
    }

    /// Path for the image at the given page index.
    pub fn image_path(&self, user_id: &str, index: usize) -> PathBuf {
        self.user_dir(user_id).join(format!("{index}.jpg"))
    }

    /// Filename for a user's generated document.
    pub fn document_name(&self, user_id: &str) -> String {
        format!("{}_output.pdf", sanitize(user_id))
    }

    /// Create the user's directory if it does not exist yet.
    pub async fn ensure_user_dir(&self, user_id: &str) -> io::Result<PathBuf> {
        let dir = self.user_dir(user_id);
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// Remove a user's directory and everything in it. Missing directories
    /// are fine; cleanup must be idempotent.
    pub async fn remove_user(&self, user_id: &str) -> io::Result<()> {
        match fs::remove_dir_all(self.user_dir(user_id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Restrict a user id to filesystem-safe characters so spool paths can never
/// escape their per-user namespace.
fn sanitize(user_id: &str) -> String {
    user_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn user_dirs_are_namespaced_and_removable() {
        let tmp = TempDir::new().unwrap();
        let spool = Spool::new(tmp.path());

        let dir = spool.ensure_user_dir("123").await.unwrap();
        assert!(dir.ends_with("123"));
        fs::write(spool.image_path("123", 0), b"jpeg").await.unwrap();
        assert!(spool.image_path("123", 0).exists());

        spool.remove_user("123").await.unwrap();
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let spool = Spool::new(tmp.path());

        spool.remove_user("nobody").await.unwrap();
        spool.remove_user("nobody").await.unwrap();
    }

    #[test]
    fn image_paths_are_indexed() {
        let spool = Spool::new("/var/spool/paperstack");
        assert_eq!(
            spool.image_path("42", 3),
            PathBuf::from("/var/spool/paperstack/42/3.jpg")
        );
    }

    #[test]
    fn hostile_user_ids_cannot_escape_the_spool() {
        let spool = Spool::new("/var/spool/paperstack");
        let dir = spool.user_dir("../../etc");
        assert!(dir.starts_with("/var/spool/paperstack"));
        assert_eq!(dir, PathBuf::from("/var/spool/paperstack/______etc"));
    }

    #[test]
    fn document_name_follows_user_id() {
        let spool = Spool::new("/tmp");
        assert_eq!(spool.document_name("42"), "42_output.pdf");
    }
}
