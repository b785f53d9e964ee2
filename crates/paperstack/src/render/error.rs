//! Error type for the rendering pipeline.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning collected images into a document.
///
/// All collaborator failures (decode, transform, assembly) surface here and
/// are converted to user-facing text at the handler boundary; they never
/// escape to the process level.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Rendering was requested with an empty image list.
    #[error("no images to render")]
    NoPages,

    /// An input image could not be read or decoded.
    #[error("failed to read image {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A processed page could not be encoded.
    #[error("failed to encode page: {0}")]
    Encode(#[source] image::ImageError),

    /// The document could not be assembled from the encoded pages.
    #[error("failed to assemble document: {0}")]
    Assembly(String),
}
