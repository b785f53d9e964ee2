//! Paperstack - a Telegram bot that collects photo batches, applies an image
//! style, and returns them as a single PDF.

pub mod config;
pub mod fetch;
pub mod gateway;
pub mod render;
pub mod session;
pub mod spool;
