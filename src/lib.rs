//! Face registration and recognition service.
//!
//! Browser clients post base64 photos; faces are encoded into signatures,
//! registered under a name in a persisted gallery, and later matched against
//! every identity's stored samples.

pub mod api;
pub mod archive;
pub mod config;
pub mod error;
pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod models;
