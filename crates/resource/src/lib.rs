//! Asset sources for the quire engine loader.
//!
//! This crate provides platform-specific implementations of the
//! `AssetSource` trait from quire-traits, plus the URL helpers the loader
//! uses to tag every fetch with the build version.
//!
//! ## Available Sources
//!
//! - [`FilesystemAssetSource`]: Loads assets from a local directory
//!
//! ## Re-exports
//!
//! - [`InMemoryAssetSource`]: Pre-populated in-memory storage

mod filesystem;
mod url;

pub use filesystem::FilesystemAssetSource;
pub use url::{BUILD_PARAM, encode_component, with_build};

pub use quire_traits::InMemoryAssetSource;
