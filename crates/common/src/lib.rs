//! Shared types for the GitHub repository proxy workspace

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
