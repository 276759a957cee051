//! Client-side synchronization of bound remote projects with composable,
//! cancelable progress reporting.

pub mod config;
pub mod error;
pub mod logging;
pub mod progress;
pub mod sync;

pub use error::{Error, Result};
