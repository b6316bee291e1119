//! # devdroid-core - Core Types
//!
//! Foundation crate for devdroid. Provides error handling and logging setup.
//!
//! This crate has **zero internal dependencies** -- it only depends on external
//! crates (thiserror, tracing).
//!
//! ## Public API
//!
//! ### Error Handling (`error`)
//! - [`Error`] - Custom error enum with `fatal` classification and remediation hints
//! - [`Result`] - Type alias for `std::result::Result<T, Error>`
//! - [`ResultExt`] - Extension trait for adding error context
//!
//! ### Logging (`logging`)
//! - [`logging::init()`] - Console + rolling file logging via tracing

pub mod error;
pub mod logging;
pub mod prelude;

pub use error::{Error, Result, ResultExt};
