//! Centralized error handling for the avatar proxy
//!
//! Two families of errors live here with deliberately different policies:
//!
//! - [`AppError`] is surfaced to callers as an HTTP failure. Only the
//!   authenticated refresh path and the proxy-letter configuration gate use it.
//! - [`ResolveError`] is absorbed: anything that goes wrong while resolving a
//!   public avatar request degrades to the blank placeholder with HTTP 200.
//!   Avatar serving is a high-volume, low-trust surface; malformed or stale
//!   requests must never reach an expensive error path.

pub mod types;

pub use types::*;

/// Convenience type alias for Results using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Convenience type alias for resolution Results
pub type ResolveResult<T> = Result<T, ResolveError>;
