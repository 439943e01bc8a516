//! Flint Core
//!
//! Shared foundation types for the Flint bytecode toolchain: source
//! locations, the two-class compile error model, and code/feature flags.
//!
//! ## Modules
//!
//! - [`location`]: Source ranges attached to instructions and errors
//! - [`error`]: User-facing vs internal/fatal error types
//! - [`flags`]: Code object flags and caller-supplied feature flags

pub mod error;
pub mod flags;
pub mod location;

pub use error::{CompileError, InternalError};
pub use flags::{CodeFlags, FeatureFlags};
pub use location::{NO_LOCATION, SrcLocation};
