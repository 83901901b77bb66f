//! # mathviz-error
//!
//! Unified error handling for the mathviz workspace.
//!
//! ## Design Philosophy
//!
//! - **ErrorKind**: Know what error occurred (e.g., DuplicateElement, RenderTimeout)
//! - **ErrorStatus**: Decide how to handle it (Permanent, Temporary, Persistent)
//! - **Error Context**: Assist in locating the cause with rich context
//! - **Error Source**: Wrap underlying errors without leaking raw types
//!
//! ## Usage
//!
//! ```rust
//! use mathviz_error::{Error, ErrorKind};
//!
//! fn example() -> Result<(), Error> {
//!     Err(Error::new(ErrorKind::ElementNotFound, "element 'title' is not on screen")
//!         .with_operation("builder::animate_property")
//!         .with_context("element", "title"))
//! }
//! ```
//!
//! ## Principles
//!
//! - All fallible functions return `Result<T, mathviz_error::Error>`
//! - External errors are wrapped with `set_source(err)`
//! - Same error handled once, subsequent ops only append context
//! - Expected outcomes (full zones, unsafe transforms) are values, not errors

mod error;
mod kind;
mod status;

pub use error::Error;
pub use kind::ErrorKind;
pub use status::ErrorStatus;

/// Result type alias using the mathviz Error
pub type Result<T> = std::result::Result<T, Error>;
