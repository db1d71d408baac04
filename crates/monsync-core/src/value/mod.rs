//! Declared-value and change-request primitives
//!
//! - [`Field`]: one declared attribute, Absent / Null / Known
//! - [`Patch`]: one entry of a sparse update request, Unchanged / Clear / Set
//! - [`UpdateRequest`]: a serializable bundle of patches
//! - [`Secret`]: a write-only value kept out of logs

pub mod field;
pub mod patch;
pub mod secret;

pub use field::{Field, Populated};
pub use patch::{Clearable, NoUpdate, Patch, UpdateRequest};
pub use secret::Secret;
