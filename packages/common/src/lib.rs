//! # Folio Common
//!
//! Pieces shared by every Folio package: error classification and the
//! explicit event plumbing (`Emitter`, `Observable`) that components compose
//! instead of inheriting behavior.

pub mod emitter;
pub mod error;
pub mod observable;

pub use emitter::*;
pub use error::*;
pub use observable::*;
