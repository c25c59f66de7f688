//! Core types, calendar helpers, and errors for the market sync engine.

pub mod coin;
pub mod dates;
pub mod error;
pub mod record;
pub mod task;

pub use coin::*;
pub use dates::*;
pub use error::{Error, Result};
pub use record::*;
pub use task::*;
