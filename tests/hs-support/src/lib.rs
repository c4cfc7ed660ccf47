//! Utilities to support tests.

#[macro_use]
pub mod assert;

pub mod fake;
pub mod handler;
pub mod mock;
pub mod prelude;

pub use hsession;
