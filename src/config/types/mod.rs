//! Configuration utility types.
//!
//! | Module   | Purpose                     |
//! |----------|-----------------------------|
//! | `error`  | Configuration error types   |

mod error;

pub use error::ConfigError;
