//! Core weather-push definitions.
//!
//! Protocol constants, the error taxonomy, hardware classes and the
//! collaborator traits the client talks to. Always compiled.

mod constants;
mod error;
mod hardware;
mod traits;

pub use constants::*;
pub use error::*;
pub use hardware::*;
pub use traits::*;
