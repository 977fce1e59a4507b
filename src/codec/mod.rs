//! Record encoding.
//!
//! Turns weather records into dense byte strings and back:
//! - fixed-width wire types and value transforms
//! - field definitions, per-hardware field tables and field-id masks
//! - the record codec working on an explicit field selection

mod field;
mod primitives;
mod record;
mod tables;
mod value;

pub use field::*;
pub use primitives::*;
pub use record::*;
pub use tables::*;
pub use value::*;
