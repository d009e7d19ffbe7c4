//! Protocol types for adgate
//!
//! This crate defines the types shared between the core, its collaborators
//! and the service front end:
//! - Slot and gate state types
//! - The server policy payload
//! - Commands and responses (line-delimited JSON)
//! - Events (service -> host)

mod commands;
mod events;
mod policy;
mod types;

pub use commands::*;
pub use events::*;
pub use policy::*;
pub use types::*;

/// Current API version
pub const API_VERSION: u32 = 1;
