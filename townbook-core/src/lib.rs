//! Domain rules for TownBook that don't depend on storage or transport.

mod config;
mod projection;
mod schedule;
mod status;

pub use config::*;
pub use projection::*;
pub use schedule::*;
pub use status::*;
