//! Core data models for the season engine.

mod group;
mod ids;
mod match_record;
mod ranking;
mod season;

pub use group::*;
pub use ids::*;
pub use match_record::*;
pub use ranking::*;
pub use season::*;
