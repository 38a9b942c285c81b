pub mod groups;
pub mod matches;
pub mod season;
