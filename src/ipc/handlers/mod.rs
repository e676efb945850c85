pub mod attendance;
pub mod classes;
pub mod core;
pub mod ranking;
pub mod reports;
pub mod scores;
pub mod setup;
pub mod students;
