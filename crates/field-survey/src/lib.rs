//! Survey definition, audio-backed response intake, and quality review for field teams.

pub mod config;
pub mod error;
pub mod surveys;
pub mod telemetry;
