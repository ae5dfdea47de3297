//! Subsystems built on the core: the agent registry, telemetry writers,
//! aggregation views, health scoring, retention and audit queries.

pub mod agents;
pub mod audit;
pub mod evolution;
pub mod health;
pub mod retention;
pub mod telemetry;
pub mod views;
