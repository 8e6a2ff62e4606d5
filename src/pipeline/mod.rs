pub mod dedup;
pub mod health;
pub mod orchestrator;
pub mod resolver;
pub mod rotation;
