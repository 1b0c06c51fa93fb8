pub mod generator;
pub mod orchestrator;
pub mod sql_guard;
