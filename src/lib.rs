pub mod config;
pub mod database;
pub mod epg;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod repositories;
pub mod sources;
pub mod status;
pub mod utils;
