pub mod config;
pub mod errors;
pub mod fetch;
pub mod models;
pub mod naming;
pub mod observability;
pub mod output;
pub mod services;
pub mod sources;
pub mod streaming;
pub mod utils;
