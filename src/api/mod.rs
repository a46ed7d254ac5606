//! Operational HTTP endpoints

pub mod errors;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod types;

pub use server::ApiServer;
pub use types::ApiState;
