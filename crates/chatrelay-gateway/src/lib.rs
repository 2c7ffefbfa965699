pub mod api;
pub mod auth;
pub mod error;
pub mod router;
pub mod server;
pub mod state;

pub use server::GatewayServer;
