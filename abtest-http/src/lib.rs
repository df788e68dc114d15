pub mod handlers;
pub mod server;

pub use server::{build_router, serve, ServerConfig};
