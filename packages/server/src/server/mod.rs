// HTTP server setup (Axum REST + websocket + webhooks)
pub mod app;
pub mod error;
pub mod middleware;
pub mod routes;

pub use app::*;
pub use error::ApiError;
