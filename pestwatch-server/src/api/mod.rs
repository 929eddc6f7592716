//! HTTP API handlers for pestwatch-server

pub mod counts;
pub mod detect;
pub mod error;
pub mod health;

pub use counts::counts;
pub use detect::detect;
pub use error::ApiError;
pub use health::health_routes;
