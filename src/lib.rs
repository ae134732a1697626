pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod messaging;
pub mod status;

// Re-export main components for easier use
pub use error::Error;
pub use messaging::{ClientTransport, Router};
