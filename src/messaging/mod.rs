pub mod client;
pub mod feed;
pub mod router;
pub mod topics;
#[cfg(test)]
mod tests;

pub use client::{ClientMessage, ClientTransport, SessionId, Toast, ToastIcon};
pub use feed::UpstreamFeed;
pub use router::Router;
