pub mod aggregate;
pub mod connection;
pub mod proto;

pub use aggregate::{aggregate_logs, aggregate_status, process_status_reply, MicroserviceStatus};
pub use connection::{StatusConnection, StatusConnector, StatusError, ZmqStatusConnector};
