//! LINE webhook relay: verifies webhook deliveries, stores text message events as JSON blobs
//! in time-partitioned paths, and acknowledges each message through the reply API.

pub mod channels;
pub mod clock;
pub mod config;
pub mod gateway;
pub mod init;
pub mod storage;
