pub mod app;
pub mod bench;
pub mod chat;
pub mod config;
pub mod error;
pub mod fc;
pub mod observability;
pub mod protocol;
pub mod stream;
pub mod transport;
