pub mod chat;
pub mod config;
pub mod error;
pub mod identity;
pub mod posts;
pub mod render;
pub mod server;
pub mod storage;
