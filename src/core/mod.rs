pub mod chat_stream;
pub mod classifier;
pub mod config;
pub mod context;
pub mod diversity;
pub mod emotion;
pub mod error;
pub mod message;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod quotes;
pub mod session;
pub mod storage;
pub mod transfer;
