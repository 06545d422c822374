pub mod chat_service;
pub mod chat_store;
pub mod config;
pub mod message;
