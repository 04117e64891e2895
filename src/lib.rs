pub mod config;
pub mod error;
pub mod host;
pub mod listener;
pub mod messages;
pub mod parser;
pub mod reporter;
pub mod socket;
