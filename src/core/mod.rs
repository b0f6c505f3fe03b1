pub mod apdu;
pub mod clock;
pub mod commands;
pub mod config;
pub mod error;
pub mod reader;
pub mod session;
pub mod utils;
