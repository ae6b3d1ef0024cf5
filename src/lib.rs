pub mod channel;
pub mod client;
pub mod config;
pub mod errors;
pub mod events;
pub mod protocol;
pub mod transport;
mod utils;

pub use client::{Client, RequestError, State};
pub use config::Config;
