pub mod calls;
pub mod client;
pub mod config;
pub mod delivery;
pub mod frames;
pub mod handlers;
pub mod media;
pub mod test_utils;
pub mod transport;
pub mod types;

pub use client::Client;
pub use config::ClientConfig;
pub use frames::Frame;
