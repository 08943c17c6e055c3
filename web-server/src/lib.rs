// web-server/src/lib.rs
pub mod api;
pub mod error;
pub mod issuer;
pub mod middleware;
pub mod platform;
pub mod user_directory;
pub mod utils;
