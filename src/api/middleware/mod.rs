pub mod allowed_hosts;
pub mod auth;

pub use allowed_hosts::validate_host;
pub use auth::{authenticate, UserContext};
