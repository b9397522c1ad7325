// Start of file: /src/utils/mod.rs

/*
    * Re-exports for the shared request plumbing: error taxonomy, response
    * middleware, validation trees, cursor pagination and body helpers.
*/

pub mod error_handler;
pub mod pagination;
pub mod response_handler;
pub mod utils;
pub mod validation;

// End of file: /src/utils/mod.rs
