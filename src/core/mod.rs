// Start of file: /src/core/mod.rs

/*
    * Process plumbing: tracing setup, the HTTP server and the management CLI.
*/

pub mod cli;
pub mod logging;
pub mod server;

// End of file: /src/core/mod.rs
