// Start of file: src/main.rs

use clap::Parser;
use tokio::runtime::{Builder, Runtime};

use flow_results::config::environment::EnvironmentVariables;
use flow_results::core::{cli::{self, Cli}, logging};

fn main() -> anyhow::Result<()> {
    let cli: Cli = Cli::parse();

    // set up logging before the configuration so its warnings are visible
    logging::init_tracing();

    let env: &'static EnvironmentVariables = EnvironmentVariables::instance()?;

    let mut builder: Builder = Builder::new_multi_thread();
    builder.enable_all();
    if let Some(worker_threads) = env.worker_threads.filter(|n| *n > 0) {
        builder.worker_threads(worker_threads);
    }
    let runtime: Runtime = builder.build()?;

    runtime.block_on(cli::run(cli.command(), env))
}

// End of file: src/main.rs
