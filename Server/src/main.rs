use anyhow::Context;
use clap::Parser;
use tracing::info;

use parlor_server::args::Args;
use parlor_server::persistence::Persistence;
use parlor_server::server::{self, Shutdown};
use parlor_server::state::State;
use parlor_server::{console, logger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(&args.log_filter, args.log_file())?;

    let (state, status) = State::load(Persistence::new(&args.data_file)).await;
    info!("snapshot {}: {status:?}", args.data_file.display());
    let state = state.into_shared();

    let listener = server::bind(&args.bind).await?;

    let shutdown = Shutdown::new();
    let on_ctrlc = shutdown.clone();
    ctrlc::set_handler(move || on_ctrlc.trigger()).context("cannot install Ctrl-C handler")?;

    if !args.no_console {
        console::spawn(state.clone(), shutdown.clone(), tokio::runtime::Handle::current());
    }

    server::run(listener, state, shutdown).await
}
