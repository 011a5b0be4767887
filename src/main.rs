mod actions;
mod cli;
mod config;
mod gestures;
mod input;
mod ipc;
mod landmarks;
mod logging;
mod state;
mod tracker;

fn main() -> anyhow::Result<()> {
    logging::init();
    cli::run()
}
