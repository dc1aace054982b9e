use clap::Parser;

mod analysis;
mod cli;

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:?}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    cli::handle_command(cli::Cli::parse())
}
