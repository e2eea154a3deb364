use clap::Parser;
use scizor::cli::{run, Cli};

fn main() -> std::process::ExitCode {
    run(Cli::parse())
}
