//! Quarry CLI binary.

use std::io::Write;
use std::process;

use clap::Parser;
use env_logger::Builder;

use quarry::cli::args::QuarryArgs;
use quarry::cli::commands::execute_command;

fn main() {
    let args = QuarryArgs::parse();

    // RUST_LOG still wins for per-module filters
    Builder::new()
        .filter_level(args.log_level())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()))
        .parse_default_env()
        .init();

    if let Err(e) = execute_command(args) {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}
