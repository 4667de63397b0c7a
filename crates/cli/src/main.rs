use clap::Parser;
use ggtool_cli::{run, Cli};

fn main() {
    let cli = Cli::parse();
    let severity = run(cli);
    std::process::exit(severity as i32);
}
