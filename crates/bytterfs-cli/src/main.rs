//! bytterfs CLI
//!
//! Replicates read-only btrfs snapshots from a local source to a remote
//! destination over ssh, one run per invocation.

use clap::Parser;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "bytterfs")]
#[command(about = "bytterfs - btrfs snapshot replication over ssh", long_about = None)]
struct Cli {
    #[command(flatten)]
    backup: commands::backup::BackupCommand,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = commands::backup::execute(cli.backup) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
