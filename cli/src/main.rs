//! zenindex CLI — inspect indexer configuration defaults.
//!
//! Usage:
//! ```bash
//! zenindex info
//! zenindex version
//! ```

use std::env;
use std::process;

use zenindex_core::schema::SCHEMA_VERSION;
use zenindex_core::store::DEFAULT_MAX_OPEN_FILES;
use zenindex_node::{Network, NodeConfig};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "info" => cmd_info(),
        "version" | "--version" | "-V" => {
            println!("zenindex {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
}

fn print_usage() {
    println!("zenindex {}", env!("CARGO_PKG_VERSION"));
    println!("Chain-indexing daemon for a Zen/Bitcoin full node\n");
    println!("USAGE:");
    println!("    zenindex <COMMAND>\n");
    println!("COMMANDS:");
    println!("    info     Show indexer configuration info");
    println!("    version  Print version");
    println!("    help     Print this help");
}

fn cmd_info() {
    println!("zenindex v{}", env!("CARGO_PKG_VERSION"));
    println!("  Schema version: {SCHEMA_VERSION}");
    println!("  Default max open files: {DEFAULT_MAX_OPEN_FILES}");
    println!("  Upstream retry: 3 attempts, 60s apart");
    println!("  Database paths (per network):");
    for network in [Network::Livenet, Network::Testnet, Network::Regtest] {
        let mut config = NodeConfig::new("<datadir>");
        config.network = network;
        println!("    {network:<8} {}", config.db_path().display());
    }
}
