use std::net::SocketAddr;

use clap::{Parser, Subcommand};

/// keygate — human-approved release of a protected secret
#[derive(Parser)]
#[command(name = "keygate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the broker (the default when no subcommand is given)
    Serve {
        /// Address to bind; overrides KEYGATE_BIND_ADDRESS
        #[arg(short, long)]
        bind: Option<SocketAddr>,
    },

    /// Print a random hex string suitable for a role secret
    GenSecret {
        /// Number of random bytes
        #[arg(long, default_value = "32", value_parser = clap::value_parser!(u16).range(16..=1024))]
        bytes: u16,
    },
}
