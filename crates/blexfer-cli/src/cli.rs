//! Command-line interface definitions and parsing

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Index of the Bluetooth adapter to use
    #[arg(short, long)]
    pub adapter: Option<usize>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan for a peripheral and print every message it sends
    Central {
        /// Exit after the first complete message
        #[arg(long)]
        once: bool,
    },
    /// Advertise the transfer service and send a message to each subscriber
    Peripheral {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Local name to advertise
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Run both roles in memory and print the received message
    Loopback {
        /// Message to send
        #[arg(short, long)]
        message: String,
        /// Notifications buffered before sends are refused
        #[arg(short, long, default_value_t = 4)]
        queue_depth: usize,
    },
}
