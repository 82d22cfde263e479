use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "rentchat", about = "Booking chat client for the car-rental marketplace")]
pub struct Cli {
    /// Path to config file (default: ./config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Open the chat for one of your bookings
    Open { booking_id: i64 },
    /// Show the unread message count for a booking
    Unread { booking_id: i64 },
    /// Store your marketplace API token on this machine
    Login {
        /// Your marketplace user id
        #[arg(long)]
        user_id: i64,
    },
    /// Remove the stored token
    Logout,
}
