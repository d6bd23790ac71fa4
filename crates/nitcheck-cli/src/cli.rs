use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nitcheck")]
#[command(about = "NitCheck operations CLI — clinic directory sync and server checks")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sync the clinic directory from the partner sheet CSV
    SyncClinics(SyncArgs),
    /// Check a running server's health and scan provider status
    Status(StatusArgs),
}

#[derive(Args)]
pub struct SyncArgs {
    /// CSV export URL of the partner sheet (defaults to the published sheet)
    #[arg(long, env = "CLINICS_CSV_URL")]
    pub csv_url: Option<String>,

    /// Output directory for clinics.uk.json / clinics.us.json
    #[arg(long, default_value = "content")]
    pub content_dir: PathBuf,

    /// Validate without writing files
    #[arg(long)]
    pub check: bool,

    /// Log and skip bad rows instead of failing the run
    #[arg(long)]
    pub lenient: bool,

    /// Geocoding endpoint (Nominatim-compatible)
    #[arg(long, env = "GEOCODE_URL", default_value = "https://nominatim.openstreetmap.org/search")]
    pub geocode_url: String,

    /// Minimum spacing between geocoding calls, in milliseconds
    #[arg(long, default_value_t = 1100)]
    pub geocode_delay_ms: u64,
}

#[derive(Args)]
pub struct StatusArgs {
    /// Server base URL
    #[arg(short, long, env = "NITCHECK_URL", default_value = "http://localhost:8080")]
    pub server: String,
}
