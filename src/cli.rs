use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML config file
    #[clap(short, long, default_value = "talentsearch.yaml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP server and the background sync worker
    Daemon {},

    /// Resynchronize one talent's document and vector, or all of them
    Sync {
        /// Talent id; omit to resync every talent
        #[clap(long)]
        id: Option<i64>,
    },

    /// Queue a talent for background resynchronization
    Enqueue {
        #[clap(long)]
        id: i64,
    },

    /// One-shot semantic search; prints the matching ids as JSON
    Search {
        query: String,

        /// Restrict the search to these talent ids
        #[clap(long, value_delimiter = ',')]
        candidates: Option<Vec<i64>>,
    },
}
