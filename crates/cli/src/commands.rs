use clap::{Args, Subcommand};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Reconcile rows against stored entities and write the changes
    Import {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, help = "Loads KEY=VALUE pairs from this file before applying overrides")]
        env_file: Option<PathBuf>,

        #[arg(long, help = "Writes the resulting entity set to this JSON file")]
        output: Option<PathBuf>,

        #[arg(long, help = "Writes the import summary report to this JSON file")]
        report: Option<PathBuf>,

        #[arg(long, help = "Prints every progress update as a JSON line on stdout")]
        progress_json: bool,
    },
    /// Show what an import would do without writing anything
    Preview {
        #[command(flatten)]
        input: InputArgs,

        #[arg(long, help = "Prints the preview as JSON instead of a table")]
        json: bool,
    },
    /// Print the effective settings after file and environment overrides
    Config {
        #[arg(long, help = "Settings file path (defaults to ~/.tally/import.json)")]
        config: Option<PathBuf>,

        #[arg(long, help = "Loads KEY=VALUE pairs from this file before applying overrides")]
        env_file: Option<PathBuf>,
    },
}

#[derive(Args)]
pub struct InputArgs {
    #[arg(long, help = "CSV file with one source row per line")]
    pub rows: PathBuf,

    #[arg(long, help = "JSON array of the stored entities")]
    pub entities: PathBuf,

    #[arg(long, help = "Settings file path (defaults to ~/.tally/import.json)")]
    pub config: Option<PathBuf>,
}
