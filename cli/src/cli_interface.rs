use std::path::PathBuf;

use bulk_upsert::OutcomeKind;
use clap::{Args, Parser, Subcommand};

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "bulk-upsert", about, version)]
pub struct CLI {
    /// Log level (error, warn, info, debug, trace). `debug` prints every statement.
    #[clap(long, global = true, default_value = "info")]
    pub log_level: String,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upserts a JSON array of objects into a postgres table.
    ///
    /// New rows are inserted, rows whose content changed are updated and the rest
    /// are left alone. The counts per outcome are printed at the end.
    ///
    /// Example:
    /// `bulk-upsert upsert --table users --unique-by email --input users.json`
    #[clap(name = "upsert")]
    Upsert(UpsertArgs),
}

#[derive(Args, Debug, Default)]
pub struct UpsertArgs {
    /// The table to write to, optionally schema qualified (`schema.table`).
    #[arg(long)]
    pub table: String,

    /// optional - JSON file holding an array of objects, reads stdin when omitted or `-`.
    #[arg(long, short)]
    pub input: Option<PathBuf>,

    /// Columns forming the conflict key, must be backed by a unique index.
    #[arg(long, value_delimiter = ',')]
    pub unique_by: Vec<String>,

    /// optional - Rows per statement, defaults to 100.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// optional - Columns ignored when deciding whether a row changed.
    #[arg(long = "exclude", value_delimiter = ',')]
    pub excluded_from_change_detection: Vec<String>,

    /// optional - Columns never rewritten by an update.
    #[arg(long, value_delimiter = ',')]
    pub non_updatable: Vec<String>,

    /// optional - Outcomes to report (inserted, updated, unchanged), defaults to all.
    #[arg(long, value_delimiter = ',')]
    pub returning: Vec<OutcomeKind>,

    /// optional - Statement timeout in seconds, defaults to 60.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// optional - YAML options file. Flags given on the command line win.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// optional - The table's identity column, defaults to `id`.
    #[arg(long)]
    pub identity_column: Option<String>,

    /// optional - Connection string, defaults to `DATABASE_URL` (`.env` is honoured).
    #[arg(long)]
    pub database_url: Option<String>,

    /// Print the returned rows as JSON grouped by outcome.
    #[arg(long)]
    pub print_rows: bool,

    /// Print the statement for every batch without running it.
    #[arg(long)]
    pub dry_run: bool,
}
