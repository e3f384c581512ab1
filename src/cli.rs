use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "cascade-ids")]
#[command(about = "Cascading classifier intrusion detection: evaluate connections and crunch trace statistics")]
#[command(version)]
pub struct Cli {
    /// Verbose logging (per-node scores and verdicts)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run connections through the cascade, writing one trace record per line to stdout
    Evaluate(EvaluateArgs),

    /// Aggregate trace records into a quality and timing report
    Crunch(CrunchArgs),
}

#[derive(Debug, Parser)]
pub struct EvaluateArgs {
    /// Cascade manifest (JSON)
    #[arg(short, long)]
    pub manifest: PathBuf,

    /// Labeled connection records (CSV with an `id` column)
    #[arg(short, long)]
    pub connections: PathBuf,

    /// Only evaluate these connection ids, in this order (comma separated)
    #[arg(long, value_delimiter = ',', group = "id_source")]
    pub ids: Option<Vec<i64>>,

    /// File with connection ids to evaluate (one per line or comma separated)
    #[arg(long, group = "id_source")]
    pub ids_file: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub struct CrunchArgs {
    /// Trace record file ("-" reads stdin)
    pub traces: PathBuf,

    /// Also write raw per-trace time samples (layer, time) to a CSV file.
    /// A path must be attached with `=` (`-t=out.csv`); a bare `-t` writes times.csv
    #[arg(
        short = 't',
        long,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "times.csv",
        value_name = "PATH"
    )]
    pub dump_times: Option<PathBuf>,

    /// Print the report as JSON instead of text
    #[arg(long)]
    pub json: bool,
}
