mod cli;

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use cascade_ids::cascade::Cascade;
use cascade_ids::provider::{parse_id_list, CsvProvider, FeatureProvider};
use cascade_ids::stats::{write_samples_file, Tally};
use cascade_ids::trace::TraceReader;

use cli::{Cli, Command, CrunchArgs, EvaluateArgs};

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(
        if cli.verbose { "debug" } else { "info" },
    ))
    .init();

    let result = match cli.command {
        Command::Evaluate(args) => evaluate(args),
        Command::Crunch(args) => crunch(args),
    };

    if let Err(e) = &result {
        if let Some(cause) = e.downcast_ref::<cascade_ids::Error>() {
            error!("Run aborted ({} failure)", cause.kind());
        }
    }
    result
}

fn evaluate(args: EvaluateArgs) -> Result<()> {
    let cascade = Cascade::from_manifest(&args.manifest)
        .with_context(|| format!("Failed to load cascade from {}", args.manifest.display()))?;

    let provider = CsvProvider::open(&args.connections).with_context(|| {
        format!("Failed to load connections from {}", args.connections.display())
    })?;

    let ids = match (args.ids, args.ids_file) {
        (Some(ids), _) => Some(ids),
        (None, Some(path)) => Some(read_ids(&path)?),
        (None, None) => None,
    };

    let connections = provider.fetch(&cascade.required_fields(), ids.as_deref())?;
    info!("Evaluating {} connections", connections.len());

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let written = cascade.evaluate_all(&connections, &mut out)?;

    info!("Wrote {} trace records", written);
    Ok(())
}

fn crunch(args: CrunchArgs) -> Result<()> {
    let reader: Box<dyn BufRead> = if args.traces == Path::new("-") {
        Box::new(io::stdin().lock())
    } else {
        let file = File::open(&args.traces)
            .with_context(|| format!("Failed to open trace records {}", args.traces.display()))?;
        Box::new(BufReader::new(file))
    };

    let tally = Tally::from_traces(TraceReader::new(reader), args.dump_times.is_some())?;
    let report = tally.finish()?;

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report);
    }

    if let Some(path) = &args.dump_times {
        info!("Dumping time information to {}", path.display());
        write_samples_file(path, tally.samples().unwrap_or_default())
            .with_context(|| format!("Failed to write time samples to {}", path.display()))?;
    }

    Ok(())
}

/// Read connection ids, one per line or comma separated.
fn read_ids(path: &Path) -> Result<Vec<i64>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read id list {}", path.display()))?;
    parse_id_list(&text).with_context(|| format!("Invalid id list {}", path.display()))
}
