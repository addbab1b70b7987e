use anyhow::Result;
use clap::{Parser, Subcommand};
use claimflow::{
    default_run_id, intake,
    persist::{RunStore, DEFAULT_REPORT_LIMIT},
    Pipeline, Settings,
};
use serde::Serialize;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(author, version, about = "Billing workbook ETL: reconcile, merge, score and store claims")]
struct Args {
    /// YAML settings file
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    input_dir: Option<PathBuf>,
    #[arg(long)]
    output_dir: Option<PathBuf>,
    #[arg(long)]
    archive_dir: Option<PathBuf>,
    #[arg(long)]
    history_dir: Option<PathBuf>,
    #[arg(long)]
    db_path: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Process every workbook waiting in the intake directory
    Process {
        /// Run id; defaults to local time YYYYMMDD_HHMMSS
        #[arg(long)]
        run_id: Option<String>,
    },
    /// Intake and export counts plus the last run id
    Stats,
    /// List stored run tables
    Reports,
    /// Print rows of one run table as JSON
    Report {
        table: String,
        #[arg(long, default_value_t = DEFAULT_REPORT_LIMIT)]
        limit: usize,
    },
    /// Delete an unprocessed intake file
    Delete { file: String },
}

impl Args {
    fn settings(&self) -> Result<Settings> {
        let mut s = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let overrides = [
            (&self.input_dir, &mut s.input_dir),
            (&self.output_dir, &mut s.output_dir),
            (&self.archive_dir, &mut s.archive_dir),
            (&self.history_dir, &mut s.history_dir),
            (&self.db_path, &mut s.db_path),
        ];
        for (arg, field) in overrides {
            if let Some(v) = arg {
                *field = v.clone();
            }
        }
        s.ensure_dirs()?;
        Ok(s)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn main() -> Result<()> {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(env)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let settings = args.settings()?;

    match args.command {
        Command::Process { run_id } => {
            let run_id = run_id.unwrap_or_else(default_run_id);
            info!(run_id = %run_id, input = %settings.input_dir.display(), "startup");
            let mut pipeline = Pipeline::open(settings)?;
            let report = pipeline.process_batch(&run_id)?;
            print_json(&report)?;
        }
        Command::Stats => print_json(&intake::stats(&settings)?)?,
        Command::Reports => {
            let store = RunStore::open(&settings.db_path)?;
            print_json(&store.list_run_tables()?)?;
        }
        Command::Report { table, limit } => {
            let store = RunStore::open(&settings.db_path)?;
            print_json(&store.read_run_table(&table, limit)?)?;
        }
        Command::Delete { file } => {
            let path = intake::delete_intake_file(&settings.input_dir, &file)?;
            info!(path = %path.display(), "deleted");
        }
    }
    Ok(())
}
