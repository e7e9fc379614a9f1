//! `ngram`: build and query trigram index files from the command line.
//!
//! Records are read one per line; a record's id is its line number, from 0.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use ngram_core::config::{load_config, EngineConfig, ThresholdPolicy};
use ngram_core::normalize::normalize;
use ngram_core::trigram::builder::IndexBuilder;
use ngram_core::trigram::extract::extract_with;
use ngram_core::trigram::writer::persist_index;
use ngram_core::IndexReader;
use tracing::info;

#[derive(Parser)]
#[command(name = "ngram")]
#[command(about = "Approximate string matching over trigram index files")]
#[command(version)]
struct Cli {
    /// JSON engine config; flags override its values
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build an index from a file with one record per line
    Build {
        /// Input file (stdin when omitted)
        #[arg(value_name = "INPUT")]
        input: Option<PathBuf>,

        /// Index file to publish
        #[arg(long, short = 'o')]
        output: PathBuf,

        /// Padding sentinel character
        #[arg(long)]
        sentinel: Option<char>,

        /// Index lines as given, without lowercasing and NFC
        #[arg(long)]
        raw: bool,
    },
    /// Rank indexed records against a query string
    Search {
        /// Index file
        #[arg(long, short = 'i')]
        index: PathBuf,

        /// Query string
        query: String,

        /// Minimum score, inclusive
        #[arg(long, short = 't', env = "NGRAM_THRESHOLD", allow_negative_numbers = true)]
        threshold: Option<f64>,

        /// Print at most N matches
        #[arg(long, short = 'n')]
        limit: Option<usize>,

        /// Fail when more than N records are candidates
        #[arg(long)]
        max_candidates: Option<usize>,

        /// Fail on a threshold outside [0, 1] instead of clamping it
        #[arg(long)]
        reject_out_of_range: bool,

        /// Print matches as a JSON array
        #[arg(long)]
        json: bool,

        /// Use the query as given, without lowercasing and NFC
        #[arg(long)]
        raw: bool,
    },
    /// Print header information of an index
    Stats {
        /// Index file
        #[arg(long, short = 'i')]
        index: PathBuf,
    },
    /// Print the trigrams of a string
    Trigrams {
        string: String,

        /// Padding sentinel character
        #[arg(long, default_value_t = '$')]
        sentinel: char,

        /// Use the string as given, without lowercasing and NFC
        #[arg(long)]
        raw: bool,
    },
}

fn prepare(text: &str, raw: bool) -> String {
    if raw {
        text.to_string()
    } else {
        normalize(text)
    }
}

fn read_records(input: Option<&Path>) -> anyhow::Result<Box<dyn BufRead>> {
    Ok(match input {
        Some(path) => {
            let file = File::open(path)
                .with_context(|| format!("cannot open input {}", path.display()))?;
            Box::new(BufReader::new(file))
        }
        None => Box::new(BufReader::new(io::stdin())),
    })
}

fn run_build(
    config: &EngineConfig,
    input: Option<&Path>,
    output: &Path,
    sentinel: Option<char>,
    raw: bool,
) -> anyhow::Result<()> {
    let sentinel = sentinel.unwrap_or(config.build.sentinel);
    let mut builder = IndexBuilder::with_sentinel(sentinel);

    for (line_no, line) in read_records(input)?.lines().enumerate() {
        let line = line.with_context(|| format!("cannot read input line {}", line_no + 1))?;
        builder.add(&prepare(&line, raw))?;
    }

    let stats = persist_index(&builder, output)
        .with_context(|| format!("cannot write index {}", output.display()))?;
    info!(
        records = stats.record_count,
        trigrams = stats.trigram_count,
        bytes = stats.bytes,
        "built {}",
        output.display()
    );
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_search(
    config: &EngineConfig,
    index: &Path,
    query: &str,
    threshold: Option<f64>,
    limit: Option<usize>,
    max_candidates: Option<usize>,
    reject_out_of_range: bool,
    json: bool,
    raw: bool,
) -> anyhow::Result<()> {
    let reader = IndexReader::open_with(index, &config.reader)
        .with_context(|| format!("cannot open index {}", index.display()))?;

    let mut options = config.search.clone();
    if let Some(t) = threshold {
        options.threshold = t;
    }
    if limit.is_some() {
        options.limit = limit;
    }
    if max_candidates.is_some() {
        options.max_candidates = max_candidates;
    }
    if reject_out_of_range {
        options.threshold_policy = ThresholdPolicy::Reject;
    }

    let matches = reader
        .search(&prepare(query, raw), &options)
        .with_context(|| format!("search for {query:?} failed"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        serde_json::to_writer(&mut out, &matches)?;
        writeln!(out)?;
    } else {
        for m in &matches {
            writeln!(out, "{}\t{:.6}", m.id, m.score)?;
        }
    }
    Ok(())
}

fn run_stats(config: &EngineConfig, index: &Path) -> anyhow::Result<()> {
    let reader = IndexReader::open_with(index, &config.reader)
        .with_context(|| format!("cannot open index {}", index.display()))?;
    println!("path:       {}", reader.path().display());
    println!("version:    {}", reader.version());
    println!("sentinel:   U+{:04X}", u32::from(reader.sentinel()));
    println!("records:    {}", reader.record_count());
    println!("trigrams:   {}", reader.trigram_count());
    println!("size:       {} bytes", reader.index_size());
    Ok(())
}

fn run_trigrams(string: &str, sentinel: char, raw: bool) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for trigram in extract_with(&prepare(string, raw), sentinel) {
        writeln!(out, "{}", trigram.iter().collect::<String>())?;
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Commands::Build {
            input,
            output,
            sentinel,
            raw,
        } => run_build(&config, input.as_deref(), &output, sentinel, raw),
        Commands::Search {
            index,
            query,
            threshold,
            limit,
            max_candidates,
            reject_out_of_range,
            json,
            raw,
        } => run_search(
            &config,
            &index,
            &query,
            threshold,
            limit,
            max_candidates,
            reject_out_of_range,
            json,
            raw,
        ),
        Commands::Stats { index } => run_stats(&config, &index),
        Commands::Trigrams {
            string,
            sentinel,
            raw,
        } => run_trigrams(&string, sentinel, raw),
    }
}
