use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use uniqseq_lib::constants::{
    DEFAULT_MAX_OPEN_BUCKETS, DEFAULT_MAX_RECORDS_IN_RAM, DEFAULT_PREFIX_LENGTH,
    DEFAULT_SEED_LENGTH,
};
use uniqseq_lib::source::{for_each_fingerprint_line, for_each_read_pair};
use uniqseq_lib::{CounterConfiguration, ResultMetric, UniquenessCalculator, UniquenessResult};

#[derive(Parser)]
#[command(name = "uniqseq")]
#[command(version = "0.1.0")]
#[command(
    about = "Count total and unique read fingerprints with bounded memory",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Count fingerprints from a text file (one per line, `-` for stdin)
    Count {
        /// Fingerprint file
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        counter: CounterArgs,
    },

    /// Count read-pair fingerprints from FASTA/FASTQ files
    Pairs {
        /// Read 1 FASTA/FASTQ file (may be gzipped)
        #[arg(short = '1', long)]
        read1: PathBuf,

        /// Read 2 FASTA/FASTQ file for paired-end data
        #[arg(short = '2', long)]
        read2: Option<PathBuf>,

        /// Bases taken from the start of each mate
        #[arg(short, long, default_value_t = DEFAULT_SEED_LENGTH)]
        seed_length: usize,

        #[command(flatten)]
        counter: CounterArgs,
    },
}

/// Options shared by all counting commands
#[derive(Args)]
struct CounterArgs {
    /// Length of the bucket key taken from each fingerprint
    #[arg(short, long, default_value_t = DEFAULT_PREFIX_LENGTH)]
    prefix_length: usize,

    /// Maximum fingerprints held in memory
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_RECORDS_IN_RAM)]
    max_records: usize,

    /// Maximum fingerprint bytes held in memory (0 = unlimited)
    #[arg(long, default_value = "0")]
    max_bytes: usize,

    /// Maximum number of simultaneously open bucket files
    #[arg(long, default_value_t = DEFAULT_MAX_OPEN_BUCKETS)]
    max_open_buckets: usize,

    /// Number of threads (0 = all available cores)
    #[arg(short = 't', long, default_value = "1")]
    threads: usize,

    /// Directory for temporary files (defaults to the system temp dir)
    #[arg(long)]
    tmp_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl CounterArgs {
    fn into_config(self) -> CounterConfiguration {
        CounterConfiguration {
            prefix_length: self.prefix_length,
            max_records_in_ram: self.max_records,
            max_bytes_in_ram: self.max_bytes,
            max_open_buckets: self.max_open_buckets,
            num_threads: self.threads,
            tmp_dirname: self.tmp_dir.unwrap_or_else(std::env::temp_dir),
            verbose: self.verbose,
            ..CounterConfiguration::default()
        }
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize tracing: use RUST_LOG if set, otherwise default to info
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Count { input, counter } => count_command(input, counter.into_config())?,
        Commands::Pairs { read1, read2, seed_length, counter } => {
            let config = CounterConfiguration {
                seed_length,
                ..counter.into_config()
            };
            pairs_command(read1, read2, config)?
        }
    };

    // Only a successful computation produces a metric
    print!("{}", ResultMetric::from_result(&result));

    Ok(())
}

/// Count fingerprints listed one per line
fn count_command(
    input: PathBuf,
    config: CounterConfiguration,
) -> anyhow::Result<UniquenessResult> {
    info!("Counting fingerprints from {}", input.display());

    let mut calculator = UniquenessCalculator::new(config)?;
    let n = for_each_fingerprint_line(&input, |fingerprint| {
        calculator.add_fingerprint(fingerprint)?;
        Ok(())
    })?;
    info!("  Routed {} fingerprints", n);

    Ok(calculator.finish()?)
}

/// Count read-pair fingerprints from FASTA/FASTQ input
fn pairs_command(
    read1: PathBuf,
    read2: Option<PathBuf>,
    config: CounterConfiguration,
) -> anyhow::Result<UniquenessResult> {
    info!("Counting read fingerprints");
    info!("  Read 1: {}", read1.display());
    if let Some(read2) = &read2 {
        info!("  Read 2: {}", read2.display());
    }

    let mut calculator = UniquenessCalculator::new(config)?;
    info!("  Seed length: {}", calculator.config().seed_length);
    let n = for_each_read_pair(&read1, read2.as_ref(), |r1, r2| {
        calculator.add_read_pair(r1, r2)?;
        Ok(())
    })?;
    info!("  Routed {} reads", n);

    Ok(calculator.finish()?)
}
