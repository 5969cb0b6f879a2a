use anyhow::{bail, Context, Result};
use bio::io::fastq;
use clap::Parser;
use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::Write;

mod errors;
mod io_utils;
mod iupac;
mod trim;

use io_utils::Compress;
use iupac::Primer;
use trim::{End, LeadingTrimmer, TrailingTrimmer, TrimConfig, TrimStats};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Trim a primer from one end of FASTQ reads, allowing mismatches and IUPAC codes"
)]
struct Args {
    /// Input FASTQ files (use '-' for stdin). Supports .gz and .zst compressed files.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Primer sequence; IUPAC ambiguity codes are allowed
    #[arg(short, long, required_unless_present = "primer_fasta", conflicts_with = "primer_fasta")]
    primer: Option<String>,

    /// FASTA file to take the primer from
    #[arg(long)]
    primer_fasta: Option<String>,

    /// Entry to use from --primer-fasta [default: the --end name]
    #[arg(long, requires = "primer_fasta")]
    primer_name: Option<String>,

    /// Read edge the primer sits at. Forward drops reads without the primer,
    /// reverse keeps them untrimmed.
    #[arg(short, long, value_enum, default_value_t = End::Forward)]
    end: End,

    /// Number of primer start offsets to try
    #[arg(short, long, default_value_t = 15)]
    window: usize,

    /// Maximum mismatches allowed between primer and read
    #[arg(short, long, default_value_t = 1)]
    max_diffs: usize,

    /// Output file ('-' for stdout), or output directory with several inputs
    #[arg(short, long)]
    output: Option<String>,

    /// Gzip-compress output
    #[arg(long)]
    gz: bool,

    /// Zstd-compress output
    #[arg(long)]
    zstd: bool,

    /// Input files trimmed in parallel
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// Log every read's trimming decision
    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn compression(args: &Args) -> Result<Compress> {
    match (args.gz, args.zstd) {
        (true, true) => bail!("--gz and --zstd are mutually exclusive"),
        (true, false) => Ok(Compress::Gz),
        (false, true) => Ok(Compress::Zstd),
        (false, false) => Ok(Compress::None),
    }
}

fn build_config(args: &Args) -> Result<TrimConfig> {
    let seq = match (&args.primer, &args.primer_fasta) {
        (Some(seq), _) => seq.as_bytes().to_vec(),
        (None, Some(path)) => {
            let name = args.primer_name.as_deref().unwrap_or(args.end.name());
            io_utils::read_primer_fasta(path, name)
                .with_context(|| format!("Could not read primer from \"{}\"", path))?
        }
        (None, None) => bail!("one of --primer or --primer-fasta is required"),
    };

    let primer = Primer::new(seq)?;
    if primer.len() < 10 {
        warn!(
            "Primer is very short ({} bp), may cause false matches",
            primer.len()
        );
    }

    Ok(TrimConfig::new(primer, args.window, args.max_diffs)?)
}

/// (input, output) path pairs.
fn plan_outputs(args: &Args, compress: Compress) -> Result<Vec<(String, String)>> {
    if let [input] = args.inputs.as_slice() {
        let output = args.output.clone().unwrap_or_else(|| "-".to_owned());
        return Ok(vec![(input.clone(), output)]);
    }

    let Some(dir) = &args.output else {
        bail!("--output is required when trimming more than one input");
    };
    if dir == "-" {
        bail!("--output must be a directory, not stdout, when trimming more than one input");
    }
    if args.inputs.iter().any(|input| input == "-") {
        bail!("stdin ('-') can only be trimmed as the sole input");
    }

    let mut planned: HashMap<String, &str> = HashMap::new();
    let mut jobs = Vec::with_capacity(args.inputs.len());
    for input in &args.inputs {
        let output = io_utils::output_path_for(dir, input, compress);
        if let Some(other) = planned.insert(output.clone(), input.as_str()) {
            bail!(
                "\"{}\" and \"{}\" would both be written to \"{}\"",
                other,
                input,
                output
            );
        }
        jobs.push((input.clone(), output));
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Could not create output directory \"{}\"", dir))?;

    Ok(jobs)
}

fn write_records<W: Write>(
    records: impl Iterator<Item = errors::Result<fastq::Record>>,
    writer: &mut fastq::Writer<W>,
) -> errors::Result<()> {
    for record in records {
        writer.write_record(&record?)?;
    }
    Ok(())
}

fn trim_file(
    config: &TrimConfig,
    end: End,
    input: &str,
    output: &str,
    compress: Compress,
) -> Result<TrimStats> {
    let reader = fastq::Reader::new(
        io_utils::open_input(input).with_context(|| format!("Could not open \"{}\"", input))?,
    );
    let mut sink = io_utils::open_output(output, compress)
        .with_context(|| format!("Could not create \"{}\"", output))?;

    let mut writer = fastq::Writer::new(&mut sink);
    let stats = match end {
        End::Forward => {
            let mut trimmer = LeadingTrimmer::new(config, reader.records());
            write_records(&mut trimmer, &mut writer)
                .with_context(|| format!("Failed trimming \"{}\"", input))?;
            trimmer.stats()
        }
        End::Reverse => {
            let mut trimmer = TrailingTrimmer::new(config, reader.records());
            write_records(&mut trimmer, &mut writer)
                .with_context(|| format!("Failed trimming \"{}\"", input))?;
            trimmer.stats()
        }
    };
    writer.flush()?;
    drop(writer);
    sink.finish()
        .with_context(|| format!("Could not finish writing \"{}\"", output))?;

    info!(
        "{}: {} reads in, {} out ({} exact, {} fuzzy, {} dropped, {} untouched)",
        input,
        stats.reads_in,
        stats.reads_out,
        stats.exact,
        stats.fuzzy,
        stats.dropped,
        stats.untouched
    );

    Ok(stats)
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let compress = compression(&args)?;
    if args.threads == 0 {
        bail!("Number of threads must be at least 1");
    }

    let config = build_config(&args)?;
    let jobs = plan_outputs(&args, compress)?;
    info!(
        "Trimming {} primer {} (window {}, max diffs {}) from {} input(s)",
        args.end.name(),
        config.primer,
        config.window,
        config.max_diffs,
        jobs.len()
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(args.threads)
        .build()?;
    let per_file = pool.install(|| {
        jobs.par_iter()
            .map(|(input, output)| trim_file(&config, args.end, input, output, compress))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut total = TrimStats::default();
    for stats in per_file {
        total += stats;
    }

    let summary = format!(
        "reads in: {}\nreads out: {}\nreads trimmed: {}\nreads dropped: {}",
        total.reads_in,
        total.reads_out,
        total.trimmed(),
        total.dropped
    );
    // keep stdout clean when the reads themselves go there
    if jobs.iter().any(|(_, output)| output == "-") {
        eprintln!("{}", summary);
    } else {
        println!("{}", summary);
    }

    Ok(())
}
