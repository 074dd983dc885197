use anyhow::{bail, Result};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use hicsort::digest::{build_fragment_table, DEFAULT_FRAG_CHUNK};
use hicsort::fasta::read_fasta;
use hicsort::pipeline::{
    parse_mapped_reads, MateCollection, ParseConfig, SourceFile, DEFAULT_BATCH_SIZE,
};

/// hicsort - annotate, sort, and group iteratively mapped Hi-C reads
///
/// Reads map files (tab-separated `id, sequence, _, _, chrom:strand:pos`
/// records, plain or gzipped), annotates every read with its flanking
/// restriction sites, externally sorts the annotated reads by read id, and
/// writes one grouped file per mate with multi-contact reads joined by `|||`.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Map files for read1, in mapping-iteration order
    #[clap(short = '1', long = "read1", required = true, num_args = 1.., value_name = "FILE")]
    read1: Vec<PathBuf>,

    /// Map files for read2 (requires --output2)
    #[clap(short = '2', long = "read2", num_args = 1.., value_name = "FILE")]
    read2: Vec<PathBuf>,

    /// Output file for grouped read1 records
    #[clap(short = 'o', long = "output1", value_name = "FILE")]
    output1: PathBuf,

    /// Output file for grouped read2 records (requires --read2)
    #[clap(long = "output2", value_name = "FILE")]
    output2: Option<PathBuf>,

    /// Reference genome FASTA (plain or gzipped)
    #[clap(short = 'g', long = "genome", value_name = "FASTA")]
    genome: PathBuf,

    /// Restriction enzyme used in the Hi-C protocol (e.g. HindIII, MboI)
    #[clap(short = 'e', long = "enzyme", value_name = "NAME")]
    enzyme: String,

    /// Genomic window size of one fragment-table chunk, in bp
    #[clap(long = "frag-chunk", default_value_t = DEFAULT_FRAG_CHUNK, value_name = "BP")]
    frag_chunk: u64,

    /// Reads buffered in memory per sort batch
    #[clap(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE, value_name = "N")]
    batch_size: usize,

    /// Keep the fully-sorted intermediate file next to each output
    #[clap(long = "keep-tmp")]
    keep_tmp: bool,

    /// Verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if args.verbose { "debug" } else { "info" }),
    )
    .init();

    if args.read2.is_empty() != args.output2.is_none() {
        bail!("--read2 and --output2 must be given together");
    }

    info!("loading genome from {}", args.genome.display());
    let genome = read_fasta(&args.genome)?;
    if genome.is_empty() {
        bail!("no sequences found in {}", args.genome.display());
    }

    info!("mapping {} sites onto the reference genome", args.enzyme);
    let table = build_fragment_table(&args.enzyme, &genome, args.frag_chunk)?;

    let mut mates = vec![MateCollection::new(
        args.read1.iter().map(SourceFile::new).collect(),
        &args.output1,
    )];
    if let Some(output2) = &args.output2 {
        mates.push(MateCollection::new(
            args.read2.iter().map(SourceFile::new).collect(),
            output2,
        ));
    }

    let config = ParseConfig {
        batch_size: args.batch_size,
        keep_sorted: args.keep_tmp,
    };
    let summaries = parse_mapped_reads(&mates, &genome, &table, &config)?;

    for (mate, summary) in summaries.iter().enumerate() {
        info!(
            "read{}: {} reads mapped, {} multi-contacts, {} dropped (unknown chromosome)",
            mate + 1,
            summary.total_mapped(),
            summary.multi_contacts,
            summary.dropped
        );
        for (iteration, count) in &summary.mapped_by_iteration {
            info!("read{}: iteration {iteration}: {count} reads", mate + 1);
        }
    }

    Ok(())
}
