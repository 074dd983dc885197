use crate::annotate::{open_alignment_input, ReadAnnotator};
use crate::fasta::Genome;
use crate::fragments::FragmentTable;
use crate::group::group_contacts;
use crate::sort::ExternalSorter;
use anyhow::{anyhow, bail, Context, Result};
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default number of buffered read lines per spill batch.
pub const DEFAULT_BATCH_SIZE: usize = 1_000_000;

/// One map file feeding a mate collection, optionally carrying an explicit
/// mapping-iteration index. Without one, the iteration is recovered from the
/// filename's numeric suffix, falling back to a running counter.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub iteration: Option<u32>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SourceFile {
            path: path.into(),
            iteration: None,
        }
    }

    pub fn with_iteration(path: impl Into<PathBuf>, iteration: u32) -> Self {
        SourceFile {
            path: path.into(),
            iteration: Some(iteration),
        }
    }
}

/// Iteration number encoded in a map filename: the last `.`-delimited token,
/// up to the first `:`.
pub fn iteration_from_path(path: &Path) -> Option<u32> {
    let name = path.file_name()?.to_str()?;
    let suffix = name.rsplit('.').next()?;
    let token = suffix.split(':').next()?;
    token.parse().ok()
}

/// The map files of one mate (read1 or read2) and where its grouped output goes.
#[derive(Debug, Clone)]
pub struct MateCollection {
    pub sources: Vec<SourceFile>,
    pub output: PathBuf,
}

impl MateCollection {
    pub fn new(sources: Vec<SourceFile>, output: impl Into<PathBuf>) -> Self {
        MateCollection {
            sources,
            output: output.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParseConfig {
    /// Buffered lines per spill batch; bounds peak memory.
    pub batch_size: usize,
    /// Retain the fully-sorted intermediate beside the output as
    /// `<output>.sorted` instead of deleting it with the run.
    pub keep_sorted: bool,
}

impl Default for ParseConfig {
    fn default() -> Self {
        ParseConfig {
            batch_size: DEFAULT_BATCH_SIZE,
            keep_sorted: false,
        }
    }
}

/// Outcome of one mate collection's run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MateSummary {
    /// Reads annotated per mapping iteration.
    pub mapped_by_iteration: BTreeMap<u32, u64>,
    /// Number of `|||` joins performed while grouping.
    pub multi_contacts: u64,
    /// Reads skipped because their chromosome is absent from the table.
    pub dropped: u64,
}

impl MateSummary {
    pub fn total_mapped(&self) -> u64 {
        self.mapped_by_iteration.values().sum()
    }
}

/// Annotate, sort, and group one or two mate collections.
///
/// The two mates share no mutable state (the fragment table and genome are
/// read-only), so a paired run processes them in parallel. Summaries come
/// back in the order the collections were given.
pub fn parse_mapped_reads(
    mates: &[MateCollection],
    genome: &Genome,
    table: &FragmentTable,
    config: &ParseConfig,
) -> Result<Vec<MateSummary>> {
    match mates {
        [] => bail!("no mate collections given"),
        [single] => Ok(vec![process_mate(single, genome, table, config)?]),
        [first, second] => {
            let (a, b) = rayon::join(
                || process_mate(first, genome, table, config),
                || process_mate(second, genome, table, config),
            );
            Ok(vec![a?, b?])
        }
        more => bail!("expected one or two mate collections, got {}", more.len()),
    }
}

fn process_mate(
    mate: &MateCollection,
    genome: &Genome,
    table: &FragmentTable,
    config: &ParseConfig,
) -> Result<MateSummary> {
    let out_dir = match mate.output.parent() {
        Some(dir) if dir != Path::new("") => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };
    // The arena lives beside the output so runs never collide and the final
    // rename (when the sorted run is kept) stays on one filesystem.
    let arena = tempfile::Builder::new()
        .prefix("hicsort_")
        .tempdir_in(&out_dir)
        .with_context(|| format!("cannot create temp directory in {}", out_dir.display()))?;

    let mut sorter = ExternalSorter::new(arena.path(), config.batch_size);
    let annotator = ReadAnnotator::new(table);
    let mut mapped_by_iteration: BTreeMap<u32, u64> = BTreeMap::new();
    let mut dropped = 0u64;
    let mut last_iteration = 0u32;

    for source in &mate.sources {
        let reader = match open_alignment_input(&source.path) {
            Ok(reader) => reader,
            Err(err) => {
                warn!("skipping {}: {err:#}", source.path.display());
                continue;
            }
        };
        let iteration = source
            .iteration
            .or_else(|| iteration_from_path(&source.path))
            .unwrap_or(last_iteration + 1);
        last_iteration = iteration;
        debug!(
            "loading {} as iteration {iteration}",
            source.path.display()
        );

        let mut annotated = 0u64;
        for line in reader.lines() {
            let line =
                line.with_context(|| format!("while reading {}", source.path.display()))?;
            if line.is_empty() {
                continue;
            }
            match annotator
                .annotate(&line)
                .with_context(|| format!("while parsing {}", source.path.display()))?
            {
                Some(read) => {
                    sorter.push(read.to_line())?;
                    annotated += 1;
                }
                None => dropped += 1,
            }
        }
        *mapped_by_iteration.entry(iteration).or_insert(0) += annotated;
        info!(
            "{}: {annotated} reads annotated (iteration {iteration})",
            source.path.display()
        );
    }

    let sorted = sorter.finish()?.ok_or_else(|| {
        anyhow!(
            "nothing parsed for {}: check input files and chromosome names \
             (genome FASTA vs map files)",
            mate.output.display()
        )
    })?;

    let out = File::create(&mate.output)
        .with_context(|| format!("cannot create output {}", mate.output.display()))?;
    let mut writer = BufWriter::new(out);
    write_header(&mut writer, genome, &mapped_by_iteration)?;
    let multi_contacts = group_contacts(&sorted, &mut writer)?;
    writer.flush()?;

    if config.keep_sorted {
        let kept = sorted_sibling(&mate.output);
        fs::rename(&sorted, &kept)
            .with_context(|| format!("cannot retain sorted run as {}", kept.display()))?;
        info!("sorted intermediate kept at {}", kept.display());
    }

    Ok(MateSummary {
        mapped_by_iteration,
        multi_contacts,
        dropped,
    })
}

/// `<output>.sorted`, next to the output file.
fn sorted_sibling(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".sorted");
    output.with_file_name(name)
}

fn write_header<W: Write>(
    writer: &mut W,
    genome: &Genome,
    mapped: &BTreeMap<u32, u64>,
) -> Result<()> {
    writeln!(writer, "# Chromosome lengths (order matters):")?;
    for (name, len) in genome.lengths() {
        writeln!(writer, "# CRM {name}\t{len}")?;
    }
    writeln!(writer, "# Mapped\treads count by iteration")?;
    for (iteration, count) in mapped {
        writeln!(writer, "# MAPPED {iteration}\t{count}")?;
    }
    Ok(())
}
