use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use indexmap::IndexMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Genome sequences keyed by chromosome name, in file order.
///
/// Order matters downstream: the output header lists chromosome lengths in
/// the order the FASTA declared them. Sequences are normalized to uppercase.
#[derive(Debug, Clone, Default)]
pub struct Genome {
    sequences: IndexMap<String, Vec<u8>>,
}

impl Genome {
    pub fn new() -> Self {
        Genome::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, mut seq: Vec<u8>) {
        seq.make_ascii_uppercase();
        self.sequences.insert(name.into(), seq);
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.sequences.get(name).map(Vec::as_slice)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.sequences
            .iter()
            .map(|(name, seq)| (name.as_str(), seq.as_slice()))
    }

    /// Chromosome lengths in declaration order.
    pub fn lengths(&self) -> impl Iterator<Item = (&str, u64)> {
        self.sequences
            .iter()
            .map(|(name, seq)| (name.as_str(), seq.len() as u64))
    }
}

/// Load a FASTA file (plain or gzip, by extension) into a [`Genome`].
///
/// Only the first whitespace-delimited token of each header names the record.
pub fn read_fasta<P: AsRef<Path>>(path: P) -> Result<Genome> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("cannot open FASTA {}", path.display()))?;
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);
    let reader: Box<dyn BufRead> = if is_compressed {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let mut genome = Genome::new();
    let mut name: Option<String> = None;
    let mut seq: Vec<u8> = Vec::new();

    for line in reader.lines() {
        let line = line?;
        if let Some(header) = line.strip_prefix('>') {
            if let Some(prev) = name.take() {
                genome.insert(prev, std::mem::take(&mut seq));
            }
            let token = header
                .split_whitespace()
                .next()
                .with_context(|| format!("empty FASTA header in {}", path.display()))?;
            name = Some(token.to_string());
        } else if line.trim().is_empty() {
            continue;
        } else if name.is_some() {
            seq.extend_from_slice(line.trim_end().as_bytes());
        } else {
            bail!(
                "sequence data before any FASTA header in {}",
                path.display()
            );
        }
    }
    if let Some(last) = name.take() {
        genome.insert(last, seq);
    }
    Ok(genome)
}
