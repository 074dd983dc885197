use indexmap::IndexMap;
use thiserror::Error;

/// Errors raised while resolving a genomic position against the fragment table.
///
/// `UnknownChromosome` means the read aligned to a sequence absent from the
/// digested genome and must be skipped by the caller. `OutsideChromosome` is
/// raised when the backward walk budget is exhausted and aborts the current run.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LocateError {
    #[error("chromosome {0:?} not present in the fragment table")]
    UnknownChromosome(String),
    #[error("read at {chrom}:{pos} mapped mostly outside the chromosome")]
    OutsideChromosome { chrom: String, pos: u64 },
}

/// Per-chromosome restriction-site positions, bucketed into fixed-size
/// genomic windows so a lookup only binary-searches one small sorted slice.
///
/// Positions within a chunk are strictly increasing and consecutive chunks
/// cover the chromosome with no gaps. The table is immutable once built and
/// safe to share across threads without locking.
#[derive(Debug, Clone)]
pub struct FragmentTable {
    chunk_size: u64,
    chroms: IndexMap<String, Vec<Vec<u64>>>,
}

impl FragmentTable {
    pub fn new(chunk_size: u64) -> Self {
        FragmentTable {
            chunk_size: chunk_size.max(1),
            chroms: IndexMap::new(),
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn insert_chromosome(&mut self, name: impl Into<String>, chunks: Vec<Vec<u64>>) {
        self.chroms.insert(name.into(), chunks);
    }

    pub fn contains(&self, chrom: &str) -> bool {
        self.chroms.contains_key(chrom)
    }

    pub fn chromosomes(&self) -> impl Iterator<Item = &str> {
        self.chroms.keys().map(String::as_str)
    }

    /// Nearest restriction sites flanking `pos` on `chrom`, as
    /// `(upstream, downstream)`.
    ///
    /// The chunk holding `pos` is binary-searched for the rightmost insertion
    /// point: the site at that index is the downstream boundary, the one
    /// before it the upstream boundary (or the chunk's first site when the
    /// position precedes every site in the chunk).
    ///
    /// A position past the last site of its chunk (a read hanging over the
    /// reference end) is retried one base to the left, re-resolving the chunk
    /// each step, at most `max_walk` times. Exhausting the budget reports the
    /// read as mapped mostly outside the chromosome.
    pub fn nearest_sites(
        &self,
        chrom: &str,
        pos: u64,
        max_walk: u64,
    ) -> Result<(u64, u64), LocateError> {
        let chunks = self
            .chroms
            .get(chrom)
            .ok_or_else(|| LocateError::UnknownChromosome(chrom.to_string()))?;

        let mut cur = pos;
        let mut walked = 0u64;
        loop {
            if let Some(piece) = chunks.get((cur / self.chunk_size) as usize) {
                let idx = piece.partition_point(|&site| site <= cur);
                if idx < piece.len() {
                    let downstream = piece[idx];
                    let upstream = piece[if idx == 0 { 0 } else { idx - 1 }];
                    return Ok((upstream, downstream));
                }
            }
            if walked >= max_walk || cur == 0 {
                return Err(LocateError::OutsideChromosome {
                    chrom: chrom.to_string(),
                    pos,
                });
            }
            cur -= 1;
            walked += 1;
        }
    }
}
