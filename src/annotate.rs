use crate::fragments::{FragmentTable, LocateError};
use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Open a map file and auto-detect gzip compression, returning a boxed BufRead
pub fn open_alignment_input<P: AsRef<Path>>(path: P) -> Result<Box<dyn BufRead>> {
    let path = path.as_ref();
    let file =
        File::open(path).with_context(|| format!("cannot open map file {}", path.display()))?;

    // Check by file extension (faster than reading magic bytes)
    let is_compressed = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext == "gz" || ext == "bgz")
        .unwrap_or(false);

    if is_compressed {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// One mapped read normalized for sorting and grouping.
///
/// Positions are 0-based. Reverse-strand reads carry the position of their
/// 3'-most mapped base (`original position + read length - 1`) so both
/// strands report the base nearest the ligation junction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedRead {
    pub id: String,
    pub chrom: String,
    pub pos: u64,
    pub forward: bool,
    pub length: u64,
    pub upstream: u64,
    pub downstream: u64,
}

impl AnnotatedRead {
    /// Tab-separated serialization; strand is `1` for forward, `0` for reverse.
    pub fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.id,
            self.chrom,
            self.pos,
            self.forward as u8,
            self.length,
            self.upstream,
            self.downstream
        )
    }
}

/// Converts raw map lines into [`AnnotatedRead`]s against a fragment table.
pub struct ReadAnnotator<'a> {
    table: &'a FragmentTable,
}

impl<'a> ReadAnnotator<'a> {
    pub fn new(table: &'a FragmentTable) -> Self {
        ReadAnnotator { table }
    }

    /// Annotate one raw alignment line.
    ///
    /// The line must carry at least five tab-separated fields
    /// (`id, sequence, _, _, chrom:strand:pos`); trailing fields are ignored.
    /// Returns `Ok(None)` when the read aligned to a chromosome absent from
    /// the fragment table (the caller counts it as dropped). A read mapped
    /// mostly outside its chromosome is an error and aborts the run.
    pub fn annotate(&self, line: &str) -> Result<Option<AnnotatedRead>> {
        let mut fields = line.split('\t');
        let id = fields.next().unwrap_or_default();
        let (seq, descriptor) = match (fields.next(), fields.next(), fields.next(), fields.next())
        {
            (Some(seq), Some(_), Some(_), Some(ali)) => (seq, ali),
            _ => bail!("alignment line has fewer than five fields: {line:?}"),
        };

        let mut parts = descriptor.split(':');
        let (chrom, strand, pos) = match (parts.next(), parts.next(), parts.next()) {
            (Some(chrom), Some(strand), Some(pos)) => (chrom, strand, pos),
            _ => bail!("malformed alignment descriptor {descriptor:?} in line {line:?}"),
        };

        if seq.is_empty() {
            bail!("alignment line has an empty sequence field: {line:?}");
        }
        let forward = strand == "+";
        let length = seq.len() as u64;
        let mut pos: u64 = pos
            .parse()
            .with_context(|| format!("invalid position in alignment descriptor {descriptor:?}"))?;
        if !forward {
            // Reported position is the leftmost base; move to the 3' end.
            pos += length - 1;
        }

        match self.table.nearest_sites(chrom, pos, length) {
            Ok((upstream, downstream)) => Ok(Some(AnnotatedRead {
                id: id.to_string(),
                chrom: chrom.to_string(),
                pos,
                forward,
                length,
                upstream,
                downstream,
            })),
            Err(LocateError::UnknownChromosome(_)) => Ok(None),
            Err(err @ LocateError::OutsideChromosome { .. }) => {
                Err(err).with_context(|| format!("while annotating line {line:?}"))
            }
        }
    }
}
