use crate::fasta::Genome;
use crate::fragments::FragmentTable;
use anyhow::{bail, Result};

/// Genomic window size (bp) of one fragment-table chunk.
pub const DEFAULT_FRAG_CHUNK: u64 = 100_000;

/// Restriction enzymes commonly used in Hi-C protocols. The `^` marks the
/// cut offset within the recognition pattern.
const ENZYMES: &[(&str, &str)] = &[
    ("HindIII", "A^AGCTT"),
    ("MboI", "^GATC"),
    ("DpnII", "^GATC"),
    ("Sau3AI", "^GATC"),
    ("NcoI", "C^CATGG"),
    ("BglII", "A^GATCT"),
    ("Csp6I", "G^TAC"),
    ("NlaIII", "CATG^"),
    ("HinfI", "G^ANTC"),
    ("EcoRI", "G^AATTC"),
    ("BamHI", "G^GATCC"),
    ("MseI", "T^TAA"),
    ("AluI", "AG^CT"),
];

/// Look up an enzyme's recognition pattern by name (case-insensitive).
pub fn lookup_enzyme(name: &str) -> Result<&'static str> {
    ENZYMES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, pattern)| *pattern)
        .ok_or_else(|| {
            let known: Vec<&str> = ENZYMES.iter().map(|(n, _)| *n).collect();
            anyhow::anyhow!(
                "unknown restriction enzyme {name:?}; known enzymes: {}",
                known.join(", ")
            )
        })
}

/// Split a `^`-annotated pattern into its cut offset and the concrete
/// sequences it matches, expanding IUPAC `N` to every base.
fn expand_pattern(pattern: &str) -> Result<(Vec<Vec<u8>>, usize)> {
    let Some(offset) = pattern.find('^') else {
        bail!("restriction pattern {pattern:?} is missing the cut mark '^'");
    };
    let bare: String = pattern.chars().filter(|&c| c != '^').collect();

    fn expand(seq: &[u8]) -> Vec<Vec<u8>> {
        match seq.iter().position(|&b| b == b'N') {
            None => vec![seq.to_vec()],
            Some(i) => {
                let mut out = Vec::new();
                for base in [b'A', b'C', b'G', b'T'] {
                    let mut concrete = seq.to_vec();
                    concrete[i] = base;
                    out.extend(expand(&concrete));
                }
                out
            }
        }
    }

    let mut upper = bare.into_bytes();
    upper.make_ascii_uppercase();
    Ok((expand(&upper), offset))
}

/// Scan `seq` for every pattern occurrence, overlap-aware, and return the
/// cut positions (match start + cut offset) in ascending order.
fn cut_sites(seq: &[u8], patterns: &[Vec<u8>], offset: usize) -> Vec<u64> {
    let mut sites = Vec::new();
    let pat_len = match patterns.first() {
        Some(p) => p.len(),
        None => return sites,
    };
    if seq.len() < pat_len {
        return sites;
    }
    for start in 0..=(seq.len() - pat_len) {
        let window = &seq[start..start + pat_len];
        if patterns.iter().any(|p| window.eq_ignore_ascii_case(p)) {
            sites.push((start + offset) as u64);
        }
    }
    sites
}

/// Bucket sorted cut sites into fixed-size windows.
///
/// The final chunk gains the chromosome length as a terminal boundary, then
/// every chunk borrows its successor's first site, back to front, so any
/// position inside a window finds a downstream site in its own chunk.
fn chunk_sites(sites: Vec<u64>, len: u64, chunk_size: u64) -> Vec<Vec<u64>> {
    let nchunks = (len / chunk_size) as usize + 1;
    let mut chunks = vec![Vec::new(); nchunks];
    for site in sites {
        chunks[(site / chunk_size) as usize].push(site);
    }
    if chunks[nchunks - 1].last() != Some(&len) {
        chunks[nchunks - 1].push(len);
    }
    for i in (0..nchunks - 1).rev() {
        if let Some(&next_first) = chunks[i + 1].first() {
            chunks[i].push(next_first);
        }
    }
    chunks
}

/// Digest every chromosome of `genome` with the named enzyme and build the
/// chunked fragment table consumed by the read annotator.
pub fn build_fragment_table(
    enzyme: &str,
    genome: &Genome,
    chunk_size: u64,
) -> Result<FragmentTable> {
    let (patterns, offset) = expand_pattern(lookup_enzyme(enzyme)?)?;
    let mut table = FragmentTable::new(chunk_size);
    for (name, seq) in genome.iter() {
        let sites = cut_sites(seq, &patterns, offset);
        log::debug!("{name}: {} {enzyme} sites", sites.len());
        table.insert_chromosome(name, chunk_sites(sites, seq.len() as u64, chunk_size));
    }
    Ok(table)
}
