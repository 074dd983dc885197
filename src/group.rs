use crate::sort::sort_key;
use anyhow::{bail, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

/// Stream a key-sorted reads file into `out`, collapsing consecutive lines
/// that share a grouping key into one `|||`-joined multi-contact record.
///
/// The grouping key is the read identifier before the first tab, truncated at
/// the first `~` (mate / mapping-iteration suffixes never split a group).
/// Returns the number of joins performed.
///
/// An empty input is an error: nothing was parsed at all, which almost always
/// means the map files and the genome disagree on chromosome names.
pub fn group_contacts<W: Write>(sorted: &Path, out: &mut W) -> Result<u64> {
    let reader = BufReader::new(File::open(sorted)?);
    let mut lines = reader.lines();

    let mut pending = match lines.next().transpose()? {
        Some(line) => line,
        None => bail!(
            "nothing parsed: check input files and chromosome names \
             (genome FASTA vs map files)"
        ),
    };
    let mut current_key = sort_key(&pending).to_string();
    let mut multis = 0u64;

    for line in lines {
        let line = line?;
        let key = sort_key(&line);
        if key == current_key {
            multis += 1;
            pending.truncate(pending.trim_end().len());
            pending.push_str("|||");
            pending.push_str(&line);
        } else {
            current_key = key.to_string();
            writeln!(out, "{pending}")?;
            pending = line;
        }
    }
    writeln!(out, "{pending}")?;
    Ok(multis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use tempfile::NamedTempFile;

    fn grouped(content: &str) -> (String, u64) {
        let mut input = NamedTempFile::new().unwrap();
        write!(input, "{content}").unwrap();
        input.flush().unwrap();
        let mut out = Vec::new();
        let multis = group_contacts(input.path(), &mut out).unwrap();
        (String::from_utf8(out).unwrap(), multis)
    }

    #[test]
    fn distinct_keys_pass_through() {
        let (out, multis) = grouped("a\tchr1\t1\nb\tchr1\t2\n");
        assert_eq!(out, "a\tchr1\t1\nb\tchr1\t2\n");
        assert_eq!(multis, 0);
    }

    #[test]
    fn equal_keys_collapse_with_separator() {
        let (out, multis) = grouped("readB~1\tchr1\t150\nreadB~2\tchr2\t109\n");
        assert_eq!(out, "readB~1\tchr1\t150|||readB~2\tchr2\t109\n");
        assert_eq!(multis, 1);
    }

    #[test]
    fn three_way_group_counts_two_joins() {
        let (out, multis) = grouped("r~1\ta\nr~2\tb\nr~3\tc\ns\td\n");
        assert_eq!(out, "r~1\ta|||r~2\tb|||r~3\tc\ns\td\n");
        assert_eq!(multis, 2);
    }

    #[test]
    fn grouping_is_idempotent() {
        // Re-grouping grouped output must not merge anything further: the
        // first field of a joined record still carries the original key, but
        // every key is distinct after one pass.
        let (out, _) = grouped("r~1\ta\nr~2\tb\ns\tc\n");
        let (again, multis) = grouped(&out);
        assert_eq!(again, out);
        assert_eq!(multis, 0);
    }

    #[test]
    fn empty_input_is_fatal() {
        let input = NamedTempFile::new().unwrap();
        let mut out = Vec::new();
        let err = group_contacts(input.path(), &mut out).unwrap_err();
        assert!(err.to_string().contains("nothing parsed"));
    }
}
