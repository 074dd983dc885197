use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Lines, Write};
use std::path::{Path, PathBuf};

/// Sort/grouping key of a serialized read line: the read identifier up to the
/// first tab, truncated at the first `~` so every mate and mapping iteration
/// of one physical read compares equal.
pub fn sort_key(line: &str) -> &str {
    let head = match line.find('\t') {
        Some(i) => &line[..i],
        None => line,
    };
    match head.find('~') {
        Some(i) => &head[..i],
        None => head,
    }
}

/// Bounded-memory external sorter over serialized read lines.
///
/// Lines accumulate in an in-memory batch; each full batch is stable-sorted
/// by [`sort_key`] and spilled to its own temporary file, so peak memory is
/// one batch regardless of input size. `finish` then merges the spilled runs
/// pairwise, always popping the two oldest pending files, until a single
/// fully-sorted file remains. Equal keys never reorder: the in-memory sort is
/// stable and the merge prefers the older input on ties.
pub struct ExternalSorter {
    arena: PathBuf,
    batch_size: usize,
    buffer: Vec<String>,
    pending: VecDeque<PathBuf>,
    serial: usize,
}

impl ExternalSorter {
    /// `arena` is the directory receiving the temporary files; the caller
    /// owns its lifetime (and with it, cleanup of anything left inside).
    pub fn new(arena: &Path, batch_size: usize) -> Self {
        ExternalSorter {
            arena: arena.to_path_buf(),
            batch_size: batch_size.max(1),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            serial: 0,
        }
    }

    pub fn push(&mut self, line: String) -> Result<()> {
        self.buffer.push(line);
        if self.buffer.len() >= self.batch_size {
            self.spill()?;
        }
        Ok(())
    }

    /// Sort the current batch and write it out; an empty batch spills nothing.
    fn spill(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.buffer.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));

        self.serial += 1;
        let path = self.arena.join(format!("batch_{:03}.tsv", self.serial));
        let mut out = BufWriter::new(
            File::create(&path)
                .with_context(|| format!("cannot create spill file {}", path.display()))?,
        );
        for line in &self.buffer {
            writeln!(out, "{line}")?;
        }
        out.flush()?;
        self.buffer.clear();
        self.pending.push_back(path);
        Ok(())
    }

    /// Flush the last batch and merge all spilled runs down to one file.
    ///
    /// Runs merge in passes of adjacent pairs, oldest first, so every merge's
    /// first input holds earlier batches than its second and equal keys keep
    /// their original batch order all the way down. An odd leftover run (the
    /// newest of its pass) is carried into the next pass unmerged.
    ///
    /// Returns `None` when nothing was ever pushed.
    pub fn finish(mut self) -> Result<Option<PathBuf>> {
        self.spill()?;
        while self.pending.len() > 1 {
            let mut next_pass = VecDeque::new();
            while self.pending.len() >= 2 {
                let first = self.pending.pop_front().expect("two files pending");
                let second = self.pending.pop_front().expect("two files pending");
                self.serial += 1;
                let merged = self.arena.join(format!("merge_{:03}.tsv", self.serial));
                merge_pair(&first, &second, &merged)?;
                fs::remove_file(&first)?;
                fs::remove_file(&second)?;
                next_pass.push_back(merged);
            }
            if let Some(odd) = self.pending.pop_front() {
                next_pass.push_back(odd);
            }
            self.pending = next_pass;
        }
        Ok(self.pending.pop_front())
    }
}

fn next_line(lines: &mut Lines<BufReader<File>>) -> Result<Option<String>> {
    lines.next().transpose().map_err(Into::into)
}

/// Two-pointer merge of two key-sorted files. The second file's record is
/// taken only when its key is strictly smaller, so equal keys keep the first
/// (older) file's records in front.
fn merge_pair(first: &Path, second: &Path, out: &Path) -> Result<()> {
    let mut a = BufReader::new(File::open(first)?).lines();
    let mut b = BufReader::new(File::open(second)?).lines();
    let mut writer = BufWriter::new(File::create(out)?);

    let mut line_a = next_line(&mut a)?;
    let mut line_b = next_line(&mut b)?;
    loop {
        match (&line_a, &line_b) {
            (Some(la), Some(lb)) => {
                if sort_key(lb) < sort_key(la) {
                    writeln!(writer, "{lb}")?;
                    line_b = next_line(&mut b)?;
                } else {
                    writeln!(writer, "{la}")?;
                    line_a = next_line(&mut a)?;
                }
            }
            (Some(la), None) => {
                writeln!(writer, "{la}")?;
                line_a = next_line(&mut a)?;
            }
            (None, Some(lb)) => {
                writeln!(writer, "{lb}")?;
                line_b = next_line(&mut b)?;
            }
            (None, None) => break,
        }
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn collect_lines(path: &Path) -> Vec<String> {
        let content = fs::read_to_string(path).unwrap();
        content.lines().map(String::from).collect()
    }

    #[test]
    fn key_strips_tab_suffix_and_tilde() {
        assert_eq!(sort_key("readA\tchr1\t50"), "readA");
        assert_eq!(sort_key("readA~2\tchr1\t50"), "readA");
        assert_eq!(sort_key("readA~2~3\tchr1"), "readA");
        assert_eq!(sort_key("readA"), "readA");
    }

    #[test]
    fn empty_input_produces_no_file() {
        let dir = TempDir::new().unwrap();
        let sorter = ExternalSorter::new(dir.path(), 10);
        assert!(sorter.finish().unwrap().is_none());
    }

    #[test]
    fn single_batch_is_sorted_in_memory() {
        let dir = TempDir::new().unwrap();
        let mut sorter = ExternalSorter::new(dir.path(), 100);
        for id in ["c", "a", "b"] {
            sorter.push(format!("{id}\tchr1\t1")).unwrap();
        }
        let sorted = sorter.finish().unwrap().unwrap();
        assert_eq!(
            collect_lines(&sorted),
            vec!["a\tchr1\t1", "b\tchr1\t1", "c\tchr1\t1"]
        );
    }

    #[test]
    fn multiple_batches_merge_to_total_order() {
        let dir = TempDir::new().unwrap();
        let mut sorter = ExternalSorter::new(dir.path(), 2);
        for id in ["f", "c", "a", "e", "b", "d", "g"] {
            sorter.push(format!("{id}\tx")).unwrap();
        }
        let sorted = sorter.finish().unwrap().unwrap();
        let keys: Vec<String> = collect_lines(&sorted)
            .iter()
            .map(|l| sort_key(l).to_string())
            .collect();
        assert_eq!(keys, vec!["a", "b", "c", "d", "e", "f", "g"]);
    }

    #[test]
    fn merge_keeps_equal_keys_in_batch_order() {
        // Batch size 1: every line is its own run, so any reordering of
        // equal keys would come from the merge network.
        let dir = TempDir::new().unwrap();
        let mut sorter = ExternalSorter::new(dir.path(), 1);
        sorter.push("dup~1\tfirst".to_string()).unwrap();
        sorter.push("dup~2\tsecond".to_string()).unwrap();
        sorter.push("dup~3\tthird".to_string()).unwrap();
        let sorted = sorter.finish().unwrap().unwrap();
        assert_eq!(
            collect_lines(&sorted),
            vec!["dup~1\tfirst", "dup~2\tsecond", "dup~3\tthird"]
        );
    }

    #[test]
    fn intermediate_spill_files_are_deleted() {
        let dir = TempDir::new().unwrap();
        let mut sorter = ExternalSorter::new(dir.path(), 1);
        for id in ["d", "c", "b", "a"] {
            sorter.push(format!("{id}\tx")).unwrap();
        }
        let sorted = sorter.finish().unwrap().unwrap();
        let remaining: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(remaining, vec![sorted]);
    }
}
