/// External-sort behavior: equivalence with an in-memory stable sort,
/// merge stability across batches, and batch-size independence.
use hicsort::sort::{sort_key, ExternalSorter};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fs;
use tempfile::TempDir;

fn external_sort(lines: &[String], batch_size: usize) -> Vec<String> {
    let dir = TempDir::new().unwrap();
    let mut sorter = ExternalSorter::new(dir.path(), batch_size);
    for line in lines {
        sorter.push(line.clone()).unwrap();
    }
    let sorted = sorter.finish().unwrap().expect("input was not empty");
    fs::read_to_string(&sorted)
        .unwrap()
        .lines()
        .map(String::from)
        .collect()
}

fn reference_sort(lines: &[String]) -> Vec<String> {
    let mut sorted = lines.to_vec();
    sorted.sort_by(|a, b| sort_key(a).cmp(sort_key(b)));
    sorted
}

#[test]
fn matches_in_memory_sort_across_batch_sizes() {
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    let mut lines: Vec<String> = (0..500)
        .map(|i| format!("read{:03}\tchr1\t{}", i % 97, i))
        .collect();
    lines.shuffle(&mut rng);

    let expected = reference_sort(&lines);
    for batch_size in [1, 2, 7, 100, 1000] {
        assert_eq!(external_sort(&lines, batch_size), expected);
    }
}

#[test]
fn equal_keys_keep_original_order_across_batches() {
    // The shared key lands in batches 1, 2, and 3; payloads record the
    // original input order.
    let lines: Vec<String> = vec![
        "dup~a\tfirst".to_string(),
        "aaa\tx".to_string(),
        "dup~b\tsecond".to_string(),
        "bbb\tx".to_string(),
        "dup~c\tthird".to_string(),
    ];
    let sorted = external_sort(&lines, 2);
    assert_eq!(
        sorted,
        vec![
            "aaa\tx",
            "bbb\tx",
            "dup~a\tfirst",
            "dup~b\tsecond",
            "dup~c\tthird",
        ]
    );
}

#[test]
fn mate_suffixes_share_one_key() {
    let lines: Vec<String> = vec![
        "read1~2\tsecond-iteration".to_string(),
        "read10\tother".to_string(),
        "read1~1\tfirst-iteration".to_string(),
    ];
    // "read1~2" and "read1~1" both key as "read1" and precede "read10".
    let sorted = external_sort(&lines, 1);
    assert_eq!(
        sorted,
        vec![
            "read1~2\tsecond-iteration",
            "read1~1\tfirst-iteration",
            "read10\tother",
        ]
    );
}

proptest! {
    #[test]
    fn external_sort_equals_stable_sort(
        keys in proptest::collection::vec("[a-e]{1,3}", 1..120),
        batch_size in 1usize..20,
    ) {
        let lines: Vec<String> = keys
            .iter()
            .enumerate()
            .map(|(i, key)| format!("{key}\tpayload{i}"))
            .collect();
        prop_assert_eq!(external_sort(&lines, batch_size), reference_sort(&lines));
    }
}
