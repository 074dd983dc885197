// Library exports for hicsort
pub mod annotate;
pub mod digest;
pub mod fasta;
pub mod fragments;
pub mod group;
pub mod pipeline;
pub mod sort;
