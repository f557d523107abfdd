//! gsubsample : post processing of genome downloads for a subsampling pipeline.
//!
//! Three stages, each usable on its own from the `gsubsample` binary :
//! - [`catalog`] filters a downloaded genome catalog into good/bad partitions
//!   by a combined quality score, and reports basic catalog statistics,
//! - [`mashdist`] drives the external mash tool over a directory of genome
//!   files to produce the gzipped all pairs distance stream,
//! - [`matrix`] reshapes the distance stream into a dense symmetric distance
//!   matrix, validating the row major ordering the stream is assumed to carry.

pub mod catalog;
pub mod mashdist;
pub mod matrix;
pub mod utils;
