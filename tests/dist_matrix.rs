//! end to end reshaping of a distance stream file into a matrix file

use std::fs::File;
use std::io::Write;

use flate2::write::GzEncoder;
use flate2::Compression;

use gsubsample::matrix::{matrix_from_dist_file, MatrixError};

// a mash dist like stream over 3 genomes : 5 fields, row major, self pairs on
// the diagonal
const STREAM: &str = "\
G1\tG1\t0\t0\t1000/1000
G1\tG2\t0.0157\t0\t538/1000
G1\tG3\t0.0222\t0\t438/1000
G2\tG1\t0.0157\t0\t538/1000
G2\tG2\t0\t0\t1000/1000
G2\tG3\t0.0301\t0\t361/1000
G3\tG1\t0.0222\t0\t438/1000
G3\tG2\t0.0301\t0\t361/1000
G3\tG3\t0\t0\t1000/1000
";

const MATRIX: &str = "\
\tG1\tG2\tG3
G1\t0\t0.0157\t0.0222
G2\t0.0157\t0\t0.0301
G3\t0.0222\t0.0301\t0
";

#[test]
fn gzipped_stream_to_matrix_file() {
    let dir = tempfile::tempdir().unwrap();
    let dist_fp = dir.path().join("genomes.dist.gz");
    let mut encoder = GzEncoder::new(File::create(&dist_fp).unwrap(), Compression::default());
    encoder.write_all(STREAM.as_bytes()).unwrap();
    encoder.finish().unwrap();

    let matrix_fp = dir.path().join("dist_matrix.txt");
    let nb_rows = matrix_from_dist_file(&dist_fp, &matrix_fp).unwrap();
    assert_eq!(nb_rows, 3);
    assert_eq!(std::fs::read_to_string(&matrix_fp).unwrap(), MATRIX);
}

#[test]
fn plain_stream_to_matrix_file() {
    let dir = tempfile::tempdir().unwrap();
    let dist_fp = dir.path().join("genomes.dist");
    std::fs::write(&dist_fp, STREAM).unwrap();

    let matrix_fp = dir.path().join("dist_matrix.txt");
    let nb_rows = matrix_from_dist_file(&dist_fp, &matrix_fp).unwrap();
    assert_eq!(nb_rows, 3);
    assert_eq!(std::fs::read_to_string(&matrix_fp).unwrap(), MATRIX);
}

#[test]
fn ordering_violation_aborts_but_keeps_flushed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let dist_fp = dir.path().join("genomes.dist");
    // row 1 carries a swapped pair : header and row 0 are already on disk when
    // the violation is detected
    std::fs::write(
        &dist_fp,
        "G1\tG1\t0\nG1\tG2\t0.5\nG2\tG1\t0.5\nG1\tG2\t0.5\n",
    )
    .unwrap();

    let matrix_fp = dir.path().join("dist_matrix.txt");
    let err = matrix_from_dist_file(&dist_fp, &matrix_fp).unwrap_err();
    assert!(matches!(err, MatrixError::PairNotInOrder { .. }));
    let partial = std::fs::read_to_string(&matrix_fp).unwrap();
    assert_eq!(partial, "\tG1\tG2\nG1\t0\t0.5\n");
}
