//! Reconstruction of a dense distance matrix from a pairwise distance stream.
//!
//! The input is the tab separated stream produced by mash dist run over the full
//! Cartesian product of a sketch set : one line per ordered pair
//! (source, target, distance, ...), self pairs included, enumerated row major so
//! that every pair of row i arrives before any pair of row i+1. The id set is not
//! known in advance : it is discovered while consuming the first row, which ends
//! when the source id changes.
//!
//! The transform is a single forward pass. It holds the id list and the values of
//! the row in progress, nothing more. Each completed row is written out
//! immediately : header first, then one line per id, values in header order.
//! Distance tokens are copied verbatim, never reparsed.
//!
//! Any contradiction of the assumed ordering is fatal. The error names the pair
//! and the expected position so a corrupted or incompatible upstream distance
//! file can be told apart from a software defect. Rows already written stay on
//! disk, there is no rollback and no retry.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use thiserror::Error;

/// All the ways a distance stream can contradict the row major all pairs layout,
/// plus line format and io failures.
#[derive(Debug, Error)]
pub enum MatrixError {
    #[error("line {lineno} : expected at least 3 tab separated fields, got {nfields}")]
    MalformedLine { lineno: usize, nfields: usize },
    #[error("first pair {source}-{target} is not a self pair")]
    FirstPairNotSelf { source: String, target: String },
    #[error("second row opens with pair {source}-{target}, expected {expected_source}-{expected_target}")]
    SecondRowNotInOrder {
        source: String,
        target: String,
        expected_source: String,
        expected_target: String,
    },
    #[error("pair {source}-{target} is not in order, expected {expected_source}-{expected_target}")]
    PairNotInOrder {
        source: String,
        target: String,
        expected_source: String,
        expected_target: String,
    },
    #[error("source ids are not in order : row opens with {source}, expected {expected}")]
    SourceIdsNotInOrder { source: String, expected: String },
    #[error("target ids are not in order : row {source} opens with target {target}, expected {expected}")]
    TargetIdsNotInOrder {
        source: String,
        target: String,
        expected: String,
    },
    #[error("pair {source}-{target} arrived after the last row was complete")]
    TrailingPair { source: String, target: String },
    #[error("stream ended prematurely : {0}")]
    TruncatedStream(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
} // end of MatrixError

/// one parsed line of the distance stream. Fields beyond the third are ignored
/// (mash dist appends p-value and shared hash count).
struct PairLine<'a> {
    source: &'a str,
    target: &'a str,
    distance: &'a str,
}

impl<'a> PairLine<'a> {
    /// line format validation, done before any ordering logic runs
    fn parse(line: &'a str, lineno: usize) -> Result<Self, MatrixError> {
        let mut fields = line.split('\t');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(source), Some(target), Some(distance)) => Ok(PairLine {
                source,
                target,
                distance,
            }),
            _ => Err(MatrixError::MalformedLine {
                lineno,
                nfields: line.split('\t').count(),
            }),
        }
    } // end of parse
} // end of impl PairLine

fn write_header<W: Write>(out: &mut W, ids: &[String]) -> Result<(), MatrixError> {
    writeln!(out, "\t{}", ids.join("\t"))?;
    Ok(())
}

fn write_row<W: Write>(out: &mut W, id: &str, vals: &[String]) -> Result<(), MatrixError> {
    writeln!(out, "{}\t{}", id, vals.join("\t"))?;
    Ok(())
}

//========================================================================================

/// state while the first row is being consumed : the id list grows with each pair
struct DiscoveringIds {
    ids: Vec<String>,
    row_vals: Vec<String>,
}

/// state once the id order is frozen : values of the row in progress accumulate
/// and the column cursor tracks the expected position inside it
struct StreamingRows {
    ids: Vec<String>,
    row: usize,
    row_vals: Vec<String>,
    cursor: usize,
}

enum ReshapeState {
    Discovering(DiscoveringIds),
    Streaming(StreamingRows),
}

impl DiscoveringIds {
    fn new() -> Self {
        DiscoveringIds {
            ids: Vec::new(),
            row_vals: Vec::new(),
        }
    }

    fn step<W: Write>(mut self, pair: &PairLine, out: &mut W) -> Result<ReshapeState, MatrixError> {
        if self.ids.is_empty() {
            // the stream must open on the diagonal
            if pair.source != pair.target {
                return Err(MatrixError::FirstPairNotSelf {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                });
            }
            self.ids.push(pair.source.to_string());
            self.row_vals.push(pair.distance.to_string());
            Ok(ReshapeState::Discovering(self))
        } else if pair.source == self.ids[0] {
            // still inside row 0, one more id discovered
            self.ids.push(pair.target.to_string());
            self.row_vals.push(pair.distance.to_string());
            Ok(ReshapeState::Discovering(self))
        } else {
            // the source changed : row 0 has wrapped, the id order is frozen.
            // header and row 0 go out before the opening pair of row 1 is validated
            write_header(out, &self.ids)?;
            write_row(out, &self.ids[0], &self.row_vals)?;
            if self.ids.len() < 2 {
                // a 1 id matrix has no second row to open
                return Err(MatrixError::TrailingPair {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                });
            }
            if pair.source != self.ids[1] || pair.target != self.ids[0] {
                return Err(MatrixError::SecondRowNotInOrder {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                    expected_source: self.ids[1].clone(),
                    expected_target: self.ids[0].clone(),
                });
            }
            log::debug!("id discovery complete, {} ids", self.ids.len());
            Ok(ReshapeState::Streaming(StreamingRows {
                ids: self.ids,
                row: 1,
                row_vals: vec![pair.distance.to_string()],
                cursor: 1,
            }))
        }
    } // end of step

    /// end of stream reached while still discovering. A single self pair is the
    /// legitimate 1x1 matrix, anything longer never produced its later rows.
    fn finish<W: Write>(self, out: &mut W) -> Result<usize, MatrixError> {
        match self.ids.len() {
            0 => {
                log::warn!("empty distance stream, no matrix written");
                Ok(0)
            }
            1 => {
                write_header(out, &self.ids)?;
                write_row(out, &self.ids[0], &self.row_vals)?;
                Ok(1)
            }
            n => Err(MatrixError::TruncatedStream(format!(
                "{} ids discovered but no further row arrived",
                n
            ))),
        }
    } // end of finish
} // end of impl DiscoveringIds

impl StreamingRows {
    fn step<W: Write>(mut self, pair: &PairLine, out: &mut W) -> Result<Self, MatrixError> {
        let nb_ids = self.ids.len();
        if self.cursor < nb_ids {
            // inside the current row : the pair must sit at the cursor position
            if pair.source != self.ids[self.row] || pair.target != self.ids[self.cursor] {
                return Err(MatrixError::PairNotInOrder {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                    expected_source: self.ids[self.row].clone(),
                    expected_target: self.ids[self.cursor].clone(),
                });
            }
            self.row_vals.push(pair.distance.to_string());
            self.cursor += 1;
        } else {
            // current row complete : this pair opens the next one
            if self.row + 1 >= nb_ids {
                return Err(MatrixError::TrailingPair {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                });
            }
            if pair.source != self.ids[self.row + 1] {
                return Err(MatrixError::SourceIdsNotInOrder {
                    source: pair.source.to_string(),
                    expected: self.ids[self.row + 1].clone(),
                });
            }
            if pair.target != self.ids[0] {
                return Err(MatrixError::TargetIdsNotInOrder {
                    source: pair.source.to_string(),
                    target: pair.target.to_string(),
                    expected: self.ids[0].clone(),
                });
            }
            write_row(out, &self.ids[self.row], &self.row_vals)?;
            self.row += 1;
            self.row_vals.clear();
            self.row_vals.push(pair.distance.to_string());
            self.cursor = 1;
        }
        Ok(self)
    } // end of step

    /// end of stream : the row in progress is only known complete here, so this
    /// is the one place it gets flushed
    fn finish<W: Write>(self, out: &mut W) -> Result<usize, MatrixError> {
        let nb_ids = self.ids.len();
        if self.cursor < nb_ids {
            return Err(MatrixError::TruncatedStream(format!(
                "row {} ended after {} of {} values",
                self.ids[self.row], self.cursor, nb_ids
            )));
        }
        if self.row + 1 < nb_ids {
            return Err(MatrixError::TruncatedStream(format!(
                "stream ended after row {} of {}",
                self.row + 1,
                nb_ids
            )));
        }
        write_row(out, &self.ids[self.row], &self.row_vals)?;
        Ok(nb_ids)
    } // end of finish
} // end of impl StreamingRows

//========================================================================================

/// Consumes a pairwise distance stream and writes the dense matrix : a header
/// line (empty cell then the ids in discovery order) followed by one line per id.
/// Returns the number of matrix rows written.
///
/// The stream is read exactly once and the matrix is written incrementally, so
/// on error the rows flushed so far remain in the output.
pub fn reshape<R: BufRead, W: Write>(input: R, output: &mut W) -> Result<usize, MatrixError> {
    let mut state = ReshapeState::Discovering(DiscoveringIds::new());
    let mut lineno = 0;
    for line in input.lines() {
        let line = line?;
        lineno += 1;
        let pair = PairLine::parse(&line, lineno)?;
        state = match state {
            ReshapeState::Discovering(ctx) => ctx.step(&pair, output)?,
            ReshapeState::Streaming(ctx) => ReshapeState::Streaming(ctx.step(&pair, output)?),
        };
    }
    // end of stream triggers the final flush, exactly once
    match state {
        ReshapeState::Discovering(ctx) => ctx.finish(output),
        ReshapeState::Streaming(ctx) => ctx.finish(output),
    }
} // end of reshape

/// Opens a distance stream file (gunzipped on the fly if the path ends in .gz),
/// reshapes it and writes the uncompressed matrix file.
pub fn matrix_from_dist_file(dist_fp: &Path, matrix_fp: &Path) -> Result<usize, MatrixError> {
    log::info!("reshaping distance stream {:?} into {:?}", dist_fp, matrix_fp);
    let input = open_dist_stream(dist_fp)?;
    let mut writer = BufWriter::new(File::create(matrix_fp)?);
    let nb_rows = reshape(input, &mut writer)?;
    writer.flush()?;
    log::info!("wrote {} matrix rows", nb_rows);
    Ok(nb_rows)
} // end of matrix_from_dist_file

fn open_dist_stream(path: &Path) -> Result<Box<dyn BufRead>, MatrixError> {
    let file = File::open(path)?;
    if path.extension().is_some_and(|ext| ext == "gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
} // end of open_dist_stream

//========================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn reshape_str(input: &str) -> Result<(usize, String), MatrixError> {
        let mut out = Vec::new();
        let nb_rows = reshape(input.as_bytes(), &mut out)?;
        Ok((nb_rows, String::from_utf8(out).unwrap()))
    }

    fn triples(ids: &[&str], dist: &[&[&str]]) -> String {
        let mut lines = String::new();
        for (i, row_id) in ids.iter().enumerate() {
            for (j, col_id) in ids.iter().enumerate() {
                lines.push_str(&format!("{}\t{}\t{}\n", row_id, col_id, dist[i][j]));
            }
        }
        lines
    }

    #[test]
    fn three_by_three_literal() {
        let input = "G1\tG1\t0\nG1\tG2\t1\nG1\tG3\t2\n\
                     G2\tG1\t1\nG2\tG2\t0\nG2\tG3\t3\n\
                     G3\tG1\t2\nG3\tG2\t3\nG3\tG3\t0\n";
        let (nb_rows, matrix) = reshape_str(input).unwrap();
        assert_eq!(nb_rows, 3);
        assert_eq!(
            matrix,
            "\tG1\tG2\tG3\nG1\t0\t1\t2\nG2\t1\t0\t3\nG3\t2\t3\t0\n"
        );
    }

    #[test]
    fn distance_tokens_kept_verbatim() {
        // mash emits 5 fields and distances like 0.0222766 or 1e-05
        let input = "a\ta\t0\t0\t1000/1000\na\tb\t2.99e-02\t0\t500/1000\n\
                     b\ta\t2.99e-02\t0\t500/1000\nb\tb\t0\t0\t1000/1000\n";
        let (_, matrix) = reshape_str(input).unwrap();
        assert_eq!(matrix, "\ta\tb\na\t0\t2.99e-02\nb\t2.99e-02\t0\n");
    }

    #[test]
    fn pair_not_in_order() {
        let input = "A\tA\t0.0\nA\tB\t0.5\nB\tA\t0.5\nA\tA\t0.0\n";
        match reshape_str(input) {
            Err(MatrixError::PairNotInOrder { source, target, .. }) => {
                assert_eq!(source, "A");
                assert_eq!(target, "A");
            }
            other => panic!("expected PairNotInOrder, got {:?}", other.map(|r| r.1)),
        }
    }

    #[test]
    fn first_pair_must_be_self() {
        let input = "A\tB\t0.5\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::FirstPairNotSelf { .. })
        ));
    }

    #[test]
    fn second_row_out_of_order() {
        // row 1 must open with (ids[1], ids[0])
        let input = "A\tA\t0\nA\tB\t1\nC\tA\t1\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::SecondRowNotInOrder { .. })
        ));
    }

    #[test]
    fn row_ids_out_of_order() {
        // 3 ids, row 1 complete, then a row opening with the wrong id
        let input = "A\tA\t0\nA\tB\t1\nA\tC\t2\n\
                     B\tA\t1\nB\tB\t0\nB\tC\t3\n\
                     B\tA\t2\n";
        match reshape_str(input) {
            Err(MatrixError::SourceIdsNotInOrder { source, expected }) => {
                assert_eq!(source, "B");
                assert_eq!(expected, "C");
            }
            other => panic!("expected SourceIdsNotInOrder, got {:?}", other.map(|r| r.1)),
        }
    }

    #[test]
    fn row_restart_out_of_order() {
        // row 2 opens with the right source but does not re-pair with ids[0]
        let input = "A\tA\t0\nA\tB\t1\nA\tC\t2\n\
                     B\tA\t1\nB\tB\t0\nB\tC\t3\n\
                     C\tB\t3\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::TargetIdsNotInOrder { .. })
        ));
    }

    #[test]
    fn single_self_pair_is_a_one_by_one_matrix() {
        let (nb_rows, matrix) = reshape_str("A\tA\t0.0\n").unwrap();
        assert_eq!(nb_rows, 1);
        assert_eq!(matrix, "\tA\nA\t0.0\n");
    }

    #[test]
    fn two_by_two_minimal() {
        let input = "A\tA\t0\nA\tB\t0.5\nB\tA\t0.5\nB\tB\t0\n";
        let (nb_rows, matrix) = reshape_str(input).unwrap();
        assert_eq!(nb_rows, 2);
        assert_eq!(matrix, "\tA\tB\nA\t0\t0.5\nB\t0.5\t0\n");
    }

    #[test]
    fn empty_stream_writes_nothing() {
        let (nb_rows, matrix) = reshape_str("").unwrap();
        assert_eq!(nb_rows, 0);
        assert!(matrix.is_empty());
    }

    #[test]
    fn truncated_after_discovery() {
        // row 0 of a 3x3 only : later rows never arrive
        let input = "A\tA\t0\nA\tB\t1\nA\tC\t2\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::TruncatedStream(_))
        ));
    }

    #[test]
    fn truncated_mid_row() {
        let input = "A\tA\t0\nA\tB\t1\nA\tC\t2\nB\tA\t1\nB\tB\t0\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::TruncatedStream(_))
        ));
    }

    #[test]
    fn trailing_pair_after_last_row() {
        let input = "A\tA\t0\nA\tB\t0.5\nB\tA\t0.5\nB\tB\t0\nB\tB\t0\n";
        assert!(matches!(
            reshape_str(input),
            Err(MatrixError::TrailingPair { .. })
        ));
    }

    #[test]
    fn malformed_line_detected_before_ordering() {
        let input = "A\tA\t0\nA B 0.5\n";
        match reshape_str(input) {
            Err(MatrixError::MalformedLine { lineno, nfields }) => {
                assert_eq!(lineno, 2);
                assert_eq!(nfields, 1);
            }
            other => panic!("expected MalformedLine, got {:?}", other.map(|r| r.1)),
        }
    }

    #[test]
    fn matrix_cells_match_input_triples() {
        let ids = ["g_3", "g_1", "g_2", "g_0"];
        let dist: &[&[&str]] = &[
            &["0", "0.12", "0.34", "0.56"],
            &["0.12", "0", "0.78", "0.9"],
            &["0.34", "0.78", "0", "0.11"],
            &["0.56", "0.9", "0.11", "0"],
        ];
        let (nb_rows, matrix) = reshape_str(&triples(&ids, dist)).unwrap();
        assert_eq!(nb_rows, 4);
        let mut lines = matrix.lines();
        let header: Vec<&str> = lines.next().unwrap().split('\t').collect();
        assert_eq!(&header[1..], &ids);
        for (i, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split('\t').collect();
            assert_eq!(fields[0], ids[i]);
            assert_eq!(&fields[1..], dist[i]);
        }
    }

    #[test]
    fn round_trip_through_flattening() {
        let ids = ["x", "y", "z"];
        let dist: &[&[&str]] = &[
            &["0", "0.5", "0.25"],
            &["0.5", "0", "0.75"],
            &["0.25", "0.75", "0", ],
        ];
        let input = triples(&ids, dist);
        let (_, matrix) = reshape_str(&input).unwrap();
        // re-flatten the matrix row major and reshape again
        let mut lines = matrix.lines();
        let header: Vec<String> = lines
            .next()
            .unwrap()
            .split('\t')
            .skip(1)
            .map(String::from)
            .collect();
        let mut reflattened = String::new();
        for line in lines {
            let fields: Vec<&str> = line.split('\t').collect();
            for (col, val) in header.iter().zip(&fields[1..]) {
                reflattened.push_str(&format!("{}\t{}\t{}\n", fields[0], col, val));
            }
        }
        assert_eq!(reflattened, input);
        let (_, matrix_again) = reshape_str(&reflattened).unwrap();
        assert_eq!(matrix_again, matrix);
    }
} // end of mod tests
