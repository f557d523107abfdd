//! Genome catalog filtering and summary.
//!
//! The catalog is a tab separated table keyed by genome id (column 0), carrying
//! per genome quality sub scores and sequence file path columns as produced by
//! the download machinery. Filtering combines a configurable subset of the score
//! columns into one scalar per genome, either a plain row average or the
//! normalized average used in the repophlan paper (per column z-score with
//! sample standard deviation, row averaged, min-max rescaled), then partitions
//! the table at a threshold into a .good and a .bad output table.
//!
//! The summary report gives basic statistics of a downloaded catalog.

use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::utils::parameters::FilterParams;

/// the catalog loaded in memory : header plus one record per genome.
/// Cells are kept as their original string tokens, numeric interpretation
/// happens only where a score is needed.
pub struct CatalogTable {
    header: StringRecord,
    rows: Vec<StringRecord>,
}

impl CatalogTable {
    /// reads a tab separated table with a header line, column 0 is the genome id
    pub fn from_path(catalog_fp: &Path) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .from_path(catalog_fp)
            .with_context(|| format!("could not open catalog {:?}", catalog_fp))?;
        let header = reader
            .headers()
            .with_context(|| format!("could not read catalog header of {:?}", catalog_fp))?
            .clone();
        if header.is_empty() {
            bail!("catalog {:?} has an empty header", catalog_fp);
        }
        let mut rows = Vec::new();
        for record in reader.records() {
            rows.push(record.with_context(|| format!("bad record in catalog {:?}", catalog_fp))?);
        }
        log::info!("loaded catalog {:?}, {} genomes", catalog_fp, rows.len());
        Ok(CatalogTable { header, rows })
    } // end of from_path

    pub fn nb_genomes(&self) -> usize {
        self.rows.len()
    }

    /// name of the index column
    pub fn index_name(&self) -> &str {
        &self.header[0]
    }

    fn col_index(&self, name: &str) -> Result<usize> {
        self.header
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| anyhow!("column {} not found in catalog", name))
    }

    fn cell<'a>(&self, row: &'a StringRecord, col: usize) -> &'a str {
        row.get(col).unwrap_or("")
    }
} // end of impl CatalogTable

/// a score cell holds a float or is missing (empty or unparseable, as pandas
/// reads NA tokens)
fn parse_score(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    match cell.parse::<f64>() {
        Ok(v) if v.is_finite() => Some(v),
        _ => None,
    }
}

/// row-wise mean of the present score cells. A genome with no parseable score
/// cell gets no combined score and will fall in the bad partition.
pub fn calc_avg_score(table: &CatalogTable, score_cols: &[String]) -> Result<Vec<Option<f64>>> {
    let col_idx = score_cols
        .iter()
        .map(|c| table.col_index(c))
        .collect::<Result<Vec<usize>>>()?;
    let mut scores = Vec::with_capacity(table.rows.len());
    for row in &table.rows {
        let vals: Vec<f64> = col_idx
            .iter()
            .filter_map(|&i| parse_score(table.cell(row, i)))
            .collect();
        if vals.is_empty() {
            scores.push(None);
        } else {
            scores.push(Some(vals.iter().sum::<f64>() / vals.len() as f64));
        }
    }
    Ok(scores)
} // end of calc_avg_score

/// normalized average : per column z-score with the column mean and sample
/// standard deviation (ddof = 1), averaged per row, min-max rescaled over the
/// table. A zero variance column carries no signal and contributes a z-score of
/// 0 instead of dividing by zero; a zero min-max range maps every genome to 0.
pub fn calc_norm_score(table: &CatalogTable, score_cols: &[String]) -> Result<Vec<Option<f64>>> {
    let col_idx = score_cols
        .iter()
        .map(|c| table.col_index(c))
        .collect::<Result<Vec<usize>>>()?;
    let nb_rows = table.rows.len();
    // per column : parsed values, mean and sample std over the present ones
    let mut zscores: Vec<Vec<Option<f64>>> = Vec::with_capacity(col_idx.len());
    for &i in &col_idx {
        let vals: Vec<Option<f64>> = table
            .rows
            .iter()
            .map(|row| parse_score(table.cell(row, i)))
            .collect();
        let present: Vec<f64> = vals.iter().filter_map(|v| *v).collect();
        let mean = present.iter().sum::<f64>() / present.len().max(1) as f64;
        let std = if present.len() > 1 {
            let var = present.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>()
                / (present.len() - 1) as f64;
            var.sqrt()
        } else {
            0.
        };
        let col_z = if std > 0. {
            vals.iter().map(|v| v.map(|v| (v - mean) / std)).collect()
        } else {
            // all identical (or at most one present value)
            vals.iter().map(|v| v.map(|_| 0.)).collect()
        };
        zscores.push(col_z);
    }
    // row averages of the z-scores
    let mut row_means: Vec<Option<f64>> = Vec::with_capacity(nb_rows);
    for r in 0..nb_rows {
        let vals: Vec<f64> = zscores.iter().filter_map(|col| col[r]).collect();
        if vals.is_empty() {
            row_means.push(None);
        } else {
            row_means.push(Some(vals.iter().sum::<f64>() / vals.len() as f64));
        }
    }
    // min-max rescale over the table
    let present: Vec<f64> = row_means.iter().filter_map(|v| *v).collect();
    let min = present.iter().cloned().fold(f64::INFINITY, f64::min);
    let max = present.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    Ok(row_means
        .iter()
        .map(|v| v.map(|v| if range > 0. { (v - min) / range } else { 0. }))
        .collect())
} // end of calc_norm_score

//========================================================================================

/// counts of the good/bad partition
pub struct FilterOutcome {
    pub nb_good: usize,
    pub nb_bad: usize,
}

/// Computes the combined score per genome and splits the catalog at the
/// threshold : combined score >= threshold goes to `<stem>.good`, the rest to
/// `<stem>.bad`. Both outputs are tab separated tables with the genome id, the
/// configured path columns, the raw score columns and the combined score.
pub fn filter_catalog(
    catalog_fp: &Path,
    output_stem: &str,
    params: &FilterParams,
) -> Result<FilterOutcome> {
    let table = CatalogTable::from_path(catalog_fp)?;
    let combined = if params.use_plain_avg() {
        calc_avg_score(&table, params.get_score_cols())?
    } else {
        calc_norm_score(&table, params.get_score_cols())?
    };
    // output column layout : id, path columns, raw score columns, combined
    let out_cols: Vec<&String> = params
        .get_fp_cols()
        .iter()
        .chain(params.get_score_cols().iter())
        .collect();
    let out_idx = out_cols
        .iter()
        .map(|c| table.col_index(c))
        .collect::<Result<Vec<usize>>>()?;
    let mut header: Vec<&str> = vec![table.index_name()];
    header.extend(out_cols.iter().map(|c| c.as_str()));
    header.push(params.combined_col());

    let good_fp = format!("{}.good", output_stem);
    let bad_fp = format!("{}.bad", output_stem);
    let mut good = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&good_fp)
        .with_context(|| format!("could not create {}", good_fp))?;
    let mut bad = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(&bad_fp)
        .with_context(|| format!("could not create {}", bad_fp))?;
    good.write_record(&header)?;
    bad.write_record(&header)?;

    let mut outcome = FilterOutcome {
        nb_good: 0,
        nb_bad: 0,
    };
    for (row, score) in table.rows.iter().zip(&combined) {
        let mut record: Vec<String> = vec![table.cell(row, 0).to_string()];
        record.extend(out_idx.iter().map(|&i| table.cell(row, i).to_string()));
        record.push(score.map_or(String::new(), |s| s.to_string()));
        // a genome without combined score cannot pass the threshold
        if score.is_some_and(|s| s >= params.get_threshold()) {
            good.write_record(&record)?;
            outcome.nb_good += 1;
        } else {
            bad.write_record(&record)?;
            outcome.nb_bad += 1;
        }
    }
    good.flush()?;
    bad.flush()?;
    log::info!(
        "filtered catalog {:?} : {} good, {} bad (threshold {})",
        catalog_fp,
        outcome.nb_good,
        outcome.nb_bad,
        params.get_threshold()
    );
    Ok(outcome)
} // end of filter_catalog

//========================================================================================

/// Human readable basic statistics of a downloaded catalog. Availability counts
/// are skipped with a warning when the catalog lacks the corresponding column.
pub fn catalog_summary(catalog_fp: &Path) -> Result<Vec<String>> {
    let table = CatalogTable::from_path(catalog_fp)?;
    let mut out = Vec::new();
    out.push(format!("Total number of genomes: {}.", table.nb_genomes()));
    match table.col_index("assembly_accession") {
        Ok(col) => {
            let nb_refseq = table
                .rows
                .iter()
                .filter(|row| table.cell(row, col).contains("GCF_"))
                .count();
            out.push(format!("Number of RefSeq genomes: {}.", nb_refseq));
        }
        Err(_) => log::warn!("catalog has no assembly_accession column, RefSeq count skipped"),
    }
    let availability = [
        ("With genome sequences (fna)", "fna_lname"),
        ("With protein sequences (faa)", "faa_lname"),
        ("With protein-coding DNA sequences (ffn)", "ffn_lname"),
        ("With RNA-coding DNA sequences (frn)", "frn_lname"),
    ];
    for (label, col_name) in availability {
        match table.col_index(col_name) {
            Ok(col) => {
                let nb = table
                    .rows
                    .iter()
                    .filter(|row| !table.cell(row, col).trim().is_empty())
                    .count();
                out.push(format!("{}: {}.", label, nb));
            }
            Err(_) => log::warn!("catalog has no {} column, count skipped", col_name),
        }
    }
    Ok(out)
} // end of catalog_summary

//========================================================================================

// end of mod tests
