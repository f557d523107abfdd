//! structures related to processing parameters

use std::fs::OpenOptions;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::to_writer;

/// name of the json dump placed next to the distance stream
const SKETCH_PARAMS_FILE: &str = "sketchparams.json";

/// parameters of the catalog filtering step
#[derive(Clone, Serialize, Deserialize)]
pub struct FilterParams {
    /// combined score below which a genome goes to the bad partition
    score_threshold: f64,
    /// score columns entering the combined score
    score_cols: Vec<String>,
    /// file path columns copied to the outputs
    fp_cols: Vec<String>,
    /// plain row average instead of the normalized average
    plain_avg: bool,
}

impl FilterParams {
    /// default score columns, as the download machinery names them
    pub const DEFAULT_SCORE_COLS: &'static str = "score_faa,score_fna,score_rrna,score_trna";
    /// default file path columns
    pub const DEFAULT_FP_COLS: &'static str = "faa_lname,ffn_lname,fna_lname,frn_lname";
    pub const DEFAULT_THRESHOLD: f64 = 0.8;

    pub fn new(
        score_threshold: f64,
        score_cols: Vec<String>,
        fp_cols: Vec<String>,
        plain_avg: bool,
    ) -> Self {
        FilterParams {
            score_threshold,
            score_cols,
            fp_cols,
            plain_avg,
        }
    } // end of new

    pub fn get_threshold(&self) -> f64 {
        self.score_threshold
    }

    pub fn get_score_cols(&self) -> &[String] {
        &self.score_cols
    }

    pub fn get_fp_cols(&self) -> &[String] {
        &self.fp_cols
    }

    pub fn use_plain_avg(&self) -> bool {
        self.plain_avg
    }

    /// name of the combined score column in the outputs
    pub fn combined_col(&self) -> &'static str {
        if self.plain_avg {
            "score_avg"
        } else {
            "score_norm"
        }
    }
} // end of impl FilterParams

//=====================================================================================

/// Gathers parameters used for sketching and the all pairs distance computation.
/// To be dumped next to the distance stream so a matrix built later can be tied
/// back to how its distances were produced.
#[derive(Clone, Serialize, Deserialize)]
pub struct SketchParams {
    /// extension of genome files in the input directory
    genome_ext: String,
    /// parallelism hint handed to the distance computation
    cpus: usize,
}

impl SketchParams {
    pub fn new(genome_ext: String, cpus: usize) -> Self {
        SketchParams { genome_ext, cpus }
    }

    pub fn get_genome_ext(&self) -> &str {
        &self.genome_ext
    }

    pub fn get_cpus(&self) -> usize {
        self.cpus
    }

    /// where the json dump lives relative to the distance stream directory
    pub fn json_path(dirpath: &Path) -> std::path::PathBuf {
        dirpath.join(SKETCH_PARAMS_FILE)
    }

    pub fn dump_json(&self, dirpath: &Path) -> Result<(), String> {
        //
        let filepath = Self::json_path(dirpath);
        //
        log::info!("dumping SketchParams in json file : {:?}", filepath);
        //
        let fileres = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&filepath);
        let file = match fileres {
            Ok(file) => file,
            Err(_) => {
                log::error!("SketchParams dump : could not open file {:?}", filepath.as_os_str());
                return Err("SketchParams dump failed".to_string());
            }
        };
        //
        let mut writer = BufWriter::new(file);
        to_writer(&mut writer, &self).map_err(|_| "SketchParams dump failed".to_string())?;
        //
        Ok(())
    } // end of dump_json

    /// reload from a json dump. Ensures coherence between a distance stream and
    /// a later matrix construction run
    pub fn reload_json(dirpath: &Path) -> Result<Self, String> {
        log::info!("in reload_json");
        //
        let filepath = Self::json_path(dirpath);
        let fileres = OpenOptions::new().read(true).open(&filepath);
        let file = match fileres {
            Ok(file) => file,
            Err(_) => {
                log::error!(
                    "SketchParams reload_json : could not open file {:?}",
                    filepath.as_os_str()
                );
                return Err("SketchParams reload_json could not open file".to_string());
            }
        };
        //
        let reader = BufReader::new(file);
        let params: Self = serde_json::from_reader(reader)
            .map_err(|_| "SketchParams reload_json could not decode file".to_string())?;
        //
        log::info!(
            "SketchParams reload, genome ext : {}, cpus : {}",
            params.genome_ext,
            params.cpus
        );
        //
        Ok(params)
    } // end of reload_json
} // end of impl SketchParams

//=====================================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sketch_params_dump_reload() {
        let dir = tempfile::tempdir().unwrap();
        let params = SketchParams::new(String::from("fna"), 4);
        params.dump_json(dir.path()).unwrap();
        let reloaded = SketchParams::reload_json(dir.path()).unwrap();
        assert_eq!(reloaded.get_genome_ext(), "fna");
        assert_eq!(reloaded.get_cpus(), 4);
    }
} // end of mod tests
