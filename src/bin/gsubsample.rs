//! gsubsample : post processing of genome downloads for a subsampling pipeline
//!
//! gsubsample filter --catalog [-r] file --threshold [-s] t --output [-o] stem [--avg]
//!
//! - --catalog : the downloaded genome catalog, a tab separated table keyed by genome id
//! - --threshold : combined score threshold, genomes at or above it go to the .good table
//! - --score-cols / --fp-cols : comma delimited column subsets for scoring and output
//! - --avg : plain row average instead of the normalized average score
//!
//! gsubsample summary --catalog [-r] file
//!
//! prints basic statistics of a downloaded catalog.
//!
//! gsubsample dist --dir [-d] genomedir --out [-o] genomes.dist.gz --ext fna --cpus [-p] n
//!
//! sketches every genome file of the directory with mash and writes the gzipped
//! all pairs distance stream. The cpu hint goes to mash dist only.
//!
//! gsubsample matrix --dist [-i] genomes.dist.gz --out [-o] dist_matrix.txt
//!
//! reshapes the distance stream into the dense distance matrix.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};
use cpu_time::ProcessTime;

// for logging (debug mostly, switched at compile time in cargo.toml)
use env_logger::Builder;

use gsubsample::catalog;
use gsubsample::mashdist;
use gsubsample::matrix;
use gsubsample::utils::parameters::{FilterParams, SketchParams};

// install a logger facility
fn init_log() -> u64 {
    Builder::from_default_env().init();
    log::info!("logger initialized from default environment");
    1
}

fn parse_cols(arg: &str) -> Vec<String> {
    arg.trim()
        .split(',')
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .collect()
}

//========================================================================================

fn filter_cmd() -> Command {
    Command::new("filter")
        .about("Filter a genome catalog into good/bad partitions by combined quality score")
        .arg(
            Arg::new("catalog")
                .short('r')
                .long("catalog")
                .required(true)
                .value_name("FILE")
                .help("path to the downloaded genome catalog with scores"),
        )
        .arg(
            Arg::new("threshold")
                .short('s')
                .long("threshold")
                .value_name("THRESHOLD")
                .default_value("0.8")
                .help("score threshold to include in the good table"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("STEM")
                .default_value("./catalog_filepaths")
                .help("output path stem, writes <stem>.good and <stem>.bad"),
        )
        .arg(
            Arg::new("score_cols")
                .short('c')
                .long("score-cols")
                .value_name("COLS")
                .default_value(FilterParams::DEFAULT_SCORE_COLS)
                .help("comma delimited list of columns to use for score calculation"),
        )
        .arg(
            Arg::new("fp_cols")
                .short('f')
                .long("fp-cols")
                .value_name("COLS")
                .default_value(FilterParams::DEFAULT_FP_COLS)
                .help("comma delimited list of file path columns to include in output"),
        )
        .arg(
            Arg::new("avg")
                .short('a')
                .long("avg")
                .action(ArgAction::SetTrue)
                .help("use simple average rather than normalized average for score"),
        )
}

fn run_filter(matches: &ArgMatches) -> Result<()> {
    let catalog_fp = PathBuf::from(matches.get_one::<String>("catalog").expect("required"));
    let threshold = matches
        .get_one::<String>("threshold")
        .expect("defaulted")
        .parse::<f64>()
        .context("threshold must be a float")?;
    let output_stem = matches.get_one::<String>("output").expect("defaulted");
    let score_cols = parse_cols(matches.get_one::<String>("score_cols").expect("defaulted"));
    let fp_cols = parse_cols(matches.get_one::<String>("fp_cols").expect("defaulted"));
    let params = FilterParams::new(threshold, score_cols, fp_cols, matches.get_flag("avg"));
    //
    let outcome = catalog::filter_catalog(&catalog_fp, output_stem, &params)?;
    println!(
        "{} genomes at score >= {} in {}.good, {} below in {}.bad",
        outcome.nb_good,
        params.get_threshold(),
        output_stem,
        outcome.nb_bad,
        output_stem
    );
    Ok(())
} // end of run_filter

fn summary_cmd() -> Command {
    Command::new("summary")
        .about("Report basic statistics of a downloaded genome catalog")
        .arg(
            Arg::new("catalog")
                .short('r')
                .long("catalog")
                .required(true)
                .value_name("FILE")
                .help("path to the downloaded genome catalog"),
        )
}

fn run_summary(matches: &ArgMatches) -> Result<()> {
    let catalog_fp = PathBuf::from(matches.get_one::<String>("catalog").expect("required"));
    for line in catalog::catalog_summary(&catalog_fp)? {
        println!("{}", line);
    }
    Ok(())
} // end of run_summary

fn dist_cmd() -> Command {
    Command::new("dist")
        .about("Sketch a directory of genomes with mash and compute the all pairs distance stream")
        .arg(
            Arg::new("genome_dir")
                .short('d')
                .long("dir")
                .required(true)
                .value_name("DIRECTORY")
                .help("directory containing input genomes"),
        )
        .arg(
            Arg::new("out")
                .short('o')
                .long("out")
                .value_name("FILE")
                .default_value("genomes.dist.gz")
                .help("gzipped distance stream output path"),
        )
        .arg(
            Arg::new("ext")
                .long("ext")
                .value_name("EXT")
                .default_value("fna")
                .help("extension name of input genome files"),
        )
        .arg(
            Arg::new("cpus")
                .short('p')
                .long("cpus")
                .value_name("CPUS")
                .default_value("1")
                .help("number of cpu cores mash dist may use"),
        )
        .arg(
            Arg::new("workdir")
                .long("workdir")
                .value_name("DIRECTORY")
                .default_value(".")
                .help("directory receiving sketches and the genome id list"),
        )
}

fn run_dist(matches: &ArgMatches) -> Result<()> {
    let genome_dir = PathBuf::from(matches.get_one::<String>("genome_dir").expect("required"));
    if !genome_dir.is_dir() {
        anyhow::bail!("not a directory : {:?}", genome_dir);
    }
    let dist_fp = PathBuf::from(matches.get_one::<String>("out").expect("defaulted"));
    let workdir = PathBuf::from(matches.get_one::<String>("workdir").expect("defaulted"));
    let ext = matches.get_one::<String>("ext").expect("defaulted");
    let cpus = matches
        .get_one::<String>("cpus")
        .expect("defaulted")
        .parse::<usize>()
        .context("cpus must be an integer")?;
    let params = SketchParams::new(ext.to_string(), cpus);
    //
    let start_t = SystemTime::now();
    let cpu_start = ProcessTime::now();
    let nb_genomes = mashdist::compute_mash_distance(&genome_dir, &dist_fp, &workdir, &params)?;
    println!(
        " distance stream for {} genomes, sys time(s) {} cpu time(s) {}",
        nb_genomes,
        start_t.elapsed().unwrap_or_default().as_secs(),
        cpu_start.elapsed().as_secs()
    );
    // dump parameters next to the stream so a later matrix run can check them
    let dump_dir = dist_fp
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if let Err(msg) = params.dump_json(dump_dir) {
        log::error!("{}", msg);
    }
    Ok(())
} // end of run_dist

fn matrix_cmd() -> Command {
    Command::new("matrix")
        .about("Reshape the all pairs distance stream into a dense distance matrix")
        .arg(
            Arg::new("dist")
                .short('i')
                .long("dist")
                .value_name("FILE")
                .default_value("genomes.dist.gz")
                .help("pairwise distance stream, gunzipped on the fly if it ends in .gz"),
        )
        .arg(
            Arg::new("out")
                .short('o')
                .long("out")
                .value_name("FILE")
                .default_value("dist_matrix.txt")
                .help("dense matrix output path"),
        )
}

fn run_matrix(matches: &ArgMatches) -> Result<()> {
    let dist_fp = PathBuf::from(matches.get_one::<String>("dist").expect("defaulted"));
    let matrix_fp = PathBuf::from(matches.get_one::<String>("out").expect("defaulted"));
    // streams produced by the dist subcommand carry their parameters
    let dump_dir = dist_fp
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if SketchParams::json_path(dump_dir).is_file() {
        if let Ok(params) = SketchParams::reload_json(dump_dir) {
            log::info!(
                "distance stream was produced over .{} genomes with {} cpus",
                params.get_genome_ext(),
                params.get_cpus()
            );
        }
    }
    let start_t = SystemTime::now();
    let nb_rows = matrix::matrix_from_dist_file(&dist_fp, &matrix_fp)?;
    println!(
        " {} x {} matrix written to {:?}, sys time(s) {}",
        nb_rows,
        nb_rows,
        matrix_fp,
        start_t.elapsed().unwrap_or_default().as_secs()
    );
    Ok(())
} // end of run_matrix

//========================================================================================

fn main() -> Result<()> {
    let _ = init_log();
    //
    let matches = Command::new("gsubsample")
        .version("0.1.0")
        .about("genome catalog filtering and minhash distance matrix construction for genome subsampling")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(filter_cmd())
        .subcommand(summary_cmd())
        .subcommand(dist_cmd())
        .subcommand(matrix_cmd())
        .get_matches();

    match matches.subcommand() {
        Some(("filter", sub)) => run_filter(sub),
        Some(("summary", sub)) => run_summary(sub),
        Some(("dist", sub)) => run_dist(sub),
        Some(("matrix", sub)) => run_matrix(sub),
        _ => unreachable!("subcommand required"),
    }
} // end of main
