//! Drives the external mash tool over a directory of genomes to produce the
//! pairwise distance stream.
//!
//! For each genome file the archive format is normalized first : gzip members
//! are decompressed in process, bzip2 and xz members go through the system
//! bzcat/xzcat filters, plain files are linked. Each staged genome is sketched
//! with `mash sketch`, the sketches are pasted into one sketch set and
//! `mash dist` enumerates the full Cartesian product of the set against itself,
//! self pairs included. Its stdout is gzip compressed on the fly into the
//! distance stream the matrix reconstruction consumes.
//!
//! Staging and sketching are strictly sequential. The cpu hint is passed to
//! `mash dist` only, mash parallelizes internally.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::process::{Command, Stdio};

use anyhow::{bail, Context, Result};
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::utils::files::{scan_genome_dir, CompressionKind, GenomeFile};
use crate::utils::parameters::SketchParams;

/// Computes pairwise minhash distances between the genomes of a directory.
///
/// Sketches and the `genomes.txt` id list are produced in `workdir`, the
/// gzipped distance stream lands at `dist_fp`. Returns the number of genomes
/// sketched. Any failing external invocation aborts the run, nothing is
/// retried.
pub fn compute_mash_distance(
    genome_dir: &Path,
    dist_fp: &Path,
    workdir: &Path,
    params: &SketchParams,
) -> Result<usize> {
    let genomes = scan_genome_dir(genome_dir, params.get_genome_ext())
        .with_context(|| format!("could not scan genome directory {:?}", genome_dir))?;
    if genomes.is_empty() {
        bail!(
            "no .{} genome found in {:?}",
            params.get_genome_ext(),
            genome_dir
        );
    }
    //
    // stage and sketch each genome, one at a time
    //
    let list_fp = workdir.join("genomes.txt");
    let mut list = BufWriter::new(
        File::create(&list_fp).with_context(|| format!("could not create {:?}", list_fp))?,
    );
    for genome in &genomes {
        let staged = workdir.join(genome.get_id());
        stage_genome(genome, &staged)
            .with_context(|| format!("could not stage genome {:?}", genome.get_path()))?;
        run_checked(Command::new("mash").arg("sketch").arg(&staged))?;
        fs::remove_file(&staged)?;
        writeln!(list, "{}", genome.get_id())?;
        log::debug!("sketched genome {}", genome.get_id());
    }
    list.flush()?;
    drop(list);
    log::info!("sketched {} genomes", genomes.len());
    //
    // paste the sketches into one sketch set
    //
    let msh_list_fp = workdir.join("genome_mshs.txt");
    let mut msh_list = BufWriter::new(File::create(&msh_list_fp)?);
    for genome in &genomes {
        writeln!(msh_list, "{}.msh", genome.get_id())?;
    }
    msh_list.flush()?;
    drop(msh_list);
    run_checked(
        Command::new("mash")
            .args(["paste", "-l", "genomes.msh", "genome_mshs.txt"])
            .current_dir(workdir),
    )?;
    fs::remove_file(&msh_list_fp)?;
    //
    // all pairs distances, gzipped on the fly
    //
    let mut cpus = params.get_cpus().max(1);
    let nb_cores = num_cpus::get();
    if cpus > nb_cores {
        log::warn!("cpu hint {} capped to {} available cores", cpus, nb_cores);
        cpus = nb_cores;
    }
    let mut child = Command::new("mash")
        .args(["dist", "-p", &cpus.to_string(), "genomes.msh", "genomes.msh"])
        .current_dir(workdir)
        .stdout(Stdio::piped())
        .spawn()
        .context("could not launch mash dist")?;
    let mut stdout = child
        .stdout
        .take()
        .context("mash dist stdout not captured")?;
    let out_file =
        File::create(dist_fp).with_context(|| format!("could not create {:?}", dist_fp))?;
    let mut encoder = GzEncoder::new(BufWriter::new(out_file), Compression::default());
    io::copy(&mut stdout, &mut encoder).context("could not read mash dist output")?;
    let status = child.wait()?;
    if !status.success() {
        bail!("mash dist exited with {}", status);
    }
    encoder.finish()?.flush()?;
    log::info!("distance stream written to {:?}", dist_fp);
    Ok(genomes.len())
} // end of compute_mash_distance

/// normalizes a genome file into an uncompressed staged copy named after its id
fn stage_genome(genome: &GenomeFile, staged: &Path) -> Result<()> {
    match genome.get_compression() {
        CompressionKind::Plain => link_or_copy(genome.get_path(), staged),
        CompressionKind::Gzip => {
            let mut decoder = MultiGzDecoder::new(File::open(genome.get_path())?);
            let mut out = File::create(staged)?;
            io::copy(&mut decoder, &mut out)?;
            Ok(())
        }
        CompressionKind::Bzip2 => filter_through("bzcat", genome.get_path(), staged),
        CompressionKind::Xz => filter_through("xzcat", genome.get_path(), staged),
    }
} // end of stage_genome

#[cfg(unix)]
fn link_or_copy(src: &Path, dst: &Path) -> Result<()> {
    std::os::unix::fs::symlink(src, dst)
        .with_context(|| format!("could not link {:?} to {:?}", src, dst))
}

#[cfg(not(unix))]
fn link_or_copy(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).with_context(|| format!("could not copy {:?} to {:?}", src, dst))?;
    Ok(())
}

/// decompress through an external filter writing its stdout to `output`
fn filter_through(tool: &str, input: &Path, output: &Path) -> Result<()> {
    let out = File::create(output)?;
    let status = Command::new(tool)
        .arg(input)
        .stdout(Stdio::from(out))
        .status()
        .with_context(|| format!("could not launch {}", tool))?;
    if !status.success() {
        bail!("{} {:?} exited with {}", tool, input, status);
    }
    Ok(())
} // end of filter_through

fn run_checked(cmd: &mut Command) -> Result<()> {
    log::debug!("running {:?}", cmd);
    let status = cmd
        .status()
        .with_context(|| format!("could not launch {:?}", cmd))?;
    if !status.success() {
        bail!("{:?} exited with {}", cmd, status);
    }
    Ok(())
} // end of run_checked

// end of mod tests
