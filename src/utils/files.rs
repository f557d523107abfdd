//! This file contains directory exploration and genome file selection

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// archive format of a genome file, decided from the file name suffix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionKind {
    Plain,
    Gzip,
    Bzip2,
    Xz,
}

/// a genome sequence file selected for sketching.
/// The genome id is the file name up to the first dot, it is the id the
/// distance stream and the matrix will carry.
pub struct GenomeFile {
    id: String,
    path: PathBuf,
    compression: CompressionKind,
}

impl GenomeFile {
    pub fn new(id: String, path: PathBuf, compression: CompressionKind) -> Self {
        GenomeFile {
            id,
            path,
            compression,
        }
    }

    pub fn get_id(&self) -> &str {
        &self.id
    }

    pub fn get_path(&self) -> &Path {
        &self.path
    }

    pub fn get_compression(&self) -> CompressionKind {
        self.compression
    }
} // end of GenomeFile

/// returns the compression kind if the file name matches `<id>.<ext>` possibly
/// followed by a compression suffix, None for anything else.
/// filenames are of type GCA[GCF]_000091165.1_genomic.fna.gz
pub fn genome_file_kind(fname: &str, ext: &str) -> Option<CompressionKind> {
    if fname.ends_with(&format!(".{}", ext)) {
        Some(CompressionKind::Plain)
    } else if fname.ends_with(&format!(".{}.gz", ext)) {
        Some(CompressionKind::Gzip)
    } else if fname.ends_with(&format!(".{}.bz2", ext)) {
        Some(CompressionKind::Bzip2)
    } else if fname.ends_with(&format!(".{}.xz", ext)) {
        Some(CompressionKind::Xz)
    } else {
        None
    }
} // end of genome_file_kind

/// scan a directory (one level) and select genome files by extension.
/// Entries come back sorted by file name so the id order seen by the sketching
/// step, and hence the matrix, is reproducible across runs.
pub fn scan_genome_dir(dir: &Path, ext: &str) -> io::Result<Vec<GenomeFile>> {
    let mut genomes = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        let fname = match entry.file_name().into_string() {
            Ok(fname) => fname,
            Err(os_name) => {
                log::warn!("skipping non utf8 file name {:?}", os_name);
                continue;
            }
        };
        if let Some(kind) = genome_file_kind(&fname, ext) {
            let id = fname.split('.').next().unwrap_or(&fname).to_string();
            genomes.push(GenomeFile::new(id, path, kind));
        }
    }
    genomes.sort_by(|a, b| a.path.file_name().cmp(&b.path.file_name()));
    log::info!("found {} genome files in {:?}", genomes.len(), dir);
    Ok(genomes)
} // end of scan_genome_dir

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_selection() {
        assert_eq!(
            genome_file_kind("GCF_000091165.1_genomic.fna", "fna"),
            Some(CompressionKind::Plain)
        );
        assert_eq!(
            genome_file_kind("GCF_000091165.1_genomic.fna.gz", "fna"),
            Some(CompressionKind::Gzip)
        );
        assert_eq!(
            genome_file_kind("g1.fna.bz2", "fna"),
            Some(CompressionKind::Bzip2)
        );
        assert_eq!(
            genome_file_kind("g1.fna.xz", "fna"),
            Some(CompressionKind::Xz)
        );
        assert_eq!(genome_file_kind("g1.fasta", "fna"), None);
        assert_eq!(genome_file_kind("readme.txt", "fna"), None);
    }

    #[test]
    fn scan_is_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.fna", "a.fna.gz", "c.ffn", "notes.txt"] {
            std::fs::write(dir.path().join(name), b">s\nACGT\n").unwrap();
        }
        let genomes = scan_genome_dir(dir.path(), "fna").unwrap();
        let ids: Vec<&str> = genomes.iter().map(|g| g.get_id()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(genomes[0].get_compression(), CompressionKind::Gzip);
        assert_eq!(genomes[1].get_compression(), CompressionKind::Plain);
    }
} // end of mod tests
