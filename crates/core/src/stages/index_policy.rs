//! Deciding whether a reference genome is already indexed.
//!
//! The alignment stage only runs the indexing steps for a genome that is
//! not indexed yet. What "indexed" means is a policy decision, so it is
//! expressed as a trait and injected into the stage manager.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Extensions of the files `bwa index` writes next to the genome.
pub const BWA_INDEX_EXTENSIONS: &[&str] = &["amb", "ann", "bwt", "pac", "sa"];

/// Extension of the `samtools faidx` output.
pub const FASTA_INDEX_EXTENSION: &str = "fai";

/// Decides whether a genome needs indexing before alignment.
pub trait GenomeIndexPolicy: Send + Sync + fmt::Debug {
    fn is_indexed(&self, genome: &Path) -> bool;
}

/// The genome is indexed when every bwa index file and the `.fai` file
/// exist next to it.
#[derive(Debug, Clone, Copy, Default)]
pub struct BwaIndexFiles;

impl GenomeIndexPolicy for BwaIndexFiles {
    fn is_indexed(&self, genome: &Path) -> bool {
        BWA_INDEX_EXTENSIONS
            .iter()
            .chain(std::iter::once(&FASTA_INDEX_EXTENSION))
            .all(|ext| append_extension(genome, ext).is_file())
    }
}

/// The genome is indexed when its sequence dictionary exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequenceDictionary;

impl GenomeIndexPolicy for SequenceDictionary {
    fn is_indexed(&self, genome: &Path) -> bool {
        dictionary_path(genome).is_file()
    }
}

/// Indexed only when every inner policy agrees.
#[derive(Debug, Clone, Default)]
pub struct AllOf(pub Vec<Arc<dyn GenomeIndexPolicy>>);

impl GenomeIndexPolicy for AllOf {
    fn is_indexed(&self, genome: &Path) -> bool {
        self.0.iter().all(|policy| policy.is_indexed(genome))
    }
}

/// Policy used unless another one is injected: bwa files, `.fai` and the
/// sequence dictionary must all exist.
pub fn default_policy() -> Arc<dyn GenomeIndexPolicy> {
    Arc::new(AllOf(vec![
        Arc::new(BwaIndexFiles),
        Arc::new(SequenceDictionary),
    ]))
}

/// `genome.fasta` -> `genome.fasta.<ext>`
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(ext);
    PathBuf::from(name)
}

/// Path of the sequence dictionary Picard writes for `genome`.
///
/// A `.fa` or `.fasta` extension is replaced by `.dict`; any other name
/// gets `.dict` appended.
pub fn dictionary_path(genome: &Path) -> PathBuf {
    match genome.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("fa") || ext.eq_ignore_ascii_case("fasta") => {
            genome.with_extension("dict")
        }
        _ => append_extension(genome, "dict"),
    }
}
