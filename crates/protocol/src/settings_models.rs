//! Global settings models for `.gxp/settings.toml`.
//!
//! These settings replace a process-wide configuration store: they are
//! loaded once and passed explicitly to the stage orchestrator every time a
//! stage is started.

use serde::Deserialize;
use serde::Serialize;
use std::path::PathBuf;
use ts_rs::TS;

/// Represents global settings from `.gxp/settings.toml`.
///
/// # Example
///
/// ```toml
/// threads = 8
///
/// [tools]
/// bwa = "/opt/bwa/bwa"
/// gatk = "/opt/gatk/GenomeAnalysisTK.jar"
///
/// [references]
/// genome = "/data/ref/human_g1k_v37.fasta"
/// dbsnp = "/data/ref/dbsnp_138.b37.vcf"
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, TS)]
pub struct Settings {
    /// Number of threads handed to multithreaded tools.
    #[serde(default = "default_threads")]
    pub threads: u32,

    /// Locations of the external tools.
    #[serde(default)]
    pub tools: ToolPaths,

    /// Shared reference resources.
    #[serde(default)]
    pub references: References,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            threads: default_threads(),
            tools: ToolPaths::default(),
            references: References::default(),
        }
    }
}

fn default_threads() -> u32 {
    4
}

/// Executables and jar files of the external tools.
///
/// Executables may be bare names, in which case they are looked up on
/// `PATH` when a step is launched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, TS)]
#[serde(default)]
pub struct ToolPaths {
    pub bwa: PathBuf,
    pub samtools: PathBuf,
    pub java: PathBuf,

    /// `GenomeAnalysisTK.jar`.
    pub gatk: PathBuf,

    /// Picard `CreateSequenceDictionary.jar`.
    pub sequence_dictionary: PathBuf,

    /// MIST coverage analysis jar.
    pub mist: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            bwa: PathBuf::from("bwa"),
            samtools: PathBuf::from("samtools"),
            java: PathBuf::from("java"),
            gatk: PathBuf::from("GenomeAnalysisTK.jar"),
            sequence_dictionary: PathBuf::from("CreateSequenceDictionary.jar"),
            mist: PathBuf::from("mist.jar"),
        }
    }
}

/// Reference resources shared by every project.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq, TS)]
#[serde(default)]
pub struct References {
    pub genome: Option<PathBuf>,
    pub dbsnp: Option<PathBuf>,
    pub mills: Option<PathBuf>,
    pub phase1: Option<PathBuf>,
    pub ensembl: Option<PathBuf>,
}
