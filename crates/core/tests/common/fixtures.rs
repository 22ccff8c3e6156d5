//! Test fixtures: fake bioinformatics tools and sample projects.

use gxp_core::project::store::{keys, PROJECT_FILE};
use gxp_core::project::ProjectConfig;
use gxp_core::stages::index_policy::{dictionary_path, BWA_INDEX_EXTENSIONS, FASTA_INDEX_EXTENSION};
use gxp_core::stages::params::names;
use gxp_core::stages::StageParams;
use gxp_protocol::settings_models::{References, Settings, ToolPaths};
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

pub const GATK_JAR: &str = "GenomeAnalysisTK.jar";
pub const DICTIONARY_JAR: &str = "CreateSequenceDictionary.jar";
pub const MIST_JAR: &str = "mist.jar";

/// Shell script standing in for bwa, samtools and java.
///
/// Every call is appended to `calls.log` as `<name> <args>`. A tool is
/// controlled through files in `control/`, looked up first by
/// `<tool>-<subcommand>` and then by `<tool>`:
/// - `<key>.hang`: touch `<key>.started`, then sleep
/// - `<key>.exit`: exit with the code stored in the file
///
/// For java the tool is the jar's stem and the subcommand the GATK tool.
const FAKE_TOOL: &str = r#"#!/bin/sh
dir="__DIR__"
name="__NAME__"
if [ "$name" = java ]; then
    tool=$(basename "$2" .jar)
    sub="$4"
else
    tool="$name"
    sub="$1"
fi
printf '%s\n' "$name $*" >> "$dir/calls.log"
echo "$tool $sub running" >&2
echo "$tool output"
for key in "$tool-$sub" "$tool"; do
    if [ -f "$dir/control/$key.hang" ]; then
        touch "$dir/control/$key.started"
        exec sleep 30
    fi
    if [ -f "$dir/control/$key.exit" ]; then
        exit "$(cat "$dir/control/$key.exit")"
    fi
done
exit 0
"#;

/// A directory of fake tools plus the settings pointing at them.
///
/// Keep it alive for the duration of the test.
pub struct FakeTools {
    dir: TempDir,
}

#[allow(dead_code)]
impl FakeTools {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("control"))?;

        for name in ["bwa", "samtools", "java"] {
            let script = FAKE_TOOL
                .replace("__DIR__", &dir.path().to_string_lossy())
                .replace("__NAME__", name);
            let path = dir.path().join(name);
            fs::write(&path, script)?;
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        }

        for jar in [GATK_JAR, DICTIONARY_JAR, MIST_JAR] {
            fs::write(dir.path().join(jar), b"")?;
        }

        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn tool(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Settings running every tool through the fakes.
    pub fn settings(&self) -> Settings {
        Settings {
            threads: 2,
            tools: ToolPaths {
                bwa: self.tool("bwa"),
                samtools: self.tool("samtools"),
                java: self.tool("java"),
                gatk: self.tool(GATK_JAR),
                sequence_dictionary: self.tool(DICTIONARY_JAR),
                mist: self.tool(MIST_JAR),
            },
            references: References::default(),
        }
    }

    /// Make the tool selected by `key` exit with `code`.
    pub fn fail(&self, key: &str, code: i32) -> io::Result<()> {
        fs::write(self.control(key, "exit"), code.to_string())
    }

    /// Make the tool selected by `key` block until killed.
    pub fn hang(&self, key: &str) -> io::Result<()> {
        fs::write(self.control(key, "hang"), b"")
    }

    /// Wait until a hanging tool has started, up to ten seconds.
    pub async fn wait_started(&self, key: &str) -> bool {
        let marker = self.control(key, "started");
        for _ in 0..500 {
            if marker.exists() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }

    /// Recorded calls, one `<name> <args>` line per invocation.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.dir.path().join("calls.log"))
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    fn control(&self, key: &str, suffix: &str) -> PathBuf {
        self.dir.path().join("control").join(format!("{key}.{suffix}"))
    }
}

/// A project directory with small input files.
pub struct SampleProject {
    dir: TempDir,
}

#[allow(dead_code)]
impl SampleProject {
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let root = dir.path();

        fs::write(root.join("genome.fa"), ">chr1\nACGTACGTACGT\n")?;
        fs::write(root.join("reads_R1.fastq"), "@r1\nACGT\n+\nIIII\n")?;
        fs::write(root.join("reads_R2.fastq"), "@r1\nTGCA\n+\nIIII\n")?;
        fs::write(root.join("dbsnp.vcf"), "##fileformat=VCFv4.1\n")?;
        fs::write(root.join("exons.txt"), "chr1\t1\t12\tGENE\n")?;
        fs::write(root.join("input.bam"), b"BAM\x01")?;

        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    pub fn genome(&self) -> PathBuf {
        self.file("genome.fa")
    }

    /// Create the files that mark the genome as indexed.
    pub fn index_genome(&self) -> io::Result<()> {
        let genome = self.genome();
        for ext in BWA_INDEX_EXTENSIONS.iter().chain([&FASTA_INDEX_EXTENSION]) {
            fs::write(format!("{}.{ext}", genome.display()), b"")?;
        }
        fs::write(dictionary_path(&genome), b"@HD\n")?;
        Ok(())
    }

    pub fn config(&self) -> ProjectConfig {
        ProjectConfig::open(self.dir()).expect("project config")
    }

    /// Raw bytes of the project file, empty when it does not exist.
    pub fn config_bytes(&self) -> Vec<u8> {
        fs::read(self.config().path()).unwrap_or_default()
    }

    /// Put a directory where the project file goes, so every save fails.
    ///
    /// `config()` cannot be used until [`unblock_config_writes`](Self::unblock_config_writes).
    pub fn block_config_writes(&self) -> io::Result<()> {
        let path = self.file(PROJECT_FILE);
        if path.is_file() {
            fs::remove_file(&path)?;
        }
        fs::create_dir_all(path.join("blocked"))
    }

    pub fn unblock_config_writes(&self) -> io::Result<()> {
        fs::remove_dir_all(self.file(PROJECT_FILE))
    }

    pub fn align_params(&self) -> StageParams {
        StageParams::new()
            .with(keys::FORWARD, self.file("reads_R1.fastq").to_string_lossy())
            .with(keys::REVERSE, self.file("reads_R2.fastq").to_string_lossy())
            .with(keys::GENOME, self.genome().to_string_lossy())
            .with(keys::BAM, self.file("sample.bam").to_string_lossy())
            .with(names::DBSNP, self.file("dbsnp.vcf").to_string_lossy())
    }

    pub fn call_params(&self) -> StageParams {
        StageParams::new()
            .with(keys::GENOME, self.genome().to_string_lossy())
            .with(keys::BAM, self.file("input.bam").to_string_lossy())
            .with(keys::VCF, self.file("calls.vcf").to_string_lossy())
            .with(names::DBSNP, self.file("dbsnp.vcf").to_string_lossy())
    }

    pub fn mist_params(&self) -> StageParams {
        StageParams::new()
            .with(keys::BAM, self.file("input.bam").to_string_lossy())
            .with(names::ENSEMBL, self.file("exons.txt").to_string_lossy())
            .with(keys::MIST, self.file("gaps.tsv").to_string_lossy())
    }

    pub fn index_params(&self) -> StageParams {
        StageParams::new().with(keys::GENOME, self.genome().to_string_lossy())
    }
}
