//! The built-in stages and the command lines of their steps.
//!
//! Argument order matters to the tools and is kept exactly as the tools
//! document it.

use crate::stages::descriptor::{MissingParam, StageDescriptor, StepContext, StepTemplate};
use crate::stages::index_policy::dictionary_path;
use crate::stages::params::{names, ParamKind, ParamSpec, StageParams};
use crate::supervisor::ProcessInvocation;
use gxp_protocol::stage_models::StageInfo;
use std::path::{Path, PathBuf};

pub const INDEX: &str = "index";
pub const ALIGN: &str = "align";
pub const CALL: &str = "call";
pub const MIST: &str = "mist";
pub const RECAL: &str = "recal";

const DEFAULT_MIST_THRESHOLD: &str = "10";
const DEFAULT_MIST_LENGTH: &str = "1";

/// Set of stages a manager can run.
#[derive(Debug, Clone)]
pub struct StageCatalog {
    stages: Vec<StageDescriptor>,
}

impl StageCatalog {
    pub fn new(stages: Vec<StageDescriptor>) -> Self {
        Self { stages }
    }

    /// The index, align, call, mist and recal stages.
    pub fn standard() -> Self {
        Self::new(vec![
            index_stage(),
            align_stage(),
            call_stage(),
            mist_stage(),
            recal_stage(),
        ])
    }

    pub fn get(&self, code: &str) -> Option<&StageDescriptor> {
        self.stages.iter().find(|stage| stage.code == code)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StageDescriptor> {
        self.stages.iter()
    }

    pub fn infos(&self) -> Vec<StageInfo> {
        self.stages.iter().map(StageDescriptor::info).collect()
    }
}

impl Default for StageCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

fn recalibrate(params: &StageParams) -> bool {
    params.flag(names::RECALIBRATE, true)
}

fn genome_needs_index(ctx: &StepContext<'_>) -> bool {
    ctx.params
        .path(names::GENOME)
        .is_some_and(|genome| !ctx.index_policy.is_indexed(&genome))
}

fn index_stage() -> StageDescriptor {
    StageDescriptor {
        code: INDEX,
        title: "Index reference genome",
        params: vec![ParamSpec::required(names::GENOME, ParamKind::InputFile)],
        steps: vec![
            StepTemplate::new("Building BWA index", 70.0, bwa_index),
            StepTemplate::new("Indexing FASTA", 10.0, samtools_faidx),
            StepTemplate::new("Creating sequence dictionary", 20.0, create_dictionary),
        ],
    }
}

fn align_stage() -> StageDescriptor {
    StageDescriptor {
        code: ALIGN,
        title: "Align reads",
        params: vec![
            ParamSpec::required(names::FORWARD, ParamKind::InputFile),
            ParamSpec::required(names::REVERSE, ParamKind::InputFile),
            ParamSpec::required(names::GENOME, ParamKind::InputFile),
            ParamSpec::required(names::BAM, ParamKind::OutputFile),
            ParamSpec::required_when(names::DBSNP, ParamKind::InputFile, recalibrate),
            ParamSpec::optional(names::MILLS, ParamKind::InputFile),
            ParamSpec::optional(names::PHASE1, ParamKind::InputFile),
            ParamSpec::optional(names::THREADS, ParamKind::Count),
            ParamSpec::optional(names::READ_GROUP, ParamKind::Text),
            ParamSpec::optional(names::RECALIBRATE, ParamKind::Flag),
        ],
        steps: vec![
            StepTemplate::new("Building BWA index", 4.0, bwa_index).when(genome_needs_index),
            StepTemplate::new("Indexing FASTA", 0.5, samtools_faidx).when(genome_needs_index),
            StepTemplate::new("Creating sequence dictionary", 0.5, create_dictionary)
                .when(genome_needs_index),
            StepTemplate::new("Aligning reads", 55.0, bwa_mem),
            StepTemplate::new("Sorting alignments", 10.0, samtools_sort),
            StepTemplate::new("Indexing alignments", 5.0, samtools_index),
            StepTemplate::new("Computing recalibration table", 15.0, align_base_recalibrator)
                .when(|ctx| recalibrate(ctx.params)),
            StepTemplate::new("Recalibrating base qualities", 10.0, align_print_reads)
                .when(|ctx| recalibrate(ctx.params)),
        ],
    }
}

fn call_stage() -> StageDescriptor {
    StageDescriptor {
        code: CALL,
        title: "Call variants",
        params: vec![
            ParamSpec::required(names::GENOME, ParamKind::InputFile),
            ParamSpec::required(names::BAM, ParamKind::InputFile),
            ParamSpec::required(names::VCF, ParamKind::OutputFile),
            ParamSpec::required(names::DBSNP, ParamKind::InputFile),
        ],
        steps: vec![StepTemplate::new("Calling variants", 100.0, haplotype_caller)],
    }
}

fn mist_stage() -> StageDescriptor {
    StageDescriptor {
        code: MIST,
        title: "Find coverage gaps",
        params: vec![
            ParamSpec::required(names::BAM, ParamKind::InputFile),
            ParamSpec::required(names::ENSEMBL, ParamKind::InputFile),
            ParamSpec::required(names::MIST, ParamKind::OutputFile),
            ParamSpec::optional(names::THRESHOLD, ParamKind::Count),
            ParamSpec::optional(names::LENGTH, ParamKind::Count),
        ],
        steps: vec![StepTemplate::new("Running MIST", 100.0, mist)],
    }
}

fn recal_stage() -> StageDescriptor {
    StageDescriptor {
        code: RECAL,
        title: "Recalibrate base qualities",
        params: vec![
            ParamSpec::required(names::GENOME, ParamKind::InputFile),
            ParamSpec::required(names::BAM, ParamKind::InputFile),
            ParamSpec::required(names::RECAL_BAM, ParamKind::OutputFile),
            ParamSpec::required(names::DBSNP, ParamKind::InputFile),
            ParamSpec::optional(names::MILLS, ParamKind::InputFile),
            ParamSpec::optional(names::PHASE1, ParamKind::InputFile),
        ],
        steps: vec![
            StepTemplate::new("Computing recalibration table", 60.0, recal_base_recalibrator),
            StepTemplate::new("Recalibrating base qualities", 40.0, recal_print_reads),
        ],
    }
}

fn threads(ctx: &StepContext<'_>) -> String {
    ctx.params
        .value(names::THREADS)
        .map(str::to_string)
        .unwrap_or_else(|| ctx.settings.threads.to_string())
}

/// `java -jar <jar>`, failing fast when the jar is missing.
fn java_jar(ctx: &StepContext<'_>, jar: &Path) -> ProcessInvocation {
    ProcessInvocation::new(ctx.settings.tools.java.clone())
        .arg("-jar")
        .path_arg(jar)
        .requires_file(jar)
}

fn gatk(ctx: &StepContext<'_>, tool: &str) -> ProcessInvocation {
    java_jar(ctx, &ctx.settings.tools.gatk).args(["-T", tool])
}

fn bwa_index(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    Ok(ProcessInvocation::new(ctx.settings.tools.bwa.clone())
        .args(["index", "-a", "bwtsw"])
        .path_arg(&genome))
}

fn samtools_faidx(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    Ok(ProcessInvocation::new(ctx.settings.tools.samtools.clone())
        .arg("faidx")
        .path_arg(&genome))
}

fn create_dictionary(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    let dict = dictionary_path(&genome);
    Ok(java_jar(ctx, &ctx.settings.tools.sequence_dictionary)
        .arg(format!("R={}", genome.display()))
        .arg(format!("O={}", dict.display())))
}

/// Intermediate files of an alignment, all derived from the output BAM.
struct AlignFiles {
    bam: PathBuf,
    sam: PathBuf,
    sorted: PathBuf,
    table: PathBuf,
}

impl AlignFiles {
    fn resolve(ctx: &StepContext<'_>) -> Result<Self, MissingParam> {
        let bam = ctx.require_path(names::BAM)?;
        let sorted = if recalibrate(ctx.params) {
            bam.with_extension("sorted.bam")
        } else {
            bam.clone()
        };
        Ok(Self {
            sam: bam.with_extension("sam"),
            table: bam.with_extension("recal.grp"),
            sorted,
            bam,
        })
    }

    fn sample(&self) -> String {
        self.bam
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "sample".to_string())
    }
}

fn bwa_mem(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    let forward = ctx.require_path(names::FORWARD)?;
    let reverse = ctx.require_path(names::REVERSE)?;
    let files = AlignFiles::resolve(ctx)?;

    // bwa expands the literal \t itself
    let read_group = match ctx.params.value(names::READ_GROUP) {
        Some(rg) => rg.to_string(),
        None => {
            let sample = files.sample();
            format!("@RG\\tID:{sample}\\tSM:{sample}\\tPL:ILLUMINA")
        }
    };

    Ok(ProcessInvocation::new(ctx.settings.tools.bwa.clone())
        .args(["mem", "-t"])
        .arg(threads(ctx))
        .arg("-R")
        .arg(read_group)
        .path_arg(&genome)
        .path_arg(&forward)
        .path_arg(&reverse)
        .with_stdout_file(files.sam))
}

fn samtools_sort(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let files = AlignFiles::resolve(ctx)?;
    Ok(ProcessInvocation::new(ctx.settings.tools.samtools.clone())
        .args(["sort", "-@"])
        .arg(threads(ctx))
        .arg("-o")
        .path_arg(&files.sorted)
        .path_arg(&files.sam))
}

fn samtools_index(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let files = AlignFiles::resolve(ctx)?;
    Ok(ProcessInvocation::new(ctx.settings.tools.samtools.clone())
        .arg("index")
        .path_arg(&files.sorted))
}

fn base_recalibrator(
    ctx: &StepContext<'_>,
    input: &Path,
    table: &Path,
) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    let dbsnp = ctx.require_path(names::DBSNP)?;

    let mut invocation = gatk(ctx, "BaseRecalibrator")
        .arg("-R")
        .path_arg(&genome)
        .arg("-I")
        .path_arg(input)
        .arg("-knownSites")
        .path_arg(&dbsnp);
    for optional in [names::MILLS, names::PHASE1] {
        if let Some(sites) = ctx.params.path(optional) {
            invocation = invocation.arg("-knownSites").path_arg(&sites);
        }
    }
    Ok(invocation.arg("-o").path_arg(table))
}

fn print_reads(
    ctx: &StepContext<'_>,
    input: &Path,
    table: &Path,
    output: &Path,
) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    Ok(gatk(ctx, "PrintReads")
        .arg("-R")
        .path_arg(&genome)
        .arg("-I")
        .path_arg(input)
        .arg("-BQSR")
        .path_arg(table)
        .arg("-o")
        .path_arg(output))
}

fn align_base_recalibrator(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let files = AlignFiles::resolve(ctx)?;
    base_recalibrator(ctx, &files.sorted, &files.table)
}

fn align_print_reads(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let files = AlignFiles::resolve(ctx)?;
    print_reads(ctx, &files.sorted, &files.table, &files.bam)
}

fn recal_table(ctx: &StepContext<'_>) -> Result<PathBuf, MissingParam> {
    Ok(ctx
        .require_path(names::RECAL_BAM)?
        .with_extension("grp"))
}

fn recal_base_recalibrator(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let bam = ctx.require_path(names::BAM)?;
    base_recalibrator(ctx, &bam, &recal_table(ctx)?)
}

fn recal_print_reads(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let bam = ctx.require_path(names::BAM)?;
    let output = ctx.require_path(names::RECAL_BAM)?;
    print_reads(ctx, &bam, &recal_table(ctx)?, &output)
}

fn haplotype_caller(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let genome = ctx.require_path(names::GENOME)?;
    let bam = ctx.require_path(names::BAM)?;
    let vcf = ctx.require_path(names::VCF)?;
    let dbsnp = ctx.require_path(names::DBSNP)?;
    Ok(gatk(ctx, "HaplotypeCaller")
        .arg("-R")
        .path_arg(&genome)
        .arg("-I")
        .path_arg(&bam)
        .arg("-o")
        .path_arg(&vcf)
        .arg("--dbsnp")
        .path_arg(&dbsnp))
}

fn mist(ctx: &StepContext<'_>) -> Result<ProcessInvocation, MissingParam> {
    let bam = ctx.require_path(names::BAM)?;
    let ensembl = ctx.require_path(names::ENSEMBL)?;
    let output = ctx.require_path(names::MIST)?;
    let threshold = ctx
        .params
        .value(names::THRESHOLD)
        .unwrap_or(DEFAULT_MIST_THRESHOLD);
    let length = ctx.params.value(names::LENGTH).unwrap_or(DEFAULT_MIST_LENGTH);

    Ok(java_jar(ctx, &ctx.settings.tools.mist)
        .arg("-i")
        .path_arg(&bam)
        .arg("-e")
        .path_arg(&ensembl)
        .arg("-o")
        .path_arg(&output)
        .args(["-t", threshold, "-l", length]))
}
