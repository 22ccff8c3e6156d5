//! Description of one subprocess launch.

use crate::supervisor::sink::OutputSink;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Everything needed to launch one external tool.
///
/// Built with the `with_*` methods and then handed to a
/// [`ProcessSupervisor`](super::ProcessSupervisor), which only reads it.
#[derive(Clone)]
pub struct ProcessInvocation {
    program: PathBuf,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    stdout_file: Option<PathBuf>,
    required_files: Vec<PathBuf>,
    sink: Option<Arc<dyn OutputSink>>,
}

impl ProcessInvocation {
    /// Create an invocation of `program` with no arguments.
    ///
    /// `program` may be a bare name, looked up on `PATH` at launch, or a
    /// path to an executable.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            stdout_file: None,
            required_files: Vec::new(),
            sink: None,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy())
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the tool in `dir`.
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Write the tool's standard output to `path` instead of the sink.
    ///
    /// Needed for tools such as `bwa mem` that emit their result on stdout;
    /// stderr still goes to the sink.
    pub fn with_stdout_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.stdout_file = Some(path.into());
        self
    }

    /// Declare a file the tool cannot run without, such as a jar.
    ///
    /// A missing required file is reported as a missing tool.
    pub fn requires_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.required_files.push(path.into());
        self
    }

    /// Send live output to `sink`. Without a sink, output is discarded.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn stdout_file(&self) -> Option<&Path> {
        self.stdout_file.as_deref()
    }

    pub fn required_files(&self) -> &[PathBuf] {
        &self.required_files
    }

    pub fn sink(&self) -> Option<&Arc<dyn OutputSink>> {
        self.sink.as_ref()
    }

    /// Human-readable command line, for logs and status messages.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        if let Some(out) = &self.stdout_file {
            line.push_str(" > ");
            line.push_str(&out.display().to_string());
        }
        line
    }
}

impl fmt::Debug for ProcessInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessInvocation")
            .field("program", &self.program)
            .field("args", &self.args)
            .field("working_dir", &self.working_dir)
            .field("stdout_file", &self.stdout_file)
            .field("required_files", &self.required_files)
            .field("has_sink", &self.sink.is_some())
            .finish()
    }
}
