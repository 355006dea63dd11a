//! In-process collaborator implementations.
//!
//! Used by the `scriptwrap` binary for dry runs and by tests. The prefixed
//! variants are also what script-side decoration (`decorate_by_prefix`,
//! `with_prefix`) produces.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::collaborators::{Build, BuildListener, Launcher, LogSink};

/// A build described entirely by its fields.
#[derive(Debug, Clone)]
pub struct LocalBuild {
    project: String,
    number: u64,
    workspace: Option<PathBuf>,
}

impl LocalBuild {
    /// Build `number` of `project`, without a workspace.
    pub fn new(project: impl Into<String>, number: u64) -> Self {
        Self {
            project: project.into(),
            number,
            workspace: None,
        }
    }

    /// Attach a workspace directory.
    #[must_use]
    pub fn with_workspace(mut self, path: impl Into<PathBuf>) -> Self {
        self.workspace = Some(path.into());
        self
    }
}

impl Build for LocalBuild {
    fn project(&self) -> &str {
        &self.project
    }

    fn number(&self) -> u64 {
        self.number
    }

    fn workspace(&self) -> Option<&Path> {
        self.workspace.as_deref()
    }
}

/// Runs commands as given.
#[derive(Debug, Clone)]
pub struct LocalLauncher {
    name: String,
}

impl LocalLauncher {
    /// A launcher reported as `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Default for LocalLauncher {
    fn default() -> Self {
        Self::new("local")
    }
}

impl Launcher for LocalLauncher {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn prepare(&self, command: Vec<String>) -> Vec<String> {
        command
    }
}

/// Prepends fixed arguments to every command of an inner launcher.
#[derive(Debug)]
pub struct PrefixedLauncher {
    inner: Arc<dyn Launcher>,
    prefix: Vec<String>,
}

impl PrefixedLauncher {
    /// Wrap `inner`, prefixing commands with `prefix`.
    pub fn new(inner: Arc<dyn Launcher>, prefix: Vec<String>) -> Self {
        Self { inner, prefix }
    }
}

impl Launcher for PrefixedLauncher {
    fn name(&self) -> String {
        format!("{} [{}]", self.inner.name(), self.prefix.join(" "))
    }

    fn prepare(&self, command: Vec<String>) -> Vec<String> {
        let mut prepared = self.prefix.clone();
        prepared.extend(self.inner.prepare(command));
        prepared
    }
}

/// Writes lines to any [`Write`] implementation.
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> WriterSink<W> {
    /// Sink writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }
}

impl WriterSink<io::Stderr> {
    /// Sink writing to standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W> std::fmt::Debug for WriterSink<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriterSink").finish_non_exhaustive()
    }
}

impl<W: Write + Send> LogSink for WriterSink<W> {
    fn write_line(&self, line: &str) -> io::Result<()> {
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()
    }
}

/// Prefixes every line written to an inner sink.
#[derive(Debug)]
pub struct PrefixedSink {
    inner: Arc<dyn LogSink>,
    prefix: String,
}

impl PrefixedSink {
    /// Wrap `inner`, prefixing lines with `prefix`.
    pub fn new(inner: Arc<dyn LogSink>, prefix: impl Into<String>) -> Self {
        Self {
            inner,
            prefix: prefix.into(),
        }
    }
}

impl LogSink for PrefixedSink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.inner.write_line(&format!("{}{line}", self.prefix))
    }
}

/// Keeps written lines in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    /// Empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines written so far.
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

impl LogSink for MemorySink {
    fn write_line(&self, line: &str) -> io::Result<()> {
        self.lines.lock().push(line.to_string());
        Ok(())
    }
}

/// A listener whose build log is a fixed sink.
#[derive(Debug, Clone)]
pub struct SinkListener {
    sink: Arc<dyn LogSink>,
}

impl SinkListener {
    /// Listener logging to `sink`.
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }
}

impl BuildListener for SinkListener {
    fn logger(&self) -> Arc<dyn LogSink> {
        Arc::clone(&self.sink)
    }
}
