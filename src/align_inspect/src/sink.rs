//! Byte sinks addressed by role and iteration.
//!
//! A [`SinkProvider`] hands out writable sinks and takes them back when the
//! caller is done. Exporters never pair the calls by hand: they go through a
//! [`SinkGuard`], which closes the sink on every exit path.
//!
//! Sink names are derived from a base name:
//! - `open_sink("reading", None)`     -> `<base>-reading.vtk`
//! - `open_sink("iteration", Some(3))` -> `<base>-iteration-3.vtk`
//! - a role ending in one of [`OWN_EXTENSIONS`] (`"iteration-info.csv"`)
//!   keeps it; any other dot is part of the stem (`"scan.001"` becomes
//!   `<base>-scan.001.vtk`).

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{InspectError, Result};

/// Extension appended to roles that do not carry one.
pub const DEFAULT_EXTENSION: &str = "vtk";

/// Extensions a role may carry itself. The default one is not among them, so
/// `"a"` and `"a.vtk"` never share a file.
pub const OWN_EXTENSIONS: &[&str] = &["csv", "json", "txt"];

/// Source of writable sinks.
pub trait SinkProvider {
    type Sink: Write;

    /// Path (or key) the sink for `role` / `iteration` is bound to.
    fn sink_path(&self, role: &str, iteration: Option<usize>) -> PathBuf;

    /// Open a fresh sink, replacing any previous content for the same
    /// role and iteration.
    fn open_sink(&mut self, role: &str, iteration: Option<usize>) -> Result<Self::Sink>;

    /// Flush and release a sink obtained from [`SinkProvider::open_sink`].
    fn close_sink(&mut self, sink: Self::Sink) -> Result<()>;

    fn open_role(&mut self, role: &str) -> Result<Self::Sink> {
        self.open_sink(role, None)
    }

    fn open_iteration(&mut self, role: &str, iteration: usize) -> Result<Self::Sink> {
        self.open_sink(role, Some(iteration))
    }
}

/// File name for a role and optional iteration under `base`.
pub fn sink_file_name(base: &str, role: &str, iteration: Option<usize>) -> String {
    let (stem, extension) = match role.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && OWN_EXTENSIONS.contains(&ext) => (stem, ext),
        _ => (role, DEFAULT_EXTENSION),
    };
    match iteration {
        Some(i) => format!("{base}-{stem}-{i}.{extension}"),
        None => format!("{base}-{stem}.{extension}"),
    }
}

/// Open sink that is released when the guard goes out of scope.
///
/// Use [`SinkGuard::close`] on the success path to observe close errors; a
/// guard dropped while still open (an early `?` return) closes the sink and
/// only logs failures.
pub struct SinkGuard<'a, P: SinkProvider> {
    provider: &'a mut P,
    sink: Option<P::Sink>,
    path: PathBuf,
}

impl<'a, P: SinkProvider> SinkGuard<'a, P> {
    pub fn open(provider: &'a mut P, role: &str, iteration: Option<usize>) -> Result<Self> {
        let path = provider.sink_path(role, iteration);
        let sink = provider.open_sink(role, iteration)?;
        Ok(Self {
            provider,
            sink: Some(sink),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Convert an I/O error raised while writing into this sink.
    pub fn io_error(&self, source: io::Error) -> InspectError {
        InspectError::io(&self.path, source)
    }

    pub fn close(mut self) -> Result<()> {
        match self.sink.take() {
            Some(sink) => self.provider.close_sink(sink),
            None => Ok(()),
        }
    }

    fn sink_mut(&mut self) -> io::Result<&mut P::Sink> {
        self.sink
            .as_mut()
            .ok_or_else(|| io::Error::other("sink already closed"))
    }
}

impl<P: SinkProvider> Write for SinkGuard<'_, P> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.sink_mut()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.sink_mut()?.flush()
    }
}

impl<P: SinkProvider> Drop for SinkGuard<'_, P> {
    fn drop(&mut self) {
        if let Some(sink) = self.sink.take() {
            if let Err(e) = self.provider.close_sink(sink) {
                warn!("failed to release sink {}: {e}", self.path.display());
            }
        }
    }
}

/// Writes every sink to a file derived from a base file name.
#[derive(Debug, Clone)]
pub struct FileSinkProvider {
    base_file_name: String,
}

/// File sink handed out by [`FileSinkProvider`].
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.writer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl FileSinkProvider {
    pub fn new(base_file_name: impl Into<String>) -> Self {
        Self {
            base_file_name: base_file_name.into(),
        }
    }

    pub fn base_file_name(&self) -> &str {
        &self.base_file_name
    }
}

impl SinkProvider for FileSinkProvider {
    type Sink = FileSink;

    fn sink_path(&self, role: &str, iteration: Option<usize>) -> PathBuf {
        PathBuf::from(sink_file_name(&self.base_file_name, role, iteration))
    }

    fn open_sink(&mut self, role: &str, iteration: Option<usize>) -> Result<FileSink> {
        let path = self.sink_path(role, iteration);
        ensure_parent_dir(&path)?;
        let file = File::create(&path).map_err(|e| InspectError::io(&path, e))?;
        debug!("opened sink {}", path.display());
        Ok(FileSink {
            path,
            writer: BufWriter::new(file),
        })
    }

    fn close_sink(&mut self, mut sink: FileSink) -> Result<()> {
        sink.writer
            .flush()
            .map_err(|e| InspectError::io(&sink.path, e))?;
        debug!("closed sink {}", sink.path.display());
        Ok(())
    }
}

/// Keeps closed sinks in memory, keyed like [`FileSinkProvider`] paths.
#[derive(Debug, Clone)]
pub struct MemorySinkProvider {
    base_file_name: String,
    closed: BTreeMap<PathBuf, Vec<u8>>,
    open: usize,
}

/// In-memory sink handed out by [`MemorySinkProvider`].
#[derive(Debug)]
pub struct MemorySink {
    path: PathBuf,
    buffer: Vec<u8>,
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl MemorySinkProvider {
    pub fn new(base_file_name: impl Into<String>) -> Self {
        Self {
            base_file_name: base_file_name.into(),
            closed: BTreeMap::new(),
            open: 0,
        }
    }

    /// Number of sinks handed out and not yet closed.
    pub fn open_count(&self) -> usize {
        self.open
    }

    /// Content of the closed sink for `role` / `iteration`.
    pub fn get(&self, role: &str, iteration: Option<usize>) -> Option<&[u8]> {
        self.closed
            .get(&self.sink_path(role, iteration))
            .map(Vec::as_slice)
    }

    /// Content of the closed sink as text.
    pub fn text(&self, role: &str, iteration: Option<usize>) -> Option<String> {
        self.get(role, iteration)
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }

    /// Paths of every closed sink, sorted.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.closed.keys().map(PathBuf::as_path)
    }
}

impl Default for MemorySinkProvider {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_BASE_FILE_NAME)
    }
}

impl SinkProvider for MemorySinkProvider {
    type Sink = MemorySink;

    fn sink_path(&self, role: &str, iteration: Option<usize>) -> PathBuf {
        PathBuf::from(sink_file_name(&self.base_file_name, role, iteration))
    }

    fn open_sink(&mut self, role: &str, iteration: Option<usize>) -> Result<MemorySink> {
        self.open += 1;
        Ok(MemorySink {
            path: self.sink_path(role, iteration),
            buffer: Vec::new(),
        })
    }

    fn close_sink(&mut self, sink: MemorySink) -> Result<()> {
        self.open = self.open.saturating_sub(1);
        self.closed.insert(sink.path, sink.buffer);
        Ok(())
    }
}

/// Create the parent directory of `path` if it has one.
pub(crate) fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent).map_err(|e| InspectError::io(parent, e))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_file_names() {
        assert_eq!(sink_file_name("out", "reading", None), "out-reading.vtk");
        assert_eq!(
            sink_file_name("out", "iteration", Some(12)),
            "out-iteration-12.vtk"
        );
        assert_eq!(
            sink_file_name("run/out", "iteration-info.csv", None),
            "run/out-iteration-info.csv"
        );
        assert_eq!(sink_file_name("out", ".hidden", None), "out-.hidden.vtk");
    }

    #[test]
    fn test_dotted_roles_get_default_extension() {
        assert_eq!(sink_file_name("out", "scan.001", None), "out-scan.001.vtk");
        assert_eq!(
            sink_file_name("out", "scan.001", Some(2)),
            "out-scan.001-2.vtk"
        );
        assert_eq!(sink_file_name("out", "a.", None), "out-a..vtk");
        assert_ne!(
            sink_file_name("out", "a", None),
            sink_file_name("out", "a.vtk", None)
        );
        assert_eq!(sink_file_name("out", "a.vtk", None), "out-a.vtk.vtk");
    }

    #[test]
    fn test_guard_close_stores_content() {
        let mut provider = MemorySinkProvider::new("mem");
        let mut guard = SinkGuard::open(&mut provider, "reading", None).unwrap();
        assert_eq!(guard.path(), Path::new("mem-reading.vtk"));
        guard.write_all(b"hello").unwrap();
        guard.close().unwrap();

        assert_eq!(provider.open_count(), 0);
        assert_eq!(provider.get("reading", None), Some(&b"hello"[..]));
    }

    #[test]
    fn test_guard_releases_on_error_path() {
        fn failing_export(provider: &mut MemorySinkProvider) -> Result<()> {
            let mut guard = SinkGuard::open(provider, "iteration", Some(1))?;
            guard.write_all(b"partial").map_err(|e| guard.io_error(e))?;
            Err(InspectError::Config("simulated failure".to_string()))
        }

        let mut provider = MemorySinkProvider::new("mem");
        assert!(failing_export(&mut provider).is_err());
        assert_eq!(provider.open_count(), 0);
        assert_eq!(provider.text("iteration", Some(1)).unwrap(), "partial");
    }

    #[test]
    fn test_reopen_overwrites() {
        let mut provider = MemorySinkProvider::new("mem");
        for content in ["first run, longer content", "second"] {
            let mut guard = SinkGuard::open(&mut provider, "iteration", Some(0)).unwrap();
            guard.write_all(content.as_bytes()).unwrap();
            guard.close().unwrap();
        }
        assert_eq!(provider.text("iteration", Some(0)).unwrap(), "second");
        assert_eq!(provider.paths().count(), 1);
    }

    #[test]
    fn test_provider_conveniences() {
        let mut provider = MemorySinkProvider::new("mem");
        let mut sink = provider.open_iteration("iteration", 4).unwrap();
        sink.write_all(b"it").unwrap();
        provider.close_sink(sink).unwrap();
        let sink = provider.open_role("reference").unwrap();
        provider.close_sink(sink).unwrap();

        let paths: Vec<&Path> = provider.paths().collect();
        assert_eq!(
            paths,
            [Path::new("mem-iteration-4.vtk"), Path::new("mem-reference.vtk")]
        );
    }

    #[test]
    fn test_file_provider_creates_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("nested").join("run");
        let mut provider = FileSinkProvider::new(base.display().to_string());

        for content in ["a much longer first payload", "short"] {
            let mut guard = SinkGuard::open(&mut provider, "reference", None).unwrap();
            guard.write_all(content.as_bytes()).unwrap();
            guard.close().unwrap();
        }

        let path = dir.path().join("nested").join("run-reference.vtk");
        assert_eq!(fs::read_to_string(path).unwrap(), "short");
    }

    #[test]
    fn test_file_provider_unwritable_destination() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "file").unwrap();
        let mut provider = FileSinkProvider::new(blocker.join("run").display().to_string());

        let err = SinkGuard::open(&mut provider, "reading", None).err().unwrap();
        assert!(matches!(err, InspectError::Io { .. }));
    }
}
