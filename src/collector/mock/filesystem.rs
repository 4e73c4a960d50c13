//! In-memory `/proc` for running the procfs table in tests.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};

use crate::collector::traits::FileSystem;

#[derive(Debug, Clone)]
enum Node {
    File(String),
    Dir,
}

/// In-memory filesystem.
///
/// Individual paths can be told to fail with a chosen [`io::ErrorKind`],
/// which is how tests simulate a process exiting or turning unreadable
/// between the directory scan and the read.
#[derive(Debug, Clone, Default)]
pub struct MockFs {
    nodes: BTreeMap<PathBuf, Node>,
    failures: HashMap<PathBuf, io::ErrorKind>,
}

impl MockFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file, creating missing parent directories.
    pub fn add_file(&mut self, path: impl AsRef<Path>, content: impl Into<String>) {
        let path = path.as_ref();
        self.add_ancestors(path);
        self.nodes.insert(path.to_path_buf(), Node::File(content.into()));
    }

    /// Adds an empty directory, creating missing parents.
    pub fn add_dir(&mut self, path: impl AsRef<Path>) {
        let path = path.as_ref();
        self.add_ancestors(path);
        self.nodes.entry(path.to_path_buf()).or_insert(Node::Dir);
    }

    fn add_ancestors(&mut self, path: &Path) {
        for ancestor in path.ancestors().skip(1) {
            if ancestor.as_os_str().is_empty() {
                continue;
            }
            self.nodes.entry(ancestor.to_path_buf()).or_insert(Node::Dir);
        }
    }

    /// Makes every read of `path` fail with `kind`.
    ///
    /// The path stays listed, like a `/proc/[pid]` entry whose process exits
    /// right after the directory scan.
    pub fn fail_path(&mut self, path: impl AsRef<Path>, kind: io::ErrorKind) {
        self.failures.insert(path.as_ref().to_path_buf(), kind);
    }

    /// Adds `/proc/[pid]/{stat,status,cmdline}` with the given contents.
    ///
    /// `cmdline` is NUL-separated, as the kernel writes it.
    pub fn add_process(&mut self, pid: u32, stat: &str, status: &str, cmdline: &str) {
        let base = PathBuf::from(format!("/proc/{pid}"));
        self.add_dir(&base);
        for (name, content) in [("stat", stat), ("status", status), ("cmdline", cmdline)] {
            self.add_file(base.join(name), content);
        }
    }
}

fn not_found(what: &str, path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("{what} not found: {}", path.display()),
    )
}

impl FileSystem for MockFs {
    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        if let Some(&kind) = self.failures.get(path) {
            return Err(io::Error::new(kind, format!("injected failure: {}", path.display())));
        }
        match self.nodes.get(path) {
            Some(Node::File(content)) => Ok(content.clone()),
            _ => Err(not_found("file", path)),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.nodes.contains_key(path)
    }

    fn read_dir(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        if !matches!(self.nodes.get(path), Some(Node::Dir)) {
            return Err(not_found("directory", path));
        }
        Ok(self
            .nodes
            .keys()
            .filter(|entry| entry.parent() == Some(path))
            .cloned()
            .collect())
    }
}
