//! Collaborator ports: durable file storage and modal user prompts
//!
//! Paths handed to a `FilePort` are relative and `/`-separated
//! (`views/context.json`); the port decides where they live.

use std::io;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

/// Minimal file storage the stores are written against.
#[async_trait]
pub trait FilePort: Send + Sync {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    /// Create or replace `path`.
    async fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    async fn exists(&self, path: &str) -> io::Result<bool>;

    async fn rename(&self, from: &str, to: &str) -> io::Result<()>;

    async fn delete(&self, path: &str) -> io::Result<()>;

    /// Files directly inside `dir`, as full relative paths, sorted.
    /// A missing directory lists as empty.
    async fn list(&self, dir: &str) -> io::Result<Vec<String>>;
}

/// Files under a root directory on the local disk.
#[derive(Debug, Clone)]
pub struct LocalFiles {
    root: PathBuf,
}

impl LocalFiles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl FilePort for LocalFiles {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        tokio::fs::read(self.resolve(path)).await
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(full, bytes).await
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        tokio::fs::try_exists(self.resolve(path)).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        tokio::fs::rename(self.resolve(from), self.resolve(to)).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        tokio::fs::remove_file(self.resolve(path)).await
    }

    async fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(self.resolve(dir)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                paths.push(format!("{}/{}", dir.trim_end_matches('/'), name));
            }
        }
        paths.sort();
        Ok(paths)
    }
}

/// In-process file storage, used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryFiles {
    files: DashMap<String, Vec<u8>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored path, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.iter().map(|e| e.key().clone()).collect();
        paths.sort();
        paths
    }
}

fn missing(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("no such file: {}", path))
}

#[async_trait]
impl FilePort for MemoryFiles {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.files
            .get(path)
            .map(|bytes| bytes.value().clone())
            .ok_or_else(|| missing(path))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.files.insert(path.to_string(), bytes.to_vec());
        Ok(())
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        Ok(self.files.contains_key(path))
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        let (_, bytes) = self.files.remove(from).ok_or_else(|| missing(from))?;
        self.files.insert(to.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.files.remove(path).map(|_| ()).ok_or_else(|| missing(path))
    }

    async fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        let prefix = format!("{}/", dir.trim_end_matches('/'));
        let mut paths: Vec<String> = self
            .files
            .iter()
            .map(|e| e.key().clone())
            .filter(|p| p.strip_prefix(&prefix).is_some_and(|rest| !rest.contains('/')))
            .collect();
        paths.sort();
        Ok(paths)
    }
}

/// Answer to a label collision when adding a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollisionChoice {
    /// Select the existing global node into the view.
    ReuseExisting,
    /// Create a second global node with the same label.
    CreateNew,
    Cancel,
}

impl CollisionChoice {
    pub const ALL: [CollisionChoice; 3] = [
        CollisionChoice::ReuseExisting,
        CollisionChoice::CreateNew,
        CollisionChoice::Cancel,
    ];
}

/// Modal decisions the workflows need from a user.
#[async_trait]
pub trait UiPort: Send + Sync {
    async fn confirm(&self, question: &str) -> bool;

    async fn choose_one(&self, question: &str, options: &[CollisionChoice]) -> CollisionChoice;
}

/// Non-interactive answers, for the CLI's `--yes` style flags and the
/// HTTP surface where the client already decided.
#[derive(Debug, Clone, Copy)]
pub struct StaticUi {
    pub confirm: bool,
    pub choice: CollisionChoice,
}

impl StaticUi {
    pub fn new(confirm: bool, choice: CollisionChoice) -> Self {
        Self { confirm, choice }
    }

    /// Declines every prompt.
    pub fn decline() -> Self {
        Self::new(false, CollisionChoice::Cancel)
    }
}

#[async_trait]
impl UiPort for StaticUi {
    async fn confirm(&self, question: &str) -> bool {
        debug!("confirm {:?} -> {}", question, self.confirm);
        self.confirm
    }

    async fn choose_one(&self, question: &str, options: &[CollisionChoice]) -> CollisionChoice {
        let choice = if options.contains(&self.choice) {
            self.choice
        } else {
            CollisionChoice::Cancel
        };
        debug!("choose_one {:?} -> {:?}", question, choice);
        choice
    }
}
