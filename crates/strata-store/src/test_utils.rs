//! Test fixtures for Strata Store

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use strata_core::{
    DiagramType, Edge, EdgeKind, GraphState, Layout, Node, NodeId, NodeKind, SnapshotContent,
    ViewId,
};
use tokio::sync::Notify;

use crate::config::StoreConfig;
use crate::port::{CollisionChoice, FilePort, MemoryFiles, UiPort};
use crate::workspace::Workspace;

/// Workspace over in-memory files, with a pool of three systems and a
/// `context` view showing `a -> b`.
pub async fn seeded_workspace() -> (Arc<MemoryFiles>, Workspace) {
    let files = Arc::new(MemoryFiles::new());
    let workspace = Workspace::new(files.clone(), StoreConfig::default());

    workspace.init(Some("Test Landscape")).await.unwrap();
    let mut pool = GraphState::new("Test Landscape");
    let mut a = Node::new("a", NodeKind::System, "System A");
    a.technology = Some("Rust".to_string());
    pool.insert_node(a);
    pool.insert_node(Node::new("b", NodeKind::System, "System B"));
    pool.insert_node(Node::new("legacy", NodeKind::System, "Legacy"));
    pool.edges
        .insert("a-b".into(), Edge::new("a-b", "a", "b", EdgeKind::Uses));
    workspace.entities().write(pool).await.unwrap();

    let mut view = workspace
        .create_view("context", "Context", DiagramType::Context)
        .await
        .unwrap();
    let mut content = SnapshotContent::default();
    content.layout.insert(NodeId::from("a"), Layout::at(100.0, 100.0));
    content.layout.insert(NodeId::from("b"), Layout::at(400.0, 100.0));
    content.edges.push(Edge::new("a-b", "a", "b", EdgeKind::Uses));
    view.timeline.capture(content).unwrap();
    let current = view.timeline.current().unwrap().clone();
    view.mirror(&current);
    workspace.views().write(&mut view).await.unwrap();

    (files, workspace)
}

pub fn context() -> ViewId {
    ViewId::from("context")
}

/// Memory files whose renames can be made to fail.
#[derive(Debug, Default)]
pub struct FlakyFiles {
    pub inner: MemoryFiles,
    pub fail_renames: AtomicBool,
}

impl FlakyFiles {
    pub fn failing() -> Self {
        let files = Self::default();
        files.fail_renames.store(true, Ordering::SeqCst);
        files
    }
}

#[async_trait]
impl FilePort for FlakyFiles {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner.read(path).await
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.inner.write(path, bytes).await
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        self.inner.exists(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        if self.fail_renames.load(Ordering::SeqCst) {
            return Err(io::Error::other("disk full"));
        }
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.inner.delete(path).await
    }

    async fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        self.inner.list(dir).await
    }
}

/// Memory files that can hold the next read after its bytes are taken,
/// until the test releases it.
#[derive(Debug, Default)]
pub struct GatedFiles {
    pub inner: MemoryFiles,
    hold_next_read: AtomicBool,
    /// Signalled once a held read has its bytes.
    pub parked: Notify,
    pub release: Notify,
}

impl GatedFiles {
    pub fn hold_next_read(&self) {
        self.hold_next_read.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FilePort for GatedFiles {
    async fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let bytes = self.inner.read(path).await?;
        if self.hold_next_read.swap(false, Ordering::SeqCst) {
            self.parked.notify_one();
            self.release.notified().await;
        }
        Ok(bytes)
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        self.inner.write(path, bytes).await
    }

    async fn exists(&self, path: &str) -> io::Result<bool> {
        self.inner.exists(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> io::Result<()> {
        self.inner.rename(from, to).await
    }

    async fn delete(&self, path: &str) -> io::Result<()> {
        self.inner.delete(path).await
    }

    async fn list(&self, dir: &str) -> io::Result<Vec<String>> {
        self.inner.list(dir).await
    }
}

/// UI that records questions and answers from a script.
#[derive(Debug)]
pub struct ScriptedUi {
    pub confirm: bool,
    pub choice: CollisionChoice,
    pub asked: std::sync::Mutex<Vec<String>>,
}

impl ScriptedUi {
    pub fn new(confirm: bool, choice: CollisionChoice) -> Self {
        Self {
            confirm,
            choice,
            asked: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> usize {
        self.asked.lock().unwrap().len()
    }
}

#[async_trait]
impl UiPort for ScriptedUi {
    async fn confirm(&self, question: &str) -> bool {
        self.asked.lock().unwrap().push(question.to_string());
        self.confirm
    }

    async fn choose_one(&self, question: &str, _options: &[CollisionChoice]) -> CollisionChoice {
        self.asked.lock().unwrap().push(question.to_string());
        self.choice
    }
}
