//! Notebook document model and persistence
//!
//! The model mirrors the nbformat JSON layout closely enough to round-trip
//! a `.ipynb` file: unknown keys are carried in `extra` maps. Step tags live
//! in each code cell's `metadata.tags` array.

use crate::error::NotebookError;
use crate::metadata::{NotebookMetadata, KALE_NOTEBOOK_METADATA_KEY};
use crate::tags::{self, StepTags};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Cell metadata key holding the tag list
pub const TAGS_KEY: &str = "tags";

/// Kind of notebook cell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    /// Executable code
    Code,
    /// Markdown text
    Markdown,
    /// Raw passthrough
    Raw,
}

/// A single notebook cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// Cell kind
    pub cell_type: CellKind,
    /// Cell metadata (tags live under `tags`)
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Cell source, either a string or a list of lines
    #[serde(default)]
    pub source: Value,
    /// Remaining nbformat fields (outputs, execution_count, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Cell {
    /// Create an untagged code cell
    #[must_use]
    pub fn code(source: impl Into<String>) -> Self {
        let mut extra = Map::new();
        extra.insert("outputs".to_string(), Value::Array(Vec::new()));
        extra.insert("execution_count".to_string(), Value::Null);
        Self {
            cell_type: CellKind::Code,
            metadata: Map::new(),
            source: Value::String(source.into()),
            extra,
        }
    }

    /// Create a markdown cell
    #[must_use]
    pub fn markdown(source: impl Into<String>) -> Self {
        Self {
            cell_type: CellKind::Markdown,
            metadata: Map::new(),
            source: Value::String(source.into()),
            extra: Map::new(),
        }
    }

    /// Attach a tag list (builder style)
    #[must_use]
    pub fn with_tags<S: AsRef<str>>(mut self, tags: &[S]) -> Self {
        self.write_tags(tags.iter().map(|t| t.as_ref().to_string()).collect());
        self
    }

    /// Whether this is a code cell
    #[inline]
    #[must_use]
    pub fn is_code(&self) -> bool {
        self.cell_type == CellKind::Code
    }

    /// Raw tag list, `None` when the cell carries no `tags` key
    #[must_use]
    pub fn tags(&self) -> Option<Vec<String>> {
        let tags = self.metadata.get(TAGS_KEY)?.as_array()?;
        Some(
            tags.iter()
                .filter_map(|t| t.as_str().map(str::to_string))
                .collect(),
        )
    }

    /// Decoded step metadata; non-code cells never carry any
    #[must_use]
    pub fn step_tags(&self) -> Option<StepTags> {
        if !self.is_code() {
            return None;
        }
        tags::decode(&self.tags()?)
    }

    pub(crate) fn write_tags(&mut self, tags: Vec<String>) {
        self.metadata.insert(
            TAGS_KEY.to_string(),
            Value::Array(tags.into_iter().map(Value::String).collect()),
        );
    }

    fn remove_tags(&mut self) -> bool {
        self.metadata.remove(TAGS_KEY).is_some()
    }
}

/// In-memory notebook document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notebook {
    /// Ordered cells
    pub cells: Vec<Cell>,
    /// Notebook-level metadata
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Remaining nbformat fields (nbformat, nbformat_minor)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Notebook {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl Notebook {
    /// Create a notebook from cells
    #[must_use]
    pub fn new(cells: Vec<Cell>) -> Self {
        let mut extra = Map::new();
        extra.insert("nbformat".to_string(), Value::from(4));
        extra.insert("nbformat_minor".to_string(), Value::from(4));
        Self {
            cells,
            metadata: Map::new(),
            extra,
        }
    }

    /// Parse nbformat JSON
    pub fn from_json(json: &str) -> Result<Self, NotebookError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to nbformat JSON
    pub fn to_json(&self) -> Result<String, NotebookError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Number of cells
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether the notebook has no cells
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell at `index`
    pub fn cell(&self, index: usize) -> Result<&Cell, NotebookError> {
        self.cells.get(index).ok_or(NotebookError::CellOutOfRange {
            index,
            len: self.cells.len(),
        })
    }

    fn cell_mut(&mut self, index: usize) -> Result<&mut Cell, NotebookError> {
        let len = self.cells.len();
        self.cells
            .get_mut(index)
            .ok_or(NotebookError::CellOutOfRange { index, len })
    }

    /// Decoded step metadata of the cell at `index`
    ///
    /// Out-of-range indices and non-code cells yield `None`.
    #[must_use]
    pub fn step_tags(&self, index: usize) -> Option<StepTags> {
        self.cells.get(index).and_then(Cell::step_tags)
    }

    /// Raw tags of the cell at `index`
    #[must_use]
    pub fn tags(&self, index: usize) -> Option<Vec<String>> {
        self.cells.get(index).and_then(Cell::tags)
    }

    /// Replace the tag list of a code cell
    pub fn set_tags(&mut self, index: usize, tags: Vec<String>) -> Result<(), NotebookError> {
        let cell = self.cell_mut(index)?;
        if !cell.is_code() {
            return Err(NotebookError::NotCodeCell(index));
        }
        cell.write_tags(tags);
        Ok(())
    }

    /// Drop the tag list of a cell, returning whether it had one
    pub fn clear_tags(&mut self, index: usize) -> Result<bool, NotebookError> {
        Ok(self.cell_mut(index)?.remove_tags())
    }

    /// Insert a cell at `index`
    pub fn insert_cell(&mut self, index: usize, cell: Cell) -> Result<(), NotebookError> {
        if index > self.cells.len() {
            return Err(NotebookError::CellOutOfRange {
                index,
                len: self.cells.len(),
            });
        }
        self.cells.insert(index, cell);
        Ok(())
    }

    /// Append a cell
    pub fn push_cell(&mut self, cell: Cell) {
        self.cells.push(cell);
    }

    /// Move a cell from one position to another
    pub fn move_cell(&mut self, from: usize, to: usize) -> Result<(), NotebookError> {
        let len = self.cells.len();
        if from >= len || to >= len {
            return Err(NotebookError::CellOutOfRange {
                index: from.max(to),
                len,
            });
        }
        let cell = self.cells.remove(from);
        self.cells.insert(to, cell);
        Ok(())
    }

    pub(crate) fn take_cell(&mut self, index: usize) -> Result<Cell, NotebookError> {
        if index >= self.cells.len() {
            return Err(NotebookError::CellOutOfRange {
                index,
                len: self.cells.len(),
            });
        }
        Ok(self.cells.remove(index))
    }

    pub(crate) fn set_kind(&mut self, index: usize, kind: CellKind) -> Result<CellKind, NotebookError> {
        let cell = self.cell_mut(index)?;
        Ok(std::mem::replace(&mut cell.cell_type, kind))
    }

    /// Pipeline metadata stored under the notebook-level key
    pub fn kale_metadata(&self) -> Result<NotebookMetadata, NotebookError> {
        NotebookMetadata::load(self.metadata.get(KALE_NOTEBOOK_METADATA_KEY))
    }

    /// Store pipeline metadata under the notebook-level key
    pub fn set_kale_metadata(&mut self, metadata: &NotebookMetadata) -> Result<(), NotebookError> {
        self.metadata.insert(
            KALE_NOTEBOOK_METADATA_KEY.to_string(),
            serde_json::to_value(metadata)?,
        );
        Ok(())
    }
}

/// Persistence of a notebook document
///
/// Implemented by the host's document model; tag edits call `save` exactly
/// once per logical batch.
#[async_trait]
pub trait NotebookStore: Send + Sync {
    /// Persist the current document state
    async fn save(&self, notebook: &Notebook) -> Result<(), NotebookError>;
}

/// File-backed `.ipynb` store
#[derive(Debug, Clone)]
pub struct IpynbStore {
    path: PathBuf,
}

impl IpynbStore {
    /// Create a store for the given path
    #[inline]
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read and parse the backing file
    pub async fn load(&self) -> Result<Notebook, NotebookError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        Notebook::from_json(&raw)
    }
}

#[async_trait]
impl NotebookStore for IpynbStore {
    async fn save(&self, notebook: &Notebook) -> Result<(), NotebookError> {
        let mut json = notebook.to_json()?;
        json.push('\n');
        tokio::fs::write(&self.path, json).await?;
        tracing::debug!(path = %self.path.display(), cells = notebook.len(), "notebook saved");
        Ok(())
    }
}

/// In-memory store that keeps the last saved snapshot
///
/// Useful for hosts that own persistence themselves, and for tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: parking_lot::Mutex<Option<Notebook>>,
    saves: AtomicUsize,
}

impl MemoryStore {
    /// Create an empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Last saved snapshot
    #[must_use]
    pub fn last_saved(&self) -> Option<Notebook> {
        self.saved.lock().clone()
    }

    /// Number of `save` calls so far
    #[inline]
    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotebookStore for MemoryStore {
    async fn save(&self, notebook: &Notebook) -> Result<(), NotebookError> {
        *self.saved.lock() = Some(notebook.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
