//! Kale Notebook - pipeline step tags for notebook cells
//!
//! Turns a linear notebook into a pipeline description:
//! - Encodes step identity and dependency edges as per-cell string tags
//! - Assembles the step dependency graph from those tags
//! - Keeps edges consistent under renames, merges and structural edits
//! - Reads and validates notebook-level pipeline metadata
//!
//! # Example
//!
//! ```rust,ignore
//! use kale_notebook::prelude::*;
//!
//! # async fn example() -> Result<(), NotebookError> {
//! let store = IpynbStore::new("pipeline.ipynb");
//! let mut notebook = store.load().await?;
//!
//! rename(&mut notebook, &store, "load", "ingest").await?;
//! let graph = StepGraph::assemble(&notebook);
//! println!("steps: {:?}", graph.topological_order()?);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod graph;
pub mod metadata;
pub mod notebook;
pub mod rename;
pub mod tags;

pub use error::NotebookError;
pub use graph::{all_steps, previous_visible_step, DanglingEdge, Edge, StepGraph};
pub use metadata::{
    normalize_size, validate_pipeline_name, Annotation, Experiment, NotebookMetadata, SizeUnit,
    VolumeSpec, VolumeType, KALE_NOTEBOOK_METADATA_KEY, ROK_ORIGIN_ANNOTATION,
};
pub use notebook::{Cell, CellKind, IpynbStore, MemoryStore, Notebook, NotebookStore};
pub use rename::{
    change_cell_kind, clear_cell, on_cell_type_changed, remove_cell, rename, rename_step,
    set_cell_role, set_dependencies, set_step_name, RenameSummary,
};
pub use tags::{decode, encode, is_reserved, validate_step_name, ReservedRole, StepTags};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for editing notebook step tags
    pub use crate::{
        rename, set_dependencies, set_step_name, Cell, IpynbStore, Notebook, NotebookError,
        NotebookMetadata, NotebookStore, ReservedRole, StepGraph, StepTags,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
