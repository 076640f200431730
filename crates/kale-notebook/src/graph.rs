//! Step dependency graph assembled from cell tags
//!
//! The graph is a pure function of the notebook's tag state. Nothing here
//! writes to the notebook; see [`crate::rename`] for edits.

use crate::error::NotebookError;
use crate::notebook::Notebook;
use crate::tags::{ReservedRole, StepTags};
use indexmap::IndexSet;
use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

/// Declared step names in first-seen order
///
/// Empty (merge) names and reserved roles are excluded.
#[must_use]
pub fn all_steps(notebook: &Notebook) -> IndexSet<String> {
    notebook
        .cells
        .iter()
        .filter_map(|c| c.step_tags())
        .filter(StepTags::is_step)
        .map(|t| t.name)
        .collect()
}

/// Name of the nearest preceding cell that declares a step
///
/// Merge cells and `skip` cells are passed over. Reserved roles other than
/// `skip` count as a visible step.
#[must_use]
pub fn previous_visible_step(notebook: &Notebook, index: usize) -> Option<String> {
    let end = index.min(notebook.len());
    notebook.cells[..end]
        .iter()
        .rev()
        .filter_map(|c| c.step_tags())
        .find(|t| !t.is_merge() && t.role() != Some(ReservedRole::Skip))
        .map(|t| t.name)
}

/// Dependency edge: `to` depends on `from`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Edge {
    /// Upstream step
    pub from: String,
    /// Downstream step
    pub to: String,
}

/// Edge that cannot be placed in the graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingEdge {
    /// Cell carrying the `prev:` tag
    pub cell: usize,
    /// Step the cell belongs to, if any
    pub step: Option<String>,
    /// Referenced dependency
    pub dependency: String,
}

/// Assembled step graph
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepGraph {
    steps: IndexSet<String>,
    edges: IndexSet<Edge>,
    dangling: Vec<DanglingEdge>,
    merge_parents: Vec<Option<String>>,
}

impl StepGraph {
    /// Build the graph from the notebook's current tags
    ///
    /// Edges declared on a merge cell are attributed to its merge parent.
    /// Edges owned by no step, or pointing at a reserved or undeclared step,
    /// are reported as dangling.
    #[must_use]
    pub fn assemble(notebook: &Notebook) -> Self {
        let steps = all_steps(notebook);
        let mut edges = IndexSet::new();
        let mut dangling = Vec::new();
        let mut merge_parents = Vec::with_capacity(notebook.len());
        let mut current: Option<String> = None;

        for (index, cell) in notebook.cells.iter().enumerate() {
            let Some(tags) = cell.step_tags() else {
                merge_parents.push(None);
                continue;
            };

            let owner = if tags.is_merge() {
                let parent = current.clone();
                merge_parents.push(parent.clone());
                parent
            } else {
                merge_parents.push(None);
                if tags.role() != Some(ReservedRole::Skip) {
                    current = Some(tags.name.clone());
                }
                Some(tags.name.clone())
            };

            for dep in tags.dependencies {
                match owner.as_ref().filter(|o| steps.contains(*o)) {
                    Some(step) if steps.contains(&dep) && dep != *step => {
                        edges.insert(Edge {
                            from: dep,
                            to: step.clone(),
                        });
                    }
                    _ => dangling.push(DanglingEdge {
                        cell: index,
                        step: owner.clone(),
                        dependency: dep,
                    }),
                }
            }
        }

        if !dangling.is_empty() {
            tracing::debug!(count = dangling.len(), "dangling dependency edges");
        }

        Self {
            steps,
            edges,
            dangling,
            merge_parents,
        }
    }

    /// Declared steps in first-seen order
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &IndexSet<String> {
        &self.steps
    }

    /// Resolved dependency edges
    #[inline]
    #[must_use]
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Number of resolved edges
    #[inline]
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges that reference reserved or undeclared steps
    #[inline]
    #[must_use]
    pub fn dangling(&self) -> &[DanglingEdge] {
        &self.dangling
    }

    /// Step a merge cell belongs to
    #[must_use]
    pub fn merge_parent(&self, index: usize) -> Option<&str> {
        self.merge_parents.get(index)?.as_deref()
    }

    /// Steps `step` depends on, in edge order
    #[must_use]
    pub fn dependencies_of(&self, step: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|e| e.to == step)
            .map(|e| e.from.as_str())
            .collect()
    }

    /// Candidates for the dependency selector of `current`
    #[must_use]
    pub fn dependency_choices(&self, current: &str) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| s.as_str() != current)
            .map(String::as_str)
            .collect()
    }

    /// Steps ordered so that every dependency precedes its dependents
    pub fn topological_order(&self) -> Result<Vec<&str>, NotebookError> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for i in 0..self.steps.len() {
            graph.add_node(i);
        }
        for edge in &self.edges {
            if let (Some(from), Some(to)) = (
                self.steps.get_index_of(&edge.from),
                self.steps.get_index_of(&edge.to),
            ) {
                graph.add_edge(from, to, ());
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let name = self
                .steps
                .get_index(cycle.node_id())
                .cloned()
                .unwrap_or_default();
            NotebookError::DependencyCycle(name)
        })?;

        Ok(order
            .into_iter()
            .filter_map(|i| self.steps.get_index(i).map(String::as_str))
            .collect())
    }

    /// Check that the edge set is acyclic
    pub fn validate(&self) -> Result<(), NotebookError> {
        self.topological_order().map(|_| ())
    }
}
