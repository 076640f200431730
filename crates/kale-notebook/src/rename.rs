//! Rename propagation and tag-editing operations
//!
//! Every operation validates first, then applies all tag writes to a copy of
//! the notebook, then persists exactly once. The caller's notebook only takes
//! the edit after the save succeeded; on any error it is left untouched.

use crate::error::NotebookError;
use crate::graph::all_steps;
use crate::notebook::{Cell, CellKind, Notebook, NotebookStore};
use crate::tags::{self, is_reserved, validate_step_name, ReservedRole, StepTags, PREV_PREFIX};
use indexmap::IndexSet;

/// Outcome of an edge rewrite
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenameSummary {
    /// Cells whose tag list changed
    pub cells_rewritten: usize,
    /// `prev:` tags renamed
    pub edges_renamed: usize,
    /// `prev:` tags removed
    pub edges_dropped: usize,
}

impl RenameSummary {
    /// Whether any tag changed
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells_rewritten == 0
    }
}

/// Rewrite every `prev:<old>` edge to point at `new`
///
/// Edges are dropped when `new` is empty or a reserved role. Fails with
/// [`NotebookError::NameAlreadyExists`] when `new` is already declared by a
/// step other than `old`. The document is saved once, even when no tag
/// changed.
pub async fn rename(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    old: &str,
    new: &str,
) -> Result<RenameSummary, NotebookError> {
    if !new.is_empty() && !is_reserved(new) {
        validate_step_name(new)?;
    }
    if new != old && all_steps(notebook).contains(new) {
        return Err(NotebookError::NameAlreadyExists(new.to_string()));
    }

    let mut draft = notebook.clone();
    let summary = propagate_rename(&mut draft, old, new);
    commit(notebook, store, draft).await?;
    tracing::info!(
        old,
        new,
        cells = summary.cells_rewritten,
        dropped = summary.edges_dropped,
        "step renamed"
    );
    Ok(summary)
}

/// Find the cell declaring `old`, rename it, and update its dependents
pub async fn rename_step(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    old: &str,
    new: &str,
) -> Result<RenameSummary, NotebookError> {
    let index = notebook
        .cells
        .iter()
        .position(|c| c.step_tags().is_some_and(|t| t.is_step() && t.name == old))
        .ok_or_else(|| NotebookError::UnknownStep(old.to_string()))?;
    set_step_name(notebook, store, index, new).await
}

/// Give a code cell a step name, keeping its dependencies
///
/// An empty name turns the cell into a merge cell. Dependents of the old
/// name are updated when no other cell still declares it.
pub async fn set_step_name(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
    name: &str,
) -> Result<RenameSummary, NotebookError> {
    let cell = code_cell(notebook, index)?;
    if is_reserved(name) {
        return Err(NotebookError::InvalidStepName(name.to_string()));
    }
    validate_step_name(name)?;

    let current = cell.step_tags().unwrap_or_default();
    if !name.is_empty() && name != current.name && all_steps(notebook).contains(name) {
        return Err(NotebookError::NameAlreadyExists(name.to_string()));
    }

    let dependencies = if current.role().is_some() {
        Vec::new()
    } else {
        current.dependencies.clone()
    };
    let tags = retag(cell, &StepTags::new(name, dependencies));
    let mut draft = notebook.clone();
    draft.set_tags(index, tags)?;

    let summary = propagate_if_gone(&mut draft, &current.name, name);
    commit(notebook, store, draft).await?;
    Ok(summary)
}

/// Replace the dependencies of a named step
///
/// Duplicates are collapsed; every dependency must be a declared step other
/// than the cell's own.
pub async fn set_dependencies(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
    dependencies: &[String],
) -> Result<(), NotebookError> {
    let cell = code_cell(notebook, index)?;
    let current = cell.step_tags().unwrap_or_default();
    if current.role().is_some() {
        return Err(NotebookError::ReservedWithDependencies(current.name));
    }
    if current.is_merge() {
        return Err(NotebookError::UnnamedStep(index));
    }

    let declared = all_steps(notebook);
    let mut deps: IndexSet<String> = IndexSet::with_capacity(dependencies.len());
    for dep in dependencies {
        if *dep == current.name {
            return Err(NotebookError::SelfDependency(dep.clone()));
        }
        if !declared.contains(dep) {
            return Err(NotebookError::UnknownDependency(dep.clone()));
        }
        deps.insert(dep.clone());
    }

    let tags = retag(cell, &StepTags::new(current.name, deps.into_iter().collect()));
    let mut draft = notebook.clone();
    draft.set_tags(index, tags)?;
    commit(notebook, store, draft).await
}

/// Assign a reserved role, or reset the cell to an empty step with `None`
///
/// Reserved roles carry no dependencies, so existing ones are dropped.
pub async fn set_cell_role(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
    role: Option<ReservedRole>,
) -> Result<RenameSummary, NotebookError> {
    let cell = code_cell(notebook, index)?;
    let current = cell.step_tags().unwrap_or_default();
    let name = role.map_or("", |r| r.as_str());

    let tags = retag(cell, &StepTags::new(name, Vec::new()));
    let mut draft = notebook.clone();
    draft.set_tags(index, tags)?;

    let summary = propagate_if_gone(&mut draft, &current.name, name);
    commit(notebook, store, draft).await?;
    Ok(summary)
}

/// Remove all step metadata from a cell
///
/// Dependents of the cell's step lose their edge.
pub async fn clear_cell(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
) -> Result<RenameSummary, NotebookError> {
    let current = notebook.step_tags(index).unwrap_or_default();
    let mut draft = notebook.clone();
    draft.clear_tags(index)?;

    let summary = propagate_if_gone(&mut draft, &current.name, "");
    commit(notebook, store, draft).await?;
    Ok(summary)
}

/// Delete a cell, dropping edges that pointed at its step
pub async fn remove_cell(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
) -> Result<Cell, NotebookError> {
    let mut draft = notebook.clone();
    let cell = draft.take_cell(index)?;
    let name = cell.step_tags().map(|t| t.name).unwrap_or_default();
    propagate_if_gone(&mut draft, &name, "");
    commit(notebook, store, draft).await?;
    Ok(cell)
}

/// Clear the tags of a cell that is no longer a code cell
///
/// Call after the host changed a cell's type. Returns whether tags were
/// removed. Does not save.
pub fn on_cell_type_changed(notebook: &mut Notebook, index: usize) -> Result<bool, NotebookError> {
    let cell = notebook.cell(index)?;
    if cell.is_code() || cell.tags().is_none() {
        return Ok(false);
    }
    let name = tags::decode(&cell.tags().unwrap_or_default())
        .map(|t| t.name)
        .unwrap_or_default();
    notebook.clear_tags(index)?;
    propagate_if_gone(notebook, &name, "");
    Ok(true)
}

/// Change a cell's type, clearing step metadata when it stops being code
pub async fn change_cell_kind(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    index: usize,
    kind: CellKind,
) -> Result<bool, NotebookError> {
    let mut draft = notebook.clone();
    draft.set_kind(index, kind)?;
    let cleared = on_cell_type_changed(&mut draft, index)?;
    commit(notebook, store, draft).await?;
    Ok(cleared)
}

/// Persist `draft`, then make it the caller's notebook
async fn commit(
    notebook: &mut Notebook,
    store: &dyn NotebookStore,
    draft: Notebook,
) -> Result<(), NotebookError> {
    store.save(&draft).await?;
    *notebook = draft;
    Ok(())
}

fn code_cell(notebook: &Notebook, index: usize) -> Result<&Cell, NotebookError> {
    let cell = notebook.cell(index)?;
    if cell.is_code() {
        Ok(cell)
    } else {
        Err(NotebookError::NotCodeCell(index))
    }
}

/// New tag list for `cell`: step tags first, unrelated tags preserved
fn retag(cell: &Cell, step: &StepTags) -> Vec<String> {
    let foreign = cell
        .tags()
        .unwrap_or_default()
        .into_iter()
        .filter(|t| tags::decode(std::slice::from_ref(t)).is_none());
    step.encode().into_iter().chain(foreign).collect()
}

fn propagate_if_gone(notebook: &mut Notebook, old: &str, new: &str) -> RenameSummary {
    if old.is_empty() || old == new || is_reserved(old) || all_steps(notebook).contains(old) {
        return RenameSummary::default();
    }
    propagate_rename(notebook, old, new)
}

fn propagate_rename(notebook: &mut Notebook, old: &str, new: &str) -> RenameSummary {
    let old_edge = format!("{PREV_PREFIX}{old}");
    let new_edge = (!new.is_empty() && !is_reserved(new)).then(|| format!("{PREV_PREFIX}{new}"));
    let mut summary = RenameSummary::default();

    for cell in notebook.cells.iter_mut().filter(|c| c.is_code()) {
        let Some(current) = cell.tags() else { continue };
        if !current.contains(&old_edge) {
            continue;
        }

        let own_edge = cell
            .step_tags()
            .filter(|t| !t.is_merge())
            .map(|t| format!("{PREV_PREFIX}{}", t.name));
        let mut rewritten: Vec<String> = Vec::with_capacity(current.len());
        for tag in current {
            if tag != old_edge {
                rewritten.push(tag);
                continue;
            }
            match &new_edge {
                Some(edge) if !rewritten.contains(edge) && own_edge.as_ref() != Some(edge) => {
                    rewritten.push(edge.clone());
                    summary.edges_renamed += 1;
                }
                _ => summary.edges_dropped += 1,
            }
        }
        // remaining duplicates of the new edge further down the list
        let mut seen = IndexSet::new();
        rewritten.retain(|t| !t.starts_with(PREV_PREFIX) || seen.insert(t.clone()));

        cell.write_tags(rewritten);
        summary.cells_rewritten += 1;
    }
    summary
}
