use kale_notebook::{
    rename, set_step_name, Cell, IpynbStore, MemoryStore, Notebook, NotebookError, NotebookMetadata,
    NotebookStore, StepGraph,
};
use async_trait::async_trait;
use pretty_assertions::assert_eq;
use proptest::prelude::*;

fn pipeline() -> Notebook {
    Notebook::new(vec![
        Cell::code("import pandas as pd").with_tags(&["imports"]),
        Cell::code("df = pd.read_csv('x')").with_tags(&["block:load"]),
        Cell::code("df.head()").with_tags(&["block:"]),
        Cell::markdown("## Training"),
        Cell::code("model = fit(df)").with_tags(&["block:train", "prev:load"]),
        Cell::code("score(model)").with_tags(&["block:evaluate", "prev:train", "prev:load"]),
    ])
}

#[tokio::test]
async fn rename_persists_once_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipeline.ipynb");
    let store = IpynbStore::new(&path);
    store.save(&pipeline()).await.unwrap();

    let mut notebook = store.load().await.unwrap();
    rename(&mut notebook, &store, "load", "ingest").await.unwrap();

    let reloaded = store.load().await.unwrap();
    assert_eq!(reloaded, notebook);
    assert_eq!(reloaded.tags(4).unwrap(), vec!["block:train", "prev:ingest"]);
    assert_eq!(
        reloaded.tags(5).unwrap(),
        vec!["block:evaluate", "prev:train", "prev:ingest"]
    );
}

#[tokio::test]
async fn rename_leaves_no_old_edges() {
    let mut notebook = pipeline();
    let store = MemoryStore::new();
    rename(&mut notebook, &store, "load", "").await.unwrap();

    for index in 0..notebook.len() {
        let tags = notebook.tags(index).unwrap_or_default();
        assert!(!tags.iter().any(|t| t == "prev:load"), "cell {index}: {tags:?}");
    }
    assert_eq!(store.save_count(), 1);
    assert_eq!(store.last_saved().unwrap(), notebook);
}

struct FailingStore;

#[async_trait]
impl NotebookStore for FailingStore {
    async fn save(&self, _notebook: &Notebook) -> Result<(), NotebookError> {
        Err(NotebookError::Persist("disk full".into()))
    }
}

#[tokio::test]
async fn failed_save_leaves_notebook_unchanged() {
    let mut notebook = pipeline();
    let before = notebook.clone();

    let err = rename(&mut notebook, &FailingStore, "load", "ingest")
        .await
        .unwrap_err();
    assert!(matches!(err, NotebookError::Persist(_)));
    assert_eq!(notebook, before);
    assert_eq!(notebook.tags(4).unwrap(), vec!["block:train", "prev:load"]);

    assert!(set_step_name(&mut notebook, &FailingStore, 1, "ingest").await.is_err());
    assert_eq!(notebook, before);
}

#[tokio::test]
async fn rename_to_declared_name_is_rejected_without_writes() {
    let mut notebook = pipeline();
    let before = notebook.clone();
    let store = MemoryStore::new();

    let err = rename(&mut notebook, &store, "load", "train").await.unwrap_err();
    assert!(matches!(err, NotebookError::NameAlreadyExists(ref n) if n == "train"));
    assert!(err.is_validation());
    assert_eq!(notebook, before);
    assert_eq!(store.save_count(), 0);

    let err = set_step_name(&mut notebook, &store, 4, "evaluate")
        .await
        .unwrap_err();
    assert!(matches!(err, NotebookError::NameAlreadyExists(_)));
    assert_eq!(notebook, before);
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn rename_to_same_name_still_saves() {
    let mut notebook = pipeline();
    let store = MemoryStore::new();
    let summary = rename(&mut notebook, &store, "train", "train").await.unwrap();
    assert_eq!(summary.edges_renamed, 1);
    assert_eq!(notebook, pipeline());
    assert_eq!(store.save_count(), 1);
}

#[tokio::test]
async fn step_rename_keeps_graph_shape() {
    let mut notebook = pipeline();
    let store = MemoryStore::new();
    set_step_name(&mut notebook, &store, 1, "ingest").await.unwrap();

    let graph = StepGraph::assemble(&notebook);
    assert_eq!(graph.steps().iter().collect::<Vec<_>>(), vec!["ingest", "train", "evaluate"]);
    assert_eq!(graph.merge_parent(2), Some("ingest"));
    assert_eq!(graph.dependencies_of("evaluate"), vec!["train", "ingest"]);
    assert_eq!(
        graph.topological_order().unwrap(),
        vec!["ingest", "train", "evaluate"]
    );
}

#[tokio::test]
async fn metadata_survives_tag_edits() {
    let mut notebook = pipeline();
    let metadata = NotebookMetadata {
        pipeline_name: "my-pipeline".to_string(),
        ..Default::default()
    };
    notebook.set_kale_metadata(&metadata).unwrap();

    let store = MemoryStore::new();
    rename(&mut notebook, &store, "load", "ingest").await.unwrap();
    let saved = store.last_saved().unwrap();
    assert_eq!(saved.kale_metadata().unwrap(), metadata);
}

proptest! {
    #[test]
    fn prop_rename_removes_every_old_edge(
        old in "[a-c]",
        new in prop_oneof![Just(String::new()), "[x-z]".prop_map(String::from)],
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let mut notebook = Notebook::new(vec![
            Cell::code("1").with_tags(&["block:a"]),
            Cell::code("2").with_tags(&["block:b", "prev:a"]),
            Cell::code("3").with_tags(&["block:c", "prev:a", "prev:b"]),
            Cell::code("4").with_tags(&["block:", "prev:c"]),
        ]);
        let store = MemoryStore::new();
        runtime
            .block_on(rename(&mut notebook, &store, &old, &new))
            .unwrap();

        let old_edge = format!("prev:{old}");
        for index in 0..notebook.len() {
            let tags = notebook.tags(index).unwrap_or_default();
            prop_assert!(!tags.contains(&old_edge));
        }
        prop_assert_eq!(store.save_count(), 1);
    }
}
