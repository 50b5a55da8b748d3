//! Autosave controller behavior: debounce coalescing, flush-on-switch,
//! startup load and default-project synthesis.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use idealog::project::{Edit, Project, ProjectStore};
use idealog::sync::Workspace;

/// In-memory store that records every write in order.
#[derive(Clone, Default)]
struct RecordingStore {
    state: Arc<Mutex<HashMap<String, Project>>>,
    writes: Arc<Mutex<Vec<Project>>>,
}

impl RecordingStore {
    fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    fn last_write(&self) -> Option<Project> {
        self.writes.lock().unwrap().last().cloned()
    }

    fn seed(&self, project: Project) {
        self.state.lock().unwrap().insert(project.id.clone(), project);
    }
}

#[async_trait]
impl ProjectStore for RecordingStore {
    async fn put(&self, project: &Project) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .insert(project.id.clone(), project.clone());
        self.writes.lock().unwrap().push(project.clone());
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<Project>> {
        Ok(self.state.lock().unwrap().values().cloned().collect())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.state.lock().unwrap().remove(id);
        Ok(())
    }
}

const DEBOUNCE: Duration = Duration::from_millis(100);

#[tokio::test]
async fn burst_of_edits_produces_exactly_one_write() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let mut ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();
    let initial_writes = probe.write_count(); // the synthesized default project

    for i in 0..5 {
        ws.edit(Edit::AddObservation {
            text: format!("pain point {i}"),
            category: "Work".into(),
        })
        .unwrap();
    }
    // Still inside the debounce window: nothing written yet.
    assert_eq!(probe.write_count(), initial_writes);

    tokio::time::sleep(DEBOUNCE * 4).await;
    assert_eq!(probe.write_count(), initial_writes + 1);
    let written = probe.last_write().unwrap();
    assert_eq!(written.data.observations.len(), 5);
    assert_eq!(written.data.observations[4].text, "pain point 4");
}

#[tokio::test]
async fn each_settled_window_writes_once() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let mut ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();
    let initial_writes = probe.write_count();

    ws.edit(Edit::AddCategory { name: "One".into() }).unwrap();
    tokio::time::sleep(DEBOUNCE * 4).await;
    ws.edit(Edit::AddCategory { name: "Two".into() }).unwrap();
    tokio::time::sleep(DEBOUNCE * 4).await;

    assert_eq!(probe.write_count(), initial_writes + 2);
}

#[tokio::test]
async fn switching_projects_flushes_pending_edits_first() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let mut ws = Workspace::open_with(store, Duration::from_secs(3600)).await.unwrap();
    let first_id = ws.current_id().unwrap().to_string();

    let second = ws.create_project("second").await.unwrap().id.clone();
    ws.switch_project(&first_id).await.unwrap();

    // An edit that would otherwise sit in the (huge) debounce window…
    ws.edit(Edit::AddObservation {
        text: "typed right before switching".into(),
        category: "Work".into(),
    })
    .unwrap();
    ws.switch_project(&second).await.unwrap();

    // …was written by the switch, not lost.
    let stored = probe
        .state
        .lock()
        .unwrap()
        .get(&first_id)
        .cloned()
        .unwrap();
    assert_eq!(stored.data.observations.len(), 1);
    assert_eq!(ws.current_id(), Some(second.as_str()));
}

#[tokio::test]
async fn empty_store_synthesizes_a_default_project() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();

    assert_eq!(ws.projects().len(), 1);
    let current = ws.current().unwrap();
    assert_eq!(current.name, "First Project");
    // The default project is persisted immediately, not just in memory.
    assert!(probe.state.lock().unwrap().contains_key(&current.id));
}

#[tokio::test]
async fn newest_project_becomes_current_on_load() {
    let store = RecordingStore::default();
    let mut older = Project::new("older");
    older.created_at = "2024-01-01T00:00:00+00:00".into();
    let mut newer = Project::new("newer");
    newer.id = format!("{}x", older.id); // ids must differ even in the same millisecond
    newer.created_at = "2025-06-01T00:00:00+00:00".into();
    store.seed(older);
    store.seed(newer.clone());

    let ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();
    assert_eq!(ws.projects().len(), 2);
    assert_eq!(ws.current().unwrap().id, newer.id);
}

#[tokio::test]
async fn deleting_current_project_moves_selection() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let mut ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();
    let first = ws.current_id().unwrap().to_string();
    let second = ws.create_project("second").await.unwrap().id.clone();

    ws.delete_project(&second).await.unwrap();
    assert_eq!(ws.current_id(), Some(first.as_str()));
    assert!(!probe.state.lock().unwrap().contains_key(&second));
}

#[tokio::test]
async fn rename_persists_immediately() {
    let store = RecordingStore::default();
    let probe = store.clone();
    let mut ws = Workspace::open_with(store, Duration::from_secs(3600)).await.unwrap();
    let id = ws.current_id().unwrap().to_string();

    ws.rename_project(&id, "fresh name").await.unwrap();
    let stored = probe.state.lock().unwrap().get(&id).cloned().unwrap();
    assert_eq!(stored.name, "fresh name");
}

#[tokio::test]
async fn duplicate_is_persisted_but_not_selected() {
    let store = RecordingStore::default();
    let mut ws = Workspace::open_with(store, DEBOUNCE).await.unwrap();
    let original = ws.current_id().unwrap().to_string();

    let copy_id = ws.duplicate_project(&original).await.unwrap().id.clone();
    assert_eq!(ws.projects().len(), 2);
    assert_eq!(ws.current_id(), Some(original.as_str()));
    assert_ne!(copy_id, original);
}
