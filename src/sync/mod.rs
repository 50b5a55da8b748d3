// SPDX-License-Identifier: MIT
//! Workspace state and the autosave controller.
//!
//! [`Workspace`] owns the in-memory project list and the current selection,
//! and bridges edits to a [`ProjectStore`] without blocking interaction:
//! every edit snapshots the current project and (re)arms a fixed-delay
//! debounce timer; when it fires, one write with the latest snapshot goes
//! out. Switching projects flushes the outgoing project first so edits made
//! just before the switch are never lost. Write failures are logged, not
//! retried, and never surfaced as blocking errors — autosave is
//! fire-and-forget.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::project::{Edit, EditError, Project, ProjectStore};

/// Debounce delay between the last edit and the write it triggers.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(1000);

/// Name given to the project synthesized on first run.
const FIRST_PROJECT_NAME: &str = "First Project";

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("no project is open")]
    NoCurrentProject,
    #[error("no project with id {0}")]
    NotFound(String),
    #[error(transparent)]
    Edit(#[from] EditError),
}

// ─── Autosave task ────────────────────────────────────────────────────────────

enum Msg {
    /// Latest snapshot of the project to persist; replaces any pending one.
    Save(Project),
    /// Write whatever is pending now and acknowledge.
    Flush(oneshot::Sender<()>),
}

/// Handle to the background autosave task. Dropping it flushes any pending
/// snapshot before the task exits.
struct Autosave {
    tx: mpsc::UnboundedSender<Msg>,
}

impl Autosave {
    fn spawn<S: ProjectStore + 'static>(store: Arc<S>, debounce: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
        tokio::spawn(async move {
            let mut pending: Option<Project> = None;
            let mut deadline: Option<Instant> = None;
            loop {
                tokio::select! {
                    msg = rx.recv() => match msg {
                        Some(Msg::Save(project)) => {
                            // Cancel-and-restart: a burst of edits inside the
                            // window produces exactly one write.
                            pending = Some(project);
                            deadline = Some(Instant::now() + debounce);
                        }
                        Some(Msg::Flush(ack)) => {
                            if let Some(project) = pending.take() {
                                write(store.as_ref(), &project).await;
                            }
                            deadline = None;
                            let _ = ack.send(());
                        }
                        None => {
                            if let Some(project) = pending.take() {
                                write(store.as_ref(), &project).await;
                            }
                            break;
                        }
                    },
                    _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)),
                        if deadline.is_some() =>
                    {
                        if let Some(project) = pending.take() {
                            write(store.as_ref(), &project).await;
                        }
                        deadline = None;
                    }
                }
            }
        });
        Self { tx }
    }

    fn schedule(&self, project: Project) {
        let _ = self.tx.send(Msg::Save(project));
    }

    async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Msg::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }
}

async fn write<S: ProjectStore + ?Sized>(store: &S, project: &Project) {
    debug!(id = %project.id, name = %project.name, "autosave write");
    if let Err(e) = store.put(project).await {
        error!(id = %project.id, err = %e, "autosave write failed");
    }
}

// ─── Workspace ────────────────────────────────────────────────────────────────

pub struct Workspace<S: ProjectStore + 'static> {
    store: Arc<S>,
    autosave: Autosave,
    projects: Vec<Project>,
    current_id: Option<String>,
}

impl<S: ProjectStore + 'static> Workspace<S> {
    /// Load every project from the store. With none stored, a default first
    /// project is synthesized and persisted; otherwise the most-recently
    /// created one becomes current.
    pub async fn open(store: S) -> anyhow::Result<Self> {
        Self::open_with(store, DEFAULT_DEBOUNCE).await
    }

    pub async fn open_with(store: S, debounce: Duration) -> anyhow::Result<Self> {
        let store = Arc::new(store);
        let autosave = Autosave::spawn(store.clone(), debounce);
        let mut ws = Self {
            store,
            autosave,
            projects: Vec::new(),
            current_id: None,
        };

        ws.projects = ws.store.get_all().await?;
        if ws.projects.is_empty() {
            let project = Project::new(FIRST_PROJECT_NAME);
            info!(name = FIRST_PROJECT_NAME, "no stored projects — creating default");
            ws.store.put(&project).await?;
            ws.current_id = Some(project.id.clone());
            ws.projects.push(project);
        } else {
            let newest = ws
                .projects
                .iter()
                .max_by(|a, b| a.created_at.cmp(&b.created_at))
                .map(|p| p.id.clone());
            ws.current_id = newest;
        }
        Ok(ws)
    }

    pub fn projects(&self) -> &[Project] {
        &self.projects
    }

    pub fn current(&self) -> Option<&Project> {
        let id = self.current_id.as_deref()?;
        self.projects.iter().find(|p| p.id == id)
    }

    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut Project, WorkspaceError> {
        self.projects
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| WorkspaceError::NotFound(id.to_string()))
    }

    /// Apply one edit to the current project and arm the autosave timer.
    pub fn edit(&mut self, edit: Edit) -> Result<(), WorkspaceError> {
        let id = self
            .current_id
            .clone()
            .ok_or(WorkspaceError::NoCurrentProject)?;
        let project = self.find_mut(&id)?;
        project.apply(edit)?;
        let snapshot = project.clone();
        self.autosave.schedule(snapshot);
        Ok(())
    }

    /// Write any pending autosave snapshot now.
    pub async fn flush(&self) {
        self.autosave.flush().await;
    }

    /// Make another project current, flushing the outgoing one first.
    pub async fn switch_project(&mut self, id: &str) -> Result<(), WorkspaceError> {
        if !self.projects.iter().any(|p| p.id == id) {
            return Err(WorkspaceError::NotFound(id.to_string()));
        }
        self.flush().await;
        self.current_id = Some(id.to_string());
        Ok(())
    }

    /// Create a project, persist it immediately, and make it current.
    pub async fn create_project(&mut self, name: &str) -> Result<&Project, WorkspaceError> {
        if name.trim().is_empty() {
            return Err(EditError::EmptyInput("project name").into());
        }
        self.flush().await;
        let project = Project::new(name.trim());
        let _ = self.store.put(&project).await;
        self.current_id = Some(project.id.clone());
        self.projects.push(project);
        Ok(self.projects.last().expect("just pushed"))
    }

    /// Deep-copy a project under a new identity; the copy is persisted
    /// immediately but does not become current.
    pub async fn duplicate_project(&mut self, id: &str) -> Result<&Project, WorkspaceError> {
        let copy = self.find_mut(id)?.duplicate();
        let _ = self.store.put(&copy).await;
        self.projects.push(copy);
        Ok(self.projects.last().expect("just pushed"))
    }

    /// Rename and persist right away — renames bypass the debounce so a
    /// rename of a non-current project cannot be displaced by later edits.
    pub async fn rename_project(&mut self, id: &str, new_name: &str) -> Result<(), WorkspaceError> {
        if new_name.trim().is_empty() {
            return Err(EditError::EmptyInput("project name").into());
        }
        let project = self.find_mut(id)?;
        project.name = new_name.trim().to_string();
        project.touch();
        let snapshot = project.clone();
        let _ = self.store.put(&snapshot).await;
        Ok(())
    }

    /// Remove a project. When the current one goes, the first remaining
    /// project (if any) becomes current.
    pub async fn delete_project(&mut self, id: &str) -> Result<(), WorkspaceError> {
        if !self.projects.iter().any(|p| p.id == id) {
            return Err(WorkspaceError::NotFound(id.to_string()));
        }
        // Drain any pending snapshot first so a debounced write cannot land
        // after the delete and resurrect the project.
        self.flush().await;
        let _ = self.store.delete(id).await;
        self.projects.retain(|p| p.id != id);
        if self.current_id.as_deref() == Some(id) {
            self.current_id = self.projects.first().map(|p| p.id.clone());
        }
        Ok(())
    }

    /// Import an exported document as a new current project.
    pub async fn import_project(&mut self, json: &str) -> anyhow::Result<&Project> {
        let project = crate::project::export::import_project(json)?;
        let _ = self.store.put(&project).await;
        self.current_id = Some(project.id.clone());
        self.projects.push(project);
        Ok(self.projects.last().expect("just pushed"))
    }
}
