//! The seam between the sync controller and a persistence backend.

use anyhow::Result;
use async_trait::async_trait;

use super::model::Project;

/// A place projects persist to. Implemented by the local SQLite adapter and
/// the cloud-drive adapter; the sync controller only ever talks to this.
///
/// Both implementations are last-writer-wins: `put` replaces whatever was
/// stored under the project's id, with no conflict detection.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Insert-or-replace by project id.
    async fn put(&self, project: &Project) -> Result<()>;

    /// Every stored project. Order is not guaranteed; callers that need the
    /// newest pick it themselves.
    async fn get_all(&self) -> Result<Vec<Project>>;

    /// Remove by id. Deleting an id that is not present is not an error.
    async fn delete(&self, id: &str) -> Result<()>;
}
