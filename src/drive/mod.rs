//! Remote project store — a folder-per-project tree in the user's cloud
//! drive.
//!
//! Layout: one `IdeaLog` root folder; under it one folder per project plus a
//! reserved `Deleted Projects` trash folder. Each project folder holds the
//! authoritative `<name>_data.json` document and a derived `<name>_분석`
//! spreadsheet regenerated wholesale on every save (see [`sheet`]).
//!
//! Identity is the immutable project id, written into the folder's
//! `appProperties` when the folder is created and resolved id-first on every
//! save; the display name is just a renamable label. Name lookup remains as
//! a fallback for folders that predate the marker. Writes are
//! last-writer-wins — find-or-create is not transactional, and two writers
//! racing on the same project can still produce duplicate folders, exactly
//! as the drive API allows.

pub mod auth;
pub mod sheet;

use anyhow::{bail, Context as _, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::DriveConfig;
use crate::project::export::Backup;
use crate::project::{Project, ProjectStore};
use crate::storage::LocalStore;

pub const ROOT_FOLDER_NAME: &str = "IdeaLog";
pub const TRASH_FOLDER_NAME: &str = "Deleted Projects";
/// Authoritative document filename suffix.
pub const DATA_SUFFIX: &str = "_data.json";
/// Derived spreadsheet filename suffix (Korean "analysis" — kept so drive
/// layouts written by earlier app releases keep working).
pub const SHEET_SUFFIX: &str = "_분석";
/// appProperties key carrying the immutable project id.
pub const ID_PROPERTY: &str = "idealogProjectId";

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SHEET_MIME: &str = "application/vnd.google-apps.spreadsheet";
const MULTIPART_BOUNDARY: &str = "idealog_upload_boundary_7348";

/// HTTP request timeout for every drive/sheets call.
const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub modified_time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

/// Identifiers returned from a successful save.
#[derive(Debug, Clone)]
pub struct SavedProject {
    pub folder_id: String,
    /// `None` when the best-effort spreadsheet pass failed.
    pub sheet_id: Option<String>,
}

pub struct DriveStore {
    http: reqwest::Client,
    cfg: DriveConfig,
    /// Settings backend holding the access token.
    local: LocalStore,
}

impl DriveStore {
    pub fn new(cfg: DriveConfig, local: LocalStore) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(Self { http, cfg, local })
    }

    async fn token(&self) -> Result<String> {
        auth::access_token(&self.local).await
    }

    // ─── Drive primitives ────────────────────────────────────────────────────

    async fn search(&self, token: &str, query: &str, order_by: Option<&str>) -> Result<Vec<DriveFile>> {
        let mut req = self
            .http
            .get(format!("{}/files", self.cfg.api_base))
            .bearer_auth(token)
            .query(&[("q", query), ("fields", "files(id,name,modifiedTime)")]);
        if let Some(order) = order_by {
            req = req.query(&[("orderBy", order)]);
        }
        let list: FileList = req
            .send()
            .await
            .context("drive search failed")?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.files)
    }

    async fn create_folder(
        &self,
        token: &str,
        name: &str,
        parent: Option<&str>,
        project_id: Option<&str>,
    ) -> Result<DriveFile> {
        let mut metadata = json!({ "name": name, "mimeType": FOLDER_MIME });
        if let Some(parent) = parent {
            metadata["parents"] = json!([parent]);
        }
        if let Some(id) = project_id {
            metadata["appProperties"] = json!({ ID_PROPERTY: id });
        }
        let folder: DriveFile = self
            .http
            .post(format!("{}/files", self.cfg.api_base))
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await
            .with_context(|| format!("Failed to create folder '{name}'"))?
            .error_for_status()?
            .json()
            .await?;
        info!(name = %name, id = %folder.id, "drive folder created");
        Ok(folder)
    }

    async fn patch_metadata(&self, token: &str, file_id: &str, metadata: serde_json::Value) -> Result<()> {
        self.http
            .patch(format!("{}/files/{file_id}", self.cfg.api_base))
            .bearer_auth(token)
            .json(&metadata)
            .send()
            .await
            .context("Failed to update file metadata")?
            .error_for_status()?;
        Ok(())
    }

    // ─── Folder resolution ───────────────────────────────────────────────────

    async fn get_or_create_root(&self, token: &str) -> Result<String> {
        let query = format!(
            "name='{ROOT_FOLDER_NAME}' and mimeType='{FOLDER_MIME}' and trashed=false"
        );
        if let Some(found) = self.search(token, &query, None).await?.into_iter().next() {
            return Ok(found.id);
        }
        Ok(self.create_folder(token, ROOT_FOLDER_NAME, None, None).await?.id)
    }

    async fn get_or_create_trash(&self, token: &str, root_id: &str) -> Result<String> {
        let query = format!(
            "name='{TRASH_FOLDER_NAME}' and '{root_id}' in parents and mimeType='{FOLDER_MIME}' and trashed=false"
        );
        if let Some(found) = self.search(token, &query, None).await?.into_iter().next() {
            return Ok(found.id);
        }
        Ok(self
            .create_folder(token, TRASH_FOLDER_NAME, Some(root_id), None)
            .await?
            .id)
    }

    /// Resolve the project's folder id-first, then by display name for
    /// folders created before the id marker existed. Creates the folder
    /// (with marker) when neither finds one.
    async fn get_or_create_project_folder(&self, token: &str, root_id: &str, project: &Project) -> Result<String> {
        let by_id = format!(
            "appProperties has {{ key='{ID_PROPERTY}' and value='{}' }} and '{root_id}' in parents and mimeType='{FOLDER_MIME}' and trashed=false",
            project.id
        );
        if let Some(found) = self.search(token, &by_id, None).await?.into_iter().next() {
            debug!(folder = %found.id, "project folder resolved by id marker");
            return Ok(found.id);
        }

        let by_name = format!(
            "name='{}' and '{root_id}' in parents and mimeType='{FOLDER_MIME}' and trashed=false",
            project.name
        );
        if let Some(found) = self.search(token, &by_name, None).await?.into_iter().next() {
            debug!(folder = %found.id, "project folder resolved by name (legacy)");
            // Adopt it: stamp the marker so renames stop mattering.
            self.patch_metadata(
                token,
                &found.id,
                json!({ "appProperties": { ID_PROPERTY: project.id } }),
            )
            .await?;
            return Ok(found.id);
        }

        Ok(self
            .create_folder(token, &project.name, Some(root_id), Some(&project.id))
            .await?
            .id)
    }

    /// Find a project folder by id marker anywhere under the root.
    async fn find_project_folder(&self, token: &str, root_id: &str, project_id: &str) -> Result<Option<DriveFile>> {
        let query = format!(
            "appProperties has {{ key='{ID_PROPERTY}' and value='{project_id}' }} and '{root_id}' in parents and mimeType='{FOLDER_MIME}' and trashed=false"
        );
        Ok(self.search(token, &query, None).await?.into_iter().next())
    }

    // ─── Document file ───────────────────────────────────────────────────────

    async fn find_data_file(&self, token: &str, folder_id: &str) -> Result<Option<DriveFile>> {
        let query =
            format!("name contains '{DATA_SUFFIX}' and '{folder_id}' in parents and trashed=false");
        Ok(self.search(token, &query, None).await?.into_iter().next())
    }

    async fn save_json_file(&self, token: &str, folder_id: &str, project: &Project) -> Result<()> {
        let file_name = format!("{}{DATA_SUFFIX}", project.name);
        let content = serde_json::to_string_pretty(project)?;

        if let Some(existing) = self.find_data_file(token, folder_id).await? {
            // Keep the filename in step with the project name, then replace
            // the content in place.
            if existing.name != file_name {
                self.patch_metadata(token, &existing.id, json!({ "name": file_name }))
                    .await?;
            }
            self.http
                .patch(format!(
                    "{}/files/{}?uploadType=media",
                    self.cfg.upload_base, existing.id
                ))
                .bearer_auth(token)
                .header(reqwest::header::CONTENT_TYPE, "application/json")
                .body(content)
                .send()
                .await
                .context("Failed to update project document")?
                .error_for_status()?;
        } else {
            let metadata = json!({
                "name": file_name,
                "mimeType": "application/json",
                "parents": [folder_id],
            });
            let body = format!(
                "--{MULTIPART_BOUNDARY}\r\n\
                 Content-Type: application/json; charset=UTF-8\r\n\r\n\
                 {metadata}\r\n\
                 --{MULTIPART_BOUNDARY}\r\n\
                 Content-Type: application/json\r\n\r\n\
                 {content}\r\n\
                 --{MULTIPART_BOUNDARY}--"
            );
            self.http
                .post(format!("{}/files?uploadType=multipart", self.cfg.upload_base))
                .bearer_auth(token)
                .header(
                    reqwest::header::CONTENT_TYPE,
                    format!("multipart/related; boundary={MULTIPART_BOUNDARY}"),
                )
                .body(body)
                .send()
                .await
                .context("Failed to create project document")?
                .error_for_status()?;
        }
        Ok(())
    }

    // ─── Spreadsheet file ────────────────────────────────────────────────────

    async fn find_sheet_file(&self, token: &str, folder_id: &str) -> Result<Option<DriveFile>> {
        let query = format!(
            "'{folder_id}' in parents and mimeType='{SHEET_MIME}' and trashed=false"
        );
        Ok(self.search(token, &query, None).await?.into_iter().next())
    }

    async fn save_sheet(&self, token: &str, folder_id: &str, project: &Project) -> Result<String> {
        let sheet_name = format!("{}{SHEET_SUFFIX}", project.name);

        let sheet_id = match self.find_sheet_file(token, folder_id).await? {
            Some(existing) => {
                if existing.name != sheet_name {
                    self.patch_metadata(token, &existing.id, json!({ "name": sheet_name }))
                        .await?;
                }
                existing.id
            }
            None => {
                let metadata = json!({
                    "name": sheet_name,
                    "mimeType": SHEET_MIME,
                    "parents": [folder_id],
                });
                let created: DriveFile = self
                    .http
                    .post(format!("{}/files", self.cfg.api_base))
                    .bearer_auth(token)
                    .json(&metadata)
                    .send()
                    .await
                    .context("Failed to create spreadsheet")?
                    .error_for_status()?
                    .json()
                    .await?;
                created.id
            }
        };

        sheet::write_sheet(&self.http, &self.cfg.sheets_base, token, &sheet_id, project).await?;
        Ok(sheet_id)
    }

    // ─── Public operations ───────────────────────────────────────────────────

    /// Subfolders of the root, newest first, excluding the trash folder.
    pub async fn list_projects(&self) -> Result<Vec<DriveFile>> {
        let token = self.token().await?;
        let root_id = self.get_or_create_root(&token).await?;
        let query = format!(
            "'{root_id}' in parents and mimeType='{FOLDER_MIME}' and trashed=false and not name='{TRASH_FOLDER_NAME}'"
        );
        self.search(&token, &query, Some("modifiedTime desc")).await
    }

    /// Fetch and parse the JSON document inside a project folder.
    /// `None` when the folder holds no document.
    pub async fn load_project(&self, folder_id: &str) -> Result<Option<Project>> {
        let token = self.token().await?;
        let Some(file) = self.find_data_file(&token, folder_id).await? else {
            return Ok(None);
        };
        let project: Project = self
            .http
            .get(format!("{}/files/{}?alt=media", self.cfg.api_base, file.id))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to load project content")?
            .error_for_status()?
            .json()
            .await?;
        Ok(Some(project))
    }

    /// Write the authoritative document and regenerate the derived
    /// spreadsheet. The spreadsheet pass is best-effort: a failure there is
    /// logged and the save still counts.
    pub async fn save_project(&self, project: &Project) -> Result<SavedProject> {
        let token = self.token().await?;
        let root_id = self.get_or_create_root(&token).await?;
        let folder_id = self
            .get_or_create_project_folder(&token, &root_id, project)
            .await?;

        self.save_json_file(&token, &folder_id, project).await?;

        let sheet_id = match self.save_sheet(&token, &folder_id, project).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(project = %project.name, err = %e, "spreadsheet regeneration failed");
                None
            }
        };

        info!(project = %project.name, folder = %folder_id, "project saved to drive");
        Ok(SavedProject { folder_id, sheet_id })
    }

    /// Rename eagerly: the folder, the JSON document, and the spreadsheet all
    /// pick up the new name in one call, so no stale filenames linger until
    /// the next save.
    pub async fn rename_project(&self, folder_id: &str, new_name: &str) -> Result<()> {
        if new_name.trim().is_empty() {
            bail!("project name is required");
        }
        let token = self.token().await?;
        self.patch_metadata(&token, folder_id, json!({ "name": new_name }))
            .await?;
        if let Some(file) = self.find_data_file(&token, folder_id).await? {
            self.patch_metadata(&token, &file.id, json!({ "name": format!("{new_name}{DATA_SUFFIX}") }))
                .await?;
        }
        if let Some(file) = self.find_sheet_file(&token, folder_id).await? {
            self.patch_metadata(&token, &file.id, json!({ "name": format!("{new_name}{SHEET_SUFFIX}") }))
                .await?;
        }
        info!(folder = %folder_id, name = %new_name, "project renamed");
        Ok(())
    }

    /// Soft delete: move the folder out of the root into the trash folder.
    /// Recovery is only possible through the drive's own UI.
    pub async fn delete_project(&self, folder_id: &str) -> Result<()> {
        let token = self.token().await?;
        let root_id = self.get_or_create_root(&token).await?;
        let trash_id = self.get_or_create_trash(&token, &root_id).await?;
        self.http
            .patch(format!(
                "{}/files/{folder_id}?addParents={trash_id}&removeParents={root_id}",
                self.cfg.api_base
            ))
            .bearer_auth(&token)
            .send()
            .await
            .context("Failed to move folder to trash")?
            .error_for_status()?;
        info!(folder = %folder_id, "project moved to trash");
        Ok(())
    }

    /// Load every project and wrap them in one backup document.
    pub async fn backup_all_projects(&self) -> Result<Backup> {
        let folders = self.list_projects().await?;
        let mut projects = Vec::with_capacity(folders.len());
        for folder in folders {
            if let Some(project) = self.load_project(&folder.id).await? {
                projects.push(project);
            }
        }
        Ok(Backup::new(projects, None))
    }
}

// ─── Store contract ───────────────────────────────────────────────────────────

#[async_trait]
impl ProjectStore for DriveStore {
    async fn put(&self, project: &Project) -> Result<()> {
        self.save_project(project).await.map(|_| ())
    }

    async fn get_all(&self) -> Result<Vec<Project>> {
        let folders = self.list_projects().await?;
        let mut projects = Vec::with_capacity(folders.len());
        for folder in folders {
            if let Some(project) = self.load_project(&folder.id).await? {
                projects.push(project);
            }
        }
        Ok(projects)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let token = self.token().await?;
        let root_id = self.get_or_create_root(&token).await?;
        match self.find_project_folder(&token, &root_id, id).await? {
            Some(folder) => self.delete_project(&folder.id).await,
            // Nothing to delete — same idempotent contract as the local store.
            None => Ok(()),
        }
    }
}
