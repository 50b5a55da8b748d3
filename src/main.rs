use anyhow::{bail, Context as _, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use idealog::ai::client::AiClient;
use idealog::ai::proxy::{self, ProxyState};
use idealog::ai::quota::QuotaTracker;
use idealog::config::AppConfig;
use idealog::drive::{auth, DriveStore};
use idealog::project::export::{self, Backup};
use idealog::project::{Edit, Project};
use idealog::storage::{keys, LocalStore};

#[derive(Parser)]
#[command(
    name = "idealog",
    about = "IdeaLog — idea-validation journal: local/drive persistence, autosave, AI proxy",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// AI proxy server port
    #[arg(long, env = "IDEALOG_PORT")]
    port: Option<u16>,

    /// Data directory for the local database and config.toml
    #[arg(long, env = "IDEALOG_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "IDEALOG_LOG")]
    log: Option<String>,

    /// Bind address for the proxy server (default: 127.0.0.1)
    #[arg(long, env = "IDEALOG_BIND")]
    bind_address: Option<String>,

    /// Write logs to this file path (rotated daily). Optional.
    #[arg(long, env = "IDEALOG_LOG_FILE")]
    log_file: Option<PathBuf>,

    /// Operate on the cloud-drive store instead of the local database.
    ///
    /// Requires a stored access token (see `idealog login`). Project ids
    /// become drive folder ids in this mode.
    #[arg(long, global = true)]
    remote: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Start the AI proxy server (default when no subcommand given).
    ///
    /// Examples:
    ///   idealog serve
    ///   idealog
    Serve,
    /// Store a cloud-drive access token obtained from the OAuth flow.
    ///
    /// The token is kept in the local database together with its expiry
    /// (one hour unless --ttl-secs says otherwise) and used by every
    /// --remote operation until it lapses.
    Login {
        /// OAuth access token for the drive API
        #[arg(long)]
        token: String,
        /// Token lifetime in seconds (default: 3600)
        #[arg(long)]
        ttl_secs: Option<i64>,
    },
    /// Forget the stored access token.
    Logout,
    /// Manage projects in the active store.
    ///
    /// Examples:
    ///   idealog project list
    ///   idealog project create "Morning commute"
    ///   idealog project export 1700000000000 --output commute.json
    ///   idealog project list --remote
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Write a backup of every project to a JSON file.
    Backup {
        /// Output path (default: ./idealog-backup-<date>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run the AI pattern analysis on a project's observation log.
    ///
    /// Needs at least 3 observations in the chosen scope, one of today's
    /// AI uses, and a running proxy (see `idealog serve` / the [ai] config).
    /// The three resulting patterns replace the project's pattern list.
    Analyze {
        /// Project id (folder id with --remote)
        id: String,
        /// Restrict the analysis to one category (default: the whole log)
        #[arg(long)]
        category: Option<String>,
    },
    /// Generate an MVP test plan for a project's selected idea.
    ///
    /// Needs a selected idea with at least one recorded interview, one of
    /// today's AI uses, and a running proxy.
    Mvp {
        /// Project id (folder id with --remote)
        id: String,
    },
    /// Show today's remaining AI analysis uses.
    Quota,
    /// Read or change user settings.
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// List every project in the store.
    List,
    /// Create a fresh project.
    Create { name: String },
    /// Rename a project. Remote mode renames the folder, document, and
    /// spreadsheet together.
    Rename { id: String, name: String },
    /// Deep-copy a project under a new identity.
    Duplicate { id: String },
    /// Delete a project. Local mode removes the row; remote mode moves the
    /// folder into the trash folder (recoverable via the drive UI only).
    Delete { id: String },
    /// Write a single-project export document.
    Export {
        id: String,
        /// Output path (default: ./<name>-<date>.json)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Recreate a project from an export document.
    Import { file: PathBuf },
}

#[derive(Subcommand)]
enum SettingsAction {
    /// Show the stored settings.
    Show,
    /// Set the user name recorded in backups.
    SetName { name: String },
    /// Turn the once-per-day automatic backup on or off.
    AutoBackup {
        #[arg(value_parser = ["on", "off"])]
        state: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = AppConfig::new(
        args.port,
        args.data_dir.clone(),
        args.log.clone(),
        args.bind_address.clone(),
    );
    let _file_guard = setup_logging(&config.log, args.log_file.as_deref(), &config.log_format);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => run_serve(config).await,
        Command::Login { token, ttl_secs } => {
            let store = LocalStore::open(&config.data_dir).await?;
            auth::save_token(&store, &token, ttl_secs).await?;
            println!("Logged in. Remote operations are available until the token expires.");
            Ok(())
        }
        Command::Logout => {
            let store = LocalStore::open(&config.data_dir).await?;
            auth::clear_token(&store).await?;
            println!("Logged out.");
            Ok(())
        }
        Command::Project { action } => run_project(action, config, args.remote).await,
        Command::Analyze { id, category } => run_analyze(config, args.remote, id, category).await,
        Command::Mvp { id } => run_mvp(config, args.remote, id).await,
        Command::Backup { output } => run_backup(config, args.remote, output).await,
        Command::Quota => {
            let store = LocalStore::open(&config.data_dir).await?;
            let quota = QuotaTracker::new(store, config.ai.daily_limit);
            println!(
                "{} of {} AI analyses left today",
                quota.remaining().await?,
                quota.limit()
            );
            Ok(())
        }
        Command::Settings { action } => run_settings(action, config).await,
    }
}

// ─── Serve ────────────────────────────────────────────────────────────────────

async fn run_serve(config: AppConfig) -> Result<()> {
    let store = LocalStore::open(&config.data_dir).await?;
    maybe_auto_backup(&config, &store).await;

    let state = Arc::new(ProxyState::new(config.ai.clone(), config.ai_api_key.clone()));
    proxy::serve(state, &config.bind_address, config.port).await
}

/// Once per day, when the auto-backup setting is on, drop a full backup file
/// into the data directory. Failures are logged and skipped — backups must
/// never block startup.
async fn maybe_auto_backup(config: &AppConfig, store: &LocalStore) {
    let enabled = matches!(
        store.get_setting(keys::AUTO_BACKUP).await,
        Ok(Some(v)) if v == "true"
    );
    if !enabled {
        return;
    }
    let today = Local::now().date_naive().to_string();
    if matches!(store.get_setting(keys::LAST_AUTO_BACKUP).await, Ok(Some(d)) if d == today) {
        return;
    }
    let result: Result<PathBuf> = async {
        let projects = store.try_get_all().await?;
        if projects.is_empty() {
            bail!("nothing to back up");
        }
        let user_name = store.get_setting(keys::USER_NAME).await?;
        let json = export::export_backup(projects, user_name)?;
        let path = config.data_dir.join(export::backup_filename());
        tokio::fs::write(&path, json).await?;
        store.set_setting(keys::LAST_AUTO_BACKUP, &today).await?;
        Ok(path)
    }
    .await;
    match result {
        Ok(path) => info!(path = %path.display(), "automatic backup written"),
        Err(e) => tracing::warn!(err = %e, "automatic backup skipped"),
    }
}

// ─── Project commands ─────────────────────────────────────────────────────────

async fn run_project(action: ProjectAction, config: AppConfig, remote: bool) -> Result<()> {
    let store = LocalStore::open(&config.data_dir).await?;
    if remote {
        let drive = DriveStore::new(config.drive.clone(), store)?;
        run_project_remote(action, &drive).await
    } else {
        run_project_local(action, &store).await
    }
}

async fn run_project_local(action: ProjectAction, store: &LocalStore) -> Result<()> {
    match action {
        ProjectAction::List => {
            let mut projects = store.try_get_all().await?;
            projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if projects.is_empty() {
                println!("No projects yet. Create one with: idealog project create <name>");
            }
            for p in projects {
                println!("{}  {}  (updated {})", p.id, p.name, p.updated_at);
            }
        }
        ProjectAction::Create { name } => {
            if name.trim().is_empty() {
                bail!("project name is required");
            }
            let project = Project::new(name.trim());
            store.try_put(&project).await?;
            println!("Created project {} ({})", project.name, project.id);
        }
        ProjectAction::Rename { id, name } => {
            if name.trim().is_empty() {
                bail!("project name is required");
            }
            let mut project = store
                .try_get(&id)
                .await?
                .with_context(|| format!("no project with id {id}"))?;
            project.name = name.trim().to_string();
            project.touch();
            store.try_put(&project).await?;
            println!("Renamed to {}", project.name);
        }
        ProjectAction::Duplicate { id } => {
            let project = store
                .try_get(&id)
                .await?
                .with_context(|| format!("no project with id {id}"))?;
            let copy = project.duplicate();
            store.try_put(&copy).await?;
            println!("Created {} ({})", copy.name, copy.id);
        }
        ProjectAction::Delete { id } => {
            store.try_delete(&id).await?;
            println!("Deleted {id}");
        }
        ProjectAction::Export { id, output } => {
            let project = store
                .try_get(&id)
                .await?
                .with_context(|| format!("no project with id {id}"))?;
            let path =
                output.unwrap_or_else(|| PathBuf::from(export::export_filename(&project.name)));
            tokio::fs::write(&path, export::export_project(&project)?).await?;
            println!("Exported to {}", path.display());
        }
        ProjectAction::Import { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let project = export::import_project(&json)?;
            store.try_put(&project).await?;
            println!("Imported {} ({})", project.name, project.id);
        }
    }
    Ok(())
}

async fn run_project_remote(action: ProjectAction, drive: &DriveStore) -> Result<()> {
    match action {
        ProjectAction::List => {
            let folders = drive.list_projects().await?;
            if folders.is_empty() {
                println!("No projects in the drive folder yet.");
            }
            for f in folders {
                let modified = f.modified_time.as_deref().unwrap_or("-");
                println!("{}  {}  (modified {modified})", f.id, f.name);
            }
        }
        ProjectAction::Create { name } => {
            if name.trim().is_empty() {
                bail!("project name is required");
            }
            let project = Project::new(name.trim());
            let saved = drive.save_project(&project).await?;
            println!("Created {} in folder {}", project.name, saved.folder_id);
        }
        ProjectAction::Rename { id, name } => {
            drive.rename_project(&id, name.trim()).await?;
            println!("Renamed folder {id} to {}", name.trim());
        }
        ProjectAction::Duplicate { id } => {
            let project = drive
                .load_project(&id)
                .await?
                .with_context(|| format!("folder {id} holds no project document"))?;
            let copy = project.duplicate();
            let saved = drive.save_project(&copy).await?;
            println!("Created {} in folder {}", copy.name, saved.folder_id);
        }
        ProjectAction::Delete { id } => {
            drive.delete_project(&id).await?;
            println!("Moved folder {id} to the trash folder");
        }
        ProjectAction::Export { id, output } => {
            let project = drive
                .load_project(&id)
                .await?
                .with_context(|| format!("folder {id} holds no project document"))?;
            let path =
                output.unwrap_or_else(|| PathBuf::from(export::export_filename(&project.name)));
            tokio::fs::write(&path, export::export_project(&project)?).await?;
            println!("Exported to {}", path.display());
        }
        ProjectAction::Import { file } => {
            let json = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("cannot read {}", file.display()))?;
            let project = export::import_project(&json)?;
            let saved = drive.save_project(&project).await?;
            println!("Imported {} into folder {}", project.name, saved.folder_id);
        }
    }
    Ok(())
}

// ─── AI flows ─────────────────────────────────────────────────────────────────

/// Whichever store `--remote` selected, behind one load/save surface.
enum StoreHandle {
    Local(LocalStore),
    Remote(DriveStore),
}

impl StoreHandle {
    async fn open(config: &AppConfig, remote: bool) -> Result<(Self, AiClient)> {
        let store = LocalStore::open(&config.data_dir).await?;
        let quota = QuotaTracker::new(store.clone(), config.ai.daily_limit);
        let client = AiClient::new(config.proxy_url(), quota);
        let handle = if remote {
            Self::Remote(DriveStore::new(config.drive.clone(), store)?)
        } else {
            Self::Local(store)
        };
        Ok((handle, client))
    }

    async fn load(&self, id: &str) -> Result<Project> {
        match self {
            Self::Local(store) => store
                .try_get(id)
                .await?
                .with_context(|| format!("no project with id {id}")),
            Self::Remote(drive) => drive
                .load_project(id)
                .await?
                .with_context(|| format!("folder {id} holds no project document")),
        }
    }

    async fn save(&self, project: &Project) -> Result<()> {
        match self {
            Self::Local(store) => store.try_put(project).await,
            Self::Remote(drive) => drive.save_project(project).await.map(|_| ()),
        }
    }
}

async fn run_analyze(
    config: AppConfig,
    remote: bool,
    id: String,
    category: Option<String>,
) -> Result<()> {
    let (store, client) = StoreHandle::open(&config, remote).await?;
    let mut project = store.load(&id).await?;

    let patterns = client
        .analyze_patterns(&project.data, category.as_deref())
        .await?;
    for p in &patterns {
        println!("{} (x{})", p.name, p.count);
        if let Some(summary) = &p.summary {
            println!("    {summary}");
        }
    }
    project.apply(Edit::ApplyAnalysis { patterns })?;
    store.save(&project).await
}

async fn run_mvp(config: AppConfig, remote: bool, id: String) -> Result<()> {
    let (store, client) = StoreHandle::open(&config, remote).await?;
    let mut project = store.load(&id).await?;

    let plan = client.generate_mvp_plan(&project.data).await?;
    println!("Service name ideas: {}", plan.service_names.join(", "));
    println!("Core message:       {}", plan.core_message);
    println!("Delivery method:    {}", plan.delivery_method);
    println!("Test method:        {}", plan.test_plan.method);
    println!("Timeline:           {}", plan.timeline);
    println!("Budget:             {}", plan.budget);
    project.apply(Edit::SetMvpPlan { plan })?;
    store.save(&project).await
}

// ─── Backup ───────────────────────────────────────────────────────────────────

async fn run_backup(config: AppConfig, remote: bool, output: Option<PathBuf>) -> Result<()> {
    let store = LocalStore::open(&config.data_dir).await?;
    let backup: Backup = if remote {
        let drive = DriveStore::new(config.drive.clone(), store)?;
        drive.backup_all_projects().await?
    } else {
        let projects = store.try_get_all().await?;
        if projects.is_empty() {
            bail!("no projects to back up");
        }
        let user_name = store.get_setting(keys::USER_NAME).await?;
        Backup::new(projects, user_name)
    };

    let path = output.unwrap_or_else(|| PathBuf::from(export::backup_filename()));
    tokio::fs::write(&path, serde_json::to_string_pretty(&backup)?).await?;
    println!(
        "Backed up {} project(s) to {}",
        backup.projects.len(),
        path.display()
    );
    Ok(())
}

// ─── Settings ─────────────────────────────────────────────────────────────────

async fn run_settings(action: SettingsAction, config: AppConfig) -> Result<()> {
    let store = LocalStore::open(&config.data_dir).await?;
    match action {
        SettingsAction::Show => {
            let name = store.get_setting(keys::USER_NAME).await?;
            let auto = store.get_setting(keys::AUTO_BACKUP).await?;
            let bytes = store.document_bytes().await?;
            println!("user name:   {}", name.as_deref().unwrap_or("(unset)"));
            println!("auto backup: {}", auto.as_deref().unwrap_or("off"));
            println!("logged in:   {}", auth::is_logged_in(&store).await);
            println!("stored data: {}", human_size(bytes));
        }
        SettingsAction::SetName { name } => {
            if name.trim().is_empty() {
                bail!("name is required");
            }
            store.set_setting(keys::USER_NAME, name.trim()).await?;
            println!("User name set to {}", name.trim());
        }
        SettingsAction::AutoBackup { state } => {
            let on = state == "on";
            store
                .set_setting(keys::AUTO_BACKUP, if on { "true" } else { "false" })
                .await?;
            println!("Automatic backup {}", if on { "enabled" } else { "disabled" });
        }
    }
    Ok(())
}

fn human_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.2} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.2} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

// ─── Logging ──────────────────────────────────────────────────────────────────

/// If the log directory cannot be created, falls back to stdout-only logging
/// with a warning — never panics.
fn setup_logging(
    log_level: &str,
    log_file: Option<&std::path::Path>,
    log_format: &str,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let use_json = log_format == "json";

    if let Some(path) = log_file {
        let dir = path.parent().unwrap_or_else(|| std::path::Path::new("."));
        let filename = path
            .file_name()
            .unwrap_or_else(|| std::ffi::OsStr::new("idealog.log"));

        // Ensure the directory exists before tracing-appender tries to open it.
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!(
                "warn: could not create log directory '{}': {e} — falling back to stdout",
                dir.display()
            );
            if use_json {
                tracing_subscriber::fmt().json().with_env_filter(log_level).init();
            } else {
                tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
            }
            return None;
        }

        let appender = tracing_appender::rolling::daily(dir, filename);
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);

        if use_json {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().json())
                .with(fmt::layer().json().with_writer(non_blocking))
                .init();
        } else {
            tracing_subscriber::registry()
                .with(EnvFilter::new(log_level))
                .with(fmt::layer().compact())
                .with(fmt::layer().with_writer(non_blocking))
                .init();
        }

        Some(guard)
    } else if use_json {
        tracing_subscriber::fmt().json().with_env_filter(log_level).init();
        None
    } else {
        tracing_subscriber::fmt().with_env_filter(log_level).compact().init();
        None
    }
}
