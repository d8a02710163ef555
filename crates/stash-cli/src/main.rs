//! Session Stash CLI
//!
//! The `stash` command drives the artifact store and memory index of a
//! configured backend.
//!
//! ## Commands
//!
//! - `artifact save|load|list|versions`: versioned artifacts of one session
//! - `memory ingest|search`: cross-session memory of one user
//!
//! Identity comes from `--tenant`, `--user` and `--session` (or
//! `STASH_TENANT`, `STASH_USER`, `STASH_SESSION`).

use anyhow::{bail, Context, Result};
use chrono::SecondsFormat;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use stash_core::{BackendKind, SessionStores, StoreConfig, Stores, DEFAULT_DATA_DIR};
use stash_state::{IdentityKey, MemoryEntry, Part, SessionEvent};
use std::path::{Path, PathBuf};
use tracing::{debug, Level};

#[derive(Parser)]
#[command(name = "stash")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Versioned session artifacts and cross-session memory", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Print command results as JSON
    #[arg(long, global = true)]
    json_output: bool,

    #[command(flatten)]
    store: StoreArgs,

    #[command(flatten)]
    identity: IdentityArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Storage backend: memory, fs or surreal
    #[arg(long, env = "STASH_BACKEND", default_value = "fs", global = true)]
    backend: BackendKind,

    /// Root directory for fs and local surreal data
    #[arg(long, env = "STASH_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    data_dir: PathBuf,

    /// Explicit SurrealDB endpoint (mem://, surrealkv://path, ws://host)
    #[arg(long, env = "SURREALDB_URL", global = true)]
    surreal_url: Option<String>,
}

impl StoreArgs {
    fn config(&self) -> StoreConfig {
        let config = StoreConfig::new(self.backend).with_data_dir(&self.data_dir);
        match &self.surreal_url {
            Some(url) if !url.trim().is_empty() => config.with_surreal_url(url.clone()),
            _ => config,
        }
    }
}

#[derive(Args)]
struct IdentityArgs {
    /// Tenant (application) the session belongs to
    #[arg(long, env = "STASH_TENANT", global = true)]
    tenant: Option<String>,

    /// User owning the session
    #[arg(long, env = "STASH_USER", global = true)]
    user: Option<String>,

    /// Session identifier
    #[arg(long, env = "STASH_SESSION", global = true)]
    session: Option<String>,
}

impl IdentityArgs {
    fn key(&self) -> Result<IdentityKey> {
        let tenant = self
            .tenant
            .as_deref()
            .context("missing --tenant (or STASH_TENANT)")?;
        let user = self
            .user
            .as_deref()
            .context("missing --user (or STASH_USER)")?;
        let session = self
            .session
            .as_deref()
            .context("missing --session (or STASH_SESSION)")?;
        IdentityKey::new(tenant, user, session).context("invalid identity")
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Versioned artifacts of one session
    Artifact {
        #[command(subcommand)]
        action: ArtifactAction,
    },

    /// Cross-session memory of one user
    Memory {
        #[command(subcommand)]
        action: MemoryAction,
    },
}

#[derive(Subcommand)]
enum ArtifactAction {
    /// Save a new version of an artifact
    Save {
        /// Artifact name
        name: String,

        #[command(flatten)]
        source: PartSource,

        /// MIME type for --file
        #[arg(long, default_value = "application/octet-stream")]
        mime_type: String,
    },

    /// Load an artifact (latest version unless --version is given)
    Load {
        /// Artifact name
        name: String,

        /// Version to load
        #[arg(long)]
        version: Option<u64>,

        /// Write the payload to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List artifact names in the session
    List,

    /// List the versions of one artifact
    Versions {
        /// Artifact name
        name: String,
    },
}

/// Where the payload of `artifact save` comes from. Exactly one is required.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct PartSource {
    /// Store this string as a text part
    #[arg(long)]
    text: Option<String>,

    /// Store the bytes of this file as inline data
    #[arg(long)]
    file: Option<PathBuf>,

    /// Store a part given as JSON (e.g. a function call)
    #[arg(long)]
    part_json: Option<PathBuf>,
}

impl PartSource {
    fn into_part(self, mime_type: String) -> Result<Part> {
        if let Some(text) = self.text {
            return Ok(Part::text(text));
        }
        if let Some(path) = self.file {
            let data = std::fs::read(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            return Ok(Part::inline_data(mime_type, data));
        }
        if let Some(path) = self.part_json {
            return read_json_file(&path);
        }
        bail!("one of --text, --file or --part-json is required")
    }
}

#[derive(Subcommand)]
enum MemoryAction {
    /// Ingest a JSON array of session events into the user's memory
    Ingest {
        /// Path to the events file
        events: PathBuf,
    },

    /// Search the user's memory (matches any word, case-insensitive)
    Search {
        /// Query text
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::WARN
    };
    stash_core::init_tracing(cli.json, level);

    let key = cli.identity.key()?;
    let stores = Stores::open(&cli.store.config())
        .await
        .with_context(|| format!("Failed to open {} backend", cli.store.backend))?;
    let session = stores.session(key);
    let json = cli.json_output;

    match cli.command {
        Commands::Artifact { action } => match action {
            ArtifactAction::Save {
                name,
                source,
                mime_type,
            } => cmd_artifact_save(&session, &name, source.into_part(mime_type)?, json).await,
            ArtifactAction::Load {
                name,
                version,
                output,
            } => cmd_artifact_load(&session, &name, version, output.as_deref(), json).await,
            ArtifactAction::List => cmd_artifact_list(&session, json).await,
            ArtifactAction::Versions { name } => {
                cmd_artifact_versions(&session, &name, json).await
            }
        },
        Commands::Memory { action } => match action {
            MemoryAction::Ingest { events } => cmd_memory_ingest(&session, &events, json).await,
            MemoryAction::Search { query } => cmd_memory_search(&session, &query, json).await,
        },
    }
}

#[derive(Serialize)]
struct SavedOutput<'a> {
    name: &'a str,
    version: u64,
}

#[derive(Serialize)]
struct VersionsOutput<'a> {
    name: &'a str,
    versions: Vec<u64>,
}

#[derive(Serialize)]
struct IngestOutput {
    received: usize,
    created: usize,
}

/// Save a new artifact version
async fn cmd_artifact_save(
    session: &SessionStores,
    name: &str,
    part: Part,
    json: bool,
) -> Result<()> {
    let version = session
        .artifacts()
        .save(name, part)
        .await
        .with_context(|| format!("Failed to save artifact {name}"))?;

    if json {
        print_json(&SavedOutput { name, version })?;
    } else {
        println!("Saved {name} as version {version}");
    }
    Ok(())
}

/// Load an artifact version, to stdout or a file
async fn cmd_artifact_load(
    session: &SessionStores,
    name: &str,
    version: Option<u64>,
    output: Option<&Path>,
    json: bool,
) -> Result<()> {
    let artifacts = session.artifacts();
    let part = match version {
        Some(v) => artifacts.load_version(name, v).await,
        None => artifacts.load(name).await,
    }
    .with_context(|| match version {
        Some(v) => format!("Failed to load artifact {name} version {v}"),
        None => format!("Failed to load artifact {name}"),
    })?;

    if let Some(path) = output {
        std::fs::write(path, part_bytes(&part)?)
            .with_context(|| format!("Failed to write to {}", path.display()))?;
        debug!(path = %path.display(), kind = part.kind(), "artifact written");
        if !json {
            println!("Wrote {name} to {}", path.display());
        }
        return Ok(());
    }

    if json {
        return print_json(&part);
    }
    match &part {
        Part::Text { text } => println!("{text}"),
        Part::InlineData { mime_type, data } => bail!(
            "{name} holds {} bytes of {mime_type}; use --output or --json-output",
            data.len()
        ),
        Part::FunctionCall { .. } | Part::FunctionResponse { .. } => print_json(&part)?,
    }
    Ok(())
}

/// List artifact names
async fn cmd_artifact_list(session: &SessionStores, json: bool) -> Result<()> {
    let names = session
        .artifacts()
        .list()
        .await
        .context("Failed to list artifacts")?;

    if json {
        return print_json(&names);
    }
    if names.is_empty() {
        println!("No artifacts in session {}", session.key());
    }
    for name in names {
        println!("{name}");
    }
    Ok(())
}

/// List the versions of one artifact
async fn cmd_artifact_versions(session: &SessionStores, name: &str, json: bool) -> Result<()> {
    let versions = session
        .artifacts()
        .versions(name)
        .await
        .with_context(|| format!("Failed to list versions of {name}"))?;

    if json {
        return print_json(&VersionsOutput { name, versions });
    }
    if versions.is_empty() {
        println!("No versions of {name}");
    }
    for v in versions {
        println!("{v}");
    }
    Ok(())
}

/// Ingest session events from a JSON file
async fn cmd_memory_ingest(session: &SessionStores, path: &Path, json: bool) -> Result<()> {
    let events: Vec<SessionEvent> = read_json_file(path)?;
    let created = session
        .memory()
        .add_session(&events)
        .await
        .context("Failed to ingest session events")?;

    let out = IngestOutput {
        received: events.len(),
        created,
    };
    if json {
        print_json(&out)?;
    } else {
        println!(
            "Ingested {} of {} events into memory of {}/{}",
            out.created,
            out.received,
            session.key().tenant(),
            session.key().user()
        );
    }
    Ok(())
}

/// Search the user's memory
async fn cmd_memory_search(session: &SessionStores, query: &str, json: bool) -> Result<()> {
    let hits = session
        .memory()
        .search(query)
        .await
        .context("Failed to search memory")?;

    if json {
        return print_json(&hits);
    }
    if hits.is_empty() {
        println!("No memories match {query:?}");
    }
    for entry in &hits {
        println!("{}", render_entry(entry));
    }
    Ok(())
}

fn render_entry(entry: &MemoryEntry) -> String {
    format!(
        "[{}] {}: {}",
        entry.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
        entry.author,
        entry.content.text()
    )
}

/// Raw bytes written by `artifact load --output`.
fn part_bytes(part: &Part) -> Result<Vec<u8>> {
    Ok(match part {
        Part::Text { text } => text.as_bytes().to_vec(),
        Part::InlineData { data, .. } => data.clone(),
        Part::FunctionCall { .. } | Part::FunctionResponse { .. } => {
            serde_json::to_vec_pretty(part)?
        }
    })
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let data =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_slice(&data).with_context(|| format!("Invalid JSON in {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use stash_state::{Content, Role};

    fn session(stores: &Stores) -> SessionStores {
        stores.session(IdentityKey::new("cli-app", "alice", "s1").unwrap())
    }

    fn identity(tenant: Option<&str>, user: Option<&str>, session: Option<&str>) -> IdentityArgs {
        IdentityArgs {
            tenant: tenant.map(String::from),
            user: user.map(String::from),
            session: session.map(String::from),
        }
    }

    #[test]
    fn cli_parses_artifact_save_with_identity() {
        let cli = Cli::try_parse_from([
            "stash",
            "--backend",
            "memory",
            "--tenant",
            "app",
            "--user",
            "u",
            "--session",
            "s",
            "artifact",
            "save",
            "notes.md",
            "--text",
            "hello",
        ])
        .unwrap();
        assert_eq!(cli.store.backend, BackendKind::Memory);
        assert_eq!(cli.identity.key().unwrap().to_string(), "app/u/s");
        assert!(matches!(
            cli.command,
            Commands::Artifact {
                action: ArtifactAction::Save { ref name, .. }
            } if name == "notes.md"
        ));
    }

    #[test]
    fn cli_rejects_two_payload_sources() {
        let result = Cli::try_parse_from([
            "stash", "artifact", "save", "a", "--text", "x", "--file", "y.bin",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_rejects_unknown_backend() {
        let result = Cli::try_parse_from(["stash", "--backend", "redis", "artifact", "list"]);
        assert!(result.is_err());
    }

    #[test]
    fn identity_requires_every_component() {
        let err = identity(Some("app"), None, Some("s")).key().unwrap_err();
        assert!(err.to_string().contains("--user"));
        assert!(identity(Some("app"), Some(" "), Some("s")).key().is_err());
        assert!(identity(Some("app"), Some("u"), Some("s")).key().is_ok());
    }

    #[test]
    fn store_args_ignore_blank_surreal_url() {
        let args = StoreArgs {
            backend: BackendKind::Surreal,
            data_dir: PathBuf::from("/tmp/stash"),
            surreal_url: Some("  ".into()),
        };
        let config = args.config();
        assert_eq!(config.backend, BackendKind::Surreal);
        assert!(config.surreal_url.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_to_file() {
        let stores = Stores::in_memory();
        let session = session(&stores);
        let temp_dir = tempfile::tempdir().unwrap();

        let source = temp_dir.path().join("chart.png");
        std::fs::write(&source, [0x89, b'P', b'N', b'G']).unwrap();
        let part = PartSource {
            text: None,
            file: Some(source),
            part_json: None,
        }
        .into_part("image/png".into())
        .unwrap();

        cmd_artifact_save(&session, "chart.png", part, false)
            .await
            .unwrap();
        cmd_artifact_save(&session, "chart.png", Part::inline_data("image/png", vec![1]), true)
            .await
            .unwrap();

        let out = temp_dir.path().join("restored.png");
        cmd_artifact_load(&session, "chart.png", Some(0), Some(&out), false)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert_eq!(
            session.artifacts().versions("chart.png").await.unwrap(),
            vec![0, 1]
        );
    }

    #[tokio::test]
    async fn test_load_missing_artifact_fails_with_context() {
        let stores = Stores::in_memory();
        let err = cmd_artifact_load(&session(&stores), "ghost", None, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to load artifact ghost"));
    }

    #[tokio::test]
    async fn test_binary_load_to_stdout_requires_output() {
        let stores = Stores::in_memory();
        let session = session(&stores);
        cmd_artifact_save(&session, "blob", Part::inline_data("application/zip", vec![0; 8]), false)
            .await
            .unwrap();
        let err = cmd_artifact_load(&session, "blob", None, None, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("--output"));
        cmd_artifact_load(&session, "blob", None, None, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_part_json_source() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("call.json");
        std::fs::write(
            &path,
            r#"{"type": "function_call", "name": "lookup", "args": {"q": "tides"}}"#,
        )
        .unwrap();
        let part = PartSource {
            text: None,
            file: None,
            part_json: Some(path),
        }
        .into_part("application/octet-stream".into())
        .unwrap();
        assert_eq!(part.kind(), "function_call");
    }

    #[tokio::test]
    async fn test_memory_ingest_and_search() {
        let stores = Stores::in_memory();
        let session = session(&stores);
        let temp_dir = tempfile::tempdir().unwrap();
        let events_path = temp_dir.path().join("events.json");

        let ts = Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap();
        let mut textless = SessionEvent::new("model", ts, Content::from_text("", Role::Model));
        textless.content = None;
        let events = vec![
            SessionEvent::new("alice", ts, Content::from_text("Water the tomatoes", Role::User)),
            textless,
        ];
        std::fs::write(&events_path, serde_json::to_vec(&events).unwrap()).unwrap();

        cmd_memory_ingest(&session, &events_path, false)
            .await
            .unwrap();
        cmd_memory_search(&session, "TOMATOES", true).await.unwrap();

        let other_session = stores.session(IdentityKey::new("cli-app", "alice", "s2").unwrap());
        let hits = other_session.memory().search("tomatoes").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(
            render_entry(&hits[0]),
            "[2025-06-01T08:00:00Z] alice: Water the tomatoes"
        );
    }

    #[tokio::test]
    async fn test_memory_ingest_rejects_malformed_file() {
        let stores = Stores::in_memory();
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("events.json");
        std::fs::write(&path, "{not an array").unwrap();

        let err = cmd_memory_ingest(&session(&stores), &path, false)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Invalid JSON"));
    }

    #[tokio::test]
    async fn test_list_and_versions() {
        let stores = Stores::in_memory();
        let session = session(&stores);
        for name in ["b.txt", "a.txt", "b.txt"] {
            cmd_artifact_save(&session, name, Part::text(name), false)
                .await
                .unwrap();
        }
        cmd_artifact_list(&session, false).await.unwrap();
        cmd_artifact_versions(&session, "b.txt", true).await.unwrap();
        assert_eq!(
            session.artifacts().list().await.unwrap(),
            vec!["a.txt", "b.txt"]
        );
    }
}
