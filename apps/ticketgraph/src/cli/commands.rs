//! # CLI Command Implementations
//!
//! Every command opens the configured snapshot database, restores the engine
//! from it, runs, and writes the snapshot back if the graph changed.

use crate::api::{self, AppState, SharedStore};
use crate::config::AppConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use ticketgraph_core::{
    EngineError, KnowledgeEngine, LearnStatus, LearningData, MAX_SNAPSHOT_SIZE, RedbSnapshotStore,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a learning input file (100 MB).
const MAX_LEARN_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum number of tickets in one learning input file.
const MAX_TICKETS_PER_FILE: usize = 100_000;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), EngineError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| EngineError::Io(format!("cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(EngineError::InvalidArgument(format!(
            "file size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve an input path to an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, EngineError> {
    let canonical = path.canonicalize().map_err(|e| {
        EngineError::Io(format!("invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(EngineError::Io(format!(
            "path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve an output path whose parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, EngineError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        EngineError::Io(format!(
            "invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(EngineError::Io(format!(
            "output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| EngineError::Io("output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl Serialize) -> Result<(), EngineError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| EngineError::Serialization(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

// =============================================================================
// WORKSPACE
// =============================================================================

/// Flags shared by every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub json_mode: bool,
}

/// Configuration, engine and snapshot store for one command run.
pub struct Workspace {
    pub config: AppConfig,
    pub engine: Arc<KnowledgeEngine>,
    pub store: Arc<RedbSnapshotStore>,
}

impl Workspace {
    /// Load the configuration and restore the engine from the database.
    pub fn open(options: &GlobalOptions) -> Result<Self, EngineError> {
        let mut config = AppConfig::load(options.config.as_deref())?;
        if let Some(database) = &options.database {
            config.storage.database = database.clone();
        }

        let store = RedbSnapshotStore::open(&config.storage.database)?;
        let engine = KnowledgeEngine::new(config.engine.clone())?;
        if let Some(metadata) = engine.restore_snapshot(&store, &config.storage.snapshot_key)? {
            tracing::debug!(
                nodes = metadata.node_count,
                edges = metadata.edge_count,
                "graph restored"
            );
        }

        Ok(Self {
            config,
            engine: Arc::new(engine),
            store: Arc::new(store),
        })
    }

    /// Write the current graph back to the database.
    pub fn save(&self) -> Result<usize, EngineError> {
        self.engine
            .save_snapshot(self.store.as_ref(), &self.config.storage.snapshot_key)
    }

    #[must_use]
    pub fn app_state(&self) -> AppState {
        let store: SharedStore = self.store.clone();
        AppState::new(Arc::clone(&self.engine))
            .with_store(store, self.config.storage.snapshot_key.clone())
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(
    options: &GlobalOptions,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), EngineError> {
    let mut workspace = Workspace::open(options)?;
    if let Some(host) = host {
        workspace.config.server.host = host;
    }
    if let Some(port) = port {
        workspace.config.server.port = port;
    }
    let server = workspace.config.server.clone();
    let metadata = workspace.engine.snapshot_metadata();

    println!("ticketgraph server starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", server.addr());
    println!("  Database: {:?}", workspace.config.storage.database);
    println!("  Snapshot: {}", workspace.config.storage.snapshot_key);
    println!(
        "  Graph:    {} nodes, {} edges",
        metadata.node_count, metadata.edge_count
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /health         - Health check");
    println!("  GET  /graph          - Full graph");
    println!("  GET  /graph/metadata - Graph counters");
    println!("  POST /learn          - Learn a resolved ticket");
    println!("  GET  /insights       - Ranked insights");
    println!("  GET  /visualization  - Laid-out graph (?layout=force|hierarchical|circular|grid)");
    println!("  POST /snapshot       - Save the graph");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    api::run_server(workspace.app_state(), &server).await
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Show graph counters.
pub fn cmd_status(options: &GlobalOptions) -> Result<(), EngineError> {
    let workspace = Workspace::open(options)?;
    let metadata = workspace.engine.snapshot_metadata();
    let checksum = workspace.engine.snapshot_checksum()?;

    if options.json_mode {
        return print_json(&serde_json::json!({
            "database": workspace.config.storage.database.to_string_lossy(),
            "snapshotKey": workspace.config.storage.snapshot_key,
            "metadata": metadata,
            "checksum": checksum,
        }));
    }

    println!("ticketgraph Status");
    println!("==================");
    println!("Database:        {:?}", workspace.config.storage.database);
    println!("Snapshot key:    {}", workspace.config.storage.snapshot_key);
    println!();
    println!("Nodes:           {}", metadata.node_count);
    println!("Edges:           {}", metadata.edge_count);
    println!("Learning events: {}", metadata.total_learning_events);
    match metadata.last_updated {
        Some(at) => println!("Last updated:    {}", at.to_rfc3339()),
        None => println!("Last updated:    never"),
    }
    println!("Checksum:        {}", checksum);

    Ok(())
}

// =============================================================================
// LEARN COMMAND
// =============================================================================

/// Tally of a `learn` run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnSummary {
    pub applied: usize,
    pub duplicates: usize,
    pub rejected: Vec<String>,
}

/// Parse a learning file: one `LearningData` object or an array of them.
pub fn parse_learning_file(contents: &[u8]) -> Result<Vec<LearningData>, EngineError> {
    let value: serde_json::Value = serde_json::from_slice(contents)
        .map_err(|e| EngineError::Validation(format!("invalid JSON: {}", e)))?;

    let items = match value {
        serde_json::Value::Array(items) => items,
        single @ serde_json::Value::Object(_) => vec![single],
        _ => {
            return Err(EngineError::Validation(
                "expected a ticket object or an array of tickets".to_string(),
            ));
        }
    };

    if items.len() > MAX_TICKETS_PER_FILE {
        return Err(EngineError::Validation(format!(
            "ticket count {} exceeds maximum allowed {}",
            items.len(),
            MAX_TICKETS_PER_FILE
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item)
                .map_err(|e| EngineError::Validation(format!("ticket #{}: {}", index, e)))
        })
        .collect()
}

/// Learn tickets from a JSON file. Rejected tickets are reported and skipped.
pub fn cmd_learn(options: &GlobalOptions, file: &Path) -> Result<LearnSummary, EngineError> {
    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_LEARN_FILE_SIZE)?;
    let contents = std::fs::read(&validated_path)
        .map_err(|e| EngineError::Io(format!("read file: {}", e)))?;
    let tickets = parse_learning_file(&contents)?;

    tracing::info!(file = %validated_path.display(), tickets = tickets.len(), "learning");

    let workspace = Workspace::open(options)?;
    let mut summary = LearnSummary::default();
    for data in &tickets {
        match workspace.engine.learn_from_ticket(data) {
            Ok(outcome) if outcome.status == LearnStatus::Applied => summary.applied += 1,
            Ok(_) => summary.duplicates += 1,
            Err(EngineError::Validation(reason)) => {
                tracing::warn!(ticket = %data.ticket_id, %reason, "ticket rejected");
                summary
                    .rejected
                    .push(format!("{}: {}", data.ticket_id, reason));
            }
            Err(e) => return Err(e),
        }
    }

    if summary.applied > 0 {
        workspace.save()?;
    }

    if options.json_mode {
        print_json(&serde_json::json!({
            "summary": summary,
            "metadata": workspace.engine.snapshot_metadata(),
        }))?;
    } else {
        println!(
            "Learned {} tickets ({} duplicates, {} rejected)",
            summary.applied,
            summary.duplicates,
            summary.rejected.len()
        );
        for reason in &summary.rejected {
            println!("  rejected {}", reason);
        }
    }

    Ok(summary)
}

// =============================================================================
// INSIGHTS COMMAND
// =============================================================================

/// Print ranked insights.
pub fn cmd_insights(options: &GlobalOptions, limit: Option<usize>) -> Result<(), EngineError> {
    let workspace = Workspace::open(options)?;
    let mut insights = workspace.engine.generate_insights();
    if let Some(limit) = limit {
        insights.truncate(limit);
    }

    if options.json_mode {
        return print_json(&insights);
    }

    if insights.is_empty() {
        println!("No insights yet");
        return Ok(());
    }
    for insight in &insights {
        println!(
            "[{:.2}] {:<15} {}",
            insight.confidence_score,
            insight.kind.as_str(),
            insight.description
        );
    }
    Ok(())
}

// =============================================================================
// VISUALIZE COMMAND
// =============================================================================

/// Lay out the graph and write the result as JSON.
pub fn cmd_visualize(
    options: &GlobalOptions,
    layout: &str,
    output: Option<&Path>,
) -> Result<(), EngineError> {
    let workspace = Workspace::open(options)?;
    let visualization = workspace.engine.generate_visualization(layout)?;

    match output {
        Some(path) => {
            let validated_output = validate_output_path(path)?;
            let data = serde_json::to_vec_pretty(&visualization)
                .map_err(|e| EngineError::Serialization(e.to_string()))?;
            std::fs::write(&validated_output, &data)
                .map_err(|e| EngineError::Io(format!("write file: {}", e)))?;
            println!(
                "Wrote {} layout ({} nodes) to {:?}",
                visualization.layout,
                visualization.nodes.len(),
                validated_output
            );
            Ok(())
        }
        None => print_json(&visualization),
    }
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Write the graph to a snapshot file.
pub fn cmd_export(options: &GlobalOptions, output: &Path) -> Result<(), EngineError> {
    let validated_output = validate_output_path(output)?;
    let workspace = Workspace::open(options)?;

    let data = workspace.engine.export_snapshot()?;
    let checksum = workspace.engine.snapshot_checksum()?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| EngineError::Io(format!("write file: {}", e)))?;

    if options.json_mode {
        return print_json(&serde_json::json!({
            "output": validated_output.to_string_lossy(),
            "sizeBytes": data.len(),
            "checksum": checksum,
        }));
    }
    println!("Checksum: {}", checksum);
    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

// =============================================================================
// IMPORT COMMAND
// =============================================================================

/// Replace the stored graph with a snapshot file.
pub fn cmd_import(options: &GlobalOptions, input: &Path) -> Result<(), EngineError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_SNAPSHOT_SIZE as u64)?;
    let data = std::fs::read(&validated_path)
        .map_err(|e| EngineError::Io(format!("read file: {}", e)))?;

    let workspace = Workspace::open(options)?;
    let metadata = workspace.engine.import_snapshot(&data)?;
    workspace.save()?;

    if options.json_mode {
        return print_json(&metadata);
    }
    println!(
        "Imported graph: {} nodes, {} edges",
        metadata.node_count, metadata.edge_count
    );
    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TICKETS: &str = r#"[
        {
            "ticketId": "T1",
            "entitiesExtracted": [
                { "type": "Symptom", "label": "disk full", "confidence": 0.9 },
                { "type": "Resolution", "label": "clear temp files", "confidence": 0.9 }
            ],
            "relationsExtracted": [
                {
                    "sourceLabel": "disk full",
                    "sourceType": "Symptom",
                    "targetLabel": "clear temp files",
                    "targetType": "Resolution",
                    "relationType": "resolvedBy",
                    "confidence": 0.8
                }
            ]
        },
        {
            "ticketId": "T2",
            "entitiesExtracted": [
                { "type": "Symptom", "label": "   ", "confidence": 0.9 }
            ]
        }
    ]"#;
    fn options(dir: &Path, db: &str) -> GlobalOptions {
        GlobalOptions {
            config: None,
            database: Some(dir.join(db)),
            json_mode: true,
        }
    }

    #[test]
    fn parses_single_object_and_arrays() {
        let single = parse_learning_file(br#"{ "ticketId": "T9" }"#).expect("parse");
        assert_eq!(single.len(), 1);
        assert_eq!(single[0].ticket_id, "T9");

        assert_eq!(parse_learning_file(TICKETS.as_bytes()).expect("parse").len(), 2);
        assert!(matches!(
            parse_learning_file(b"42"),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            parse_learning_file(
                br#"[{ "ticketId": "T1", "entitiesExtracted": [{ "type": "Planet", "label": "x" }] }]"#
            ),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn learn_persists_and_repeats_are_duplicates() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("tickets.json");
        std::fs::write(&input, TICKETS).expect("write");
        let opts = options(dir.path(), "graph.redb");

        let first = cmd_learn(&opts, &input).expect("learn");
        assert_eq!(first.applied, 1);
        assert_eq!(first.rejected.len(), 1);

        let second = cmd_learn(&opts, &input).expect("learn");
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 1);

        let workspace = Workspace::open(&opts).expect("open");
        let metadata = workspace.engine.snapshot_metadata();
        assert_eq!(metadata.node_count, 2);
        assert_eq!(metadata.edge_count, 1);
        assert_eq!(metadata.total_learning_events, 1);
    }

    #[test]
    fn export_then_import_into_another_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("tickets.json");
        std::fs::write(&input, TICKETS).expect("write");
        let source = options(dir.path(), "source.redb");
        cmd_learn(&source, &input).expect("learn");

        let snapshot = dir.path().join("graph.tkgs");
        cmd_export(&source, &snapshot).expect("export");

        let target = options(dir.path(), "target.redb");
        cmd_import(&target, &snapshot).expect("import");

        let a = Workspace::open(&source).expect("open");
        let b = Workspace::open(&target).expect("open");
        assert_eq!(a.engine.get_graph(), b.engine.get_graph());
        assert_eq!(
            a.engine.snapshot_checksum().expect("checksum"),
            b.engine.snapshot_checksum().expect("checksum")
        );
    }

    #[test]
    fn visualize_rejects_unknown_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let opts = options(dir.path(), "graph.redb");
        assert!(matches!(
            cmd_visualize(&opts, "spiral", None),
            Err(EngineError::InvalidArgument(_))
        ));

        let out = dir.path().join("layout.json");
        cmd_visualize(&opts, "GRID", Some(&out)).expect("visualize");
        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&out).expect("read")).expect("json");
        assert_eq!(written["layout"], "grid");
    }

    #[test]
    fn import_rejects_garbage() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bogus = dir.path().join("bogus.tkgs");
        std::fs::write(&bogus, b"not a snapshot").expect("write");
        let opts = options(dir.path(), "graph.redb");
        assert!(cmd_import(&opts, &bogus).is_err());
    }
}
