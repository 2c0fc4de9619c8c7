//! Replaying captured gateway dispatches through a store.
//!
//! A capture is JSON lines, one dispatch per line:
//!
//! ```text
//! {"shard": 0, "event": {"t": "GUILD_CREATE", "d": {...}}}
//! ```
//!
//! Lines that fail to parse or apply are logged and counted; replay goes on.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use shardcache_store::{Dispatch, Store, StoreConfig, StoreFlag};
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReplayError {
    /// Capture or config file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Config file is not a valid store config.
    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct ReplayLine {
    #[serde(default)]
    shard: u32,
    event: Dispatch,
}

/// Counts gathered over one replay.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReplaySummary {
    pub lines: u64,
    pub applied: u64,
    /// Dispatches of a disabled category.
    pub skipped: u64,
    pub failed: u64,
    /// Applied dispatches that create an entity.
    pub creates: u64,
    /// Applied dispatches per wire name.
    pub per_kind: BTreeMap<String, u64>,
}

/// Command-line overrides applied on top of a config file.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub disable: Vec<StoreFlag>,
    pub page_size: Option<usize>,
    pub inline_sweep: bool,
}

/// Load a store config from an optional JSON file, then apply overrides.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<StoreConfig, ReplayError> {
    let mut config = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|source| ReplayError::Io {
                path: path.display().to_string(),
                source,
            })?;
            serde_json::from_str(&raw).map_err(|source| ReplayError::Config {
                path: path.display().to_string(),
                source,
            })?
        }
        None => StoreConfig::default(),
    };

    for flag in &overrides.disable {
        config.flags = config.flags.with(*flag, false);
    }
    if let Some(size) = overrides.page_size {
        config = config.with_scan_page_size(size);
    }
    if overrides.inline_sweep {
        config = config.with_background_sweep(false);
    }
    Ok(config)
}

/// Submit every dispatch read from `reader` to `store`.
pub async fn replay<R>(store: &Store, reader: R) -> Result<ReplaySummary, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut summary = ReplaySummary::default();
    let mut lines = reader.lines();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        summary.lines += 1;
        let line_no = summary.lines;

        let parsed: ReplayLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(line = line_no, error = %e, "replay: unparseable line skipped");
                summary.failed += 1;
                continue;
            }
        };

        let kind = parsed.event.kind();
        match store.submit(parsed.shard, parsed.event).await {
            Ok(outcome) if outcome.is_skipped() => {
                debug!(line = line_no, kind = %kind, "replay: category disabled");
                summary.skipped += 1;
            }
            Ok(_) => {
                summary.applied += 1;
                if kind.is_create() {
                    summary.creates += 1;
                }
                *summary.per_kind.entry(kind.name().to_string()).or_default() += 1;
            }
            Err(e) => {
                warn!(line = line_no, kind = %kind, error = %e, "replay: dispatch failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        lines = summary.lines,
        applied = summary.applied,
        skipped = summary.skipped,
        failed = summary.failed,
        "replay: done"
    );
    Ok(summary)
}

/// Replay a capture file.
pub async fn replay_file(store: &Store, path: &Path) -> Result<ReplaySummary, ReplayError> {
    let io_error = |source| ReplayError::Io {
        path: path.display().to_string(),
        source,
    };
    let file = tokio::fs::File::open(path).await.map_err(io_error)?;
    replay(store, tokio::io::BufReader::new(file))
        .await
        .map_err(io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use shardcache_store::{EntityKind, KvLayout, Query, Scope, StoreFlags};
    use std::io::Write;

    const CAPTURE: &str = r#"
{"shard": 0, "event": {"t": "GUILD_CREATE", "d": {"id": 1, "name": "g", "owner_id": 5, "members": [{"user": {"id": 5, "username": "owner"}}]}}}
{"shard": 0, "event": {"t": "GUILD_MEMBER_ADD", "d": {"guild_id": 1, "user": {"id": 6, "username": "late"}}}}
not json at all
{"shard": 0, "event": {"t": "PRESENCE_UPDATE", "d": {"guild_id": 1, "user": {"id": 6}, "status": "idle"}}}
{"shard": 0, "event": {"t": "GUILD_MEMBERS_COMPLETION", "d": {"guild_id": 1}}}
"#;

    fn store(config: StoreConfig) -> Store {
        Store::from_layout(&KvLayout::in_memory(config)).unwrap()
    }

    #[tokio::test]
    async fn test_replay_counts_and_continues_past_bad_lines() {
        let config = StoreConfig::default().with_flags(StoreFlags::all().with(StoreFlag::Presence, false));
        let store = store(config);
        let summary = replay(&store, CAPTURE.as_bytes()).await.unwrap();

        assert_eq!(summary.lines, 5);
        assert_eq!(summary.applied, 3);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.creates, 2);
        assert_eq!(summary.per_kind.get("GUILD_CREATE"), Some(&1));

        let exact = store
            .execute(Query::CountExactMembers { guild_id: 1 })
            .await
            .unwrap();
        assert_eq!(exact.count(), Some(2));
        let presences = store
            .execute(Query::count(EntityKind::Presence, Scope::All))
            .await
            .unwrap();
        assert_eq!(presences.count(), Some(0));
    }

    #[test]
    fn test_load_config_with_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"flags": {{"presence": false}}, "scan_page_size": 32, "invalidation_filter": ["LOGOUT"]}}"#
        )
        .unwrap();

        let overrides = ConfigOverrides {
            disable: vec![StoreFlag::VoiceState],
            page_size: None,
            inline_sweep: true,
        };
        let config = load_config(Some(file.path()), &overrides).unwrap();
        assert!(!config.flags.presence);
        assert!(!config.flags.voice_state);
        assert!(config.flags.member);
        assert_eq!(config.scan_page_size, 32);
        assert_eq!(config.invalidation_filter.len(), 1);
        assert!(!config.background_sweep);
    }

    #[test]
    fn test_load_config_rejects_bad_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{\"scan_page_size\": \"big\"}}").unwrap();
        let err = load_config(Some(file.path()), &ConfigOverrides::default()).unwrap_err();
        assert!(matches!(err, ReplayError::Config { .. }));

        let missing = load_config(Some(Path::new("/nonexistent/shardcache.json")), &ConfigOverrides::default());
        assert!(matches!(missing, Err(ReplayError::Io { .. })));
    }
}
