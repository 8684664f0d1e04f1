//! CLI command implementations.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use parley_realtime::{Client, ClientConfig, ConnectionState, Event, EventHandler, EventKind};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Options for [`replay`].
#[derive(Debug, Clone, Default)]
pub struct ReplayOptions {
    pub file: PathBuf,
    pub user: Option<String>,
    pub watch: Vec<String>,
    pub config: Option<PathBuf>,
    pub json: bool,
}

/// Outcome of a replay.
#[derive(Debug, Default, Serialize)]
pub struct ReplaySummary {
    pub events: u64,
    pub undecodable: u64,
    pub handler_failures: u64,
    pub kinds: BTreeMap<String, u64>,
    pub connection: String,
    pub channels: Vec<ChannelSummary>,
}

/// Final state of one watched channel.
#[derive(Debug, Serialize)]
pub struct ChannelSummary {
    pub cid: String,
    pub messages: usize,
    pub members: usize,
    pub unread: u32,
    pub typing: Vec<String>,
    pub deleted: bool,
}

/// Prints one line per event.
struct Printer;

impl EventHandler for Printer {
    fn on_any_event(&self, event: &Event) {
        let cid = event.cid.as_deref().unwrap_or("-");
        let who = event.acting_user().map_or("-", |u| u.id.as_str());
        println!("{:<32} {:<28} {}", event.kind, cid, who);
    }
}

/// Counts events by kind.
#[derive(Default)]
struct Counter {
    kinds: Mutex<BTreeMap<String, u64>>,
}

impl EventHandler for Counter {
    fn on_any_event(&self, event: &Event) {
        *self.kinds.lock().entry(event.kind.to_string()).or_default() += 1;
    }
}

/// Replay a recorded event stream and print a summary.
pub fn replay(options: &ReplayOptions) -> Result<()> {
    let summary = run_replay(options, !options.json)?;

    if options.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

/// Feed every line of the replay file through a fresh client.
pub fn run_replay(options: &ReplayOptions, print_events: bool) -> Result<ReplaySummary> {
    let mut config = match &options.config {
        Some(path) => ClientConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(user) = &options.user {
        config.user_id = Some(user.clone());
    }
    config.validate()?;

    let content = std::fs::read_to_string(&options.file)
        .with_context(|| format!("reading {}", options.file.display()))?;

    let client = Client::new(config);
    for cid in &options.watch {
        client
            .watch_channel(cid)
            .with_context(|| format!("watching {cid}"))?;
    }

    let counter = Arc::new(Counter::default());
    client.add_event_handler(counter.clone());
    if print_events {
        client.add_event_handler(Arc::new(Printer));
    }

    tracing::info!(file = %options.file.display(), "Replaying events");

    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Err(e) = client.handle_frame(line) {
            tracing::warn!(line = index + 1, error = %e, "Skipping undecodable frame");
        }
    }

    let stats = client.stats();
    let connection = match client.connection_state() {
        ConnectionState::Connected { connection_id } => format!("connected ({connection_id})"),
        ConnectionState::Disconnected => "disconnected".to_string(),
    };

    let channels = client
        .active_channels()
        .into_iter()
        .map(|state| ChannelSummary {
            cid: state.cid.to_string(),
            messages: state.messages.len(),
            members: state.members.len(),
            unread: state.unread_count,
            typing: state
                .typing_user_ids()
                .into_iter()
                .map(str::to_string)
                .collect(),
            deleted: state.deleted,
        })
        .collect();

    let kinds = counter.kinds.lock().clone();
    Ok(ReplaySummary {
        events: stats.events_received,
        undecodable: stats.decode_failures,
        handler_failures: stats.handler_failures,
        kinds,
        connection,
        channels,
    })
}

fn print_summary(summary: &ReplaySummary) {
    println!();
    println!("Replay Summary");
    println!("==============");
    println!("Events:      {}", summary.events);
    println!("Undecodable: {}", summary.undecodable);
    if summary.handler_failures > 0 {
        println!("Handler failures: {}", summary.handler_failures);
    }
    println!("Connection:  {}", summary.connection);

    if !summary.kinds.is_empty() {
        println!();
        println!("By kind:");
        for (kind, count) in &summary.kinds {
            println!("  {kind:<36} {count}");
        }
    }

    if !summary.channels.is_empty() {
        println!();
        println!("Channels:");
        for channel in &summary.channels {
            println!(
                "  {:<28} messages={} members={} unread={}{}",
                channel.cid,
                channel.messages,
                channel.members,
                channel.unread,
                if channel.deleted { " (deleted)" } else { "" }
            );
        }
    }
}

/// List the known event kinds.
pub fn kinds() {
    for kind in EventKind::all() {
        println!("{kind}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn replay_file(lines: &[&str]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{line}").unwrap();
        }
        file
    }

    #[test]
    fn test_replay_counts_events() {
        let file = replay_file(&[
            r#"{"type":"health.check","connection_id":"c1","me":{"id":"alice"}}"#,
            r#"{"type":"message.new","cid":"messaging:general","message":{"id":"m1","text":"hi","user":{"id":"bob"}}}"#,
            "",
            "{not json",
            r#"{"type":"typing.start","cid":"messaging:general","user":{"id":"bob"}}"#,
            r#"{"type":"poll.closed"}"#,
        ]);

        let options = ReplayOptions {
            file: file.path().to_path_buf(),
            user: Some("alice".to_string()),
            watch: vec!["messaging:general".to_string()],
            ..Default::default()
        };
        let summary = run_replay(&options, false).unwrap();

        assert_eq!(summary.events, 4);
        assert_eq!(summary.undecodable, 1);
        assert_eq!(summary.kinds.get("message.new"), Some(&1));
        assert_eq!(summary.kinds.get("poll.closed"), Some(&1));
        assert_eq!(summary.connection, "connected (c1)");

        assert_eq!(summary.channels.len(), 1);
        let general = &summary.channels[0];
        assert_eq!(general.cid, "messaging:general");
        assert_eq!(general.messages, 1);
        assert_eq!(general.unread, 1);
        assert_eq!(general.typing, vec!["bob"]);
    }

    #[test]
    fn test_replay_rejects_bad_channel() {
        let file = replay_file(&[]);
        let options = ReplayOptions {
            file: file.path().to_path_buf(),
            watch: vec!["general".to_string()],
            ..Default::default()
        };
        assert!(run_replay(&options, false).is_err());
    }

    #[test]
    fn test_replay_missing_file() {
        let options = ReplayOptions {
            file: PathBuf::from("/nonexistent/events.jsonl"),
            ..Default::default()
        };
        assert!(run_replay(&options, false).is_err());
    }

    #[test]
    fn test_replay_with_config_file() {
        let mut config = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(config, "user_id: bob").unwrap();
        let file = replay_file(&[
            r#"{"type":"message.new","cid":"messaging:general","message":{"id":"m1","text":"hi","user":{"id":"bob"}}}"#,
        ]);

        let options = ReplayOptions {
            file: file.path().to_path_buf(),
            watch: vec!["messaging:general".to_string()],
            config: Some(config.path().to_path_buf()),
            ..Default::default()
        };
        let summary = run_replay(&options, false).unwrap();

        // Own messages don't count as unread.
        assert_eq!(summary.channels[0].unread, 0);
        assert_eq!(summary.connection, "disconnected");
    }
}
