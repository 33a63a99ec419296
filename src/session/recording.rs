use super::*;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};

/// Session recording granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
pub enum SessionRecordLevel {
    /// Disable recording.
    Off,
    /// Record lifecycle events and command names, without command output.
    KeyEventsOnly,
    /// Record everything, including command output.
    #[default]
    Full,
}

/// A single recorded event.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionRecordEntry {
    pub ts_ms: u128,
    pub event: SessionEvent,
}

/// Supported recorded event types.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    ConnectionEstablished {
        host: String,
    },
    CommandOutput {
        command: String,
        /// Absent below [`SessionRecordLevel::Full`].
        #[serde(default)]
        output: Option<String>,
    },
    CommandFailed {
        command: String,
        reason: String,
    },
    KeepaliveFailed {
        reason: String,
    },
    ConnectionTerminated,
    ConnectionClosed,
}

/// In-memory session recorder.
///
/// Cheap to clone; clones share the same entry list. The list is bounded: once it
/// holds `capacity` entries, each new entry evicts the oldest one.
#[derive(Debug, Clone)]
pub struct SessionRecorder {
    level: SessionRecordLevel,
    capacity: usize,
    entries: Arc<StdMutex<VecDeque<SessionRecordEntry>>>,
}

impl SessionRecorder {
    /// Create a recorder with the given level and
    /// [`DEFAULT_RECORDER_CAPACITY`](crate::config::DEFAULT_RECORDER_CAPACITY).
    pub fn new(level: SessionRecordLevel) -> Self {
        Self::with_capacity(level, crate::config::DEFAULT_RECORDER_CAPACITY)
    }

    /// Create a recorder that keeps at most `capacity` entries (at least one).
    pub fn with_capacity(level: SessionRecordLevel, capacity: usize) -> Self {
        Self {
            level,
            capacity: capacity.max(1),
            entries: Arc::new(StdMutex::new(VecDeque::new())),
        }
    }

    /// Current recording level.
    pub fn level(&self) -> SessionRecordLevel {
        self.level
    }

    /// Maximum number of entries kept.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Record an event.
    pub fn record_event(&self, event: SessionEvent) -> Result<(), ConnectError> {
        if self.level == SessionRecordLevel::Off {
            return Ok(());
        }
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ConnectError::InternalServerError(format!("record lock error: {e}")))?;
        if guard.len() == self.capacity {
            guard.pop_front();
        }
        guard.push_back(SessionRecordEntry {
            ts_ms: now_ms(),
            event,
        });
        Ok(())
    }

    /// Record a successful command, keeping its output only at [`SessionRecordLevel::Full`].
    pub fn record_output(&self, command: &str, output: &str) -> Result<(), ConnectError> {
        let output = (self.level == SessionRecordLevel::Full).then(|| output.to_string());
        self.record_event(SessionEvent::CommandOutput {
            command: command.to_string(),
            output,
        })
    }

    /// Snapshot all records.
    pub fn entries(&self) -> Result<Vec<SessionRecordEntry>, ConnectError> {
        let guard = self
            .entries
            .lock()
            .map_err(|e| ConnectError::InternalServerError(format!("record lock error: {e}")))?;
        Ok(guard.iter().cloned().collect())
    }

    /// Clears all recorded events.
    pub fn clear(&self) -> Result<(), ConnectError> {
        let mut guard = self
            .entries
            .lock()
            .map_err(|e| ConnectError::InternalServerError(format!("record lock error: {e}")))?;
        guard.clear();
        Ok(())
    }

    /// Export records as JSONL.
    pub fn to_jsonl(&self) -> Result<String, ConnectError> {
        let entries = self.entries()?;
        let mut lines = Vec::with_capacity(entries.len());
        for entry in entries {
            let line = serde_json::to_string(&entry).map_err(|e| {
                ConnectError::InternalServerError(format!("record encode error: {e}"))
            })?;
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    /// Restore a recorder from JSONL lines. Blank lines are skipped.
    ///
    /// The capacity grows to fit the input when it exceeds the default.
    pub fn from_jsonl(jsonl: &str) -> Result<Self, ConnectError> {
        let mut parsed = VecDeque::new();
        for line in jsonl.lines() {
            if line.trim().is_empty() {
                continue;
            }
            let entry: SessionRecordEntry = serde_json::from_str(line).map_err(|e| {
                ConnectError::InternalServerError(format!("record decode error: {e}"))
            })?;
            parsed.push_back(entry);
        }

        Ok(Self {
            level: SessionRecordLevel::Full,
            capacity: parsed.len().max(crate::config::DEFAULT_RECORDER_CAPACITY),
            entries: Arc::new(StdMutex::new(parsed)),
        })
    }
}

impl Default for SessionRecorder {
    fn default() -> Self {
        Self::new(SessionRecordLevel::Full)
    }
}

fn now_ms() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn off_level_records_nothing() {
        let recorder = SessionRecorder::new(SessionRecordLevel::Off);
        recorder
            .record_event(SessionEvent::ConnectionClosed)
            .expect("record");
        assert!(recorder.entries().expect("entries").is_empty());
    }

    #[test]
    fn key_events_level_drops_command_output() {
        let recorder = SessionRecorder::new(SessionRecordLevel::KeyEventsOnly);
        recorder
            .record_output("show running-config", "hostname r1")
            .expect("record output");

        let entries = recorder.entries().expect("entries");
        assert!(matches!(
            &entries[0].event,
            SessionEvent::CommandOutput { command, output: None }
                if command == "show running-config"
        ));
    }

    #[test]
    fn jsonl_export_can_be_loaded_back() {
        let recorder = SessionRecorder::new(SessionRecordLevel::Full);
        recorder
            .record_event(SessionEvent::ConnectionEstablished {
                host: "10.0.0.1".to_string(),
            })
            .expect("record connect");
        recorder
            .record_event(SessionEvent::CommandFailed {
                command: "show version".to_string(),
                reason: "remote command exited with status 1".to_string(),
            })
            .expect("record failure");

        let jsonl = recorder.to_jsonl().expect("encode jsonl");
        let first = jsonl.lines().next().unwrap_or_default();
        assert!(first.contains(r#""kind":"connection_established""#));

        let restored = SessionRecorder::from_jsonl(&jsonl).expect("decode jsonl");
        let entries = restored.entries().expect("entries");
        assert_eq!(entries.len(), 2);
        assert!(matches!(
            &entries[1].event,
            SessionEvent::CommandFailed { command, .. } if command == "show version"
        ));
    }

    #[test]
    fn from_jsonl_accepts_unit_events_and_blank_lines() {
        let jsonl = r#"{"ts_ms":1,"event":{"kind":"connection_terminated"}}

{"ts_ms":2,"event":{"kind":"command_output","command":"ls"}}
"#;
        let recorder = SessionRecorder::from_jsonl(jsonl).expect("decode");
        let entries = recorder.entries().expect("entries");

        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].event, SessionEvent::ConnectionTerminated));
        assert!(matches!(
            &entries[1].event,
            SessionEvent::CommandOutput { output: None, .. }
        ));
    }

    #[test]
    fn full_recorder_evicts_oldest_entries() {
        let recorder = SessionRecorder::with_capacity(SessionRecordLevel::Full, 3);
        for i in 0..5 {
            recorder
                .record_output(&format!("show int {i}"), "up")
                .expect("record output");
        }

        let commands: Vec<String> = recorder
            .entries()
            .expect("entries")
            .into_iter()
            .filter_map(|entry| match entry.event {
                SessionEvent::CommandOutput { command, .. } => Some(command),
                _ => None,
            })
            .collect();
        assert_eq!(commands, ["show int 2", "show int 3", "show int 4"]);

        recorder.clear().expect("clear");
        assert!(recorder.entries().expect("entries").is_empty());
        recorder
            .record_event(SessionEvent::ConnectionClosed)
            .expect("record after clear");
        assert_eq!(recorder.entries().expect("entries").len(), 1);
    }

    #[test]
    fn clones_share_the_bound() {
        let recorder = SessionRecorder::with_capacity(SessionRecordLevel::KeyEventsOnly, 0);
        let clone = recorder.clone();
        assert_eq!(recorder.capacity(), 1);

        recorder
            .record_event(SessionEvent::ConnectionTerminated)
            .expect("record");
        clone
            .record_event(SessionEvent::ConnectionClosed)
            .expect("record");

        let entries = recorder.entries().expect("entries");
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0].event, SessionEvent::ConnectionClosed));
    }

    #[test]
    fn from_jsonl_rejects_garbage() {
        let err = SessionRecorder::from_jsonl("not json").unwrap_err();
        assert!(matches!(err, ConnectError::InternalServerError(_)));
    }
}
