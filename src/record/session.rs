//! Session records
//!
//! Defines the serialization format for captured sessions: task identity,
//! video metadata, and time-relative input actions. Writes are atomic (temp
//! file + rename) and recordings checkpoint periodically so a crash never
//! loses a whole session.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::record::event::{EventData, EventKind};
use crate::record::frame::Region;

/// Current session format version
pub const CURRENT_FORMAT_VERSION: &str = "1.0";

/// How often a live recording checkpoints its session file
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_secs(5);

/// Get the checkpoint (temporary) path for a session file
fn checkpoint_path(final_path: &Path) -> PathBuf {
    final_path.with_extension("json.tmp")
}

/// Video stream metadata for a recorded session.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMeta {
    /// Captured screen rectangle
    pub region: Region,
    /// Target capture rate
    pub fps: u32,
    /// Seconds between session start and stop
    pub duration: f64,
}

/// Recorded video: metadata plus the path of the exported frame directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoRecord {
    pub metadata: VideoMeta,
    pub path: String,
}

/// One replayable action: a session-relative timestep, channel, and payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Seconds since session start
    pub timestep: f64,
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub data: EventData,
}

/// A persisted capture of one recorded task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionRecord {
    pub task_id: String,
    pub instruction: String,
    pub video: Option<VideoRecord>,
    pub actions: Option<Vec<Action>>,
    /// Unique session id
    pub id: Uuid,
    /// Wall-clock time the session was recorded
    pub recorded_at: DateTime<Utc>,
    /// Version of the session format
    pub format_version: String,
}

impl Default for SessionRecord {
    fn default() -> Self {
        Self {
            task_id: String::new(),
            instruction: String::new(),
            video: None,
            actions: None,
            id: Uuid::new_v4(),
            recorded_at: Utc::now(),
            format_version: CURRENT_FORMAT_VERSION.to_string(),
        }
    }
}

impl SessionRecord {
    /// Create a new empty session record
    pub fn new(task_id: &str, instruction: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            instruction: instruction.to_string(),
            ..Self::default()
        }
    }

    /// Number of recorded actions
    pub fn action_count(&self) -> usize {
        self.actions.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.action_count() == 0 && self.video.is_none()
    }

    /// Session length in seconds: video duration, or the last timestep when
    /// no video was captured.
    pub fn duration(&self) -> f64 {
        if let Some(video) = &self.video {
            return video.metadata.duration;
        }
        self.actions
            .as_ref()
            .and_then(|a| a.last())
            .map_or(0.0, |a| a.timestep)
    }

    /// Actions on one channel, in order.
    pub fn actions_of_kind(&self, kind: EventKind) -> Vec<&Action> {
        self.actions
            .as_ref()
            .map(|actions| actions.iter().filter(|a| a.kind == kind).collect())
            .unwrap_or_default()
    }

    /// Save the session to a file.
    ///
    /// Writes through the checkpoint path and renames, so a crash mid-write
    /// never leaves a truncated session file behind.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let tmp_path = checkpoint_path(path);
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Save a checkpoint to a temporary file for crash recovery.
    ///
    /// Compact JSON for speed; the checkpoint sits at `<path>.tmp` until it
    /// is finalized or removed.
    pub fn save_checkpoint(&self, final_path: &Path) -> crate::Result<()> {
        let tmp_path = checkpoint_path(final_path);
        let json = serde_json::to_string(self)?;
        std::fs::write(&tmp_path, json)?;
        Ok(())
    }

    /// Finalize a checkpoint by renaming `.tmp` to the final path.
    pub fn finalize_checkpoint(final_path: &Path) -> crate::Result<()> {
        let tmp_path = checkpoint_path(final_path);
        if tmp_path.exists() {
            std::fs::rename(&tmp_path, final_path)?;
        }
        Ok(())
    }

    /// Remove a checkpoint file if it exists (e.g. after a successful save).
    pub fn remove_checkpoint(final_path: &Path) {
        let _ = std::fs::remove_file(checkpoint_path(final_path));
    }

    /// Find and recover orphaned checkpoint files in a directory.
    ///
    /// Returns (checkpoint_path, recovered_session) pairs.
    pub fn recover_checkpoints(dir: &Path) -> Vec<(PathBuf, SessionRecord)> {
        let mut recovered = Vec::new();
        if let Ok(entries) = std::fs::read_dir(dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().map(|e| e == "tmp").unwrap_or(false) {
                    if let Ok(content) = std::fs::read_to_string(&path) {
                        if let Ok(session) = serde_json::from_str::<SessionRecord>(&content) {
                            recovered.push((path, session));
                        }
                    }
                }
            }
        }
        recovered
    }

    /// Load a session from a file.
    ///
    /// Logs a warning if the session was saved with an unknown format
    /// version, but still attempts to deserialize it (forward-compatible
    /// via `#[serde(default)]`).
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let session: SessionRecord = serde_json::from_str(&content)?;
        if session.format_version != CURRENT_FORMAT_VERSION {
            tracing::warn!(
                task_id = %session.task_id,
                found = %session.format_version,
                expected = CURRENT_FORMAT_VERSION,
                "Session has different format version; some fields may use default values"
            );
        }
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::event::Button;

    fn make_action(timestep: f64, data: EventData) -> Action {
        Action {
            timestep,
            kind: data.kind(),
            data,
        }
    }

    fn make_session() -> SessionRecord {
        let mut session = SessionRecord::new("demo-task", "open the editor");
        session.video = Some(VideoRecord {
            metadata: VideoMeta {
                region: Region::new(0, 0, 640, 480),
                fps: 10,
                duration: 2.5,
            },
            path: "frames".to_string(),
        });
        session.actions = Some(vec![
            make_action(
                0.1,
                EventData::Down {
                    x: 5.0,
                    y: 6.0,
                    button: Button::Left,
                },
            ),
            make_action(
                0.3,
                EventData::Up {
                    x: 5.0,
                    y: 6.0,
                    button: Button::Left,
                },
            ),
            make_action(0.5, EventData::Press { key: "a".into() }),
        ]);
        session
    }

    #[test]
    fn test_session_creation() {
        let session = SessionRecord::new("t1", "do a thing");
        assert_eq!(session.task_id, "t1");
        assert_eq!(session.instruction, "do a thing");
        assert!(session.is_empty());
        assert_eq!(session.format_version, CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn test_wire_shape() {
        let value = serde_json::to_value(make_session()).unwrap();
        assert_eq!(value["task_id"], "demo-task");
        assert_eq!(value["video"]["metadata"]["fps"], 10);
        assert_eq!(value["video"]["metadata"]["region"]["width"], 640);
        assert_eq!(value["video"]["path"], "frames");
        assert_eq!(value["actions"][0]["timestep"], 0.1);
        assert_eq!(value["actions"][0]["type"], "mouse");
        assert_eq!(value["actions"][0]["data"]["action"], "down");
        assert_eq!(value["actions"][2]["type"], "keyboard");
    }

    #[test]
    fn test_duration_and_counts() {
        let session = make_session();
        assert_eq!(session.action_count(), 3);
        assert_eq!(session.duration(), 2.5);

        let mut no_video = session.clone();
        no_video.video = None;
        assert_eq!(no_video.duration(), 0.5);
    }

    #[test]
    fn test_actions_of_kind() {
        let session = make_session();
        assert_eq!(session.actions_of_kind(EventKind::Mouse).len(), 2);
        assert_eq!(session.actions_of_kind(EventKind::Keyboard).len(), 1);
        assert!(session.actions_of_kind(EventKind::Code).is_empty());
    }

    #[test]
    fn test_save_and_load_is_atomic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let session = make_session();
        session.save(&path).unwrap();

        assert!(path.exists());
        assert!(!checkpoint_path(&path).exists());

        let loaded = SessionRecord::load(&path).unwrap();
        assert_eq!(loaded.task_id, "demo-task");
        assert_eq!(loaded.action_count(), 3);
        assert_eq!(loaded.id, session.id);
    }

    #[test]
    fn test_checkpoint_save_and_recover() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("session.json");

        let session = make_session();
        session.save_checkpoint(&final_path).unwrap();

        assert!(checkpoint_path(&final_path).exists());
        assert!(!final_path.exists());

        let recovered = SessionRecord::recover_checkpoints(dir.path());
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].1.task_id, "demo-task");
        assert_eq!(recovered[0].1.action_count(), 3);
    }

    #[test]
    fn test_finalize_checkpoint_renames() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("session.json");

        make_session().save_checkpoint(&final_path).unwrap();
        SessionRecord::finalize_checkpoint(&final_path).unwrap();

        assert!(final_path.exists());
        assert!(!checkpoint_path(&final_path).exists());
        assert_eq!(
            SessionRecord::load(&final_path).unwrap().task_id,
            "demo-task"
        );
    }

    #[test]
    fn test_remove_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let final_path = dir.path().join("session.json");
        std::fs::write(checkpoint_path(&final_path), "{}").unwrap();

        SessionRecord::remove_checkpoint(&final_path);
        assert!(!checkpoint_path(&final_path).exists());
    }

    #[test]
    fn test_recover_ignores_invalid_tmp_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.json.tmp"), "not valid json").unwrap();
        assert!(SessionRecord::recover_checkpoints(dir.path()).is_empty());
    }

    #[test]
    fn test_load_missing_or_malformed() {
        assert!(SessionRecord::load(Path::new("/nonexistent/session.json")).is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{ invalid json }").unwrap();
        assert!(SessionRecord::load(&path).is_err());
    }

    #[test]
    fn test_backward_compat_missing_supplemental_fields() {
        // The minimal wire shape: only the original four fields.
        let json = r#"{
            "task_id": "legacy",
            "instruction": "",
            "video": null,
            "actions": [{"timestep": 0.2, "type": "keyboard", "data": {"action": "press", "key": "x"}}]
        }"#;
        let session: SessionRecord = serde_json::from_str(json).unwrap();
        assert_eq!(session.task_id, "legacy");
        assert_eq!(session.action_count(), 1);
        assert_eq!(session.format_version, CURRENT_FORMAT_VERSION);
    }

    #[test]
    fn test_version_mismatch_still_loads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");

        let mut session = make_session();
        session.format_version = "2.0".to_string();
        session.save(&path).unwrap();

        let loaded = SessionRecord::load(&path).unwrap();
        assert_eq!(loaded.format_version, "2.0");
        assert_eq!(loaded.action_count(), 3);
    }
}
