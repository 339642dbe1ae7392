//! JSON payload shapes persisted at well-known sub-paths (§6.3).
use serde::{Deserialize, Serialize};

use clusterlib_common::time::current_time_msecs;

/// `currentState`/`desiredState` payload: a named state plus the
/// wall-clock moment it was set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub state: String,
    #[serde(rename = "setMsecs")]
    pub set_msecs: i64,
    #[serde(rename = "setMsecsAsDate")]
    pub set_msecs_as_date: String,
}

impl State {
    pub fn now(state: impl Into<String>) -> Self {
        let set_msecs = current_time_msecs() as i64;
        State {
            state: state.into(),
            set_msecs,
            set_msecs_as_date: render_msecs_as_date(set_msecs),
        }
    }
}

fn render_msecs_as_date(msecs: i64) -> String {
    chrono::DateTime::from_timestamp_millis(msecs)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}

/// The six process-slot states named in the data model; the narrower
/// set than `PropertyList`'s superset of lifecycle strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProcessState {
    Initial,
    Started,
    Running,
    Finished,
    Failed,
    Stopped,
}

impl Default for ProcessState {
    fn default() -> Self {
        ProcessState::Initial
    }
}

/// Process-info payload stored alongside a ProcessSlot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub command: Vec<String>,
    #[serde(rename = "addEnv")]
    pub add_env: Vec<String>,
    pub path: String,
    pub pid: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_json_round_trips() {
        let s = State::now("RUNNING");
        let encoded = serde_json::to_string(&s).unwrap();
        let decoded: State = serde_json::from_str(&encoded).unwrap();
        assert_eq!(s, decoded);
    }

    #[test]
    fn process_state_serializes_uppercase() {
        assert_eq!(serde_json::to_string(&ProcessState::Running).unwrap(), "\"RUNNING\"");
        let decoded: ProcessState = serde_json::from_str("\"FAILED\"").unwrap();
        assert_eq!(decoded, ProcessState::Failed);
    }

    #[test]
    fn process_info_json_round_trips() {
        let info = ProcessInfo {
            command: vec!["run".into(), "--flag".into()],
            add_env: vec!["KEY=value".into()],
            path: "/bin/run".into(),
            pid: 4242,
        };
        let encoded = serde_json::to_string(&info).unwrap();
        let decoded: ProcessInfo = serde_json::from_str(&encoded).unwrap();
        assert_eq!(info, decoded);
    }
}
