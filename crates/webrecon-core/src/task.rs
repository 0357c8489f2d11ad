//! Task descriptors handed to the command scheduler.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Callback name meaning "no callback" in configuration files.
pub const NO_CALLBACK: &str = "none";

/// Lifecycle of a task: `queued → running → success | error`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Queued,
    Running,
    Success,
    Error,
}

impl TaskStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// A task as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSpec {
    pub name: String,

    /// Command line with `{{ .Key }}` placeholders.
    pub cmdline: String,

    /// Callback name; absent or `"none"` means no callback.
    #[serde(default, deserialize_with = "deserialize_callback")]
    pub callback: Option<String>,

    /// Extra environment for the spawned process.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

fn deserialize_callback<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|name| !name.is_empty() && name != NO_CALLBACK))
}

/// Fully resolved process invocation.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PreparedCommand {
    pub program: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
}

impl fmt::Display for PreparedCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(self.args.iter());
        let quoted: Vec<String> = words
            .map(|w| {
                shlex::try_quote(w)
                    .map(|q| q.into_owned())
                    .unwrap_or_else(|_| w.clone())
            })
            .collect();
        f.write_str(&quoted.join(" "))
    }
}

/// One unit of scheduled work and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub cmdline: String,
    pub callback: Option<String>,
    pub env: BTreeMap<String, String>,
    pub status: TaskStatus,
    /// Combined stdout/stderr, or a failure description.
    pub output: String,
    /// File the task's command writes its results to, when a variable
    /// generator assigned one.
    pub output_file: Option<PathBuf>,
    /// Identifier within the collection currently holding the task.
    pub qid: Option<u64>,
    pub command: Option<PreparedCommand>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, cmdline: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmdline: cmdline.into(),
            callback: None,
            env: BTreeMap::new(),
            status: TaskStatus::Queued,
            output: String::new(),
            output_file: None,
            qid: None,
            command: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn with_callback(mut self, callback: impl Into<String>) -> Self {
        let callback = callback.into();
        self.callback = (callback != NO_CALLBACK).then_some(callback);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// The bound callback, treating the `"none"` sentinel as absent.
    pub fn callback_name(&self) -> Option<&str> {
        self.callback
            .as_deref()
            .filter(|name| !name.is_empty() && *name != NO_CALLBACK)
    }

    /// Wall-clock run time, once finished.
    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

impl From<TaskSpec> for TaskDescriptor {
    fn from(spec: TaskSpec) -> Self {
        let mut task = TaskDescriptor::new(spec.name, spec.cmdline);
        task.callback = spec.callback;
        task.env = spec.env;
        task
    }
}

impl From<&TaskSpec> for TaskDescriptor {
    fn from(spec: &TaskSpec) -> Self {
        spec.clone().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_display() {
        assert_eq!(TaskStatus::Queued.to_string(), "queued");
        assert_eq!(TaskStatus::Error.to_string(), "error");
        assert!(TaskStatus::Success.is_finished());
        assert!(!TaskStatus::Running.is_finished());
    }

    #[test]
    fn test_callback_sentinel() {
        let task = TaskDescriptor::new("a", "true").with_callback("none");
        assert_eq!(task.callback, None);
        let task = TaskDescriptor::new("a", "true").with_callback("domains");
        assert_eq!(task.callback_name(), Some("domains"));

        let mut task = TaskDescriptor::new("a", "true");
        task.callback = Some(NO_CALLBACK.to_string());
        assert_eq!(task.callback_name(), None);
    }

    #[test]
    fn test_prepared_command_display_quotes() {
        let cmd = PreparedCommand {
            program: "echo".into(),
            args: vec!["a b".into(), "c".into()],
            env: BTreeMap::new(),
        };
        assert_eq!(cmd.to_string(), "echo 'a b' c");
    }
}
