//! Bounded-concurrency command scheduler.
//!
//! Tasks are admitted into a running collection while it holds fewer than
//! `max_threads` entries and into a waiting collection otherwise. Each
//! running entry is driven by one tokio task; when it finishes (process,
//! then callback) it leaves the running collection and, under the same
//! lock, promotes the lowest-numbered waiting task into its slot.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ValidationError;
use crate::registry::{CallbackRegistry, VariableRegistry};
use crate::runner;
use crate::task::{PreparedCommand, TaskDescriptor, TaskStatus};
use crate::template::CommandTemplate;

/// Output recorded on a task whose callback failed.
pub const CALLBACK_FAILED: &str = "callback failed";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Maximum number of tasks in the running collection.
    pub max_threads: usize,
}

impl SchedulerConfig {
    pub fn new(max_threads: usize) -> Self {
        Self {
            max_threads: max_threads.max(1),
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::new(5)
    }
}

/// One entry of a queue snapshot.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueEntry {
    pub qid: u64,
    pub name: String,
    pub status: TaskStatus,
}

/// Copy of both collections, each ordered by queue identifier.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub running: Vec<QueueEntry>,
    pub waiting: Vec<QueueEntry>,
}

impl QueueSnapshot {
    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.waiting.is_empty()
    }

    pub fn status_of(&self, name: &str) -> Option<TaskStatus> {
        self.running
            .iter()
            .chain(self.waiting.iter())
            .find(|e| e.name == name)
            .map(|e| e.status)
    }
}

/// Completed tasks of one batch, in completion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub tasks: Vec<TaskDescriptor>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.count(TaskStatus::Success)
    }

    pub fn failed(&self) -> usize {
        self.count(TaskStatus::Error)
    }

    pub fn get(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.iter().find(|t| t.name == name)
    }

    fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|t| t.status == status).count()
    }
}

struct Slot {
    task: TaskDescriptor,
    done: mpsc::UnboundedSender<TaskDescriptor>,
}

#[derive(Default)]
struct Queues {
    running: BTreeMap<u64, Slot>,
    waiting: BTreeMap<u64, Slot>,
    last_running_id: u64,
    last_waiting_id: u64,
}

impl Queues {
    fn admit_running(&mut self, mut slot: Slot) -> u64 {
        self.last_running_id += 1;
        let qid = self.last_running_id;
        slot.task.qid = Some(qid);
        slot.task.status = TaskStatus::Running;
        self.running.insert(qid, slot);
        qid
    }

    fn admit_waiting(&mut self, mut slot: Slot) -> u64 {
        self.last_waiting_id += 1;
        let qid = self.last_waiting_id;
        slot.task.qid = Some(qid);
        slot.task.status = TaskStatus::Queued;
        self.waiting.insert(qid, slot);
        qid
    }

    /// Move the lowest-numbered waiting task into the running collection
    /// if there is room.
    fn promote(&mut self, max_threads: usize) -> Option<(u64, String)> {
        if self.running.len() >= max_threads {
            return None;
        }
        let (_, slot) = self.waiting.pop_first()?;
        let name = slot.task.name.clone();
        Some((self.admit_running(slot), name))
    }
}

struct Inner {
    config: SchedulerConfig,
    variables: VariableRegistry,
    callbacks: CallbackRegistry,
    queues: Mutex<Queues>,
}

/// Runs task batches against a fixed variable and callback table.
///
/// Cloning yields another handle to the same queues.
#[derive(Clone)]
pub struct CommandScheduler {
    inner: Arc<Inner>,
}

impl CommandScheduler {
    pub fn new(
        config: &SchedulerConfig,
        variables: VariableRegistry,
        callbacks: CallbackRegistry,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config: SchedulerConfig::new(config.max_threads),
                variables,
                callbacks,
                queues: Mutex::new(Queues::default()),
            }),
        }
    }

    pub fn max_threads(&self) -> usize {
        self.inner.config.max_threads
    }

    /// Check every task's callback and placeholders against the bound
    /// tables. Nothing is executed.
    pub fn validate(&self, tasks: &[TaskDescriptor]) -> Result<(), ValidationError> {
        for task in tasks {
            if let Some(callback) = task.callback_name() {
                if !self.inner.callbacks.contains(callback) {
                    return Err(ValidationError::UnknownCallback {
                        task: task.name.clone(),
                        callback: callback.to_string(),
                    });
                }
            }

            let template = CommandTemplate::parse(&task.cmdline).map_err(|e| {
                ValidationError::MalformedTemplate {
                    task: task.name.clone(),
                    reason: e.to_string(),
                }
            })?;
            for key in template.placeholders() {
                if !self.inner.variables.contains(key) {
                    return Err(ValidationError::UnknownVariable {
                        task: task.name.clone(),
                        variable: key.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Run a batch with at most `max_threads` tasks executing at once.
    ///
    /// Returns after every task of the batch has finished and left the
    /// collections. Individual task failures are recorded in the report.
    pub async fn run_bounded(
        &self,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<BatchReport, ValidationError> {
        self.validate(&tasks)?;

        let total = tasks.len();
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        for task in tasks {
            let task = self.prepared(task).await;
            let name = task.name.clone();
            let slot = Slot {
                task,
                done: done_tx.clone(),
            };

            let started = {
                let mut queues = self.inner.lock();
                if queues.running.len() < self.inner.config.max_threads {
                    Some(queues.admit_running(slot))
                } else {
                    let qid = queues.admit_waiting(slot);
                    tracing::debug!(task = %name, qid, "Queueing task");
                    None
                }
            };

            if let Some(qid) = started {
                tracing::debug!(task = %name, qid, "Starting task");
                tokio::spawn(drive_slot(Arc::clone(&self.inner), qid));
            }
        }
        drop(done_tx);

        let mut report = BatchReport::default();
        while report.tasks.len() < total {
            match done_rx.recv().await {
                Some(task) => report.tasks.push(task),
                None => break,
            }
        }

        tracing::info!(
            total,
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Batch complete"
        );
        Ok(report)
    }

    /// Run a batch one task at a time, in order, on the caller's task.
    pub async fn run_sequential(
        &self,
        tasks: Vec<TaskDescriptor>,
    ) -> Result<BatchReport, ValidationError> {
        self.validate(&tasks)?;

        let mut report = BatchReport::default();
        for task in tasks {
            let mut task = self.prepared(task).await;
            task.status = TaskStatus::Running;
            tracing::debug!(task = %task.name, "Starting task");
            let task = self.inner.execute(task, None).await;
            report.tasks.push(task);
        }

        tracing::info!(
            total = report.tasks.len(),
            succeeded = report.succeeded(),
            failed = report.failed(),
            "Sequential batch complete"
        );
        Ok(report)
    }

    /// Resolve a task's variables on the blocking pool; generators write
    /// target files. A panicking generator fails only its task.
    async fn prepared(&self, task: TaskDescriptor) -> TaskDescriptor {
        let fallback = task.clone();
        let inner = Arc::clone(&self.inner);
        let result = tokio::task::spawn_blocking(move || {
            let mut task = task;
            inner.prepare(&mut task);
            task
        })
        .await;

        match result {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!(task = %fallback.name, error = %e, "Task preparation failed");
                let mut task = fallback;
                task.status = TaskStatus::Queued;
                task.output = format!("Variable resolution failed: {e}");
                task.output_file = None;
                task.qid = None;
                task.command = None;
                task.started_at = None;
                task.finished_at = None;
                task
            }
        }
    }

    /// Consistent copy of the running and waiting collections.
    pub fn snapshot(&self) -> QueueSnapshot {
        let queues = self.inner.lock();
        let entries = |map: &BTreeMap<u64, Slot>| {
            map.iter()
                .map(|(qid, slot)| QueueEntry {
                    qid: *qid,
                    name: slot.task.name.clone(),
                    status: slot.task.status,
                })
                .collect()
        };
        QueueSnapshot {
            running: entries(&queues.running),
            waiting: entries(&queues.waiting),
        }
    }

    /// The waiting task that will be promoted next.
    pub fn next_waiting(&self) -> Option<QueueEntry> {
        let queues = self.inner.lock();
        queues.waiting.iter().next().map(|(qid, slot)| QueueEntry {
            qid: *qid,
            name: slot.task.name.clone(),
            status: slot.task.status,
        })
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Queues> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolve placeholders and build the process invocation.
    ///
    /// On failure the task keeps no command and carries the reason in its
    /// output; it will be reported as an error without being executed.
    fn prepare(&self, task: &mut TaskDescriptor) {
        task.status = TaskStatus::Queued;
        task.output.clear();
        task.output_file = None;
        task.qid = None;
        task.started_at = None;
        task.finished_at = None;
        task.command = match self.build_command(task) {
            Ok(cmd) => Some(cmd),
            Err(reason) => {
                tracing::warn!(task = %task.name, %reason, "Task preparation failed");
                task.output = reason;
                None
            }
        };
    }

    fn build_command(&self, task: &mut TaskDescriptor) -> Result<PreparedCommand, String> {
        let template = CommandTemplate::parse(&task.cmdline)
            .map_err(|e| format!("Malformed command template: {e}"))?;

        let mut values = HashMap::new();
        for key in template.placeholders() {
            let generator = self
                .variables
                .get(key)
                .ok_or_else(|| format!("Variable '{key}' is not registered"))?;
            let value =
                generator(task).map_err(|e| format!("Variable '{key}' failed: {e:#}"))?;
            values.insert(key.clone(), value);
        }

        let mut argv = template.render(&values).into_iter();
        let program = argv.next().unwrap_or_default();
        Ok(PreparedCommand {
            program,
            args: argv.collect(),
            env: task.env.clone(),
        })
    }

    /// Run the task's process and callback. `qid` is the task's running
    /// slot, if it has one, so its intermediate status stays observable.
    async fn execute(&self, mut task: TaskDescriptor, qid: Option<u64>) -> TaskDescriptor {
        task.started_at = Some(Utc::now());

        match task.command.as_ref() {
            Some(cmd) => {
                let outcome = runner::run_process(cmd).await;
                task.status = outcome.status;
                task.output = outcome.output;
            }
            None => task.status = TaskStatus::Error,
        }
        tracing::info!(task = %task.name, status = %task.status, "Task finished");

        if let Some(qid) = qid {
            if let Some(slot) = self.lock().running.get_mut(&qid) {
                slot.task.status = task.status;
            }
        }

        if let Some(name) = task.callback_name().map(str::to_string) {
            if let Some(callback) = self.callbacks.get(&name).cloned() {
                // Own task, so a panicking callback only fails this task.
                let result = tokio::spawn(callback(task.clone())).await;
                let failure = match result {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some(format!("{e:#}")),
                    Err(e) => Some(e.to_string()),
                };
                if let Some(error) = failure {
                    tracing::warn!(task = %task.name, callback = %name, %error, "Callback failed");
                    task.status = TaskStatus::Error;
                    task.output = CALLBACK_FAILED.to_string();
                }
            }
        }

        task.finished_at = Some(Utc::now());
        task
    }
}

/// Drive one running slot until no waiting task can take it over.
async fn drive_slot(inner: Arc<Inner>, mut qid: u64) {
    loop {
        let task = match inner.lock().running.get(&qid) {
            Some(slot) => slot.task.clone(),
            None => break,
        };

        let task = inner.execute(task, Some(qid)).await;

        let (done, next) = {
            let mut queues = inner.lock();
            let done = queues.running.remove(&qid).map(|slot| slot.done);
            (done, queues.promote(inner.config.max_threads))
        };

        if let Some(done) = done {
            // The batch may have been dropped; nothing left to notify.
            let _ = done.send(task);
        }

        match next {
            Some((next_qid, name)) => {
                tracing::debug!(task = %name, qid = next_qid, "Promoting queued task");
                qid = next_qid;
            }
            None => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(max: usize) -> CommandScheduler {
        let variables = VariableRegistry::new()
            .with("Word", |_| Ok("hello world".to_string()))
            .unwrap();
        let callbacks = CallbackRegistry::new()
            .with("ok", |_| async { Ok(()) })
            .unwrap();
        CommandScheduler::new(&SchedulerConfig::new(max), variables, callbacks)
    }

    #[test]
    fn test_config_clamps_to_one() {
        assert_eq!(SchedulerConfig::new(0).max_threads, 1);
        assert_eq!(SchedulerConfig::default().max_threads, 5);
    }

    #[test]
    fn test_queue_ids_are_monotonic_per_collection() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = |name: &str| Slot {
            task: TaskDescriptor::new(name, "true"),
            done: tx.clone(),
        };
        let mut queues = Queues::default();
        assert_eq!(queues.admit_running(slot("a")), 1);
        assert_eq!(queues.admit_waiting(slot("b")), 1);
        assert_eq!(queues.admit_waiting(slot("c")), 2);
        queues.running.remove(&1);
        assert_eq!(queues.promote(1), Some((2, "b".to_string())));
        assert_eq!(queues.promote(1), None);
        queues.running.remove(&2);
        assert_eq!(queues.promote(1), Some((3, "c".to_string())));
        assert!(queues.waiting.is_empty());
        assert_eq!(queues.admit_waiting(slot("d")), 3);
    }

    #[test]
    fn test_validate_accepts_bound_tasks() {
        let s = scheduler(2);
        let tasks = vec![
            TaskDescriptor::new("a", "echo {{ .Word }}").with_callback("ok"),
            TaskDescriptor::new("b", "true").with_callback("none"),
        ];
        assert_eq!(s.validate(&tasks), Ok(()));
    }

    #[test]
    fn test_validate_rejects_unknown_bindings() {
        let s = scheduler(2);
        let err = s
            .validate(&[
                TaskDescriptor::new("a", "true"),
                TaskDescriptor::new("b", "true").with_callback("missing"),
            ])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownCallback {
                task: "b".into(),
                callback: "missing".into()
            }
        );

        let err = s
            .validate(&[TaskDescriptor::new("c", "cat {{ .Nope }}")])
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownVariable {
                task: "c".into(),
                variable: "Nope".into()
            }
        );

        assert!(matches!(
            s.validate(&[TaskDescriptor::new("d", "echo 'open")]),
            Err(ValidationError::MalformedTemplate { .. })
        ));
    }

    #[test]
    fn test_prepare_substitutes_into_single_argument() {
        let s = scheduler(1);
        let mut task = TaskDescriptor::new("a", "echo {{ .Word }}!").with_env("K", "V");
        s.inner.prepare(&mut task);
        let cmd = task.command.unwrap();
        assert_eq!(cmd.program, "echo");
        assert_eq!(cmd.args, vec!["hello world!"]);
        assert_eq!(cmd.env.get("K").map(String::as_str), Some("V"));
    }

    #[tokio::test]
    async fn test_run_sequential_in_order() {
        let s = scheduler(1);
        let report = s
            .run_sequential(vec![
                TaskDescriptor::new("first", "echo {{ .Word }}"),
                TaskDescriptor::new("second", "false"),
            ])
            .await
            .unwrap();
        let names: Vec<_> = report.tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(report.tasks[0].status, TaskStatus::Success);
        assert_eq!(report.tasks[0].output, "hello world\n");
        assert_eq!(report.tasks[1].status, TaskStatus::Error);
        assert!(s.snapshot().is_idle());
    }
}
