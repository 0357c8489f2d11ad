//! Named variable generators and task callbacks.
//!
//! Both tables reject bad names and duplicates at registration, and keep
//! bindings in registration order.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::RegistryError;
use crate::task::{TaskDescriptor, NO_CALLBACK};

/// Produces the substitution text for one placeholder of a task.
///
/// May record side information on the task (e.g. its output file).
pub type VariableFn = Arc<dyn Fn(&mut TaskDescriptor) -> anyhow::Result<String> + Send + Sync>;

pub type CallbackFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Invoked with a completed task; an `Err` marks the task failed.
pub type CallbackFn = Arc<dyn Fn(TaskDescriptor) -> CallbackFuture + Send + Sync>;

fn check_name(name: &str, taken: impl Fn(&str) -> bool) -> Result<(), RegistryError> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !valid {
        return Err(RegistryError::InvalidName(name.to_string()));
    }
    if taken(name) {
        return Err(RegistryError::Duplicate(name.to_string()));
    }
    Ok(())
}

#[derive(Clone, Default)]
pub struct VariableRegistry {
    bindings: Vec<(String, VariableFn)>,
}

impl VariableRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut TaskDescriptor) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        check_name(name, |n| self.contains(n))?;
        self.bindings.push((name.to_string(), Arc::new(f)));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F>(mut self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(&mut TaskDescriptor) -> anyhow::Result<String> + Send + Sync + 'static,
    {
        self.register(name, f)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&VariableFn> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for VariableRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[derive(Clone, Default)]
pub struct CallbackRegistry {
    bindings: Vec<(String, CallbackFn)>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F, Fut>(&mut self, name: &str, f: F) -> Result<(), RegistryError>
    where
        F: Fn(TaskDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        if name == NO_CALLBACK {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        check_name(name, |n| self.contains(n))?;
        let boxed: CallbackFn = Arc::new(move |task| Box::pin(f(task)) as CallbackFuture);
        self.bindings.push((name.to_string(), boxed));
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<F, Fut>(mut self, name: &str, f: F) -> Result<Self, RegistryError>
    where
        F: Fn(TaskDescriptor) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(name, f)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&CallbackFn> {
        self.bindings
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, f)| f)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.bindings.iter().map(|(n, _)| n.as_str())
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_registration_rules() {
        let mut vars = VariableRegistry::new();
        vars.register("OutFile", |_| Ok("out".into())).unwrap();
        assert_eq!(
            vars.register("OutFile", |_| Ok("again".into())),
            Err(RegistryError::Duplicate("OutFile".into()))
        );
        assert_eq!(
            vars.register("Out File", |_| Ok(String::new())),
            Err(RegistryError::InvalidName("Out File".into()))
        );
        assert_eq!(
            vars.register("", |_| Ok(String::new())),
            Err(RegistryError::InvalidName(String::new()))
        );
        assert!(vars.contains("OutFile"));
        assert!(!vars.contains("IPFile"));
    }

    #[test]
    fn test_variable_generator_can_annotate_task() {
        let vars = VariableRegistry::new()
            .with("OutFile", |task| {
                task.output_file = Some(format!("/tmp/{}", task.name).into());
                Ok(format!("/tmp/{}", task.name))
            })
            .unwrap();
        let mut task = TaskDescriptor::new("amass", "amass -o {{ .OutFile }}");
        let value = (vars.get("OutFile").unwrap())(&mut task).unwrap();
        assert_eq!(value, "/tmp/amass");
        assert_eq!(task.output_file, Some("/tmp/amass".into()));
    }

    #[test]
    fn test_callback_names() {
        let callbacks = CallbackRegistry::new()
            .with("domains", |_| async { Ok(()) })
            .unwrap()
            .with("print", |_| async { Ok(()) })
            .unwrap();
        assert_eq!(callbacks.names().collect::<Vec<_>>(), vec!["domains", "print"]);

        let mut callbacks = callbacks;
        assert_eq!(
            callbacks.register("none", |_| async { Ok(()) }),
            Err(RegistryError::InvalidName("none".into()))
        );
    }

    #[tokio::test]
    async fn test_callback_invocation() {
        let callbacks = CallbackRegistry::new()
            .with("fail", |task: TaskDescriptor| async move {
                anyhow::bail!("{} failed", task.name)
            })
            .unwrap();
        let cb = callbacks.get("fail").unwrap().clone();
        let err = cb(TaskDescriptor::new("t", "true")).await.unwrap_err();
        assert_eq!(err.to_string(), "t failed");
    }
}
