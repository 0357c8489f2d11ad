//! webrecon-core: scope resolution and command scheduling for webrecon.
//!
//! - Address range expansion and in-scope membership testing
//! - DNS correlation of hostnames with in-scope addresses
//! - A bounded-concurrency scheduler for templated external commands
//! - Line-oriented target files handed to external tools

pub mod dns;
pub mod error;
pub mod range;
pub mod registry;
pub mod runner;
pub mod scheduler;
pub mod scope;
pub mod targets;
pub mod task;
pub mod template;

pub use dns::{DnsScope, HostnameMap, Resolver, ReverseMapper, SystemResolver};
pub use error::{ExpansionError, RegistryError, TargetFileError, ValidationError};
pub use range::ScopeTarget;
pub use registry::{CallbackRegistry, VariableRegistry};
pub use scheduler::{BatchReport, CommandScheduler, QueueSnapshot, SchedulerConfig};
pub use scope::{ScopeConfig, ScopeResolver};
pub use task::{TaskDescriptor, TaskSpec, TaskStatus};
