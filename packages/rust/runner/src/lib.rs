//! Step Runner: supervises one worker command and reports its outcome.
//!
//! - [`classify`] decides success from exit code and output
//! - [`Redactor`] masks secrets line by line before output leaves the host
//! - [`CallbackClient`] delivers the single status callback
//! - [`StepRunner`] ties execution, classification, reporting and cleanup together

pub mod callback;
pub mod classify;
pub mod redact;
pub mod supervisor;

pub use callback::CallbackClient;
pub use classify::{Outcome, classify};
pub use redact::{RedactionRule, Redactor, truncate_tail};
pub use supervisor::{RunnerSettings, StepReport, StepRunner, WorkItem};
