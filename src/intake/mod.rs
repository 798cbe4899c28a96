//! Intake flow — collects a name, a phone number and a thesis file.
//!
//! The submitter walks a fixed sequence of steps. The accepted document is
//! written to the uploads directory first and only then forwarded to the
//! reviewer, so a failed forward never loses a submission.

pub mod manager;
pub mod naming;
pub mod prompts;
pub mod relay;
pub mod state;
pub mod store;
pub mod validate;

pub use manager::{Clock, IntakeManager, Outcome};
pub use relay::{RelayNotifier, Submission};
pub use state::{Session, SessionState};
pub use store::FileStore;
