//! Persistence for agent state
//!
//! Alert history, devices, silence state and alert statuses are small documents that are
//! rewritten as a whole whenever they change. Each lives in its own JSON file inside the
//! data directory.
//!
//! ## Failure policy
//!
//! Persistence never takes the agent down. A missing file means "no state yet", a corrupt
//! one is logged and treated the same way, and failed writes are logged and retried on the
//! next change.

pub mod error;
pub mod file;

pub use error::{StorageError, StorageResult};
pub use file::StateFile;

pub const ALERT_HISTORY_FILE: &str = "alert_history.json";
pub const DEVICES_FILE: &str = "devices.json";
pub const SILENCE_FILE: &str = "silence.json";
pub const ALERT_STATES_FILE: &str = "alert_states.json";
