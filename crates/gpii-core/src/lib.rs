//! Platform-agnostic core: the wire framing, the restart policy, the event bus,
//! and the supervisor state machine that the Windows binding layer drives.
//!
//! Nothing in this crate touches an OS handle. `gpii-windows` owns every native
//! call; this crate owns the decisions made from their results.

pub mod config;
pub mod error;
pub mod eventbus;
pub mod ledger;
pub mod message;
pub mod pipe_name;
pub mod state;
pub mod supervisor;
pub mod traits;

pub use config::SupervisorConfig;
pub use error::{OsError, SupervisorError};
pub use eventbus::EventBus;
pub use ledger::RestartLedger;
pub use message::Message;
pub use state::{Action, Event, SessionChangeKind, SupervisorState};
pub use supervisor::Supervisor;
