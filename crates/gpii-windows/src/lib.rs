//! Windows platform bindings: every native call the supervisor core needs,
//! behind the collaborator traits in `gpii_core::traits`. Each module gates
//! its own Win32 calls with `#[cfg(target_os = "windows")]` internally and
//! provides a non-Windows stub, so the crate builds (with inert fallbacks)
//! on any host — only a real Windows target exercises the native paths.
//!
//! Components, matching the module layout below:
//!   elevation       UAC elevation check, for the install/uninstall CLI path
//!   handle          RAII wrapper for raw `HANDLE`s
//!   token           component B: session/user token acquisition
//!   environment     per-user environment block construction
//!   session         component B: the `TokenProvider` implementation
//!   process_table   process ancestry, for peer authentication
//!   tcp_table       TCP connection table, for peer authentication
//!   pipe            component C: named-pipe IPC transport
//!   tcp_transport   component C: loopback-TCP IPC transport (fallback)
//!   launcher        component D: cross-session process creation
//!   child           component D: the `ChildLauncher` implementation
//!   pidfile         component E: external-instance detection
//!   service         component G: SCM install/uninstall and dispatch

pub mod elevation;
pub mod handle;
pub mod token;
pub mod environment;
pub mod session;
pub mod process_table;
pub mod tcp_table;
pub mod pipe;
pub mod tcp_transport;
pub mod launcher;
pub mod child;
pub mod pidfile;
pub mod service;

pub use child::WindowsChildLauncher;
pub use pidfile::{PidFileProbe, WindowsProcessProbe};
pub use service::WindowsServiceManager;
pub use session::{HostRole, SessionTokenManager};
