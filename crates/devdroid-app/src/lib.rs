//! # devdroid-app - Session Orchestration
//!
//! The dev-session pipeline and everything it leans on: LAN address
//! discovery, background-process supervision, artifact location, session
//! configuration, and OS signal handling.
//!
//! ## Public API
//!
//! ### Address Discovery (`netaddr`)
//! - [`resolve()`](netaddr::resolve) - Best-effort LAN address detection with
//!   virtual-adapter filtering
//! - [`NetworkAddress`], [`AddressSource`]
//!
//! ### Supervision (`supervisor`)
//! - [`ProcessSupervisor`] - Tracks background children, tears every one of
//!   them (and their descendants) down exactly once
//! - [`WaitHandle`] - Await a tracked process without owning it
//!
//! ### Pipeline (`session`)
//! - [`DevSession`] - The ordered stage machine: dev server, build, install,
//!   forward, launch, log stream
//! - [`PipelineStage`] - Stage identifiers, in execution order
//!
//! ### Support
//! - [`config::Config`] - `devdroid.toml` plus derived defaults
//! - [`artifact::locate_debug_apk()`] - Find the built debug APK
//! - [`signals::wait_for_signal()`] - Trap Ctrl-C / SIGTERM

pub mod artifact;
pub mod config;
pub mod netaddr;
pub mod session;
pub mod signals;
pub mod supervisor;

pub use config::Config;
pub use netaddr::{AddressSource, NetworkAddress};
pub use session::{DevSession, PipelineStage};
pub use supervisor::{ProcessSupervisor, WaitHandle};
