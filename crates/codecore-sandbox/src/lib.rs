//! CodeCore Sandbox
//!
//! Runs user code in an isolated, instrumented execution context and keeps
//! the host application out of reach of whatever that code does.
//!
//! # Components
//!
//! - [`Sandbox`]: resolve profile, synthesize document, hand it to the host
//! - [`IsolationHost`]: replaces the one active context per load
//!   - [`HeadlessSurface`]: QuickJS context with a minimal page shim
//!   - [`FileSurface`]: atomically rewritten document file
//! - [`ExecutionTrigger`]: explicit, selection-change and debounced-edit runs
//! - [`StatusIndicator`]: transient status that reverts to `Ready`
//! - [`StateStore`]: persisted source text and selection
//!
//! # Example
//!
//! ```rust,no_run
//! use codecore_document::SourceText;
//! use codecore_profile::Selection;
//! use codecore_sandbox::{HeadlessSurface, Sandbox};
//!
//! # async fn demo() -> Result<(), codecore_sandbox::SandboxError> {
//! let sandbox = Sandbox::new(HeadlessSurface::default())?;
//! sandbox.run(&SourceText::from("console.log('hi', 42)"), &Selection::Auto).await?;
//!
//! let context = sandbox.host().settled().await.unwrap();
//! assert_eq!(context.capture.lines(), vec!["hi 42"]);
//! assert!(!context.capture.error_visible());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod capture;
pub mod config;
pub mod error;
pub mod file_surface;
pub mod headless;
pub mod host;
pub mod logging;
pub mod sandbox;
pub mod status;
pub mod store;
pub mod trigger;

// Re-exports
pub use capture::{
    CaptureSink, ChannelCall, ChannelLevel, ConsoleDelegate, ContextId, RecordingDelegate,
    TracingDelegate,
};
pub use config::SandboxConfig;
pub use error::{ConfigError, HostError, Result, SandboxError, StoreError};
pub use file_surface::FileSurface;
pub use headless::{ContextOutcome, ExecutionContext, HeadlessConfig, HeadlessSurface};
pub use host::IsolationHost;
pub use logging::LogFormat;
pub use sandbox::{RunCause, RunReport, Sandbox};
pub use status::StatusIndicator;
pub use store::{EditorState, JsonFileStore, MemoryStore, StateStore, StorageKeys};
pub use trigger::{Debouncer, ExecutionTrigger, RunEvent, TriggerEvent, TriggerHandle, TriggerState};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running sandboxes
    pub use crate::{
        ExecutionTrigger, HeadlessSurface, IsolationHost, Sandbox, SandboxConfig, SandboxError,
        StateStore, TriggerEvent,
    };
    pub use codecore_document::SourceText;
    pub use codecore_profile::Selection;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
