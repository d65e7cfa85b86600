//! Record async method calls once, replay them deterministically afterwards.
//!
//! ```no_run
//! use rock::{Method, SessionConfig, Target};
//! use serde_json::json;
//!
//! # async fn demo() -> Result<(), rock::RockError> {
//! let api = Target::new("api").with_method(
//!     "fetch",
//!     Method::new(|args| async move { Ok(json!({"id": args[0]})) }),
//! );
//!
//! let session = rock::begin_session(
//!     "fetch user",
//!     SessionConfig::record().with_storage_dir(rock::fixture_dir!()),
//! )?;
//! session.intercept(&api, "fetch")?;
//! let user = api.call("fetch", vec![json!(1)]).await?;
//! session.complete_recording()?;
//! # let _ = user;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod errors;
pub mod fixture;
pub mod logging;
pub mod registry;
pub mod replay;
pub mod runtime;
pub mod session;
pub mod target;

pub use config::{ModeRequest, SessionConfig, TimingConfig};
pub use errors::{MethodError, RockError};
pub use registry::Registry;
pub use session::{Mode, PassThroughReason, Session};
pub use target::{Args, Call, Method, Target};

/// Begins a session and registers it with the global registry.
pub fn begin_session(name: &str, config: SessionConfig) -> Result<Session, RockError> {
    Registry::global().begin(name, config)
}

/// Restores every session registered with the global registry.
pub fn clear_all() {
    Registry::global().clear_all();
}
