//! In-process state shared by every request.
//!
//! ## Stores
//!
//! - **rate_limit** - Per-client token buckets keyed by peer address
//! - **reaper** - Background sweep that drops idle clients from the registry
//!
//! The registry is an explicit value injected into the admission layer; there
//! is no global state. One mutex guards the whole map and is never held
//! across an `.await`.
//!
//! ```ignore
//! let registry = Arc::new(ClientRegistry::new(config.limiter_rps, config.limiter_burst));
//! let reaper = spawn_reaper(registry.clone(), config.limiter_cleanup_interval());
//! // ...
//! reaper.shutdown().await;
//! ```

mod rate_limit;
mod reaper;

pub use rate_limit::{Admission, ClientRegistry};
pub use reaper::{MAX_CLEANUP_INTERVAL, spawn_reaper};
