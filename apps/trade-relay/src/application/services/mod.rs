//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `SubscriptionManager`: one upstream session, connect to close
//! - `TickRelay`: frame decode and publish hand-off
//! - `PublishDispatcher`: bounded publish worker pool
//! - `SessionSupervisor`: restarts failed sessions with backoff

pub mod dispatch;
pub mod error;
pub mod relay;
pub mod restart;
pub mod subscription;
pub mod supervisor;

pub use dispatch::{BackpressurePolicy, DispatchConfig, DrainReport, PublishDispatcher, SubmitOutcome};
pub use error::{RelayError, SubscribeError};
pub use relay::{DecodePolicy, FrameDisposition, TickRelay};
pub use restart::{RestartConfig, RestartPolicy};
pub use subscription::{DEFAULT_UPSTREAM_URL, SessionSettings, SubscriptionManager};
pub use supervisor::{SessionSupervisor, SupervisorHandle};
