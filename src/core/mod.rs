pub mod gateway;
pub mod rate_limiter;
pub mod registry;
pub mod usage;

pub use gateway::{AdmissionError, ClientStats, GatewayService};
pub use rate_limiter::{Admission, LimitScope, SlidingWindowLimiter};
pub use registry::{ClientRecord, ClientRegistry, RegistryError};
pub use usage::{UsageRecord, UsageTracker};
