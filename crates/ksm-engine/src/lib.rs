pub mod dispatch;
pub mod engine;
pub mod field_safety;
pub mod ratelimit;
pub mod session;
pub mod tools;

pub use engine::{EngineError, EngineMode, ToolEngine};
pub use ratelimit::RateLimiter;
pub use session::{CapabilityFactory, SessionState};
