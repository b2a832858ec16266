pub mod auth;
pub mod cdp;
pub mod mcp;
pub mod rate_limiter;
pub mod scripted;


pub use auth::AuthLauncher;
pub use cdp::{CdpProbe, CdpVersion};
pub use mcp::{McpConnection, PlaywrightSession};
pub use rate_limiter::{GovernorConfig, GovernorStatus, RateGovernor, ThrottleReceipt};
pub use scripted::ScriptedPlatform;
