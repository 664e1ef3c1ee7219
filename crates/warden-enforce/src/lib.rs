pub mod directory;
pub mod memo;
pub mod orchestrator;
pub mod registry;

pub use orchestrator::{EnforceAllResult, EnforceRepoResult, Enforcer, PolicyTotals};
pub use registry::{Policy, PolicyOutcome, PolicyRegistry};
