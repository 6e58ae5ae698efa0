//! Resource types handled by the provider.

mod bork;
mod condition;
mod meta;
mod provider_config;

pub use bork::*;
pub use condition::*;
pub use meta::*;
pub use provider_config::*;
