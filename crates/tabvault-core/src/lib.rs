pub mod backup;
pub mod chunker;
pub mod codec;
pub mod compress;
pub mod config;
pub mod diff;
pub mod integrity;
pub mod meta;
pub mod migrate;
pub mod quota;
pub mod recovery;
pub mod session;
pub mod settings;
pub mod tier;

pub use config::EngineConfig;
pub use migrate::MigrationOutcome;
pub use recovery::RecoveryOutcome;
pub use session::{ErrorCode, LoadReport, LoadSource, SaveReport, SaveStatus, VaultSession};

#[cfg(test)]
mod tests;
#[cfg(test)]
mod testutil;
