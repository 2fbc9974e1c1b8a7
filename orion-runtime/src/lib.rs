pub mod chain;
pub mod clock;
pub mod commands;
pub mod config;
pub mod contracts;
pub mod dispatcher;
pub mod error;
pub mod fees;
pub mod intent;
pub mod revert;
pub mod signer;
pub mod types;
pub mod vault_client;

pub use error::VaultError;
pub use intent::AllocationIntent;
pub use types::*;
