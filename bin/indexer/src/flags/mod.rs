//! Flags shared by the indexer subcommands.

mod globals;
pub use globals::GlobalArgs;

mod storage;
pub use storage::{StorageArgs, StorageKind};

mod broker;
pub use broker::{BrokerArgs, BrokerKind};
