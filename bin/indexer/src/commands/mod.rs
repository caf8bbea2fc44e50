//! Subcommands of the indexer binary.

mod node;
pub use node::NodeCommand;

mod seed;
pub use seed::SeedCommand;
