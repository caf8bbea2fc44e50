use derive_more::Display;

/// One of the two logical channels records are published on.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Block records.
    #[display("blocks")]
    Blocks,
    /// Transaction records.
    #[display("transactions")]
    Transactions,
}

/// Broker-side names of the two channels.
///
/// Fixed for the lifetime of a deployment and handed to every publisher and subscriber at
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    /// Name of the block channel.
    pub blocks: String,
    /// Name of the transaction channel.
    pub transactions: String,
}

impl Default for Topics {
    fn default() -> Self {
        Self { blocks: "blocks".to_string(), transactions: "transactions".to_string() }
    }
}

impl Topics {
    /// Creates a topic mapping from explicit names.
    pub fn new(blocks: impl Into<String>, transactions: impl Into<String>) -> Self {
        Self { blocks: blocks.into(), transactions: transactions.into() }
    }

    /// Returns the broker-side name of `topic`.
    pub fn name(&self, topic: Topic) -> &str {
        match topic {
            Topic::Blocks => &self.blocks,
            Topic::Transactions => &self.transactions,
        }
    }

    /// Maps a broker-side name back to its [`Topic`].
    pub fn resolve(&self, name: &str) -> Option<Topic> {
        if name == self.blocks {
            Some(Topic::Blocks)
        } else if name == self.transactions {
            Some(Topic::Transactions)
        } else {
            None
        }
    }

    /// Both names, block channel first.
    pub fn names(&self) -> [&str; 2] {
        [&self.blocks, &self.transactions]
    }
}
