//! Route handlers.

pub(crate) mod blocks;
pub(crate) mod health;
pub(crate) mod txs;
