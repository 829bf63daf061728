//! Ingestion cursor: where the next cycle starts reading.
//!
//! The cursor only lives in memory. A restart bootstraps it again.

use std::fmt;
use std::str::FromStr;

use starknet::core::types::{BlockId, BlockTag};

/// Absolute block or the symbolic chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockReference {
    Number(u64),
    Head,
}

impl BlockReference {
    pub fn as_block_id(&self) -> BlockId {
        match self {
            Self::Number(n) => BlockId::Number(*n),
            Self::Head => BlockId::Tag(BlockTag::Latest),
        }
    }
}

impl fmt::Display for BlockReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Head => write!(f, "latest"),
        }
    }
}

/// How the first cursor is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartBlock {
    /// Start at this block.
    Explicit(u64),
    /// Start at the head observed at startup.
    Latest,
    /// Start this many blocks behind the head observed at startup.
    Lookback(u64),
}

impl StartBlock {
    pub fn needs_head(&self) -> bool {
        !matches!(self, Self::Explicit(_))
    }

    /// First block to read given the current head. Lookback clamps at genesis.
    pub fn resolve(&self, head: u64) -> u64 {
        match self {
            Self::Explicit(block) => *block,
            Self::Latest => head,
            Self::Lookback(window) => head.saturating_sub(*window),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid start block {0:?}: expected a block number or \"latest\"")]
pub struct ParseStartBlockError(String);

impl FromStr for StartBlock {
    type Err = ParseStartBlockError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("latest") {
            return Ok(Self::Latest);
        }
        s.parse::<u64>()
            .map(Self::Explicit)
            .map_err(|_| ParseStartBlockError(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestionCursor {
    block: BlockReference,
    continuation_token: Option<String>,
}

impl IngestionCursor {
    pub fn at(block: u64) -> Self {
        Self {
            block: BlockReference::Number(block),
            continuation_token: None,
        }
    }

    pub fn block(&self) -> BlockReference {
        self.block
    }

    pub fn continuation_token(&self) -> Option<&str> {
        self.continuation_token.as_deref()
    }

    /// Records the token of the page just processed.
    pub fn set_continuation(&mut self, token: Option<String>) {
        self.continuation_token = token;
    }

    /// Moves to a freshly observed head at the end of a cycle.
    pub fn advance_to(&mut self, head: u64) {
        self.block = BlockReference::Number(head);
        self.continuation_token = None;
    }
}

impl fmt::Display for IngestionCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.continuation_token {
            Some(token) => write!(f, "{}@{token}", self.block),
            None => write!(f, "{}", self.block),
        }
    }
}
