//! Grammar and negotiation error types.

use std::num::ParseIntError;

use thiserror::Error;

use crate::advertisement::Direction;

/// Result type for grammar operations.
pub type GrammarResult<T> = Result<T, GrammarError>;

/// Malformed advertisement or directive text.
///
/// Line numbers are zero-based, counted over every line of the input
/// including blank ones.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// The advertisement contained no capability lines.
    #[error("empty advertisement")]
    EmptyAdvertisement,

    /// A capability line is missing the id, direction or codec slot.
    #[error("line [{line}] misses minimally required slots (got {found} tokens)")]
    MissingSlots { line: usize, found: usize },

    /// The capability id is not a non-negative integer.
    #[error("line [{line}] has invalid capability id {token:?}: {source}")]
    InvalidCapabilityId {
        line: usize,
        token: String,
        #[source]
        source: ParseIntError,
    },

    /// The direction token is neither `in` nor `out`.
    #[error("line [{line}] malformed direction {token:?}")]
    InvalidDirection { line: usize, token: String },

    /// The same id and direction were declared twice.
    #[error("line [{line}] redeclares capability {id} {direction}")]
    DuplicateCapability {
        line: usize,
        id: u32,
        direction: Direction,
    },

    /// A directive without the `:` between endpoints and codec.
    #[error("directive {0:?} lacks a ':' separator")]
    MissingCodecSeparator(String),

    /// A directive whose endpoints are not joined by `to`.
    #[error("directive {0:?} lacks a 'to' between endpoints")]
    MissingTo(String),

    /// A directive endpoint that is not an integer.
    #[error("directive endpoint {token:?} is not an integer: {source}")]
    InvalidEndpoint {
        token: String,
        #[source]
        source: ParseIntError,
    },
}

/// Why two advertisements could not be matched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// One side did not parse.
    #[error("advertisement grammar: {0}")]
    Grammar(#[from] GrammarError),

    /// Both sides parsed but share no direction/codec pair.
    #[error("no matching capabilities found")]
    NoCapabilityMatch,
}
