//! Errors raised while validating inputs to the DP engine.
//!
//! Inconsistencies inside the algorithms themselves are programming defects and
//! panic instead; see the traceback routines.
use crate::trace::State;
use thiserror::Error;

/// Recoverable input and model validation failures.
#[derive(Debug, Error)]
pub enum Plan7Error {
    /// A sequence byte is not a symbol of the alphabet.
    #[error("unrecognized residue {byte:?} at position {pos}")]
    InvalidResidue { byte: char, pos: usize },

    /// The model has zero nodes.
    #[error("model has no nodes")]
    EmptyModel,

    /// A table of the model has the wrong dimensions.
    #[error("model shape mismatch: {0}")]
    Shape(String),

    /// A probability lies outside [0, 1] or is not finite.
    #[error("invalid probability {value} in {what} of node {node}")]
    InvalidProbability {
        what: &'static str,
        node: usize,
        value: f32,
    },

    /// A distribution of the model does not sum to one.
    #[error("{what} of node {node} sums to {sum}")]
    Unnormalized {
        what: &'static str,
        node: usize,
        sum: f32,
    },

    /// The alignment handed to consensus construction is empty.
    #[error("alignment has no rows")]
    EmptyAlignment,

    /// Alignment rows differ in length.
    #[error("alignment row {row} has {len} columns, expected {expected}")]
    RaggedAlignment {
        row: usize,
        len: usize,
        expected: usize,
    },

    /// Number of sequence weights differs from the number of rows.
    #[error("{weights} weights given for {rows} alignment rows")]
    WeightCount { weights: usize, rows: usize },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Plan7Error>;

/// Reasons a trace fails validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TraceError {
    #[error("trace is too short to be a path")]
    TooShort,

    #[error("trace must start with S,N and end with C,T")]
    BadTerminals,

    #[error("illegal transition {from}{from_node} -> {to}{to_node} at cell {index}")]
    IllegalTransition {
        index: usize,
        from: State,
        from_node: usize,
        to: State,
        to_node: usize,
    },

    #[error("cell {index} ({state}) has node {node} outside 1..={m}")]
    NodeOutOfRange {
        index: usize,
        state: State,
        node: usize,
        m: usize,
    },

    #[error("cell {index} ({state}) emits position {found}, expected {expected}")]
    Position {
        index: usize,
        state: State,
        expected: usize,
        found: usize,
    },

    #[error("trace emits {emitted} residues of a sequence of length {len}")]
    Unaccounted { emitted: usize, len: usize },
}
