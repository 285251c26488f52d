//! Consensus error taxonomy.
//!
//! Errors split into two disjoint families:
//!
//! - [`ConsensusError`] - deterministic protocol rejections. The same
//!   block against the same chain state produces the same tagged error
//!   on every node, and the block is permanently invalid on this chain.
//! - [`FlowError`] - "try again later" signals for the syncer: the
//!   block may become processable once more context arrives.
//!
//! A consensus error carries a machine-readable [`ErrorTag`], the
//! pipeline stage that raised it, and a structured trace of key/value
//! pairs instead of a preformatted string, so diagnostics stay
//! queryable.

use std::fmt;
use thor_types::{Address, Bytes32};

/// Closed enumeration of deterministic rejection reasons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorTag {
    TimestampBehindParent,
    IntervalNotRounded,
    GasLimitInvalid,
    GasExceeded,
    TotalScoreInvalid,
    TxFeaturesMismatch,
    SignerUnavailable,
    UnauthorizedProposer,
    TxsRootMismatch,
    TxSignerUnavailable,
    TxChainTagMismatch,
    TxRefFutureBlock,
    TxExpired,
    TxOriginBlocked,
    TxAlreadyExists,
    TxDepBroken,
    TxExecutionFailed,
    GasUsedMismatch,
    ReceiptsRootMismatch,
    StateRootMismatch,
    InvalidSummarySigner,
    SummaryParentMismatch,
    SummaryTimestampInvalid,
    EndorsementCountMismatch,
    NotAuthority,
    NotCommittee,
    InvalidVrfProof,
    DuplicateEndorser,
    InsufficientEndorsements,
    MissingVrfPubKey,
    /// Internal storage or state failure surfaced as a consensus error
    /// with the triggering stage in the trace.
    Internal,
}

impl ErrorTag {
    /// The human-readable message for this tag.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorTag::TimestampBehindParent => "block timestamp behind parents",
            ErrorTag::IntervalNotRounded => "block interval not rounded",
            ErrorTag::GasLimitInvalid => "block gas limit invalid",
            ErrorTag::GasExceeded => "block gas used exceeds limit",
            ErrorTag::TotalScoreInvalid => "block total score invalid",
            ErrorTag::TxFeaturesMismatch => "block txs features mismatch",
            ErrorTag::SignerUnavailable => "block signer unavailable",
            ErrorTag::UnauthorizedProposer => "unauthorized block proposer",
            ErrorTag::TxsRootMismatch => "block txs root mismatch",
            ErrorTag::TxSignerUnavailable => "tx signer unavailable",
            ErrorTag::TxChainTagMismatch => "tx chain tag mismatch",
            ErrorTag::TxRefFutureBlock => "tx ref future block",
            ErrorTag::TxExpired => "tx expired",
            ErrorTag::TxOriginBlocked => "tx origin blocked got packed",
            ErrorTag::TxAlreadyExists => "tx already exists",
            ErrorTag::TxDepBroken => "tx dep broken",
            ErrorTag::TxExecutionFailed => "tx execution failed",
            ErrorTag::GasUsedMismatch => "block gas used mismatch",
            ErrorTag::ReceiptsRootMismatch => "block receipts root mismatch",
            ErrorTag::StateRootMismatch => "block state root mismatch",
            ErrorTag::InvalidSummarySigner => "invalid block summary signer",
            ErrorTag::SummaryParentMismatch => "inconsistent parent block id",
            ErrorTag::SummaryTimestampInvalid => "invalid summary timestamp",
            ErrorTag::EndorsementCountMismatch => "endorsement count mismatch",
            ErrorTag::NotAuthority => "signer not allowed to participate in consensus",
            ErrorTag::NotCommittee => "not a committee member",
            ErrorTag::InvalidVrfProof => "invalid vrf proof",
            ErrorTag::DuplicateEndorser => "duplicate endorser",
            ErrorTag::InsufficientEndorsements => "insufficient endorsements",
            ErrorTag::MissingVrfPubKey => "missing vrf public key",
            ErrorTag::Internal => "internal failure",
        }
    }
}

/// A value in an error trace.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum TraceValue {
    U32(u32),
    U64(u64),
    Bytes32(Bytes32),
    Address(Address),
}

impl fmt::Display for TraceValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceValue::U32(v) => write!(f, "{}", v),
            TraceValue::U64(v) => write!(f, "{}", v),
            TraceValue::Bytes32(v) => write!(f, "{}", v),
            TraceValue::Address(v) => write!(f, "{}", v),
        }
    }
}

impl From<u32> for TraceValue {
    fn from(v: u32) -> Self {
        TraceValue::U32(v)
    }
}

impl From<u64> for TraceValue {
    fn from(v: u64) -> Self {
        TraceValue::U64(v)
    }
}

impl From<Bytes32> for TraceValue {
    fn from(v: Bytes32) -> Self {
        TraceValue::Bytes32(v)
    }
}

impl From<Address> for TraceValue {
    fn from(v: Address) -> Self {
        TraceValue::Address(v)
    }
}

/// A deterministic protocol rejection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusError {
    /// Machine-readable rejection reason.
    pub tag: ErrorTag,
    /// Pipeline stages that raised or forwarded the error, innermost
    /// first.
    pub stages: Vec<&'static str>,
    /// Structured diagnostics.
    pub trace: Vec<(&'static str, TraceValue)>,
    /// Underlying failure, when the rejection wraps an internal error.
    pub cause: Option<String>,
}

impl ConsensusError {
    /// Creates an error with a tag and the raising stage.
    pub fn new(stage: &'static str, tag: ErrorTag) -> Self {
        Self {
            tag,
            stages: vec![stage],
            trace: Vec::new(),
            cause: None,
        }
    }

    /// Appends a trace key/value pair.
    pub fn with(mut self, key: &'static str, value: impl Into<TraceValue>) -> Self {
        self.trace.push((key, value.into()));
        self
    }

    /// Attaches an underlying cause.
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Records an outer stage forwarding the error.
    pub fn add_stage(mut self, stage: &'static str) -> Self {
        self.stages.push(stage);
        self
    }

    /// Wraps an internal storage/state failure.
    pub fn internal(stage: &'static str, cause: impl fmt::Display) -> Self {
        Self::new(stage, ErrorTag::Internal).with_cause(cause)
    }
}

impl fmt::Display for ConsensusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag.message())?;
        for (i, (key, value)) in self.trace.iter().enumerate() {
            let sep = if i == 0 { ": " } else { ", " };
            write!(f, "{}{} {}", sep, key, value)?;
        }
        if let Some(cause) = &self.cause {
            write!(f, " ({})", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ConsensusError {}

/// A non-fatal signal for the caller: retry, buffer, or ignore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FlowError {
    /// The block's timestamp is beyond the clock tolerance.
    #[error("block in the future")]
    FutureBlock,

    /// The block is already stored.
    #[error("block already in the chain")]
    KnownBlock,

    /// The parent is not stored yet.
    #[error("parent block is missing")]
    ParentMissing,
}

/// Errors returned by [`crate::Consensus::process`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProcessError {
    /// The block is permanently invalid.
    #[error(transparent)]
    Consensus(#[from] ConsensusError),

    /// The block cannot be processed yet.
    #[error(transparent)]
    Flow(#[from] FlowError),
}

impl ProcessError {
    /// The consensus error, if this is a deterministic rejection.
    pub fn as_consensus(&self) -> Option<&ConsensusError> {
        match self {
            ProcessError::Consensus(err) => Some(err),
            ProcessError::Flow(_) => None,
        }
    }

    /// The tag, if this is a deterministic rejection.
    pub fn tag(&self) -> Option<ErrorTag> {
        self.as_consensus().map(|err| err.tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_with_trace() {
        let err = ConsensusError::new("verifyBlock", ErrorTag::TimestampBehindParent)
            .with("parent", 1_526_400_000u64)
            .with("curr", 1_526_400_000u64);
        assert_eq!(
            err.to_string(),
            "block timestamp behind parents: parent 1526400000, curr 1526400000"
        );
    }

    #[test]
    fn test_stage_accumulation() {
        let err = ConsensusError::new("UpdateNode", ErrorTag::MissingVrfPubKey).add_stage("Process");
        assert_eq!(err.stages, vec!["UpdateNode", "Process"]);
    }

    #[test]
    fn test_process_error_tag_extraction() {
        let err: ProcessError = ConsensusError::new("s", ErrorTag::TxDepBroken).into();
        assert_eq!(err.tag(), Some(ErrorTag::TxDepBroken));
        assert_eq!(ProcessError::from(FlowError::KnownBlock).tag(), None);
    }
}
