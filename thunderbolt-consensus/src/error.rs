//! Errors that can occur when checking consensus rules.

use thiserror::Error;

use thunderbolt_chain::{
    amount, block, transaction::sighash::SignatureError, transparent,
    work::difficulty::CompactDifficulty,
};

/// Which ban-score bucket an invalid block or transaction falls into.
///
/// Validation failures are malformed data; consensus failures are
/// well-formed data that lies about the chain. Both cost the sender the
/// full ban, but the distinction is reported to operators.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum InvalidKind {
    Validation,
    Consensus,
}

#[derive(Error, Copy, Clone, Debug, PartialEq, Eq)]
pub enum SubsidyError {
    #[error("no coinbase transaction in block")]
    NoCoinbase,

    #[error("coinbase value is larger than the block subsidy plus transaction fees")]
    ExcessiveCoinbaseValue,
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum TransactionError {
    #[error("transaction has no inputs")]
    NoInputs,

    #[error("transaction has no outputs")]
    NoOutputs,

    #[error("coinbase transaction found outside the first position in a block")]
    CoinbasePosition,

    #[error("coinbase input found in a non-coinbase transaction")]
    CoinbaseInputFound,

    #[error("coinbase transaction is not valid outside a block")]
    CoinbaseOutsideBlock,

    #[error("transaction is larger than the maximum transaction size")]
    OversizeTransaction,

    #[error("transaction contains duplicate inputs")]
    DuplicateInput,

    #[error("amount arithmetic over- or underflowed: {0}")]
    Amount(#[from] amount::Error),

    #[error("input references a missing or already spent output: {0:?}")]
    MissingInput(transparent::OutPoint),

    #[error("inputs are worth less than outputs")]
    InsufficientInputValue,

    #[error("unlocking parameters are malformed")]
    MalformedUnlock,

    #[error("unlocking parameters do not satisfy the output's lock: {0}")]
    UnlockFailed(#[from] SignatureError),

    #[error("multisig unlock does not match the output's commitment")]
    MultisigCommitmentMismatch,

    #[error("multisig unlock carries fewer valid signatures than required")]
    InsufficientSignatures,

    #[error("output can never be spent")]
    UnspendableOutput,

    #[error("spends a coinbase output before it matures")]
    ImmatureCoinbaseSpend,

    #[error("transaction fee is below the relay floor")]
    FeeBelowMinimum,

    #[error("{0}")]
    Subsidy(#[from] SubsidyError),
}

impl TransactionError {
    pub fn kind(&self) -> InvalidKind {
        use TransactionError::*;
        match self {
            MissingInput(_)
            | InsufficientInputValue
            | UnlockFailed(_)
            | MultisigCommitmentMismatch
            | InsufficientSignatures
            | UnspendableOutput
            | ImmatureCoinbaseSpend
            | Subsidy(_) => InvalidKind::Consensus,
            _ => InvalidKind::Validation,
        }
    }
}

/// The result shape of every contextual check: storage failures abort
/// the surrounding operation, rule failures invalidate the data being
/// checked (and cost its sender ban score).
#[derive(Error, Debug)]
pub enum CheckError {
    #[error("storage failure during validation: {0}")]
    Storage(#[from] thunderbolt_state::StorageError),

    #[error(transparent)]
    Invalid(#[from] TransactionError),
}

#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum BlockError {
    #[error("block has no transactions")]
    NoTransactions,

    #[error("block is larger than the maximum block size")]
    OversizeBlock,

    #[error("block contains duplicate transactions")]
    DuplicateTransaction,

    #[error("transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("merkle root {actual:?} does not match the header commitment {expected:?}")]
    BadMerkleRoot {
        actual: block::merkle::Root,
        expected: block::merkle::Root,
    },

    #[error("the difficulty field {0:?} is not a valid encoded target")]
    InvalidDifficulty(CompactDifficulty),

    #[error("target {0:?} is easier than the proof-of-work limit")]
    TargetDifficultyLimit(CompactDifficulty),

    #[error("block difficulty {actual:?} does not follow the retarget schedule {expected:?}")]
    DifficultyMismatch {
        actual: CompactDifficulty,
        expected: CompactDifficulty,
    },

    #[error("compact target exponent is too small for the retarget precision mask")]
    DifficultyPrecision,

    #[error("block header hash {0:?} is above its difficulty target")]
    DifficultyFilter(block::Hash),
}

impl BlockError {
    pub fn kind(&self) -> InvalidKind {
        use BlockError::*;
        match self {
            NoTransactions | OversizeBlock | InvalidDifficulty(_) => InvalidKind::Validation,
            Transaction(inner) => inner.kind(),
            DuplicateTransaction
            | BadMerkleRoot { .. }
            | TargetDifficultyLimit(_)
            | DifficultyMismatch { .. }
            | DifficultyPrecision
            | DifficultyFilter(_) => InvalidKind::Consensus,
        }
    }
}
