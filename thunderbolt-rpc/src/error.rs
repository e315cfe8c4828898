use thiserror::Error;

use thunderbolt_consensus::service::ServiceError;

/// The failure taxonomy surfaced to RPC callers.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// Malformed bytes or parameters.
    Codec,
    /// A wire-protocol violation.
    Protocol,
    /// A structural rule violation (bad hash, unknown key).
    Validation,
    /// A consensus rule violation.
    Consensus,
    /// The persistent store failed.
    Storage,
    /// A resource limit or unavailable collaborator.
    Resource,
}

/// A structured RPC failure: a taxonomy kind plus a human message.
#[derive(Clone, Debug, Error, Serialize)]
#[error("{kind:?}: {message}")]
pub struct RpcError {
    pub kind: ErrorKind,
    pub message: String,
}

impl RpcError {
    pub fn validation(message: &str) -> RpcError {
        RpcError {
            kind: ErrorKind::Validation,
            message: message.to_owned(),
        }
    }

    pub fn consensus(message: &str) -> RpcError {
        RpcError {
            kind: ErrorKind::Consensus,
            message: message.to_owned(),
        }
    }

    pub fn resource(message: &str) -> RpcError {
        RpcError {
            kind: ErrorKind::Resource,
            message: message.to_owned(),
        }
    }
}

impl From<ServiceError> for RpcError {
    fn from(error: ServiceError) -> RpcError {
        let kind = match &error {
            ServiceError::Storage(_) => ErrorKind::Storage,
            ServiceError::Closed => ErrorKind::Resource,
        };
        RpcError {
            kind,
            message: error.to_string(),
        }
    }
}
