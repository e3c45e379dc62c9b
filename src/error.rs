use thiserror::Error;

use crate::kernel::exec::ContractId;

/// Host-level failures reported to the embedder.
///
/// Faults inside the guest (bad buffers, unknown opcodes, malformed call
/// descriptors) are not errors here: they abort the guest's execution.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HostError {
    #[error("no program deployed at contract {0:#x}")]
    UnknownContract(ContractId),

    #[error("contract {0:#x} ended without calling return or revert")]
    MissingExit(ContractId),

    #[error("host execution started from inside a running guest")]
    NestedExecution,

    #[error("could not start a guest thread with a {0}-byte stack")]
    GuestThread(usize),
}
