use crate::object::{ObjKind, ObjRef};

/// Errors reported by the VM and its collector.
///
/// Every operation checks for these before mutating anything, so a failed call leaves the root
/// stack and the heap as they were.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VmError {
    /// A push would exceed the root stack capacity.
    #[error("stack overflow (capacity {capacity})")]
    StackOverflow {
        /// The configured root stack capacity.
        capacity: usize,
    },

    /// A pop or pair construction needed more roots than the stack holds.
    #[error("stack underflow (needed {needed}, have {available})")]
    StackUnderflow {
        /// The number of roots the operation consumes.
        needed: usize,

        /// The number of roots on the stack.
        available: usize,
    },

    /// The heap is full even after a collection.
    #[error("out of memory ({limit} live objects)")]
    AllocationFailure {
        /// The configured live object limit.
        limit: usize,
    },

    /// The handle does not refer to a live object.
    #[error("dangling object reference {0:?}")]
    DanglingRef(ObjRef),

    /// The object is not a pair.
    #[error("expected a pair, found a {kind}")]
    NotAPair {
        /// The kind of the object that was found instead.
        kind: ObjKind,
    },
}

/// A result of a VM operation.
pub type VmResult<T> = Result<T, VmError>;
