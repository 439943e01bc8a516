//! Error types for the Flint compiler backend.
//!
//! Compilation distinguishes two disjoint error classes:
//!
//! ```text
//! CompileError (returned to the caller)
//! ├── User      - structural limits hit by the compiled program; ordinary
//! │              data carrying a source location and message
//! └── Internal  - a compiler defect or resource exhaustion; abort-worthy
//!                 for the unit, never retried or downgraded
//! ```
//!
//! Only the `Internal` variant may be treated as fatal by a fail-fast
//! caller. No partial code object is ever produced alongside either class.

use thiserror::Error;

use crate::location::{NO_LOCATION, SrcLocation};

/// Errors that occur while lowering and assembling a code unit.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// The compiled program exceeded a structural limit.
    #[error("at {location}: {message}")]
    User {
        /// Description of the limit that was exceeded.
        message: String,
        /// Where the offending construct occurred.
        location: SrcLocation,
    },

    /// The compiler itself produced an inconsistent intermediate state.
    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl CompileError {
    /// Create a user-facing error at a location.
    pub fn user(message: impl Into<String>, location: SrcLocation) -> Self {
        CompileError::User {
            message: message.into(),
            location,
        }
    }

    /// Whether this error indicates a compiler defect rather than a
    /// property of the compiled program.
    pub fn is_internal(&self) -> bool {
        matches!(self, CompileError::Internal(_))
    }

    /// Attach a location to a user error that was raised without one.
    ///
    /// Internal errors and user errors that already carry a location are
    /// returned unchanged.
    pub fn at(self, location: SrcLocation) -> Self {
        match self {
            CompileError::User {
                message,
                location: old,
            } if old == NO_LOCATION => CompileError::User { message, location },
            other => other,
        }
    }

    /// The source location associated with this error, if any.
    pub fn location(&self) -> Option<SrcLocation> {
        match self {
            CompileError::User { location, .. } if *location != NO_LOCATION => Some(*location),
            _ => None,
        }
    }
}

/// Fatal defects detected inside the pipeline.
///
/// Every variant indicates a bug in code generation or an exhausted
/// resource, never a property of the program being compiled. They abort the
/// unit's compilation; all intermediate state is dropped in bulk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InternalError {
    /// A jump operand referenced a label that was never bound.
    #[error("internal error: label {0} used but never bound")]
    UnboundLabel(u32),

    /// A label was bound a second time.
    #[error("internal error: label {0} bound twice")]
    LabelRebound(u32),

    /// A jump operand resolved to an offset that is not a block boundary.
    #[error("internal error: jump target {0} is not on a block boundary")]
    MisalignedJumpTarget(u32),

    /// Two predecessors disagreed on a block's entry stack depth.
    #[error("internal error: stack depth mismatch at block {block}: {expected} vs {found}")]
    StackDepthMismatch {
        /// The block whose entry depth conflicts.
        block: u32,
        /// Depth recorded from an earlier predecessor.
        expected: i32,
        /// Depth implied by the conflicting predecessor.
        found: i32,
    },

    /// The stack underflowed while simulating an instruction.
    #[error("internal error: stack underflow at instruction {0}")]
    StackUnderflow(u32),

    /// The computed stack depth exceeded the interpreter's limit.
    #[error("internal error: stack depth {0} exceeds the interpreter limit")]
    StackDepthOverflow(i32),

    /// An index operand was out of range for its table at assembly time.
    #[error("internal error: {table} index {index} out of range at assembly")]
    IndexOutOfRange {
        /// Which table the operand addressed.
        table: &'static str,
        /// The out-of-range index.
        index: u32,
    },

    /// A growable table hit the allocation ceiling.
    #[error("internal error: table grew past {0} entries")]
    TableOverflow(usize),

    /// An instruction was appended with an opcode outside the table.
    #[error("internal error: invalid opcode {0}")]
    InvalidOpcode(u8),

    /// A pseudo-instruction survived to a stage that must not see one.
    #[error("internal error: pseudo-instruction reached the assembler")]
    PseudoInstruction,

    /// Handler push/pop pseudo-instructions did not nest properly.
    #[error("internal error: unbalanced handler pseudo-instructions")]
    UnbalancedHandler,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::SrcLocation;

    #[test]
    fn user_errors_are_not_internal() {
        let err = CompileError::user("too many constants", SrcLocation::line(1, 0));
        assert!(!err.is_internal());
        assert_eq!(err.location(), Some(SrcLocation::line(1, 0)));
    }

    #[test]
    fn internal_errors_are_internal() {
        let err: CompileError = InternalError::UnboundLabel(3).into();
        assert!(err.is_internal());
        assert_eq!(err.location(), None);
    }

    #[test]
    fn at_fills_missing_location_only() {
        let err = CompileError::user("too many names", NO_LOCATION);
        let placed = err.at(SrcLocation::line(4, 2));
        assert_eq!(placed.location(), Some(SrcLocation::line(4, 2)));

        let already = CompileError::user("nested too deeply", SrcLocation::line(9, 0));
        let unchanged = already.clone().at(SrcLocation::line(1, 1));
        assert_eq!(unchanged, already);
    }

    #[test]
    fn internal_error_message() {
        let err = InternalError::StackDepthMismatch {
            block: 2,
            expected: 1,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "internal error: stack depth mismatch at block 2: 1 vs 3"
        );
    }
}
