//! Crate-level error aggregate. Each subsystem keeps its own `thiserror`
//! enum (§10); `MachineError` just wraps them with `#[from]` so
//! `machine`/`monitor` can use a single `Result` alias without a wall of
//! `match`es at every call site.

use thiserror::Error;

use crate::decode::DecodeError;
use crate::difftest::DiffTestError;
use crate::expr::ExprError;
use crate::memory::MemoryError;
use crate::watchpoint::WatchpointError;

#[derive(Error, Debug)]
pub enum MachineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Memory(#[from] MemoryError),
    #[error(transparent)]
    Expr(#[from] ExprError),
    #[error(transparent)]
    DiffTest(#[from] DiffTestError),
    #[error(transparent)]
    Watchpoint(#[from] WatchpointError),
}

pub type MachineResult<T> = Result<T, MachineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_error_converts_via_from() {
        let err: MachineError = MemoryError::InvalidWidth(3).into();
        assert!(matches!(err, MachineError::Memory(_)));
    }

    #[test]
    fn decode_error_converts_via_from() {
        let err: MachineError = DecodeError::IllegalInstruction { pc: 0, word: 0 }.into();
        assert!(matches!(err, MachineError::Decode(_)));
    }
}
