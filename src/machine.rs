//! The top-level owned state the reference source kept as module globals
//! (§9's design note): register file, program counter, memory, decode
//! table, and watchpoint pool, bundled into one struct passed explicitly
//! to [`crate::monitor`]'s command handlers instead of touched through
//! bare globals.

use crate::decode::Decoder;
use crate::difftest::{self, ReferenceSnapshot};
use crate::error::MachineError;
pub use crate::error::MachineResult;
use crate::exec::{self, ExecOutcome};
use crate::expr::{self, EvalContext, ExprError};
use crate::memory::Memory;
use crate::registers::RegisterFile;
use crate::watchpoint::{WatchpointChange, WatchpointPool};

/// A reference model the step driver can run in lock-step with this core
/// for differential testing (§6's "reference-model interface"). The
/// model owns its own register file and PC and advances them by exactly
/// one instruction per call to `step`.
pub trait ReferenceModel {
    fn step(&mut self);
    fn pc(&self) -> u32;
    fn gpr(&self) -> &RegisterFile;
}

/// Why the machine is no longer runnable. Every variant is sticky: there
/// is no resume-after-halt in this core (§4.2's step driver stops
/// `exec` for good once `self.halted` is set).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HaltReason {
    /// `ebreak` with `a0 == 0`: the guest program signaled success.
    EbreakSuccess,
    /// `ebreak` with a non-zero `a0`: the guest program signaled failure.
    EbreakFailure { a0: u32 },
    /// No decode pattern matched the fetched word.
    IllegalInstruction { pc: u32, word: u32 },
    /// The reference model's post-state disagreed with ours.
    DiffTestMismatch { detail: String },
    /// A watchpoint's expression changed value.
    WatchpointTriggered,
}

/// Outcome of a single `exec(n)` call: how many instructions actually
/// ran before stopping, the halt reason if the run ended in a halt, and
/// any watchpoint changes observed along the way.
#[derive(Debug, Default)]
pub struct ExecReport {
    pub steps_run: u32,
    pub halt: Option<HaltReason>,
    pub watchpoint_changes: Vec<WatchpointChange>,
}

/// Borrowed register-file/memory/pc view handed to the expression
/// evaluator; exists so `step_watchpoints`/`eval` can borrow
/// `regs`/`mem`/`pc` without also needing a mutable borrow of
/// `watchpoints` (disjoint field access, not a `RefCell`: see
/// `Machine::eval`).
struct EvalCtx<'a> {
    regs: &'a RegisterFile,
    mem: &'a Memory,
    pc: u32,
}

impl EvalContext for EvalCtx<'_> {
    fn reg_by_name(&self, name: &str) -> Option<u32> {
        if name == "pc" {
            return Some(self.pc);
        }
        self.regs.by_name(name)
    }

    fn read_word(&self, addr: u32) -> u32 {
        self.mem.read(addr, 4).unwrap_or(0)
    }
}

/// Owns every piece of process-wide state the reference source kept as
/// globals: registers, PC, memory, the decode table, and the watchpoint
/// pool. One `Machine` is constructed per debugger session.
pub struct Machine {
    pub regs: RegisterFile,
    pub pc: u32,
    pub mem: Memory,
    decoder: Decoder,
    pub watchpoints: WatchpointPool,
    pub halted: Option<HaltReason>,
    reference: Option<Box<dyn ReferenceModel>>,
}

impl Machine {
    pub fn new() -> Self {
        Self {
            regs: RegisterFile::new(),
            pc: 0,
            mem: Memory::new(),
            decoder: Decoder::new(),
            watchpoints: WatchpointPool::new(),
            halted: None,
            reference: None,
        }
    }

    /// Enable differential testing against `reference`, stepped once per
    /// instruction this core executes (§4.3).
    pub fn with_reference(mut self, reference: Box<dyn ReferenceModel>) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn is_halted(&self) -> bool {
        self.halted.is_some()
    }

    /// Evaluate `expr` against the current machine state: registers via
    /// [`EvalContext::reg_by_name`] (the evaluator's raw, sigil-stripped
    /// names, which also accepts the literal `pc`, per §6's
    /// register-name interface), and memory via [`EvalContext::read_word`].
    /// A bare `pc` (no `$` sigil, the whole expression) is also accepted
    /// directly, since the lexer's REG rule requires a leading sigil and
    /// would otherwise reject it outright.
    pub fn eval(&self, expr_text: &str) -> Result<u32, ExprError> {
        if expr_text.trim() == "pc" {
            return Ok(self.pc);
        }
        let ctx = EvalCtx {
            regs: &self.regs,
            mem: &self.mem,
            pc: self.pc,
        };
        expr::evaluate(expr_text, &ctx)
    }

    /// Re-evaluate every active watchpoint, reporting the changes.
    /// Evaluation failures are silently skipped per §4.4: they neither
    /// remove the watchpoint nor block the scan.
    fn step_watchpoints(&mut self) -> Vec<WatchpointChange> {
        let regs = &self.regs;
        let mem = &self.mem;
        let pc = self.pc;
        self.watchpoints.update(|expr_text| {
            if expr_text.trim() == "pc" {
                return Some(pc);
            }
            let ctx = EvalCtx { regs, mem, pc };
            expr::evaluate(expr_text, &ctx).ok()
        })
    }

    /// Run one instruction. Returns the watchpoint changes observed
    /// after this step (empty if none triggered). Does nothing and
    /// returns `Ok(vec![])` if the machine is already halted.
    fn step(&mut self) -> MachineResult<Vec<WatchpointChange>> {
        if self.halted.is_some() {
            return Ok(Vec::new());
        }

        let pc_old = self.pc;
        let word = self.mem.read(pc_old, 4)?;
        let snpc = pc_old.wrapping_add(4);
        tracing::trace!(pc = format_args!("0x{pc_old:08x}"), word = format_args!("0x{word:08x}"), "fetch");

        let (mnemonic, operands) = match self.decoder.decode(pc_old, word) {
            Ok(decoded) => decoded,
            Err(err) => {
                tracing::debug!(pc = format_args!("0x{pc_old:08x}"), word = format_args!("0x{word:08x}"), "illegal instruction");
                self.halted = Some(HaltReason::IllegalInstruction {
                    pc: pc_old,
                    word,
                });
                return Err(err.into());
            }
        };
        tracing::trace!(?mnemonic, "decode");

        let outcome = exec::execute(
            mnemonic,
            operands,
            pc_old,
            snpc,
            &mut self.regs,
            &mut self.mem,
        )?;

        match outcome {
            ExecOutcome::Continue { dnpc } => {
                self.regs.set(0, 0);
                self.pc = dnpc;
                tracing::trace!(dnpc = format_args!("0x{dnpc:08x}"), "execute");
            }
            ExecOutcome::Ebreak { a0 } => {
                self.regs.set(0, 0);
                self.pc = snpc;
                self.halted = Some(if a0 == 0 {
                    HaltReason::EbreakSuccess
                } else {
                    HaltReason::EbreakFailure { a0 }
                });
                tracing::debug!(a0, "ebreak");
            }
        }

        if let Some(reference) = self.reference.as_mut() {
            reference.step();
            let snapshot = ReferenceSnapshot {
                pc: reference.pc(),
                gpr: reference.gpr(),
            };
            if let Err(err) = difftest::check(pc_old, snapshot, self.pc, &self.regs) {
                tracing::debug!(pc = format_args!("0x{pc_old:08x}"), %err, "diff-test mismatch");
                self.halted = Some(HaltReason::DiffTestMismatch {
                    detail: err.to_string(),
                });
                return Err(err.into());
            }
        }

        let changes = self.step_watchpoints();
        if !changes.is_empty() && self.halted.is_none() {
            tracing::debug!(count = changes.len(), "watchpoint triggered");
            self.halted = Some(HaltReason::WatchpointTriggered);
        }
        Ok(changes)
    }

    /// Step driver (§4.2): `exec(n)` with `n < 0` meaning "run until
    /// halted". Stops early on any halt condition (fatal decode error,
    /// diff-test mismatch, ebreak, or a triggered watchpoint). Decode
    /// and diff-test errors propagate as `Err`; `halt` on the report
    /// still reflects the stop reason either way.
    pub fn exec(&mut self, n: i64) -> MachineResult<ExecReport> {
        let mut report = ExecReport::default();
        let unbounded = n < 0;
        let mut remaining = if unbounded { i64::MAX } else { n };

        while remaining > 0 && self.halted.is_none() {
            match self.step() {
                Ok(changes) => {
                    report.steps_run += 1;
                    report.watchpoint_changes.extend(changes);
                }
                Err(err) => {
                    report.steps_run += 1;
                    report.halt = self.halted.clone();
                    return Err(err);
                }
            }
            remaining -= 1;
        }
        report.halt = self.halted.clone();
        Ok(report)
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// A second, independently-constructed `Machine` is itself a valid
/// reference model (§6): stepping it once per instruction and reading
/// back its `pc`/`regs` is exactly the snapshot contract §4.3 wants,
/// with no separate reference-model type needed for in-process
/// differential testing.
impl ReferenceModel for Machine {
    fn step(&mut self) {
        let _ = Machine::step(self);
    }

    fn pc(&self) -> u32 {
        self.pc
    }

    fn gpr(&self) -> &RegisterFile {
        &self.regs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instr::*;

    struct NullReference {
        pc: u32,
        gpr: RegisterFile,
    }

    impl ReferenceModel for NullReference {
        fn step(&mut self) {
            self.pc = self.pc.wrapping_add(4);
        }
        fn pc(&self) -> u32 {
            self.pc
        }
        fn gpr(&self) -> &RegisterFile {
            &self.gpr
        }
    }

    #[test]
    fn four_instruction_program_computes_expected_registers() {
        let mut m = Machine::new();
        m.mem.write(0, 4, addi!(x1, x0, 5)).unwrap();
        m.mem.write(4, 4, addi!(x2, x0, 7)).unwrap();
        m.mem.write(8, 4, add!(x3, x1, x2)).unwrap();
        m.mem.write(12, 4, ebreak!()).unwrap();

        let report = m.exec(4).unwrap();
        assert_eq!(report.steps_run, 4);
        assert_eq!(m.regs.get(1), 5);
        assert_eq!(m.regs.get(2), 7);
        assert_eq!(m.regs.get(3), 12);
        assert_eq!(m.halted, Some(HaltReason::EbreakSuccess));
    }

    #[test]
    fn loop_program_runs_to_halt_via_negative_n() {
        let mut m = Machine::new();
        // x1 = 0, x2 = 3
        m.mem.write(0, 4, addi!(x1, x1, 1)).unwrap();
        m.mem.write(4, 4, bne!(x1, x2, -4)).unwrap();
        m.mem.write(8, 4, ebreak!()).unwrap();
        m.regs.set(2, 3);

        let report = m.exec(-1).unwrap();
        assert_eq!(m.regs.get(1), 3);
        assert_eq!(m.pc, 12);
        assert_eq!(report.halt, Some(HaltReason::EbreakSuccess));
    }

    #[test]
    fn illegal_instruction_halts_and_errors() {
        let mut m = Machine::new();
        m.mem.write(0, 4, 0xffff_ffff).unwrap();
        let err = m.exec(1).unwrap_err();
        assert!(matches!(err, MachineError::Decode(_)));
        assert!(matches!(m.halted, Some(HaltReason::IllegalInstruction { .. })));
    }

    #[test]
    fn gpr_zero_is_always_zero_after_a_step() {
        let mut m = Machine::new();
        m.mem.write(0, 4, addi!(x0, x0, 5)).unwrap();
        m.exec(1).unwrap();
        assert_eq!(m.regs.get(0), 0);
    }

    #[test]
    fn watchpoint_triggers_and_halts_the_driver() {
        let mut m = Machine::new();
        m.mem.write(0, 4, addi!(x11, x0, 5)).unwrap();
        m.mem.write(4, 4, addi!(x11, x11, 1)).unwrap();
        m.watchpoints.new_watchpoint("$a1".into(), 0).unwrap();

        let report = m.exec(-1).unwrap();
        assert_eq!(report.watchpoint_changes.len(), 1);
        assert_eq!(report.watchpoint_changes[0].new_val, 5);
        assert_eq!(report.halt, Some(HaltReason::WatchpointTriggered));
    }

    #[test]
    fn diff_test_mismatch_halts_the_machine() {
        let reference = NullReference {
            pc: 0xffff_ffff,
            gpr: RegisterFile::new(),
        };
        let mut m = Machine::new().with_reference(Box::new(reference));
        m.mem.write(0, 4, addi!(x1, x0, 1)).unwrap();
        let err = m.exec(1).unwrap_err();
        assert!(matches!(err, MachineError::DiffTest(_)));
        assert!(matches!(m.halted, Some(HaltReason::DiffTestMismatch { .. })));
    }

    #[test]
    fn eval_exposes_pc_as_a_pseudo_register() {
        let mut m = Machine::new();
        m.pc = 0x8000_0000;
        assert_eq!(m.eval("pc").unwrap(), 0x8000_0000);
    }

    #[test]
    fn dollar_pc_works_inside_a_compound_expression() {
        let mut m = Machine::new();
        m.pc = 0x8000_0000;
        assert_eq!(m.eval("$pc + 4").unwrap(), 0x8000_0004);
        assert_eq!(m.eval("$pc != 0x1000").unwrap(), 1);
    }

    #[test]
    fn watchpoint_on_dollar_pc_compound_expression_tracks_pc() {
        let mut m = Machine::new();
        m.mem.write(0, 4, addi!(x1, x0, 1)).unwrap();
        m.mem.write(4, 4, addi!(x1, x0, 2)).unwrap();
        m.watchpoints.new_watchpoint("$pc + 4".into(), 4).unwrap();

        let report = m.exec(1).unwrap();
        assert_eq!(report.watchpoint_changes.len(), 1);
        assert_eq!(report.watchpoint_changes[0].new_val, 8);
    }
}
