//! Execution frames and the per-thread active machine.
//!
//! Per execution: `Running → {Returned, Reverted}`. A terminal trap records
//! the new state on the current frame and unwinds with [`Halt`] back to the
//! `run_frame` that started it, so no guest code after `return` / `revert`
//! ever runs.

use std::any::Any;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use std::panic::{self, AssertUnwindSafe};

use libsyscall::{TrapFrame, TrapHandler};
use log::{debug, warn};

use super::storage::Storage;
use crate::config::{FallthroughPolicy, HostConfig};

/// Host-defined program identifier; also the storage namespace.
pub type ContractId = u64;

/// Guest entry point. The argument stands in for the input the loader
/// would place in guest memory.
pub type Program = fn(&[u8]);

// ─── State ─────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecState {
    Running,
    Returned,
    Reverted,
}

#[derive(Debug)]
pub(crate) struct Frame {
    pub contract: ContractId,
    pub checkpoint: usize,
    pub state: ExecState,
    pub output: Vec<u8>,
}

/// How a frame ended, after the fall-through policy is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum FrameExit {
    Commit(Vec<u8>),
    Abort,
    /// No terminal trap and `FallthroughPolicy::Reject`.
    FellThrough,
}

/// Unwind payload carried from a terminal trap to its `run_frame`.
pub(crate) struct Halt;

// ─── Records ───────────────────────────────────────────────────────

/// Register state of one trap, captured before the host serviced it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrapRecord {
    /// 1 = top-level frame
    pub depth: usize,
    pub contract: ContractId,
    pub frame: TrapFrame,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallRecord {
    /// Depth of the caller's frame
    pub depth: usize,
    pub caller: ContractId,
    pub callee: ContractId,
    pub value: u64,
    pub input: Vec<u8>,
    pub success: bool,
}

// ─── Machine ───────────────────────────────────────────────────────

/// Everything the trap handler needs while a guest runs.
pub(crate) struct Machine {
    pub config: HostConfig,
    pub storage: Storage,
    pub programs: BTreeMap<ContractId, Program>,
    pub handler: TrapHandler,
    pub frames: Vec<Frame>,
    pub traps: Vec<TrapRecord>,
    pub calls: Vec<CallRecord>,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            config: HostConfig::default(),
            storage: Storage::new(),
            programs: BTreeMap::new(),
            handler: crate::exception::handle_ecall,
            frames: Vec::new(),
            traps: Vec::new(),
            calls: Vec::new(),
        }
    }
}

impl Machine {
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn current(&self) -> &Frame {
        self.frames.last().expect("trap raised with no running frame")
    }

    pub fn current_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("trap raised with no running frame")
    }

    fn push_frame(&mut self, contract: ContractId) {
        let checkpoint = self.storage.checkpoint();
        self.frames.push(Frame {
            contract,
            checkpoint,
            state: ExecState::Running,
            output: Vec::new(),
        });
    }

    fn pop_frame(&mut self) -> Frame {
        self.frames.pop().expect("frame stack underflow")
    }
}

// ─── Active machine (per thread) ───────────────────────────────────

thread_local! {
    static ACTIVE: RefCell<Option<Machine>> = const { RefCell::new(None) };
}

pub(crate) fn is_active() -> bool {
    ACTIVE.with(|active| active.borrow().is_some())
}

/// Run `f` against this thread's active machine. The borrow ends before `f`'s
/// result is returned, so callers must not hold it across guest code.
pub(crate) fn with_machine<R>(f: impl FnOnce(&mut Machine) -> R) -> R {
    ACTIVE.with(|active| {
        let mut active = active.borrow_mut();
        let Some(machine) = active.as_mut() else {
            panic!("trap raised outside of a host execution");
        };
        f(machine)
    })
}

/// Moves a machine into the thread-local slot; moves it back on drop,
/// including when a guest panic unwinds through the host.
pub(crate) struct Installed<'a> {
    slot: &'a mut Machine,
}

impl<'a> Installed<'a> {
    pub fn new(slot: &'a mut Machine) -> Self {
        let machine = mem::take(slot);
        ACTIVE.with(|active| *active.borrow_mut() = Some(machine));
        Self { slot }
    }
}

impl Drop for Installed<'_> {
    fn drop(&mut self) {
        if let Some(machine) = ACTIVE.with(|active| active.borrow_mut().take()) {
            *self.slot = machine;
        }
    }
}

// ─── Frames ────────────────────────────────────────────────────────

/// End the current frame in `state`. Never returns to the guest.
pub(crate) fn halt(state: ExecState) -> ! {
    with_machine(|m| m.current_mut().state = state);
    panic::resume_unwind(Box::new(Halt))
}

/// Run `entry` as a new frame of `contract` and settle its storage writes.
///
/// A panic that is not a [`Halt`] is a guest fault on the host build: the
/// frame's writes are discarded and the panic continues to the caller.
pub(crate) fn run_frame(contract: ContractId, input: &[u8], entry: impl FnOnce(&[u8])) -> FrameExit {
    with_machine(|m| m.push_frame(contract));
    let result = panic::catch_unwind(AssertUnwindSafe(|| entry(input)));
    let (frame, policy) = with_machine(|m| (m.pop_frame(), m.config.fallthrough));

    if let Err(payload) = result {
        if !payload.is::<Halt>() {
            rollback(frame.checkpoint);
            resume_guest_panic(contract, payload);
        }
    }

    let exit = match frame.state {
        ExecState::Returned => FrameExit::Commit(frame.output),
        ExecState::Reverted => FrameExit::Abort,
        ExecState::Running => {
            warn!("contract {:#x} fell off its entry point ({:?})", contract, policy);
            match policy {
                FallthroughPolicy::Commit => FrameExit::Commit(Vec::new()),
                FallthroughPolicy::Abort => FrameExit::Abort,
                FallthroughPolicy::Reject => FrameExit::FellThrough,
            }
        }
    };

    if !matches!(exit, FrameExit::Commit(_)) {
        rollback(frame.checkpoint);
    }
    debug!("contract {:#x} frame ended: {:?}", contract, exit);
    exit
}

fn rollback(checkpoint: usize) {
    with_machine(|m| m.storage.rollback(checkpoint));
}

fn resume_guest_panic(contract: ContractId, payload: Box<dyn Any + Send>) -> ! {
    warn!("contract {:#x} panicked; discarding its writes", contract);
    panic::resume_unwind(payload)
}
