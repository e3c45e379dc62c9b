//! Embedder-facing API: deploy guest programs, execute them, inspect storage.

use std::mem;
use std::panic;
use std::thread;

use libsyscall::TrapHandler;
use log::{info, warn};

use crate::config::HostConfig;
use crate::error::HostError;
use crate::exception;
use crate::kernel::exec::{self, CallRecord, ContractId, FrameExit, Installed, Machine, Program, TrapRecord};
use crate::kernel::storage::Storage;

/// Terminal outcome of a top-level execution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// `return`: output delivered, storage writes kept.
    Commit { output: Vec<u8> },
    /// `revert` or a guest fault: writes discarded, no output.
    Abort,
}

impl Outcome {
    pub fn is_commit(&self) -> bool {
        matches!(self, Outcome::Commit { .. })
    }

    pub fn output(&self) -> Option<&[u8]> {
        match self {
            Outcome::Commit { output } => Some(output),
            Outcome::Abort => None,
        }
    }
}

/// Everything one execution produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub outcome: Outcome,
    /// Every trap in order, sub-calls included. Empty when
    /// `HostConfig::record_traps` is off.
    pub traps: Vec<TrapRecord>,
    /// Sub-calls, in the order they finished.
    pub calls: Vec<CallRecord>,
}

/// In-process reference host.
///
/// Each execution runs its guest on a dedicated thread; traps reach this
/// host through the gateway's trap handler. Guest code cannot start another
/// execution.
pub struct Host {
    machine: Machine,
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl Host {
    pub fn new(config: HostConfig) -> Self {
        Self {
            machine: Machine {
                config,
                ..Machine::default()
            },
        }
    }

    /// Service traps with `handler` instead of `handle_ecall`. The handler
    /// usually wraps `handle_ecall` to observe or perturb the ABI.
    pub fn with_trap_handler(mut self, handler: TrapHandler) -> Self {
        self.machine.handler = handler;
        self
    }

    pub fn config(&self) -> &HostConfig {
        &self.machine.config
    }

    /// Deploy `program` at `contract`, returning any program it replaces.
    pub fn deploy(&mut self, contract: ContractId, program: Program) -> Option<Program> {
        self.machine.programs.insert(contract, program)
    }

    pub fn is_deployed(&self, contract: ContractId) -> bool {
        self.machine.programs.contains_key(&contract)
    }

    /// Execute the program deployed at `contract`.
    pub fn execute(&mut self, contract: ContractId, input: &[u8]) -> Result<Receipt, HostError> {
        let program = self
            .machine
            .programs
            .get(&contract)
            .copied()
            .ok_or(HostError::UnknownContract(contract))?;
        self.run(contract, input, program)
    }

    /// Execute `entry` as the code of `contract` without deploying it.
    ///
    /// The guest runs on a dedicated thread whose stack is sized for
    /// `max_call_depth` nested frames; this call blocks until it ends. A
    /// guest panic is re-raised here after its writes are discarded.
    pub fn run(
        &mut self,
        contract: ContractId,
        input: &[u8],
        entry: impl FnOnce(&[u8]) + Send,
    ) -> Result<Receipt, HostError> {
        if exec::is_active() {
            return Err(HostError::NestedExecution);
        }
        libsyscall::set_trap_handler(exception::trap_entry);

        self.machine.traps.clear();
        self.machine.calls.clear();

        let stack_size = self.machine.config.guest_stack_size();
        let machine = &mut self.machine;
        let joined = thread::scope(|scope| {
            let guest = thread::Builder::new()
                .name(format!("guest-{:#x}", contract))
                .stack_size(stack_size)
                .spawn_scoped(scope, move || {
                    let _installed = Installed::new(machine);
                    exec::run_frame(contract, input, entry)
                })
                .map_err(|err| {
                    warn!("guest thread spawn failed: {}", err);
                    HostError::GuestThread(stack_size)
                })?;
            Ok::<_, HostError>(guest.join())
        })?;
        let exit = match joined {
            Ok(exit) => exit,
            Err(payload) => panic::resume_unwind(payload),
        };

        let traps = mem::take(&mut self.machine.traps);
        let calls = mem::take(&mut self.machine.calls);
        // Aborted frames already rolled back to the checkpoint.
        self.machine.storage.commit();

        let outcome = match exit {
            FrameExit::Commit(output) => Outcome::Commit { output },
            FrameExit::Abort => Outcome::Abort,
            FrameExit::FellThrough => return Err(HostError::MissingExit(contract)),
        };
        info!(
            "contract {:#x}: {} ({} traps, {} calls)",
            contract,
            if outcome.is_commit() { "commit" } else { "abort" },
            traps.len(),
            calls.len()
        );

        Ok(Receipt {
            outcome,
            traps,
            calls,
        })
    }

    /// Committed value of a slot, with the configured default for unwritten ones.
    pub fn sload(&self, contract: ContractId, key: u64) -> u64 {
        self.machine
            .storage
            .load(contract, key)
            .unwrap_or(self.machine.config.default_slot_value)
    }

    /// Set a slot before any execution.
    pub fn seed(&mut self, contract: ContractId, key: u64, value: u64) {
        self.machine.storage.seed(contract, key, value);
    }

    pub fn storage(&self) -> &Storage {
        &self.machine.storage
    }
}
