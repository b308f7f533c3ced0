//! Fetch, decode, condition check, execute and retire, plus the run loop.

use tracing::{debug, trace, warn};

use crate::decoder::{Decoder, ItContext};
use crate::execute::execute;
use crate::hooks::HookKind;
use crate::state::{it_advance, it_condition};
use crate::{Emulator, FaultCode, FaultRetirement, Register, ReturnCode};

impl Emulator {
    /// Runs from the current `PC` until `max_instructions` have retired, a
    /// stop is requested or a fault occurs.
    pub fn emulate(&mut self, max_instructions: u64) -> ReturnCode {
        self.run(None, max_instructions)
    }

    /// Like [`Emulator::emulate`], additionally returning before executing
    /// the instruction at `end_address`.
    pub fn emulate_until(&mut self, end_address: u32, max_instructions: u64) -> ReturnCode {
        self.run(Some(end_address), max_instructions)
    }

    fn run(&mut self, end_address: Option<u32>, max_instructions: u64) -> ReturnCode {
        if self.in_emulate {
            warn!("emulate called while already running");
            return ReturnCode::AlreadyRunning;
        }

        self.in_emulate = true;
        self.running = true;
        self.emulated_time = 0;
        self.stop_reason = None;
        debug!(
            pc = self.cpu.pc(),
            max_instructions,
            ?end_address,
            "emulation started"
        );

        let code = self.run_loop(end_address, max_instructions);

        self.running = false;
        self.in_emulate = false;
        self.stop_reason = None;
        self.hooks.sweep();
        debug!(
            pc = self.cpu.pc(),
            ?code,
            emulated_time = self.emulated_time,
            "emulation stopped"
        );
        code
    }

    fn run_loop(&mut self, end_address: Option<u32>, max_instructions: u64) -> ReturnCode {
        loop {
            if self.emulated_time >= max_instructions {
                return ReturnCode::MaxInstructionsReached;
            }
            if end_address == Some(self.cpu.pc()) {
                return ReturnCode::EndAddressReached;
            }

            if let Err(cause) = self.step() {
                if self.config.fault_retirement == FaultRetirement::Counted {
                    self.clock_cpu();
                }
                warn!(pc = self.cpu.pc(), %cause, "emulation fault");
                return ReturnCode::Fault { cause };
            }

            if self.hooks.cleanup_requested() {
                self.hooks.sweep();
            }
            if let Some(reason) = self.stop_reason.take() {
                return reason;
            }
        }
    }

    /// Retires one instruction.
    fn step(&mut self) -> Result<(), FaultCode> {
        let address = self.cpu.pc();
        if !self.cpu.psr.thumb {
            return Err(FaultCode::InvalidExecutionState);
        }

        let first = self.fetch_halfword(address)?;
        self.fire_fetch_hooks(address, Decoder::instruction_size(first));

        // Fetched again so a fetch hook can patch the instruction.
        let first = self.fetch_halfword(address)?;
        let size = Decoder::instruction_size(first);
        let second = if size == 4 {
            self.fetch_halfword(address.wrapping_add(2))?
        } else {
            0
        };

        let it_state = self.cpu.psr.it_state;
        let it = ItContext {
            in_it_block: self.in_it_block(),
            last_in_it_block: self.last_in_it_block(),
        };
        let instr = self.decoder.decode(address, first, second, it)?;
        self.fire_instruction_hooks(HookKind::InstructionDecoded, &instr);

        // A decode hook that moved PC skips the instruction; PC stays put.
        if self.cpu.pc() != address {
            if it.in_it_block {
                self.pop_it_condition();
            }
            self.clock_cpu();
            trace!(
                address,
                mnemonic = ?instr.mnemonic,
                target = self.cpu.pc(),
                "instruction redirected by hook"
            );
            return Ok(());
        }

        let condition = if it.in_it_block {
            it_condition(it_state)
        } else {
            instr.condition
        };
        let passed = condition.passed(&self.cpu.psr);

        if passed {
            self.pc_written = false;
            execute(self, &instr)?;
            if !self.pc_written {
                self.cpu
                    .set_register(Register::Pc, address.wrapping_add(instr.size));
            }
        } else {
            self.cpu
                .set_register(Register::Pc, address.wrapping_add(instr.size));
        }

        if it.in_it_block {
            self.pop_it_condition();
        }
        if passed {
            self.fire_instruction_hooks(HookKind::InstructionExecuted, &instr);
        }

        self.clock_cpu();
        trace!(
            address,
            mnemonic = ?instr.mnemonic,
            skipped = !passed,
            "instruction retired"
        );
        Ok(())
    }

    fn fetch_halfword(&self, address: u32) -> Result<u16, FaultCode> {
        let mut bytes = [0_u8; 2];
        self.read_memory(address, &mut bytes)
            .map_err(|_| FaultCode::InvalidMemoryAccess)?;
        Ok(u16::from_le_bytes(bytes))
    }

    /// Consumes the current IT slot and returns its condition.
    pub(crate) fn pop_it_condition(&mut self) -> crate::Condition {
        let it_state = self.cpu.psr.it_state;
        self.cpu.psr.it_state = it_advance(it_state);
        it_condition(it_state)
    }

    /// Advances both clocks by one retired instruction.
    pub(crate) const fn clock_cpu(&mut self) {
        self.cpu.time = self.cpu.time.wrapping_add(1);
        self.emulated_time = self.emulated_time.wrapping_add(1);
    }
}
