//! Core machine implementation.
//!
//! [`Machine`] owns the registers, the segmented heap, the execution finger
//! and the console streams. It is created empty, loaded exactly once (from a
//! program file or from a snapshot) and then run to completion on a
//! dedicated engine thread; the [`Completion`] handle delivers the one
//! terminal status. A machine cannot be restarted in place.
//!
//! The dispatch loop fetches from the directly-held program array, advances
//! the finger, decodes the four-bit opcode and executes. All arithmetic
//! wraps modulo 2^32.

use crate::machine::checkpoint::Checkpointer;
use crate::machine::errors::MachineError;
use crate::machine::isa::{Instruction, Opcode, Platter};
use crate::machine::program::read_program;
use crate::machine::snapshot::Snapshot;
use crate::machine::vm::heap::Heap;
use crate::machine::vm::registers::Registers;
use crate::utils::log::Logger;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::thread;
use tokio::sync::oneshot;

mod heap;
mod registers;

/// Value loaded into R[C] by the Input operator at end of input.
pub const END_OF_INPUT: Platter = 0xFFFF_FFFF;

/// A UM-32 universal machine.
///
/// Multiple machines may coexist in one process; there is no state outside
/// the struct.
pub struct Machine {
    registers: Registers,
    heap: Heap,
    /// Index into segment 0 of the next instruction to fetch.
    finger: Platter,
    console_in: Box<dyn Read + Send>,
    console_out: Box<dyn Write + Send>,
    checkpointer: Checkpointer,
}

impl Machine {
    /// Creates an empty machine wired to the given console streams.
    ///
    /// Diagnostics go to `error_sink`. When `backup_folder` is set, the
    /// machine periodically snapshots itself there (see the checkpoint
    /// module); when `None`, checkpointing is disabled entirely.
    pub fn new(
        input: impl Read + Send + 'static,
        output: impl Write + Send + 'static,
        error_sink: impl Write + Send + 'static,
        backup_folder: Option<PathBuf>,
    ) -> Self {
        let logger = Logger::new("um32", error_sink);
        Self {
            registers: Registers::new(),
            heap: Heap::new(Vec::new()),
            finger: 0,
            console_in: Box::new(input),
            console_out: Box::new(output),
            checkpointer: Checkpointer::new(backup_folder, logger),
        }
    }

    /// Loads a program stream into segment 0.
    ///
    /// The stream is a headerless sequence of big-endian platters. On
    /// failure the machine is left untouched.
    pub fn load_program(&mut self, reader: impl Read) -> Result<(), MachineError> {
        let platters = read_program(reader)?;
        self.heap = Heap::new(platters);
        self.finger = 0;
        Ok(())
    }

    /// Restores a previously saved snapshot stream.
    ///
    /// The execution finger is rewound by one after decoding: snapshots are
    /// taken after the Input fetch has already advanced the finger, so the
    /// Input instruction must re-execute and consume the first post-restore
    /// byte. On failure the machine is left untouched.
    pub fn load_from_backup(&mut self, mut reader: impl Read) -> Result<(), MachineError> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .map_err(|err| MachineError::BadSnapshot(err.to_string()))?;
        let snapshot = Snapshot::from_bytes(&data)?;

        let heap = Heap::from_segments(snapshot.segments, snapshot.next_segment)?;
        let finger = snapshot.finger.checked_sub(1).ok_or_else(|| {
            MachineError::BadSnapshot("execution finger is zero".to_string())
        })?;

        self.heap = heap;
        self.registers = Registers::from_array(snapshot.registers);
        self.finger = finger;
        Ok(())
    }

    /// Captures the machine's complete state.
    pub(crate) fn snapshot(&self) -> Snapshot {
        Snapshot {
            registers: self.registers.to_array(),
            segments: self.heap.live_segments(),
            next_segment: self.heap.next_segment(),
            finger: self.finger,
        }
    }

    /// Runs the machine to completion on a dedicated engine thread.
    ///
    /// The returned handle yields exactly one terminal status: `Ok(())` for
    /// a normal Halt, or the fatal error. There is no outside cancellation;
    /// the guest runs until it halts or faults.
    pub fn run(mut self) -> Completion {
        let (sender, receiver) = oneshot::channel();
        thread::spawn(move || {
            // The embedder may have dropped the handle; the result has
            // nowhere to go then, which is fine.
            let _ = sender.send(self.spin());
        });
        Completion { receiver }
    }

    /// The decode/dispatch loop.
    fn spin(&mut self) -> Result<(), MachineError> {
        loop {
            let program = self.heap.program();
            let word = match program.get(self.finger as usize) {
                Some(&word) => word,
                None => {
                    return Err(MachineError::FingerOutOfRange {
                        finger: self.finger,
                        len: program.len(),
                    });
                }
            };
            let instruction = Instruction(word);
            self.finger = self.finger.wrapping_add(1);

            match instruction.opcode()? {
                Opcode::ConditionalMove => {
                    if self.registers.get(instruction.c()) != 0 {
                        let value = self.registers.get(instruction.b());
                        self.registers.set(instruction.a(), value);
                    }
                }
                Opcode::ArrayIndex => self.op_array_index(instruction)?,
                Opcode::ArrayAmend => self.op_array_amend(instruction)?,
                Opcode::Add => {
                    let value = self
                        .registers
                        .get(instruction.b())
                        .wrapping_add(self.registers.get(instruction.c()));
                    self.registers.set(instruction.a(), value);
                }
                Opcode::Mul => {
                    let value = self
                        .registers
                        .get(instruction.b())
                        .wrapping_mul(self.registers.get(instruction.c()));
                    self.registers.set(instruction.a(), value);
                }
                Opcode::Div => {
                    let divisor = self.registers.get(instruction.c());
                    if divisor == 0 {
                        return Err(MachineError::DivisionByZero);
                    }
                    let value = self.registers.get(instruction.b()) / divisor;
                    self.registers.set(instruction.a(), value);
                }
                Opcode::Nand => {
                    let value = !(self.registers.get(instruction.b())
                        & self.registers.get(instruction.c()));
                    self.registers.set(instruction.a(), value);
                }
                Opcode::Halt => {
                    let _ = self.console_out.flush();
                    return Ok(());
                }
                Opcode::Allocate => {
                    let len = self.registers.get(instruction.c());
                    let id = self.heap.allocate(len);
                    self.registers.set(instruction.b(), id);
                }
                Opcode::Abandon => {
                    let id = self.registers.get(instruction.c());
                    self.heap.abandon(id)?;
                }
                Opcode::Output => {
                    let byte = self.registers.get(instruction.c()) as u8;
                    self.console_out
                        .write_all(&[byte])
                        .map_err(|err| MachineError::ConsoleOutputFailure(err.to_string()))?;
                }
                Opcode::Input => self.op_input(instruction)?,
                Opcode::LoadProgram => {
                    // R[B] = 0 is the hot jump-within-program path: the
                    // finger moves but nothing is copied.
                    let source = self.registers.get(instruction.b());
                    if source != 0 {
                        self.heap.replace_program(source)?;
                    }
                    self.finger = self.registers.get(instruction.c());
                }
                Opcode::Orthography => {
                    self.registers
                        .set(instruction.wide_a(), instruction.wide_value());
                }
            }
        }
    }

    fn op_array_index(&mut self, instruction: Instruction) -> Result<(), MachineError> {
        let id = self.registers.get(instruction.b());
        let offset = self.registers.get(instruction.c());
        let segment = self.heap.segment(id)?;
        let value = match segment.get(offset as usize) {
            Some(&value) => value,
            None => {
                return Err(MachineError::SegmentOutOfRange {
                    segment: id,
                    offset,
                    len: segment.len(),
                });
            }
        };
        self.registers.set(instruction.a(), value);
        Ok(())
    }

    fn op_array_amend(&mut self, instruction: Instruction) -> Result<(), MachineError> {
        let id = self.registers.get(instruction.a());
        let offset = self.registers.get(instruction.b());
        let value = self.registers.get(instruction.c());
        let segment = self.heap.segment_mut(id)?;
        let len = segment.len();
        match segment.get_mut(offset as usize) {
            Some(slot) => *slot = value,
            None => {
                return Err(MachineError::SegmentOutOfRange {
                    segment: id,
                    offset,
                    len,
                });
            }
        }
        Ok(())
    }

    fn op_input(&mut self, instruction: Instruction) -> Result<(), MachineError> {
        // Input is the only quiescence point: the guest is already about to
        // block, so a backup taken here needs no coordination with the
        // dispatch loop.
        if let Some(kind) = self.checkpointer.due() {
            let snapshot = self.snapshot();
            self.checkpointer.write(&snapshot, kind);
        }

        // Surface anything the guest printed before it blocks on us.
        if let Err(err) = self.console_out.flush() {
            return Err(MachineError::ConsoleOutputFailure(err.to_string()));
        }

        let mut byte = [0u8; 1];
        loop {
            match self.console_in.read(&mut byte) {
                Ok(0) => {
                    self.registers.set(instruction.c(), END_OF_INPUT);
                    return Ok(());
                }
                Ok(_) => {
                    self.registers.set(instruction.c(), byte[0] as Platter);
                    return Ok(());
                }
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    return Err(MachineError::ConsoleInputFailure(err.to_string()));
                }
            }
        }
    }
}

/// Handle to a running machine's terminal status.
///
/// Yields exactly once: `Ok(())` on a normal Halt, or the fatal error that
/// stopped the run.
pub struct Completion {
    receiver: oneshot::Receiver<Result<(), MachineError>>,
}

impl Completion {
    /// Waits for the machine to finish.
    pub async fn wait(self) -> Result<(), MachineError> {
        self.receiver
            .await
            .unwrap_or(Err(MachineError::EngineVanished))
    }

    /// Blocking variant of [`Completion::wait`] for synchronous embedders.
    pub fn wait_blocking(self) -> Result<(), MachineError> {
        self.receiver
            .blocking_recv()
            .unwrap_or(Err(MachineError::EngineVanished))
    }
}
