#![no_std]
#![cfg_attr(
    not(test),
    deny(
        clippy::panic,
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::todo,
        clippy::unimplemented,
        clippy::indexing_slicing,
        clippy::string_slice,
        clippy::arithmetic_side_effects,
        clippy::panicking_unwrap,
        clippy::out_of_bounds_indexing,
        clippy::panic_in_result_fn,
        clippy::unwrap_in_result,
    )
)]
#![cfg_attr(not(test), warn(clippy::missing_panics_doc))]

//! Compiler and virtual machine for Hanoi programs.
//!
//! A machine owns three towers, independent stacks addressed by index,
//! and the index of the "current" tower all stack operations act on.
//! Only the tower transfer operation (`_`) moves the current index: it
//! pops a tower index and a count, moves that many values from the
//! current tower onto the addressed one and makes it current.
//!
//! The instruction array is a flat sequence of words. Each word is
//! either an opcode, the discriminant of the [`Token`] that emitted it,
//! or the operand of the literal opcode preceding it. Execution walks
//! the array front to back; there is no branch instruction, so a run
//! always ends by falling off the end of the array.

use core::fmt::{self, Write};

use heapless::Vec;
use serde::Serialize;
use thiserror_no_std::Error;

pub mod builder;
pub mod compiler;
pub mod token;

pub use token::Token;


/// Program words and stack values share one signed domain, so compiled
/// offsets, character codes and the unresolved label placeholder can all
/// be pushed as data.
pub type ProgramWord = i32;
pub type StackWord = i32;

pub const TOWER_COUNT: usize = 3;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MachineError {
    #[error("the value {0} is an invalid opcode")]
    InvalidOp(ProgramWord),
    #[error("index {0} out of range of the program")]
    OutOfBoundsProgramRead(usize),
    #[error("attempted operation would overflow the stack")]
    StackOverflow,
    #[error("attempted operation would underflow the stack")]
    StackUnderFlow,
    #[error("value {0} is not a tower index")]
    TowerIndexOutOfRange(StackWord),
    #[error("value {0} is not a character")]
    InvalidCharacter(StackWord),
    #[error("the output sink rejected a character")]
    OutputFailed,
}

/// Index of one of the three towers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TowerIndex(u8);

impl TowerIndex {
    pub const FIRST: Self = Self(0);

    pub fn new(index: usize) -> Option<Self> {
        if index >= TOWER_COUNT {
            return None;
        }
        u8::try_from(index).ok().map(Self)
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl TryFrom<StackWord> for TowerIndex {
    type Error = MachineError;
    fn try_from(value: StackWord) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(TowerIndex::new)
            .ok_or(MachineError::TowerIndexOutOfRange(value))
    }
}

/// A compiled instruction array and the program counter walking it.
pub struct Program<'a> {
    instructions: &'a [ProgramWord],
    pc: usize,
}

impl<'a> Program<'a> {
    pub fn new(instructions: &'a [ProgramWord]) -> Self {
        Self { instructions, pc: 0 }
    }

    pub fn instructions(&self) -> &'a [ProgramWord] {
        self.instructions
    }

    pub fn pc(&self) -> usize {
        self.pc
    }

    pub fn is_halted(&self) -> bool {
        self.pc >= self.instructions.len()
    }

    fn advance(&mut self) -> Result<(), MachineError> {
        self.pc = next_pc(self.pc)?;
        Ok(())
    }

    // Inline operand of the current opcode. Leaves the counter on the
    // operand so the loop's own increment steps past both words.
    fn operand(&mut self) -> Result<ProgramWord, MachineError> {
        self.advance()?;
        read_program(self.pc, self.instructions)
    }
}

/// Read only copy of a machine's state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot<const TOWER_CAP: usize> {
    pub towers: [Vec<StackWord, TOWER_CAP>; TOWER_COUNT],
    pub current: TowerIndex,
}

#[derive(Debug)]
pub struct Machine<const TOWER_CAP: usize> {
    towers: [Vec<StackWord, TOWER_CAP>; TOWER_COUNT],
    current: TowerIndex,
}

impl<const TOWER_CAP: usize> Machine<TOWER_CAP> {
    pub fn new() -> Self {
        Self {
            towers: [Vec::new(), Vec::new(), Vec::new()],
            current: TowerIndex::FIRST,
        }
    }

    pub fn towers(&self) -> &[Vec<StackWord, TOWER_CAP>; TOWER_COUNT] {
        &self.towers
    }

    pub fn tower(&self, index: TowerIndex) -> &[StackWord] {
        self.towers
            .get(index.get())
            .map(|tower| tower.as_slice())
            .unwrap_or(&[])
    }

    pub fn current(&self) -> TowerIndex {
        self.current
    }

    pub fn current_stack(&self) -> &[StackWord] {
        self.tower(self.current)
    }

    pub fn snapshot(&self) -> Snapshot<TOWER_CAP> {
        Snapshot {
            towers: self.towers.clone(),
            current: self.current,
        }
    }

    /// Runs `program` until its counter falls off the end of the
    /// instruction array. Characters emitted by the program are written to
    /// `out`. Any fault stops the run and leaves the machine in whatever
    /// state it reached, including values already moved or popped by the
    /// faulting instruction.
    pub fn run<W: Write>(
        &mut self,
        program: &mut Program<'_>,
        out: &mut W,
    ) -> Result<(), MachineError> {
        while self.step(program, out)? {}
        Ok(())
    }

    /// Executes one instruction. Returns `false` once the program has
    /// halted.
    pub fn step<W: Write>(
        &mut self,
        program: &mut Program<'_>,
        out: &mut W,
    ) -> Result<bool, MachineError> {
        if program.is_halted() {
            return Ok(false);
        }
        let word = read_program(program.pc, program.instructions)?;
        let token = Token::try_from(word)?;
        token.execute(self, program, out)?;
        program.advance()?;
        Ok(!program.is_halted())
    }

    fn tower_mut(
        &mut self,
        index: TowerIndex,
    ) -> Result<&mut Vec<StackWord, TOWER_CAP>, MachineError> {
        let value = StackWord::from(index.0);
        self.towers
            .get_mut(index.get())
            .ok_or(MachineError::TowerIndexOutOfRange(value))
    }

    fn pop(&mut self) -> Result<StackWord, MachineError> {
        self.tower_mut(self.current)?
            .pop()
            .ok_or(MachineError::StackUnderFlow)
    }

    fn push(&mut self, value: StackWord) -> Result<(), MachineError> {
        push(self.tower_mut(self.current)?, value)
    }

    fn peek(&self) -> Result<StackWord, MachineError> {
        self.current_stack()
            .last()
            .copied()
            .ok_or(MachineError::StackUnderFlow)
    }

    fn transfer(&mut self) -> Result<(), MachineError> {
        let target = TowerIndex::try_from(self.pop()?)?;
        let count = self.pop()?;
        for _ in 0..count.max(0) {
            let value = self.pop()?;
            push(self.tower_mut(target)?, value)?;
        }
        self.current = target;
        Ok(())
    }

    // Writes the second value into the top slot and then the saved top
    // back over it. The second slot is never written, so the stack is left
    // as it was.
    fn swap_adjacent(&mut self) -> Result<(), MachineError> {
        let stack = self.tower_mut(self.current)?;
        let (Some(top), Some(second)) = (
            stack.len().checked_sub(1),
            stack.len().checked_sub(2),
        ) else {
            return Ok(());
        };
        let temp = *stack.get(top).ok_or(MachineError::StackUnderFlow)?;
        let below = *stack.get(second).ok_or(MachineError::StackUnderFlow)?;
        let slot = stack.get_mut(top).ok_or(MachineError::StackUnderFlow)?;
        *slot = below;
        *slot = temp;
        Ok(())
    }
}

impl<const TOWER_CAP: usize> Default for Machine<TOWER_CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl Token {
    /// Runtime action. Only the literal reads an operand; it leaves the
    /// program counter on that operand.
    pub fn execute<const TOWER_CAP: usize, W: Write>(
        self,
        machine: &mut Machine<TOWER_CAP>,
        program: &mut Program<'_>,
        out: &mut W,
    ) -> Result<(), MachineError> {
        match self {
            Token::Literal => {
                let value = program.operand()?;
                machine.push(value)?;
            }
            Token::Hanoi => machine.transfer()?,
            Token::Swap => machine.swap_adjacent()?,
            Token::Pop => {
                let _ = machine.pop()?;
            }
            Token::Print => loop {
                let value = machine.pop()?;
                if value == 0 {
                    break;
                }
                emit(out, value)?;
            },
            Token::Add => {
                let rhs = machine.pop()?;
                let lhs = machine.pop()?;
                machine.push(lhs.wrapping_add(rhs))?;
            }
            Token::Dup => {
                let value = machine.peek()?;
                machine.push(value)?;
            }
            Token::Out => {
                let value = machine.pop()?;
                emit(out, value)?;
            }
            Token::Label
            | Token::Jump
            | Token::StringLiteral
            | Token::Comment
            | Token::Whitespace => return Err(MachineError::InvalidOp(self.into())),
        }
        Ok(())
    }
}

/// One decoded instruction of a compiled program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instruction {
    pub offset: usize,
    pub token: Token,
    pub operand: Option<ProgramWord>,
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04} {}", self.offset, self.token)?;
        if let Some(operand) = self.operand {
            write!(f, " {operand}")?;
        }
        Ok(())
    }
}

/// Walks an instruction array the way the machine does, without executing
/// it.
pub struct Decoder<'a> {
    instructions: &'a [ProgramWord],
    offset: usize,
    failed: bool,
}

pub fn decode(instructions: &[ProgramWord]) -> Decoder<'_> {
    Decoder {
        instructions,
        offset: 0,
        failed: false,
    }
}

impl Decoder<'_> {
    fn decode_next(&mut self) -> Result<Instruction, MachineError> {
        let offset = self.offset;
        let token = Token::try_from(read_program(offset, self.instructions)?)?;
        let mut next = next_pc(offset)?;
        let operand = if token == Token::Literal {
            let operand = read_program(next, self.instructions)?;
            next = next_pc(next)?;
            Some(operand)
        } else {
            None
        };
        self.offset = next;
        Ok(Instruction {
            offset,
            token,
            operand,
        })
    }
}

impl Iterator for Decoder<'_> {
    type Item = Result<Instruction, MachineError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.offset >= self.instructions.len() {
            return None;
        }
        let result = self.decode_next();
        self.failed = result.is_err();
        Some(result)
    }
}

fn next_pc(pc: usize) -> Result<usize, MachineError> {
    pc.checked_add(1)
        .ok_or(MachineError::OutOfBoundsProgramRead(pc))
}

fn read_program(index: usize, program: &[ProgramWord]) -> Result<ProgramWord, MachineError> {
    match program.get(index) {
        None => Err(MachineError::OutOfBoundsProgramRead(index)),
        Some(word) => Ok(*word),
    }
}

fn push<const TOWER_CAP: usize>(
    stack: &mut Vec<StackWord, TOWER_CAP>,
    value: StackWord,
) -> Result<(), MachineError> {
    if stack.push(value).is_err() {
        return Err(MachineError::StackOverflow);
    }
    Ok(())
}

fn emit<W: Write>(out: &mut W, value: StackWord) -> Result<(), MachineError> {
    let c = u32::try_from(value)
        .ok()
        .and_then(char::from_u32)
        .ok_or(MachineError::InvalidCharacter(value))?;
    out.write_char(c).map_err(|_| MachineError::OutputFailed)
}

#[cfg(test)]
mod test;
