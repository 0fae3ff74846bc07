use super::*;
use crate::compiler::compile;
use crate::token::TOKEN_TABLE;

extern crate std;
use std::string::{String, ToString};
use std::vec::Vec as StdVec;
use std::vec;

const TOWER_CAP: usize = 32;
const LABEL_CAP: usize = 8;
const REF_CAP: usize = 8;

fn compile_program(source: &str) -> StdVec<ProgramWord> {
    let mut buffer = vec![0; 256];
    let descriptor = compile::<LABEL_CAP, REF_CAP>(source, &mut buffer).unwrap();
    buffer.truncate(descriptor.length);
    buffer
}

fn run_words(words: &[ProgramWord]) -> Result<(Machine<TOWER_CAP>, String), MachineError> {
    let mut machine = Machine::new();
    let mut program = Program::new(words);
    let mut output = String::new();
    machine.run(&mut program, &mut output)?;
    Ok((machine, output))
}

fn run_source(source: &str) -> Result<(Machine<TOWER_CAP>, String), MachineError> {
    run_words(&compile_program(source))
}

fn tower(index: usize) -> TowerIndex {
    TowerIndex::new(index).unwrap()
}

#[test]
fn test_add_literals() -> Result<(), MachineError> {
    let (machine, output) = run_source("100 200 +")?;
    assert_eq!(machine.current_stack(), &[300]);
    assert!(output.is_empty());
    Ok(())
}

#[test]
fn test_add_chain() -> Result<(), MachineError> {
    let (machine, _) = run_source(
        "
    100 200 +   ; add 100 and 200
    400         ; push 400 to stack
    +           ; add result
",
    )?;
    assert_eq!(machine.current_stack(), &[700]);
    Ok(())
}

#[test]
fn test_add_wraps() -> Result<(), MachineError> {
    let (machine, _) = run_source("2147483647 1 +")?;
    assert_eq!(machine.current_stack(), &[i32::MIN]);
    Ok(())
}

#[test]
fn test_print_string() -> Result<(), MachineError> {
    let (machine, output) = run_source("'hi'>")?;
    assert_eq!(output, "hi");
    // The terminator is consumed along with the characters.
    assert!(machine.current_stack().is_empty());
    Ok(())
}

#[test]
fn test_print_stops_at_zero() -> Result<(), MachineError> {
    let (machine, output) = run_source("7 'ab'>")?;
    assert_eq!(output, "ab");
    assert_eq!(machine.current_stack(), &[7]);
    Ok(())
}

#[test]
fn test_hello_sample_output() -> Result<(), MachineError> {
    let (_, output) = run_source(
        "
    'hello world'>
    10.
    'wow!'>
",
    )?;
    assert_eq!(output, "hello world\nwow!");
    Ok(())
}

#[test]
fn test_output_char() -> Result<(), MachineError> {
    let (machine, output) = run_source("72 105 . .")?;
    assert_eq!(output, "iH");
    assert!(machine.current_stack().is_empty());
    Ok(())
}

#[test]
fn test_output_invalid_char() {
    let words = [0, -5, Token::Out.into()];
    let err = run_words(&words).unwrap_err();
    assert_eq!(err, MachineError::InvalidCharacter(-5));
}

#[test]
fn test_dup() -> Result<(), MachineError> {
    let (machine, _) = run_source("5\"\"")?;
    assert_eq!(machine.current_stack(), &[5, 5, 5]);
    Ok(())
}

#[test]
fn test_pop_discards_top() -> Result<(), MachineError> {
    let (machine, _) = run_source("1 2 3 ^")?;
    assert_eq!(machine.current_stack(), &[1, 2]);
    Ok(())
}

#[test]
fn test_swap_leaves_stack_unchanged() -> Result<(), MachineError> {
    // Adjacent swap writes the top slot twice and never touches the second
    // slot, so nothing visibly moves.
    let (machine, _) = run_source("1 2 $")?;
    assert_eq!(machine.current_stack(), &[1, 2]);
    Ok(())
}

#[test]
fn test_swap_on_short_stack_is_ignored() -> Result<(), MachineError> {
    let (machine, _) = run_source("9 $")?;
    assert_eq!(machine.current_stack(), &[9]);
    let (machine, _) = run_source("$")?;
    assert!(machine.current_stack().is_empty());
    Ok(())
}

#[test]
fn test_transfer_moves_in_pop_order() -> Result<(), MachineError> {
    // Stack before `_`: 10 20 30 | count 2 | target 1
    let (machine, _) = run_source("10 20 30 2 1 _")?;
    assert_eq!(machine.current(), tower(1));
    assert_eq!(machine.tower(tower(0)), &[10]);
    assert_eq!(machine.tower(tower(1)), &[30, 20]);
    assert!(machine.tower(tower(2)).is_empty());
    Ok(())
}

#[test]
fn test_transfer_repoints_current_stack() -> Result<(), MachineError> {
    let (machine, _) = run_source("4 1 2 _ 5 + \"")?;
    assert_eq!(machine.current(), tower(2));
    assert!(machine.tower(tower(0)).is_empty());
    assert_eq!(machine.tower(tower(2)), &[9, 9]);
    Ok(())
}

#[test]
fn test_transfer_round_trip() -> Result<(), MachineError> {
    let (machine, _) = run_source("1 2 3 3 1 _ 3 0 _")?;
    assert_eq!(machine.current(), tower(0));
    assert_eq!(machine.tower(tower(0)), &[1, 2, 3]);
    assert!(machine.tower(tower(1)).is_empty());
    Ok(())
}

#[test]
fn test_transfer_zero_and_negative_count() -> Result<(), MachineError> {
    let (machine, _) = run_source("7 0 2 _")?;
    assert_eq!(machine.current(), tower(2));
    assert_eq!(machine.tower(tower(0)), &[7]);
    assert!(machine.current_stack().is_empty());

    // Counts can only be negative when built by hand.
    let words = [0, 7, 0, -3, 0, 1, Token::Hanoi.into()];
    let (machine, _) = run_words(&words)?;
    assert_eq!(machine.current(), tower(1));
    assert_eq!(machine.tower(tower(0)), &[7]);
    Ok(())
}

#[test]
fn test_transfer_to_current_tower() -> Result<(), MachineError> {
    let (machine, _) = run_source("1 2 2 0 _")?;
    assert_eq!(machine.current(), tower(0));
    assert_eq!(machine.current_stack(), &[1, 2]);
    Ok(())
}

#[test]
fn test_transfer_invalid_tower() {
    let err = run_source("1 1 3 _").unwrap_err();
    assert_eq!(err, MachineError::TowerIndexOutOfRange(3));
}

#[test]
fn test_transfer_underflow() {
    let err = run_source("1 5 1 _").unwrap_err();
    assert_eq!(err, MachineError::StackUnderFlow);
}

#[test]
fn test_underflow_faults() {
    for source in ["^", "+", "1 +", "\"", ".", ">", "_", "1 _"] {
        let err = run_source(source).unwrap_err();
        assert_eq!(err, MachineError::StackUnderFlow, "source {source:?}");
    }
}

#[test]
fn test_print_without_terminator_underflows() {
    let err = run_source("104 105 >").unwrap_err();
    assert_eq!(err, MachineError::StackUnderFlow);
}

#[test]
fn test_stack_overflow() {
    let mut machine: Machine<2> = Machine::new();
    let words = compile_program("1 2 3");
    let mut program = Program::new(&words);
    let err = machine.run(&mut program, &mut String::new()).unwrap_err();
    assert_eq!(err, MachineError::StackOverflow);
    assert_eq!(machine.current_stack(), &[1, 2]);
}

#[test]
fn test_jump_reference_pushes_offset() -> Result<(), MachineError> {
    // Jump references only push their target; nothing transfers control.
    let (machine, _) = run_source("(loop) [loop] 10")?;
    assert_eq!(machine.current_stack(), &[2, 10]);
    Ok(())
}

#[test]
fn test_unresolved_reference_pushes_placeholder() -> Result<(), MachineError> {
    let (machine, _) = run_source("(nowhere)")?;
    assert_eq!(machine.current_stack(), &[builder::UNRESOLVED_TARGET]);
    Ok(())
}

#[test]
fn test_compile_only_opcode_is_invalid() {
    let compile_only = [
        Token::Label,
        Token::Jump,
        Token::StringLiteral,
        Token::Comment,
        Token::Whitespace,
    ];
    for token in compile_only {
        assert!(!token.is_executable());
        let words = [token.into()];
        let err = run_words(&words).unwrap_err();
        assert_eq!(err, MachineError::InvalidOp(token.into()));
    }
    let executable = TOKEN_TABLE.iter().filter(|token| token.is_executable()).count();
    assert_eq!(executable, 8);
}

#[test]
fn test_unknown_opcode_is_invalid() {
    let err = run_words(&[42]).unwrap_err();
    assert_eq!(err, MachineError::InvalidOp(42));
    let err = run_words(&[-1]).unwrap_err();
    assert_eq!(err, MachineError::InvalidOp(-1));
}

#[test]
fn test_literal_missing_operand() {
    let err = run_words(&[0, 1, 0]).unwrap_err();
    assert_eq!(err, MachineError::OutOfBoundsProgramRead(3));
}

#[test]
fn test_empty_program() -> Result<(), MachineError> {
    let (machine, output) = run_words(&[])?;
    assert!(machine.towers().iter().all(|tower| tower.is_empty()));
    assert_eq!(machine.current(), TowerIndex::FIRST);
    assert!(output.is_empty());
    Ok(())
}

#[test]
fn test_step_advances_one_instruction() -> Result<(), MachineError> {
    let words = compile_program("1 2 +");
    let mut machine: Machine<TOWER_CAP> = Machine::new();
    let mut program = Program::new(&words);
    let mut output = String::new();

    assert!(machine.step(&mut program, &mut output)?);
    assert_eq!(program.pc(), 2);
    assert_eq!(machine.current_stack(), &[1]);

    assert!(machine.step(&mut program, &mut output)?);
    assert_eq!(program.pc(), 4);

    assert!(!machine.step(&mut program, &mut output)?);
    assert!(program.is_halted());
    assert_eq!(machine.current_stack(), &[3]);

    assert!(!machine.step(&mut program, &mut output)?);
    Ok(())
}

#[test]
fn test_output_sink_failure() {
    struct Full;
    impl Write for Full {
        fn write_str(&mut self, _: &str) -> fmt::Result {
            Err(fmt::Error)
        }
    }
    let words = compile_program("65.");
    let mut machine: Machine<TOWER_CAP> = Machine::new();
    let err = machine
        .run(&mut Program::new(&words), &mut Full)
        .unwrap_err();
    assert_eq!(err, MachineError::OutputFailed);
}

#[test]
fn test_snapshot() -> Result<(), MachineError> {
    let (machine, _) = run_source("1 2 3 1 2 _")?;
    let snapshot = machine.snapshot();
    assert_eq!(snapshot.current, tower(2));
    assert_eq!(snapshot.towers[0].as_slice(), &[1, 2]);
    assert!(snapshot.towers[1].is_empty());
    assert_eq!(snapshot.towers[2].as_slice(), &[3]);
    Ok(())
}

#[test]
fn test_tower_index_bounds() {
    assert_eq!(TowerIndex::new(2).map(TowerIndex::get), Some(2));
    assert_eq!(TowerIndex::new(3), None);
    assert_eq!(
        TowerIndex::try_from(-1),
        Err(MachineError::TowerIndexOutOfRange(-1))
    );
}

#[test]
fn test_decode() -> Result<(), MachineError> {
    let words = compile_program("100 200 + 'a'>");
    let lines = decode(&words)
        .map(|instruction| instruction.map(|i| i.to_string()))
        .collect::<Result<StdVec<_>, _>>()?;
    assert_eq!(
        lines,
        [
            "0000 LITERAL 100",
            "0002 LITERAL 200",
            "0004 ADD",
            "0005 LITERAL 0",
            "0007 LITERAL 97",
            "0009 PRINT",
        ]
    );
    Ok(())
}

#[test]
fn test_decode_stops_after_error() {
    let words = [Token::Add.into(), 77, Token::Pop.into()];
    let decoded: StdVec<_> = decode(&words).collect();
    assert_eq!(decoded.len(), 2);
    assert!(decoded[0].is_ok());
    assert_eq!(decoded[1], Err(MachineError::InvalidOp(77)));
}
