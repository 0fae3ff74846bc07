//! The token table.
//!
//! Every construct of the surface syntax is a [`Token`]. The declaration
//! order of the enum is the priority order used by the compiler: the first
//! token whose pattern matches a non-empty prefix of the remaining input
//! wins. The discriminant of a token doubles as its opcode in the compiled
//! instruction array.
//!
//! Each token carries its own behavior:
//! - [`Token::recognize`] (here) matches the pattern,
//! - [`Token::compile`](crate::compiler) encodes a match into the program,
//! - [`Token::execute`](crate::Machine) is the runtime action.

use core::fmt;

use variant_count::VariantCount;

use crate::{MachineError, ProgramWord};

#[repr(i32)] // Must match ProgramWord
#[derive(VariantCount, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    /// `[0-9]+`
    Literal,
    /// `_`
    Hanoi,
    /// `$`
    Swap,
    /// `^`
    Pop,
    /// `>`
    Print,
    /// `+`
    Add,
    /// `[name]`
    Label,
    /// `(name)`
    Jump,
    /// `"`
    Dup,
    /// `.`
    Out,
    /// `'text'`
    StringLiteral,
    /// `;` up to and including the end of the line.
    Comment,
    /// Blanks and line breaks, as matched by `\s`.
    Whitespace,
}

/// All tokens in priority order. Indexing this table with an opcode yields
/// the token that emitted it.
pub const TOKEN_TABLE: [Token; Token::VARIANT_COUNT] = [
    Token::Literal,
    Token::Hanoi,
    Token::Swap,
    Token::Pop,
    Token::Print,
    Token::Add,
    Token::Label,
    Token::Jump,
    Token::Dup,
    Token::Out,
    Token::StringLiteral,
    Token::Comment,
    Token::Whitespace,
];

impl Token {
    /// Upper case name used in disassembly and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Token::Literal => "LITERAL",
            Token::Hanoi => "HANOI",
            Token::Swap => "SWAP",
            Token::Pop => "POP",
            Token::Print => "PRINT",
            Token::Add => "ADD",
            Token::Label => "LABEL",
            Token::Jump => "JUMP",
            Token::Dup => "DUP",
            Token::Out => "OUT",
            Token::StringLiteral => "STRING_LITERAL",
            Token::Comment => "COMMENT",
            Token::Whitespace => "WHITESPACE",
        }
    }

    /// Whether the opcode of this token has a runtime action. Tokens that
    /// only exist at compile time never appear as opcodes in a compiled
    /// program.
    pub fn is_executable(self) -> bool {
        !matches!(
            self,
            Token::Label | Token::Jump | Token::StringLiteral | Token::Comment | Token::Whitespace
        )
    }

    /// Length in bytes of the prefix of `input` matched by this token, or
    /// `None` when the pattern does not match a non-empty prefix.
    pub fn recognize(self, input: &str) -> Option<usize> {
        let length = match self {
            Token::Literal => input.bytes().take_while(u8::is_ascii_digit).count(),
            Token::Hanoi => single(input, '_'),
            Token::Swap => single(input, '$'),
            Token::Pop => single(input, '^'),
            Token::Print => single(input, '>'),
            Token::Add => single(input, '+'),
            Token::Label => delimited(input, '[', ']')?,
            Token::Jump => delimited(input, '(', ')')?,
            Token::Dup => single(input, '"'),
            Token::Out => single(input, '.'),
            Token::StringLiteral => delimited(input, '\'', '\'')?,
            Token::Comment => {
                if !input.starts_with(';') {
                    return None;
                }
                match input.find('\n') {
                    Some(newline) => newline.checked_add(1)?,
                    None => input.len(),
                }
            }
            Token::Whitespace => input
                .char_indices()
                .find(|(_, c)| !is_blank(*c))
                .map_or(input.len(), |(index, _)| index),
        };
        (length > 0).then_some(length)
    }
}

impl From<Token> for ProgramWord {
    fn from(token: Token) -> ProgramWord {
        token as ProgramWord
    }
}

impl TryFrom<ProgramWord> for Token {
    type Error = MachineError;
    fn try_from(value: ProgramWord) -> Result<Self, Self::Error> {
        usize::try_from(value)
            .ok()
            .and_then(|index| TOKEN_TABLE.get(index))
            .copied()
            .ok_or(MachineError::InvalidOp(value))
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The text between the opening and closing delimiter of a label, jump
/// reference or string literal lexeme.
pub(crate) fn body(lexeme: &str) -> &str {
    lexeme
        .len()
        .checked_sub(1)
        .and_then(|end| lexeme.get(1..end))
        .unwrap_or("")
}

// Unicode White_Space without NEL (U+0085), plus the byte order mark
// U+FEFF: the set a `\s` class matches in ECMAScript.
fn is_blank(c: char) -> bool {
    c == '\u{feff}' || (c != '\u{85}' && c.is_whitespace())
}

fn single(input: &str, c: char) -> usize {
    if input.starts_with(c) { c.len_utf8() } else { 0 }
}

// Greedy within one line: the match ends at the last `close` before the
// line break, like `\[.*\]` in a line oriented regular expression.
fn delimited(input: &str, open: char, close: char) -> Option<usize> {
    let rest = input.strip_prefix(open)?;
    let line_end = rest.find(['\n', '\r']).unwrap_or(rest.len());
    let line = rest.get(..line_end)?;
    let close_at = line.rfind(close)?;
    open.len_utf8()
        .checked_add(close_at)?
        .checked_add(close.len_utf8())
}
