// Single pass compiler. Source text is consumed from the front: at every
// step the token table is tried in priority order and the first token
// matching a non-empty prefix encodes itself into the program builder.
// Forward jump references are back-patched by the builder when their
// label shows up, so no second pass is needed.

use heapless::String;
use thiserror_no_std::Error;

use crate::builder::{BuilderError, NAME_CAP, ProgramBuilder, ProgramDescriptor};
use crate::token::{self, TOKEN_TABLE, Token};
use crate::ProgramWord;

/// Characters of the offending line quoted in a parse error.
pub const SNIPPET_CHARS: usize = 20;
/// Byte capacity for a quoted snippet of `SNIPPET_CHARS` characters.
pub const SNIPPET_CAP: usize = SNIPPET_CHARS * 4;

pub type Snippet = String<SNIPPET_CAP>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CompileError {
    #[error("unable to parse program at line {line}: {snippet}")]
    UnparseableInput { line: u32, snippet: Snippet },
    #[error("literal {0} does not fit in a program word")]
    LiteralOutOfRange(Snippet),
    #[error("label {0} is referenced but never defined")]
    UnresolvedLabel(String<NAME_CAP>),
    #[error("line number overflowed")]
    LineNumberOverflow,
    #[error("{0}")]
    Builder(BuilderError),
}

impl From<BuilderError> for CompileError {
    fn from(err: BuilderError) -> Self {
        CompileError::Builder(err)
    }
}

impl CompileError {
    /// Line the error was found on, when known.
    pub fn line_number(&self) -> Option<u32> {
        match self {
            Self::UnparseableInput { line, .. } => Some(*line),
            _ => None,
        }
    }
}

pub struct Compiler<'a, const LABEL_CAP: usize, const REF_CAP: usize> {
    builder: ProgramBuilder<'a, LABEL_CAP, REF_CAP>,
    line_number: u32,
    strict: bool,
}

impl<'a, const LABEL_CAP: usize, const REF_CAP: usize> Compiler<'a, LABEL_CAP, REF_CAP> {
    pub fn new(builder: ProgramBuilder<'a, LABEL_CAP, REF_CAP>) -> Self {
        Self {
            builder,
            line_number: 1,
            strict: false,
        }
    }

    /// In strict mode [`finish`](Self::finish) rejects labels that were
    /// referenced but never defined instead of leaving the placeholder in
    /// the program.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn builder(&self) -> &ProgramBuilder<'a, LABEL_CAP, REF_CAP> {
        &self.builder
    }

    /// Compiles `source` onto the end of the program. May be called
    /// several times; labels are shared between calls.
    pub fn add_source(&mut self, source: &str) -> Result<(), CompileError> {
        let mut rest = source;
        while !rest.is_empty() {
            rest = self.next(rest)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<ProgramDescriptor<LABEL_CAP>, CompileError> {
        let descriptor = self.builder.finish()?;
        if self.strict {
            if let Some(name) = descriptor.unresolved.first() {
                return Err(CompileError::UnresolvedLabel(name.clone()));
            }
        }
        Ok(descriptor)
    }

    fn next<'s>(&mut self, input: &'s str) -> Result<&'s str, CompileError> {
        for token in TOKEN_TABLE {
            let Some(length) = token.recognize(input) else {
                continue;
            };
            let Some((lexeme, rest)) = input.split_at_checked(length) else {
                continue;
            };
            token.compile(lexeme, &mut self.builder)?;
            self.count_lines(lexeme)?;
            return Ok(rest);
        }
        Err(CompileError::UnparseableInput {
            line: self.line_number,
            snippet: snippet(input),
        })
    }

    fn count_lines(&mut self, lexeme: &str) -> Result<(), CompileError> {
        let newlines = u32::try_from(lexeme.matches('\n').count())
            .map_err(|_| CompileError::LineNumberOverflow)?;
        self.line_number = self
            .line_number
            .checked_add(newlines)
            .ok_or(CompileError::LineNumberOverflow)?;
        Ok(())
    }
}

impl Token {
    /// Compile time action: encodes one matched lexeme into the program.
    pub fn compile<const LABEL_CAP: usize, const REF_CAP: usize>(
        self,
        lexeme: &str,
        builder: &mut ProgramBuilder<'_, LABEL_CAP, REF_CAP>,
    ) -> Result<(), CompileError> {
        match self {
            Token::Literal => {
                let value = lexeme
                    .parse::<ProgramWord>()
                    .map_err(|_| CompileError::LiteralOutOfRange(snippet(lexeme)))?;
                builder.push_literal(value)?;
            }
            Token::Label => builder.define_label(token::body(lexeme))?,
            Token::Jump => builder.reference_label(token::body(lexeme))?,
            Token::StringLiteral => builder.push_string(token::body(lexeme))?,
            Token::Comment | Token::Whitespace => {}
            Token::Hanoi
            | Token::Swap
            | Token::Pop
            | Token::Print
            | Token::Add
            | Token::Dup
            | Token::Out => builder.add_token(self)?,
        }
        Ok(())
    }
}

/// Compiles `source` into `buffer` with default settings.
pub fn compile<const LABEL_CAP: usize, const REF_CAP: usize>(
    source: &str,
    buffer: &mut [ProgramWord],
) -> Result<ProgramDescriptor<LABEL_CAP>, CompileError> {
    let mut compiler = Compiler::<LABEL_CAP, REF_CAP>::new(ProgramBuilder::new(buffer));
    compiler.add_source(source)?;
    compiler.finish()
}

fn snippet(input: &str) -> Snippet {
    let line = input.split(['\n', '\r']).next().unwrap_or("");
    let mut out = Snippet::new();
    for c in line.chars().take(SNIPPET_CHARS) {
        if out.push(c).is_err() {
            break;
        }
    }
    out
}
