use heapless::{String, Vec};
use thiserror_no_std::Error;

use crate::token::Token;
use crate::ProgramWord;

/// Longest label name, in bytes.
pub const NAME_CAP: usize = 32;

/// Operand compiled for a jump reference whose label has not been defined
/// yet. It stays in the program if the label never is.
pub const UNRESOLVED_TARGET: ProgramWord = -1;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum BuilderError {
    #[error("the program does not fit in the instruction buffer")]
    BufferTooSmall,
    #[error("offset {0} does not fit in a program word")]
    OffsetOverflow(usize),
    #[error("label name is longer than 32 bytes")]
    NameTooLong,
    #[error("too many labels")]
    MaxLabelsExceeded,
    #[error("too many forward references to one label")]
    MaxReferencesExceeded,
}

/// What the compiler knows about a label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelEntry<const REF_CAP: usize> {
    /// The label is defined at `jump`.
    Resolved { jump: ProgramWord },
    /// The label has not been defined; `unresolved` holds every operand
    /// slot that referenced it so far, oldest first.
    Pending { unresolved: Vec<usize, REF_CAP> },
}

struct Label<const REF_CAP: usize> {
    name: String<NAME_CAP>,
    entry: LabelEntry<REF_CAP>,
}

/// Summary of a finished program. The instructions live in the buffer
/// the [`ProgramBuilder`] was created with; the first `length` words
/// are the program.
#[derive(Debug)]
pub struct ProgramDescriptor<const LABEL_CAP: usize> {
    pub length: usize,
    pub unresolved: Vec<String<NAME_CAP>, LABEL_CAP>,
}

impl<const LABEL_CAP: usize> ProgramDescriptor<LABEL_CAP> {
    /// Labels that were referenced but never defined. Their references
    /// still hold [`UNRESOLVED_TARGET`].
    pub fn unresolved_labels(&self) -> impl Iterator<Item = &str> {
        self.unresolved.iter().map(|name| name.as_str())
    }
}

/// Append only instruction array plus the label table.
///
/// Program is
/// [opcode][operand?][opcode][operand?]...
///
/// where only the literal opcode carries an operand.
pub struct ProgramBuilder<'a, const LABEL_CAP: usize, const REF_CAP: usize> {
    buffer: &'a mut [ProgramWord],
    free: usize,
    labels: Vec<Label<REF_CAP>, LABEL_CAP>,
}

impl<'a, const LABEL_CAP: usize, const REF_CAP: usize> ProgramBuilder<'a, LABEL_CAP, REF_CAP> {
    pub fn new(buffer: &'a mut [ProgramWord]) -> Self {
        Self {
            buffer,
            free: 0,
            labels: Vec::new(),
        }
    }

    /// Number of words emitted so far.
    pub fn len(&self) -> usize {
        self.free
    }

    pub fn is_empty(&self) -> bool {
        self.free == 0
    }

    pub fn instructions(&self) -> &[ProgramWord] {
        self.buffer.get(..self.free).unwrap_or(&[])
    }

    pub fn label(&self, name: &str) -> Option<&LabelEntry<REF_CAP>> {
        self.labels
            .iter()
            .find(|label| label.name == name)
            .map(|label| &label.entry)
    }

    /// Emits the opcode of a token without an operand.
    pub fn add_token(&mut self, token: Token) -> Result<(), BuilderError> {
        self.add_word(token.into())?;
        Ok(())
    }

    /// Emits `(LITERAL, value)` and returns the position of the operand.
    pub fn push_literal(&mut self, value: ProgramWord) -> Result<usize, BuilderError> {
        self.add_word(Token::Literal.into())?;
        self.add_word(value)
    }

    /// Emits a zero terminator followed by the characters of `text` in
    /// reverse, so popping until zero yields them left to right.
    pub fn push_string(&mut self, text: &str) -> Result<(), BuilderError> {
        self.push_literal(0)?;
        for c in text.chars().rev() {
            // Unicode scalar values are below 0x110000 and fit a ProgramWord.
            self.push_literal(u32::from(c) as ProgramWord)?;
        }
        Ok(())
    }

    /// Binds `name` to the current end of the program and back-patches
    /// every reference made before the definition.
    pub fn define_label(&mut self, name: &str) -> Result<(), BuilderError> {
        let target = self.offset()?;
        let index = match self.find_label(name) {
            Some(index) => index,
            None => self.add_label(name, LabelEntry::Resolved { jump: target })?,
        };
        let Some(label) = self.labels.get_mut(index) else {
            return Err(BuilderError::MaxLabelsExceeded);
        };
        let previous = core::mem::replace(&mut label.entry, LabelEntry::Resolved { jump: target });
        if let LabelEntry::Pending { unresolved } = previous {
            for at in unresolved {
                self.patch_word(at, target)?;
            }
        }
        Ok(())
    }

    /// Emits `(LITERAL, offset of name)`. When `name` is not defined yet
    /// the operand is [`UNRESOLVED_TARGET`] and its position is recorded
    /// for [`define_label`](Self::define_label) to patch.
    pub fn reference_label(&mut self, name: &str) -> Result<(), BuilderError> {
        let index = match self.find_label(name) {
            Some(index) => index,
            None => self.add_label(
                name,
                LabelEntry::Pending {
                    unresolved: Vec::new(),
                },
            )?,
        };
        let jump = match self.labels.get(index).map(|label| &label.entry) {
            Some(LabelEntry::Resolved { jump }) => Some(*jump),
            _ => None,
        };
        if let Some(jump) = jump {
            self.push_literal(jump)?;
            return Ok(());
        }

        let at = self.push_literal(UNRESOLVED_TARGET)?;
        match self.labels.get_mut(index).map(|label| &mut label.entry) {
            Some(LabelEntry::Pending { unresolved }) => unresolved
                .push(at)
                .map_err(|_| BuilderError::MaxReferencesExceeded),
            _ => Err(BuilderError::MaxLabelsExceeded),
        }
    }

    /// Overwrites an already emitted word.
    pub fn patch_word(&mut self, at: usize, value: ProgramWord) -> Result<(), BuilderError> {
        if at >= self.free {
            return Err(BuilderError::BufferTooSmall);
        }
        let slot = self.buffer.get_mut(at).ok_or(BuilderError::BufferTooSmall)?;
        *slot = value;
        Ok(())
    }

    /// Drops the label table. Labels still pending are reported in the
    /// descriptor.
    pub fn finish(self) -> Result<ProgramDescriptor<LABEL_CAP>, BuilderError> {
        let mut unresolved = Vec::new();
        for label in self.labels.iter() {
            if matches!(label.entry, LabelEntry::Pending { .. }) {
                unresolved
                    .push(label.name.clone())
                    .map_err(|_| BuilderError::MaxLabelsExceeded)?;
            }
        }
        Ok(ProgramDescriptor {
            length: self.free,
            unresolved,
        })
    }

    fn add_word(&mut self, word: ProgramWord) -> Result<usize, BuilderError> {
        let at = self.free;
        let slot = self.buffer.get_mut(at).ok_or(BuilderError::BufferTooSmall)?;
        *slot = word;
        self.free = at.checked_add(1).ok_or(BuilderError::BufferTooSmall)?;
        Ok(at)
    }

    fn offset(&self) -> Result<ProgramWord, BuilderError> {
        ProgramWord::try_from(self.free).map_err(|_| BuilderError::OffsetOverflow(self.free))
    }

    fn find_label(&self, name: &str) -> Option<usize> {
        self.labels.iter().position(|label| label.name == name)
    }

    fn add_label(&mut self, name: &str, entry: LabelEntry<REF_CAP>) -> Result<usize, BuilderError> {
        let mut label_name = String::new();
        label_name
            .push_str(name)
            .map_err(|_| BuilderError::NameTooLong)?;
        let index = self.labels.len();
        self.labels
            .push(Label {
                name: label_name,
                entry,
            })
            .map_err(|_| BuilderError::MaxLabelsExceeded)?;
        Ok(index)
    }
}
