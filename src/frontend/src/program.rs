use derive_more::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Op {
    #[display(">")]
    MovePointerRight,
    #[display("<")]
    MovePointerLeft,
    #[display("+")]
    IncrementCell,
    #[display("-")]
    DecrementCell,
    #[display(".")]
    WriteByte,
    #[display(",")]
    ReadByte,
    #[display("[")]
    LoopOpen,
    #[display("]")]
    LoopClose,
}

/// A recognized source character and the byte offset it was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[display("{op}")]
pub struct Instruction {
    pub op: Op,
    pub offset: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Program {
    pub instructions: Vec<Instruction>,
}

impl Program {
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a Program {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}

impl std::fmt::Display for Program {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        for instruction in &self.instructions {
            write!(f, "{instruction}")?;
        }
        Ok(())
    }
}

/// Bracket pairs of a [`Program`], indexed by instruction position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchTable {
    partners: Vec<Option<usize>>,
}

impl MatchTable {
    pub(crate) fn with_len(len: usize) -> Self {
        MatchTable {
            partners: vec![None; len],
        }
    }

    pub(crate) fn insert(&mut self, open: usize, close: usize) {
        self.partners[open] = Some(close);
        self.partners[close] = Some(open);
    }

    /// Index of the `]` matching the `[` at `open`.
    pub fn close_of(&self, open: usize) -> Option<usize> {
        self.partner(open).filter(|&close| close > open)
    }

    /// Index of the `[` matching the `]` at `close`.
    pub fn open_of(&self, close: usize) -> Option<usize> {
        self.partner(close).filter(|&open| open < close)
    }

    pub fn partner(&self, index: usize) -> Option<usize> {
        self.partners.get(index).copied().flatten()
    }

    /// All `(open, close)` pairs, ordered by the position of the `[`.
    pub fn pairs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.partners
            .iter()
            .enumerate()
            .filter_map(|(index, partner)| {
                partner
                    .filter(|&close| close > index)
                    .map(|close| (index, close))
            })
    }

    /// Number of matched pairs.
    pub fn len(&self) -> usize {
        self.pairs().count()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.iter().all(Option::is_none)
    }

    /// Length of the program this table was built for.
    pub fn program_len(&self) -> usize {
        self.partners.len()
    }
}

/// A program whose brackets are known to be balanced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedProgram {
    pub program: Program,
    pub matches: MatchTable,
}
