pub mod program;
mod lexer;
mod validate;

pub use {
    program::{Instruction, MatchTable, Op, Program, ValidatedProgram},
    validate::StructureError,
};

/// Strips everything but the eight instruction characters from `src`.
pub fn tokenize(src: &str) -> Program {
    use chumsky::Parser;

    let instructions = lexer::lexer()
        .parse(src)
        .into_result()
        .expect("every character is either an instruction or a comment");
    tracing::debug!(instructions = instructions.len(), "tokenized source");
    Program { instructions }
}

/// Pairs up the loop brackets of `program`.
pub fn validate(program: &Program) -> Result<MatchTable, StructureError> {
    let matches = validate::match_brackets(program)?;
    tracing::debug!(loops = matches.len(), "validated loop structure");
    Ok(matches)
}

impl TryFrom<&str> for ValidatedProgram {
    type Error = StructureError;

    fn try_from(src: &str) -> Result<Self, Self::Error> {
        let program = tokenize(src);
        let matches = validate(&program)?;
        Ok(ValidatedProgram { program, matches })
    }
}

/// 1-based line and column of a byte offset, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn locate(src: &str, offset: usize) -> Self {
        let before = &src.as_bytes()[..offset.min(src.len())];
        let line_start = before
            .iter()
            .rposition(|&byte| byte == b'\n')
            .map_or(0, |newline| newline + 1);
        SourceLocation {
            line: before.iter().filter(|&&byte| byte == b'\n').count() + 1,
            column: String::from_utf8_lossy(&before[line_start..]).chars().count() + 1,
        }
    }
}

impl std::fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validated_program_keeps_both_halves() {
        let validated = ValidatedProgram::try_from("+[->+<]").unwrap();
        assert_eq!(validated.program.to_string(), "+[->+<]");
        assert_eq!(validated.matches.close_of(1), Some(6));
    }

    #[test]
    fn validated_program_rejects_unbalanced_source() {
        assert_eq!(
            ValidatedProgram::try_from("+]"),
            Err(StructureError::UnmatchedClose { offset: 1 })
        );
    }

    #[test]
    fn locations_are_one_based() {
        let src = "+\n  ]\n";
        assert_eq!(
            SourceLocation::locate(src, 4),
            SourceLocation { line: 2, column: 3 }
        );
        assert_eq!(SourceLocation::locate(src, 0).to_string(), "1:1");
    }
}
