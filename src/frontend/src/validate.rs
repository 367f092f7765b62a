use super::program::{MatchTable, Op, Program};

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum StructureError {
    #[error("unmatched `[` at offset {offset}")]
    UnmatchedOpen { offset: usize },
    #[error("unmatched `]` at offset {offset}")]
    UnmatchedClose { offset: usize },
}

impl StructureError {
    /// Byte offset of the offending bracket in the source.
    pub fn offset(&self) -> usize {
        match *self {
            StructureError::UnmatchedOpen { offset }
            | StructureError::UnmatchedClose { offset } => offset,
        }
    }
}

pub(super) fn match_brackets(program: &Program) -> Result<MatchTable, StructureError> {
    let mut table = MatchTable::with_len(program.len());
    let mut open_stack = vec![];
    for (index, instruction) in program.iter().enumerate() {
        match instruction.op {
            Op::LoopOpen => open_stack.push(index),
            Op::LoopClose => {
                let Some(open) = open_stack.pop() else {
                    return Err(StructureError::UnmatchedClose {
                        offset: instruction.offset,
                    });
                };
                table.insert(open, index);
            }
            _ => {}
        }
    }
    if let Some(&open) = open_stack.first() {
        return Err(StructureError::UnmatchedOpen {
            offset: program.instructions[open].offset,
        });
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use {super::*, crate::tokenize, proptest::prelude::*};

    fn matches(src: &str) -> Result<MatchTable, StructureError> {
        match_brackets(&tokenize(src))
    }

    #[test]
    fn nested_loops_are_paired() {
        let table = matches("++[>++[>+<-]<-]").unwrap();
        assert_eq!(table.pairs().collect::<Vec<_>>(), vec![(2, 14), (6, 11)]);
        assert_eq!(table.close_of(2), Some(14));
        assert_eq!(table.open_of(11), Some(6));
        assert_eq!(table.close_of(14), None);
        assert_eq!(table.open_of(2), None);
        assert_eq!(table.partner(0), None);
    }

    #[test]
    fn empty_loop_is_paired() {
        let table = matches("[]").unwrap();
        assert_eq!(table.pairs().collect::<Vec<_>>(), vec![(0, 1)]);
    }

    #[test]
    fn no_brackets_gives_an_empty_table() {
        let table = matches("+-<>.,").unwrap();
        assert!(table.is_empty());
        assert_eq!(table.program_len(), 6);
    }

    #[test]
    fn extra_close_reports_its_offset() {
        assert_eq!(
            matches("+ [-] ]"),
            Err(StructureError::UnmatchedClose { offset: 6 })
        );
        assert_eq!(matches("]["), Err(StructureError::UnmatchedClose { offset: 0 }));
    }

    #[test]
    fn extra_open_reports_the_outermost_offset() {
        assert_eq!(
            matches("x [ [-]"),
            Err(StructureError::UnmatchedOpen { offset: 2 })
        );
        assert_eq!(
            matches("[[[]]"),
            Err(StructureError::UnmatchedOpen { offset: 0 })
        );
    }

    #[test]
    fn error_messages_name_the_bracket() {
        assert_eq!(
            StructureError::UnmatchedOpen { offset: 3 }.to_string(),
            "unmatched `[` at offset 3"
        );
        assert_eq!(StructureError::UnmatchedClose { offset: 7 }.offset(), 7);
    }

    fn balanced() -> impl Strategy<Value = String> {
        let leaf = prop::sample::select(vec!["+", "-", ">", "<", ".", ","]).prop_map(String::from);
        leaf.prop_recursive(6, 64, 8, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..8).prop_map(|parts| parts.concat()),
                inner.prop_map(|body| format!("[{body}]")),
            ]
        })
    }

    proptest! {
        #[test]
        fn balanced_programs_pair_every_bracket_once(src in balanced()) {
            let program = tokenize(&src);
            let table = match_brackets(&program).unwrap();
            let pairs: Vec<_> = table.pairs().collect();
            let brackets = program
                .iter()
                .filter(|instruction| matches!(instruction.op, Op::LoopOpen | Op::LoopClose))
                .count();
            prop_assert_eq!(pairs.len() * 2, brackets);
            for &(open, close) in &pairs {
                prop_assert_eq!(program.instructions[open].op, Op::LoopOpen);
                prop_assert_eq!(program.instructions[close].op, Op::LoopClose);
                for &(other_open, other_close) in &pairs {
                    let crossing = open < other_open && other_open < close && close < other_close;
                    prop_assert!(!crossing);
                }
            }
        }

        #[test]
        fn appended_close_is_reported(src in balanced()) {
            let unbalanced = format!("{src}]");
            prop_assert_eq!(
                matches(&unbalanced),
                Err(StructureError::UnmatchedClose { offset: src.len() })
            );
        }

        #[test]
        fn prepended_open_is_reported(src in balanced()) {
            let unbalanced = format!("[{src}");
            prop_assert_eq!(
                matches(&unbalanced),
                Err(StructureError::UnmatchedOpen { offset: 0 })
            );
        }
    }
}
