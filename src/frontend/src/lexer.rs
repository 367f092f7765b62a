use {
    super::program::{Instruction, Op},
    chumsky::prelude::{Parser as ChumskyParser, *},
};

pub(super) trait Parser<'src, Output>:
    ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone
{
}
impl<
        'src,
        Output,
        T: ChumskyParser<'src, &'src str, Output, extra::Err<Rich<'src, char>>> + Clone,
    > Parser<'src, Output> for T
{
}

const INSTRUCTION_CHARS: &str = "><+-.,[]";

fn op_lexer<'src>() -> impl Parser<'src, Op> {
    choice([
        // pointer movement
        just('>').to(Op::MovePointerRight),
        just('<').to(Op::MovePointerLeft),
        // cell arithmetic
        just('+').to(Op::IncrementCell),
        just('-').to(Op::DecrementCell),
        // i/o
        just('.').to(Op::WriteByte),
        just(',').to(Op::ReadByte),
        // loops
        just('[').to(Op::LoopOpen),
        just(']').to(Op::LoopClose),
    ])
}

fn instruction_lexer<'src>() -> impl Parser<'src, Instruction> {
    op_lexer().map_with(|op, e| Instruction {
        op,
        offset: e.span().start,
    })
}

// anything that is not an instruction is a comment
fn comment_lexer<'src>() -> impl Parser<'src, ()> {
    none_of(INSTRUCTION_CHARS).repeated().ignored()
}

pub(super) fn lexer<'src>() -> impl Parser<'src, Vec<Instruction>> {
    comment_lexer()
        .ignore_then(
            instruction_lexer()
                .then_ignore(comment_lexer())
                .repeated()
                .collect(),
        )
        .then_ignore(end())
}
