use {crate::ir::Direction, derive_more::Display, std::num::NonZeroUsize};

pub const DEFAULT_TAPE_LEN: NonZeroUsize = match NonZeroUsize::new(30_000) {
    Some(len) => len,
    None => panic!("default tape length must be nonzero"),
};

/// What happens when the pointer is moved past either end of the tape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum PointerPolicy {
    /// Moving off one end lands on the other.
    #[default]
    #[display("wrap")]
    Wrap,
    /// Moving off either end stops the program with
    /// [`ExitStatus::PointerOutOfBounds`](crate::ir::ExitStatus::PointerOutOfBounds).
    #[display("trap")]
    Trap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    pub tape_len: NonZeroUsize,
    pub pointer_policy: PointerPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            tape_len: DEFAULT_TAPE_LEN,
            pointer_policy: PointerPolicy::default(),
        }
    }
}

impl Config {
    /// The pointer after one move in `direction`, or `None` if the move traps.
    pub fn step(&self, pointer: usize, direction: Direction) -> Option<usize> {
        let last = self.tape_len.get() - 1;
        match (direction, self.pointer_policy) {
            (Direction::Right, _) if pointer < last => Some(pointer + 1),
            (Direction::Left, _) if pointer > 0 => Some(pointer - 1),
            (Direction::Right, PointerPolicy::Wrap) => Some(0),
            (Direction::Left, PointerPolicy::Wrap) => Some(last),
            (_, PointerPolicy::Trap) => None,
        }
    }
}
