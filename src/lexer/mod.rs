pub mod lexer;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // `+`: Increment the byte at the `cursor` by one
    Inc,
    // `-`: Decrement the byte at the `cursor` by one
    Dec,

    // `>`: Move the `cursor` one cell to the right
    ShiftRight,
    // `<`: Move the `cursor` one cell to the left
    ShiftLeft,

    // `.`: Write the byte at the `cursor` to the host output routine
    Print,
    // `,`: Read a byte from the host input routine and store it at the `cursor`
    Read,

    // `[`: Start of a loop body, runs while the byte at the `cursor` is non-zero
    LoopStart,
    // `]`: End of a loop body
    LoopEnd,

    // Every other character, batched into runs
    Comment(String),
}
