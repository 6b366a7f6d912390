use std::fmt;

/// Source position (line, column) attached to every node handed over by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: i32,
    pub column: i32,
}

impl Position {
    /// Used for nodes with no source text behind them, and for errors that cannot be pinned.
    pub const NONE: Position = Position { line: -1, column: -1 };

    pub fn new(line: i32, column: i32) -> Self {
        Self { line, column }
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::NONE
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}
