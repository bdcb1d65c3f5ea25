//! The tape store: a conceptually infinite tape backed by a `Vec` that grows in fixed-size
//! blocks of blank cells whenever the head comes within the safe zone of either edge.
//!
//! The tape never shrinks and never hands out negative indices. Growing on the left shifts
//! every cell, so callers always get the adjusted head position back.

use serde::{Deserialize, Serialize};

use crate::types::{Direction, Symbol, TAPE_PADDING, TAPE_SAFE_ZONE};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tape {
    cells: Vec<Symbol>,
    blank: Symbol,
}

impl Tape {
    /// Builds a tape from `input`, one cell per character, flanked by `TAPE_PADDING` blanks on
    /// each side. An empty input becomes a single blank cell.
    ///
    /// The first input cell sits at [`Tape::origin`].
    pub fn new(input: &str, blank: Symbol) -> Self {
        let mut cells = vec![blank; TAPE_PADDING];
        if input.is_empty() {
            cells.push(blank);
        } else {
            cells.extend(input.chars());
        }
        cells.extend(std::iter::repeat(blank).take(TAPE_PADDING));

        Self { cells, blank }
    }

    /// Index of the first input cell on a freshly built tape.
    pub fn origin(&self) -> usize {
        TAPE_PADDING
    }

    pub fn blank(&self) -> Symbol {
        self.blank
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> &[Symbol] {
        &self.cells
    }

    /// Returns the symbol at `position`, or the blank symbol if `position` is off the tape.
    pub fn read(&self, position: usize) -> Symbol {
        self.cells.get(position).copied().unwrap_or(self.blank)
    }

    /// Replaces the symbol at `position`. Writes off the tape are ignored.
    pub fn write(&mut self, position: usize, symbol: Symbol) {
        if let Some(cell) = self.cells.get_mut(position) {
            *cell = symbol;
        }
    }

    /// Moves `head` one cell in `direction` and applies the growth policy, returning the new
    /// head position.
    pub fn shift(&mut self, head: usize, direction: Direction) -> usize {
        let head = match direction {
            Direction::Right => head + 1,
            Direction::Left => match head.checked_sub(1) {
                Some(head) => head,
                None => {
                    // Unreachable while the safe zone holds; keep the head on the tape anyway.
                    self.extend_left();
                    TAPE_PADDING - 1
                }
            },
        };

        self.grow_if_needed(head)
    }

    /// Grows the tape by one padding block if `head` is within the safe zone of an edge.
    ///
    /// Prepending shifts the head by `TAPE_PADDING` so it keeps pointing at the same logical
    /// cell. At most one block is added per call.
    pub fn grow_if_needed(&mut self, head: usize) -> usize {
        if head < TAPE_SAFE_ZONE {
            self.extend_left();
            head + TAPE_PADDING
        } else if head >= self.cells.len().saturating_sub(TAPE_SAFE_ZONE) {
            self.cells
                .extend(std::iter::repeat(self.blank).take(TAPE_PADDING));
            head
        } else {
            head
        }
    }

    fn extend_left(&mut self) {
        self.cells
            .splice(0..0, std::iter::repeat(self.blank).take(TAPE_PADDING));
    }

    /// The tape contents with leading and trailing blanks removed.
    ///
    /// An entirely blank tape trims to a single blank cell.
    pub fn trimmed(&self) -> &[Symbol] {
        let first = self.cells.iter().position(|&s| s != self.blank);
        let last = self.cells.iter().rposition(|&s| s != self.blank);

        match (first, last) {
            (Some(first), Some(last)) => &self.cells[first..=last],
            _ => std::slice::from_ref(&self.blank),
        }
    }
}

impl std::fmt::Display for Tape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text: String = self.cells.iter().collect();
        f.write_str(&text)
    }
}
