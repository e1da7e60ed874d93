//! Terminal model + parser: the character grid and the byte-stream
//! interpreter that mutates it.

pub mod cell;
pub mod grid;
pub mod parser;
pub mod pty;

use crate::palette::Palette;
use grid::Grid;
use parser::Performer;

/// Owns the grid, the SGR/cursor/scroll state threaded through it, and the
/// `vte` byte-level state machine. Device-query reply bytes are queued
/// internally and drained by the event loop after each chunk.
pub struct TerminalModel {
    vte: vte::Parser,
    performer: Performer,
}

impl TerminalModel {
    pub fn new(cols: usize, rows: usize, palette: Palette) -> Self {
        Self {
            vte: vte::Parser::new(),
            performer: Performer::new(Grid::new(cols, rows), palette),
        }
    }

    /// Feed one chunk of PTY output through the parser.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.vte.advance(&mut self.performer, bytes);
    }

    pub fn grid(&self) -> &Grid {
        &self.performer.grid
    }

    /// Take any reply bytes queued by device queries since the last call.
    pub fn take_replies(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.performer.replies)
    }
}
