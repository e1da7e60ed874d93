//! CSI/SGR/ESC/OSC dispatch. The byte-level state machine (NORMAL/ESC/CSI/
//! OSC, parameter folding, UTF-8 accumulation with U+FFFD substitution on
//! malformed input) is `vte::Parser`; this module is the `vte::Perform`
//! implementation that turns its callbacks into `Grid` mutations and, for
//! device queries, reply bytes queued for the PTY master.

use crate::palette::Palette;
use super::grid::{EraseMode, Grid};

pub struct Performer {
    pub grid: Grid,
    /// Immutable copy of the startup palette; SGR color params index into
    /// it directly (e.g. `30..37` selects `palette[p-30]` as the foreground).
    palette: Palette,
    /// Bytes produced by device queries (`CSI n`, `CSI c`), queued here and
    /// drained by the event loop after each chunk is processed — this
    /// preserves query/reply ordering relative to surrounding output
    /// without handing the PTY master fd itself to the parser.
    pub replies: Vec<u8>,
    saved_cursor: Option<(usize, usize)>,
}

impl Performer {
    pub fn new(grid: Grid, palette: Palette) -> Self {
        Self { grid, palette, replies: Vec::new(), saved_cursor: None }
    }
}

fn param(ps: &[u16], i: usize, default: u16) -> u16 {
    match ps.get(i) {
        Some(0) | None => default,
        Some(v) => *v,
    }
}

impl vte::Perform for Performer {
    fn print(&mut self, c: char) {
        self.grid.put_codepoint(c);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            b'\n' => self.grid.newline(), // LF
            b'\r' => self.grid.carriage_return(),
            0x08 => self.grid.backspace(),
            b'\t' => self.grid.tab(),
            _ => {} // other control bytes < 0x20 ignored
        }
    }

    fn hook(&mut self, _params: &vte::Params, _intermediates: &[u8], _ignore: bool, _action: char) {}
    fn put(&mut self, _byte: u8) {}
    fn unhook(&mut self) {}
    fn osc_dispatch(&mut self, _params: &[&[u8]], _bell_terminated: bool) {
        // OSC bodies (window title, etc.) are discarded entirely.
    }

    fn csi_dispatch(&mut self, params: &vte::Params, intermediates: &[u8], ignore: bool, action: char) {
        if ignore {
            return;
        }
        let ps: Vec<u16> = params.iter().map(|p| p.first().copied().unwrap_or(0)).collect();
        let private = intermediates.first() == Some(&b'?');
        let rows = self.grid.rows;
        let cols = self.grid.cols;

        if private {
            match action {
                'h' => {
                    for &p in &ps {
                        if p == 25 {
                            self.grid.cursor_visible = true;
                        }
                        // 47, 1047, 1049: alternate screen — accepted and ignored.
                    }
                }
                'l' => {
                    for &p in &ps {
                        if p == 25 {
                            self.grid.cursor_visible = false;
                        }
                    }
                }
                _ => {}
            }
            return;
        }

        match action {
            'H' | 'f' => {
                let row = param(&ps, 0, 1) as usize - 1;
                let col = param(&ps, 1, 1) as usize - 1;
                self.grid.move_to(col.min(cols - 1), row.min(rows - 1));
            }
            'A' => { let n = param(&ps, 0, 1).max(1) as i32; self.grid.move_by(0, -n); }
            'B' => { let n = param(&ps, 0, 1).max(1) as i32; self.grid.move_by(0, n); }
            'C' => { let n = param(&ps, 0, 1).max(1) as i32; self.grid.move_by(n, 0); }
            'D' => { let n = param(&ps, 0, 1).max(1) as i32; self.grid.move_by(-n, 0); }
            'G' => {
                let x = (param(&ps, 0, 1) as usize - 1).min(cols - 1);
                self.grid.move_to(x, self.grid.cursor_y);
            }
            'd' => {
                let y = (param(&ps, 0, 1) as usize - 1).min(rows - 1);
                self.grid.move_to(self.grid.cursor_x, y);
            }
            'J' => {
                let mode = match param(&ps, 0, 0) {
                    1 => EraseMode::ToStart,
                    2 | 3 => EraseMode::All,
                    _ => EraseMode::ToEnd,
                };
                self.grid.erase_display(mode);
            }
            'K' => {
                let mode = match param(&ps, 0, 0) {
                    1 => EraseMode::ToStart,
                    2 => EraseMode::All,
                    _ => EraseMode::ToEnd,
                };
                self.grid.erase_line(mode);
            }
            'S' => self.grid.scroll_up_by(param(&ps, 0, 1).max(1) as usize),
            'T' => self.grid.scroll_down_by(param(&ps, 0, 1).max(1) as usize),
            'L' => self.grid.insert_lines(param(&ps, 0, 1).max(1) as usize),
            'M' => self.grid.delete_lines(param(&ps, 0, 1).max(1) as usize),
            '@' => self.grid.insert_chars(param(&ps, 0, 1).max(1) as usize),
            'P' => self.grid.delete_chars(param(&ps, 0, 1).max(1) as usize),
            'X' => self.grid.erase_chars(param(&ps, 0, 1).max(1) as usize),
            'r' => {
                let top = param(&ps, 0, 1) as usize - 1;
                let bottom = (param(&ps, 1, rows as u16) as usize - 1).min(rows - 1);
                self.grid.set_scroll_region(top.min(rows - 1), bottom);
            }
            'm' => apply_sgr(&mut self.grid, &self.palette, &ps),
            's' => self.saved_cursor = Some((self.grid.cursor_x, self.grid.cursor_y)),
            'u' => {
                if let Some((x, y)) = self.saved_cursor {
                    self.grid.move_to(x.min(cols - 1), y.min(rows - 1));
                }
            }
            'n' => match param(&ps, 0, 0) {
                5 => self.replies.extend_from_slice(b"\x1b[0n"),
                6 => {
                    let reply = format!("\x1b[{};{}R", self.grid.cursor_y + 1, self.grid.cursor_x + 1);
                    self.replies.extend_from_slice(reply.as_bytes());
                }
                _ => {}
            },
            'c' => self.replies.extend_from_slice(b"\x1b[?1;2c"),
            _ => {} // unknown final byte: abort sequence, absorbed silently
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], ignore: bool, byte: u8) {
        if ignore || !intermediates.is_empty() {
            // Character-set-select sequences (`ESC ( X`) and anything else
            // carrying an intermediate are consumed transparently.
            return;
        }
        match byte {
            b'7' => self.saved_cursor = Some((self.grid.cursor_x, self.grid.cursor_y)),
            b'8' => {
                if let Some((x, y)) = self.saved_cursor {
                    self.grid.move_to(x.min(self.grid.cols - 1), y.min(self.grid.rows - 1));
                }
            }
            b'D' => self.grid.newline(), // IND
            b'E' => {
                self.grid.carriage_return();
                self.grid.newline();
            } // NEL
            b'M' => {
                // RI: reverse index — scroll down if at scroll_top, else move up.
                if self.grid.cursor_y == self.grid.scroll_top {
                    self.grid.scroll_down();
                } else if self.grid.cursor_y > 0 {
                    self.grid.move_by(0, -1);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn apply_sgr(grid: &mut Grid, palette: &Palette, params: &[u16]) {
    if params.is_empty() {
        grid.reset_sgr();
        return;
    }
    for &p in params {
        match p {
            0 => grid.reset_sgr(),
            1 => grid.bold = true,
            22 => grid.bold = false,
            30..=37 => grid.fg = palette[(p - 30) as usize],
            39 => grid.fg = super::cell::DEFAULT_FG,
            40..=47 => grid.bg = palette[(p - 40) as usize],
            49 => grid.bg = super::cell::DEFAULT_BG,
            90..=97 => grid.fg = palette[(p - 90 + 8) as usize],
            100..=107 => grid.bg = palette[(p - 100 + 8) as usize],
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vte::Parser as VteParser;

    fn feed(performer: &mut Performer, parser: &mut VteParser, bytes: &[u8]) {
        parser.advance(performer, bytes);
    }

    fn test_palette() -> Palette {
        crate::palette::build_palette(&crate::config::Config::default())
    }

    #[test]
    fn hi_newline_end_to_end() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        feed(&mut performer, &mut parser, b"hi\n");
        assert_eq!(performer.grid.cell(0, 0).codepoint, 'h');
        assert_eq!(performer.grid.cell(1, 0).codepoint, 'i');
        assert_eq!(performer.grid.cursor_y, 1);
    }

    #[test]
    fn clear_and_home() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        feed(&mut performer, &mut parser, b"hello");
        feed(&mut performer, &mut parser, b"\x1b[2J\x1b[H");
        for y in 0..performer.grid.rows {
            for x in 0..performer.grid.cols {
                assert_eq!(performer.grid.cell(x, y).codepoint, ' ');
            }
        }
        assert_eq!((performer.grid.cursor_x, performer.grid.cursor_y), (0, 0));
    }

    #[test]
    fn sgr_red_then_reset() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        feed(&mut performer, &mut parser, b"\x1b[31mX\x1b[0mY");
        assert_eq!(performer.grid.cell(0, 0).codepoint, 'X');
        assert_eq!(performer.grid.cell(0, 0).fg, test_palette()[1]);
        assert_eq!(performer.grid.cell(1, 0).codepoint, 'Y');
        assert_eq!(performer.grid.cell(1, 0).fg, super::super::cell::DEFAULT_FG);
    }

    #[test]
    fn device_status_report_6n() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        performer.grid.move_to(3, 5);
        feed(&mut performer, &mut parser, b"\x1b[6n");
        assert_eq!(performer.replies, b"\x1b[6;4R");
    }

    #[test]
    fn utf8_emoji_is_one_cell() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        feed(&mut performer, &mut parser, &[0xF0, 0x9F, 0x98, 0x80]);
        assert_eq!(performer.grid.cell(0, 0).codepoint, '\u{1F600}');
        assert_eq!(performer.grid.cursor_x, 1);
    }

    #[test]
    fn split_csi_sequence_matches_whole() {
        let mut whole_performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut whole_parser = VteParser::new();
        feed(&mut whole_performer, &mut whole_parser, b"\x1b[12;34H");

        let mut split_performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut split_parser = VteParser::new();
        feed(&mut split_performer, &mut split_parser, b"\x1b[12;");
        feed(&mut split_performer, &mut split_parser, b"34H");

        assert_eq!(whole_performer.grid.cursor_x, split_performer.grid.cursor_x);
        assert_eq!(whole_performer.grid.cursor_y, split_performer.grid.cursor_y);
    }

    #[test]
    fn malformed_utf8_substitutes_replacement_char() {
        let mut performer = Performer::new(Grid::new(80, 24), test_palette());
        let mut parser = VteParser::new();
        feed(&mut performer, &mut parser, &[0x80]); // stray continuation byte
        assert_eq!(performer.grid.cell(0, 0).codepoint, '\u{FFFD}');
    }
}
