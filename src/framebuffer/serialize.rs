//! Snapshot serialization.
//!
//! Emits an escape-sequence stream that, written to a fresh terminal of the
//! same size, reproduces the current grid, cursor position, and cursor
//! visibility. Feeding the output back through [`Framebuffer::write`] on a
//! default instance yields a state that serializes byte-identically.

use std::fmt::Write as _;

use super::cell::Attrs;
use super::Framebuffer;

impl Framebuffer {
    pub fn serialize(&self) -> String {
        let mut out = String::with_capacity(self.cols * self.rows + 64);
        out.push_str("\x1b[0m\x1b[2J\x1b[H");

        for y in 0..self.rows {
            let _ = write!(out, "\x1b[{};1H", y + 1);
            let mut last = Attrs::default();
            for cell in &self.grid[y] {
                if cell.attrs != last {
                    push_sgr(&mut out, &cell.attrs);
                    last = cell.attrs;
                }
                out.push(cell.ch);
            }
        }

        let (cx, cy, visible) = self.cursor();
        let _ = write!(out, "\x1b[0m\x1b[{};{}H", cy + 1, cx + 1);
        if !visible {
            out.push_str("\x1b[?25l");
        }
        out
    }
}

/// Emit one SGR that resets and then re-asserts every set flag and any
/// non-default color of `attrs`.
fn push_sgr(out: &mut String, attrs: &Attrs) {
    let mut params = String::new();
    let flags = [
        (attrs.bold, 1),
        (attrs.dim, 2),
        (attrs.italic, 3),
        (attrs.underline, 4),
        (attrs.blink, 5),
        (attrs.inverse, 7),
        (attrs.hidden, 8),
        (attrs.strikethrough, 9),
    ];
    for (set, code) in flags {
        if set {
            let _ = write!(params, ";{code}");
        }
    }
    push_color(&mut params, attrs.fg, true);
    push_color(&mut params, attrs.bg, false);

    let _ = write!(out, "\x1b[0{params}m");
}

fn push_color(params: &mut String, color: i16, is_fg: bool) {
    let _ = match color {
        -1 => Ok(()),
        0..=7 => {
            let base: i16 = if is_fg { 30 } else { 40 };
            write!(params, ";{}", base + color)
        }
        8..=15 => {
            let base: i16 = if is_fg { 90 } else { 100 };
            write!(params, ";{}", base + color - 8)
        }
        _ => {
            let selector: i16 = if is_fg { 38 } else { 48 };
            write!(params, ";{};5;{}", selector, color)
        }
    };
}
