//! Byte-stream parser: ground / escape / CSI / OSC phases.
//!
//! `write` appends to the held-over partial input and consumes as much as
//! it can. A sequence split across writes is retained and completed by the
//! next call; a sequence that runs past [`MAX_SEQUENCE_LEN`] bytes without
//! terminating is chopped so garbage input cannot wedge the parser.

use super::cell::rgb_to_cube;
use super::Framebuffer;

/// Longest unterminated escape sequence we hold onto before giving up.
const MAX_SEQUENCE_LEN: usize = 32;

enum Step {
    /// `n` bytes consumed from the front of the input.
    Consumed(usize),
    /// The input ends mid-sequence; retain it for the next write.
    Incomplete,
}

impl Framebuffer {
    /// Feed bytes to the emulator, parsing as far as possible.
    pub fn write(&mut self, bytes: &[u8]) {
        let mut buf = std::mem::take(&mut self.pending);
        buf.extend_from_slice(bytes);

        let mut i = 0;
        while i < buf.len() {
            match self.step(&buf[i..]) {
                Step::Consumed(n) => i += n.max(1),
                Step::Incomplete => {
                    if buf.len() - i > MAX_SEQUENCE_LEN && buf[i] == 0x1b {
                        // Malformed: drop ESC plus the following byte and
                        // rescan the rest as fresh input.
                        i += 2;
                        continue;
                    }
                    self.pending = buf[i..].to_vec();
                    return;
                }
            }
        }
    }

    fn step(&mut self, input: &[u8]) -> Step {
        match input[0] {
            0x1b => self.step_escape(input),
            0x08 => {
                self.backspace();
                Step::Consumed(1)
            }
            0x09 => {
                self.tab();
                Step::Consumed(1)
            }
            0x0a => {
                self.linefeed();
                Step::Consumed(1)
            }
            0x0d => {
                self.carriage_return();
                Step::Consumed(1)
            }
            // BEL, remaining C0 controls, and DEL are ignored.
            b if b < 0x20 || b == 0x7f => Step::Consumed(1),
            _ => self.step_printable(input),
        }
    }

    fn step_printable(&mut self, input: &[u8]) -> Step {
        let len = match utf8_len(input[0]) {
            // Stray continuation or invalid lead byte.
            0 => return Step::Consumed(1),
            n => n,
        };
        if input.len() < len {
            return Step::Incomplete;
        }
        match std::str::from_utf8(&input[..len]) {
            Ok(s) => {
                if let Some(ch) = s.chars().next() {
                    self.put_char(ch);
                }
                Step::Consumed(len)
            }
            Err(_) => Step::Consumed(1),
        }
    }

    fn step_escape(&mut self, input: &[u8]) -> Step {
        if input.len() < 2 {
            return Step::Incomplete;
        }
        match input[1] {
            b'[' => self.step_csi(input),
            b']' => step_osc(input),
            // Charset designation: one more byte follows, all ignored.
            b'(' | b')' => {
                if input.len() < 3 {
                    Step::Incomplete
                } else {
                    Step::Consumed(3)
                }
            }
            b'7' => {
                self.save_cursor();
                Step::Consumed(2)
            }
            b'8' => {
                self.restore_cursor();
                Step::Consumed(2)
            }
            b'D' => {
                self.linefeed();
                Step::Consumed(2)
            }
            b'E' => {
                self.carriage_return();
                self.linefeed();
                Step::Consumed(2)
            }
            b'M' => {
                self.reverse_index();
                Step::Consumed(2)
            }
            b'c' => {
                self.full_reset();
                Step::Consumed(2)
            }
            _ => Step::Consumed(2),
        }
    }

    fn step_csi(&mut self, input: &[u8]) -> Step {
        let mut i = 2;
        let prefix = match input.get(i) {
            None => return Step::Incomplete,
            Some(&b) if matches!(b, b'?' | b'!' | b'>') => {
                i += 1;
                Some(b)
            }
            Some(_) => None,
        };
        let params_start = i;
        loop {
            match input.get(i) {
                None => return Step::Incomplete,
                Some(&b) if b.is_ascii_digit() || b == b';' => i += 1,
                Some(&b) if (0x40..=0x7e).contains(&b) => {
                    let params = parse_params(&input[params_start..i]);
                    self.dispatch_csi(prefix, &params, b);
                    return Step::Consumed(i + 1);
                }
                // Anything else makes the sequence malformed; swallow it.
                Some(_) => return Step::Consumed(i + 1),
            }
        }
    }

    fn dispatch_csi(&mut self, prefix: Option<u8>, params: &[u32], final_byte: u8) {
        if prefix == Some(b'?') {
            match final_byte {
                b'h' => self.set_dec_modes(params, true),
                b'l' => self.set_dec_modes(params, false),
                _ => {}
            }
            return;
        }
        if prefix.is_some() {
            return;
        }
        match final_byte {
            b'A' => self.cursor_up(param(params, 0, 1) as usize),
            b'B' => self.cursor_down(param(params, 0, 1) as usize),
            b'C' => self.cursor_forward(param(params, 0, 1) as usize),
            b'D' => self.cursor_back(param(params, 0, 1) as usize),
            b'E' => {
                self.carriage_return();
                self.cursor_down(param(params, 0, 1) as usize);
            }
            b'F' => {
                self.carriage_return();
                self.cursor_up(param(params, 0, 1) as usize);
            }
            b'G' => self.set_cursor_x(param(params, 0, 1) as usize - 1),
            b'd' => self.set_cursor_y(param(params, 0, 1) as usize - 1),
            b'H' | b'f' => {
                let row = param(params, 0, 1) as usize;
                let col = param(params, 1, 1) as usize;
                self.cursor_to(col - 1, row - 1);
            }
            b'J' => self.erase_in_display(params.first().copied().unwrap_or(0)),
            b'K' => self.erase_in_line(params.first().copied().unwrap_or(0)),
            b'L' => self.insert_lines(param(params, 0, 1) as usize),
            b'M' => self.delete_lines(param(params, 0, 1) as usize),
            b'@' => self.insert_chars(param(params, 0, 1) as usize),
            b'P' => self.delete_chars(param(params, 0, 1) as usize),
            b'X' => self.erase_chars(param(params, 0, 1) as usize),
            b'm' => self.apply_sgr(params),
            b'r' => {
                let top = param(params, 0, 1) as usize;
                let bottom = param(params, 1, self.rows as u32) as usize;
                self.set_scroll_region(top, bottom);
            }
            b's' => self.save_cursor(),
            b'u' => self.restore_cursor(),
            // Status / device / mode requests without the DEC prefix.
            b'n' | b'c' | b'h' | b'l' => {}
            _ => {}
        }
    }

    fn set_dec_modes(&mut self, params: &[u32], set: bool) {
        for &mode in params {
            match mode {
                25 => self.set_cursor_visible(set),
                1049 => {
                    if set {
                        self.enter_alt_screen();
                    } else {
                        self.exit_alt_screen();
                    }
                }
                // Accepted and ignored: 1, 7, 12, 47, 1047, 1048, 2004, ...
                _ => {}
            }
        }
    }

    fn apply_sgr(&mut self, params: &[u32]) {
        if params.is_empty() {
            self.attrs = Default::default();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            match params[i] {
                0 => self.attrs = Default::default(),
                1 => self.attrs.bold = true,
                2 => self.attrs.dim = true,
                3 => self.attrs.italic = true,
                4 => self.attrs.underline = true,
                5 => self.attrs.blink = true,
                7 => self.attrs.inverse = true,
                8 => self.attrs.hidden = true,
                9 => self.attrs.strikethrough = true,
                22 => {
                    self.attrs.bold = false;
                    self.attrs.dim = false;
                }
                23 => self.attrs.italic = false,
                24 => self.attrs.underline = false,
                25 => self.attrs.blink = false,
                27 => self.attrs.inverse = false,
                28 => self.attrs.hidden = false,
                29 => self.attrs.strikethrough = false,
                30..=37 => self.attrs.fg = (params[i] - 30) as i16,
                39 => self.attrs.fg = -1,
                40..=47 => self.attrs.bg = (params[i] - 40) as i16,
                49 => self.attrs.bg = -1,
                90..=97 => self.attrs.fg = (params[i] - 90 + 8) as i16,
                100..=107 => self.attrs.bg = (params[i] - 100 + 8) as i16,
                38 | 48 => {
                    let fg = params[i] == 38;
                    match (params.get(i + 1), params.get(i + 2)) {
                        (Some(&5), Some(&n)) => {
                            let color = n.min(255) as i16;
                            if fg {
                                self.attrs.fg = color;
                            } else {
                                self.attrs.bg = color;
                            }
                            i += 2;
                        }
                        (Some(&2), _) if i + 4 < params.len() => {
                            let color = rgb_to_cube(
                                params[i + 2].min(255) as u8,
                                params[i + 3].min(255) as u8,
                                params[i + 4].min(255) as u8,
                            );
                            if fg {
                                self.attrs.fg = color;
                            } else {
                                self.attrs.bg = color;
                            }
                            i += 4;
                        }
                        // Malformed extended color: skip the selector only.
                        _ => {}
                    }
                }
                _ => {}
            }
            i += 1;
        }
    }
}

/// OSC: swallow everything up to BEL or ST (`ESC \`).
fn step_osc(input: &[u8]) -> Step {
    let mut i = 2;
    while i < input.len() {
        match input[i] {
            0x07 => return Step::Consumed(i + 1),
            0x1b => {
                return match input.get(i + 1) {
                    Some(b'\\') => Step::Consumed(i + 2),
                    Some(_) => Step::Consumed(i + 1),
                    None => Step::Incomplete,
                };
            }
            _ => i += 1,
        }
    }
    Step::Incomplete
}

/// A parameter at `idx`, with absent or zero values replaced by `default`.
fn param(params: &[u32], idx: usize, default: u32) -> u32 {
    match params.get(idx) {
        Some(&v) if v != 0 => v,
        _ => default,
    }
}

fn parse_params(raw: &[u8]) -> Vec<u32> {
    if raw.is_empty() {
        return Vec::new();
    }
    raw.split(|&b| b == b';')
        .map(|chunk| {
            chunk
                .iter()
                .fold(0u32, |acc, &d| acc.saturating_mul(10).saturating_add((d - b'0') as u32))
        })
        .collect()
}

/// Byte length of the UTF-8 character starting with `lead`, or 0 when
/// `lead` cannot start one.
fn utf8_len(lead: u8) -> usize {
    match lead {
        0x00..=0x7f => 1,
        0xc0..=0xdf => 2,
        0xe0..=0xef => 3,
        0xf0..=0xf7 => 4,
        _ => 0,
    }
}
