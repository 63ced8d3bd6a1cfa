//! In-memory terminal emulator.
//!
//! The framebuffer consumes the raw byte stream a runner produces and keeps
//! a `cols x rows` grid of styled cells, the cursor, the scroll region, and
//! the alternate screen. Its [`Framebuffer::serialize`] output is a
//! self-contained escape-sequence stream that reproduces the visible state
//! on a fresh terminal; the relay sends it (compressed) to viewers that
//! join mid-session.
//!
//! The emulator never fails: malformed or unsupported input is consumed and
//! ignored. It does no I/O and is not internally synchronized; callers
//! serialize access.

pub mod cell;
mod parser;
mod serialize;


pub use cell::{Attrs, Cell};

pub const DEFAULT_COLS: usize = 80;
pub const DEFAULT_ROWS: usize = 24;

/// Cursor and pen state saved by `ESC 7` / `CSI s`.
#[derive(Debug, Clone, Copy)]
struct SavedCursor {
    x: usize,
    y: usize,
    attrs: Attrs,
}

impl Default for SavedCursor {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            attrs: Attrs::default(),
        }
    }
}

/// Primary-screen state stashed while the alternate screen is active.
#[derive(Debug, Clone)]
struct AltStash {
    grid: Vec<Vec<Cell>>,
    cursor_x: usize,
    cursor_y: usize,
    scroll_top: usize,
    scroll_bottom: usize,
}

#[derive(Debug, Clone)]
pub struct Framebuffer {
    pub(crate) cols: usize,
    pub(crate) rows: usize,
    pub(crate) grid: Vec<Vec<Cell>>,
    /// May equal `cols` after writing into the last column (wrap pending).
    pub(crate) cursor_x: usize,
    pub(crate) cursor_y: usize,
    pub(crate) cursor_visible: bool,
    pub(crate) attrs: Attrs,
    pub(crate) scroll_top: usize,
    pub(crate) scroll_bottom: usize,
    saved_cursor: Option<SavedCursor>,
    alt: Option<AltStash>,
    /// Bytes held over from a previous `write` that could still extend
    /// into a valid escape sequence or UTF-8 character.
    pub(crate) pending: Vec<u8>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new(DEFAULT_COLS, DEFAULT_ROWS)
    }
}

impl Framebuffer {
    pub fn new(cols: usize, rows: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            grid: vec![vec![Cell::default(); cols]; rows],
            cursor_x: 0,
            cursor_y: 0,
            cursor_visible: true,
            attrs: Attrs::default(),
            scroll_top: 0,
            scroll_bottom: rows - 1,
            saved_cursor: None,
            alt: None,
            pending: Vec::new(),
        }
    }

    /// Current `(cols, rows)`.
    pub fn size(&self) -> (usize, usize) {
        (self.cols, self.rows)
    }

    /// Cursor position and visibility. A pending-wrap cursor reports the
    /// last column.
    pub fn cursor(&self) -> (usize, usize, bool) {
        (
            self.cursor_x.min(self.cols - 1),
            self.cursor_y,
            self.cursor_visible,
        )
    }

    pub fn cell(&self, x: usize, y: usize) -> Option<&Cell> {
        self.grid.get(y).and_then(|row| row.get(x))
    }

    /// The characters of row `y` as a string (no attributes).
    pub fn row_text(&self, y: usize) -> String {
        self.grid
            .get(y)
            .map(|row| row.iter().map(|c| c.ch).collect())
            .unwrap_or_default()
    }

    /// Reshape the grid, preserving the top-left overlap. Resets the scroll
    /// region to full height and clamps the cursor.
    pub fn resize(&mut self, cols: usize, rows: usize) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        resize_grid(&mut self.grid, cols, rows);
        if let Some(alt) = &mut self.alt {
            resize_grid(&mut alt.grid, cols, rows);
            alt.cursor_x = alt.cursor_x.min(cols - 1);
            alt.cursor_y = alt.cursor_y.min(rows - 1);
            alt.scroll_top = 0;
            alt.scroll_bottom = rows - 1;
        }
        self.cols = cols;
        self.rows = rows;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.cursor_x = self.cursor_x.min(cols - 1);
        self.cursor_y = self.cursor_y.min(rows - 1);
    }

    fn blank_row(&self) -> Vec<Cell> {
        vec![Cell::default(); self.cols]
    }

    // ── Character output ─────────────────────────────────────────────

    pub(crate) fn put_char(&mut self, ch: char) {
        if self.cursor_x >= self.cols {
            self.cursor_x = 0;
            self.linefeed();
        }
        self.grid[self.cursor_y][self.cursor_x] = Cell {
            ch,
            attrs: self.attrs,
        };
        self.cursor_x += 1;
    }

    // ── Cursor motion ────────────────────────────────────────────────

    pub(crate) fn carriage_return(&mut self) {
        self.cursor_x = 0;
    }

    pub(crate) fn backspace(&mut self) {
        self.cursor_x = self.cursor_x.min(self.cols - 1);
        self.cursor_x = self.cursor_x.saturating_sub(1);
    }

    pub(crate) fn tab(&mut self) {
        let x = self.cursor_x.min(self.cols - 1);
        self.cursor_x = ((x / 8 + 1) * 8).min(self.cols - 1);
    }

    pub(crate) fn cursor_up(&mut self, n: usize) {
        self.cursor_y = self.cursor_y.saturating_sub(n);
    }

    pub(crate) fn cursor_down(&mut self, n: usize) {
        self.cursor_y = (self.cursor_y + n).min(self.rows - 1);
    }

    pub(crate) fn cursor_forward(&mut self, n: usize) {
        self.cursor_x = (self.cursor_x.min(self.cols - 1) + n).min(self.cols - 1);
    }

    pub(crate) fn cursor_back(&mut self, n: usize) {
        self.cursor_x = self.cursor_x.min(self.cols - 1).saturating_sub(n);
    }

    pub(crate) fn set_cursor_x(&mut self, x: usize) {
        self.cursor_x = x.min(self.cols - 1);
    }

    pub(crate) fn set_cursor_y(&mut self, y: usize) {
        self.cursor_y = y.min(self.rows - 1);
    }

    pub(crate) fn cursor_to(&mut self, x: usize, y: usize) {
        self.set_cursor_x(x);
        self.set_cursor_y(y);
    }

    // ── Scrolling ────────────────────────────────────────────────────

    /// LF semantics: scroll up when at the bottom of the scroll region,
    /// otherwise move down (stopping at the last row).
    pub(crate) fn linefeed(&mut self) {
        if self.cursor_y == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor_y < self.rows - 1 {
            self.cursor_y += 1;
        }
    }

    pub(crate) fn reverse_index(&mut self) {
        if self.cursor_y == self.scroll_top {
            self.scroll_down(1);
        } else if self.cursor_y > 0 {
            self.cursor_y -= 1;
        }
    }

    fn scroll_up(&mut self, n: usize) {
        for _ in 0..n {
            self.grid.remove(self.scroll_top);
            let blank = self.blank_row();
            self.grid.insert(self.scroll_bottom, blank);
        }
    }

    fn scroll_down(&mut self, n: usize) {
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom);
            let blank = self.blank_row();
            self.grid.insert(self.scroll_top, blank);
        }
    }

    /// DECSTBM. Parameters are 1-based; out-of-range values clamp to the
    /// grid. An inverted region is ignored.
    pub(crate) fn set_scroll_region(&mut self, top: usize, bottom: usize) {
        let top = top.saturating_sub(1).min(self.rows - 1);
        let bottom = bottom.saturating_sub(1).min(self.rows - 1);
        if top <= bottom {
            self.scroll_top = top;
            self.scroll_bottom = bottom;
        }
    }

    // ── Erase ────────────────────────────────────────────────────────

    pub(crate) fn erase_in_line(&mut self, mode: u32) {
        let x = self.cursor_x.min(self.cols - 1);
        let row = &mut self.grid[self.cursor_y];
        match mode {
            0 => row[x..].fill(Cell::default()),
            1 => row[..=x].fill(Cell::default()),
            2 => row.fill(Cell::default()),
            _ => {}
        }
    }

    pub(crate) fn erase_in_display(&mut self, mode: u32) {
        match mode {
            0 => {
                self.erase_in_line(0);
                for y in self.cursor_y + 1..self.rows {
                    self.grid[y].fill(Cell::default());
                }
            }
            1 => {
                for y in 0..self.cursor_y {
                    self.grid[y].fill(Cell::default());
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                for row in &mut self.grid {
                    row.fill(Cell::default());
                }
            }
            _ => {}
        }
    }

    // ── Insert / delete ──────────────────────────────────────────────

    /// IL: insert blank lines at the cursor, shifting rows down within the
    /// scroll region. No-op when the cursor is outside the region.
    pub(crate) fn insert_lines(&mut self, n: usize) {
        if self.cursor_y < self.scroll_top || self.cursor_y > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_y + 1);
        for _ in 0..n {
            self.grid.remove(self.scroll_bottom);
            let blank = self.blank_row();
            self.grid.insert(self.cursor_y, blank);
        }
    }

    /// DL: delete lines at the cursor, shifting rows up within the scroll
    /// region.
    pub(crate) fn delete_lines(&mut self, n: usize) {
        if self.cursor_y < self.scroll_top || self.cursor_y > self.scroll_bottom {
            return;
        }
        let n = n.min(self.scroll_bottom - self.cursor_y + 1);
        for _ in 0..n {
            self.grid.remove(self.cursor_y);
            let blank = self.blank_row();
            self.grid.insert(self.scroll_bottom, blank);
        }
    }

    /// ICH: insert blanks at the cursor; the row is truncated at the right
    /// margin.
    pub(crate) fn insert_chars(&mut self, n: usize) {
        let x = self.cursor_x.min(self.cols - 1);
        let n = n.min(self.cols - x);
        let row = &mut self.grid[self.cursor_y];
        for _ in 0..n {
            row.pop();
            row.insert(x, Cell::default());
        }
    }

    /// DCH: delete characters at the cursor, padding the right edge with
    /// blanks.
    pub(crate) fn delete_chars(&mut self, n: usize) {
        let x = self.cursor_x.min(self.cols - 1);
        let n = n.min(self.cols - x);
        let row = &mut self.grid[self.cursor_y];
        for _ in 0..n {
            row.remove(x);
            row.push(Cell::default());
        }
    }

    /// ECH: blank cells at and right of the cursor, no shifting.
    pub(crate) fn erase_chars(&mut self, n: usize) {
        let x = self.cursor_x.min(self.cols - 1);
        let end = (x + n).min(self.cols);
        self.grid[self.cursor_y][x..end].fill(Cell::default());
    }

    // ── Save / restore, alternate screen, reset ──────────────────────

    pub(crate) fn save_cursor(&mut self) {
        self.saved_cursor = Some(SavedCursor {
            x: self.cursor_x,
            y: self.cursor_y,
            attrs: self.attrs,
        });
    }

    pub(crate) fn restore_cursor(&mut self) {
        let saved = self.saved_cursor.unwrap_or_default();
        self.cursor_x = saved.x.min(self.cols - 1);
        self.cursor_y = saved.y.min(self.rows - 1);
        self.attrs = saved.attrs;
    }

    /// DECSET 1049: stash the primary screen and start on a fresh grid.
    /// A second set while already active is ignored.
    pub(crate) fn enter_alt_screen(&mut self) {
        if self.alt.is_some() {
            return;
        }
        let fresh = vec![self.blank_row(); self.rows];
        let grid = std::mem::replace(&mut self.grid, fresh);
        self.alt = Some(AltStash {
            grid,
            cursor_x: self.cursor_x,
            cursor_y: self.cursor_y,
            scroll_top: self.scroll_top,
            scroll_bottom: self.scroll_bottom,
        });
        self.cursor_x = 0;
        self.cursor_y = 0;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
    }

    /// DECRST 1049: restore the stashed primary screen and cursor.
    pub(crate) fn exit_alt_screen(&mut self) {
        if let Some(stash) = self.alt.take() {
            self.grid = stash.grid;
            self.cursor_x = stash.cursor_x.min(self.cols - 1);
            self.cursor_y = stash.cursor_y.min(self.rows - 1);
            self.scroll_top = stash.scroll_top.min(self.rows - 1);
            self.scroll_bottom = stash.scroll_bottom.min(self.rows - 1);
        }
    }

    pub(crate) fn set_cursor_visible(&mut self, visible: bool) {
        self.cursor_visible = visible;
    }

    /// RIS (`ESC c`): back to the initial state. Buffered partial input is
    /// kept; the reset arrived mid-stream and parsing continues after it.
    pub(crate) fn full_reset(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        *self = Self::new(self.cols, self.rows);
        self.pending = pending;
    }
}

fn resize_grid(grid: &mut Vec<Vec<Cell>>, cols: usize, rows: usize) {
    for row in grid.iter_mut() {
        row.resize(cols, Cell::default());
    }
    grid.resize(rows, vec![Cell::default(); cols]);
}
