/// Color index for "no color set": the terminal default.
pub const DEFAULT_COLOR: i16 = -1;

/// Display attributes carried by each cell and by the current pen.
///
/// Colors are palette indices: -1 default, 0-7 standard, 8-15 bright,
/// 16-255 the 256-color palette. 24-bit SGR input is downsampled to the
/// 6x6x6 cube before it gets here (see [`rgb_to_cube`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attrs {
    pub fg: i16,
    pub bg: i16,
    pub bold: bool,
    pub dim: bool,
    pub italic: bool,
    pub underline: bool,
    pub blink: bool,
    pub inverse: bool,
    pub hidden: bool,
    pub strikethrough: bool,
}

impl Default for Attrs {
    fn default() -> Self {
        Self {
            fg: DEFAULT_COLOR,
            bg: DEFAULT_COLOR,
            bold: false,
            dim: false,
            italic: false,
            underline: false,
            blink: false,
            inverse: false,
            hidden: false,
            strikethrough: false,
        }
    }
}

impl Attrs {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// One grid cell: a single display character plus its attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cell {
    pub ch: char,
    pub attrs: Attrs,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            ch: ' ',
            attrs: Attrs::default(),
        }
    }
}

impl Cell {
    /// True for a blank cell with no attributes, i.e. what erase produces.
    pub fn is_blank(&self) -> bool {
        self.ch == ' ' && self.attrs.is_default()
    }
}

/// Downsample a 24-bit color to its nearest 6x6x6 cube index.
pub fn rgb_to_cube(r: u8, g: u8, b: u8) -> i16 {
    let r = r as i16 / 51;
    let g = g as i16 / 51;
    let b = b as i16 / 51;
    16 + 36 * r + 6 * g + b
}
