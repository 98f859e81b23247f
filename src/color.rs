//! Colour table: mIRC-style control codes used to style
//! announcement fragments.

/// `^O` (0x0F) terminates any run of styling.
pub const RESET: char = '\u{0F}';
const BOLD: char = '\u{02}';
const UNDERLINE: char = '\u{1F}';
const REVERSE: char = '\u{16}';
const COLOR: char = '\u{03}';

/// A single named colour from the mIRC 16-colour palette,
/// encoded as `^C` + its two-digit index (skipping 15, which mIRC
/// reserves for its own use).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Black,
    Navy,
    Green,
    Red,
    Brown,
    Purple,
    Orange,
    Yellow,
    Lime,
    Teal,
    Aqua,
    Blue,
    Fuchsia,
    Silver,
    White,
}

impl Color {
    fn index(self) -> u8 {
        match self {
            Color::Black => 1,
            Color::Navy => 2,
            Color::Green => 3,
            Color::Red => 4,
            Color::Brown => 5,
            Color::Purple => 6,
            Color::Orange => 7,
            Color::Yellow => 8,
            Color::Lime => 9,
            Color::Teal => 10,
            Color::Aqua => 11,
            Color::Blue => 12,
            Color::Fuchsia => 13,
            Color::Silver => 14,
            // 15 is skipped.
            Color::White => 16,
        }
    }
}

/// One or more simultaneously applied styles (bold/underline/reverse
/// can combine with a colour; the tokens just concatenate).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Style {
    pub bold: bool,
    pub underline: bool,
    pub reverse: bool,
    pub color: Option<Color>,
}

impl Style {
    pub fn new() -> Style {
        Style::default()
    }

    pub fn bold() -> Style {
        Style {
            bold: true,
            ..Style::default()
        }
    }

    pub fn underline() -> Style {
        Style {
            underline: true,
            ..Style::default()
        }
    }

    pub fn reverse() -> Style {
        Style {
            reverse: true,
            ..Style::default()
        }
    }

    pub fn color(c: Color) -> Style {
        Style {
            color: Some(c),
            ..Style::default()
        }
    }

    pub fn bold_and(mut self) -> Style {
        self.bold = true;
        self
    }

    pub fn underline_and(mut self) -> Style {
        self.underline = true;
        self
    }

    fn prefix(&self) -> String {
        let mut out = String::new();
        if self.bold {
            out.push(BOLD);
        }
        if self.underline {
            out.push(UNDERLINE);
        }
        if self.reverse {
            out.push(REVERSE);
        }
        if let Some(c) = self.color {
            out.push(COLOR);
            out.push_str(&format!("{:02}", c.index()));
        }
        out
    }

    /// Wrap `text` in this style's escape codes, terminated by `^O`.
    pub fn apply(&self, text: &str) -> String {
        if self.bold || self.underline || self.reverse || self.color.is_some() {
            format!("{}{}{}", self.prefix(), text, RESET)
        } else {
            text.to_string()
        }
    }
}

/// Strip every colour/style control code from a string, leaving plain
/// text. Used by tests that compare against the underlying text shape
/// with colour codes stripped.
pub fn strip(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            BOLD | UNDERLINE | REVERSE | RESET => {}
            COLOR => {
                // Consume up to two following digits.
                for _ in 0..2 {
                    if matches!(chars.peek(), Some(d) if d.is_ascii_digit()) {
                        chars.next();
                    } else {
                        break;
                    }
                }
            }
            other => out.push(other),
        }
    }
    out
}
