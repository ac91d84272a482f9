use std::sync::LazyLock;

use regex::Regex;

// Conservative by design: better to miss an exotic URL than to underline
// half a sentence.
static URL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:https?|ircs?|gemini)://[^\s<>()\[\]"']+[^\s<>()\[\]"'.,;:!?]"#)
        .expect("valid url regex")
});

/// https://modern.ircdocs.horse/formatting.html#colors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    White,
    Black,
    Blue,
    Green,
    Red,
    Brown,
    Magenta,
    Orange,
    Yellow,
    LightGreen,
    Cyan,
    LightCyan,
    LightBlue,
    Pink,
    Grey,
    LightGrey,
    Rgb(u8, u8, u8),
}

impl Color {
    pub fn code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::White),
            1 => Some(Self::Black),
            2 => Some(Self::Blue),
            3 => Some(Self::Green),
            4 => Some(Self::Red),
            5 => Some(Self::Brown),
            6 => Some(Self::Magenta),
            7 => Some(Self::Orange),
            8 => Some(Self::Yellow),
            9 => Some(Self::LightGreen),
            10 => Some(Self::Cyan),
            11 => Some(Self::LightCyan),
            12 => Some(Self::LightBlue),
            13 => Some(Self::Pink),
            14 => Some(Self::Grey),
            15 => Some(Self::LightGrey),
            16..=98 => Some(Self::hex(EXTENDED_PALETTE[usize::from(code) - 16])),
            99 => Some(Self::Default),
            _ => None,
        }
    }

    fn hex(hex: u32) -> Self {
        let r = (hex & 0xff0000) >> 16;
        let g = (hex & 0xff00) >> 8;
        let b = hex & 0xff;

        Self::Rgb(r as u8, g as u8, b as u8)
    }
}

// Codes 16..=98 of the extended color table.
const EXTENDED_PALETTE: [u32; 83] = [
    0x470000, 0x472100, 0x474700, 0x324700, 0x004700, 0x00472c, 0x004747, 0x002747, 0x000047,
    0x2e0047, 0x470047, 0x47002a, 0x740000, 0x743a00, 0x747400, 0x517400, 0x007400, 0x007449,
    0x007474, 0x004074, 0x000074, 0x4b0074, 0x740074, 0x740045, 0xb50000, 0xb56300, 0xb5b500,
    0x7db500, 0x00b500, 0x00b571, 0x00b5b5, 0x0063b5, 0x0000b5, 0x7500b5, 0xb500b5, 0xb5006b,
    0xff0000, 0xff8c00, 0xffff00, 0xb2ff00, 0x00ff00, 0x00ffa0, 0x00ffff, 0x008cff, 0x0000ff,
    0xa500ff, 0xff00ff, 0xff0098, 0xff5959, 0xffb459, 0xffff71, 0xcfff60, 0x6fff6f, 0x65ffc9,
    0x6dffff, 0x59b4ff, 0x5959ff, 0xc459ff, 0xff66ff, 0xff59bc, 0xff9c9c, 0xffd39c, 0xffff9c,
    0xe2ff9c, 0x9cff9c, 0x9cffdb, 0x9cffff, 0x9cd3ff, 0x9c9cff, 0xdc9cff, 0xff9cff, 0xff94d3,
    0x000000, 0x131313, 0x282828, 0x363636, 0x4d4d4d, 0x656565, 0x818181, 0x9f9f9f, 0xbcbcbc,
    0xe2e2e2, 0xffffff,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub bold: bool,
    pub italic: bool,
    pub underline: bool,
    pub reverse: bool,
}

impl Style {
    pub fn fg(self, fg: Color) -> Self {
        Self { fg, ..self }
    }

    pub fn bold(self) -> Self {
        Self { bold: true, ..self }
    }

    pub fn underline(self) -> Self {
        Self {
            underline: true,
            ..self
        }
    }
}

/// A style change taking effect at byte offset `start` of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub style: Style,
}

/// Plain text plus a sorted list of style spans. Each span applies from
/// its start offset until the next span (or the end of the text).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StyledString {
    text: String,
    spans: Vec<Span>,
}

impl StyledString {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            spans: vec![],
        }
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            spans: vec![Span { start: 0, style }],
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn spans(&self) -> &[Span] {
        &self.spans
    }

    /// The style in effect at byte offset `at`.
    pub fn style_at(&self, at: usize) -> Style {
        match self.spans.partition_point(|span| span.start <= at) {
            0 => Style::default(),
            i => self.spans[i - 1].style,
        }
    }

    /// Underlines every URL in the text, preserving surrounding styling.
    pub fn parse_urls(mut self) -> Self {
        let ranges = URL_REGEX
            .find_iter(&self.text)
            .map(|found| (found.start(), found.end()))
            .collect::<Vec<_>>();

        for (start, end) in ranges {
            self.restyle(start, end, |style| style.underline = true);
        }

        self
    }

    /// Applies `f` to the styles within `start..end`.
    fn restyle(&mut self, start: usize, end: usize, f: impl Fn(&mut Style)) {
        let restored = self.style_at(end);

        let i = self.spans.partition_point(|span| span.start < start);
        if self.spans.get(i).map(|span| span.start) != Some(start) {
            let style = self.style_at(start);
            self.spans.insert(i, Span { start, style });
        }

        if end < self.text.len() {
            let j = self.spans.partition_point(|span| span.start < end);
            if self.spans.get(j).map(|span| span.start) != Some(end) {
                self.spans.insert(
                    j,
                    Span {
                        start: end,
                        style: restored,
                    },
                );
            }
        }

        for span in &mut self.spans {
            if span.start >= start && span.start < end {
                f(&mut span.style);
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct Builder {
    text: String,
    spans: Vec<Span>,
    style: Style,
    pending: bool,
}

impl Builder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_style(&mut self, style: Style) {
        if style != self.style {
            self.style = style;
            self.pending = true;
        }
    }

    pub fn write_str(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if self.pending {
            self.spans.push(Span {
                start: self.text.len(),
                style: self.style,
            });
            self.pending = false;
        }
        self.text.push_str(text);
    }

    pub fn write_char(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.write_str(c.encode_utf8(&mut buf));
    }

    pub fn write_styled(&mut self, styled: &StyledString) {
        let base = self.text.len();
        let had_spans = !styled.spans.is_empty();

        // The appended string starts at its own default style
        if styled.spans.first().map(|span| span.start) != Some(0) {
            self.set_style(Style::default());
        }
        self.write_str(styled.as_str());

        if had_spans {
            for span in &styled.spans {
                self.spans.push(Span {
                    start: base + span.start,
                    style: span.style,
                });
            }
            self.style = styled.spans.last().map(|span| span.style).unwrap_or_default();
            self.pending = false;
        }
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn build(self) -> StyledString {
        StyledString {
            text: self.text,
            spans: self.spans,
        }
    }
}

/// Formatting modifiers understood by the stripper.
const BOLD: char = '\x02';
const COLOR: char = '\x03';
const RESET: char = '\x0f';
const REVERSE: char = '\x16';
const ITALIC: char = '\x1d';
const UNDERLINE: char = '\x1f';

/// Converts an IRC-formatted string into a styled one, stripping the
/// formatting codes from the body.
pub fn parse_irc(text: &str) -> StyledString {
    let mut out = Builder::new();
    let mut style = Style::default();
    let mut iter = text.chars().peekable();

    while let Some(c) = iter.next() {
        match c {
            BOLD => style.bold = !style.bold,
            ITALIC => style.italic = !style.italic,
            UNDERLINE => style.underline = !style.underline,
            REVERSE => style.reverse = !style.reverse,
            RESET => style = Style::default(),
            COLOR => {
                let fg = take_color_digits(&mut iter);
                match fg {
                    Some(code) => {
                        style.fg = Color::code(code).unwrap_or_default();
                        // A background only follows a comma with a digit
                        // right behind it
                        if iter.peek() == Some(&',') {
                            let mut lookahead = iter.clone();
                            lookahead.next();
                            if lookahead.peek().is_some_and(char::is_ascii_digit) {
                                iter.next();
                                if let Some(code) = take_color_digits(&mut iter) {
                                    style.bg = Color::code(code).unwrap_or_default();
                                }
                            }
                        }
                    }
                    // A bare color code resets both colors
                    None => {
                        style.fg = Color::Default;
                        style.bg = Color::Default;
                    }
                }
            }
            c => {
                out.set_style(style);
                out.write_char(c);
            }
        }
    }

    out.build()
}

fn take_color_digits(iter: &mut std::iter::Peekable<std::str::Chars>) -> Option<u8> {
    let mut digits = String::new();
    while digits.len() < 2 {
        match iter.peek() {
            Some(c) if c.is_ascii_digit() => {
                digits.push(*c);
                iter.next();
            }
            _ => break,
        }
    }

    digits.parse().ok()
}

/// Strips formatting codes, returning the plain body.
pub fn strip_irc(text: &str) -> String {
    parse_irc(text).text
}

// Base 16 colors excluding the grayscales, like the terminal palette the
// nick colors rotate over.
const IDENT_COLORS: [Color; 13] = [
    Color::Red,
    Color::Green,
    Color::Yellow,
    Color::Blue,
    Color::Magenta,
    Color::Cyan,
    Color::LightGrey,
    Color::LightGreen,
    Color::Orange,
    Color::LightCyan,
    Color::LightBlue,
    Color::Pink,
    Color::Brown,
];

/// A stable per-identity color, derived from an FNV-1a hash of the name.
pub fn ident_color(ident: &str) -> Color {
    let mut hash: u32 = 0x811c9dc5;
    for byte in ident.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(0x01000193);
    }

    IDENT_COLORS[hash as usize % IDENT_COLORS.len()]
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn formatting_codes_are_stripped() {
        let styled = parse_irc("\x02bold\x02 plain \x034red\x03 done");
        assert_eq!(styled.as_str(), "bold plain red done");

        assert!(styled.style_at(0).bold);
        assert!(!styled.style_at(5).bold);
        assert_eq!(styled.style_at(11).fg, Color::Red);
        assert_eq!(styled.style_at(15).fg, Color::Default);
    }

    #[test]
    fn color_with_background() {
        let styled = parse_irc("\x034,12text");
        assert_eq!(styled.as_str(), "text");
        assert_eq!(styled.style_at(0).fg, Color::Red);
        assert_eq!(styled.style_at(0).bg, Color::LightBlue);

        // A comma not followed by a digit stays in the body
        let styled = parse_irc("\x034,text");
        assert_eq!(styled.as_str(), ",text");
        assert_eq!(styled.style_at(0).fg, Color::Red);
    }

    #[test]
    fn url_detection_underlines() {
        let styled =
            StyledString::plain("see https://example.com/page for details").parse_urls();

        let url_start = "see ".len();
        let url_end = "see https://example.com/page".len();
        assert!(styled.style_at(url_start).underline);
        assert!(styled.style_at(url_end - 1).underline);
        assert!(!styled.style_at(url_end).underline);
        assert!(!styled.style_at(0).underline);
    }

    #[test]
    fn url_preserves_existing_color() {
        let mut styled = StyledString::styled(
            "go to https://example.com now",
            Style::default().fg(Color::Green),
        );
        styled = styled.parse_urls();

        let inside = "go to ht".len();
        assert!(styled.style_at(inside).underline);
        assert_eq!(styled.style_at(inside).fg, Color::Green);

        let after = "go to https://example.com".len();
        assert!(!styled.style_at(after).underline);
        assert_eq!(styled.style_at(after).fg, Color::Green);
    }

    #[test]
    fn builder_concatenation() {
        let mut builder = Builder::new();
        builder.set_style(Style::default().fg(Color::Grey));
        builder.write_str("alice");
        builder.set_style(Style::default());
        builder.write_str("\u{2192}");
        builder.set_style(Style::default().fg(Color::Grey));
        builder.write_str("bob");

        let styled = builder.build();
        assert_eq!(styled.as_str(), "alice\u{2192}bob");
        assert_eq!(styled.style_at(0).fg, Color::Grey);
        assert_eq!(styled.style_at("alice".len()).fg, Color::Default);
        assert_eq!(styled.style_at("alice\u{2192}".len()).fg, Color::Grey);
    }

    #[test]
    fn ident_color_is_stable() {
        assert_eq!(ident_color("alice"), ident_color("alice"));
    }
}
