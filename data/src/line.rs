use chrono::{DateTime, Utc};
use unicode_width::UnicodeWidthChar;

use crate::event::Event;
use crate::styled::{Color, StyledString};

pub fn is_split_char(c: char) -> bool {
    c == ' ' || c == '\t'
}

fn char_width(c: char) -> usize {
    c.width().unwrap_or(0)
}

/// A boundary between a whitespace run and a non-whitespace run.
///
/// `x` is the cell offset, `i` the byte offset; `split` marks the start
/// of whitespace.
#[derive(Debug, Clone, Copy)]
struct Point {
    x: usize,
    i: usize,
    split: bool,
}

/// One rendered timeline entry.
#[derive(Debug, Clone)]
pub struct Line {
    pub at: DateTime<Utc>,
    pub head: String,
    pub body: StyledString,
    pub head_color: Color,
    pub highlight: bool,
    pub readable: bool,
    pub mergeable: bool,
    /// The events this line was rendered from, kept for re-merging.
    pub events: Vec<Event>,

    split_points: Vec<Point>,
    width: usize,
    new_lines: Vec<usize>,
}

impl Line {
    pub fn new(at: DateTime<Utc>, head: impl Into<String>, body: StyledString) -> Self {
        Self {
            at,
            head: head.into(),
            body,
            head_color: Color::Default,
            highlight: false,
            readable: false,
            mergeable: false,
            events: vec![],
            split_points: vec![],
            width: 0,
            new_lines: vec![],
        }
    }

    pub fn head_color(mut self, color: Color) -> Self {
        self.head_color = color;
        self
    }

    pub fn highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn readable(mut self) -> Self {
        self.readable = true;
        self
    }

    pub fn mergeable(mut self, events: Vec<Event>) -> Self {
        self.mergeable = true;
        self.events = events;
        self
    }

    /// A line whose body came out empty must be dropped by the caller.
    pub fn is_zero(&self) -> bool {
        self.body.is_empty()
    }

    /// Replaces the body, recomputing split points and discarding the
    /// wrap cache.
    pub fn set_body(&mut self, body: StyledString) {
        self.body = body;
        self.width = 0;
        self.new_lines.clear();
        self.compute_split_points();
    }

    pub fn compute_split_points(&mut self) {
        self.split_points.clear();

        let mut width = 0;
        let mut last_was_split = false;

        for (i, c) in self.body.as_str().char_indices() {
            let cur_is_split = is_split_char(c);

            if i == 0 || last_was_split != cur_is_split {
                self.split_points.push(Point {
                    x: width,
                    i,
                    split: cur_is_split,
                });
            }

            last_was_split = cur_is_split;
            width += char_width(c);
        }

        if !last_was_split {
            self.split_points.push(Point {
                x: width,
                i: self.body.as_str().len(),
                split: true,
            });
        }
    }

    /// Rows this line occupies at the given width.
    pub fn rows(&mut self, width: usize) -> usize {
        self.new_lines(width).len() + 1
    }

    /// Byte offsets where the body hard-wraps at the given width.
    ///
    /// The result is cached; recomputation only happens when the width
    /// changes.
    pub fn new_lines(&mut self, width: usize) -> &[usize] {
        if self.width == width {
            return &self.new_lines;
        }
        self.new_lines.clear();
        self.width = width;

        if width == 0 {
            return &self.new_lines;
        }

        let body = self.body.as_str();
        let mut x = 0;

        // Walk the split points two at a time; each pair delimits one run
        // of whitespace or one word.
        for i in 1..self.split_points.len() {
            let sp1 = self.split_points[i - 1];
            let sp2 = self.split_points[i];
            let run = sp2.x - sp1.x;

            if !self.new_lines.is_empty() && x == 0 && sp1.split {
                // Whitespace at the start of a continuation row is skipped
            } else if !sp1.split && run == width {
                // The word exactly fills a row: break before it unless a
                // break is already there, and break after it
                if i > 1
                    && !self.new_lines.is_empty()
                    && *self.new_lines.last().unwrap() != self.split_points[i - 2].i
                {
                    self.new_lines.push(self.split_points[i - 2].i);
                }
                x = 0;
                self.new_lines.push(sp2.i);
            } else if run + x < width {
                x += run;
            } else if run + x == width {
                // Fits, with no room left on the row
                x = 0;
                self.new_lines.push(sp2.i);
            } else if sp1.split && width < run {
                // Whitespace wider than the terminal
                x = 0;
                self.new_lines.push(sp1.i);
            } else if width < run {
                // A word longer than the terminal is broken at cell
                // boundaries, continuing from the current column
                let mut word_width = 0;
                let mut row = 1;
                for (j, c) in body[sp1.i..sp2.i].char_indices() {
                    word_width += char_width(c);
                    if row * width < x + word_width {
                        self.new_lines.push(sp1.i + j);
                        row += 1;
                    }
                }
                x = (x + word_width) % width;
                if x == 0 {
                    self.new_lines.push(sp2.i);
                }
            } else {
                // Doesn't fit, but fits on the next row
                self.new_lines.push(sp1.i);
                x = if sp1.split { 0 } else { run };
            }
        }

        if self.new_lines.last() == Some(&body.len()) {
            self.new_lines.pop();
        }

        &self.new_lines
    }
}

#[cfg(test)]
mod test {
    use chrono::Utc;

    use super::*;
    use crate::styled::StyledString;

    fn line(body: &str) -> Line {
        let mut line = Line::new(Utc::now(), "", StyledString::plain(body));
        line.compute_split_points();
        line
    }

    #[test]
    fn wrap_words() {
        let mut l = line("hello world foo bar");

        // "hello" / "world foo" (exactly 9 cells) / "bar"
        assert_eq!(l.new_lines(9), &[6, 15]);

        // "hello" / "world" / "foo" / "bar"; "hello" and "world" each
        // fill the row exactly
        assert_eq!(l.new_lines(5), &[5, 11, 16]);
    }

    #[test]
    fn wrap_long_word() {
        let mut l = line("abcdefghij");
        assert_eq!(l.new_lines(4), &[4, 8]);
    }

    #[test]
    fn wrap_whitespace_run() {
        // Whitespace wider than the row breaks at its start; the word
        // after lands on the next row
        let mut l = line("a      b");
        assert_eq!(l.new_lines(4), &[1]);
    }

    #[test]
    fn wrap_wide_codepoints() {
        // Each CJK codepoint is two cells
        let mut l = line("\u{4f60}\u{597d} ab");
        assert_eq!(l.new_lines(4), &[6]);
    }

    #[test]
    fn wrap_cache() {
        let mut l = line("hello world foo bar");

        let first = l.new_lines(9).to_vec();
        // Same width hits the cache
        assert_eq!(l.new_lines(9), first.as_slice());
        // Width change recomputes
        assert_eq!(l.new_lines(5), &[5, 11, 16]);
        assert_eq!(l.new_lines(9), first.as_slice());
    }

    #[test]
    fn wrap_trailing_break_dropped() {
        // "ab" fills the row exactly; no break is recorded at the end of
        // the body
        let mut l = line("ab");
        assert_eq!(l.new_lines(2), &[] as &[usize]);
    }

    #[test]
    fn set_body_invalidates_cache() {
        let mut l = line("hello world foo bar");
        assert_eq!(l.new_lines(9), &[6, 15]);

        l.set_body(StyledString::plain("ab cd"));
        assert_eq!(l.new_lines(9), &[] as &[usize]);
    }

    #[test]
    fn empty_body_has_no_breaks() {
        let mut l = line("");
        assert!(l.is_zero());
        assert_eq!(l.new_lines(10), &[] as &[usize]);
    }
}
