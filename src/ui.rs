use std::io::{self, Stdout, Write};

use crossterm::event::{
    DisableBracketedPaste, EnableBracketedPaste, Event, EventStream, KeyEvent, KeyEventKind,
};
use crossterm::style::{Attribute, Color as TermColor, SetAttribute, SetForegroundColor};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, Clear, ClearType, EnterAlternateScreen,
    LeaveAlternateScreen,
};
use crossterm::{cursor, execute, queue};
use futures::StreamExt;
use tokio::sync::mpsc;

use data::buffer::BufferList;
use data::line::is_split_char;
use data::session::Member;
use data::styled::{Color, Style, StyledString};
use data::merge;

use crate::event::AppEvent;

/// Width of the timestamp column, including its trailing space.
const TIME_COL: u16 = 9;
/// Width of the nick column.
const HEAD_COL: u16 = 12;
/// Width of the member column when shown.
const MEMBER_COL: u16 = 16;

#[derive(Debug)]
pub enum UiEvent {
    Key(KeyEvent),
    Resize(u16, u16),
    /// A bracketed paste, delivered whole; no typing notices and a
    /// single redraw for the lot.
    Paste(String),
    /// The terminal went away.
    Closed,
}

/// Forwards decoded terminal input to the orchestrator.
pub fn spawn_reader(events: mpsc::Sender<AppEvent>) {
    tokio::spawn(async move {
        let mut stream = EventStream::new();

        while let Some(event) = stream.next().await {
            let event = match event {
                Ok(Event::Key(key)) if key.kind != KeyEventKind::Release => UiEvent::Key(key),
                Ok(Event::Resize(w, h)) => UiEvent::Resize(w, h),
                Ok(Event::Paste(text)) => UiEvent::Paste(text),
                Ok(_) => continue,
                Err(_) => UiEvent::Closed,
            };

            let closed = matches!(event, UiEvent::Closed);
            if events.send(AppEvent::ui(event)).await.is_err() || closed {
                break;
            }
        }
    });
}

/// Minimal line editor: the input contract the orchestrator needs.
/// History and completion cycling live elsewhere.
#[derive(Debug, Default)]
pub struct Editor {
    text: Vec<char>,
    cursor: usize,
}

impl Editor {
    pub fn content(&self) -> String {
        self.text.iter().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn insert(&mut self, c: char) {
        self.text.insert(self.cursor, c);
        self.cursor += 1;
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars() {
            self.insert(c);
        }
    }

    pub fn backspace(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        self.cursor -= 1;
        self.text.remove(self.cursor);
        true
    }

    pub fn delete(&mut self) -> bool {
        if self.cursor >= self.text.len() {
            return false;
        }
        self.text.remove(self.cursor);
        true
    }

    pub fn delete_word(&mut self) -> bool {
        if self.cursor == 0 {
            return false;
        }
        while self.cursor > 0 && self.text[self.cursor - 1].is_whitespace() {
            self.cursor -= 1;
            self.text.remove(self.cursor);
        }
        while self.cursor > 0 && !self.text[self.cursor - 1].is_whitespace() {
            self.cursor -= 1;
            self.text.remove(self.cursor);
        }
        true
    }

    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn right(&mut self) {
        self.cursor = (self.cursor + 1).min(self.text.len());
    }

    pub fn home(&mut self) {
        self.cursor = 0;
    }

    pub fn end(&mut self) {
        self.cursor = self.text.len();
    }

    /// Clears the input; false when there was nothing to clear.
    pub fn clear(&mut self) -> bool {
        if self.text.is_empty() {
            return false;
        }
        self.text.clear();
        self.cursor = 0;
        true
    }

    pub fn set(&mut self, content: &str) {
        self.text = content.chars().collect();
        self.cursor = self.text.len();
    }

    /// Returns the submitted line and resets the editor.
    pub fn take(&mut self) -> String {
        self.cursor = 0;
        self.text.drain(..).collect()
    }
}

/// The terminal-facing aggregate: buffer list, editor, prompt, status,
/// and the crossterm surface everything is painted onto. Only the
/// orchestrator touches it.
pub struct Ui {
    out: Stdout,
    width: u16,
    height: u16,

    pub bufs: BufferList,
    pub editor: Editor,
    prompt: StyledString,
    status: String,
}

impl Ui {
    pub fn new() -> io::Result<Self> {
        let mut out = io::stdout();
        enable_raw_mode()?;
        execute!(out, EnterAlternateScreen, EnableBracketedPaste)?;

        let (width, height) = crossterm::terminal::size()?;

        let mut ui = Self {
            out,
            width,
            height,
            bufs: BufferList::new(Box::new(merge::merge_line)),
            editor: Editor::default(),
            prompt: StyledString::plain(">"),
            status: String::new(),
        };
        ui.resize(width, height);

        Ok(ui)
    }

    pub fn resize(&mut self, width: u16, height: u16) {
        self.width = width;
        self.height = height;
        self.bufs.resize_timeline(
            usize::from(self.timeline_width()),
            usize::from(height.saturating_sub(3)),
        );
    }

    fn member_col(&self) -> u16 {
        let (_, title) = self.bufs.current_buffer();
        if title.starts_with(['#', '&']) {
            MEMBER_COL
        } else {
            0
        }
    }

    fn timeline_width(&self) -> u16 {
        self.width
            .saturating_sub(TIME_COL + HEAD_COL + 1 + MEMBER_COL)
            .max(1)
    }

    pub fn set_prompt(&mut self, prompt: StyledString) {
        self.prompt = prompt;
    }

    pub fn set_status(&mut self, status: String) {
        self.status = status;
    }

    /// Half a timeline page, the scroll step.
    pub fn page(&self) -> usize {
        usize::from(self.height.saturating_sub(5)) / 2
    }

    /// Paints the whole screen: buffer bar, topic, timeline, member
    /// column, status, and the input line.
    pub fn draw(&mut self, members: &[Member]) -> io::Result<()> {
        // The member column shifts the wrap width; keep the cache keyed
        // to what we are about to paint
        self.bufs.resize_timeline(
            usize::from(self.timeline_width()),
            usize::from(self.height.saturating_sub(3)),
        );
        self.bufs.recompute_at_top();

        queue!(self.out, Clear(ClearType::All), cursor::Hide)?;

        self.draw_buffer_bar()?;
        self.draw_topic()?;
        self.draw_timeline()?;
        if self.member_col() > 0 {
            self.draw_members(members)?;
        }
        self.draw_status()?;
        self.draw_input()?;

        self.out.flush()
    }

    fn draw_buffer_bar(&mut self) -> io::Result<()> {
        queue!(self.out, cursor::MoveTo(0, 0))?;

        let current = self.bufs.current_index();
        let width = usize::from(self.width);
        let mut x = 0usize;

        let entries: Vec<(String, bool, bool, usize)> = self
            .bufs
            .buffers()
            .enumerate()
            .map(|(i, buffer)| {
                let title = if buffer.title.is_empty() {
                    buffer.net_name.clone()
                } else {
                    buffer.title.clone()
                };
                (title, i == current, buffer.unread, buffer.highlights)
            })
            .collect();

        for (title, is_current, unread, highlights) in entries {
            if x + title.len() + 4 > width {
                break;
            }

            if is_current {
                queue!(self.out, SetAttribute(Attribute::Reverse))?;
            } else if unread {
                queue!(
                    self.out,
                    SetAttribute(Attribute::Bold),
                    SetForegroundColor(TermColor::Yellow)
                )?;
            }
            write!(self.out, "{title}")?;
            x += title.len();

            if highlights > 0 {
                queue!(self.out, SetForegroundColor(TermColor::Red))?;
                let marker = format!(" {highlights}");
                write!(self.out, "{marker}")?;
                x += marker.len();
            }

            queue!(self.out, SetAttribute(Attribute::Reset))?;
            write!(self.out, " ")?;
            x += 1;
        }

        Ok(())
    }

    fn draw_topic(&mut self) -> io::Result<()> {
        let topic = self
            .bufs
            .cur()
            .map(|buffer| buffer.topic.clone())
            .unwrap_or_default();

        queue!(
            self.out,
            cursor::MoveTo(0, 1),
            SetAttribute(Attribute::Reset)
        )?;
        let width = usize::from(self.width);
        write!(self.out, "{}", truncate(&topic, width))?;

        Ok(())
    }

    fn draw_timeline(&mut self) -> io::Result<()> {
        let width = usize::from(self.timeline_width());
        let height = i32::from(self.height.saturating_sub(5));
        let top = 2i32;
        let body_x = TIME_COL + HEAD_COL + 1;

        let Some(buffer) = self.bufs.cur_mut() else {
            return Ok(());
        };

        // Rows are laid out bottom-up from the scroll offset
        let mut yi = top + height + buffer.scroll_amt as i32;
        let mut rendered: Vec<(i32, String, String, Color, StyledString, Vec<usize>)> = vec![];

        for line in buffer.lines.iter_mut().rev() {
            if yi < top {
                break;
            }
            let nls = line.new_lines(width).to_vec();
            yi -= nls.len() as i32 + 1;
            if yi >= top + height {
                continue;
            }

            let time = line.at.with_timezone(&chrono::Local).format("%H:%M:%S");
            rendered.push((
                yi,
                time.to_string(),
                line.head.clone(),
                line.head_color,
                line.body.clone(),
                nls,
            ));
        }

        for (yi, time, head, head_color, body, nls) in rendered {
            if yi >= top {
                queue!(
                    self.out,
                    cursor::MoveTo(0, yi as u16),
                    SetAttribute(Attribute::Bold)
                )?;
                write!(self.out, "{time}")?;
                queue!(self.out, SetAttribute(Attribute::Reset))?;

                if !head.is_empty() {
                    let pad = usize::from(HEAD_COL).saturating_sub(head.len());
                    queue!(self.out, cursor::MoveTo(TIME_COL + pad as u16, yi as u16))?;
                    apply_style(&mut self.out, Style::default().fg(head_color))?;
                    write!(self.out, "{}", truncate(&head, usize::from(HEAD_COL)))?;
                    queue!(self.out, SetAttribute(Attribute::Reset))?;
                }
            }

            let mut y = yi;
            let mut x = 0usize;
            let mut nls = nls.as_slice();
            let mut style = Style::default();
            let mut spans = body.spans();

            apply_style(&mut self.out, style)?;
            if y >= top {
                queue!(self.out, cursor::MoveTo(body_x, y as u16))?;
            }

            for (i, c) in body.as_str().char_indices() {
                if let Some(span) = spans.first() {
                    if span.start == i {
                        style = span.style;
                        apply_style(&mut self.out, style)?;
                        spans = &spans[1..];
                    }
                }
                if let Some(&break_at) = nls.first() {
                    if i == break_at {
                        x = 0;
                        y += 1;
                        nls = &nls[1..];
                        if y >= top + height {
                            break;
                        }
                        if y >= top {
                            queue!(self.out, cursor::MoveTo(body_x, y as u16))?;
                            apply_style(&mut self.out, style)?;
                        }
                    }
                }

                // Continuation rows skip their leading whitespace
                if y != yi && x == 0 && is_split_char(c) {
                    continue;
                }

                if y >= top && x < width {
                    write!(self.out, "{c}")?;
                }
                x += 1;
            }
            queue!(self.out, SetAttribute(Attribute::Reset))?;
        }

        Ok(())
    }

    fn draw_members(&mut self, members: &[Member]) -> io::Result<()> {
        let x = self.width.saturating_sub(MEMBER_COL);
        let height = self.height.saturating_sub(5);

        for (i, member) in members.iter().take(usize::from(height)).enumerate() {
            queue!(
                self.out,
                cursor::MoveTo(x, 2 + i as u16),
                SetAttribute(Attribute::Reset)
            )?;
            let label = format!("{}{}", member.power_level, member.nick);
            write!(self.out, "{}", truncate(&label, usize::from(MEMBER_COL)))?;
        }

        Ok(())
    }

    fn draw_status(&mut self) -> io::Result<()> {
        let y = self.height.saturating_sub(2);
        queue!(
            self.out,
            cursor::MoveTo(0, y),
            SetAttribute(Attribute::Dim)
        )?;
        let width = usize::from(self.width);
        write!(self.out, "{}", truncate(&self.status, width))?;
        queue!(self.out, SetAttribute(Attribute::Reset))?;

        Ok(())
    }

    fn draw_input(&mut self) -> io::Result<()> {
        let y = self.height.saturating_sub(1);
        queue!(self.out, cursor::MoveTo(0, y))?;

        let prompt = self.prompt.clone();
        draw_styled(&mut self.out, &prompt)?;
        write!(self.out, " ")?;

        let input = self.editor.content();
        let width = usize::from(self.width).saturating_sub(prompt.as_str().len() + 2);
        write!(self.out, "{}", truncate(&input, width))?;

        let cursor_x = (prompt.as_str().len() + 1 + self.editor.cursor.min(width)) as u16;
        queue!(self.out, cursor::MoveTo(cursor_x, y), cursor::Show)?;

        Ok(())
    }
}

impl Drop for Ui {
    fn drop(&mut self) {
        let _ = execute!(self.out, DisableBracketedPaste, LeaveAlternateScreen);
        let _ = disable_raw_mode();
    }
}

fn draw_styled(out: &mut Stdout, styled: &StyledString) -> io::Result<()> {
    let mut spans = styled.spans();

    for (i, c) in styled.as_str().char_indices() {
        if let Some(span) = spans.first() {
            if span.start == i {
                apply_style(out, span.style)?;
                spans = &spans[1..];
            }
        }
        write!(out, "{c}")?;
    }
    queue!(out, SetAttribute(Attribute::Reset))?;

    Ok(())
}

fn apply_style(out: &mut Stdout, style: Style) -> io::Result<()> {
    queue!(out, SetAttribute(Attribute::Reset))?;
    if style.bold {
        queue!(out, SetAttribute(Attribute::Bold))?;
    }
    if style.italic {
        queue!(out, SetAttribute(Attribute::Italic))?;
    }
    if style.underline {
        queue!(out, SetAttribute(Attribute::Underlined))?;
    }
    if style.reverse {
        queue!(out, SetAttribute(Attribute::Reverse))?;
    }
    if let Some(color) = term_color(style.fg) {
        queue!(out, SetForegroundColor(color))?;
    }
    if let Some(color) = term_color(style.bg) {
        queue!(out, crossterm::style::SetBackgroundColor(color))?;
    }
    Ok(())
}

fn term_color(color: Color) -> Option<TermColor> {
    match color {
        Color::Default => None,
        Color::White => Some(TermColor::White),
        Color::Black => Some(TermColor::Black),
        Color::Blue => Some(TermColor::DarkBlue),
        Color::Green => Some(TermColor::DarkGreen),
        Color::Red => Some(TermColor::Red),
        Color::Brown => Some(TermColor::DarkRed),
        Color::Magenta => Some(TermColor::DarkMagenta),
        Color::Orange => Some(TermColor::Rgb {
            r: 0xfc,
            g: 0x7f,
            b: 0x00,
        }),
        Color::Yellow => Some(TermColor::Yellow),
        Color::LightGreen => Some(TermColor::Green),
        Color::Cyan => Some(TermColor::DarkCyan),
        Color::LightCyan => Some(TermColor::Cyan),
        Color::LightBlue => Some(TermColor::Blue),
        Color::Pink => Some(TermColor::Rgb {
            r: 0xff,
            g: 0x00,
            b: 0xff,
        }),
        Color::Grey => Some(TermColor::DarkGrey),
        Color::LightGrey => Some(TermColor::Grey),
        Color::Rgb(r, g, b) => Some(TermColor::Rgb { r, g, b }),
    }
}

fn truncate(text: &str, width: usize) -> String {
    if text.chars().count() <= width {
        text.to_string()
    } else {
        let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
        out.push('\u{2026}');
        out
    }
}

#[cfg(test)]
mod test {
    use super::Editor;

    #[test]
    fn editor_contract() {
        let mut editor = Editor::default();
        editor.insert_str("hello world");
        assert_eq!(editor.content(), "hello world");

        assert!(editor.delete_word());
        assert_eq!(editor.content(), "hello ");

        editor.home();
        assert!(!editor.backspace());
        assert!(editor.delete());
        assert_eq!(editor.content(), "ello ");

        assert_eq!(editor.take(), "ello ");
        assert!(editor.is_empty());
        assert!(!editor.clear());
    }
}
