use chrono::{DateTime, Timelike, Utc};

use crate::line::Line;
use crate::styled::{Color, Style, StyledString};

/// Title of the transient overlay buffer holding search results.
pub const OVERLAY: &str = "/overlay";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notify {
    None,
    Unread,
    Highlight,
}

/// Known extent of fetched history for one buffer, used to classify
/// incoming history lines as before, within, or after what we have.
///
/// Timestamps are compared at second precision (the resolution server
/// time tags survive round trips with); an equal-timestamp line whose
/// body differs from the boundary message is treated as "before" so a
/// boundary duplicate re-sorts instead of duplicating.
#[derive(Debug, Clone, Default)]
pub struct Bounds {
    first: Option<(DateTime<Utc>, String)>,
    last: Option<(DateTime<Utc>, String)>,
}

impl Bounds {
    pub fn is_zero(&self) -> bool {
        self.first.is_none()
    }

    /// -1 if the line is before the bounds, 0 within, +1 after.
    pub fn compare(&self, line: &Line) -> i8 {
        let at = truncate(line.at);

        let Some((first, first_message)) = &self.first else {
            return 1;
        };

        if at < *first {
            return -1;
        }
        if let Some((last, last_message)) = &self.last {
            if at > *last {
                return 1;
            }
            if at == *last && line.body.as_str() != last_message {
                return -1;
            }
        } else {
            return 1;
        }
        if at == *first && line.body.as_str() != first_message {
            return -1;
        }

        0
    }

    /// Widens the bounds to include the line.
    pub fn update(&mut self, line: &Line) {
        let at = truncate(line.at);
        let body = line.body.as_str().to_string();

        match &self.first {
            None => self.first = Some((at, body)),
            Some((first, _)) if at < *first => self.first = Some((at, body)),
            _ => match &self.last {
                None => self.last = Some((at, body)),
                Some((last, _)) if at > *last => self.last = Some((at, body)),
                _ => {}
            },
        }
    }

    pub fn first_time(&self) -> Option<DateTime<Utc>> {
        self.first.as_ref().map(|(at, _)| *at)
    }

    pub fn last_time(&self) -> Option<DateTime<Utc>> {
        self.last.as_ref().map(|(at, _)| *at)
    }
}

fn truncate(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(0).unwrap_or(at)
}

#[derive(Debug)]
pub struct Buffer {
    pub net_id: String,
    pub net_name: String,
    pub title: String,
    pub highlights: usize,
    pub unread: bool,
    pub read: Option<DateTime<Utc>>,
    pub opened_once: bool,

    pub lines: Vec<Line>,
    pub topic: String,

    pub scroll_amt: usize,
    pub is_at_top: bool,
}

impl Buffer {
    fn new(net_id: String, net_name: String, title: String) -> Self {
        Self {
            net_id,
            net_name,
            title,
            highlights: 0,
            unread: false,
            read: None,
            opened_once: false,
            lines: vec![],
            topic: String::new(),
            scroll_amt: 0,
            is_at_top: false,
        }
    }
}

type MergeHook = Box<dyn Fn(&mut Line, Line) + Send>;

/// The ordered set of conversation buffers, sorted by network name then
/// title, both case-insensitive. An optional overlay buffer (search
/// results) shadows the current buffer while open.
pub struct BufferList {
    list: Vec<Buffer>,
    overlay: Option<Buffer>,
    current: usize,
    clicked: Option<usize>,

    tl_inner_width: usize,
    tl_height: usize,

    do_merge_line: MergeHook,
}

impl BufferList {
    /// Call `resize_timeline` once before use.
    pub fn new(merge_line: MergeHook) -> Self {
        Self {
            list: vec![],
            overlay: None,
            current: 0,
            clicked: None,
            tl_inner_width: 0,
            tl_height: 0,
            do_merge_line: merge_line,
        }
    }

    pub fn resize_timeline(&mut self, inner_width: usize, height: usize) {
        self.tl_inner_width = inner_width;
        self.tl_height = height.saturating_sub(2);
    }

    pub fn timeline_width(&self) -> usize {
        self.tl_inner_width
    }

    pub fn timeline_height(&self) -> usize {
        self.tl_height
    }

    pub fn open_overlay(&mut self) {
        self.overlay = Some(Buffer::new(String::new(), String::new(), OVERLAY.to_string()));
    }

    pub fn close_overlay(&mut self) {
        self.overlay = None;
    }

    pub fn has_overlay(&self) -> bool {
        self.overlay.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    pub fn len(&self) -> usize {
        self.list.len()
    }

    pub fn buffers(&self) -> impl Iterator<Item = &Buffer> {
        self.list.iter()
    }

    /// Index of the focused buffer.
    pub fn current_index(&self) -> usize {
        self.current
    }

    /// (netID, title) of the focused buffer, ignoring the overlay.
    pub fn current_buffer(&self) -> (&str, &str) {
        match self.list.get(self.current) {
            Some(buffer) => (&buffer.net_id, &buffer.title),
            None => ("", ""),
        }
    }

    pub fn clicked(&self) -> Option<usize> {
        self.clicked
    }

    pub fn set_clicked(&mut self, clicked: Option<usize>) {
        self.clicked = clicked;
    }

    /// Focuses buffer `i` (clamped), clearing its counters.
    pub fn to(&mut self, i: usize) -> bool {
        self.overlay = None;
        if i == self.current || self.list.is_empty() {
            return false;
        }
        self.current = i.min(self.list.len() - 1);
        self.focus_current();
        true
    }

    pub fn next(&mut self) {
        self.overlay = None;
        if self.list.is_empty() {
            return;
        }
        self.current = (self.current + 1) % self.list.len();
        self.focus_current();
    }

    pub fn previous(&mut self) {
        self.overlay = None;
        if self.list.is_empty() {
            return;
        }
        self.current = (self.current + self.list.len() - 1) % self.list.len();
        self.focus_current();
    }

    /// Focuses the next buffer with unread activity, skipping the
    /// focused one. Returns false when nothing is unread.
    pub fn next_unread(&mut self) -> bool {
        self.cycle_unread(true)
    }

    pub fn previous_unread(&mut self) -> bool {
        self.cycle_unread(false)
    }

    fn cycle_unread(&mut self, forward: bool) -> bool {
        let len = self.list.len();
        for step in 1..len {
            let i = if forward {
                (self.current + step) % len
            } else {
                (self.current + len - step) % len
            };
            if self.list[i].unread || self.list[i].highlights > 0 {
                self.overlay = None;
                self.current = i;
                self.focus_current();
                return true;
            }
        }
        false
    }

    /// Focuses the first buffer whose title contains `substr`,
    /// case-insensitively.
    pub fn jump_buffer(&mut self, substr: &str) -> bool {
        let needle = substr.to_lowercase();
        for i in 0..self.list.len() {
            if self.list[i].title.to_lowercase().contains(&needle) {
                self.overlay = None;
                self.current = i;
                self.focus_current();
                return true;
            }
        }
        false
    }

    pub fn jump_buffer_network(&mut self, net_id: &str, substr: &str) -> bool {
        let needle = substr.to_lowercase();
        for i in 0..self.list.len() {
            if self.list[i].net_id == net_id
                && self.list[i].title.to_lowercase().contains(&needle)
            {
                self.overlay = None;
                self.current = i;
                self.focus_current();
                return true;
            }
        }
        false
    }

    fn focus_current(&mut self) {
        if let Some(buffer) = self.list.get_mut(self.current) {
            buffer.highlights = 0;
            buffer.unread = false;
        }
    }

    /// Inserts a buffer at its sorted position; `current` is adjusted so
    /// the focused buffer stays focused. Returns the index and whether a
    /// new buffer was created.
    pub fn add(&mut self, net_id: &str, net_name: &str, title: &str) -> (usize, bool) {
        let mut net_name = net_name.to_string();
        let title_cf = title.to_lowercase();

        let mut i = 0;
        for (bi, buffer) in self.list.iter().enumerate() {
            if net_name.is_empty() && buffer.net_id == net_id {
                net_name = buffer.net_name.clone();
            }
            let buffer_net = buffer.net_name.to_lowercase();
            let net = net_name.to_lowercase();
            if net_name.is_empty() || buffer_net < net {
                i = bi + 1;
                continue;
            }
            if buffer_net > net {
                break;
            }
            let buffer_title = buffer.title.to_lowercase();
            if buffer_title < title_cf {
                i = bi + 1;
                continue;
            }
            if buffer_title == title_cf {
                return (bi, false);
            }
            break;
        }

        if i <= self.current && self.current < self.list.len() {
            self.current += 1;
        }

        self.list.insert(
            i,
            Buffer::new(net_id.to_string(), net_name, title.to_string()),
        );
        (i, true)
    }

    pub fn remove(&mut self, net_id: &str, title: &str) -> bool {
        if self
            .overlay
            .as_ref()
            .is_some_and(|overlay| net_id.is_empty() && overlay.title == title)
        {
            self.overlay = None;
            return false;
        }

        let Some(idx) = self.index_of(net_id, title) else {
            return false;
        };

        self.list.remove(idx);
        if self.current >= self.list.len() && self.current > 0 {
            self.current -= 1;
        }
        true
    }

    /// Appends a line to a buffer.
    ///
    /// An unread separator is inserted ahead of the first notifying line
    /// in an unfocused buffer; mergeable lines collapse into the previous
    /// one; highlight lines bump the counter; a scrolled-up view is kept
    /// stable.
    pub fn add_line(&mut self, net_id: &str, title: &str, notify: Notify, mut line: Line) {
        let is_current = {
            let (cur_net, cur_title) = self.cur_key();
            cur_net == net_id && cur_title.to_lowercase() == title.to_lowercase()
        };
        let width = self.tl_inner_width;

        let Some(buffer) = self.at_mut(net_id, title) else {
            return;
        };

        if !line.mergeable && buffer.opened_once {
            line.body = std::mem::take(&mut line.body).parse_urls();
        }

        if notify != Notify::None && !is_current && !buffer.unread {
            let mut separator = Line::new(
                Utc::now(),
                "",
                StyledString::styled("---", Style::default().fg(Color::Red)),
            );
            separator.compute_split_points();
            buffer.lines.push(separator);
            buffer.unread = true;
        }

        let n = buffer.lines.len();
        if line.mergeable && n != 0 && buffer.lines[n - 1].mergeable {
            let mut last = buffer.lines.pop().expect("checked non-empty");
            let merged = {
                (self.do_merge_line)(&mut last, line);
                !last.is_zero()
            };
            let buffer = self.at_mut(net_id, title).expect("buffer exists");
            if merged {
                buffer.lines.push(last);
            }
            if notify == Notify::Highlight && !is_current {
                buffer.highlights += 1;
            }
            return;
        }

        line.compute_split_points();
        let rows = line.rows(width);
        buffer.lines.push(line);
        if is_current && buffer.scroll_amt > 0 {
            buffer.scroll_amt += rows;
        }

        if notify == Notify::Highlight && !is_current {
            buffer.highlights += 1;
        }
    }

    /// Splices fetched history around the existing lines, merging at the
    /// seams.
    pub fn add_lines(&mut self, net_id: &str, title: &str, before: Vec<Line>, after: Vec<Line>) {
        let Some(buffer) = self.at_mut(net_id, title) else {
            return;
        };
        let opened_once = buffer.opened_once;
        let existing = std::mem::take(&mut buffer.lines);

        let mut lines: Vec<Line> = Vec::with_capacity(before.len() + existing.len() + after.len());

        for (from_history, batch) in [(true, before), (false, existing), (true, after)] {
            for mut line in batch {
                if from_history {
                    if opened_once {
                        line.body = std::mem::take(&mut line.body).parse_urls();
                    }
                    line.compute_split_points();
                }

                if line.mergeable && lines.last().is_some_and(|last| last.mergeable) {
                    let mut last = lines.pop().expect("checked non-empty");
                    (self.do_merge_line)(&mut last, line);
                    if !last.is_zero() {
                        lines.push(last);
                    }
                } else {
                    lines.push(line);
                }
            }
        }

        let buffer = self.at_mut(net_id, title).expect("buffer exists");
        buffer.lines = lines;
    }

    pub fn set_topic(&mut self, net_id: &str, title: &str, topic: &str) {
        if let Some(buffer) = self.at_mut(net_id, title) {
            buffer.topic = topic.to_string();
        }
    }

    /// Applies a read marker learned from the server; counters clear
    /// when the marker covers the newest readable line.
    pub fn set_read(&mut self, net_id: &str, title: &str, timestamp: DateTime<Utc>) {
        let Some(buffer) = self.at_mut(net_id, title) else {
            return;
        };

        for line in buffer.lines.iter().rev() {
            if line.readable {
                if line.at <= timestamp {
                    buffer.highlights = 0;
                    buffer.unread = false;
                }
                break;
            }
        }

        if buffer.read.is_none_or(|read| read < timestamp) {
            buffer.read = Some(timestamp);
        }
    }

    /// Advances the focused buffer's read marker to the newest readable
    /// line at or above the bottom of the view. Returns the marker for
    /// upstream sync when it moved forward.
    pub fn update_read(&mut self) -> Option<(String, String, DateTime<Utc>)> {
        let width = self.tl_inner_width;
        let buffer = self.cur_mut()?;

        let scroll = buffer.scroll_amt;
        let mut y = 0;
        let mut newest: Option<DateTime<Utc>> = None;

        for line in buffer.lines.iter_mut().rev() {
            if y >= scroll && line.readable {
                newest = Some(line.at);
                break;
            }
            y += line.rows(width);
        }

        let at = newest?;
        if buffer.read.is_none_or(|read| at > read) {
            buffer.read = Some(at);
            return Some((buffer.net_id.clone(), buffer.title.clone(), at));
        }
        None
    }

    pub fn scroll_up(&mut self, n: usize) {
        let Some(buffer) = self.cur_mut() else {
            return;
        };
        if buffer.is_at_top {
            return;
        }
        buffer.scroll_amt += n;
    }

    pub fn scroll_down(&mut self, n: usize) {
        if let Some(buffer) = self.cur_mut() {
            buffer.scroll_amt = buffer.scroll_amt.saturating_sub(n);
        }
    }

    /// Scrolls back to the closest highlight above the view.
    pub fn scroll_up_highlight(&mut self) -> bool {
        let width = self.tl_inner_width;
        let height = self.tl_height;
        let Some(buffer) = self.cur_mut() else {
            return false;
        };

        let ymin = buffer.scroll_amt + height;
        let mut y = 0;
        for line in buffer.lines.iter_mut().rev() {
            if ymin <= y && line.highlight {
                buffer.scroll_amt = (y + 1).saturating_sub(height);
                return true;
            }
            y += line.rows(width);
        }
        false
    }

    /// Scrolls forward to the last highlight below the view.
    pub fn scroll_down_highlight(&mut self) -> bool {
        let width = self.tl_inner_width;
        let Some(buffer) = self.cur_mut() else {
            return false;
        };

        let mut y_last_highlight = 0;
        let mut y = 0;
        for line in buffer.lines.iter_mut().rev() {
            if y >= buffer.scroll_amt {
                break;
            }
            if line.highlight {
                y_last_highlight = y;
            }
            y += line.rows(width);
        }
        buffer.scroll_amt = y_last_highlight;
        buffer.scroll_amt != 0
    }

    pub fn is_at_top(&mut self) -> bool {
        self.recompute_at_top();
        self.cur().is_some_and(|buffer| buffer.is_at_top)
    }

    /// Recomputes whether the focused view shows the oldest line. At the
    /// top means the content above the viewport has run out.
    pub fn recompute_at_top(&mut self) {
        let width = self.tl_inner_width;
        let height = self.tl_height;
        let Some(buffer) = self.cur_mut() else {
            return;
        };

        let limit = buffer.scroll_amt + height;
        let mut total = 0;
        for line in buffer.lines.iter_mut().rev() {
            total += line.rows(width);
            if total > limit {
                buffer.is_at_top = false;
                return;
            }
        }
        buffer.is_at_top = true;
    }

    fn cur_key(&self) -> (String, String) {
        if let Some(overlay) = &self.overlay {
            return (overlay.net_id.clone(), overlay.title.clone());
        }
        match self.list.get(self.current) {
            Some(buffer) => (buffer.net_id.clone(), buffer.title.clone()),
            None => (String::new(), String::new()),
        }
    }

    fn index_of(&self, net_id: &str, title: &str) -> Option<usize> {
        let title_cf = title.to_lowercase();
        self.list
            .iter()
            .position(|buffer| buffer.net_id == net_id && buffer.title.to_lowercase() == title_cf)
    }

    fn at_mut(&mut self, net_id: &str, title: &str) -> Option<&mut Buffer> {
        if net_id.is_empty() && title == OVERLAY {
            return self.overlay.as_mut();
        }
        let idx = self.index_of(net_id, title)?;
        self.list.get_mut(idx)
    }

    pub fn at(&self, net_id: &str, title: &str) -> Option<&Buffer> {
        if net_id.is_empty() && title == OVERLAY {
            return self.overlay.as_ref();
        }
        let idx = self.index_of(net_id, title)?;
        self.list.get(idx)
    }

    /// The buffer timeline operations target: the overlay when open,
    /// otherwise the focused buffer.
    pub fn cur(&self) -> Option<&Buffer> {
        if let Some(overlay) = &self.overlay {
            return Some(overlay);
        }
        self.list.get(self.current)
    }

    pub fn cur_mut(&mut self) -> Option<&mut Buffer> {
        if let Some(overlay) = &mut self.overlay {
            return Some(overlay);
        }
        self.list.get_mut(self.current)
    }
}

#[cfg(test)]
mod test {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::event::Event;
    use crate::merge;

    fn buffer_list() -> BufferList {
        let mut list = BufferList::new(Box::new(merge::merge_line));
        list.resize_timeline(80, 26);
        list
    }

    fn line(at: DateTime<Utc>, body: &str) -> Line {
        Line::new(at, "", StyledString::plain(body)).readable()
    }

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, h, m, s).unwrap()
    }

    #[test]
    fn buffers_sort_by_network_then_title() {
        let mut list = buffer_list();
        list.add("net-b", "beta", "");
        list.add("net-a", "Alpha", "");
        list.add("net-a", "", "#zoo");
        list.add("net-a", "", "#Bar");

        let titles: Vec<_> = list
            .buffers()
            .map(|b| (b.net_name.clone(), b.title.clone()))
            .collect();
        assert_eq!(
            titles,
            vec![
                ("Alpha".to_string(), "".to_string()),
                ("Alpha".to_string(), "#Bar".to_string()),
                ("Alpha".to_string(), "#zoo".to_string()),
                ("beta".to_string(), "".to_string()),
            ]
        );

        // Duplicate (case-insensitive) is not added
        let (_, added) = list.add("net-a", "", "#bar");
        assert!(!added);
    }

    #[test]
    fn insertion_keeps_focus_stable() {
        let mut list = buffer_list();
        list.add("net", "irc", "");
        list.add("net", "irc", "#m");
        list.to(1);

        // Inserting ahead of the focused buffer shifts `current`
        list.add("net", "irc", "#a");
        assert_eq!(list.current_buffer(), ("net", "#m"));
    }

    #[test]
    fn highlight_counter_and_focus_reset() {
        let mut list = buffer_list();
        list.add("net", "irc", "");
        list.add("net", "irc", "#chan");

        list.add_line("net", "#chan", Notify::Highlight, line(at(12, 0, 0), "hi"));
        list.add_line("net", "#chan", Notify::Highlight, line(at(12, 0, 1), "hi again"));

        let buffer = list.at("net", "#chan").unwrap();
        assert_eq!(buffer.highlights, 2);
        assert!(buffer.unread);
        // Separator + two lines
        assert_eq!(buffer.lines.len(), 3);

        list.to(1);
        let buffer = list.at("net", "#chan").unwrap();
        assert_eq!(buffer.highlights, 0);
        assert!(!buffer.unread);
    }

    #[test]
    fn no_separator_or_counter_on_current() {
        let mut list = buffer_list();
        list.add("net", "irc", "#chan");

        list.add_line("net", "#chan", Notify::Highlight, line(at(12, 0, 0), "hi"));

        let buffer = list.at("net", "#chan").unwrap();
        assert_eq!(buffer.highlights, 0);
        assert!(!buffer.unread);
        assert_eq!(buffer.lines.len(), 1);
    }

    #[test]
    fn mergeable_round_trip_disappears() {
        let mut list = buffer_list();
        list.add("net", "irc", "#chan");

        let join = Event::UserJoin {
            channel: "#chan".into(),
            user: "alice".into(),
            time: at(12, 0, 0),
        };
        let part = Event::UserPart {
            channel: "#chan".into(),
            user: "alice".into(),
            time: at(12, 0, 5),
        };

        list.add_line("net", "#chan", Notify::None, join.render_line().unwrap());
        assert_eq!(list.at("net", "#chan").unwrap().lines.len(), 1);

        list.add_line("net", "#chan", Notify::None, part.render_line().unwrap());
        assert!(list.at("net", "#chan").unwrap().lines.is_empty());
    }

    #[test]
    fn update_read_is_monotonic() {
        let mut list = buffer_list();
        list.add("net", "irc", "#chan");

        list.add_line("net", "#chan", Notify::None, line(at(12, 0, 0), "one"));
        list.add_line("net", "#chan", Notify::None, line(at(12, 0, 5), "two"));

        let (_, _, first) = list.update_read().unwrap();
        assert_eq!(first, at(12, 0, 5));

        // Nothing newer: no marker update
        assert!(list.update_read().is_none());

        list.add_line("net", "#chan", Notify::None, line(at(12, 0, 9), "three"));
        let (_, _, second) = list.update_read().unwrap();
        assert!(second > first);
    }

    #[test]
    fn set_read_clears_counters_when_covering() {
        let mut list = buffer_list();
        list.add("net", "irc", "");
        list.add("net", "irc", "#chan");

        list.add_line("net", "#chan", Notify::Highlight, line(at(12, 0, 0), "hi"));
        assert_eq!(list.at("net", "#chan").unwrap().highlights, 1);

        // A marker older than the newest readable line clears nothing
        list.set_read("net", "#chan", at(11, 0, 0));
        assert_eq!(list.at("net", "#chan").unwrap().highlights, 1);

        list.set_read("net", "#chan", at(12, 0, 0));
        let buffer = list.at("net", "#chan").unwrap();
        assert_eq!(buffer.highlights, 0);
        assert!(!buffer.unread);
    }

    #[test]
    fn bounds_classification() {
        let mut bounds = Bounds::default();
        bounds.update(&line(at(12, 0, 0), "a"));
        bounds.update(&line(at(12, 5, 0), "e"));

        assert_eq!(bounds.compare(&line(at(11, 59, 0), "x")), -1);
        // Duplicate at the boundary counts as within
        assert_eq!(bounds.compare(&line(at(12, 5, 0), "e")), 0);
        // Equal time, different body: re-sorted as before
        assert_eq!(bounds.compare(&line(at(12, 5, 0), "q")), -1);
        assert_eq!(bounds.compare(&line(at(12, 6, 0), "f")), 1);

        bounds.update(&line(at(11, 59, 0), "x"));
        bounds.update(&line(at(12, 6, 0), "f"));
        assert_eq!(bounds.first_time(), Some(at(11, 59, 0)));
        assert_eq!(bounds.last_time(), Some(at(12, 6, 0)));
    }

    #[test]
    fn add_lines_merges_at_seams() {
        let mut list = buffer_list();
        list.add("net", "irc", "#chan");

        let join = Event::UserJoin {
            channel: "#chan".into(),
            user: "alice".into(),
            time: at(11, 59, 0),
        };
        list.add_line("net", "#chan", Notify::None, join.render_line().unwrap());

        let part = Event::UserPart {
            channel: "#chan".into(),
            user: "alice".into(),
            time: at(11, 58, 0),
        };
        // Prepended history holding the matching part merges through the
        // seam and the pair vanishes
        list.add_lines("net", "#chan", vec![part.render_line().unwrap()], vec![]);
        assert!(list.at("net", "#chan").unwrap().lines.is_empty());
    }

    #[test]
    fn overlay_shadows_current() {
        let mut list = buffer_list();
        list.add("net", "irc", "#chan");

        list.open_overlay();
        list.add_line("", OVERLAY, Notify::None, line(at(12, 0, 0), "result"));

        assert_eq!(list.cur().unwrap().title, OVERLAY);
        assert_eq!(list.cur().unwrap().lines.len(), 1);
        assert!(list.at("net", "#chan").unwrap().lines.is_empty());

        list.close_overlay();
        assert_eq!(list.cur().unwrap().title, "#chan");
    }

    #[test]
    fn scroll_keeps_viewport_on_new_lines() {
        let mut list = buffer_list();
        list.resize_timeline(10, 12);
        list.add("net", "irc", "#chan");

        for i in 0..30 {
            list.add_line(
                "net",
                "#chan",
                Notify::None,
                line(at(12, 0, i), "aaaa"),
            );
        }
        list.scroll_up(5);
        assert_eq!(list.cur().unwrap().scroll_amt, 5);

        // One more single-row line arrives; the view moves with it
        list.add_line("net", "#chan", Notify::None, line(at(12, 1, 0), "bbbb"));
        assert_eq!(list.cur().unwrap().scroll_amt, 6);

        list.scroll_down(100);
        assert_eq!(list.cur().unwrap().scroll_amt, 0);
    }

    #[test]
    fn unread_cycling_skips_read_buffers() {
        let mut list = buffer_list();
        list.add("net", "irc", "");
        list.add("net", "irc", "#a");
        list.add("net", "irc", "#b");
        list.to(0);

        list.add_line("net", "#b", Notify::Unread, line(at(12, 0, 0), "hey"));

        assert!(list.next_unread());
        assert_eq!(list.current_buffer(), ("net", "#b"));
        // Everything read now
        assert!(!list.next_unread());
    }
}
