use chrono::{DateTime, Utc};

use crate::line::Line;
use crate::styled::{self, Builder, Color, Style, StyledString};

/// Typing state carried by a `+typing` client tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypingState {
    Active,
    Paused,
    Done,
}

impl TypingState {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "done" => Some(Self::Done),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fail,
    Warn,
    Note,
}

/// A PRIVMSG or NOTICE translated into domain terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageEvent {
    pub user: String,
    pub target: String,
    pub target_is_channel: bool,
    /// `PRIVMSG` or `NOTICE`.
    pub command: String,
    pub content: String,
    pub time: DateTime<Utc>,
}

/// Domain events produced by a session from wire messages.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Registered,
    SelfNick {
        former: String,
        new: String,
        time: DateTime<Utc>,
    },
    UserNick {
        former: String,
        user: String,
        time: DateTime<Utc>,
    },
    SelfJoin {
        channel: String,
        /// The user asked for this join during this run (focus follows).
        requested: bool,
        topic: String,
    },
    UserJoin {
        channel: String,
        user: String,
        time: DateTime<Utc>,
    },
    SelfPart {
        channel: String,
    },
    UserPart {
        channel: String,
        user: String,
        time: DateTime<Utc>,
    },
    UserQuit {
        channels: Vec<String>,
        user: String,
        time: DateTime<Utc>,
    },
    TopicChange {
        channel: String,
        topic: String,
        setter: String,
        time: DateTime<Utc>,
    },
    ModeChange {
        channel: String,
        mode: String,
        time: DateTime<Utc>,
    },
    Invite {
        inviter: String,
        invitee: String,
        channel: String,
    },
    Message(MessageEvent),
    HistoryTargets {
        /// target → most recent message time
        targets: Vec<(String, DateTime<Utc>)>,
    },
    History {
        target: String,
        messages: Vec<Event>,
    },
    Search {
        messages: Vec<Event>,
    },
    Read {
        target: String,
        timestamp: DateTime<Utc>,
    },
    BouncerNetwork {
        id: String,
        name: String,
    },
    Error {
        severity: Severity,
        code: String,
        message: String,
    },
    Typing {
        target: String,
        user: String,
        state: TypingState,
        time: DateTime<Utc>,
    },
    Raw {
        line: String,
        outgoing: bool,
    },
}

impl Event {
    /// The nick a membership event is about, casefolded by the caller
    /// when comparing.
    pub fn subject(&self) -> Option<&str> {
        match self {
            Event::UserNick { user, .. }
            | Event::UserJoin { user, .. }
            | Event::UserPart { user, .. }
            | Event::UserQuit { user, .. } => Some(user),
            Event::ModeChange { mode, .. } => mode.split(' ').nth(1),
            _ => None,
        }
    }

    /// Renders a membership-style event into its timeline line.
    ///
    /// Messages and the session-level events have no uniform rendering
    /// and are formatted by the caller; they return `None` here.
    pub fn render_line(&self) -> Option<Line> {
        let gray = Style::default().fg(Color::Grey);

        match self {
            Event::UserNick {
                former, user, time, ..
            } => {
                let mut body = Builder::new();
                body.set_style(gray);
                body.write_str(former);
                body.set_style(Style::default());
                body.write_str("\u{2192}");
                body.set_style(gray);
                body.write_str(user);

                Some(
                    Line::new(*time, "--", body.build())
                        .head_color(Color::Grey)
                        .readable()
                        .mergeable(vec![self.clone()]),
                )
            }
            Event::UserJoin { user, time, .. } => {
                let mut body = Builder::new();
                body.set_style(Style::default().fg(Color::Green));
                body.write_str("+");
                body.set_style(gray);
                body.write_str(user);

                Some(
                    Line::new(*time, "--", body.build())
                        .head_color(Color::Grey)
                        .readable()
                        .mergeable(vec![self.clone()]),
                )
            }
            Event::UserPart { user, time, .. } | Event::UserQuit { user, time, .. } => {
                let mut body = Builder::new();
                body.set_style(Style::default().fg(Color::Red));
                body.write_str("-");
                body.set_style(gray);
                body.write_str(user);

                Some(
                    Line::new(*time, "--", body.build())
                        .head_color(Color::Grey)
                        .readable()
                        .mergeable(vec![self.clone()]),
                )
            }
            Event::TopicChange { topic, time, .. } => {
                let topic = styled::strip_irc(topic);
                let body = StyledString::styled(format!("Topic changed to: {topic}"), gray);

                Some(
                    Line::new(*time, "--", body)
                        .head_color(Color::Grey)
                        .readable(),
                )
            }
            Event::ModeChange { mode, time, .. } => {
                let body = StyledString::styled(format!("[{mode}]"), gray);
                // Only a bare `<mode> <nick>` pair merges with the
                // join/part flow of that nick
                let simple = mode.split(' ').count() == 2;

                let line = Line::new(*time, "--", body)
                    .head_color(Color::Grey)
                    .readable();

                Some(if simple {
                    line.mergeable(vec![self.clone()])
                } else {
                    line
                })
            }
            _ => None,
        }
    }
}
