use chrono::Utc;

use data::buffer::Notify;
use data::event::MessageEvent;
use data::line::Line;
use data::session::Session;
use data::styled::{self, Builder, Color, Style, StyledString};

/// A `--` informational status line.
pub fn status_line(body: impl Into<String>) -> Line {
    Line::new(
        Utc::now(),
        "--",
        StyledString::plain(body.into()),
    )
    .head_color(Color::Grey)
}

/// A `!!` error status line.
pub fn error_line(body: impl Into<String>) -> Line {
    Line::new(Utc::now(), "!!", StyledString::plain(body.into())).head_color(Color::Red)
}

/// Whether `content` should highlight: it mentions our nick, or any of
/// the configured patterns when there are some.
pub fn is_highlight(session: &Session, patterns: &[String], content: &str) -> bool {
    let content_cf = session.casemap(content);
    if patterns.is_empty() {
        return content_cf.contains(session.nick_cf());
    }
    patterns
        .iter()
        .any(|pattern| content_cf.contains(&session.casemap(pattern)))
}

/// Decides where a message lands, how it renders, and what kind of
/// notification it triggers.
pub fn message_line(
    session: &Session,
    patterns: &[String],
    current: (&str, &str),
    ev: &MessageEvent,
) -> (String, Line, Notify) {
    let is_from_self = session.is_me(&ev.user);
    let is_to_self = session.is_me(&ev.target);
    let mut is_highlight = is_highlight(session, patterns, &ev.content);
    let is_action = ev.content.starts_with("\u{1}ACTION");
    let is_query = !ev.target_is_channel && ev.command == "PRIVMSG";
    let is_notice = ev.command == "NOTICE";

    let buffer;
    if !ev.target_is_channel && is_notice {
        // Server or service notices land wherever the user is looking,
        // as long as it is on this network
        let (cur_net, cur_title) = current;
        if cur_net == session.net_id() {
            buffer = cur_title.to_string();
        } else {
            buffer = String::new();
            is_highlight = true;
        }
    } else if is_to_self {
        buffer = ev.user.clone();
    } else {
        buffer = ev.target.clone();
    }

    let highlight_line = ev.target_is_channel && is_highlight && !is_from_self;
    let notify = if is_from_self {
        Notify::None
    } else if is_highlight || is_query {
        Notify::Highlight
    } else {
        Notify::Unread
    };

    let mut content = ev.content.trim_end_matches('\u{1}');
    content = content.trim_end();
    if is_action {
        content = &content["\u{1}ACTION".len()..];
    }

    let head = format!("<{}>", ev.user);
    let head_color = styled::ident_color(&head);

    let mut body = Builder::new();
    if is_notice || is_action {
        body.set_style(Style::default().fg(styled::ident_color(&ev.user)));
        body.write_str(&ev.user);
        body.set_style(Style::default());
        if is_notice {
            body.write_str(": ");
        }
        body.write_styled(&styled::parse_irc(content));
    } else {
        body.set_style(Style::default().fg(head_color));
        body.write_str(&head);
        body.set_style(Style::default());
        body.write_str(" ");
        body.write_styled(&styled::parse_irc(content));
    }

    let line = Line::new(ev.time, "", body.build())
        .head_color(head_color)
        .highlight(highlight_line)
        .readable();

    (buffer, line, notify)
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use tokio::sync::mpsc;

    use data::session::Params;

    use super::*;

    fn session() -> Session {
        let (tx, _rx) = mpsc::channel(64);
        let mut session = Session::new(
            Params {
                nickname: "bob".into(),
                username: "bob".into(),
                realname: "bob".into(),
                auth: None,
                net_id: String::new(),
            },
            tx,
        );
        let welcome = irc::proto::parse::message(":server 001 bob :hi\r\n").unwrap();
        session.handle(welcome).unwrap();
        session
    }

    fn message(user: &str, target: &str, content: &str) -> MessageEvent {
        MessageEvent {
            user: user.into(),
            target: target.into(),
            target_is_channel: target.starts_with('#'),
            command: "PRIVMSG".into(),
            content: content.into(),
            time: Utc::now(),
        }
    }

    #[test]
    fn mention_highlights_channel_messages() {
        let session = session();

        let (buffer, line, notify) = message_line(
            &session,
            &[],
            ("", ""),
            &message("alice", "#chan", "hey bob, around?"),
        );
        assert_eq!(buffer, "#chan");
        assert!(line.highlight);
        assert_eq!(notify, Notify::Highlight);

        let (_, line, notify) = message_line(
            &session,
            &[],
            ("", ""),
            &message("alice", "#chan", "unrelated chatter"),
        );
        assert!(!line.highlight);
        assert_eq!(notify, Notify::Unread);
    }

    #[test]
    fn queries_always_notify() {
        let session = session();

        let (buffer, _, notify) =
            message_line(&session, &[], ("", ""), &message("alice", "bob", "psst"));
        assert_eq!(buffer, "alice");
        assert_eq!(notify, Notify::Highlight);
    }

    #[test]
    fn own_messages_stay_quiet() {
        let session = session();

        let (_, _, notify) = message_line(
            &session,
            &[],
            ("", ""),
            &message("bob", "#chan", "bob talking about bob"),
        );
        assert_eq!(notify, Notify::None);
    }

    #[test]
    fn action_strips_ctcp_wrapper() {
        let session = session();

        let (_, line, _) = message_line(
            &session,
            &[],
            ("", ""),
            &message("alice", "#chan", "\u{1}ACTION waves\u{1}"),
        );
        assert_eq!(line.body.as_str(), "alice waves");
    }

    #[test]
    fn configured_patterns_override_nick() {
        let session = session();
        let patterns = vec!["opame".to_string()];

        let (_, _, notify) = message_line(
            &session,
            &patterns,
            ("", ""),
            &message("alice", "#chan", "talking to bob"),
        );
        assert_eq!(notify, Notify::Unread);

        let (_, _, notify) = message_line(
            &session,
            &patterns,
            ("", ""),
            &message("alice", "#chan", "OPAME is mentioned"),
        );
        assert_eq!(notify, Notify::Highlight);
    }
}
