use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::time::{self, Duration, Instant};

use data::buffer::{Bounds, Notify, OVERLAY};
use data::cache::LastBuffer;
use data::config::Config;
use data::event::{Event, MessageEvent, Severity, TypingState};
use data::line::Line;
use data::session::{Member, Session};
use data::styled::{self, Builder, Color, Style, StyledString};

use crate::event::{AppEvent, Payload, UI_SOURCE};
use crate::format;
use crate::stream;
use crate::ui::{self, Ui, UiEvent};

/// Bursts of events are coalesced for this long before one redraw.
const COALESCE: Duration = Duration::from_millis(200);
/// Orchestrator event queue.
const EVENT_QUEUE: usize = 1024;
/// A typing notification expires when not refreshed within this.
const TYPING_EXPIRY: ChronoDuration = ChronoDuration::seconds(6);

fn is_command(input: &str) -> bool {
    input.starts_with('/') && !input.starts_with("//")
}

/// State carried between runs via the external cache files.
#[derive(Debug, Default)]
pub struct Restore {
    pub last_buffer: Option<LastBuffer>,
    pub last_close: Option<DateTime<Utc>>,
    pub unread: HashMap<(String, String), DateTime<Utc>>,
}

/// What the next run should persist.
#[derive(Debug)]
pub struct Persist {
    pub last_buffer: LastBuffer,
    pub unread: HashMap<(String, String), DateTime<Utc>>,
}

/// The single-threaded owner of all UI and session state. Network and
/// terminal tasks only talk to it through the event queue.
pub struct App {
    config: Arc<Config>,
    win: Ui,

    events_tx: mpsc::Sender<AppEvent>,
    events_rx: mpsc::Receiver<AppEvent>,
    shutdown: Arc<AtomicBool>,
    quitting: bool,

    sessions: HashMap<String, Session>,
    bounds: HashMap<(String, String), Bounds>,
    pending_history: HashSet<(String, String)>,
    /// Targets we monitor per network, re-registered on reconnect.
    monitor: HashMap<String, HashSet<String>>,
    /// (netID, target) → user → (state, last refresh).
    typings: HashMap<(String, String), HashMap<String, (TypingState, DateTime<Utc>)>>,

    highlights: Vec<String>,
    last_query: Option<(String, String)>,
    last_net_id: String,
    last_buffer: String,
    buffer_before_cycling_unread: Option<usize>,

    last_close: DateTime<Utc>,
    unread_cache: HashMap<(String, String), DateTime<Utc>>,
}

impl App {
    pub fn new(config: Config, restore: Restore) -> io::Result<Self> {
        let (events_tx, events_rx) = mpsc::channel(EVENT_QUEUE);
        let mut win = Ui::new()?;

        // Home buffer of the control connection
        win.bufs.add("", &config.address, "");

        let highlights = config
            .highlights
            .iter()
            .map(|pattern| pattern.to_lowercase())
            .collect();

        let (last_net_id, last_buffer) = restore
            .last_buffer
            .map(|last| (last.net_id, last.title))
            .unwrap_or_default();

        Ok(Self {
            config: Arc::new(config),
            win,
            events_tx,
            events_rx,
            shutdown: Arc::new(AtomicBool::new(false)),
            quitting: false,
            sessions: HashMap::new(),
            bounds: HashMap::new(),
            pending_history: HashSet::new(),
            monitor: HashMap::new(),
            typings: HashMap::new(),
            highlights,
            last_query: None,
            last_net_id,
            last_buffer,
            buffer_before_cycling_unread: None,
            last_close: restore.last_close.unwrap_or_else(Utc::now),
            unread_cache: restore.unread,
        })
    }

    /// Runs until the user quits or the terminal goes away, then drains
    /// the queue and reports what to persist.
    pub async fn run(mut self) -> Persist {
        ui::spawn_reader(self.events_tx.clone());
        stream::spawn(
            String::new(),
            self.config.clone(),
            self.events_tx.clone(),
            self.shutdown.clone(),
        );

        self.after_burst();

        'outer: while let Some(event) = self.events_rx.recv().await {
            if !self.handle_event(event) {
                break;
            }

            // Drain the burst: whatever is already queued, plus whatever
            // arrives within the coalescing window. One redraw follows.
            let deadline = Instant::now() + COALESCE;
            loop {
                match self.events_rx.try_recv() {
                    Ok(event) => {
                        if !self.handle_event(event) {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => {
                        let waited = tokio::select! {
                            _ = time::sleep_until(deadline) => None,
                            maybe = self.events_rx.recv() => Some(maybe),
                        };
                        match waited {
                            None => break,
                            Some(Some(event)) => {
                                if !self.handle_event(event) {
                                    break 'outer;
                                }
                            }
                            Some(None) => break 'outer,
                        }
                    }
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }

            self.after_burst();
        }

        self.shutdown.store(true, Ordering::Relaxed);
        for session in self.sessions.values_mut() {
            session.close();
        }

        // Let stragglers land before tearing the queue down
        while self.events_rx.try_recv().is_ok() {}

        let (net_id, title) = self.win.bufs.current_buffer();
        let last_buffer = LastBuffer {
            net_id: net_id.to_string(),
            title: title.to_string(),
        };

        let mut unread = self.unread_cache;
        for buffer in self.win.bufs.buffers() {
            if let Some(read) = buffer.read {
                unread.insert((buffer.net_id.clone(), buffer.title.clone()), read);
            }
        }

        Persist {
            last_buffer,
            unread,
        }
    }

    fn after_burst(&mut self) {
        if let Some((net_id, title, timestamp)) = self.win.bufs.update_read() {
            if let Some(session) = self.sessions.get_mut(&net_id) {
                session.read_set(&title, timestamp);
            }
            self.unread_cache.insert((net_id, title), timestamp);
        }

        self.update_prompt();
        self.update_status();

        let members = self.current_members();
        if let Err(e) = self.win.draw(&members) {
            log::error!("draw failed: {e}");
        }
    }

    fn current_members(&self) -> Vec<Member> {
        let (net_id, title) = self.win.bufs.current_buffer();
        match self.sessions.get(net_id) {
            Some(session) if !title.is_empty() && session.is_channel(title) => {
                session.names(title)
            }
            _ => vec![],
        }
    }

    fn update_prompt(&mut self) {
        let (net_id, buffer) = self.win.bufs.current_buffer();
        let net_id = net_id.to_string();
        let buffer = buffer.to_string();
        let command = is_command(&self.win.editor.content());

        let prompt = if buffer.is_empty() || command {
            StyledString::styled(">", Style::default().fg(Color::Grey))
        } else {
            match self.sessions.get(&net_id) {
                None => StyledString::styled("<offline>", Style::default().fg(Color::Red)),
                Some(session) => StyledString::styled(
                    session.nick(),
                    Style::default().fg(styled::ident_color(session.nick())),
                ),
            }
        };
        self.win.set_prompt(prompt);
    }

    fn update_status(&mut self) {
        let (net_id, title) = self.win.bufs.current_buffer();
        let key = (net_id.to_string(), title.to_string());
        let now = Utc::now();

        let mut typing: Vec<String> = vec![];
        if let Some(users) = self.typings.get_mut(&key) {
            users.retain(|_, (_, at)| now.signed_duration_since(*at) < TYPING_EXPIRY);
            typing = users
                .iter()
                .filter(|(_, (state, _))| *state == TypingState::Active)
                .map(|(user, _)| user.clone())
                .collect();
            typing.sort();
        }

        let status = match typing.len() {
            0 => String::new(),
            1 => format!("{} is typing...", typing[0]),
            _ => format!("{} are typing...", typing.join(", ")),
        };
        self.win.set_status(status);
    }

    fn handle_event(&mut self, event: AppEvent) -> bool {
        if event.source == UI_SOURCE {
            match event.payload {
                Payload::Ui(ui_event) => return self.handle_ui_event(ui_event),
                _ => log::error!("non-UI payload from UI source"),
            }
            return true;
        }

        let net_id = event.source;
        match event.payload {
            Payload::Session(session) => {
                self.monitor.entry(net_id.clone()).or_default();
                self.sessions.insert(net_id, *session);
            }
            Payload::Closed => {
                self.sessions.remove(&net_id);
            }
            Payload::Status(line) => self.add_status_line(&net_id, line),
            Payload::Raw { line, outgoing } => {
                let head = if outgoing { "OUT --" } else { "IN --" };
                self.add_status_line(
                    &net_id,
                    Line::new(Utc::now(), head, StyledString::plain(line)),
                );
            }
            Payload::Message(message) => self.handle_message(&net_id, message),
            Payload::Ui(_) => log::error!("UI payload from network source"),
        }
        true
    }

    /// Status lines land in the network's home buffer, and in the
    /// focused buffer too when it belongs to the same network.
    fn add_status_line(&mut self, net_id: &str, line: Line) {
        let (cur_net, cur_title) = self.win.bufs.current_buffer();
        let (cur_net, cur_title) = (cur_net.to_string(), cur_title.to_string());

        if cur_net == net_id && !cur_title.is_empty() {
            self.win
                .bufs
                .add_line(net_id, &cur_title, Notify::None, line.clone());
        }
        self.win.bufs.add_line(net_id, "", Notify::Unread, line);
    }

    fn handle_message(&mut self, net_id: &str, message: irc::proto::Message) {
        let Some(session) = self.sessions.get_mut(net_id) else {
            log::error!("message for unknown session {net_id:?}");
            return;
        };

        match session.handle(message) {
            Ok(events) => {
                for event in events {
                    self.handle_session_event(net_id, event);
                }
            }
            Err(e) => {
                self.add_status_line(
                    net_id,
                    format::error_line(format!("Received corrupt message: {e}")),
                );
            }
        }
    }

    fn handle_session_event(&mut self, net_id: &str, event: Event) {
        match event {
            Event::Registered => {
                let channels = self.config.channels.clone();
                let monitored: Vec<String> = self
                    .monitor
                    .get(net_id)
                    .map(|targets| targets.iter().cloned().collect())
                    .unwrap_or_default();
                let last_close = self.last_close;

                let Some(session) = self.sessions.get_mut(net_id) else {
                    return;
                };
                for channel in &channels {
                    session.join(channel, None);
                }
                session
                    .new_history_request("")
                    .with_limit(1000)
                    .targets(last_close, Utc::now());
                for target in monitored {
                    session.monitor_add(&target);
                }

                let body = if session.nick() != self.config.nickname {
                    format!("Connected to the server as {}", session.nick())
                } else {
                    "Connected to the server".to_string()
                };
                self.win
                    .bufs
                    .add_line(net_id, "", Notify::None, format::status_line(body));
            }
            Event::SelfNick { former, new, time } => {
                let mut body = Builder::new();
                body.set_style(Style::default().fg(Color::Grey));
                body.write_str(&former);
                body.set_style(Style::default());
                body.write_str("\u{2192}");
                body.set_style(Style::default().fg(Color::Grey));
                body.write_str(&new);

                let line = Line::new(time, "--", body.build())
                    .head_color(Color::Grey)
                    .highlight(true)
                    .readable();
                self.add_status_line(net_id, line);
            }
            Event::UserNick { ref user, .. } => {
                let channels = self
                    .sessions
                    .get(net_id)
                    .map(|session| session.channels_shared_with(user))
                    .unwrap_or_default();
                if let Some(line) = event.render_line() {
                    for channel in channels {
                        self.win
                            .bufs
                            .add_line(net_id, &channel, Notify::None, line.clone());
                    }
                }
            }
            Event::SelfJoin {
                channel,
                requested,
                topic,
            } => {
                let (i, added) = self.win.bufs.add(net_id, "", &channel);

                let key = (net_id.to_string(), channel.clone());
                let known_last = self
                    .bounds
                    .get(&key)
                    .filter(|bounds| !added && !bounds.is_zero())
                    .and_then(Bounds::last_time);

                if let Some(session) = self.sessions.get_mut(net_id) {
                    match known_last {
                        Some(last) => session
                            .new_history_request(&channel)
                            .with_limit(1000)
                            .after(last),
                        None => session
                            .new_history_request(&channel)
                            .with_limit(500)
                            .before(Utc::now()),
                    }
                }

                if requested {
                    self.win.bufs.to(i);
                }
                if !topic.is_empty() {
                    self.win
                        .bufs
                        .set_topic(net_id, &channel, &styled::strip_irc(&topic));
                }

                if added {
                    if let Some(read) = self.unread_cache.get(&key).copied() {
                        self.win.bufs.set_read(net_id, &channel, read);
                    }
                }

                // Focus the buffer the previous run was looking at
                if net_id == self.last_net_id && channel == self.last_buffer {
                    let (last_net_id, last_buffer) =
                        (std::mem::take(&mut self.last_net_id), std::mem::take(&mut self.last_buffer));
                    self.win.bufs.jump_buffer_network(&last_net_id, &last_buffer);
                }
            }
            Event::UserJoin { ref channel, .. } | Event::UserPart { ref channel, .. } => {
                let channel = channel.clone();
                if let Some(line) = event.render_line() {
                    self.win.bufs.add_line(net_id, &channel, Notify::None, line);
                }
            }
            Event::SelfPart { channel } => {
                self.win.bufs.remove(net_id, &channel);
                self.bounds.remove(&(net_id.to_string(), channel));
            }
            Event::UserQuit { ref channels, .. } => {
                let channels = channels.clone();
                if let Some(line) = event.render_line() {
                    for channel in channels {
                        self.win
                            .bufs
                            .add_line(net_id, &channel, Notify::None, line.clone());
                    }
                }
            }
            Event::TopicChange {
                ref channel,
                ref topic,
                ..
            } => {
                let channel = channel.clone();
                let topic = styled::strip_irc(topic);
                if let Some(line) = event.render_line() {
                    self.win
                        .bufs
                        .add_line(net_id, &channel, Notify::Unread, line);
                }
                self.win.bufs.set_topic(net_id, &channel, &topic);
            }
            Event::ModeChange { ref channel, .. } => {
                let channel = channel.clone();
                if let Some(line) = event.render_line() {
                    self.win.bufs.add_line(net_id, &channel, Notify::None, line);
                }
            }
            Event::Invite {
                inviter,
                invitee,
                channel,
            } => {
                let (is_me_invitee, is_me_inviter) = self
                    .sessions
                    .get(net_id)
                    .map(|s| (s.is_me(&invitee), s.is_me(&inviter)))
                    .unwrap_or_default();

                let (buffer, notify, body) = if is_me_invitee {
                    (
                        String::new(),
                        Notify::Highlight,
                        format!("{inviter} invited you to join {channel}"),
                    )
                } else if is_me_inviter {
                    (
                        channel.clone(),
                        Notify::None,
                        format!("You invited {invitee} to join this channel"),
                    )
                } else {
                    (
                        channel.clone(),
                        Notify::Unread,
                        format!("{inviter} invited {invitee} to join this channel"),
                    )
                };

                let line = Line::new(
                    Utc::now(),
                    "--",
                    StyledString::styled(body, Style::default().fg(Color::Grey)),
                )
                .head_color(Color::Grey)
                .highlight(notify == Notify::Highlight)
                .readable();
                self.win.bufs.add_line(net_id, &buffer, notify, line);
            }
            Event::Message(ev) => self.handle_message_event(net_id, ev),
            Event::HistoryTargets { targets } => {
                // Backfill the buffer we want to restore first
                let mut targets = targets;
                if net_id == self.last_net_id {
                    if let Some(i) = targets.iter().position(|(name, _)| *name == self.last_buffer)
                    {
                        let restored = targets.remove(i);
                        targets.insert(0, restored);
                    }
                }

                for (name, last) in targets {
                    let is_channel = self
                        .sessions
                        .get(net_id)
                        .is_some_and(|session| session.is_channel(&name));
                    if is_channel {
                        continue;
                    }

                    self.monitor
                        .entry(net_id.to_string())
                        .or_default()
                        .insert(name.clone());
                    self.win.bufs.add(net_id, "", &name);
                    if let Some(read) = self
                        .unread_cache
                        .get(&(net_id.to_string(), name.clone()))
                        .copied()
                    {
                        self.win.bufs.set_read(net_id, &name, read);
                    }

                    if let Some(session) = self.sessions.get_mut(net_id) {
                        session.monitor_add(&name);
                        session.read_get(&name);
                        // BEFORE excludes its bound; nudge past the last
                        // known message so it is included
                        session
                            .new_history_request(&name)
                            .with_limit(500)
                            .before(last + ChronoDuration::milliseconds(1));
                    }
                }
            }
            Event::History { target, messages } => {
                self.pending_history
                    .remove(&(net_id.to_string(), target.clone()));
                self.handle_history_event(net_id, target, messages);
            }
            Event::Search { messages } => {
                self.win.bufs.open_overlay();

                let current = {
                    let (net, title) = self.win.bufs.current_buffer();
                    (net.to_string(), title.to_string())
                };
                let mut lines = vec![];
                for message in messages {
                    if let Event::Message(ev) = message {
                        if let Some(session) = self.sessions.get(net_id) {
                            let (_, line, _) = format::message_line(
                                session,
                                &self.highlights,
                                (&current.0, &current.1),
                                &ev,
                            );
                            if !line.is_zero() {
                                lines.push(line);
                            }
                        }
                    }
                }
                self.win.bufs.add_lines("", OVERLAY, lines, vec![]);
            }
            Event::Read { target, timestamp } => {
                self.win.bufs.set_read(net_id, &target, timestamp);
            }
            Event::BouncerNetwork { id, name } => {
                let (_, added) = self.win.bufs.add(&id, &name, "");
                if added {
                    stream::spawn(
                        id,
                        self.config.clone(),
                        self.events_tx.clone(),
                        self.shutdown.clone(),
                    );
                }
            }
            Event::Error {
                severity,
                code,
                message,
            } => {
                // Noisy connection numerics nobody reads
                if matches!(code.as_str(), "002" | "003" | "004" | "422") {
                    return;
                }

                let line = match severity {
                    Severity::Fail => {
                        format::error_line(format!("Error (code {code}): {message}"))
                    }
                    Severity::Warn => {
                        format::status_line(format!("Warning (code {code}): {message}"))
                    }
                    Severity::Note => Line::new(
                        Utc::now(),
                        &format!("{code} --"),
                        StyledString::plain(message),
                    )
                    .head_color(Color::Grey),
                };
                self.add_status_line(net_id, line);
            }
            Event::Typing {
                target,
                user,
                state,
                time,
            } => {
                // A query notice targets us; it belongs to the sender's
                // buffer
                let target = match self.sessions.get(net_id) {
                    Some(session) if session.is_me(&target) => user.clone(),
                    _ => target,
                };
                let users = self
                    .typings
                    .entry((net_id.to_string(), target))
                    .or_default();
                match state {
                    TypingState::Done => {
                        users.remove(&user);
                    }
                    state => {
                        users.insert(user, (state, time));
                    }
                }
            }
            Event::Raw { .. } => {}
        }
    }

    fn handle_message_event(&mut self, net_id: &str, ev: MessageEvent) {
        let current = {
            let (net, title) = self.win.bufs.current_buffer();
            (net.to_string(), title.to_string())
        };

        let Some(session) = self.sessions.get(net_id) else {
            return;
        };
        let (buffer, line, notify) = format::message_line(
            session,
            &self.highlights,
            (&current.0, &current.1),
            &ev,
        );
        let buffer_is_channel = session.is_channel(&buffer);
        let is_from_self = session.is_me(&ev.user);

        if line.is_zero() {
            return;
        }

        // A fresh query buffer gets monitored and backfilled
        if !buffer.is_empty() && !buffer_is_channel {
            let (_, added) = self.win.bufs.add(net_id, "", &buffer);
            if added {
                self.monitor
                    .entry(net_id.to_string())
                    .or_default()
                    .insert(buffer.clone());
                if let Some(read) = self
                    .unread_cache
                    .get(&(net_id.to_string(), buffer.clone()))
                    .copied()
                {
                    self.win.bufs.set_read(net_id, &buffer, read);
                }
                if let Some(session) = self.sessions.get_mut(net_id) {
                    session.monitor_add(&buffer);
                    session.read_get(&buffer);
                    session
                        .new_history_request(&buffer)
                        .with_limit(500)
                        .before(ev.time);
                }
            }
        }

        let body = line.body.as_str().to_string();
        self.win
            .bufs
            .add_line(net_id, &buffer, notify, line.clone());

        if notify == Notify::Highlight {
            self.notify_highlight(&buffer, &ev.user, &body);
        }

        if !ev.target_is_channel && !is_from_self {
            self.last_query = Some((net_id.to_string(), ev.user.clone()));
        }

        self.bounds
            .entry((net_id.to_string(), buffer))
            .or_default()
            .update(&line);
    }

    fn handle_history_event(&mut self, net_id: &str, target: String, messages: Vec<Event>) {
        let key = (net_id.to_string(), target.clone());
        let mut bounds = self.bounds.get(&key).cloned();

        let current = {
            let (net, title) = self.win.bufs.current_buffer();
            (net.to_string(), title.to_string())
        };

        let mut before: Vec<Line> = vec![];
        let mut after: Vec<Line> = vec![];

        for message in messages {
            let line = match message {
                Event::Message(ev) => self.sessions.get(net_id).map(|session| {
                    format::message_line(
                        session,
                        &self.highlights,
                        (&current.0, &current.1),
                        &ev,
                    )
                    .1
                }),
                other => other.render_line(),
            };
            let Some(line) = line else { continue };
            if line.is_zero() {
                continue;
            }

            match &bounds {
                Some(bounds) if !bounds.is_zero() => match bounds.compare(&line) {
                    -1 => before.push(line),
                    1 => after.push(line),
                    // Duplicates of what we already hold
                    _ => {}
                },
                _ => before.push(line),
            }
        }

        let mut bounds = bounds.take().unwrap_or_default();
        if let (Some(first), Some(last)) = (before.first(), before.last()) {
            bounds.update(first);
            bounds.update(last);
        }
        if let (Some(first), Some(last)) = (after.first(), after.last()) {
            bounds.update(first);
            bounds.update(last);
        }

        self.win.bufs.add_lines(net_id, &target, before, after);

        if !bounds.is_zero() {
            self.bounds.insert(key, bounds);
        }
    }

    /// Runs the configured highlight command with the message context in
    /// its environment. Failures surface as status lines, nothing more.
    fn notify_highlight(&mut self, buffer: &str, sender: &str, content: &str) {
        let Some(path) = self.config.on_highlight_path.clone() else {
            return;
        };

        let (cur_net, cur_buffer) = self.win.bufs.current_buffer();
        let here = if cur_buffer == buffer && !cur_net.is_empty() {
            "1"
        } else {
            "0"
        };

        let mut command = tokio::process::Command::new(&path);
        command
            .env("BUFFER", buffer)
            .env("HERE", here)
            .env("SENDER", sender)
            .env("MESSAGE", content);

        let events = self.events_tx.clone();
        tokio::spawn(async move {
            match command.output().await {
                Ok(output) if output.status.success() => {}
                Ok(output) => {
                    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
                    let _ = events
                        .send(AppEvent::from_net(
                            "",
                            Payload::Status(format::error_line(format!(
                                "highlight command failed: {stderr}"
                            ))),
                        ))
                        .await;
                }
                Err(e) => {
                    let _ = events
                        .send(AppEvent::from_net(
                            "",
                            Payload::Status(format::error_line(format!(
                                "could not run highlight command: {e}"
                            ))),
                        ))
                        .await;
                }
            }
        });
    }

    /// Fetches older history when the view hits the top of a buffer.
    fn request_history(&mut self) {
        if self.win.bufs.has_overlay() {
            return;
        }

        let (net_id, buffer) = self.win.bufs.current_buffer();
        let (net_id, buffer) = (net_id.to_string(), buffer.to_string());
        if buffer.is_empty() || !self.win.bufs.is_at_top() {
            return;
        }

        let key = (net_id.clone(), buffer.clone());
        if self.pending_history.contains(&key) {
            return;
        }

        let before = self
            .bounds
            .get(&key)
            .and_then(Bounds::first_time)
            .unwrap_or_else(Utc::now);

        if let Some(session) = self.sessions.get_mut(&net_id) {
            self.pending_history.insert(key);
            session
                .new_history_request(&buffer)
                .with_limit(200)
                .before(before);
        }
    }

    /// Lets the peer know we are (or stopped) typing.
    fn typing_notice(&mut self) {
        if !self.config.typings {
            return;
        }

        let (net_id, buffer) = self.win.bufs.current_buffer();
        let (net_id, buffer) = (net_id.to_string(), buffer.to_string());
        if buffer.is_empty() {
            return;
        }

        let input = self.win.editor.content();
        let Some(session) = self.sessions.get_mut(&net_id) else {
            return;
        };

        if input.is_empty() {
            session.typing_stop(&buffer);
        } else if !is_command(&input) {
            session.typing(&buffer);
        }
    }

    fn handle_ui_event(&mut self, event: UiEvent) -> bool {
        match event {
            UiEvent::Key(key) => self.handle_key(key),
            UiEvent::Resize(w, h) => {
                self.win.resize(w, h);
                true
            }
            UiEvent::Paste(text) => {
                // No typing notices and no per-char redraw for pastes
                self.win.editor.insert_str(&text);
                true
            }
            UiEvent::Closed => false,
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        let alt = key.modifiers.contains(KeyModifiers::ALT);

        match key.code {
            KeyCode::Char('c') if ctrl => {
                if !self.win.editor.clear() {
                    self.win.editor.set("/quit");
                }
                self.typing_notice();
            }
            KeyCode::Char('u') if ctrl => {
                self.win.bufs.scroll_up(self.win.page());
                self.request_history();
            }
            KeyCode::PageUp => {
                self.win.bufs.scroll_up(self.win.page());
                self.request_history();
            }
            KeyCode::Char('d') if ctrl => self.win.bufs.scroll_down(self.win.page()),
            KeyCode::PageDown => self.win.bufs.scroll_down(self.win.page()),
            KeyCode::Char('n') if ctrl => self.win.bufs.next(),
            KeyCode::Char('p') if ctrl => self.win.bufs.previous(),
            KeyCode::Char('w') if ctrl => {
                if self.win.editor.delete_word() {
                    self.typing_notice();
                }
            }
            KeyCode::Right if alt => self.win.bufs.next(),
            KeyCode::Right => self.win.editor.right(),
            KeyCode::Left if alt => self.win.bufs.previous(),
            KeyCode::Left => self.win.editor.left(),
            KeyCode::Up if alt => self.win.bufs.previous(),
            KeyCode::Down if alt => self.win.bufs.next(),
            KeyCode::Home if alt => {
                self.win.bufs.to(0);
            }
            KeyCode::Home => self.win.editor.home(),
            KeyCode::End if alt => {
                let last = self.win.bufs.len().saturating_sub(1);
                self.win.bufs.to(last);
            }
            KeyCode::End => self.win.editor.end(),
            KeyCode::Backspace => {
                if self.win.editor.backspace() {
                    self.typing_notice();
                }
            }
            KeyCode::Delete => {
                if self.win.editor.delete() {
                    self.typing_notice();
                }
            }
            KeyCode::Esc => self.win.bufs.close_overlay(),
            KeyCode::Enter => {
                let (net_id, buffer) = self.win.bufs.current_buffer();
                let (net_id, buffer) = (net_id.to_string(), buffer.to_string());
                let input = self.win.editor.take();

                if let Err(e) = self.handle_input(&net_id, &buffer, &input) {
                    self.win.bufs.add_line(
                        &net_id,
                        &buffer,
                        Notify::Unread,
                        format::error_line(format!("{input:?}: {e}")),
                    );
                }
                if self.quitting {
                    return false;
                }
            }
            KeyCode::Char(c) if alt => match c {
                'n' => {
                    self.win.bufs.scroll_down_highlight();
                }
                'p' => {
                    self.win.bufs.scroll_up_highlight();
                }
                '1'..='9' => {
                    self.win.bufs.to(c as usize - '1' as usize);
                }
                'a' => {
                    let current = self.win.bufs.current_index();
                    if self.win.bufs.next_unread() {
                        self.buffer_before_cycling_unread.get_or_insert(current);
                    } else if let Some(former) = self.buffer_before_cycling_unread.take() {
                        self.win.bufs.to(former);
                    }
                }
                _ => {}
            },
            KeyCode::Char(c) if !ctrl => {
                self.win.editor.insert(c);
                self.typing_notice();
            }
            _ => {}
        }
        true
    }

    fn handle_input(&mut self, net_id: &str, buffer: &str, input: &str) -> Result<(), String> {
        if input.is_empty() {
            return Ok(());
        }

        if !is_command(input) {
            let text = if let Some(stripped) = input.strip_prefix('/') {
                // A double slash escapes a literal one
                stripped
            } else {
                input
            };
            return self.send_message(net_id, buffer, text.to_string());
        }

        let command: data::Command = input.parse().map_err(|e| format!("{e}"))?;

        match command {
            data::Command::Join(channels, keys) => {
                let session = self.session_mut(net_id)?;
                session.join(&channels, keys.as_deref());
            }
            data::Command::Part(channel, reason) => {
                // The first argument is only a channel if it looks like one
                let (channel, reason) = {
                    let session = self.session_mut(net_id)?;
                    match channel {
                        Some(first) if session.is_channel(&first) => (first, reason),
                        Some(first) => (
                            buffer.to_string(),
                            Some(match reason {
                                Some(rest) => format!("{first} {rest}"),
                                None => first,
                            }),
                        ),
                        None => (buffer.to_string(), None),
                    }
                };
                if channel.is_empty() {
                    return Err("this is not a channel".into());
                }
                self.session_mut(net_id)?.part(&channel, reason.as_deref());
            }
            data::Command::Quit(reason) => {
                self.shutdown.store(true, Ordering::Relaxed);
                for session in self.sessions.values_mut() {
                    session.quit(reason.as_deref());
                }
                self.quitting = true;
            }
            data::Command::Motd(target) => {
                self.session_mut(net_id)?.motd(target.as_deref());
            }
            data::Command::Names(channel) => {
                let channel = channel.unwrap_or_else(|| buffer.to_string());
                let members = {
                    let session = self.session_mut(net_id)?;
                    session.names(&channel)
                };
                let names = members
                    .iter()
                    .map(|member| format!("{}{}", member.power_level, member.nick))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.win.bufs.add_line(
                    net_id,
                    &channel,
                    Notify::None,
                    format::status_line(format!("Members: {names}")),
                );
            }
            data::Command::Topic(topic) => match topic {
                Some(topic) => {
                    if buffer.is_empty() {
                        return Err("this is not a channel".into());
                    }
                    self.session_mut(net_id)?.set_topic(buffer, &topic);
                }
                None => {
                    let line = {
                        let session = self.session_mut(net_id)?;
                        match session.topic(buffer) {
                            Some((topic, who, at)) if !topic.is_empty() => {
                                let topic = styled::strip_irc(topic);
                                if who.is_empty() {
                                    format!("Topic: {topic}")
                                } else {
                                    let at = at
                                        .map(|at| {
                                            at.with_timezone(&chrono::Local)
                                                .format(" on %Y-%m-%d at %H:%M")
                                                .to_string()
                                        })
                                        .unwrap_or_default();
                                    format!("Topic (set by {who}{at}): {topic}")
                                }
                            }
                            _ => "No topic set".to_string(),
                        }
                    };
                    self.win.bufs.add_line(
                        net_id,
                        buffer,
                        Notify::None,
                        format::status_line(line),
                    );
                }
            },
            data::Command::Msg(target, text) => {
                self.send_message(net_id, &target, text)?;
            }
            data::Command::Reply(text) => {
                let Some((reply_net, reply_to)) = self.last_query.clone() else {
                    return Err("no query to reply to".into());
                };
                self.send_message(&reply_net, &reply_to, text)?;
            }
            data::Command::Me(text) => {
                let target = if buffer.is_empty() {
                    return Err("this is not a channel".into());
                } else {
                    buffer.to_string()
                };
                self.send_message(net_id, &target, format!("\u{1}ACTION {text}\u{1}"))?;
            }
            data::Command::Np => {
                return Err("now-playing requires the external MPRIS helper".into());
            }
            data::Command::Quote(raw) => {
                self.session_mut(net_id)?.send_raw(&raw);
            }
            data::Command::Buffer(name) => {
                let jumped = match name.parse::<usize>() {
                    Ok(i) => self.win.bufs.to(i),
                    Err(_) => self.win.bufs.jump_buffer(&name),
                };
                if !jumped {
                    return Err(format!("no buffer matching {name:?}"));
                }
            }
            data::Command::Nick(nick) => {
                self.session_mut(net_id)?.change_nick(&nick);
            }
            data::Command::Oper(name, password) => {
                self.session_mut(net_id)?.oper(&name, &password);
            }
            data::Command::Mode(mut args) => {
                let target = if args.first().is_some_and(|arg| {
                    arg.starts_with(['+', '-']) || arg.is_empty()
                }) {
                    buffer.to_string()
                } else if args.is_empty() {
                    buffer.to_string()
                } else {
                    args.remove(0)
                };
                let modestring = if args.is_empty() {
                    None
                } else {
                    Some(args.remove(0))
                };
                self.session_mut(net_id)?.mode(&target, modestring, args);
            }
            data::Command::Invite(nick, channel) => {
                let channel = channel.unwrap_or_else(|| buffer.to_string());
                if channel.is_empty() {
                    return Err("this is not a channel".into());
                }
                self.session_mut(net_id)?.invite(&nick, &channel);
            }
            data::Command::Kick(nick, comment) => {
                if buffer.is_empty() {
                    return Err("this is not a channel".into());
                }
                self.session_mut(net_id)?
                    .kick(buffer, &nick, comment.as_deref());
            }
            data::Command::Ban(mask) => {
                if buffer.is_empty() {
                    return Err("this is not a channel".into());
                }
                let mask = ban_mask(&mask);
                self.session_mut(net_id)?
                    .mode(buffer, Some("+b".into()), vec![mask]);
            }
            data::Command::Unban(mask) => {
                if buffer.is_empty() {
                    return Err("this is not a channel".into());
                }
                let mask = ban_mask(&mask);
                self.session_mut(net_id)?
                    .mode(buffer, Some("-b".into()), vec![mask]);
            }
            data::Command::Search(text) => {
                let target = if buffer.is_empty() {
                    None
                } else {
                    Some(buffer)
                };
                self.session_mut(net_id)?.search(target, &text);
            }
            data::Command::Shrug(text) => {
                let text = match text {
                    Some(text) => format!("{text} \u{af}\\_(\u{30c4})_/\u{af}"),
                    None => "\u{af}\\_(\u{30c4})_/\u{af}".to_string(),
                };
                self.send_message(net_id, buffer, text)?;
            }
            data::Command::Tableflip(text) => {
                let flip = "(\u{256f}\u{b0}\u{25a1}\u{b0})\u{256f}\u{fe35} \u{253b}\u{2501}\u{253b}";
                let text = match text {
                    Some(text) => format!("{text} {flip}"),
                    None => flip.to_string(),
                };
                self.send_message(net_id, buffer, text)?;
            }
            data::Command::Help(_) => {
                for line in data::Command::help() {
                    self.win.bufs.add_line(
                        net_id,
                        buffer,
                        Notify::None,
                        format::status_line(*line),
                    );
                }
            }
        }

        Ok(())
    }

    fn session_mut(&mut self, net_id: &str) -> Result<&mut Session, String> {
        self.sessions
            .get_mut(net_id)
            .ok_or_else(|| "not connected".to_string())
    }

    fn send_message(
        &mut self,
        net_id: &str,
        target: &str,
        content: String,
    ) -> Result<(), String> {
        if target.is_empty() {
            return Err("this is not a channel".into());
        }

        let (nick, echo) = {
            let session = self.session_mut(net_id)?;
            session.privmsg(target, &content);
            session.typing_stop(target);
            (
                session.nick().to_string(),
                !session.has_capability("echo-message"),
            )
        };

        // With echo-message the server plays our own message back;
        // otherwise echo it locally
        if echo {
            let ev = MessageEvent {
                user: nick,
                target: target.to_string(),
                target_is_channel: self
                    .sessions
                    .get(net_id)
                    .is_some_and(|s| s.is_channel(target)),
                command: "PRIVMSG".into(),
                content,
                time: Utc::now(),
            };
            self.handle_message_event(net_id, ev);
        }

        Ok(())
    }
}

fn ban_mask(arg: &str) -> String {
    if arg.contains('!') || arg.contains('@') {
        arg.to_string()
    } else {
        format!("{arg}!*@*")
    }
}
