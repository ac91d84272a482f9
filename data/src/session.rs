use std::collections::{HashMap, HashSet};

use base64::prelude::{Engine, BASE64_STANDARD};
use chrono::{DateTime, TimeZone, Utc};
use proto::{command, Command, Message, Numeric};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::event::{Event, MessageEvent, Severity, TypingState};
use crate::isupport::FeatureMap;
use crate::mode;

/// Capabilities requested when the server offers them.
pub const SUPPORTED_CAPABILITIES: &[&str] = &[
    "account-notify",
    "account-tag",
    "away-notify",
    "batch",
    "cap-notify",
    "draft/chathistory",
    "draft/event-playback",
    "echo-message",
    "extended-join",
    "invite-notify",
    "labeled-response",
    "message-tags",
    "multi-prefix",
    "sasl",
    "server-time",
    "setname",
    "userhost-in-names",
    "soju.im/bouncer-networks",
    "soju.im/bouncer-networks-notify",
    "soju.im/read",
    "soju.im/search",
    "soju.im/webpush",
];

/// Typing notices are sent at most this often per target.
const TYPING_INTERVAL: Duration = Duration::from_secs(3);

const CHATHISTORY_TIME: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

#[derive(Debug, Clone)]
pub struct SaslPlain {
    pub username: String,
    pub password: String,
}

impl SaslPlain {
    fn respond(&self) -> String {
        let payload = format!("\0{}\0{}", self.username, self.password);
        let payload = format!("{}{}", self.username, payload);
        BASE64_STANDARD.encode(payload)
    }
}

#[derive(Debug, Clone, Default)]
pub struct Params {
    pub nickname: String,
    pub username: String,
    pub realname: String,
    pub auth: Option<SaslPlain>,
    /// Bouncer network id this session binds to; empty for the control
    /// connection.
    pub net_id: String,
}

#[derive(Debug, Clone)]
pub struct User {
    pub nick: String,
    pub away: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Channel {
    pub name: String,
    /// Casefolded nick → membership prefixes, strongest first.
    pub members: HashMap<String, String>,
    pub topic: String,
    pub topic_who: String,
    pub topic_time: Option<DateTime<Utc>>,
    pub secret: bool,
}

#[derive(Debug, Clone)]
pub struct Member {
    pub power_level: String,
    pub nick: String,
}

#[derive(Debug)]
enum Batch {
    History {
        target: String,
        events: Vec<Event>,
    },
    Targets {
        targets: Vec<(String, DateTime<Utc>)>,
    },
    Search {
        events: Vec<Event>,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing parameters for {0}")]
    MissingParams(&'static str),
    #[error("invalid bouncer network: {0}")]
    BouncerNetwork(String),
}

/// Per-network IRC state machine.
///
/// The orchestrator feeds it parsed wire messages through [`handle`] and
/// receives domain events back; everything the session says to the
/// server goes through the bounded outbound queue drained by the
/// connection's writer task.
///
/// [`handle`]: Session::handle
#[derive(Debug)]
pub struct Session {
    outbound: mpsc::Sender<Message>,

    net_id: String,
    nick: String,
    nick_cf: String,
    username: String,
    realname: String,
    account: Option<String>,
    host: Option<String>,
    auth: Option<SaslPlain>,

    registered: bool,
    available_caps: HashMap<String, String>,
    enabled_caps: HashSet<String>,
    /// LS-order list of caps we will request once the listing ends.
    cap_ls_order: Vec<String>,
    features: FeatureMap,

    users: HashMap<String, User>,
    channels: HashMap<String, Channel>,
    batches: HashMap<String, Batch>,
    typing_stamps: HashMap<String, Instant>,
    pending_joins: HashSet<String>,
}

impl Session {
    /// Creates the session and queues the registration preamble.
    pub fn new(params: Params, outbound: mpsc::Sender<Message>) -> Self {
        let mut session = Session {
            outbound,
            net_id: params.net_id,
            nick_cf: params.nickname.to_lowercase(),
            nick: params.nickname,
            username: params.username,
            realname: params.realname,
            account: None,
            host: None,
            auth: params.auth,
            registered: false,
            available_caps: HashMap::new(),
            enabled_caps: HashSet::new(),
            cap_ls_order: vec![],
            features: FeatureMap::default(),
            users: HashMap::new(),
            channels: HashMap::new(),
            batches: HashMap::new(),
            typing_stamps: HashMap::new(),
            pending_joins: HashSet::new(),
        };

        session.send(Command::CAP(None, "LS".into(), Some("302".into()), None));
        session.send(Command::NICK(session.nick.clone()));
        session.send(Command::USER(
            session.username.clone(),
            session.realname.clone(),
        ));

        session
    }

    fn send(&self, command: Command) {
        self.send_message(Message::from(command));
    }

    fn send_message(&self, message: Message) {
        if let Err(e) = self.outbound.try_send(message) {
            log::error!("outbound queue: {e}");
        }
    }

    pub fn net_id(&self) -> &str {
        &self.net_id
    }

    pub fn nick(&self) -> &str {
        &self.nick
    }

    pub fn nick_cf(&self) -> &str {
        &self.nick_cf
    }

    /// The account name confirmed by SASL, when authenticated.
    pub fn account(&self) -> Option<&str> {
        self.account.as_deref()
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub fn has_capability(&self, capability: &str) -> bool {
        self.enabled_caps.contains(capability)
    }

    pub fn features(&self) -> &FeatureMap {
        &self.features
    }

    /// Human name of the network, from ISUPPORT when known.
    pub fn network_name(&self) -> Option<&str> {
        self.features.network()
    }

    pub fn is_me(&self, nick: &str) -> bool {
        self.casemap(nick) == self.nick_cf
    }

    pub fn is_channel(&self, name: &str) -> bool {
        proto::is_channel(name, &self.features.chantypes())
    }

    pub fn casemap(&self, s: &str) -> String {
        self.features.casemap().normalize(s)
    }

    pub fn send_raw(&mut self, raw: &str) {
        self.send(Command::Raw(raw.to_string()));
    }

    pub fn join(&mut self, channel: &str, key: Option<&str>) {
        self.pending_joins.insert(self.casemap(channel));
        self.send(Command::JOIN(
            channel.to_string(),
            key.map(ToString::to_string),
        ));
    }

    pub fn part(&mut self, channel: &str, reason: Option<&str>) {
        self.send(Command::PART(
            channel.to_string(),
            reason.map(ToString::to_string),
        ));
    }

    pub fn motd(&mut self, target: Option<&str>) {
        self.send(Command::MOTD(target.map(ToString::to_string)));
    }

    pub fn change_nick(&mut self, nick: &str) {
        self.send(Command::NICK(nick.to_string()));
    }

    pub fn oper(&mut self, name: &str, password: &str) {
        self.send(Command::OPER(name.to_string(), password.to_string()));
    }

    pub fn set_topic(&mut self, channel: &str, topic: &str) {
        self.send(Command::TOPIC(
            channel.to_string(),
            Some(topic.to_string()),
        ));
    }

    pub fn mode(&mut self, target: &str, modestring: Option<String>, args: Vec<String>) {
        self.send(Command::MODE(target.to_string(), modestring, args));
    }

    pub fn invite(&mut self, nick: &str, channel: &str) {
        self.send(Command::INVITE(nick.to_string(), channel.to_string()));
    }

    pub fn kick(&mut self, channel: &str, nick: &str, comment: Option<&str>) {
        self.send(Command::KICK(
            channel.to_string(),
            nick.to_string(),
            comment.map(ToString::to_string),
        ));
    }

    pub fn quit(&mut self, reason: Option<&str>) {
        self.send(Command::QUIT(reason.map(ToString::to_string)));
    }

    pub fn close(&mut self) {
        self.quit(None);
    }

    /// Bytes of message body that fit one PRIVMSG to `target`, derived
    /// from the server line length and what is known of our own prefix.
    fn message_budget(&self, target: &str) -> usize {
        // Unknown host: assume the worst-case hostname length
        let prefix = 1 // ':'
            + self.nick.len()
            + 1
            + self.username.len()
            + 1
            + self.host.as_deref().map_or(64, str::len);
        let overhead = prefix + " PRIVMSG ".len() + target.len() + " :".len() + "\r\n".len();

        self.features.linelen().saturating_sub(overhead).max(1)
    }

    /// Sends `content` as one or more PRIVMSGs, splitting oversized
    /// bodies at UTF-8 boundaries.
    pub fn privmsg(&mut self, target: &str, content: &str) {
        let budget = self.message_budget(target);

        for fragment in split_utf8(content, budget) {
            self.send(Command::PRIVMSG(target.to_string(), fragment.to_string()));
        }
    }

    pub fn notice(&mut self, target: &str, content: &str) {
        let budget = self.message_budget(target);

        for fragment in split_utf8(content, budget) {
            self.send(Command::NOTICE(target.to_string(), fragment.to_string()));
        }
    }

    /// Sends a `+typing=active` notice, rate limited per target.
    /// Suppressed entirely without `message-tags`.
    pub fn typing(&mut self, target: &str) {
        if !self.has_capability("message-tags") {
            return;
        }

        let target_cf = self.casemap(target);
        let now = Instant::now();

        if self
            .typing_stamps
            .get(&target_cf)
            .is_some_and(|last| now.duration_since(*last) < TYPING_INTERVAL)
        {
            return;
        }
        self.typing_stamps.insert(target_cf, now);

        self.send_message(
            Message::from(Command::TAGMSG(target.to_string())).with_tag("+typing", "active"),
        );
    }

    pub fn typing_stop(&mut self, target: &str) {
        if !self.has_capability("message-tags") {
            return;
        }
        let target_cf = self.casemap(target);
        self.typing_stamps.remove(&target_cf);

        self.send_message(
            Message::from(Command::TAGMSG(target.to_string())).with_tag("+typing", "done"),
        );
    }

    /// Starts a CHATHISTORY request; a no-op when the server does not
    /// support `draft/chathistory`.
    pub fn new_history_request(&mut self, target: &str) -> HistoryRequest<'_> {
        HistoryRequest {
            session: self,
            target: target.to_string(),
            limit: 100,
        }
    }

    /// Server-side history search (soju.im/search); results arrive in a
    /// search batch.
    pub fn search(&mut self, target: Option<&str>, text: &str) {
        if !self.has_capability("soju.im/search") {
            return;
        }
        let mut attrs = format!("text={}", escape_attr(text));
        if let Some(target) = target {
            attrs = format!("in={};{attrs}", escape_attr(target));
        }
        self.send_message(command("SEARCH", vec![attrs]));
    }

    pub fn monitor_add(&mut self, target: &str) {
        self.send(Command::MONITOR("+".into(), Some(target.to_string())));
    }

    pub fn monitor_remove(&mut self, target: &str) {
        self.send(Command::MONITOR("-".into(), Some(target.to_string())));
    }

    /// Asks the server for its read marker on `target`.
    pub fn read_get(&mut self, target: &str) {
        if self.has_capability("soju.im/read") {
            self.send(Command::MARKREAD(target.to_string(), None));
        }
    }

    /// Publishes our read marker for `target`.
    pub fn read_set(&mut self, target: &str, timestamp: DateTime<Utc>) {
        if self.has_capability("soju.im/read") {
            self.send(Command::MARKREAD(
                target.to_string(),
                Some(format!(
                    "timestamp={}",
                    timestamp.format(CHATHISTORY_TIME)
                )),
            ));
        }
    }

    /// Known members of a channel, strongest membership first.
    pub fn names(&self, target: &str) -> Vec<Member> {
        let Some(channel) = self.channels.get(&self.casemap(target)) else {
            return vec![];
        };

        let prefixes: Vec<char> = self.features.prefix().iter().map(|map| map.prefix).collect();
        let rank = |member: &Member| {
            member
                .power_level
                .chars()
                .next()
                .and_then(|c| prefixes.iter().position(|p| *p == c))
                .unwrap_or(prefixes.len())
        };

        let mut members: Vec<Member> = channel
            .members
            .iter()
            .map(|(nick_cf, power_level)| Member {
                power_level: power_level.clone(),
                nick: self
                    .users
                    .get(nick_cf)
                    .map_or_else(|| nick_cf.clone(), |user| user.nick.clone()),
            })
            .collect();

        members.sort_by(|a, b| rank(a).cmp(&rank(b)).then_with(|| a.nick.cmp(&b.nick)));
        members
    }

    pub fn topic(&self, target: &str) -> Option<(&str, &str, Option<DateTime<Utc>>)> {
        let channel = self.channels.get(&self.casemap(target))?;
        Some((&channel.topic, &channel.topic_who, channel.topic_time))
    }

    pub fn channels_shared_with(&self, nick: &str) -> Vec<String> {
        let nick_cf = self.casemap(nick);
        self.channels
            .values()
            .filter(|channel| channel.members.contains_key(&nick_cf))
            .map(|channel| channel.name.clone())
            .collect()
    }

    fn time_of(&self, message: &Message) -> DateTime<Utc> {
        message
            .tag("time")
            .and_then(|time| DateTime::parse_from_rfc3339(time).ok())
            .map(|time| time.with_timezone(&Utc))
            .unwrap_or_else(Utc::now)
    }

    /// Translates one wire message into state updates and domain events.
    ///
    /// Per-message failures come back as `Err` and must not interrupt
    /// the read loop.
    pub fn handle(&mut self, message: Message) -> Result<Vec<Event>, Error> {
        // Lines tagged with an open batch are routed into it
        if let Some(id) = message.tag("batch") {
            let id = id.to_string();
            if self.batches.contains_key(&id) {
                return self.handle_batched(&id, message);
            }
        }

        if self.registered {
            self.handle_registered(message)
        } else {
            self.handle_registration(message)
        }
    }

    fn handle_batched(&mut self, id: &str, message: Message) -> Result<Vec<Event>, Error> {
        let time = self.time_of(&message);
        let event = self.playback_event(&message, time);

        match self.batches.get_mut(id) {
            Some(Batch::History { events, .. }) | Some(Batch::Search { events }) => {
                events.extend(event);
            }
            Some(Batch::Targets { targets }) => {
                if let Command::CHATHISTORY(sub, params) = &message.command {
                    if sub == "TARGETS" && params.len() >= 2 {
                        if let Ok(time) = DateTime::parse_from_rfc3339(&params[1]) {
                            targets.push((params[0].clone(), time.with_timezone(&Utc)));
                        }
                    }
                }
            }
            None => {}
        }

        Ok(vec![])
    }

    /// Converts a history-playback message into its event without
    /// touching live state.
    fn playback_event(&self, message: &Message, time: DateTime<Utc>) -> Option<Event> {
        let nick = message.nick().unwrap_or_default().to_string();

        match &message.command {
            Command::PRIVMSG(target, content) | Command::NOTICE(target, content) => {
                Some(Event::Message(MessageEvent {
                    user: nick,
                    target: target.clone(),
                    target_is_channel: self.is_channel(target),
                    command: message.command.command(),
                    content: content.clone(),
                    time,
                }))
            }
            Command::JOIN(channel, _) => Some(Event::UserJoin {
                channel: channel.clone(),
                user: nick,
                time,
            }),
            Command::PART(channel, _) => Some(Event::UserPart {
                channel: channel.clone(),
                user: nick,
                time,
            }),
            Command::QUIT(_) => Some(Event::UserQuit {
                channels: vec![],
                user: nick,
                time,
            }),
            Command::NICK(new) => Some(Event::UserNick {
                former: nick,
                user: new.clone(),
                time,
            }),
            Command::TOPIC(channel, Some(topic)) => Some(Event::TopicChange {
                channel: channel.clone(),
                topic: topic.clone(),
                setter: nick,
                time,
            }),
            Command::MODE(target, Some(modestring), args) if self.is_channel(target) => {
                Some(Event::ModeChange {
                    channel: target.clone(),
                    mode: join_mode(modestring, args),
                    time,
                })
            }
            _ => None,
        }
    }

    fn request_supported_caps(&mut self, offered: &[String]) {
        for cap in offered {
            if SUPPORTED_CAPABILITIES.contains(&cap.as_str()) {
                self.send(Command::CAP(None, "REQ".into(), Some(cap.clone()), None));
            }
        }
    }

    fn handle_registration(&mut self, message: Message) -> Result<Vec<Event>, Error> {
        match &message.command {
            Command::CAP(_, sub, a, b) => match sub.as_str() {
                "LS" => {
                    let (more, caps) = match (a.as_deref(), b.as_deref()) {
                        (Some("*"), Some(caps)) => (true, caps),
                        (Some(caps), _) => (false, caps),
                        _ => return Err(Error::MissingParams("CAP LS")),
                    };

                    for (name, value) in parse_caps(caps) {
                        self.available_caps
                            .insert(name.to_string(), value.to_string());
                        self.cap_ls_order.push(name.to_string());
                    }

                    if !more {
                        let offered = std::mem::take(&mut self.cap_ls_order);
                        self.request_supported_caps(&offered);

                        if !self.net_id.is_empty()
                            && self.available_caps.contains_key("soju.im/bouncer-networks")
                        {
                            self.send(Command::BOUNCER(
                                "BIND".into(),
                                vec![self.net_id.clone()],
                            ));
                        }

                        let sasl = self.available_caps.contains_key("sasl");
                        if self.auth.is_none() || !sasl {
                            self.send(Command::CAP(None, "END".into(), None, None));
                        }
                    }
                }
                "ACK" => {
                    let caps = a.as_deref().ok_or(Error::MissingParams("CAP ACK"))?;
                    for cap in caps.split(' ').filter(|cap| !cap.is_empty()) {
                        self.enabled_caps.insert(cap.to_string());

                        if cap == "sasl" && self.auth.is_some() {
                            self.send(Command::AUTHENTICATE("PLAIN".into()));
                        }
                    }
                }
                "NAK" => {
                    let caps = a.as_deref().unwrap_or_default();
                    for cap in caps.split(' ') {
                        self.enabled_caps.remove(cap);
                    }
                }
                _ => {}
            },
            Command::AUTHENTICATE(challenge) => {
                if let Some(auth) = &self.auth {
                    if challenge == "+" {
                        let response = auth.respond();
                        self.send(Command::AUTHENTICATE(response));
                    } else {
                        self.send(Command::AUTHENTICATE("*".into()));
                    }
                }
            }
            Command::Numeric(Numeric::RPL_LOGGEDIN, params) => {
                if params.len() >= 3 {
                    self.account = Some(params[2].clone());
                    self.host = mask_host(&params[1]);
                }
                self.send(Command::CAP(None, "END".into(), None, None));
            }
            Command::Numeric(numeric, params) if numeric.is_sasl_failure() => {
                // Continue unauthenticated
                self.send(Command::CAP(None, "END".into(), None, None));
                return Ok(vec![Event::Error {
                    severity: Severity::Warn,
                    code: format!("{:03}", *numeric as u16),
                    message: params.last().cloned().unwrap_or_default(),
                }]);
            }
            Command::Numeric(Numeric::ERR_NICKNAMEINUSE, _)
            | Command::Numeric(Numeric::ERR_ERRONEUSNICKNAME, _) => {
                self.nick.push('_');
                self.nick_cf = self.casemap(&self.nick.clone());
                self.send(Command::NICK(self.nick.clone()));
            }
            _ => return self.handle_registered(message),
        }

        Ok(vec![])
    }

    fn handle_registered(&mut self, message: Message) -> Result<Vec<Event>, Error> {
        let time = self.time_of(&message);
        let nick = message.nick().unwrap_or_default().to_string();
        let nick_cf = self.casemap(&nick);

        let mut events = vec![];

        match &message.command {
            Command::Numeric(Numeric::RPL_WELCOME, params) => {
                if let Some(confirmed) = params.first() {
                    self.nick = confirmed.clone();
                    self.nick_cf = self.casemap(confirmed);
                }
                self.registered = true;
                events.push(Event::Registered);

                if self.host.is_none() {
                    self.send(Command::WHO(self.nick.clone()));
                }
            }
            Command::Numeric(Numeric::RPL_ISUPPORT, params) => {
                if params.len() > 2 {
                    self.features
                        .apply(params[1..params.len() - 1].iter().map(String::as_str));
                }
            }
            Command::Numeric(Numeric::RPL_WHOREPLY, params) => {
                if params.len() >= 6 && self.is_me(&params[5]) {
                    self.host = Some(params[3].clone());
                }
            }
            Command::Numeric(Numeric::RPL_NAMREPLY, params) => {
                if params.len() < 4 {
                    return Err(Error::MissingParams("RPL_NAMREPLY"));
                }
                let channel_cf = self.casemap(&params[2]);
                let secret = params[1] == "@";
                let prefixes: String =
                    self.features.prefix().iter().map(|map| map.prefix).collect();

                let names: Vec<(String, String)> = params[3]
                    .split(' ')
                    .filter(|name| !name.is_empty())
                    .map(|name| {
                        let power: String =
                            name.chars().take_while(|c| prefixes.contains(*c)).collect();
                        // userhost-in-names appends !user@host
                        let nick = name[power.len()..]
                            .split('!')
                            .next()
                            .unwrap_or_default()
                            .to_string();
                        (power, nick)
                    })
                    .collect();

                for (power, nick) in names {
                    let nick_cf = self.casemap(&nick);
                    self.users
                        .entry(nick_cf.clone())
                        .or_insert_with(|| User { nick, away: false });
                    if let Some(channel) = self.channels.get_mut(&channel_cf) {
                        channel.secret = secret;
                        channel.members.insert(nick_cf, power);
                    }
                }
            }
            Command::Numeric(Numeric::RPL_ENDOFNAMES, params) => {
                if let Some(name) = params.get(1) {
                    let channel_cf = self.casemap(name);
                    if let Some(channel) = self.channels.get(&channel_cf) {
                        events.push(Event::SelfJoin {
                            channel: channel.name.clone(),
                            requested: self.pending_joins.remove(&channel_cf),
                            topic: channel.topic.clone(),
                        });
                    }
                }
            }
            Command::Numeric(Numeric::RPL_TOPIC, params) => {
                if params.len() >= 3 {
                    let channel_cf = self.casemap(&params[1]);
                    if let Some(channel) = self.channels.get_mut(&channel_cf) {
                        channel.topic = params[2].clone();
                    }
                }
            }
            Command::Numeric(Numeric::RPL_NOTOPIC, params) => {
                if let Some(name) = params.get(1) {
                    let channel_cf = self.casemap(name);
                    if let Some(channel) = self.channels.get_mut(&channel_cf) {
                        channel.topic.clear();
                    }
                }
            }
            Command::Numeric(Numeric::RPL_TOPICWHOTIME, params) => {
                if params.len() >= 4 {
                    let channel_cf = self.casemap(&params[1]);
                    if let Some(channel) = self.channels.get_mut(&channel_cf) {
                        channel.topic_who = params[2].clone();
                        channel.topic_time = params[3]
                            .parse::<i64>()
                            .ok()
                            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());
                    }
                }
            }
            Command::CAP(_, sub, a, b) => match sub.as_str() {
                "ACK" => {
                    for cap in a.as_deref().unwrap_or_default().split(' ') {
                        if !cap.is_empty() {
                            self.enabled_caps.insert(cap.to_string());
                        }
                    }
                }
                "NAK" => {
                    for cap in a.as_deref().unwrap_or_default().split(' ') {
                        self.enabled_caps.remove(cap);
                    }
                }
                // cap-notify deltas are reconciled incrementally
                "NEW" => {
                    let caps = a.as_deref().unwrap_or_default();
                    let mut offered = vec![];
                    for (name, value) in parse_caps(caps) {
                        self.available_caps
                            .insert(name.to_string(), value.to_string());
                        offered.push(name.to_string());
                    }
                    self.request_supported_caps(&offered);
                }
                "DEL" => {
                    let caps = a.as_deref().unwrap_or_default();
                    for (name, _) in parse_caps(caps) {
                        self.available_caps.remove(name);
                        self.enabled_caps.remove(name);
                    }
                }
                "LS" => {
                    let caps = b.as_deref().or(a.as_deref()).unwrap_or_default();
                    for (name, value) in parse_caps(caps) {
                        self.available_caps
                            .insert(name.to_string(), value.to_string());
                    }
                }
                _ => {}
            },
            Command::JOIN(channel, _account) => {
                let channel_cf = self.casemap(channel);

                if nick_cf == self.nick_cf {
                    self.channels.insert(
                        channel_cf,
                        Channel {
                            name: channel.clone(),
                            ..Channel::default()
                        },
                    );
                    // SelfJoin is emitted once NAMES lands
                } else if let Some(chan) = self.channels.get_mut(&channel_cf) {
                    self.users
                        .entry(nick_cf.clone())
                        .or_insert_with(|| User {
                            nick: nick.clone(),
                            away: false,
                        });
                    chan.members.insert(nick_cf, String::new());

                    events.push(Event::UserJoin {
                        channel: chan.name.clone(),
                        user: nick,
                        time,
                    });
                }
            }
            Command::PART(channel, _reason) => {
                let channel_cf = self.casemap(channel);

                if nick_cf == self.nick_cf {
                    self.channels.remove(&channel_cf);
                    events.push(Event::SelfPart {
                        channel: channel.clone(),
                    });
                } else if let Some(chan) = self.channels.get_mut(&channel_cf) {
                    chan.members.remove(&nick_cf);
                    events.push(Event::UserPart {
                        channel: chan.name.clone(),
                        user: nick,
                        time,
                    });
                }
            }
            Command::KICK(channel, victim, _reason) => {
                let channel_cf = self.casemap(channel);
                let victim_cf = self.casemap(victim);

                if victim_cf == self.nick_cf {
                    self.channels.remove(&channel_cf);
                    events.push(Event::SelfPart {
                        channel: channel.clone(),
                    });
                } else if let Some(chan) = self.channels.get_mut(&channel_cf) {
                    chan.members.remove(&victim_cf);
                    events.push(Event::UserPart {
                        channel: chan.name.clone(),
                        user: victim.clone(),
                        time,
                    });
                }
            }
            Command::QUIT(_reason) => {
                let mut channels = vec![];
                for channel in self.channels.values_mut() {
                    if channel.members.remove(&nick_cf).is_some() {
                        channels.push(channel.name.clone());
                    }
                }
                self.users.remove(&nick_cf);

                events.push(Event::UserQuit {
                    channels,
                    user: nick,
                    time,
                });
            }
            Command::NICK(new_nick) => {
                let new_cf = self.casemap(new_nick);

                // Rename across all member maps, keeping power levels
                for channel in self.channels.values_mut() {
                    if let Some(power) = channel.members.remove(&nick_cf) {
                        channel.members.insert(new_cf.clone(), power);
                    }
                }
                if let Some(mut user) = self.users.remove(&nick_cf) {
                    user.nick = new_nick.clone();
                    self.users.insert(new_cf.clone(), user);
                }

                if nick_cf == self.nick_cf {
                    events.push(Event::SelfNick {
                        former: self.nick.clone(),
                        new: new_nick.clone(),
                        time,
                    });
                    self.nick = new_nick.clone();
                    self.nick_cf = new_cf;
                } else {
                    events.push(Event::UserNick {
                        former: nick,
                        user: new_nick.clone(),
                        time,
                    });
                }
            }
            Command::TOPIC(channel, Some(topic)) => {
                let channel_cf = self.casemap(channel);
                if let Some(chan) = self.channels.get_mut(&channel_cf) {
                    chan.topic = topic.clone();
                    chan.topic_who = nick.clone();
                    chan.topic_time = Some(time);

                    events.push(Event::TopicChange {
                        channel: chan.name.clone(),
                        topic: topic.clone(),
                        setter: nick,
                        time,
                    });
                }
            }
            Command::MODE(target, Some(modestring), args) if self.is_channel(target) => {
                let channel_cf = self.casemap(target);
                let modes = mode::parse(
                    modestring,
                    args,
                    &self.features.chanmodes(),
                    &self.features.prefix(),
                );
                let prefix = self.features.prefix();

                if let Some(chan) = self.channels.get_mut(&channel_cf) {
                    for change in &modes {
                        let Some(map) =
                            prefix.iter().find(|map| map.mode == change.letter())
                        else {
                            continue;
                        };
                        let Some(member) = change.arg() else {
                            continue;
                        };
                        let member_cf = self.features.casemap().normalize(member);
                        let Some(power) = chan.members.get_mut(&member_cf) else {
                            continue;
                        };

                        match change {
                            mode::Mode::Add(..) => {
                                if !power.contains(map.prefix) {
                                    // Keep prefix order strongest-first
                                    let mut updated = String::new();
                                    for candidate in prefix.iter() {
                                        if candidate.prefix == map.prefix
                                            || power.contains(candidate.prefix)
                                        {
                                            updated.push(candidate.prefix);
                                        }
                                    }
                                    *power = updated;
                                }
                            }
                            mode::Mode::Remove(..) => {
                                power.retain(|c| c != map.prefix);
                            }
                        }
                    }

                    events.push(Event::ModeChange {
                        channel: chan.name.clone(),
                        mode: join_mode(modestring, args),
                        time,
                    });
                }
            }
            Command::PRIVMSG(target, content) | Command::NOTICE(target, content) => {
                events.push(Event::Message(MessageEvent {
                    user: nick,
                    target: target.clone(),
                    target_is_channel: self.is_channel(target),
                    command: message.command.command(),
                    content: content.clone(),
                    time,
                }));
            }
            Command::TAGMSG(target) => {
                if nick_cf != self.nick_cf {
                    if let Some(state) =
                        message.tag("+typing").and_then(TypingState::parse)
                    {
                        events.push(Event::Typing {
                            target: target.clone(),
                            user: nick,
                            state,
                            time,
                        });
                    }
                }
            }
            Command::BATCH(reference, params) => {
                let (start, id) = match reference.chars().next() {
                    Some('+') => (true, &reference[1..]),
                    Some('-') => (false, &reference[1..]),
                    _ => return Err(Error::MissingParams("BATCH")),
                };

                if start {
                    let batch = match params.first().map(String::as_str) {
                        Some("chathistory") => params.get(1).map(|target| Batch::History {
                            target: target.clone(),
                            events: vec![],
                        }),
                        Some("draft/chathistory-targets") => {
                            Some(Batch::Targets { targets: vec![] })
                        }
                        Some("soju.im/search") => Some(Batch::Search { events: vec![] }),
                        _ => None,
                    };
                    if let Some(batch) = batch {
                        self.batches.insert(id.to_string(), batch);
                    }
                } else if let Some(batch) = self.batches.remove(id) {
                    // The whole batch lands as one event
                    events.push(match batch {
                        Batch::History { target, events } => Event::History {
                            target,
                            messages: events,
                        },
                        Batch::Targets { targets } => Event::HistoryTargets { targets },
                        Batch::Search { events } => Event::Search { messages: events },
                    });
                }
            }
            Command::CHATHISTORY(sub, params) => {
                // TARGETS outside a batch still yields the event
                if sub == "TARGETS" && params.len() >= 2 {
                    if let Ok(last) = DateTime::parse_from_rfc3339(&params[1]) {
                        events.push(Event::HistoryTargets {
                            targets: vec![(params[0].clone(), last.with_timezone(&Utc))],
                        });
                    }
                }
            }
            Command::MARKREAD(target, timestamp) => {
                if let Some(timestamp) = timestamp
                    .as_deref()
                    .and_then(|value| value.strip_prefix("timestamp="))
                    .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
                {
                    events.push(Event::Read {
                        target: target.clone(),
                        timestamp: timestamp.with_timezone(&Utc),
                    });
                }
            }
            Command::BOUNCER(sub, params) => {
                if sub == "NETWORK" && params.len() >= 2 && params[1] != "*" {
                    let attrs = proto::parse::attributes(&params[1])
                        .map_err(|e| Error::BouncerNetwork(e.to_string()))?;
                    let name = attrs
                        .get("name")
                        .cloned()
                        .ok_or_else(|| Error::BouncerNetwork("missing name".into()))?;

                    events.push(Event::BouncerNetwork {
                        id: params[0].clone(),
                        name,
                    });
                }
            }
            Command::INVITE(invitee, channel) => {
                events.push(Event::Invite {
                    inviter: nick,
                    invitee: invitee.clone(),
                    channel: channel.clone(),
                });
            }
            Command::AWAY(reason) => {
                if let Some(user) = self.users.get_mut(&nick_cf) {
                    user.away = reason.is_some();
                }
            }
            Command::PING(token) => {
                self.send(Command::PONG(token.clone(), None));
            }
            Command::ERROR(reason) => {
                events.push(Event::Error {
                    severity: Severity::Fail,
                    code: "ERROR".into(),
                    message: reason.clone(),
                });
            }
            Command::FAIL(_, code, _, description) => {
                events.push(Event::Error {
                    severity: Severity::Fail,
                    code: code.clone(),
                    message: description.clone(),
                });
            }
            Command::WARN(_, code, _, description) => {
                events.push(Event::Error {
                    severity: Severity::Warn,
                    code: code.clone(),
                    message: description.clone(),
                });
            }
            Command::NOTE(_, code, _, description) => {
                events.push(Event::Error {
                    severity: Severity::Note,
                    code: code.clone(),
                    message: description.clone(),
                });
            }
            Command::Numeric(numeric, params) => {
                let code = *numeric as u16;
                events.push(Event::Error {
                    severity: if (400..600).contains(&code) {
                        Severity::Fail
                    } else {
                        Severity::Note
                    },
                    code: format!("{code:03}"),
                    message: params.iter().skip(1).cloned().collect::<Vec<_>>().join(" "),
                });
            }
            Command::Unknown(tag, params) => {
                if let Ok(code) = tag.parse::<u16>() {
                    events.push(Event::Error {
                        severity: if (400..600).contains(&code) {
                            Severity::Fail
                        } else {
                            Severity::Note
                        },
                        code: format!("{code:03}"),
                        message: params.iter().skip(1).cloned().collect::<Vec<_>>().join(" "),
                    });
                } else {
                    log::debug!("unhandled command {tag}");
                }
            }
            _ => {}
        }

        Ok(events)
    }
}

/// A CHATHISTORY request under construction. Finishing methods send the
/// command when `draft/chathistory` is enabled and do nothing otherwise.
pub struct HistoryRequest<'a> {
    session: &'a mut Session,
    target: String,
    limit: usize,
}

impl HistoryRequest<'_> {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn before(self, t: DateTime<Utc>) {
        self.send("BEFORE", vec![format_timestamp(t)]);
    }

    pub fn after(self, t: DateTime<Utc>) {
        self.send("AFTER", vec![format_timestamp(t)]);
    }

    pub fn around(self, t: DateTime<Utc>) {
        self.send("AROUND", vec![format_timestamp(t)]);
    }

    pub fn latest(self) {
        self.send("LATEST", vec!["*".to_string()]);
    }

    /// `CHATHISTORY TARGETS`: conversations with activity between the
    /// two instants. The target given at construction is ignored.
    pub fn targets(self, from: DateTime<Utc>, to: DateTime<Utc>) {
        let limit = self.limit;
        if !self.session.has_capability("draft/chathistory") {
            return;
        }
        self.session.send(Command::CHATHISTORY(
            "TARGETS".into(),
            vec![
                format_timestamp(from),
                format_timestamp(to),
                limit.to_string(),
            ],
        ));
    }

    fn send(self, subcommand: &str, bounds: Vec<String>) {
        if !self.session.has_capability("draft/chathistory") {
            return;
        }

        let mut params = vec![self.target];
        params.extend(bounds);
        params.push(self.limit.to_string());

        self.session
            .send(Command::CHATHISTORY(subcommand.into(), params));
    }
}

fn format_timestamp(t: DateTime<Utc>) -> String {
    format!("timestamp={}", t.format(CHATHISTORY_TIME))
}

/// Splits `content` into chunks of at most `budget` bytes at character
/// boundaries.
fn split_utf8(content: &str, budget: usize) -> Vec<&str> {
    let mut fragments = vec![];
    let mut rest = content;

    while rest.len() > budget {
        let mut cut = budget;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        if cut == 0 {
            break;
        }
        fragments.push(&rest[..cut]);
        rest = &rest[cut..];
    }
    fragments.push(rest);

    fragments
}

/// Tokenizes a CAP listing `name[=value]`, entries prefixed `-` mean
/// removal and are skipped here (DEL uses the raw names).
fn parse_caps(caps: &str) -> impl Iterator<Item = (&str, &str)> {
    caps.split(' ').filter(|cap| !cap.is_empty()).map(|cap| {
        let cap = cap.strip_prefix('-').unwrap_or(cap);
        cap.split_once('=').unwrap_or((cap, ""))
    })
}

fn mask_host(mask: &str) -> Option<String> {
    let (_, host) = mask.split_once('@')?;
    Some(host.to_string())
}

fn join_mode(modestring: &str, args: &[String]) -> String {
    if args.is_empty() {
        modestring.to_string()
    } else {
        format!("{modestring} {}", args.join(" "))
    }
}

fn escape_attr(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace(';', r"\:")
        .replace(' ', r"\s")
}

#[cfg(test)]
mod test {
    use proto::format;

    use super::*;

    fn session_with(auth: Option<SaslPlain>) -> (Session, mpsc::Receiver<Message>) {
        let (tx, rx) = mpsc::channel(64);
        let session = Session::new(
            Params {
                nickname: "bob".into(),
                username: "bob".into(),
                realname: "bob".into(),
                auth,
                net_id: String::new(),
            },
            tx,
        );
        (session, rx)
    }

    fn feed(session: &mut Session, line: &str) -> Vec<Event> {
        let message = proto::parse::message(&format!("{line}\r\n")).unwrap();
        session.handle(message).unwrap()
    }

    fn sent_lines(rx: &mut mpsc::Receiver<Message>) -> Vec<String> {
        let mut lines = vec![];
        while let Ok(message) = rx.try_recv() {
            lines.push(format::message(message).trim_end().to_string());
        }
        lines
    }

    #[test]
    fn cap_and_sasl_handshake() {
        let (mut session, mut rx) = session_with(Some(SaslPlain {
            username: "bob".into(),
            password: "hunter2".into(),
        }));

        assert_eq!(
            sent_lines(&mut rx),
            vec!["CAP LS 302", "NICK bob", "USER bob 0 * bob"]
        );

        feed(&mut session, "CAP * LS :message-tags sasl server-time");
        assert_eq!(
            sent_lines(&mut rx),
            vec![
                "CAP REQ message-tags",
                "CAP REQ sasl",
                "CAP REQ server-time",
            ]
        );

        feed(&mut session, "CAP bob ACK :message-tags sasl server-time");
        assert_eq!(sent_lines(&mut rx), vec!["AUTHENTICATE PLAIN"]);

        feed(&mut session, "AUTHENTICATE +");
        // base64("bob\0bob\0hunter2")
        assert_eq!(
            sent_lines(&mut rx),
            vec!["AUTHENTICATE Ym9iAGJvYgBodW50ZXIy"]
        );

        feed(
            &mut session,
            ":server 900 bob bob!bob@host bob :You are now logged in",
        );
        assert_eq!(sent_lines(&mut rx), vec!["CAP END"]);

        let events = feed(&mut session, ":server 001 bob :welcome");
        assert_eq!(events, vec![Event::Registered]);
        assert!(session.is_registered());
        assert!(session.has_capability("sasl"));
    }

    #[test]
    fn cap_end_is_immediate_without_auth() {
        let (mut session, mut rx) = session_with(None);
        sent_lines(&mut rx);

        feed(&mut session, "CAP * LS :sasl server-time");
        assert_eq!(
            sent_lines(&mut rx),
            vec!["CAP REQ sasl", "CAP REQ server-time", "CAP END"]
        );
    }

    #[test]
    fn multipart_ls_accumulates() {
        let (mut session, mut rx) = session_with(None);
        sent_lines(&mut rx);

        feed(&mut session, "CAP * LS * :message-tags");
        assert!(sent_lines(&mut rx).is_empty());

        feed(&mut session, "CAP * LS :server-time");
        assert_eq!(
            sent_lines(&mut rx),
            vec!["CAP REQ message-tags", "CAP REQ server-time", "CAP END"]
        );
    }

    #[test]
    fn nick_in_use_appends_underscore() {
        let (mut session, mut rx) = session_with(None);
        sent_lines(&mut rx);

        feed(&mut session, ":server 433 * bob :Nickname is already in use");
        assert_eq!(sent_lines(&mut rx), vec!["NICK bob_"]);
        assert_eq!(session.nick(), "bob_");
    }

    fn registered_session() -> (Session, mpsc::Receiver<Message>) {
        let (mut session, mut rx) = session_with(None);
        feed(&mut session, "CAP * LS :message-tags draft/chathistory soju.im/read");
        feed(
            &mut session,
            "CAP bob ACK :message-tags draft/chathistory soju.im/read",
        );
        feed(&mut session, ":server 001 bob :welcome");
        feed(
            &mut session,
            ":server 005 bob CHANTYPES=# CASEMAPPING=ascii PREFIX=(ov)@+ :are supported",
        );
        sent_lines(&mut rx);
        (session, rx)
    }

    #[test]
    fn quit_expands_to_shared_channels() {
        let (mut session, _rx) = registered_session();

        feed(&mut session, ":bob!u@h JOIN #a");
        feed(&mut session, ":bob!u@h JOIN #b");
        feed(&mut session, ":alice!u@h JOIN #a");
        feed(&mut session, ":alice!u@h JOIN #b");

        let events = feed(&mut session, ":alice!u@h QUIT :bye");
        match &events[..] {
            [Event::UserQuit { channels, user, .. }] => {
                assert_eq!(user, "alice");
                let mut channels = channels.clone();
                channels.sort();
                assert_eq!(channels, vec!["#a".to_string(), "#b".to_string()]);
            }
            other => panic!("unexpected events: {other:?}"),
        }

        assert!(session.channels_shared_with("alice").is_empty());
    }

    #[test]
    fn nick_rename_preserves_power_levels() {
        let (mut session, _rx) = registered_session();

        feed(&mut session, ":bob!u@h JOIN #a");
        feed(&mut session, ":server 353 bob = #a :@alice +carol bob");
        feed(&mut session, ":alice!u@h NICK alfred");

        let members = session.names("#a");
        let alfred = members.iter().find(|m| m.nick == "alfred").unwrap();
        assert_eq!(alfred.power_level, "@");
        assert!(!members.iter().any(|m| m.nick == "alice"));
    }

    #[test]
    fn mode_updates_membership() {
        let (mut session, _rx) = registered_session();

        feed(&mut session, ":bob!u@h JOIN #a");
        feed(&mut session, ":server 353 bob = #a :alice bob");

        let events = feed(&mut session, ":x!u@h MODE #a +o alice");
        assert!(matches!(
            &events[..],
            [Event::ModeChange { mode, .. }] if mode == "+o alice"
        ));

        let members = session.names("#a");
        let alice = members.iter().find(|m| m.nick == "alice").unwrap();
        assert_eq!(alice.power_level, "@");

        feed(&mut session, ":x!u@h MODE #a -o+v alice alice");
        let members = session.names("#a");
        let alice = members.iter().find(|m| m.nick == "alice").unwrap();
        assert_eq!(alice.power_level, "+");
    }

    #[test]
    fn history_batch_is_atomic() {
        let (mut session, _rx) = registered_session();

        feed(&mut session, ":bob!u@h JOIN #a");

        let events = feed(&mut session, ":server BATCH +ref chathistory #a");
        assert!(events.is_empty());

        let events = feed(
            &mut session,
            "@batch=ref;time=2025-06-01T12:00:00.000Z :alice!u@h PRIVMSG #a :one",
        );
        assert!(events.is_empty());

        let events = feed(
            &mut session,
            "@batch=ref;time=2025-06-01T12:00:01.000Z :alice!u@h PRIVMSG #a :two",
        );
        assert!(events.is_empty());

        let events = feed(&mut session, ":server BATCH -ref");
        match &events[..] {
            [Event::History { target, messages }] => {
                assert_eq!(target, "#a");
                assert_eq!(messages.len(), 2);
                assert!(matches!(
                    &messages[0],
                    Event::Message(m) if m.content == "one"
                ));
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn chathistory_targets_batch() {
        let (mut session, _rx) = registered_session();

        feed(&mut session, ":server BATCH +t draft/chathistory-targets");
        feed(
            &mut session,
            "@batch=t CHATHISTORY TARGETS #a 2025-06-01T12:00:00.000Z",
        );
        feed(
            &mut session,
            "@batch=t CHATHISTORY TARGETS carol 2025-06-01T12:30:00.000Z",
        );

        let events = feed(&mut session, ":server BATCH -t");
        match &events[..] {
            [Event::HistoryTargets { targets }] => {
                assert_eq!(targets.len(), 2);
                assert_eq!(targets[0].0, "#a");
                assert_eq!(targets[1].0, "carol");
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn ping_answered_synchronously() {
        let (mut session, mut rx) = registered_session();

        feed(&mut session, "PING :token-123");
        assert_eq!(sent_lines(&mut rx), vec!["PONG token-123"]);
    }

    #[tokio::test(start_paused = true)]
    async fn typing_is_rate_limited() {
        let (mut session, mut rx) = registered_session();

        session.typing("#a");
        session.typing("#a");
        assert_eq!(
            sent_lines(&mut rx),
            vec!["@+typing=active TAGMSG #a"]
        );

        // A different target has its own stamp
        session.typing("#b");
        assert_eq!(sent_lines(&mut rx), vec!["@+typing=active TAGMSG #b"]);

        tokio::time::advance(Duration::from_secs(4)).await;
        session.typing("#a");
        assert_eq!(sent_lines(&mut rx), vec!["@+typing=active TAGMSG #a"]);
    }

    #[test]
    fn typing_suppressed_without_message_tags() {
        let (mut session, mut rx) = session_with(None);
        feed(&mut session, ":server 001 bob :welcome");
        sent_lines(&mut rx);

        session.typing("#a");
        assert!(sent_lines(&mut rx).is_empty());
    }

    #[test]
    fn history_request_noop_without_cap() {
        let (mut session, mut rx) = session_with(None);
        feed(&mut session, ":server 001 bob :welcome");
        sent_lines(&mut rx);

        session
            .new_history_request("#a")
            .with_limit(200)
            .before(Utc::now());
        assert!(sent_lines(&mut rx).is_empty());
    }

    #[test]
    fn history_request_formats_bounds() {
        let (mut session, mut rx) = registered_session();

        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        session.new_history_request("#a").with_limit(200).before(t);
        assert_eq!(
            sent_lines(&mut rx),
            vec!["CHATHISTORY BEFORE #a timestamp=2025-06-01T12:00:00.000Z 200"]
        );

        session
            .new_history_request("")
            .with_limit(1000)
            .targets(t, t + chrono::Duration::hours(1));
        assert_eq!(
            sent_lines(&mut rx),
            vec![
                "CHATHISTORY TARGETS timestamp=2025-06-01T12:00:00.000Z timestamp=2025-06-01T13:00:00.000Z 1000"
            ]
        );
    }

    #[test]
    fn privmsg_splits_on_utf8_boundaries() {
        let (mut session, mut rx) = registered_session();

        // Pin the line length down so splitting kicks in
        session.features.apply(["LINELEN=200"]);

        let body = "é".repeat(100);
        session.privmsg("#a", &body);

        let lines = sent_lines(&mut rx);
        assert!(lines.len() > 1);
        for line in &lines {
            assert!(line.len() + 2 <= 200, "{line:?} overflows");
            // Splits land between characters, never inside one
            assert!(line.ends_with('\u{e9}'));
        }
    }

    #[test]
    fn server_time_tag_is_honored() {
        let (mut session, _rx) = registered_session();

        let events = feed(
            &mut session,
            "@time=2023-07-20T21:19:11.000Z :alice!u@h PRIVMSG bob :hi",
        );
        match &events[..] {
            [Event::Message(m)] => {
                assert_eq!(
                    m.time,
                    Utc.with_ymd_and_hms(2023, 7, 20, 21, 19, 11).unwrap()
                );
                assert!(!m.target_is_channel);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn read_marker_round_trip() {
        let (mut session, mut rx) = registered_session();

        session.read_get("#a");
        assert_eq!(sent_lines(&mut rx), vec!["MARKREAD #a"]);

        let t = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        session.read_set("#a", t);
        assert_eq!(
            sent_lines(&mut rx),
            vec!["MARKREAD #a timestamp=2025-06-01T12:00:00.000Z"]
        );

        let events = feed(
            &mut session,
            ":server MARKREAD #a timestamp=2025-06-01T12:30:00.000Z",
        );
        assert!(matches!(
            &events[..],
            [Event::Read { target, .. }] if target == "#a"
        ));
    }

    #[test]
    fn bouncer_network_notification() {
        let (mut session, _rx) = registered_session();

        let events = feed(
            &mut session,
            "BOUNCER NETWORK 44 :name=OFTC;host=irc.oftc.net;state=connected",
        );
        assert_eq!(
            events,
            vec![Event::BouncerNetwork {
                id: "44".into(),
                name: "OFTC".into()
            }]
        );
    }

    #[test]
    fn error_numerics_never_interrupt() {
        let (mut session, _rx) = registered_session();

        let events = feed(&mut session, ":server 404 bob #a :Cannot send to channel");
        assert!(matches!(
            &events[..],
            [Event::Error { severity: Severity::Fail, code, .. }] if code == "404"
        ));

        let events = feed(&mut session, ":server 372 bob :- some motd line");
        assert!(matches!(
            &events[..],
            [Event::Error { severity: Severity::Note, .. }]
        ));
    }
}
