use std::str::FromStr;

use itertools::Itertools;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    Join,
    Part,
    Quit,
    Motd,
    Names,
    Topic,
    Msg,
    Reply,
    Me,
    Np,
    Quote,
    Buffer,
    Nick,
    Oper,
    Mode,
    Invite,
    Kick,
    Ban,
    Unban,
    Search,
    Shrug,
    Tableflip,
    Help,
}

impl FromStr for Kind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "join" | "j" => Ok(Kind::Join),
            "part" => Ok(Kind::Part),
            "quit" => Ok(Kind::Quit),
            "motd" => Ok(Kind::Motd),
            "names" => Ok(Kind::Names),
            "topic" => Ok(Kind::Topic),
            "msg" | "query" | "q" => Ok(Kind::Msg),
            "reply" | "r" => Ok(Kind::Reply),
            "me" => Ok(Kind::Me),
            "np" => Ok(Kind::Np),
            "quote" => Ok(Kind::Quote),
            "buffer" | "b" => Ok(Kind::Buffer),
            "nick" => Ok(Kind::Nick),
            "oper" => Ok(Kind::Oper),
            "mode" => Ok(Kind::Mode),
            "invite" => Ok(Kind::Invite),
            "kick" => Ok(Kind::Kick),
            "ban" => Ok(Kind::Ban),
            "unban" => Ok(Kind::Unban),
            "search" => Ok(Kind::Search),
            "shrug" => Ok(Kind::Shrug),
            "tableflip" => Ok(Kind::Tableflip),
            "help" => Ok(Kind::Help),
            _ => Err(()),
        }
    }
}

/// A parsed `/command` input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// <channels> [keys]
    Join(String, Option<String>),
    /// [channel] [reason]
    Part(Option<String>, Option<String>),
    /// [reason]
    Quit(Option<String>),
    /// [server]
    Motd(Option<String>),
    /// [channel]
    Names(Option<String>),
    /// [new topic]
    Topic(Option<String>),
    /// <target> <text>
    Msg(String, String),
    /// <text>, sent to the last query peer
    Reply(String),
    /// <action text>
    Me(String),
    Np,
    /// <raw line>
    Quote(String),
    /// <index or title substring>
    Buffer(String),
    /// <new nick>
    Nick(String),
    /// <name> <password>
    Oper(String, String),
    /// raw mode arguments
    Mode(Vec<String>),
    /// <nick> [channel]
    Invite(String, Option<String>),
    /// <nick> [comment]
    Kick(String, Option<String>),
    /// <nick or mask>
    Ban(String),
    /// <nick or mask>
    Unban(String),
    /// <text>
    Search(String),
    /// [text]
    Shrug(Option<String>),
    /// [text]
    Tableflip(Option<String>),
    /// [command]
    Help(Option<String>),
}

impl Command {
    /// One help line per command, in display order.
    pub fn help() -> &'static [&'static str] {
        &[
            "/join <channels> [keys]: join channels",
            "/part [channel] [reason]: part a channel",
            "/quit [reason]: disconnect and exit",
            "/motd [server]: show the message of the day",
            "/names [channel]: list channel members",
            "/topic [new topic]: show or set the topic",
            "/msg <target> <text>: send a message",
            "/reply <text>: reply to the last query",
            "/me <text>: send an action",
            "/np: send the current song",
            "/quote <line>: send a raw IRC line",
            "/buffer <index|substring>: jump to a buffer",
            "/nick <nick>: change nickname",
            "/oper <name> <password>: log in as operator",
            "/mode [args...]: change modes",
            "/invite <nick> [channel]: invite a user",
            "/kick <nick> [comment]: kick a user",
            "/ban <nick|mask>: ban from the channel",
            "/unban <nick|mask>: lift a ban",
            "/search <text>: search server-side history",
            "/shrug [text]: append a shrug",
            "/tableflip [text]: append a tableflip",
            "/help [command]: this help",
        ]
    }
}

impl FromStr for Command {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (head, rest) = s.split_once('/').ok_or(Error::MissingSlash)?;
        if !head.is_empty() {
            return Err(Error::MissingSlash);
        }

        let mut split = rest.split_ascii_whitespace();

        let cmd = split.next().ok_or(Error::MissingCommand)?;
        let args = split.collect::<Vec<_>>();

        let kind = cmd
            .parse::<Kind>()
            .map_err(|()| Error::UnknownCommand(cmd.to_string()))?;

        match kind {
            Kind::Join => validated::<1, 1, false>(args, |[chanlist], [keys]| {
                Command::Join(chanlist, keys)
            }),
            Kind::Part => validated::<0, 2, true>(args, |_, [channel, reason]| {
                Command::Part(channel, reason)
            }),
            Kind::Quit => validated::<0, 1, true>(args, |_, [reason]| Command::Quit(reason)),
            Kind::Motd => validated::<0, 1, false>(args, |_, [server]| Command::Motd(server)),
            Kind::Names => validated::<0, 1, false>(args, |_, [channel]| Command::Names(channel)),
            Kind::Topic => validated::<0, 1, true>(args, |_, [topic]| Command::Topic(topic)),
            Kind::Msg => validated::<2, 0, true>(args, |[target, text], []| {
                Command::Msg(target, text)
            }),
            Kind::Reply => validated::<1, 0, true>(args, |[text], []| Command::Reply(text)),
            Kind::Me => validated::<1, 0, true>(args, |[text], []| Command::Me(text)),
            Kind::Np => validated::<0, 0, false>(args, |[], []| Command::Np),
            Kind::Quote => validated::<1, 0, true>(args, |[raw], []| Command::Quote(raw)),
            Kind::Buffer => validated::<1, 0, true>(args, |[name], []| Command::Buffer(name)),
            Kind::Nick => validated::<1, 0, false>(args, |[nick], []| Command::Nick(nick)),
            Kind::Oper => validated::<2, 0, false>(args, |[name, password], []| {
                Command::Oper(name, password)
            }),
            Kind::Mode => Ok(Command::Mode(
                args.into_iter().map(String::from).collect(),
            )),
            Kind::Invite => validated::<1, 1, false>(args, |[nick], [channel]| {
                Command::Invite(nick, channel)
            }),
            Kind::Kick => validated::<1, 1, true>(args, |[nick], [comment]| {
                Command::Kick(nick, comment)
            }),
            Kind::Ban => validated::<1, 0, false>(args, |[mask], []| Command::Ban(mask)),
            Kind::Unban => validated::<1, 0, false>(args, |[mask], []| Command::Unban(mask)),
            Kind::Search => validated::<1, 0, true>(args, |[text], []| Command::Search(text)),
            Kind::Shrug => validated::<0, 1, true>(args, |_, [text]| Command::Shrug(text)),
            Kind::Tableflip => {
                validated::<0, 1, true>(args, |_, [text]| Command::Tableflip(text))
            }
            Kind::Help => validated::<0, 1, false>(args, |_, [command]| Command::Help(command)),
        }
    }
}

fn validated<const EXACT: usize, const OPT: usize, const TEXT: bool>(
    args: Vec<&str>,
    f: impl Fn([String; EXACT], [Option<String>; OPT]) -> Command,
) -> Result<Command, Error> {
    let max = EXACT + OPT;

    let args: Vec<String> = if TEXT && args.len() > max.saturating_sub(1) {
        // Everything from the last expected argument on is free text
        args.iter()
            .take(max.saturating_sub(1))
            .map(|s| s.to_string())
            .chain(Some(args.iter().skip(max.saturating_sub(1)).join(" ")))
            .collect()
    } else {
        args.into_iter().map(String::from).collect()
    };

    if args.len() >= EXACT && args.len() <= max {
        let exact = args[0..EXACT].to_vec().try_into().expect("exact count");
        let opt = args[EXACT..args.len()]
            .iter()
            .map(|s| Some(s.clone()))
            .chain((args.len()..max).map(|_| None))
            .collect::<Vec<_>>()
            .try_into()
            .expect("opt count");

        Ok((f)(exact, opt))
    } else {
        Err(Error::IncorrectArgCount {
            min: EXACT,
            max,
            actual: args.len(),
        })
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("{}", fmt_incorrect_arg_count(*min, *max, *actual))]
    IncorrectArgCount {
        min: usize,
        max: usize,
        actual: usize,
    },
    #[error("missing slash")]
    MissingSlash,
    #[error("missing command")]
    MissingCommand,
    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

fn fmt_incorrect_arg_count(min: usize, max: usize, actual: usize) -> String {
    if min == max {
        let s = if min == 1 { "" } else { "s" };
        format!("expected {min} argument{s}, received {actual}")
    } else {
        format!("expected between {min} and {max} arguments, received {actual}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn commands_parse_case_insensitively() {
        assert_eq!(
            "/JOIN #rust".parse::<Command>().unwrap(),
            Command::Join("#rust".into(), None)
        );
        assert_eq!(
            "/msg alice hello there friend".parse::<Command>().unwrap(),
            Command::Msg("alice".into(), "hello there friend".into())
        );
    }

    #[test]
    fn trailing_text_is_joined() {
        assert_eq!(
            "/me waves at everyone".parse::<Command>().unwrap(),
            Command::Me("waves at everyone".into())
        );
        assert_eq!(
            "/quit".parse::<Command>().unwrap(),
            Command::Quit(None)
        );
        assert_eq!(
            "/part #rust see you all later".parse::<Command>().unwrap(),
            Command::Part(Some("#rust".into()), Some("see you all later".into()))
        );
    }

    #[test]
    fn arity_errors() {
        assert_eq!(
            "/msg alice".parse::<Command>().unwrap_err(),
            Error::IncorrectArgCount {
                min: 2,
                max: 2,
                actual: 1
            }
        );
        assert!(matches!(
            "/frobnicate".parse::<Command>().unwrap_err(),
            Error::UnknownCommand(_)
        ));
    }

    #[test]
    fn mode_takes_raw_args() {
        assert_eq!(
            "/mode #rust +o alice".parse::<Command>().unwrap(),
            Command::Mode(vec!["#rust".into(), "+o".into(), "alice".into()])
        );
    }
}
