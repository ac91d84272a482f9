#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /* Connection registration */
    /// [*] <subcommand> [*] [<params>]
    CAP(Option<String>, String, Option<String>, Option<String>),
    /// <data>
    AUTHENTICATE(String),
    /// <password>
    PASS(String),
    /// <nickname>
    NICK(String),
    /// <username> <realname>
    USER(String, String),
    /// <token>
    PING(String),
    /// [<server>] <token>
    PONG(String, Option<String>),
    /// <name> <password>
    OPER(String, String),
    /// [<reason>]
    QUIT(Option<String>),
    /// <reason>
    ERROR(String),

    /* Channel operations */
    /// <channel>{,<channel>} [<keys>] (send)
    /// <channel> [<accountname>] (receive, extended-join)
    JOIN(String, Option<String>),
    /// <channel>{,<channel>} [<reason>]
    PART(String, Option<String>),
    /// <channel> [<topic>]
    TOPIC(String, Option<String>),
    /// <channel>{,<channel>}
    NAMES(String),
    /// <nickname> <channel>
    INVITE(String, String),
    /// <channel> <user> [<comment>]
    KICK(String, String, Option<String>),
    /// [<target>]
    MOTD(Option<String>),
    /// <target> [<modestring>] [<mode arguments>...]
    MODE(String, Option<String>, Vec<String>),

    /* Messages */
    /// <target> <text>
    PRIVMSG(String, String),
    /// <target> <text>
    NOTICE(String, String),
    /// <target>
    TAGMSG(String),

    /* Queries */
    /// <mask>
    WHO(String),
    /// [<text>]
    AWAY(Option<String>),

    /* IRCv3 extensions */
    /// <accountname>
    ACCOUNT(String),
    /// <realname>
    SETNAME(String),
    /// [+/-]<reference> [<type> [<params>...]]
    BATCH(String, Vec<String>),
    /// <subcommand> <params>...
    CHATHISTORY(String, Vec<String>),
    /// <target> [timestamp=<timestamp>]
    MARKREAD(String, Option<String>),
    /// <subcommand> [<targets>]
    MONITOR(String, Option<String>),
    /// <subcommand> <params>... (soju.im/bouncer-networks)
    BOUNCER(String, Vec<String>),

    /* Standard replies */
    /// <command> <code> [<context>...] <description>
    FAIL(String, String, Vec<String>, String),
    /// <command> <code> [<context>...] <description>
    WARN(String, String, Vec<String>, String),
    /// <command> <code> [<context>...] <description>
    NOTE(String, String, Vec<String>, String),

    Numeric(Numeric, Vec<String>),
    Unknown(String, Vec<String>),
    Raw(String),
}

impl Command {
    /// Builds a typed command from a wire token and its parameters.
    ///
    /// Known commands whose parameter count falls below the documented
    /// minimum degrade to [`Command::Unknown`] rather than erroring, so a
    /// malformed line never aborts the read loop.
    pub fn new(tag: &str, parameters: Vec<String>) -> Self {
        use Command::*;

        if let Ok(num) = tag.parse::<u16>() {
            return match crate::command::Numeric::try_from(num) {
                Ok(numeric) => Numeric(numeric, parameters),
                Err(()) => Unknown(format!("{num:03}"), parameters),
            };
        }

        let tag = tag.to_uppercase();
        let len = parameters.len();

        let mut params = parameters.into_iter();

        macro_rules! req {
            () => {
                params.next().unwrap()
            };
        }
        macro_rules! opt {
            () => {
                params.next()
            };
        }

        match tag.as_str() {
            "CAP" if len > 0 => {
                let a = req!();
                match opt!() {
                    Some(b) => CAP(Some(a), b, opt!(), opt!()),
                    None => CAP(None, a, None, None),
                }
            }
            "AUTHENTICATE" if len > 0 => AUTHENTICATE(req!()),
            "PASS" if len > 0 => PASS(req!()),
            "NICK" if len > 0 => NICK(req!()),
            "USER" if len > 1 => {
                let user = req!();
                let real = params.last().unwrap();
                USER(user, real)
            }
            "PING" if len > 0 => PING(req!()),
            "PONG" if len > 0 => PONG(req!(), opt!()),
            "OPER" if len > 1 => OPER(req!(), req!()),
            "QUIT" => QUIT(opt!()),
            "ERROR" if len > 0 => ERROR(req!()),
            "JOIN" if len > 0 => JOIN(req!(), opt!()),
            "PART" if len > 0 => PART(req!(), opt!()),
            "TOPIC" if len > 0 => TOPIC(req!(), opt!()),
            "NAMES" if len > 0 => NAMES(req!()),
            "INVITE" if len > 1 => INVITE(req!(), req!()),
            "KICK" if len > 1 => KICK(req!(), req!(), opt!()),
            "MOTD" => MOTD(opt!()),
            "MODE" if len > 0 => MODE(req!(), opt!(), params.collect()),
            "PRIVMSG" if len > 1 => PRIVMSG(req!(), req!()),
            "NOTICE" if len > 1 => NOTICE(req!(), req!()),
            "TAGMSG" if len > 0 => TAGMSG(req!()),
            "WHO" if len > 0 => WHO(req!()),
            "AWAY" => AWAY(opt!()),
            "ACCOUNT" if len > 0 => ACCOUNT(req!()),
            "SETNAME" if len > 0 => SETNAME(req!()),
            "BATCH" if len > 0 => BATCH(req!(), params.collect()),
            "CHATHISTORY" if len > 0 => CHATHISTORY(req!(), params.collect()),
            "MARKREAD" if len > 0 => MARKREAD(req!(), opt!()),
            "MONITOR" if len > 0 => MONITOR(req!(), opt!()),
            "BOUNCER" if len > 0 => BOUNCER(req!(), params.collect()),
            "FAIL" | "WARN" | "NOTE" if len > 2 => {
                let command = req!();
                let code = req!();
                let mut context: Vec<String> = params.collect();
                let description = context.pop().unwrap();
                match tag.as_str() {
                    "FAIL" => FAIL(command, code, context, description),
                    "WARN" => WARN(command, code, context, description),
                    _ => NOTE(command, code, context, description),
                }
            }
            _ => Unknown(tag, params.collect()),
        }
    }

    pub fn parameters(self) -> Vec<String> {
        use Command::*;

        match self {
            CAP(a, b, c, d) => a.into_iter().chain(Some(b)).chain(c).chain(d).collect(),
            AUTHENTICATE(a) => vec![a],
            PASS(a) => vec![a],
            NICK(a) => vec![a],
            USER(a, b) => vec![a, "0".into(), "*".into(), b],
            PING(a) => vec![a],
            PONG(a, b) => std::iter::once(a).chain(b).collect(),
            OPER(a, b) => vec![a, b],
            QUIT(a) => a.into_iter().collect(),
            ERROR(a) => vec![a],
            JOIN(a, b) => std::iter::once(a).chain(b).collect(),
            PART(a, b) => std::iter::once(a).chain(b).collect(),
            TOPIC(a, b) => std::iter::once(a).chain(b).collect(),
            NAMES(a) => vec![a],
            INVITE(a, b) => vec![a, b],
            KICK(a, b, c) => std::iter::once(a).chain(Some(b)).chain(c).collect(),
            MOTD(a) => a.into_iter().collect(),
            MODE(a, b, args) => std::iter::once(a).chain(b).chain(args).collect(),
            PRIVMSG(a, b) => vec![a, b],
            NOTICE(a, b) => vec![a, b],
            TAGMSG(a) => vec![a],
            WHO(a) => vec![a],
            AWAY(a) => a.into_iter().collect(),
            ACCOUNT(a) => vec![a],
            SETNAME(a) => vec![a],
            BATCH(a, rest) => std::iter::once(a).chain(rest).collect(),
            CHATHISTORY(a, rest) => std::iter::once(a).chain(rest).collect(),
            MARKREAD(a, b) => std::iter::once(a).chain(b).collect(),
            MONITOR(a, b) => std::iter::once(a).chain(b).collect(),
            BOUNCER(a, rest) => std::iter::once(a).chain(rest).collect(),
            FAIL(a, b, c, d) | WARN(a, b, c, d) | NOTE(a, b, c, d) => std::iter::once(a)
                .chain(Some(b))
                .chain(c)
                .chain(Some(d))
                .collect(),
            Numeric(_, params) => params,
            Unknown(_, params) => params,
            Raw(_) => vec![],
        }
    }

    pub fn command(&self) -> String {
        use Command::*;

        match self {
            CAP(..) => "CAP".to_string(),
            AUTHENTICATE(_) => "AUTHENTICATE".to_string(),
            PASS(_) => "PASS".to_string(),
            NICK(_) => "NICK".to_string(),
            USER(..) => "USER".to_string(),
            PING(_) => "PING".to_string(),
            PONG(..) => "PONG".to_string(),
            OPER(..) => "OPER".to_string(),
            QUIT(_) => "QUIT".to_string(),
            ERROR(_) => "ERROR".to_string(),
            JOIN(..) => "JOIN".to_string(),
            PART(..) => "PART".to_string(),
            TOPIC(..) => "TOPIC".to_string(),
            NAMES(_) => "NAMES".to_string(),
            INVITE(..) => "INVITE".to_string(),
            KICK(..) => "KICK".to_string(),
            MOTD(_) => "MOTD".to_string(),
            MODE(..) => "MODE".to_string(),
            PRIVMSG(..) => "PRIVMSG".to_string(),
            NOTICE(..) => "NOTICE".to_string(),
            TAGMSG(_) => "TAGMSG".to_string(),
            WHO(_) => "WHO".to_string(),
            AWAY(_) => "AWAY".to_string(),
            ACCOUNT(_) => "ACCOUNT".to_string(),
            SETNAME(_) => "SETNAME".to_string(),
            BATCH(..) => "BATCH".to_string(),
            CHATHISTORY(..) => "CHATHISTORY".to_string(),
            MARKREAD(..) => "MARKREAD".to_string(),
            MONITOR(..) => "MONITOR".to_string(),
            BOUNCER(..) => "BOUNCER".to_string(),
            FAIL(..) => "FAIL".to_string(),
            WARN(..) => "WARN".to_string(),
            NOTE(..) => "NOTE".to_string(),
            Numeric(numeric, _) => format!("{:03}", *numeric as u16),
            Unknown(tag, _) => tag.clone(),
            Raw(_) => "".to_string(),
        }
    }
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Numeric {
    RPL_WELCOME = 1,
    RPL_YOURHOST = 2,
    RPL_CREATED = 3,
    RPL_MYINFO = 4,
    RPL_ISUPPORT = 5,
    RPL_AWAY = 301,
    RPL_UNAWAY = 305,
    RPL_NOWAWAY = 306,
    RPL_ENDOFWHO = 315,
    RPL_CHANNELMODEIS = 324,
    RPL_NOTOPIC = 331,
    RPL_TOPIC = 332,
    RPL_TOPICWHOTIME = 333,
    RPL_INVITING = 341,
    RPL_WHOREPLY = 352,
    RPL_NAMREPLY = 353,
    RPL_ENDOFNAMES = 366,
    RPL_MOTD = 372,
    RPL_MOTDSTART = 375,
    RPL_ENDOFMOTD = 376,
    ERR_NOSUCHNICK = 401,
    ERR_NOSUCHCHANNEL = 403,
    ERR_CANNOTSENDTOCHAN = 404,
    ERR_UNKNOWNCOMMAND = 421,
    ERR_NOMOTD = 422,
    ERR_NONICKNAMEGIVEN = 431,
    ERR_ERRONEUSNICKNAME = 432,
    ERR_NICKNAMEINUSE = 433,
    ERR_USERNOTINCHANNEL = 441,
    ERR_NOTONCHANNEL = 442,
    ERR_NEEDMOREPARAMS = 461,
    ERR_PASSWDMISMATCH = 464,
    ERR_CHANNELISFULL = 471,
    ERR_UNKNOWNMODE = 472,
    ERR_INVITEONLYCHAN = 473,
    ERR_BANNEDFROMCHAN = 474,
    ERR_BADCHANNELKEY = 475,
    ERR_CHANOPRIVSNEEDED = 482,
    RPL_MONONLINE = 730,
    RPL_MONOFFLINE = 731,
    RPL_MONLIST = 732,
    RPL_ENDOFMONLIST = 733,
    ERR_MONLISTFULL = 734,
    RPL_LOGGEDIN = 900,
    RPL_LOGGEDOUT = 901,
    ERR_NICKLOCKED = 902,
    RPL_SASLSUCCESS = 903,
    ERR_SASLFAIL = 904,
    ERR_SASLTOOLONG = 905,
    ERR_SASLABORTED = 906,
    ERR_SASLALREADY = 907,
    RPL_SASLMECHS = 908,
}

impl Numeric {
    /// Numerics that terminate the SASL exchange without a login.
    pub fn is_sasl_failure(self) -> bool {
        use Numeric::*;

        matches!(
            self,
            ERR_NICKLOCKED
                | ERR_SASLFAIL
                | ERR_SASLTOOLONG
                | ERR_SASLABORTED
                | ERR_SASLALREADY
                | RPL_SASLMECHS
        )
    }
}

impl TryFrom<u16> for Numeric {
    type Error = ();

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        use Numeric::*;

        Ok(match value {
            1 => RPL_WELCOME,
            2 => RPL_YOURHOST,
            3 => RPL_CREATED,
            4 => RPL_MYINFO,
            5 => RPL_ISUPPORT,
            301 => RPL_AWAY,
            305 => RPL_UNAWAY,
            306 => RPL_NOWAWAY,
            315 => RPL_ENDOFWHO,
            324 => RPL_CHANNELMODEIS,
            331 => RPL_NOTOPIC,
            332 => RPL_TOPIC,
            333 => RPL_TOPICWHOTIME,
            341 => RPL_INVITING,
            352 => RPL_WHOREPLY,
            353 => RPL_NAMREPLY,
            366 => RPL_ENDOFNAMES,
            372 => RPL_MOTD,
            375 => RPL_MOTDSTART,
            376 => RPL_ENDOFMOTD,
            401 => ERR_NOSUCHNICK,
            403 => ERR_NOSUCHCHANNEL,
            404 => ERR_CANNOTSENDTOCHAN,
            421 => ERR_UNKNOWNCOMMAND,
            422 => ERR_NOMOTD,
            431 => ERR_NONICKNAMEGIVEN,
            432 => ERR_ERRONEUSNICKNAME,
            433 => ERR_NICKNAMEINUSE,
            441 => ERR_USERNOTINCHANNEL,
            442 => ERR_NOTONCHANNEL,
            461 => ERR_NEEDMOREPARAMS,
            464 => ERR_PASSWDMISMATCH,
            471 => ERR_CHANNELISFULL,
            472 => ERR_UNKNOWNMODE,
            473 => ERR_INVITEONLYCHAN,
            474 => ERR_BANNEDFROMCHAN,
            475 => ERR_BADCHANNELKEY,
            482 => ERR_CHANOPRIVSNEEDED,
            730 => RPL_MONONLINE,
            731 => RPL_MONOFFLINE,
            732 => RPL_MONLIST,
            733 => RPL_ENDOFMONLIST,
            734 => ERR_MONLISTFULL,
            900 => RPL_LOGGEDIN,
            901 => RPL_LOGGEDOUT,
            902 => ERR_NICKLOCKED,
            903 => RPL_SASLSUCCESS,
            904 => ERR_SASLFAIL,
            905 => ERR_SASLTOOLONG,
            906 => ERR_SASLABORTED,
            907 => ERR_SASLALREADY,
            908 => RPL_SASLMECHS,
            _ => return Err(()),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arity_degrades_to_unknown() {
        // PRIVMSG needs a target and a body.
        let command = Command::new("PRIVMSG", vec!["#chan".into()]);
        assert_eq!(
            command,
            Command::Unknown("PRIVMSG".into(), vec!["#chan".into()])
        );

        let command = Command::new("privmsg", vec!["#chan".into(), "hi".into()]);
        assert_eq!(command, Command::PRIVMSG("#chan".into(), "hi".into()));
    }

    #[test]
    fn numeric_parsing() {
        let command = Command::new("001", vec!["bob".into(), "welcome".into()]);
        assert_eq!(
            command,
            Command::Numeric(Numeric::RPL_WELCOME, vec!["bob".into(), "welcome".into()])
        );

        // Unassigned numerics survive as Unknown with their zero padding.
        let command = Command::new("099", vec![]);
        assert_eq!(command, Command::Unknown("099".into(), vec![]));
    }

    #[test]
    fn standard_replies() {
        let command = Command::new(
            "FAIL",
            vec![
                "CHATHISTORY".into(),
                "MESSAGE_ERROR".into(),
                "the_given_target".into(),
                "Messages could not be retrieved".into(),
            ],
        );
        assert_eq!(
            command,
            Command::FAIL(
                "CHATHISTORY".into(),
                "MESSAGE_ERROR".into(),
                vec!["the_given_target".into()],
                "Messages could not be retrieved".into(),
            )
        );
    }
}
