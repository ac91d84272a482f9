use std::string::FromUtf8Error;

use nom::branch::alt;
use nom::bytes::complete::tag;
use nom::character::complete::{alpha1, char, crlf, none_of, one_of, satisfy};
use nom::combinator::{cut, map, opt, peek, recognize, value, verify};
use nom::multi::{many0, many0_count, many1, many1_count, many_m_n, separated_list1};
use nom::sequence::{preceded, terminated, tuple};
use nom::{Finish, IResult};

use crate::{Command, Message, Source, Tags, User};

pub fn message_bytes(bytes: Vec<u8>) -> Result<Message, Error> {
    let input = String::from_utf8(bytes)?;
    message(&input)
}

/// Parses a single IRC message terminated by `\r\n`.
pub fn message(input: &str) -> Result<Message, Error> {
    let mut message = cut(terminated(
        tuple((opt(tags), opt(source), command)),
        // Some servers pad the line or double the \r; eat both
        preceded(
            many0(char(' ')),
            alt((preceded(char('\r'), crlf), crlf)),
        ),
    ));

    message(input)
        .finish()
        .map(|(_, (tags, source, command))| Message {
            tags: tags.unwrap_or_default(),
            source,
            command,
        })
        .map_err(|e| Error::Parse {
            input: input.to_string(),
            nom: e.to_string(),
        })
}

/// Parses a soju-style `key=value;key=value` attribute string
/// (bouncer-networks attributes share the tag escaping rules).
pub fn attributes(input: &str) -> Result<Tags, Error> {
    let mut attributes = cut(terminated(tag_list, nom::combinator::eof));

    attributes(input)
        .finish()
        .map(|(_, tags)| tags)
        .map_err(|e| Error::Parse {
            input: input.to_string(),
            nom: e.to_string(),
        })
}

fn tag_list(input: &str) -> IResult<&str, Tags> {
    let escaped_char = alt((
        value(';', tag(r"\:")),
        value(' ', tag(r"\s")),
        value('\\', tag(r"\\")),
        value('\r', tag(r"\r")),
        value('\n', tag(r"\n")),
        // An invalid escape drops the backslash
        preceded(char('\\'), none_of(r":s\rn ")),
    ));
    // Any escaped character except NUL, CR, LF, ';' and ' '
    let escaped_value = map(
        terminated(
            many1(alt((escaped_char, none_of("\0\r\n;\\ ")))),
            // A trailing lone backslash is dropped
            opt(char('\\')),
        ),
        |value| value.into_iter().collect::<String>(),
    );
    // ['+'] [<vendor> '/'] <letters, digits, hyphens>
    let key = recognize(tuple((
        opt(char('+')),
        opt(terminated(many1_count(none_of("/ ;=")), char('/'))),
        many1_count(satisfy(|c| c.is_ascii_alphanumeric() || c == '-')),
    )));
    // <key> ['=' <escaped value>]
    let entry = map(
        tuple((key, opt(preceded(char('='), escaped_value)))),
        |(key, value): (&str, Option<String>)| {
            (key.to_string(), value.unwrap_or_default())
        },
    );

    map(separated_list1(char(';'), entry), Tags::from_iter)(input)
}

fn tags(input: &str) -> IResult<&str, Tags> {
    // '@' <tags> <SPACE>
    preceded(char('@'), terminated(tag_list, space))(input)
}

fn source(input: &str) -> IResult<&str, Source> {
    let source = alt((
        map(terminated(user, peek(space)), Source::User),
        // Anything that is not a valid user mask is the server
        map(
            terminated(recognize(many1(none_of(" "))), peek(space)),
            |host| Source::Server(host.to_string()),
        ),
    ));
    // ':' <source> <SPACE>
    terminated(preceded(char(':'), source), space)(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    // Any character except NUL, CR, LF, ':' and ' '
    let nospcrlfcl = |input| recognize(many1_count(none_of("\0\r\n: ")))(input);
    // *( ":" / " " / nospcrlfcl )
    let trailing = recognize(many0_count(alt((tag(":"), tag(" "), nospcrlfcl))));
    // nospcrlfcl *( ":" / nospcrlfcl )
    let middle = recognize(tuple((
        nospcrlfcl,
        many0_count(alt((tag(":"), nospcrlfcl))),
    )));
    // *( SPACE middle ) [ SPACE ":" trailing ]
    let parameters = tuple((
        many0(preceded(space, middle)),
        opt(preceded(space, preceded(char(':'), trailing))),
    ));
    // letters / 3-digit numeric
    let command = alt((
        alpha1,
        recognize(many_m_n(3, 3, satisfy(|c| c.is_ascii_digit()))),
    ));

    let (input, (command, (leading, trailing))) = tuple((command, parameters))(input)?;

    let parameters = leading
        .into_iter()
        .chain(trailing)
        .map(String::from)
        .collect();

    Ok((input, Command::new(command, parameters)))
}

fn space(input: &str) -> IResult<&str, ()> {
    map(many1_count(char(' ')), |_| ())(input)
}

fn user(input: &str) -> IResult<&str, User> {
    // Any character except NUL, CR, LF, ' ' and '@'
    let username = recognize(many1_count(none_of("\0\r\n @")));
    let special = |input| one_of("-[]\\`_^{|}*/@")(input);
    let strict_nick = recognize(many1_count(alt((
        satisfy(|c| c.is_ascii_alphanumeric()),
        special,
    ))));
    // Bridges produce nicks like `foo:matrix.org`; only accept ':' and
    // '.' when both occur and a '!' follows, so hostnames don't match
    let expanded_nick = verify(
        recognize(terminated(
            many1_count(alt((
                satisfy(|c| c.is_ascii_alphanumeric()),
                special,
                one_of(":."),
            ))),
            peek(char('!')),
        )),
        |s: &str| s.contains(':') && s.contains('.'),
    );
    let nickname = alt((expanded_nick, strict_nick));
    let hostname = recognize(many1_count(none_of(" ")));

    // <nickname> [ '!' <user> ] [ '@' <host> ]
    map(
        tuple((
            nickname,
            opt(preceded(char('!'), username)),
            opt(preceded(char('@'), hostname)),
        )),
        |(nickname, username, hostname): (&str, Option<&str>, Option<&str>)| User {
            nickname: nickname.to_string(),
            username: username.map(ToString::to_string),
            hostname: hostname.map(ToString::to_string),
        },
    )(input)
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("parsing failed: {:?}", input)]
    Parse { input: String, nom: String },
    #[error("invalid utf-8 encoding")]
    InvalidUtf8(#[from] FromUtf8Error),
}

#[cfg(test)]
mod test {
    use nom::combinator::all_consuming;

    use crate::command::Numeric::*;
    use crate::{tags, Command, Message, Source, User};

    #[test]
    fn user() {
        let tests = [
            "dan!d@localhost",
            "test!test@5555:5555:0:55:5555:5555:5555:5555",
            "[asdf]!~asdf@user/asdf/x-5555555",
        ];

        for test in tests {
            all_consuming(super::user)(test).unwrap();
        }
    }

    #[test]
    fn source() {
        let tests = [
            (
                ":irc.example.com ",
                Source::Server("irc.example.com".into()),
            ),
            (
                ":dan!d@localhost ",
                Source::User(User {
                    nickname: "dan".into(),
                    username: Some("d".into()),
                    hostname: Some("localhost".into()),
                }),
            ),
            (":*.freenode.net ", Source::Server("*.freenode.net".into())),
            (
                ":foo:matrix.org!foo@matrix.org ",
                Source::User(User {
                    nickname: "foo:matrix.org".into(),
                    username: Some("foo".into()),
                    hostname: Some("matrix.org".into()),
                }),
            ),
            (":1.1.1.1 ", Source::Server("1.1.1.1".to_string())),
        ];

        for (test, expected) in tests {
            let (_, source) = super::source(test).unwrap();
            assert_eq!(source, expected);
        }
    }

    #[test]
    fn message() {
        let tests = [
            (
                ":irc.example.com CAP * LS :multi-prefix sasl\r\n",
                Message {
                    tags: tags![],
                    source: Some(Source::Server("irc.example.com".to_string())),
                    command: Command::CAP(
                        Some("*".to_string()),
                        "LS".to_string(),
                        Some("multi-prefix sasl".to_string()),
                        None,
                    ),
                },
            ),
            (
                "@id=234AB :dan!d@localhost PRIVMSG #chan :Hey what's up! \r\n",
                Message {
                    tags: tags!["id" => "234AB"],
                    source: Some(Source::User(User {
                        nickname: "dan".into(),
                        username: Some("d".into()),
                        hostname: Some("localhost".into()),
                    })),
                    command: Command::PRIVMSG("#chan".to_string(), "Hey what's up! ".to_string()),
                },
            ),
            (
                "CAP REQ :sasl\r\n",
                Message {
                    tags: tags![],
                    source: None,
                    command: Command::CAP(Some("REQ".to_string()), "sasl".to_string(), None, None),
                },
            ),
            // Tag escapes, including an invalid escape and a flag tag
            (
                "@tag=as\\\\\\:\\sdf\\z;flag TAGMSG #chan\r\n",
                Message {
                    tags: tags!["tag" => "as\\; dfz", "flag" => ""],
                    source: None,
                    command: Command::TAGMSG("#chan".to_string()),
                },
            ),
            (
                ":atw.hu.quakenet.org 001 test :Welcome to the QuakeNet IRC Network, test\r\n",
                Message {
                    tags: tags![],
                    source: Some(Source::Server("atw.hu.quakenet.org".to_string())),
                    command: Command::Numeric(
                        RPL_WELCOME,
                        vec![
                            "test".to_string(),
                            "Welcome to the QuakeNet IRC Network, test".to_string(),
                        ],
                    ),
                },
            ),
            // Extra \r before the terminator
            (
                "@time=2024-11-07T12:04:28.361Z :foo!~foo@host JOIN #chan * :foo\r\r\n",
                Message {
                    tags: tags!["time" => "2024-11-07T12:04:28.361Z"],
                    source: Some(Source::User(User {
                        nickname: "foo".into(),
                        username: Some("~foo".into()),
                        hostname: Some("host".into()),
                    })),
                    command: Command::JOIN("#chan".to_string(), Some("*".to_string())),
                },
            ),
            // Space between the last parameter and crlf
            (
                ":server.example MODE #test +nt \r\n",
                Message {
                    tags: tags![],
                    source: Some(Source::Server("server.example".to_string())),
                    command: Command::MODE("#test".to_string(), Some("+nt".to_string()), vec![]),
                },
            ),
        ];

        for (test, expected) in tests {
            let message = super::message(test).unwrap();
            assert_eq!(message, expected);
        }
    }

    #[test]
    fn attributes() {
        let attrs = super::attributes("name=Libera.Chat;state=connected").unwrap();
        assert_eq!(attrs, tags!["name" => "Libera.Chat", "state" => "connected"]);

        assert!(super::attributes("name=bad space").is_err());
    }
}
