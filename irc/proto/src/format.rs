use std::fmt::Write;

use itertools::Itertools;

use crate::{Command, Message, Tags};

/// Most IRC servers limit messages to 512 bytes including the CR-LF.
pub const BYTE_LIMIT: usize = 512;

pub fn message(message: Message) -> String {
    let mut output = String::with_capacity(BYTE_LIMIT);

    let tags = tags(message.tags);

    if !tags.is_empty() {
        let _ = write!(&mut output, "@{tags} ");
    }

    if let Command::Raw(raw) = &message.command {
        let _ = write!(&mut output, "{raw}");
    } else {
        let command = message.command.command();
        let params = parameters(message.command.parameters());

        let _ = write!(&mut output, "{command} {params}");
    }

    let _ = write!(&mut output, "\r\n");

    output
}

fn tags(tags: Tags) -> String {
    tags.into_iter().map(tag).join(";")
}

fn tag((key, value): (String, String)) -> String {
    if value.is_empty() {
        return key;
    }

    let mappings = [
        ('\\', r"\\"),
        (';', r"\:"),
        (' ', r"\s"),
        ('\r', r"\r"),
        ('\n', r"\n"),
    ];

    let escaped = mappings
        .into_iter()
        .fold(value, |value, (from, to)| value.replace(from, to));

    format!("{key}={escaped}")
}

fn parameters(parameters: Vec<String>) -> String {
    let last = parameters.len().saturating_sub(1);
    parameters
        .into_iter()
        .enumerate()
        .map(|(index, param)| {
            if index == last {
                trailing(param)
            } else {
                param
            }
        })
        .join(" ")
}

fn trailing(parameter: String) -> String {
    if parameter.contains(' ') || parameter.is_empty() || parameter.starts_with(':') {
        format!(":{parameter}")
    } else {
        parameter
    }
}

#[cfg(test)]
mod test {
    use crate::{command, format, parse, tags};

    #[test]
    fn commands() {
        let tests = [
            command!("CAP", "LS", "302"),
            command!("privmsg", "#a", "nospace"),
            command!("privmsg", "b", "spa ces"),
            command!("quit", "nocolon"),
            command!("quit", ":startscolon"),
            command!("quit", "not:starting"),
            command!("quit", "not:starting space"),
            command!("notice", "target", ""),
            command!("USER", "test", "test"),
        ];
        let expected = [
            "CAP LS 302\r\n",
            "PRIVMSG #a nospace\r\n",
            "PRIVMSG b :spa ces\r\n",
            "QUIT nocolon\r\n",
            "QUIT ::startscolon\r\n",
            "QUIT not:starting\r\n",
            "QUIT :not:starting space\r\n",
            "NOTICE target :\r\n",
            "USER test 0 * test\r\n",
        ];

        for (test, expected) in tests.into_iter().zip(expected) {
            let formatted = format::message(test);
            assert_eq!(formatted, expected);
        }
    }

    #[test]
    fn tag_escaping() {
        let test = tags![
            "tag" => "as\\; \r\n",
            "id" => "234AB",
            "flag" => "",
        ];
        let expected = r"flag;id=234AB;tag=as\\\:\s\r\n";

        let tags = super::tags(test);
        assert_eq!(tags, expected);
    }

    // Emission drops the source and the optional trailing `:` marker, so
    // the round trip is checked on tags and command rather than bytes.
    #[test]
    fn round_trip() {
        let tests = [
            "@id=234AB :dan!d@localhost PRIVMSG #chan :Hey what's up! \r\n",
            "CAP REQ :sasl\r\n",
            "@time=2024-11-07T12:04:28.361Z PRIVMSG #chan :hello there\r\n",
            "@tag=as\\\\\\:\\svalue TAGMSG #chan\r\n",
            "AUTHENTICATE +\r\n",
            "BATCH +yXNAbvnRHTRBv chathistory #chan\r\n",
        ];

        for test in tests {
            let message = parse::message(test).unwrap();
            let reparsed = parse::message(&format::message(message.clone())).unwrap();

            assert_eq!(reparsed.tags, message.tags);
            assert_eq!(reparsed.command, message.command);
        }
    }
}
