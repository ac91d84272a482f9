use crate::isupport::{ChanModes, PrefixMap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Add(char, Option<String>),
    Remove(char, Option<String>),
}

impl Mode {
    pub fn letter(&self) -> char {
        match self {
            Mode::Add(letter, _) | Mode::Remove(letter, _) => *letter,
        }
    }

    pub fn arg(&self) -> Option<&str> {
        match self {
            Mode::Add(_, arg) | Mode::Remove(_, arg) => arg.as_deref(),
        }
    }
}

/// Parses a channel modestring against the server's CHANMODES classes and
/// PREFIX modes.
///
/// List (A) and argument (B) modes always consume an argument, C modes
/// only when added, D modes never; membership prefix modes always do.
pub fn parse(
    modestring: &str,
    args: &[String],
    chanmodes: &ChanModes,
    prefix: &[PrefixMap],
) -> Vec<Mode> {
    let mut args = args.iter();
    let mut adding = true;
    let mut parsed = vec![];

    for c in modestring.chars() {
        match c {
            '+' => adding = true,
            '-' => adding = false,
            letter => {
                let takes_arg = chanmodes.list.contains(letter)
                    || chanmodes.arg_always.contains(letter)
                    || (adding && chanmodes.arg_when_set.contains(letter))
                    || prefix.iter().any(|map| map.mode == letter);

                let arg = if takes_arg { args.next().cloned() } else { None };

                parsed.push(if adding {
                    Mode::Add(letter, arg)
                } else {
                    Mode::Remove(letter, arg)
                });
            }
        }
    }

    parsed
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::isupport::FeatureMap;

    fn features() -> FeatureMap {
        let mut features = FeatureMap::default();
        features.apply(["CHANMODES=beI,k,l,imnpst", "PREFIX=(ov)@+"]);
        features
    }

    #[test]
    fn class_argument_rules() {
        let features = features();
        let chanmodes = features.chanmodes();
        let prefix = features.prefix();

        // +l takes an argument when set...
        let modes = parse("+l", &["50".into()], &chanmodes, &prefix);
        assert_eq!(modes, vec![Mode::Add('l', Some("50".into()))]);

        // ...but not when unset
        let modes = parse("-l+i", &[], &chanmodes, &prefix);
        assert_eq!(modes, vec![Mode::Remove('l', None), Mode::Add('i', None)]);

        // List modes always consume
        let modes = parse("-b", &["*!*@host".into()], &chanmodes, &prefix);
        assert_eq!(modes, vec![Mode::Remove('b', Some("*!*@host".into()))]);
    }

    #[test]
    fn prefix_modes_consume_nicks() {
        let features = features();
        let modes = parse(
            "+ov-v",
            &["alice".into(), "bob".into(), "carol".into()],
            &features.chanmodes(),
            &features.prefix(),
        );

        assert_eq!(
            modes,
            vec![
                Mode::Add('o', Some("alice".into())),
                Mode::Add('v', Some("bob".into())),
                Mode::Remove('v', Some("carol".into())),
            ]
        );
    }

    #[test]
    fn mixed_directions_preserve_order() {
        let features = features();
        let modes = parse("+nt-s", &[], &features.chanmodes(), &features.prefix());

        assert_eq!(
            modes,
            vec![
                Mode::Add('n', None),
                Mode::Add('t', None),
                Mode::Remove('s', None),
            ]
        );
    }
}
