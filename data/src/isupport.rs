use std::collections::HashMap;

// References:
// - https://defs.ircdocs.horse/defs/isupport.html
// - https://modern.ircdocs.horse/#rplisupport-005

/// ISUPPORT features advertised by the server, keyed by uppercased token.
///
/// Unknown tokens are retained verbatim; typed accessors cover the
/// parameters the client consults.
#[derive(Debug, Clone, Default)]
pub struct FeatureMap {
    raw: HashMap<String, String>,
}

impl FeatureMap {
    /// Applies one RPL_ISUPPORT token list (`KEY=VAL`, `KEY`, `-KEY`).
    pub fn apply<'a>(&mut self, tokens: impl IntoIterator<Item = &'a str>) {
        for token in tokens {
            if token.is_empty() || token == "-" || token == "=" || token == "-=" {
                continue;
            }

            let (negated, token) = match token.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, token),
            };

            let (key, value) = token
                .split_once('=')
                .map_or((token, ""), |(key, value)| (key, value));
            let key = key.to_uppercase();

            if negated {
                self.raw.remove(&key);
            } else {
                self.raw.insert(key, value.to_string());
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.raw.get(key).map(String::as_str)
    }

    pub fn casemap(&self) -> CaseMap {
        match self.get("CASEMAPPING") {
            Some("ascii") => CaseMap::Ascii,
            Some("rfc1459-strict") => CaseMap::Rfc1459Strict,
            // rfc1459 is also the protocol default
            _ => CaseMap::Rfc1459,
        }
    }

    pub fn chantypes(&self) -> Vec<char> {
        match self.get("CHANTYPES") {
            Some(value) if !value.is_empty() => value.chars().collect(),
            _ => proto::DEFAULT_CHANNEL_PREFIXES.to_vec(),
        }
    }

    pub fn chanmodes(&self) -> ChanModes {
        self.get("CHANMODES")
            .and_then(ChanModes::parse)
            .unwrap_or_default()
    }

    /// PREFIX `(modes)prefixes`, in descending order of power.
    pub fn prefix(&self) -> Vec<PrefixMap> {
        let Some(value) = self.get("PREFIX") else {
            return PrefixMap::defaults();
        };

        let Some((modes, prefixes)) = value.split_once(')') else {
            return PrefixMap::defaults();
        };

        let modes = modes.strip_prefix('(').unwrap_or(modes);

        let maps = modes
            .chars()
            .zip(prefixes.chars())
            .map(|(mode, prefix)| PrefixMap { mode, prefix })
            .collect::<Vec<_>>();

        if maps.is_empty() {
            PrefixMap::defaults()
        } else {
            maps
        }
    }

    /// Maximum line length in bytes, CR-LF included.
    pub fn linelen(&self) -> usize {
        self.get("LINELEN")
            .and_then(|value| value.parse().ok())
            .unwrap_or(proto::format::BYTE_LIMIT)
    }

    pub fn network(&self) -> Option<&str> {
        self.get("NETWORK")
    }

    pub fn statusmsg(&self) -> &str {
        self.get("STATUSMSG").unwrap_or("")
    }
}

/// CASEMAPPING equivalence class for nick and channel comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CaseMap {
    Ascii,
    #[default]
    Rfc1459,
    Rfc1459Strict,
}

impl CaseMap {
    pub fn normalize(self, text: &str) -> String {
        text.chars()
            .map(|c| match (self, c) {
                (CaseMap::Ascii, _) => c.to_ascii_lowercase(),
                (_, '[') => '{',
                (_, ']') => '}',
                (_, '\\') => '|',
                (CaseMap::Rfc1459, '~') => '^',
                _ => c.to_ascii_lowercase(),
            })
            .collect()
    }
}

/// CHANMODES classes. A and B modes always carry an argument, C modes
/// only when set, D modes never.
#[derive(Debug, Clone)]
pub struct ChanModes {
    pub list: String,
    pub arg_always: String,
    pub arg_when_set: String,
    pub no_arg: String,
}

impl ChanModes {
    fn parse(value: &str) -> Option<Self> {
        let mut classes = value.split(',');

        Some(Self {
            list: classes.next()?.to_string(),
            arg_always: classes.next()?.to_string(),
            arg_when_set: classes.next()?.to_string(),
            no_arg: classes.next()?.to_string(),
        })
    }
}

impl Default for ChanModes {
    fn default() -> Self {
        Self {
            list: "beI".to_string(),
            arg_always: "k".to_string(),
            arg_when_set: "l".to_string(),
            no_arg: "imnpst".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrefixMap {
    pub mode: char,
    pub prefix: char,
}

impl PrefixMap {
    fn defaults() -> Vec<Self> {
        vec![
            PrefixMap {
                mode: 'o',
                prefix: '@',
            },
            PrefixMap {
                mode: 'v',
                prefix: '+',
            },
        ]
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn apply_and_negate() {
        let mut features = FeatureMap::default();
        features.apply(["NETWORK=Libera.Chat", "CHANTYPES=#", "MONITOR=100"]);

        assert_eq!(features.network(), Some("Libera.Chat"));
        assert_eq!(features.chantypes(), vec!['#']);

        features.apply(["-MONITOR"]);
        assert_eq!(features.get("MONITOR"), None);
    }

    #[test]
    fn casemap_folding() {
        assert_eq!(CaseMap::Rfc1459.normalize("Nick[a]\\~"), "nick{a}|^");
        assert_eq!(CaseMap::Rfc1459Strict.normalize("Nick~"), "nick~");
        assert_eq!(CaseMap::Ascii.normalize("Nick[]"), "nick[]");
    }

    #[test]
    fn prefix_parsing() {
        let mut features = FeatureMap::default();
        features.apply(["PREFIX=(qaohv)~&@%+"]);

        let prefix = features.prefix();
        assert_eq!(prefix.len(), 5);
        assert_eq!(
            prefix[0],
            PrefixMap {
                mode: 'q',
                prefix: '~'
            }
        );
        assert_eq!(
            prefix[4],
            PrefixMap {
                mode: 'v',
                prefix: '+'
            }
        );
    }

    #[test]
    fn chanmodes_classes() {
        let mut features = FeatureMap::default();
        features.apply(["CHANMODES=IXbeg,k,FHJLdfjl,ABCDKMNOPQRSTcimnprstuz"]);

        let chanmodes = features.chanmodes();
        assert_eq!(chanmodes.list, "IXbeg");
        assert_eq!(chanmodes.arg_when_set, "FHJLdfjl");
    }
}
