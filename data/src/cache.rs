//! On-disk state shared with the next run: the focused buffer, the
//! instant the client last closed, and per-buffer read markers. The
//! formats are fixed; other tooling reads them too.

use std::collections::HashMap;
use std::io;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};

/// Separator between network id and title in the unread-map keys.
const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBuffer {
    pub net_id: String,
    pub title: String,
}

/// Single line `<netID> <title>`.
pub fn load_last_buffer(path: &Path) -> Option<LastBuffer> {
    let content = std::fs::read_to_string(path).ok()?;
    let line = content.lines().next()?;
    let (net_id, title) = line.split_once(' ')?;

    Some(LastBuffer {
        net_id: net_id.to_string(),
        title: title.to_string(),
    })
}

pub fn save_last_buffer(path: &Path, last: &LastBuffer) -> io::Result<()> {
    std::fs::write(path, format!("{} {}\n", last.net_id, last.title))
}

/// RFC 3339 with nanoseconds.
pub fn load_last_close(path: &Path) -> Option<DateTime<Utc>> {
    let content = std::fs::read_to_string(path).ok()?;
    DateTime::parse_from_rfc3339(content.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

pub fn save_last_close(path: &Path, at: DateTime<Utc>) -> io::Result<()> {
    std::fs::write(path, at.to_rfc3339_opts(SecondsFormat::Nanos, true))
}

/// JSON object keyed `netID<US>title`, values RFC 3339 read markers.
pub fn load_unread(path: &Path) -> HashMap<(String, String), DateTime<Utc>> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return HashMap::new();
    };
    let Ok(raw) = serde_json::from_str::<HashMap<String, String>>(&content) else {
        return HashMap::new();
    };

    raw.into_iter()
        .filter_map(|(key, value)| {
            let (net_id, title) = key.split_once(KEY_SEPARATOR)?;
            let at = DateTime::parse_from_rfc3339(&value).ok()?;
            Some((
                (net_id.to_string(), title.to_string()),
                at.with_timezone(&Utc),
            ))
        })
        .collect()
}

pub fn save_unread(
    path: &Path,
    unread: &HashMap<(String, String), DateTime<Utc>>,
) -> io::Result<()> {
    let raw: HashMap<String, String> = unread
        .iter()
        .map(|((net_id, title), at)| {
            (
                format!("{net_id}{KEY_SEPARATOR}{title}"),
                at.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )
        })
        .collect();

    let json = serde_json::to_string(&raw).map_err(io::Error::other)?;
    std::fs::write(path, json)
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn unread_round_trip() {
        let dir = std::env::temp_dir().join("tern-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("unread.json");

        let mut unread = HashMap::new();
        unread.insert(
            ("44".to_string(), "#rust".to_string()),
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
        );

        save_unread(&path, &unread).unwrap();
        assert_eq!(load_unread(&path), unread);

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("44\u{1f}#rust"));
    }

    #[test]
    fn last_buffer_round_trip() {
        let dir = std::env::temp_dir().join("tern-cache-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("lastbuffer.txt");

        let last = LastBuffer {
            net_id: "44".into(),
            title: "#rust".into(),
        };
        save_last_buffer(&path, &last).unwrap();
        assert_eq!(load_last_buffer(&path), Some(last));

        // The home buffer has an empty title
        let home = LastBuffer {
            net_id: "44".into(),
            title: String::new(),
        };
        save_last_buffer(&path, &home).unwrap();
        assert_eq!(load_last_buffer(&path), Some(home));
    }

    #[test]
    fn missing_files_are_tolerated() {
        let path = Path::new("/nonexistent/tern/cache");
        assert!(load_last_buffer(path).is_none());
        assert!(load_last_close(path).is_none());
        assert!(load_unread(path).is_empty());
    }
}
