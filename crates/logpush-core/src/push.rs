//! Parsed push payloads.

use chrono::{DateTime, Utc};

use crate::labels::Labels;

/// A single log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
    /// Per-line key/value metadata that is not part of the stream identity
    pub structured_metadata: Vec<(String, String)>,
}

impl Entry {
    pub fn new(timestamp: DateTime<Utc>, line: impl Into<String>) -> Self {
        Self {
            timestamp,
            line: line.into(),
            structured_metadata: Vec::new(),
        }
    }

    /// Bytes accounted for this entry: the line plus metadata keys and values
    pub fn size(&self) -> usize {
        self.line.len()
            + self
                .structured_metadata
                .iter()
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
    }
}

/// Entries sharing one label set, in push order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub labels: Labels,
    pub entries: Vec<Entry>,
}

impl Stream {
    pub fn new(labels: Labels, entries: Vec<Entry>) -> Self {
        Self { labels, entries }
    }

    pub fn size(&self) -> usize {
        self.entries.iter().map(Entry::size).sum()
    }
}

/// The structured result of parsing one push request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushRequest {
    pub streams: Vec<Stream>,
}

impl PushRequest {
    pub fn entry_count(&self) -> usize {
        self.streams.iter().map(|s| s.entries.len()).sum()
    }

    pub fn size(&self) -> usize {
        self.streams.iter().map(Stream::size).sum()
    }

    /// Label strings of every stream concatenated without separators
    pub fn stream_labels(&self) -> String {
        let mut out = String::new();
        for stream in &self.streams {
            out.push_str(&stream.labels.to_string());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sizes_and_labels() {
        let mut entry = Entry::new(Utc::now(), "hello");
        entry
            .structured_metadata
            .push(("trace_id".to_string(), "abc".to_string()));
        let request = PushRequest {
            streams: vec![
                Stream::new(r#"{app="a"}"#.parse().unwrap(), vec![entry]),
                Stream::new(
                    r#"{app="b"}"#.parse().unwrap(),
                    vec![Entry::new(Utc::now(), "hi")],
                ),
            ],
        };

        assert_eq!(request.entry_count(), 2);
        assert_eq!(request.size(), 5 + 8 + 3 + 2);
        assert_eq!(request.stream_labels(), r#"{app="a"}{app="b"}"#);
    }
}
