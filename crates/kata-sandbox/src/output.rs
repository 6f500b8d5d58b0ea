//! Captured program output.

use serde::{Deserialize, Serialize};

use kata_types::abi;

/// The console stream an event was written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stream {
    Log,
    Info,
    Warn,
    Error,
    Debug,
}

impl Stream {
    /// Decode the stream code passed to `con_flush`.
    pub fn from_code(code: i32) -> Option<Stream> {
        Some(match code {
            abi::STREAM_LOG => Stream::Log,
            abi::STREAM_INFO => Stream::Info,
            abi::STREAM_WARN => Stream::Warn,
            abi::STREAM_ERROR => Stream::Error,
            abi::STREAM_DEBUG => Stream::Debug,
            _ => return None,
        })
    }
}

/// One line of output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputEvent {
    pub stream: Stream,
    pub text: String,
}

/// Everything one run printed, in call order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub events: Vec<OutputEvent>,
}

impl CapturedOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stream: Stream, text: impl Into<String>) {
        self.events.push(OutputEvent {
            stream,
            text: text.into(),
        });
    }

    /// All events joined with `\n`, the form compared against a target.
    pub fn text(&self) -> String {
        self.events
            .iter()
            .map(|e| e.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OutputEvent> {
        self.events.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_joins_lines() {
        let mut out = CapturedOutput::new();
        out.push(Stream::Log, "a");
        out.push(Stream::Error, "b");
        out.push(Stream::Log, "");
        assert_eq!(out.text(), "a\nb\n");
        assert_eq!(out.len(), 3);
    }

    #[test]
    fn test_stream_codes() {
        assert_eq!(Stream::from_code(abi::STREAM_WARN), Some(Stream::Warn));
        assert_eq!(Stream::from_code(99), None);
    }
}
