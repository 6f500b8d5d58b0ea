//! Output comparison.

use serde::{Deserialize, Serialize};

/// How captured output is compared against a quiz target.
///
/// Case is significant in every mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMatch {
    /// `\r\n` becomes `\n`, trailing whitespace of every line and trailing
    /// empty lines are ignored.
    #[default]
    TrimTrailing,
    /// Byte-for-byte.
    Exact,
}

impl OutputMatch {
    pub fn normalize(self, text: &str) -> String {
        match self {
            OutputMatch::Exact => text.to_string(),
            OutputMatch::TrimTrailing => {
                let unified = text.replace("\r\n", "\n");
                let mut lines: Vec<&str> = unified.split('\n').map(str::trim_end).collect();
                while lines.last().is_some_and(|line| line.is_empty()) {
                    lines.pop();
                }
                lines.join("\n")
            }
        }
    }

    pub fn matches(self, output: &str, target: &str) -> bool {
        self.normalize(output) == self.normalize(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_trailing_ignores_line_endings() {
        let mode = OutputMatch::TrimTrailing;
        assert!(mode.matches("a\r\nb\r\n", "a\nb"));
        assert!(mode.matches("a  \nb\t\n\n\n", "a\nb"));
        assert_eq!(mode.normalize("x \n\n"), "x");
    }

    #[test]
    fn test_leading_whitespace_is_significant() {
        assert!(!OutputMatch::TrimTrailing.matches(" a", "a"));
        assert!(!OutputMatch::TrimTrailing.matches("a\n\nb", "a\nb"));
    }

    #[test]
    fn test_case_is_significant() {
        assert!(!OutputMatch::TrimTrailing.matches("Hello", "hello"));
        assert!(!OutputMatch::Exact.matches("Hello", "hello"));
    }

    #[test]
    fn test_exact_compares_bytes() {
        assert!(OutputMatch::Exact.matches("5", "5"));
        assert!(!OutputMatch::Exact.matches("5\n", "5"));
        assert!(!OutputMatch::Exact.matches("a\r\nb", "a\nb"));
    }

    #[test]
    fn test_empty_output() {
        assert!(OutputMatch::TrimTrailing.matches("", "\n"));
        assert_eq!(OutputMatch::TrimTrailing.normalize(""), "");
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::to_string(&OutputMatch::TrimTrailing).unwrap(),
            "\"trim_trailing\""
        );
        let mode: OutputMatch = serde_json::from_str("\"exact\"").unwrap();
        assert_eq!(mode, OutputMatch::Exact);
    }
}
