use std::fmt;

/// Unordered pair of usernames identifying a two-party thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConversationPair {
    low: String,
    high: String,
}

impl ConversationPair {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.low == name || self.high == name
    }
}

impl fmt::Display for ConversationPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.low, self.high)
    }
}
