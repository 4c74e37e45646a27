use serde::{Deserialize, Serialize};

/// Key of a private conversation: an unordered pair of usernames stored in
/// canonical (sorted) order, so `(a, b)` and `(b, a)` are the same key.
///
/// On disk it is the two-element array `[first, second]`; decoding goes
/// through [`PairKey::new`] so a hand-edited snapshot is normalized too.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "[String; 2]", into = "[String; 2]")]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(a: impl Into<String>, b: impl Into<String>) -> Self {
        let (a, b) = (a.into(), b.into());
        if a <= b {
            PairKey { first: a, second: b }
        } else {
            PairKey { first: b, second: a }
        }
    }

    pub fn users(&self) -> (&str, &str) {
        (&self.first, &self.second)
    }

    pub fn contains(&self, user: &str) -> bool {
        self.first == user || self.second == user
    }

    /// The participant that is not `user`. For a self-conversation that is
    /// `user` again.
    pub fn other(&self, user: &str) -> Option<&str> {
        if self.first == user {
            Some(&self.second)
        } else if self.second == user {
            Some(&self.first)
        } else {
            None
        }
    }
}

impl From<[String; 2]> for PairKey {
    fn from([a, b]: [String; 2]) -> Self {
        PairKey::new(a, b)
    }
}

impl From<PairKey> for [String; 2] {
    fn from(key: PairKey) -> Self {
        [key.first, key.second]
    }
}
