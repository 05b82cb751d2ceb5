//! Statistical mode with an explicit tie-break policy.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// How to choose between values with equal counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    /// The value that appeared first in input order wins.
    #[default]
    FirstSeen,
    /// The lexicographically smallest value wins.
    Lexicographic,
}

/// Occurrence counter that remembers first-seen order.
#[derive(Debug, Clone, Default)]
pub struct ModeCounter {
    counts: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl ModeCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: &str) {
        match self.index.get(value) {
            Some(&slot) => self.counts[slot].1 += 1,
            None => {
                self.index.insert(value.to_string(), self.counts.len());
                self.counts.push((value.to_string(), 1));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn count(&self, value: &str) -> u64 {
        self.index.get(value).map(|&slot| self.counts[slot].1).unwrap_or(0)
    }

    /// Most frequent value, `None` for an empty group.
    pub fn mode(&self, tie_break: TieBreak) -> Option<&str> {
        let mut best: Option<&(String, u64)> = None;
        for entry in &self.counts {
            let better = match best {
                None => true,
                Some(current) => {
                    entry.1 > current.1
                        || (entry.1 == current.1
                            && tie_break == TieBreak::Lexicographic
                            && entry.0 < current.0)
                }
            };
            if better {
                best = Some(entry);
            }
        }
        best.map(|(value, _)| value.as_str())
    }
}

impl<'a> FromIterator<&'a str> for ModeCounter {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut counter = Self::new();
        for value in iter {
            counter.push(value);
        }
        counter
    }
}
