use crate::resolver::MAX_OPTIONS;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const MIN_OPTIONS: usize = 2;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionCount {
    /// Distinct voters whose first accepted vote in the window was this option.
    pub single: u32,
    /// Every accepted vote for this option, repeats included.
    pub multi: u32,
}

/// Which count drives totals and ratios.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountMode {
    #[default]
    EveryVote,
    OncePerVoter,
}

impl CountMode {
    pub fn toggle(self) -> Self {
        match self {
            CountMode::EveryVote => CountMode::OncePerVoter,
            CountMode::OncePerVoter => CountMode::EveryVote,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    #[default]
    Index,
    Text,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayMode {
    Number,
    #[default]
    Ratio,
}

#[derive(Debug, Clone)]
pub struct Tally {
    counts: [OptionCount; MAX_OPTIONS],
    voters: HashSet<String>,
    option_count: usize,
}

impl Tally {
    pub fn new(option_count: usize) -> Self {
        Self {
            counts: [OptionCount::default(); MAX_OPTIONS],
            voters: HashSet::new(),
            option_count: option_count.clamp(MIN_OPTIONS, MAX_OPTIONS),
        }
    }

    pub fn option_count(&self) -> usize {
        self.option_count
    }

    /// Changes how many options are in play. Counts for options outside the
    /// new range are kept but no longer contribute to totals.
    pub fn set_option_count(&mut self, option_count: usize) {
        self.option_count = option_count.clamp(MIN_OPTIONS, MAX_OPTIONS);
    }

    /// Records one accepted vote. Returns `false` if the index is outside storage.
    pub fn accumulate(&mut self, option: usize, voter_id: &str) -> bool {
        let Some(count) = self.counts.get_mut(option) else {
            return false;
        };
        if !self.voters.contains(voter_id) {
            self.voters.insert(voter_id.to_string());
            count.single += 1;
        }
        count.multi += 1;
        true
    }

    pub fn reset(&mut self) {
        self.counts = [OptionCount::default(); MAX_OPTIONS];
        self.voters.clear();
    }

    pub fn counts(&self) -> &[OptionCount; MAX_OPTIONS] {
        &self.counts
    }

    pub fn voter_count(&self) -> usize {
        self.voters.len()
    }

    pub fn snapshot(&self, mode: CountMode) -> TallySnapshot {
        let in_play = &self.counts[..self.option_count];
        let single_total: u32 = in_play.iter().map(|c| c.single).sum();
        let multi_total: u32 = in_play.iter().map(|c| c.multi).sum();
        let total = match mode {
            CountMode::EveryVote => multi_total,
            CountMode::OncePerVoter => single_total,
        };

        let options = in_play
            .iter()
            .enumerate()
            .map(|(index, c)| {
                let count = match mode {
                    CountMode::EveryVote => c.multi,
                    CountMode::OncePerVoter => c.single,
                };
                OptionSnapshot {
                    index,
                    single: c.single,
                    multi: c.multi,
                    ratio: ratio(count, total),
                }
            })
            .collect();

        TallySnapshot {
            mode,
            options,
            single_total,
            multi_total,
        }
    }
}

impl Default for Tally {
    fn default() -> Self {
        Self::new(4)
    }
}

fn ratio(count: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptionSnapshot {
    pub index: usize,
    pub single: u32,
    pub multi: u32,
    pub ratio: f64,
}

impl OptionSnapshot {
    pub fn count(&self, mode: CountMode) -> u32 {
        match mode {
            CountMode::EveryVote => self.multi,
            CountMode::OncePerVoter => self.single,
        }
    }
}

/// Read-only view of a tally restricted to the options in play.
#[derive(Debug, Clone, PartialEq)]
pub struct TallySnapshot {
    pub mode: CountMode,
    pub options: Vec<OptionSnapshot>,
    pub single_total: u32,
    pub multi_total: u32,
}

impl TallySnapshot {
    pub fn total(&self) -> u32 {
        match self.mode {
            CountMode::EveryVote => self.multi_total,
            CountMode::OncePerVoter => self.single_total,
        }
    }

    pub fn ratios(&self) -> Vec<f64> {
        self.options.iter().map(|o| o.ratio).collect()
    }

    /// Two-line label for one option: `[name]` then the count or percentage.
    pub fn label(&self, option: usize, label_mode: LabelMode, display: DisplayMode, texts: &[String]) -> String {
        let Some(o) = self.options.get(option) else {
            return String::new();
        };
        let name = match label_mode {
            LabelMode::Index => (o.index + 1).to_string(),
            LabelMode::Text => texts
                .get(o.index)
                .filter(|t| !t.is_empty())
                .cloned()
                .unwrap_or_else(|| (o.index + 1).to_string()),
        };
        let value = match display {
            DisplayMode::Number => o.count(self.mode).to_string(),
            DisplayMode::Ratio => format!("{:.0}%", o.ratio * 100.0),
        };
        format!("[{}]\n{}", name, value)
    }
}
