//! Token-usage accounting. Store-what-was-given records; the caller decides
//! what counts as a day key and which token numbers to report.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Usage for a single day.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Accumulated token usage across all works.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStats {
    pub total_input_tokens: u64,
    pub total_output_tokens: u64,
    /// Per-day usage, keyed by a caller-chosen date string (e.g. "2026-08-04").
    #[serde(default)]
    pub daily: BTreeMap<String, DayUsage>,
}

impl UsageStats {
    /// Add one request's token counts under the given day key.
    pub fn record(&mut self, day: &str, input_tokens: u64, output_tokens: u64) {
        self.total_input_tokens += input_tokens;
        self.total_output_tokens += output_tokens;
        let day_usage = self.daily.entry(day.to_string()).or_default();
        day_usage.input_tokens += input_tokens;
        day_usage.output_tokens += output_tokens;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates() {
        let mut stats = UsageStats::default();
        stats.record("2026-08-04", 100, 50);
        stats.record("2026-08-04", 10, 5);
        stats.record("2026-08-05", 1, 1);

        assert_eq!(stats.total_input_tokens, 111);
        assert_eq!(stats.total_output_tokens, 56);
        assert_eq!(stats.daily["2026-08-04"].input_tokens, 110);
        assert_eq!(stats.daily["2026-08-05"].output_tokens, 1);
    }
}
