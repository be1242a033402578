//! Token usage accounting and cost estimation.
//!
//! The recognition service bills per million input and output tokens. A
//! [`UsageTotals`] value is owned by one batch run and threaded through its
//! loop; nothing here is global, so several runs in one process never share
//! counters.

use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Tokens consumed and produced by one processed item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl UsageRecord {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// Sum of two records.
    pub fn merge(self, other: UsageRecord) -> UsageRecord {
        UsageRecord {
            input_tokens: self.input_tokens + other.input_tokens,
            output_tokens: self.output_tokens + other.output_tokens,
        }
    }
}

impl Add for UsageRecord {
    type Output = UsageRecord;

    fn add(self, rhs: UsageRecord) -> UsageRecord {
        self.merge(rhs)
    }
}

/// Running sum of [`UsageRecord`]s across one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageTotals {
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Number of records folded in so far.
    pub records: usize,
}

impl UsageTotals {
    pub fn record(&mut self, usage: UsageRecord) {
        self.input_tokens += usage.input_tokens;
        self.output_tokens += usage.output_tokens;
        self.records += 1;
    }

    /// The totals viewed as a single record, for pricing.
    pub fn as_record(&self) -> UsageRecord {
        UsageRecord::new(self.input_tokens, self.output_tokens)
    }
}

impl AddAssign<UsageRecord> for UsageTotals {
    fn add_assign(&mut self, rhs: UsageRecord) {
        self.record(rhs);
    }
}

/// Per-million-token prices in USD.
///
/// The default matches `gpt-4.1-nano` ($0.10 in / $0.40 out), the default
/// model. Override both when switching models:
///
/// | Model | Input $/1M | Output $/1M |
/// |-------|-----------:|------------:|
/// | `gpt-4.1-nano` | 0.10 | 0.40 |
/// | `gpt-4.1-mini` | 0.40 | 1.60 |
/// | `gpt-4.1`      | 2.00 | 8.00 |
/// | `claude-sonnet-4-20250514` | 3.00 | 15.00 |
/// | `gemini-2.0-flash` | 0.10 | 0.40 |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UsageRates {
    pub input_per_million: f64,
    pub output_per_million: f64,
}

impl Default for UsageRates {
    fn default() -> Self {
        Self {
            input_per_million: 0.10,
            output_per_million: 0.40,
        }
    }
}

impl UsageRates {
    pub fn new(input_per_million: f64, output_per_million: f64) -> Self {
        Self {
            input_per_million,
            output_per_million,
        }
    }

    /// Estimated cost in USD: `in/1e6 × in_rate + out/1e6 × out_rate`.
    pub fn cost(&self, usage: UsageRecord) -> f64 {
        (usage.input_tokens as f64 / 1e6) * self.input_per_million
            + (usage.output_tokens as f64 / 1e6) * self.output_per_million
    }

    pub fn cost_of_totals(&self, totals: &UsageTotals) -> f64 {
        self.cost(totals.as_record())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rates_price_a_million_of_each() {
        let rates = UsageRates::default();
        let cost = rates.cost(UsageRecord::new(1_000_000, 1_000_000));
        assert!((cost - 0.50).abs() < 1e-12, "got {cost}");
    }

    #[test]
    fn zero_usage_is_free() {
        assert_eq!(UsageRates::new(3.0, 15.0).cost(UsageRecord::default()), 0.0);
    }

    #[test]
    fn cost_is_additive() {
        let rates = UsageRates::new(3.0, 15.0);
        let samples = [
            (0u64, 0u64),
            (1, 0),
            (1_532, 811),
            (250_000, 3),
            (7, 999_999),
            (12_345_678, 4_321),
        ];
        for &(ai, ao) in &samples {
            for &(bi, bo) in &samples {
                let a = UsageRecord::new(ai, ao);
                let b = UsageRecord::new(bi, bo);
                let separate = rates.cost(a) + rates.cost(b);
                let merged = rates.cost(a.merge(b));
                assert!(
                    (separate - merged).abs() <= 1e-9 * merged.max(1.0),
                    "{a:?} + {b:?}: {separate} != {merged}"
                );
            }
        }
    }

    #[test]
    fn totals_accumulate_in_order() {
        let mut totals = UsageTotals::default();
        totals.record(UsageRecord::new(100, 10));
        totals += UsageRecord::new(50, 5);
        assert_eq!(totals.input_tokens, 150);
        assert_eq!(totals.output_tokens, 15);
        assert_eq!(totals.records, 2);
        assert_eq!(totals.as_record(), UsageRecord::new(100, 10) + UsageRecord::new(50, 5));
    }
}
