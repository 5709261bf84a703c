//! Bundle ordering policies.
//!
//! The pool is parameterised by one of these policies at construction time;
//! the sequence view is kept totally ordered under it for the pool's
//! lifetime. All comparisons are used with a stable sort, so bundles with
//! equal keys keep their insertion order.

use std::cmp::Ordering;
use std::str::FromStr;

use crate::bundle::Bundle;

/// Static builder priority table. Unknown builders score 0.
const BUILDER_PRIORITIES: &[(&str, i32)] = &[("flashbots", 10), ("Titan", 20)];

/// The ordering policy applied to the pool's sequence view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SortPolicy {
    /// Ascending target block number. `block_number` is parsed as a signed
    /// integer (hex with `0x` prefix or decimal); parse failures sort as 0.
    #[default]
    BlockNumber,
    /// Ascending minimum timestamp.
    MinTimestamp,
    /// Descending maximum timestamp.
    MaxTimestamp,
    /// Descending builder priority, the maximum over the bundle's builder
    /// tags in the static table.
    BuilderPriority,
}

impl SortPolicy {
    /// Compare two bundles under this policy.
    pub(crate) fn compare(&self, a: &Bundle, b: &Bundle) -> Ordering {
        match self {
            SortPolicy::BlockNumber => {
                parse_block_number(&a.block_number).cmp(&parse_block_number(&b.block_number))
            }
            SortPolicy::MinTimestamp => a.min_timestamp.cmp(&b.min_timestamp),
            SortPolicy::MaxTimestamp => b.max_timestamp.cmp(&a.max_timestamp),
            SortPolicy::BuilderPriority => {
                builder_priority(&b.builders).cmp(&builder_priority(&a.builders))
            }
        }
    }
}

impl FromStr for SortPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block-number" => Ok(SortPolicy::BlockNumber),
            "min-timestamp" => Ok(SortPolicy::MinTimestamp),
            "max-timestamp" => Ok(SortPolicy::MaxTimestamp),
            "builder-priority" => Ok(SortPolicy::BuilderPriority),
            other => Err(format!(
                "unknown sort policy '{other}' (expected block-number, min-timestamp, \
                 max-timestamp or builder-priority)"
            )),
        }
    }
}

/// Parse a block number the way the wire carries it: `0x`-prefixed hex or
/// plain decimal. Anything unparseable sorts as 0.
fn parse_block_number(s: &str) -> i64 {
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        i64::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        s.parse().unwrap_or(0)
    }
}

/// Highest priority among the bundle's builder tags.
fn builder_priority(builders: &[String]) -> i32 {
    let mut priority = 0;
    for builder in builders {
        for (name, value) in BUILDER_PRIORITIES {
            if builder == name {
                priority = priority.max(*value);
            }
        }
    }
    priority
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_block_number() {
        assert_eq!(parse_block_number("0x10"), 16);
        assert_eq!(parse_block_number("0X10"), 16);
        assert_eq!(parse_block_number("42"), 42);
        assert_eq!(parse_block_number(""), 0);
        assert_eq!(parse_block_number("0xzz"), 0);
        assert_eq!(parse_block_number("latest"), 0);
    }

    #[test]
    fn test_builder_priority_table() {
        let none: Vec<String> = vec![];
        assert_eq!(builder_priority(&none), 0);
        assert_eq!(builder_priority(&["flashbots".to_string()]), 10);
        assert_eq!(builder_priority(&["Titan".to_string()]), 20);
        // Maximum wins when several tags are present.
        assert_eq!(
            builder_priority(&[
                "flashbots".to_string(),
                "Titan".to_string(),
                "unknown".to_string()
            ]),
            20
        );
        // Case-sensitive, like the table.
        assert_eq!(builder_priority(&["titan".to_string()]), 0);
    }

    #[test]
    fn test_sort_policy_from_str() {
        assert_eq!(
            "block-number".parse::<SortPolicy>().unwrap(),
            SortPolicy::BlockNumber
        );
        assert_eq!(
            "builder-priority".parse::<SortPolicy>().unwrap(),
            SortPolicy::BuilderPriority
        );
        assert!("gas-price".parse::<SortPolicy>().is_err());
    }
}
