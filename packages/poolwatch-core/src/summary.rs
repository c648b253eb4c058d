//! Category range summarization.
//!
//! Compresses each category's ordinals into contiguous range strings such as
//! `10.0.0.5-10.0.0.7`. Input must already be sorted by ordinal ascending;
//! no sorting happens here.

use crate::address;
use crate::pool::PoolEntry;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: String,
    pub ranges: Vec<String>,
}

/// Summarize `(category, ordinal)` pairs, categories in first-seen order.
pub fn summarize<'a, I>(items: I) -> Vec<CategorySummary>
where
    I: IntoIterator<Item = (&'a str, u32)>,
{
    let mut groups: IndexMap<&'a str, Vec<u32>> = IndexMap::new();
    for (category, ordinal) in items {
        groups.entry(category).or_default().push(ordinal);
    }

    groups
        .into_iter()
        .map(|(category, ordinals)| CategorySummary {
            category: category.to_string(),
            ranges: compress(&ordinals),
        })
        .collect()
}

/// Summarize pool entries as listed by the store.
pub fn summarize_entries(entries: &[PoolEntry]) -> Vec<CategorySummary> {
    summarize(entries.iter().map(|e| (e.category.as_str(), e.ordinal)))
}

/// Collapse an ascending run of ordinals into range strings.
pub fn compress(ordinals: &[u32]) -> Vec<String> {
    let mut ranges = Vec::new();
    let mut iter = ordinals.iter().copied();

    let Some(first) = iter.next() else {
        return ranges;
    };
    let (mut run_start, mut run_end) = (first, first);

    for ordinal in iter {
        if run_end.checked_add(1) == Some(ordinal) {
            run_end = ordinal;
        } else {
            ranges.push(format_run(run_start, run_end));
            run_start = ordinal;
            run_end = ordinal;
        }
    }
    ranges.push(format_run(run_start, run_end));

    ranges
}

fn format_run(start: u32, end: u32) -> String {
    if start == end {
        address::decode(start)
    } else {
        format!("{}-{}", address::decode(start), address::decode(end))
    }
}
