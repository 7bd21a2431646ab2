//! Free text from a positional inverted index.
//!
//! OpenAlex ships abstracts as `word → [positions]`. Reconstruction places
//! every word at its positions and joins the occupied slots in ascending
//! position order. Gaps are dropped, never rendered.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::{Result, ScienceError};

/// `word → zero-based positions`. Positions are signed so that malformed
/// catalog data can be detected instead of wrapped.
pub type InvertedIndex = BTreeMap<String, Vec<i64>>;

/// Strict reconstruction: negative positions or two different words on the
/// same position are reported as [`ScienceError::MalformedIndex`].
///
/// Absent or empty input yields `Ok(None)`.
pub fn reconstruct_checked(index: Option<&InvertedIndex>) -> Result<Option<String>> {
    let Some(index) = index else {
        return Ok(None);
    };
    let placed = place_words(index);
    if let Some((word, position)) = placed.issues.into_iter().next() {
        return Err(ScienceError::MalformedIndex {
            word: word.to_string(),
            position,
        });
    }
    Ok(join_slots(placed.slots))
}

/// Best-effort reconstruction that never fails.
///
/// Negative positions are dropped; on a position conflict the first word in
/// lexicographic order keeps the slot.
pub fn reconstruct_lossy(index: Option<&InvertedIndex>) -> Option<String> {
    let index = index?;
    join_slots(place_words(index).slots)
}

struct Placement<'a> {
    slots: BTreeMap<i64, &'a str>,
    issues: Vec<(&'a str, i64)>,
}

fn place_words(index: &InvertedIndex) -> Placement<'_> {
    let mut slots = BTreeMap::new();
    let mut issues = Vec::new();

    for (word, positions) in index {
        if word.is_empty() {
            continue;
        }
        for &position in positions {
            if position < 0 {
                issues.push((word.as_str(), position));
                continue;
            }
            match slots.entry(position) {
                Entry::Vacant(slot) => {
                    slot.insert(word.as_str());
                }
                Entry::Occupied(slot) => {
                    if *slot.get() != word.as_str() {
                        issues.push((word.as_str(), position));
                    }
                }
            }
        }
    }

    Placement { slots, issues }
}

fn join_slots(slots: BTreeMap<i64, &str>) -> Option<String> {
    if slots.is_empty() {
        return None;
    }
    Some(slots.into_values().collect::<Vec<_>>().join(" "))
}
