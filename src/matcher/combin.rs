// Combinatorial assignment search.
//
// Given one candidate list per library package, every combination of
// picks is scored by its mean similarity; combinations that beat the
// running best must additionally reproduce the library's own package
// relationships before they are accepted. The cartesian product is hard
// bounded - partitions beyond the bound are abandoned, never searched.

use super::relation::{relationship, Relationship};
use crate::hashtree::HashTreeNode;
use crate::profile::MatchedPackage;
use tracing::debug;

/// Upper bound on the number of combinations tried per partition (2^16).
pub const MAX_COMBINATIONS: u64 = 65536;

/// One candidate pick: an app package node and its similarity score.
pub(crate) type Candidate<'a> = (&'a HashTreeNode, f64);

/// Mixed-radix counter over the candidate list sizes.
///
/// Digit `i` indexes candidate list `i`; empty lists are pinned at 0.
struct Odometer {
    sizes: Vec<usize>,
    counters: Vec<usize>,
}

impl Odometer {
    fn new(sizes: Vec<usize>) -> Self {
        let counters = vec![0; sizes.len()];
        Self { sizes, counters }
    }

    fn positions(&self) -> &[usize] {
        &self.counters
    }

    /// Step to the next combination; false once every digit has wrapped.
    fn advance(&mut self) -> bool {
        for i in (0..self.counters.len()).rev() {
            if self.counters[i] + 1 < self.sizes[i].max(1) {
                self.counters[i] += 1;
                return true;
            }
            self.counters[i] = 0;
        }
        false
    }
}

fn combination_count(lists: &[Vec<Candidate<'_>>]) -> u64 {
    lists
        .iter()
        .fold(1u64, |total, l| total.saturating_mul(l.len().max(1) as u64))
}

/// Check that the chosen app packages mirror the library's structure, and
/// collect them on success.
fn verify_structure(
    lists: &[Vec<Candidate<'_>>],
    positions: &[usize],
    lib_relationships: &[Relationship],
) -> Option<Vec<MatchedPackage>> {
    for i in 0..lists.len().saturating_sub(1) {
        if lists[i].is_empty() || lists[i + 1].is_empty() {
            continue;
        }

        let (node1, _) = lists[i][positions[i]];
        let (node2, _) = lists[i + 1][positions[i + 1]];
        if relationship(&node1.value, &node2.value) != lib_relationships[i] {
            return None;
        }
    }

    Some(
        lists
            .iter()
            .zip(positions)
            .filter(|(l, _)| !l.is_empty())
            .map(|(l, &pos)| {
                let (node, score) = l[pos];
                MatchedPackage {
                    package: node.value.clone(),
                    score,
                }
            })
            .collect(),
    )
}

/// Exhaustively search the candidate combinations for the best structurally
/// consistent assignment strictly above `floor`.
///
/// Empty candidate lists stay in place and contribute 0 to the mean, so a
/// partition that covers only part of the library is penalized, not
/// inflated. Returns `None` when the product of list sizes exceeds
/// [`MAX_COMBINATIONS`] or nothing beats the floor.
pub(crate) fn best_match(
    lists: &[Vec<Candidate<'_>>],
    lib_relationships: &[Relationship],
    floor: f64,
) -> Option<(f64, Vec<MatchedPackage>)> {
    if lists.is_empty() {
        return None;
    }

    let total = combination_count(lists);
    if total > MAX_COMBINATIONS {
        debug!("[best_match] more than 2^16 combinations ({total}) - [SKIP]");
        return None;
    }
    debug!("- Testing {total} combinations");

    let mut highest = floor;
    let mut best: Option<(f64, Vec<MatchedPackage>)> = None;
    let mut odometer = Odometer::new(lists.iter().map(Vec::len).collect());

    loop {
        let positions = odometer.positions();
        let sum: f64 = lists
            .iter()
            .zip(positions)
            .map(|(l, &pos)| if l.is_empty() { 0.0 } else { l[pos].1 })
            .sum();
        let mean = sum / lists.len() as f64;

        if mean > highest {
            if let Some(nodes) = verify_structure(lists, positions, lib_relationships) {
                debug!("- New highscore {mean:.3} at {positions:?}");
                highest = mean;
                best = Some((mean, nodes));
            }
        }

        if !odometer.advance() {
            break;
        }
    }

    best
}
