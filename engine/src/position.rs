//! Fractional position allocation.
//!
//! A sibling list is ordered by a real-valued key. Inserting between two
//! siblings takes the midpoint of their keys, so no other sibling moves.
//!
//! # Rules
//!
//! | Situation                  | New key                      |
//! |----------------------------|------------------------------|
//! | no siblings                | `1`                          |
//! | before the first sibling   | `first - 1`                  |
//! | after the last sibling     | `last + 1`                   |
//! | between `left` and `right` | `(left + right) / 2`         |
//!
//! Repeated inserts at the same spot halve the gap each time until `f64`
//! runs out of precision. [`allocate`] reports that as
//! [`Error::PositionGapExhausted`] rather than returning a key that breaks
//! the order; [`renumber`] is the explicit way out.

use crate::{error::Result, item::Positioned, Error, Position};

/// Key given to the first item of an empty container.
pub const EMPTY_CONTAINER_POSITION: Position = 1.0;

/// Compute the key for an insert at `target_index`.
///
/// `siblings` must be sorted ascending by position and must not contain the
/// entity being placed. `target_index` is in `0..=siblings.len()`.
pub fn allocate<P: Positioned>(siblings: &[P], target_index: usize) -> Result<Position> {
    let len = siblings.len();
    if target_index > len {
        return Err(Error::InvalidTargetIndex {
            index: target_index,
            len,
        });
    }

    if len == 0 {
        return Ok(EMPTY_CONTAINER_POSITION);
    }

    if target_index == 0 {
        let first = siblings[0].position();
        let candidate = first - 1.0;
        return strictly_between(candidate, f64::NEG_INFINITY, first);
    }

    if target_index == len {
        let last = siblings[len - 1].position();
        let candidate = last + 1.0;
        return strictly_between(candidate, last, f64::INFINITY);
    }

    let left = siblings[target_index - 1].position();
    let right = siblings[target_index].position();
    strictly_between((left + right) / 2.0, left, right)
}

fn strictly_between(candidate: Position, left: Position, right: Position) -> Result<Position> {
    if left < candidate && candidate < right {
        Ok(candidate)
    } else {
        Err(Error::PositionGapExhausted {
            left: if left.is_finite() { left } else { candidate },
            right: if right.is_finite() { right } else { candidate },
        })
    }
}

/// Smallest distance between adjacent siblings, `None` for fewer than two.
pub fn smallest_gap<P: Positioned>(siblings: &[P]) -> Option<Position> {
    siblings
        .windows(2)
        .map(|pair| pair[1].position() - pair[0].position())
        .min_by(|a, b| a.total_cmp(b))
}

/// Whether any adjacent pair is closer than `min_gap`.
pub fn needs_rebalance<P: Positioned>(siblings: &[P], min_gap: Position) -> bool {
    smallest_gap(siblings).is_some_and(|gap| gap < min_gap)
}

/// Evenly spaced keys `0, step, 2*step, ...` in the current order.
///
/// Returns `(id, new_position)` for every sibling.
pub fn renumber<P: Positioned>(siblings: &[P], step: Position) -> Vec<(String, Position)> {
    siblings
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id().to_string(), i as Position * step))
        .collect()
}
