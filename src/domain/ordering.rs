use crate::domain::{Card, Column};
use std::cmp::Ordering;

/// Items kept in an ordered list whose `position` mirrors their index
pub trait Positioned {
    fn position(&self) -> usize;
    fn set_position(&mut self, position: usize);
    /// Secondary key used when two stored positions collide
    fn tiebreak(&self) -> &str;
}

impl Positioned for Card {
    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    fn tiebreak(&self) -> &str {
        self.id.as_str()
    }
}

impl Positioned for Column {
    fn position(&self) -> usize {
        self.position
    }

    fn set_position(&mut self, position: usize) {
        self.position = position;
    }

    fn tiebreak(&self) -> &str {
        self.id.as_str()
    }
}

/// Sorts items by stored position, breaking ties by id so the result is deterministic.
///
/// Stored positions may be sparse or duplicated (e.g. rows written by an
/// older client); follow with [`reindex`] to restore the index invariant.
pub fn sort_by_position<T: Positioned>(items: &mut [T]) {
    items.sort_by(|a, b| match a.position().cmp(&b.position()) {
        Ordering::Equal => a.tiebreak().cmp(b.tiebreak()),
        other => other,
    });
}

/// Rewrites every position to its list index.
///
/// Returns the indices whose position actually changed, so callers only
/// persist the rows that moved.
pub fn reindex<T: Positioned>(items: &mut [T]) -> Vec<usize> {
    let mut changed = Vec::new();
    for (index, item) in items.iter_mut().enumerate() {
        if item.position() != index {
            item.set_position(index);
            changed.push(index);
        }
    }
    changed
}

/// Clamps a possibly stale or negative drop index into `[0, len]`.
pub fn clamp_index(requested: i64, len: usize) -> usize {
    if requested <= 0 {
        0
    } else {
        usize::try_from(requested).map_or(len, |index| index.min(len))
    }
}

/// True when positions equal list indices (0, 1, 2, ...).
pub fn is_contiguous<T: Positioned>(items: &[T]) -> bool {
    items
        .iter()
        .enumerate()
        .all(|(index, item)| item.position() == index)
}
