// Immutable movement sequences.
//
// A `Path` is the output of one search: an ordered chain of movements from
// a start position, where each movement begins where the previous one
// ended. Paths never change after construction; the navigator shares the
// installed one behind an `Arc` and replaces it wholesale. Splicing a
// continuation onto a provisional path builds a new `Path`.
//
// A path is provisional when the search stopped on a budget before reaching
// the goal; its end is the best-effort position nearest the goal.

use crate::movement::Movement;
use crate::types::VoxelCoord;

#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    start: VoxelCoord,
    movements: Vec<Movement>,
    total_cost: f64,
    provisional: bool,
}

impl Path {
    /// Build a path. Returns `None` if the movements do not chain from
    /// `start`.
    pub fn new(start: VoxelCoord, movements: Vec<Movement>, provisional: bool) -> Option<Self> {
        let mut at = start;
        for movement in &movements {
            if movement.src != at {
                return None;
            }
            at = movement.dest;
        }
        let total_cost = movements.iter().map(|m| m.cost).sum();
        Some(Self {
            start,
            movements,
            total_cost,
            provisional,
        })
    }

    /// A zero-length path: already at the goal (or, when provisional, no
    /// progress was possible within budget).
    pub fn empty(start: VoxelCoord, provisional: bool) -> Self {
        Self {
            start,
            movements: Vec::new(),
            total_cost: 0.0,
            provisional,
        }
    }

    pub fn start(&self) -> VoxelCoord {
        self.start
    }

    /// Final position.
    pub fn end(&self) -> VoxelCoord {
        self.movements.last().map_or(self.start, |m| m.dest)
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn get(&self, index: usize) -> Option<&Movement> {
        self.movements.get(index)
    }

    pub fn len(&self) -> usize {
        self.movements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.movements.is_empty()
    }

    /// Sum of the movement costs, in ticks.
    pub fn total_cost(&self) -> f64 {
        self.total_cost
    }

    /// Cost of the movements from `index` onward.
    pub fn remaining_cost(&self, index: usize) -> f64 {
        self.movements
            .get(index..)
            .map_or(0.0, |rest| rest.iter().map(|m| m.cost).sum())
    }

    pub fn is_provisional(&self) -> bool {
        self.provisional
    }

    /// Every position visited, start included.
    pub fn positions(&self) -> impl Iterator<Item = VoxelCoord> + '_ {
        std::iter::once(self.start).chain(self.movements.iter().map(|m| m.dest))
    }

    /// Index of the movement that starts at `pos`, searching from `from`.
    pub fn index_starting_at(&self, pos: VoxelCoord, from: usize) -> Option<usize> {
        self.movements
            .iter()
            .enumerate()
            .skip(from)
            .find(|(_, m)| m.src == pos)
            .map(|(i, _)| i)
    }

    /// Append `next`, which must start where this path ends. The result
    /// takes the provisional flag of `next`.
    pub fn splice(&self, next: &Path) -> Option<Path> {
        if next.start != self.end() {
            return None;
        }
        let mut movements = self.movements.clone();
        movements.extend_from_slice(&next.movements);
        Some(Path {
            start: self.start,
            movements,
            total_cost: self.total_cost + next.total_cost,
            provisional: next.provisional,
        })
    }

    /// The suffix starting at movement `index`.
    pub fn suffix(&self, index: usize) -> Path {
        let rest = self.movements.get(index..).unwrap_or(&[]);
        let start = rest.first().map_or(self.end(), |m| m.src);
        Path {
            start,
            movements: rest.to_vec(),
            total_cost: rest.iter().map(|m| m.cost).sum(),
            provisional: self.provisional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::MoveKind;

    fn walk(from: VoxelCoord, dx: i32, cost: f64) -> Movement {
        Movement::new(MoveKind::Traverse, from, from.offset(dx, 0, 0), cost)
    }

    fn straight(start: VoxelCoord, steps: usize) -> Vec<Movement> {
        let mut at = start;
        (0..steps)
            .map(|_| {
                let mv = walk(at, 1, 2.0);
                at = mv.dest;
                mv
            })
            .collect()
    }

    #[test]
    fn total_cost_is_sum_of_movements() {
        let start = VoxelCoord::new(0, 64, 0);
        let path = Path::new(start, straight(start, 4), false).unwrap();
        assert_eq!(path.total_cost(), 8.0);
        assert_eq!(path.end(), VoxelCoord::new(4, 64, 0));
        assert_eq!(path.remaining_cost(1), 6.0);
        assert_eq!(path.remaining_cost(9), 0.0);
        assert_eq!(path.positions().count(), 5);
    }

    #[test]
    fn broken_chain_is_rejected() {
        let start = VoxelCoord::new(0, 64, 0);
        let moves = vec![walk(start, 1, 1.0), walk(start, 1, 1.0)];
        assert!(Path::new(start, moves, false).is_none());
    }

    #[test]
    fn splice_requires_matching_endpoints() {
        let start = VoxelCoord::new(0, 64, 0);
        let head = Path::new(start, straight(start, 2), true).unwrap();
        let tail_start = head.end();
        let tail = Path::new(tail_start, straight(tail_start, 3), false).unwrap();
        let joined = head.splice(&tail).unwrap();
        assert_eq!(joined.len(), 5);
        assert_eq!(joined.total_cost(), 10.0);
        assert!(!joined.is_provisional());
        assert!(tail.splice(&head).is_none());
    }

    #[test]
    fn suffix_keeps_the_tail() {
        let start = VoxelCoord::new(0, 64, 0);
        let path = Path::new(start, straight(start, 4), false).unwrap();
        let rest = path.suffix(3);
        assert_eq!(rest.start(), VoxelCoord::new(3, 64, 0));
        assert_eq!(rest.len(), 1);
        assert_eq!(path.index_starting_at(VoxelCoord::new(2, 64, 0), 0), Some(2));
        assert!(path.suffix(4).is_empty());
    }
}
