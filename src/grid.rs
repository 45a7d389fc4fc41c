use serde::{Deserialize, Serialize};

/// A cell on the grid. Coordinates are signed so that candidate neighbours
/// of border cells can be formed freely; whether a cell is actually usable
/// is decided by edge-set membership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub fn new(x: i32, y: i32) -> Self {
        Position { x, y }
    }

    /// The four orthogonal neighbour cells, whether or not they exist on
    /// any particular map.
    pub fn neighbours(&self) -> [Position; 4] {
        [
            Position::new(self.x + 1, self.y),
            Position::new(self.x - 1, self.y),
            Position::new(self.x, self.y + 1),
            Position::new(self.x, self.y - 1),
        ]
    }
}

pub fn manhattan(a: Position, b: Position) -> usize {
    ((a.x - b.x).abs() + (a.y - b.y).abs()) as usize
}

/// A directed edge between two cells. The reverse edge is a distinct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge {
    pub source: Position,
    pub target: Position,
}

impl Edge {
    pub fn new(source: Position, target: Position) -> Self {
        Edge { source, target }
    }

    pub fn reversed(&self) -> Edge {
        Edge::new(self.target, self.source)
    }

    pub fn is_horizontal(&self) -> bool {
        self.source.y == self.target.y
    }
}

/// A cell at a specific tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimedPosition {
    pub x: i32,
    pub y: i32,
    pub t: usize,
}

impl TimedPosition {
    pub fn new(x: i32, y: i32, t: usize) -> Self {
        TimedPosition { x, y, t }
    }

    pub fn at(position: Position, t: usize) -> Self {
        TimedPosition { x: position.x, y: position.y, t }
    }

    pub fn position(&self) -> Position {
        Position::new(self.x, self.y)
    }
}

/// An edge used between ticks `time` and `time + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimedEdge {
    pub edge: Edge,
    pub time: usize,
}

impl TimedEdge {
    pub fn new(time: usize, edge: Edge) -> Self {
        TimedEdge { edge, time }
    }

    /// The edge leading from `from` to `to`, stamped with the departure
    /// time of `from`.
    pub fn between(from: TimedPosition, to: TimedPosition) -> Self {
        TimedEdge {
            edge: Edge::new(from.position(), to.position()),
            time: from.t,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_equality_is_structural() {
        assert_eq!(Position::new(3, 4), Position::new(3, 4));
        assert_ne!(Position::new(3, 4), Position::new(4, 3));
    }

    #[test]
    fn reverse_edge_is_distinct() {
        let edge = Edge::new(Position::new(0, 0), Position::new(1, 0));
        assert_ne!(edge, edge.reversed());
        assert_eq!(edge, edge.reversed().reversed());
    }

    #[test]
    fn timed_position_equality_requires_all_three() {
        let a = TimedPosition::new(1, 2, 3);
        assert_eq!(a, TimedPosition::at(Position::new(1, 2), 3));
        assert_ne!(a, TimedPosition::new(1, 2, 4));
    }

    #[test]
    fn manhattan_distance() {
        assert_eq!(manhattan(Position::new(0, 0), Position::new(4, 4)), 8);
        assert_eq!(manhattan(Position::new(2, 1), Position::new(0, 0)), 3);
    }
}
