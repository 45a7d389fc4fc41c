use std::collections::{HashMap, HashSet};

use crate::grid::{Position, TimedEdge, TimedPosition};

/// A space-time claim held by one agent: a cell for one tick, a directed
/// edge between two ticks, or a cell from some tick onward forever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reservation {
    Cell(TimedPosition),
    Edge(TimedEdge),
    Forever(Position),
}

/// Shared occupancy substrate for Cooperative A* and Token-Passing. Every
/// reservation is recorded in the primary map and under its owning agent;
/// cell claims additionally land in a per-cell tick index so the resting
/// predicates stay cheap. Cancelling an agent restores all three.
#[derive(Debug, Clone, Default)]
pub struct ReservationTable {
    reservations: HashMap<Reservation, usize>,
    by_agent: HashMap<usize, HashMap<Reservation, usize>>,
    cell_ticks: HashMap<Position, HashSet<usize>>,
}

impl ReservationTable {
    pub fn new() -> Self {
        ReservationTable::default()
    }

    /// No claim on the cell at this tick and no permanent claim that
    /// started at or before it.
    pub fn is_cell_free(&self, at: TimedPosition) -> bool {
        if self.reservations.contains_key(&Reservation::Cell(at)) {
            return false;
        }
        match self.reservations.get(&Reservation::Forever(at.position())) {
            Some(&from) => from > at.t,
            None => true,
        }
    }

    /// Free now and at every later tick. Check this before claiming a cell
    /// permanently.
    pub fn is_free_forever(&self, at: TimedPosition) -> bool {
        if !self.is_cell_free(at) {
            return false;
        }
        match self.cell_ticks.get(&at.position()) {
            Some(ticks) => ticks.iter().all(|&tick| tick <= at.t),
            None => true,
        }
    }

    /// Whether an agent sitting on `position` from `now` on would collide
    /// with any later cell claim. Cancel the agent's own claims first so it
    /// does not block itself.
    pub fn resting_allowed(&self, position: Position, now: usize) -> bool {
        match self.cell_ticks.get(&position) {
            Some(ticks) => ticks.iter().all(|&tick| tick <= now),
            None => true,
        }
    }

    /// Neither the edge nor its reverse is claimed for this tick.
    pub fn is_edge_free(&self, from: TimedPosition, to: TimedPosition) -> bool {
        let forwards = TimedEdge::between(from, to);
        let backwards = TimedEdge::between(
            TimedPosition::at(to.position(), from.t),
            TimedPosition::at(from.position(), to.t),
        );
        !self.reservations.contains_key(&Reservation::Edge(forwards))
            && !self.reservations.contains_key(&Reservation::Edge(backwards))
    }

    pub fn reserve_cell(&mut self, agent: usize, at: TimedPosition, permanent: bool) {
        self.record(agent, Reservation::Cell(at), at.t);
        self.cell_ticks.entry(at.position()).or_default().insert(at.t);
        if permanent {
            self.record(agent, Reservation::Forever(at.position()), at.t);
        }
    }

    pub fn reserve_edge(&mut self, agent: usize, from: TimedPosition, to: TimedPosition) {
        self.record(agent, Reservation::Edge(TimedEdge::between(from, to)), from.t);
    }

    /// Claims a reconstructed path: every cell at its tick, every edge
    /// used, and the final cell from its arrival tick onward forever.
    pub fn reserve_path(&mut self, agent: usize, path: &[TimedPosition]) {
        for (index, &step) in path.iter().enumerate() {
            self.reserve_cell(agent, step, index == path.len() - 1);
        }
        for window in path.windows(2) {
            if window[0].position() != window[1].position() {
                self.reserve_edge(agent, window[0], window[1]);
            }
        }
    }

    /// Removes every reservation recorded under the agent from all indices.
    pub fn cancel_agent(&mut self, agent: usize) {
        let Some(owned) = self.by_agent.remove(&agent) else {
            return;
        };
        for (reservation, time) in owned {
            self.reservations.remove(&reservation);
            let cell = match reservation {
                Reservation::Cell(at) => Some(at.position()),
                Reservation::Forever(position) => Some(position),
                Reservation::Edge(_) => None,
            };
            if let Some(cell) = cell {
                if let Some(ticks) = self.cell_ticks.get_mut(&cell) {
                    ticks.remove(&time);
                }
            }
        }
    }

    fn record(&mut self, agent: usize, reservation: Reservation, time: usize) {
        self.reservations.insert(reservation, time);
        self.by_agent
            .entry(agent)
            .or_default()
            .insert(reservation, time);
    }
}
