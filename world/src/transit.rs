//! Short-lived transit reservations over grid cells.
//!
//! Every step an agent executes claims the departure cell, the arrival cell,
//! and, for diagonal steps, the two corner cells it brushes past. Claims
//! carry a [`TransitCode`] describing the direction of travel and whether the
//! cell is being left or entered, which is what the collision classifier
//! decodes when two paths meet.

use std::collections::HashMap;

use gridroute_core::{AgentId, Direction, GridCoord, TransitCode, TransitPhase};

/// One live reservation over a single cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Claim {
    agent: AgentId,
    code: TransitCode,
}

impl Claim {
    /// Agent holding the reservation.
    #[must_use]
    pub const fn agent(&self) -> AgentId {
        self.agent
    }

    /// Direction-and-phase code of the reservation.
    #[must_use]
    pub const fn code(&self) -> TransitCode {
        self.code
    }
}

/// Cells reserved by one step from `from` into the adjacent cell `to`.
///
/// The departure cell and any brushed corners carry the departure code; the
/// arrival cell carries the matching arrival code.
#[must_use]
pub fn step_claims(from: GridCoord, to: GridCoord) -> Vec<(GridCoord, TransitCode)> {
    let Some(direction) = Direction::between(from, to) else {
        return Vec::new();
    };
    let departure = TransitCode::new(direction, TransitPhase::Departure);
    let arrival = TransitCode::new(direction, TransitPhase::Arrival);
    let mut claims = vec![(from, departure), (to, arrival)];
    if from.diagonal_to(to) {
        claims.push((GridCoord::new(from.x(), to.y()), departure));
        claims.push((GridCoord::new(to.x(), from.y()), departure));
    }
    claims
}

/// Reservation layer of one grid.
#[derive(Clone, Debug, Default)]
pub struct TransitGrid {
    cells: HashMap<GridCoord, Claim>,
    by_agent: HashMap<AgentId, Vec<GridCoord>>,
}

impl TransitGrid {
    /// Creates an empty reservation layer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reservation currently held over a cell, if any.
    #[must_use]
    pub fn claim_at(&self, coord: GridCoord) -> Option<Claim> {
        self.cells.get(&coord).copied()
    }

    /// Records one reservation over a single cell with an explicit code,
    /// overwriting whatever claim held the cell before.
    pub fn claim_cell(&mut self, agent: AgentId, coord: GridCoord, code: TransitCode) {
        let _ = self.cells.insert(coord, Claim { agent, code });
        self.by_agent.entry(agent).or_default().push(coord);
    }

    /// Records every reservation of one step. Any previous claims held by
    /// the agent are released first.
    pub fn claim_step(&mut self, agent: AgentId, from: GridCoord, to: GridCoord) {
        self.release(agent);
        for (coord, code) in step_claims(from, to) {
            self.claim_cell(agent, coord, code);
        }
    }

    /// Cells an agent currently holds reservations over.
    #[must_use]
    pub fn claims_of(&self, agent: AgentId) -> Vec<GridCoord> {
        self.by_agent
            .get(&agent)
            .map(|held| {
                held.iter()
                    .copied()
                    .filter(|coord| self.cells.get(coord).map(Claim::agent) == Some(agent))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Releases every reservation held by an agent. Cells that a later claim
    /// overwrote are left to their new owner.
    pub fn release(&mut self, agent: AgentId) {
        let Some(held) = self.by_agent.remove(&agent) else {
            return;
        };
        for coord in held {
            if self.cells.get(&coord).map(Claim::agent) == Some(agent) {
                let _ = self.cells.remove(&coord);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orthogonal_steps_claim_two_cells() {
        let from = GridCoord::new(2, 2);
        let to = GridCoord::new(3, 2);
        let claims = step_claims(from, to);
        assert_eq!(claims.len(), 2);
        assert_eq!(
            claims[0],
            (from, TransitCode::new(Direction::East, TransitPhase::Departure))
        );
        assert_eq!(
            claims[1],
            (to, TransitCode::new(Direction::East, TransitPhase::Arrival))
        );
    }

    #[test]
    fn diagonal_steps_also_claim_both_corners() {
        let from = GridCoord::new(2, 2);
        let to = GridCoord::new(3, 3);
        let claims = step_claims(from, to);
        assert_eq!(claims.len(), 4);
        let departure = TransitCode::new(Direction::Southeast, TransitPhase::Departure);
        assert!(claims.contains(&(GridCoord::new(2, 3), departure)));
        assert!(claims.contains(&(GridCoord::new(3, 2), departure)));
    }

    #[test]
    fn release_only_removes_cells_still_owned() {
        let mut transit = TransitGrid::new();
        let first = AgentId::new(1);
        let second = AgentId::new(2);
        transit.claim_step(first, GridCoord::new(0, 0), GridCoord::new(1, 0));
        // The second agent steps through the first one's arrival cell.
        transit.claim_step(second, GridCoord::new(1, 0), GridCoord::new(2, 0));
        transit.release(first);
        let survivor = transit.claim_at(GridCoord::new(1, 0)).expect("still claimed");
        assert_eq!(survivor.agent(), second);
        assert!(transit.claim_at(GridCoord::new(0, 0)).is_none());
    }

    #[test]
    fn new_claims_replace_an_agents_previous_step() {
        let mut transit = TransitGrid::new();
        let agent = AgentId::new(9);
        transit.claim_step(agent, GridCoord::new(0, 0), GridCoord::new(1, 1));
        transit.claim_step(agent, GridCoord::new(1, 1), GridCoord::new(2, 1));
        assert!(transit.claim_at(GridCoord::new(0, 0)).is_none());
        assert!(transit.claim_at(GridCoord::new(0, 1)).is_none());
        assert!(transit.claim_at(GridCoord::new(2, 1)).is_some());
    }
}
