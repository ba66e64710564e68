//! Classification of reservation conflicts ahead of a single step.
//!
//! The mover's prospective reservation set is checked against the live
//! transit layer. Every foreign claim found is classified by its geometry
//! relative to the mover's direction of travel, and the per-conflict verdicts
//! combine by severity so one hard conflict dominates any number of soft
//! ones.

use gridroute_core::{AgentId, Direction, GridCoord, TransitPhase};
use gridroute_system_search::SearchBias;
use gridroute_world::transit::{step_claims, TransitGrid};

/// How many of a slower occupant's upcoming cells a faster mover routes
/// around.
const SAME_DIRECTION_LOOKAHEAD: usize = 3;

/// Verdicts in ascending severity. Combining conflicts keeps the maximum.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum Severity {
    /// No foreign claim stands in the way.
    Proceed,
    /// Retry the same step after a short delay.
    Wait,
    /// Search a detour, adopt it only if it is not more than one step
    /// longer than the remaining path.
    RerouteIfNotWorse,
    /// Replace the path unconditionally.
    RerouteNow,
}

/// Combined verdict plus the avoidance bias any reroute should search with.
#[derive(Debug, Default)]
pub(crate) struct Assessment {
    pub(crate) severity: Severity,
    pub(crate) bias: SearchBias,
}

impl Default for Severity {
    fn default() -> Self {
        Severity::Proceed
    }
}

/// Classifies one prospective step for the mover.
///
/// `occupant_speed` and `occupant_upcoming` look up the conflicting agent's
/// movement rate and the next cells of its own path; both come from the
/// orchestrator's bookkeeping rather than the world.
pub(crate) fn assess(
    mover: AgentId,
    mover_speed: f32,
    from: GridCoord,
    to: GridCoord,
    transit: &TransitGrid,
    occupant_speed: impl Fn(AgentId) -> Option<f32>,
    occupant_upcoming: impl Fn(AgentId) -> Vec<GridCoord>,
) -> Assessment {
    let mut assessment = Assessment::default();
    let Some(direction) = Direction::between(from, to) else {
        return assessment;
    };
    for (cell, _) in step_claims(from, to) {
        let Some(claim) = transit.claim_at(cell) else {
            continue;
        };
        if claim.agent() == mover {
            continue;
        }
        let verdict = match claim.code().decode() {
            None => Severity::Wait,
            Some((occupant_direction, phase)) => {
                if occupant_direction == direction {
                    // Following traffic: only a strictly faster mover swings
                    // around the occupant's current step and upcoming cells,
                    // everyone else queues behind it.
                    let faster = occupant_speed(claim.agent())
                        .is_some_and(|speed| mover_speed > speed);
                    if faster {
                        for claimed in transit.claims_of(claim.agent()) {
                            assessment.bias.avoid(claimed);
                        }
                        for upcoming in occupant_upcoming(claim.agent())
                            .into_iter()
                            .take(SAME_DIRECTION_LOOKAHEAD)
                        {
                            assessment.bias.avoid(upcoming);
                        }
                        Severity::RerouteNow
                    } else {
                        Severity::Wait
                    }
                } else if occupant_direction == direction.opposite() {
                    // Head-on: route around everything the oncoming agent
                    // has claimed.
                    for claimed in transit.claims_of(claim.agent()) {
                        assessment.bias.avoid(claimed);
                    }
                    Severity::RerouteNow
                } else {
                    match phase {
                        TransitPhase::Arrival => {
                            assessment.bias.avoid_first_step(cell);
                            Severity::RerouteIfNotWorse
                        }
                        TransitPhase::Departure => Severity::Wait,
                    }
                }
            }
        };
        assessment.severity = assessment.severity.max(verdict);
    }
    assessment
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_core::TransitCode;

    const MOVER: AgentId = AgentId::new(1);
    const OTHER: AgentId = AgentId::new(2);

    fn no_speed(_: AgentId) -> Option<f32> {
        None
    }

    fn no_upcoming(_: AgentId) -> Vec<GridCoord> {
        Vec::new()
    }

    #[test]
    fn empty_transit_lets_the_mover_proceed() {
        let transit = TransitGrid::new();
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::Proceed);
    }

    #[test]
    fn the_movers_own_claims_do_not_conflict() {
        let mut transit = TransitGrid::new();
        transit.claim_step(MOVER, GridCoord::new(0, 0), GridCoord::new(1, 0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::Proceed);
    }

    #[test]
    fn head_on_traffic_forces_an_unconditional_reroute() {
        let mut transit = TransitGrid::new();
        // The other agent is stepping west into the mover's start cell while
        // the mover wants to step east through its departure cell.
        transit.claim_step(OTHER, GridCoord::new(1, 0), GridCoord::new(0, 0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::RerouteNow);
    }

    #[test]
    fn slower_movers_queue_behind_same_direction_traffic() {
        let mut transit = TransitGrid::new();
        transit.claim_step(OTHER, GridCoord::new(1, 0), GridCoord::new(2, 0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            |_| Some(1.0),
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::Wait);
    }

    #[test]
    fn faster_movers_swing_around_same_direction_traffic() {
        let mut transit = TransitGrid::new();
        transit.claim_step(OTHER, GridCoord::new(1, 0), GridCoord::new(2, 0));
        let verdict = assess(
            MOVER,
            2.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            |_| Some(1.0),
            |_| vec![GridCoord::new(3, 0), GridCoord::new(4, 0)],
        );
        assert_eq!(verdict.severity, Severity::RerouteNow);
    }

    #[test]
    fn crossing_traffic_arriving_in_the_way_asks_for_a_bounded_reroute() {
        let mut transit = TransitGrid::new();
        // The other agent steps south, arriving exactly where the mover
        // wants to go.
        transit.claim_step(OTHER, GridCoord::new(1, -1), GridCoord::new(1, 0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::RerouteIfNotWorse);
    }

    #[test]
    fn crossing_traffic_departing_from_the_way_means_wait() {
        let mut transit = TransitGrid::new();
        // The other agent is just leaving the mover's target cell, heading
        // south out of the way.
        transit.claim_step(OTHER, GridCoord::new(1, 0), GridCoord::new(1, 1));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::Wait);
    }

    #[test]
    fn undecodable_reservations_mean_wait() {
        // A corrupt code cannot be classified, so the mover holds back
        // rather than guessing at the occupant's movement.
        let mut transit = TransitGrid::new();
        transit.claim_cell(OTHER, GridCoord::new(1, 0), TransitCode::from_raw(0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 0),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::Wait);
        assert!(verdict.bias.is_empty());
    }

    #[test]
    fn the_hardest_conflict_wins() {
        // Diagonal step southeast; its reservation set spans both corners.
        let mut transit = TransitGrid::new();
        // One agent departs westward out of the northern corner (wait),
        // another arrives into the southern corner (bounded reroute).
        transit.claim_step(OTHER, GridCoord::new(0, 1), GridCoord::new(-1, 1));
        transit.claim_step(AgentId::new(3), GridCoord::new(1, -1), GridCoord::new(1, 0));
        let verdict = assess(
            MOVER,
            1.0,
            GridCoord::new(0, 0),
            GridCoord::new(1, 1),
            &transit,
            no_speed,
            no_upcoming,
        );
        assert_eq!(verdict.severity, Severity::RerouteIfNotWorse);
    }
}
