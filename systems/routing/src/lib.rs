#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Path orchestration for the Gridroute engine.
//!
//! The routing system owns the mapping from agent to active path. It reacts
//! to world events — wakes, step boundaries, terrain flips, the passage of
//! time — and answers exclusively with new command batches: wake or halt an
//! agent, start the next step, or cancel one mid-flight. Collisions between
//! converging agents are classified per step against the transit reservation
//! layer, and the verdict either starts the step, schedules a delayed retry,
//! or replaces the path through a biased search.

mod collision;

use std::collections::BTreeMap;

use glam::Vec2;
use gridroute_core::{AgentId, Command, Direction, Event, GridCoord, GridId, Path};
use gridroute_system_search::{astar, SearchBias};
use gridroute_world::{query, World};
use tracing::{debug, warn};

use crate::collision::{assess, Severity};

/// Consecutive searches an agent may run without starting a step before its
/// move request is abandoned.
const RECALC_CAP: u32 = 5;

#[derive(Clone, Debug)]
struct Route {
    destination: GridCoord,
    path: Path,
    wait: Option<f32>,
    recalc_streak: u32,
    awaiting_wake: bool,
    pending_reroute: bool,
    cancelling: bool,
}

impl Route {
    fn new(destination: GridCoord) -> Self {
        Self {
            destination,
            path: Path::default(),
            wait: None,
            recalc_streak: 0,
            awaiting_wake: false,
            pending_reroute: false,
            cancelling: false,
        }
    }
}

/// Observable counters kept by the orchestrator.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoutingMetrics {
    searches: u64,
    abandoned_moves: u64,
    completed_moves: u64,
    failed_moves: u64,
}

impl RoutingMetrics {
    /// Total path searches run, reroutes included.
    #[must_use]
    pub const fn searches(&self) -> u64 {
        self.searches
    }

    /// Moves given up after too many consecutive recalculations.
    #[must_use]
    pub const fn abandoned_moves(&self) -> u64 {
        self.abandoned_moves
    }

    /// Moves that reached their destination.
    #[must_use]
    pub const fn completed_moves(&self) -> u64 {
        self.completed_moves
    }

    /// Moves dropped because no route to the destination existed.
    #[must_use]
    pub const fn failed_moves(&self) -> u64 {
        self.failed_moves
    }
}

/// Event-driven path orchestrator.
#[derive(Debug, Default)]
pub struct Routing {
    routes: BTreeMap<AgentId, Route>,
    metrics: RoutingMetrics,
}

impl Routing {
    /// Creates an orchestrator with no active routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values.
    #[must_use]
    pub const fn metrics(&self) -> RoutingMetrics {
        self.metrics
    }

    /// Reports whether an agent currently has an active move request.
    #[must_use]
    pub fn is_navigating(&self, agent: AgentId) -> bool {
        self.routes.contains_key(&agent)
    }

    /// Requests that an agent travel to a destination cell.
    ///
    /// A mid-step agent keeps finishing its current step, which is cancelled
    /// at the next tick; the search toward the new destination runs once the
    /// step resolves. An idle agent is woken first so its own standing block
    /// does not pin the search.
    pub fn request_move(
        &mut self,
        world: &World,
        agent: AgentId,
        destination: GridCoord,
        commands: &mut Vec<Command>,
    ) {
        let Some(view) = query::agent(world, agent) else {
            warn!(agent = agent.get(), "move requested for unknown agent");
            return;
        };
        debug!(agent = agent.get(), ?destination, "move requested");
        if view.mid_step() {
            let mut route = Route::new(destination);
            route.pending_reroute = true;
            let _ = self.routes.insert(agent, route);
            commands.push(Command::CancelStep { agent });
            return;
        }
        let mut route = Route::new(destination);
        route.awaiting_wake = true;
        let _ = self.routes.insert(agent, route);
        commands.push(Command::WakeAgent { agent });
    }

    /// Requests a move toward a world position, resolved to the nearest
    /// usable cell of the agent's grid.
    pub fn request_move_to_position(
        &mut self,
        world: &World,
        agent: AgentId,
        position: Vec2,
        commands: &mut Vec<Command>,
    ) {
        let Some(view) = query::agent(world, agent) else {
            warn!(agent = agent.get(), "move requested for unknown agent");
            return;
        };
        let destination = query::nav(world, view.grid())
            .and_then(|nav| nav.resolve_position(position));
        let Some(destination) = destination else {
            warn!(agent = agent.get(), "position resolves to no usable cell");
            return;
        };
        self.request_move(world, agent, destination, commands);
    }

    /// Cancels an agent's active move request, halting it in place.
    pub fn cancel(&mut self, world: &World, agent: AgentId, commands: &mut Vec<Command>) {
        let Some(route) = self.routes.get_mut(&agent) else {
            return;
        };
        let mid_step = query::agent(world, agent).is_some_and(|view| view.mid_step());
        if mid_step {
            route.cancelling = true;
            route.pending_reroute = false;
            route.path = Path::default();
            commands.push(Command::CancelStep { agent });
        } else {
            let _ = self.routes.remove(&agent);
            commands.push(Command::HaltAgent { agent });
        }
    }

    /// Reacts to a batch of world events.
    pub fn handle(&mut self, world: &World, events: &[Event], commands: &mut Vec<Command>) {
        for event in events {
            match event {
                Event::AgentWoken { agent, .. } => {
                    let awaiting = self
                        .routes
                        .get(agent)
                        .is_some_and(|route| route.awaiting_wake);
                    if awaiting {
                        if let Some(route) = self.routes.get_mut(agent) {
                            route.awaiting_wake = false;
                        }
                        self.search(world, *agent, SearchBias::default(), None, commands);
                    }
                }
                Event::StepStarted { agent, to, .. } => {
                    if let Some(route) = self.routes.get_mut(agent) {
                        if route.path.peek_next() == Some(*to) {
                            let _ = route.path.pop_next();
                        }
                        route.recalc_streak = 0;
                        route.wait = None;
                    }
                }
                Event::StepCompleted { agent, .. } => {
                    self.on_step_completed(world, *agent, commands);
                }
                Event::AgentPlaced { agent, .. } => {
                    // A manual re-place discards whatever step was in
                    // flight, so the stale path is dropped and the journey
                    // restarts from the new cell.
                    match self.routes.get(agent).map(|route| route.cancelling) {
                        None => {}
                        Some(true) => {
                            let _ = self.routes.remove(agent);
                        }
                        Some(false) => {
                            if let Some(route) = self.routes.get_mut(agent) {
                                route.pending_reroute = false;
                                route.path = Path::default();
                                route.wait = None;
                                route.awaiting_wake = true;
                            }
                            commands.push(Command::WakeAgent { agent: *agent });
                        }
                    }
                }
                Event::StepRejected { agent, .. } => {
                    if let Some(route) = self.routes.get_mut(agent) {
                        route.wait = Some(world.config().retry_delay().as_secs_f32());
                    }
                }
                Event::TimeAdvanced { dt } => {
                    let dt = dt.as_secs_f32();
                    let mut due = Vec::new();
                    for (agent, route) in self.routes.iter_mut() {
                        if let Some(remaining) = route.wait {
                            let remaining = remaining - dt;
                            if remaining <= 0.0 {
                                route.wait = None;
                                due.push(*agent);
                            } else {
                                route.wait = Some(remaining);
                            }
                        }
                    }
                    for agent in due {
                        self.advance(world, agent, commands);
                    }
                }
                Event::TerrainChanged { grid, cell } => {
                    self.on_terrain_changed(world, *grid, *cell, commands);
                }
                _ => {}
            }
        }
    }

    fn on_step_completed(&mut self, world: &World, agent: AgentId, commands: &mut Vec<Command>) {
        let Some(route) = self.routes.get_mut(&agent) else {
            return;
        };
        if route.cancelling {
            let _ = self.routes.remove(&agent);
            commands.push(Command::HaltAgent { agent });
            return;
        }
        if route.pending_reroute {
            route.pending_reroute = false;
            self.search(world, agent, SearchBias::default(), None, commands);
            return;
        }
        self.advance(world, agent, commands);
    }

    /// Re-validates active paths after a cell's blocking state flipped.
    /// Affected agents reroute toward their unchanged destinations.
    fn on_terrain_changed(
        &mut self,
        world: &World,
        grid: GridId,
        cell: GridCoord,
        commands: &mut Vec<Command>,
    ) {
        let mut affected = Vec::new();
        for (agent, route) in self.routes.iter() {
            if route.awaiting_wake || route.cancelling || route.pending_reroute {
                continue;
            }
            let Some(view) = query::agent(world, *agent) else {
                continue;
            };
            if view.grid() != grid || view.cell() == cell {
                continue;
            }
            if route
                .path
                .iter()
                .any(|step| step.chebyshev_distance(cell) <= 1)
            {
                affected.push((*agent, view.mid_step()));
            }
        }
        for (agent, mid_step) in affected {
            debug!(agent = agent.get(), ?cell, "path invalidated by terrain change");
            if mid_step {
                if let Some(route) = self.routes.get_mut(&agent) {
                    route.pending_reroute = true;
                }
            } else {
                self.search(world, agent, SearchBias::default(), None, commands);
            }
        }
    }

    /// Attempts the next step of an agent's path: consumes degenerate heads,
    /// finishes the move when the path is exhausted, and otherwise acts on
    /// the collision verdict for the prospective step.
    fn advance(&mut self, world: &World, agent: AgentId, commands: &mut Vec<Command>) {
        let Some(view) = query::agent(world, agent) else {
            let _ = self.routes.remove(&agent);
            return;
        };
        if view.mid_step() {
            return;
        }
        let next = {
            let Some(route) = self.routes.get_mut(&agent) else {
                return;
            };
            loop {
                match route.path.peek_next() {
                    None => break None,
                    Some(cell) if cell == view.cell() => {
                        let _ = route.path.pop_next();
                    }
                    Some(cell) => break Some(cell),
                }
            }
        };
        let Some(next) = next else {
            debug!(agent = agent.get(), cell = ?view.cell(), "path complete");
            self.metrics.completed_moves += 1;
            let _ = self.routes.remove(&agent);
            commands.push(Command::HaltAgent { agent });
            return;
        };
        let traversable = query::nav(world, view.grid()).is_some_and(|nav| {
            Direction::between(view.cell(), next)
                .is_some_and(|direction| nav.edge(view.cell(), direction))
        });
        if !traversable {
            // Something halted onto the path since it was computed.
            self.search(world, agent, SearchBias::default(), None, commands);
            return;
        }
        let Some(transit) = query::transit(world, view.grid()) else {
            return;
        };
        let mut assessment = assess(
            agent,
            view.speed(),
            view.cell(),
            next,
            transit,
            |occupant| query::agent(world, occupant).map(|view| view.speed()),
            |occupant| {
                self.routes
                    .get(&occupant)
                    .map(|route| route.path.iter().collect())
                    .unwrap_or_default()
            },
        );
        if assessment.severity == Severity::Proceed {
            // An agent paused between steps holds no claim and no standing
            // block, but it still owns its cell.
            let occupied = query::agents(world).any(|other| {
                other.agent() != agent && other.grid() == view.grid() && other.cell() == next
            });
            if occupied {
                assessment.severity = Severity::RerouteNow;
                assessment.bias.avoid(next);
            }
        }
        let remaining = self.routes.get(&agent).map_or(0, |route| route.path.len());
        match assessment.severity {
            Severity::Proceed => {
                commands.push(Command::StepAgent {
                    agent,
                    to: next,
                    final_step: remaining == 1,
                });
            }
            Severity::Wait => {
                if let Some(route) = self.routes.get_mut(&agent) {
                    route.wait = Some(world.config().retry_delay().as_secs_f32());
                }
            }
            Severity::RerouteIfNotWorse => {
                self.search(world, agent, assessment.bias, Some(remaining + 1), commands);
            }
            Severity::RerouteNow => {
                self.search(world, agent, assessment.bias, None, commands);
            }
        }
    }

    /// Searches a path toward the agent's stored destination and resumes
    /// stepping. `accept_bound` caps the accepted path length for bounded
    /// reroutes; a longer detour keeps the current path and waits instead.
    fn search(
        &mut self,
        world: &World,
        agent: AgentId,
        bias: SearchBias,
        accept_bound: Option<usize>,
        commands: &mut Vec<Command>,
    ) {
        let Some(view) = query::agent(world, agent) else {
            let _ = self.routes.remove(&agent);
            return;
        };
        let destination = {
            let Some(route) = self.routes.get_mut(&agent) else {
                return;
            };
            route.recalc_streak += 1;
            if route.recalc_streak > RECALC_CAP {
                warn!(
                    agent = agent.get(),
                    "move abandoned after repeated recalculations"
                );
                self.metrics.abandoned_moves += 1;
                let _ = self.routes.remove(&agent);
                commands.push(Command::HaltAgent { agent });
                return;
            }
            route.destination
        };
        let Some(nav) = query::nav(world, view.grid()) else {
            let _ = self.routes.remove(&agent);
            commands.push(Command::HaltAgent { agent });
            return;
        };
        self.metrics.searches += 1;
        match astar(nav, view.cell(), destination, &bias) {
            Some(path) => {
                if accept_bound.is_some_and(|bound| path.len() > bound) {
                    // The detour is too long; hold position and retry.
                    if let Some(route) = self.routes.get_mut(&agent) {
                        route.wait = Some(world.config().retry_delay().as_secs_f32());
                    }
                    return;
                }
                if let Some(route) = self.routes.get_mut(&agent) {
                    route.path = path;
                }
                self.advance(world, agent, commands);
            }
            None => {
                if !bias.is_empty() {
                    // The conflict that forced this reroute may clear, so
                    // hold position and retry rather than giving up.
                    debug!(agent = agent.get(), "reroute blocked, holding position");
                    if let Some(route) = self.routes.get_mut(&agent) {
                        route.wait = Some(world.config().retry_delay().as_secs_f32());
                    }
                    return;
                }
                debug!(agent = agent.get(), ?destination, "no route to destination");
                self.metrics.failed_moves += 1;
                let _ = self.routes.remove(&agent);
                commands.push(Command::HaltAgent { agent });
            }
        }
    }
}
