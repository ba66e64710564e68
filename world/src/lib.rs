#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative navigation world for the Gridroute engine.
//!
//! The world owns every loaded terrain grid, the transit reservation layer,
//! and all registered agents. It mutates exclusively through [`apply`], which
//! executes one [`Command`] and appends the resulting [`Event`]s, keeping
//! replay of a command sequence deterministic. Systems observe the world
//! through the read-only snapshots in [`query`].

pub mod grid;
pub mod motion;
pub mod transit;

use std::collections::BTreeMap;

use glam::Vec2;
use gridroute_core::{
    AgentId, Command, Direction, Event, GridCoord, GridId, RegistrationError, StepError,
};
use tracing::{debug, warn};

use crate::grid::Grid;
use crate::motion::{MotionConfig, StepMotion, StepOutcome};
use crate::transit::TransitGrid;

/// Fraction of a cell's side length used as the final-step snap tolerance.
const SNAP_TOLERANCE_FACTOR: f32 = 0.05;

/// Terrain-cost multiplier applied to the duration of steps entering
/// difficult ground.
const DIFFICULT_DURATION_FACTOR: f32 = 2.0;

#[derive(Clone, Debug)]
struct Agent {
    grid: GridId,
    cell: GridCoord,
    position: Vec2,
    speed: f32,
    pending_speed: Option<f32>,
    idle: bool,
    facing: Direction,
    motion: Option<StepMotion>,
}

/// Authoritative state of grids, reservations, and agents.
#[derive(Debug, Default)]
pub struct World {
    grids: Vec<Grid>,
    transit: BTreeMap<GridId, TransitGrid>,
    active: Option<GridId>,
    agents: BTreeMap<AgentId, Agent>,
    config: MotionConfig,
    next_grid: u32,
}

impl World {
    /// Creates an empty world with the provided motion tuning.
    #[must_use]
    pub fn new(config: MotionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Motion tuning shared by every agent.
    #[must_use]
    pub const fn config(&self) -> &MotionConfig {
        &self.config
    }

    fn grid(&self, id: GridId) -> Option<&Grid> {
        self.grids.iter().find(|grid| grid.id() == id)
    }

    fn grid_mut(&mut self, id: GridId) -> Option<&mut Grid> {
        self.grids.iter_mut().find(|grid| grid.id() == id)
    }

    /// Maps a world position to a grid and usable cell, preferring the
    /// active grid.
    fn resolve_world(&self, position: Vec2) -> Option<(GridId, GridCoord)> {
        let active_first = self
            .active
            .and_then(|id| self.grid(id))
            .into_iter()
            .chain(self.grids.iter().filter(|grid| Some(grid.id()) != self.active));
        for grid in active_first {
            if !grid.contains_position(position) {
                continue;
            }
            if let Some(cell) = grid.resolve_position(position) {
                return Some((grid.id(), cell));
            }
        }
        None
    }

    fn set_standing_override(
        &mut self,
        grid: GridId,
        cell: GridCoord,
        blocking: bool,
        events: &mut Vec<Event>,
    ) {
        if let Some(grid_state) = self.grid_mut(grid) {
            if grid_state.set_override(cell, blocking) {
                events.push(Event::TerrainChanged { grid, cell });
            }
        }
    }
}

/// Executes a command against the world, appending every resulting event.
pub fn apply(world: &mut World, command: Command, events: &mut Vec<Event>) {
    match command {
        Command::LoadGrid { terrain } => {
            let id = GridId::new(world.next_grid);
            world.next_grid += 1;
            let grid = Grid::from_map(id, &terrain);
            debug!(
                grid = id.get(),
                width = grid.width(),
                height = grid.height(),
                "grid loaded"
            );
            world.grids.push(grid);
            let _ = world.transit.insert(id, TransitGrid::new());
            if world.active.is_none() {
                world.active = Some(id);
            }
            events.push(Event::GridLoaded { grid: id });
        }
        Command::SetActiveGrid { grid } => {
            if world.grid(grid).is_some() {
                world.active = Some(grid);
            } else {
                warn!(grid = grid.get(), "cannot activate unknown grid");
            }
        }
        Command::RegisterAgent {
            agent,
            position,
            speed,
        } => {
            if world.agents.contains_key(&agent) {
                warn!(agent = agent.get(), "duplicate agent registration");
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::AlreadyRegistered,
                });
                return;
            }
            let Some((grid, cell)) = world.resolve_world(position) else {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::OutsideGrids,
                });
                return;
            };
            let center = world
                .grid(grid)
                .and_then(|state| state.cell_center(cell))
                .unwrap_or(position);
            let _ = world.agents.insert(
                agent,
                Agent {
                    grid,
                    cell,
                    position: center,
                    speed,
                    pending_speed: None,
                    idle: true,
                    facing: Direction::South,
                    motion: None,
                },
            );
            world.set_standing_override(grid, cell, true, events);
            events.push(Event::AgentRegistered { agent, grid, cell });
        }
        Command::PlaceAgent { agent, position } => {
            if !world.agents.contains_key(&agent) {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::UnknownAgent,
                });
                return;
            }
            let Some((grid, cell)) = world.resolve_world(position) else {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::OutsideGrids,
                });
                return;
            };
            let (old_grid, old_cell) = {
                let state = &world.agents[&agent];
                (state.grid, state.cell)
            };
            if let Some(transit) = world.transit.get_mut(&old_grid) {
                transit.release(agent);
            }
            world.set_standing_override(old_grid, old_cell, false, events);
            let center = world
                .grid(grid)
                .and_then(|state| state.cell_center(cell))
                .unwrap_or(position);
            if let Some(state) = world.agents.get_mut(&agent) {
                state.grid = grid;
                state.cell = cell;
                state.position = center;
                state.idle = true;
                state.motion = None;
            }
            world.set_standing_override(grid, cell, true, events);
            events.push(Event::AgentPlaced { agent, grid, cell });
        }
        Command::SetAgentSpeed { agent, speed } => {
            let Some(state) = world.agents.get_mut(&agent) else {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::UnknownAgent,
                });
                return;
            };
            if state.motion.is_some() {
                state.pending_speed = Some(speed);
            } else {
                state.speed = speed;
            }
        }
        Command::WakeAgent { agent } => {
            let Some(state) = world.agents.get_mut(&agent) else {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::UnknownAgent,
                });
                return;
            };
            let (grid, cell) = (state.grid, state.cell);
            state.idle = false;
            world.set_standing_override(grid, cell, false, events);
            events.push(Event::AgentWoken { agent, cell });
        }
        Command::HaltAgent { agent } => {
            let Some(state) = world.agents.get_mut(&agent) else {
                events.push(Event::AgentRejected {
                    agent,
                    reason: RegistrationError::UnknownAgent,
                });
                return;
            };
            let (grid, cell) = (state.grid, state.cell);
            state.idle = true;
            state.motion = None;
            if let Some(transit) = world.transit.get_mut(&grid) {
                transit.release(agent);
            }
            world.set_standing_override(grid, cell, true, events);
            events.push(Event::AgentHalted { agent, cell });
        }
        Command::StepAgent {
            agent,
            to,
            final_step,
        } => step_agent(world, agent, to, final_step, events),
        Command::CancelStep { agent } => {
            let Some(state) = world.agents.get_mut(&agent) else {
                warn!(agent = agent.get(), "cannot cancel step of unknown agent");
                return;
            };
            if let Some(motion) = state.motion.as_mut() {
                motion.request_cancel();
            }
        }
        Command::Tick { dt } => {
            events.push(Event::TimeAdvanced { dt });
            let dt = dt.as_secs_f32();
            let mut completions = Vec::new();
            for (id, state) in world.agents.iter_mut() {
                let Some(motion) = state.motion.as_mut() else {
                    continue;
                };
                match motion.advance(dt) {
                    StepOutcome::InFlight => {
                        state.position = motion.position();
                    }
                    StepOutcome::Completed { cancelled } => {
                        state.position = motion.position();
                        state.motion = None;
                        if let Some(speed) = state.pending_speed.take() {
                            state.speed = speed;
                        }
                        completions.push((*id, state.grid, state.cell, cancelled));
                    }
                }
            }
            for (agent, grid, cell, cancelled) in completions {
                if let Some(transit) = world.transit.get_mut(&grid) {
                    transit.release(agent);
                }
                events.push(Event::StepCompleted {
                    agent,
                    cell,
                    cancelled,
                });
            }
        }
    }
}

fn step_agent(
    world: &mut World,
    agent: AgentId,
    to: GridCoord,
    final_step: bool,
    events: &mut Vec<Event>,
) {
    let Some(state) = world.agents.get(&agent) else {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::UnknownAgent,
        });
        return;
    };
    if state.motion.is_some() {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::AlreadyStepping,
        });
        return;
    }
    let (grid_id, from, idle) = (state.grid, state.cell, state.idle);
    if !from.adjacent_to(to) {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::NotAdjacent,
        });
        return;
    }
    // An idle agent's own standing override would otherwise veto the edge.
    if idle {
        world.set_standing_override(grid_id, from, false, events);
        if let Some(state) = world.agents.get_mut(&agent) {
            state.idle = false;
        }
        events.push(Event::AgentWoken { agent, cell: from });
    }
    let Some(direction) = Direction::between(from, to) else {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::NotAdjacent,
        });
        return;
    };
    let (traversable, from_center, to_center, tile_size, entering_difficult) =
        match world.grid(grid_id) {
            Some(grid) => (
                grid.edge(from, direction),
                grid.cell_center(from),
                grid.cell_center(to),
                grid.tile_size(),
                grid.is_difficult(to),
            ),
            None => (false, None, None, 0.0, false),
        };
    let (Some(from_center), Some(to_center)) = (from_center, to_center) else {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::Unreachable,
        });
        return;
    };
    if !traversable {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::Unreachable,
        });
        return;
    }
    // Steps are serialized through the reservation layer: a cell already
    // claimed by another agent's in-flight step refuses this one.
    let contested = world.transit.get(&grid_id).is_some_and(|transit| {
        crate::transit::step_claims(from, to)
            .iter()
            .any(|(coord, _)| {
                transit
                    .claim_at(*coord)
                    .is_some_and(|claim| claim.agent() != agent)
            })
    });
    if contested {
        events.push(Event::StepRejected {
            agent,
            to,
            reason: StepError::Contested,
        });
        return;
    }
    let Some(state) = world.agents.get_mut(&agent) else {
        return;
    };
    if let Some(speed) = state.pending_speed.take() {
        state.speed = speed;
    }
    let mut duration = world.config.step_time(state.speed);
    if entering_difficult {
        duration *= DIFFICULT_DURATION_FACTOR;
    }
    let tolerance = tile_size * SNAP_TOLERANCE_FACTOR;
    state.motion = Some(StepMotion::new(
        from,
        to,
        from_center,
        to_center,
        duration,
        tolerance,
        final_step,
    ));
    // The agent's logical cell moves at departure so a later search starts
    // from where the agent will be, even if this step is cancelled.
    state.cell = to;
    state.facing = direction;
    if let Some(transit) = world.transit.get_mut(&grid_id) {
        transit.claim_step(agent, from, to);
    }
    events.push(Event::StepStarted { agent, from, to });
}

/// Read-only snapshots of world state for systems and adapters.
pub mod query {
    use glam::Vec2;
    use gridroute_core::{AgentId, Direction, GridCoord, GridId};

    use crate::grid::Grid;
    use crate::transit::TransitGrid;
    use crate::World;

    /// Immutable snapshot of one agent.
    #[derive(Clone, Copy, Debug, PartialEq)]
    pub struct AgentView {
        agent: AgentId,
        grid: GridId,
        cell: GridCoord,
        position: Vec2,
        speed: f32,
        idle: bool,
        facing: Direction,
        step: Option<(GridCoord, GridCoord)>,
    }

    impl AgentView {
        /// Identity of the agent.
        #[must_use]
        pub const fn agent(&self) -> AgentId {
            self.agent
        }

        /// Grid the agent occupies.
        #[must_use]
        pub const fn grid(&self) -> GridId {
            self.grid
        }

        /// Cell the agent occupies (the arrival cell while mid-step).
        #[must_use]
        pub const fn cell(&self) -> GridCoord {
            self.cell
        }

        /// Interpolated world position.
        #[must_use]
        pub const fn position(&self) -> Vec2 {
            self.position
        }

        /// Current movement rate.
        #[must_use]
        pub const fn speed(&self) -> f32 {
            self.speed
        }

        /// Reports whether the agent is halted with its standing cell
        /// blocked.
        #[must_use]
        pub const fn idle(&self) -> bool {
            self.idle
        }

        /// Direction of the current or most recent step. Agents that have
        /// never stepped face south, where renderers point a fresh sprite.
        #[must_use]
        pub const fn facing(&self) -> Direction {
            self.facing
        }

        /// Departure and arrival cells of the in-flight step, if any.
        #[must_use]
        pub const fn step(&self) -> Option<(GridCoord, GridCoord)> {
            self.step
        }

        /// Reports whether a step is currently executing.
        #[must_use]
        pub const fn mid_step(&self) -> bool {
            self.step.is_some()
        }
    }

    /// Snapshot of a single agent, or `None` when unregistered.
    #[must_use]
    pub fn agent(world: &World, agent: AgentId) -> Option<AgentView> {
        world.agents.get(&agent).map(|state| AgentView {
            agent,
            grid: state.grid,
            cell: state.cell,
            position: state.position,
            speed: state.speed,
            idle: state.idle,
            facing: state.facing,
            step: state.motion.as_ref().map(|motion| (motion.from(), motion.to())),
        })
    }

    /// Snapshots of every registered agent, in identifier order.
    pub fn agents(world: &World) -> impl Iterator<Item = AgentView> + '_ {
        world.agents.keys().filter_map(|id| agent(world, *id))
    }

    /// Traversability view of one grid.
    #[must_use]
    pub fn nav(world: &World, grid: GridId) -> Option<&Grid> {
        world.grid(grid)
    }

    /// Reservation layer of one grid.
    #[must_use]
    pub fn transit(world: &World, grid: GridId) -> Option<&TransitGrid> {
        world.transit.get(&grid)
    }

    /// Grid preferred by ambient world-position lookups.
    #[must_use]
    pub fn active_grid(world: &World) -> Option<GridId> {
        world.active
    }
}
