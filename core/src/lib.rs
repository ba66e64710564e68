#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Gridroute engine.
//!
//! This crate defines the message surface that connects adapters, the
//! authoritative world, and the navigation systems. Adapters submit
//! [`Command`] values describing desired mutations, the world executes those
//! commands via its `apply` entry point, and then broadcasts [`Event`] values
//! for systems to react to deterministically. Systems consume event streams,
//! query immutable snapshots, and respond exclusively with new command
//! batches.

use std::collections::VecDeque;
use std::ops::{Add, Sub};
use std::time::Duration;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Cost of one orthogonal step between adjacent cells (the classic `D`).
pub const ORTHOGONAL_COST: u32 = 10;

/// Cost of one diagonal step between adjacent cells (the classic `DD`).
pub const DIAGONAL_COST: u32 = 14;

/// Octile heuristic correction applied per diagonal shortcut, equal to
/// `DIAGONAL_COST - 2 * ORTHOGONAL_COST`.
pub const DIAGONAL_SHORTCUT: i32 = DIAGONAL_COST as i32 - 2 * ORTHOGONAL_COST as i32;

/// Computes the cost of one step between adjacent cells.
///
/// Diagonal steps cost [`DIAGONAL_COST`], orthogonal steps
/// [`ORTHOGONAL_COST`]; either is doubled when the cell being entered is
/// difficult terrain.
#[must_use]
pub const fn step_cost(diagonal: bool, entering_difficult: bool) -> u32 {
    let base = if diagonal {
        DIAGONAL_COST
    } else {
        ORTHOGONAL_COST
    };
    if entering_difficult {
        base * 2
    } else {
        base
    }
}

/// Octile distance estimate between two cells under the integer cost model.
#[must_use]
pub fn octile_estimate(from: GridCoord, to: GridCoord) -> u32 {
    let dx = i64::from(from.x().abs_diff(to.x()));
    let dy = i64::from(from.y().abs_diff(to.y()));
    let estimate = i64::from(ORTHOGONAL_COST) * (dx + dy) + i64::from(DIAGONAL_SHORTCUT) * dx.min(dy);
    u32::try_from(estimate).unwrap_or(0)
}

/// Location of a single grid cell expressed as signed x and y coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridCoord {
    x: i32,
    y: i32,
}

impl GridCoord {
    /// Creates a new grid coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Horizontal component of the coordinate.
    #[must_use]
    pub const fn x(&self) -> i32 {
        self.x
    }

    /// Vertical component of the coordinate. Larger values lie further south.
    #[must_use]
    pub const fn y(&self) -> i32 {
        self.y
    }

    /// Chebyshev distance between two coordinates (diagonal steps count one).
    #[must_use]
    pub fn chebyshev_distance(self, other: GridCoord) -> u32 {
        self.x.abs_diff(other.x).max(self.y.abs_diff(other.y))
    }

    /// Reports whether `other` is one of the eight cells surrounding `self`.
    #[must_use]
    pub fn adjacent_to(self, other: GridCoord) -> bool {
        self != other && self.chebyshev_distance(other) == 1
    }

    /// Reports whether a step between the two coordinates changes both axes.
    #[must_use]
    pub fn diagonal_to(self, other: GridCoord) -> bool {
        self.x != other.x && self.y != other.y
    }
}

impl Add for GridCoord {
    type Output = GridCoord;

    fn add(self, other: GridCoord) -> GridCoord {
        GridCoord::new(self.x + other.x, self.y + other.y)
    }
}

impl Sub for GridCoord {
    type Output = GridCoord;

    fn sub(self, other: GridCoord) -> GridCoord {
        GridCoord::new(self.x - other.x, self.y - other.y)
    }
}

/// Compass directions available to a single grid step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Movement toward decreasing y.
    North,
    /// Movement toward increasing x and decreasing y.
    Northeast,
    /// Movement toward increasing x.
    East,
    /// Movement toward increasing x and y.
    Southeast,
    /// Movement toward increasing y.
    South,
    /// Movement toward decreasing x and increasing y.
    Southwest,
    /// Movement toward decreasing x.
    West,
    /// Movement toward decreasing x and y.
    Northwest,
}

impl Direction {
    /// All eight directions in clockwise order starting from north.
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::Northeast,
        Direction::East,
        Direction::Southeast,
        Direction::South,
        Direction::Southwest,
        Direction::West,
        Direction::Northwest,
    ];

    /// Coordinate delta produced by one step in this direction.
    #[must_use]
    pub const fn offset(self) -> GridCoord {
        match self {
            Direction::North => GridCoord::new(0, -1),
            Direction::Northeast => GridCoord::new(1, -1),
            Direction::East => GridCoord::new(1, 0),
            Direction::Southeast => GridCoord::new(1, 1),
            Direction::South => GridCoord::new(0, 1),
            Direction::Southwest => GridCoord::new(-1, 1),
            Direction::West => GridCoord::new(-1, 0),
            Direction::Northwest => GridCoord::new(-1, -1),
        }
    }

    /// The exact reverse of this direction.
    #[must_use]
    pub const fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::Northeast => Direction::Southwest,
            Direction::East => Direction::West,
            Direction::Southeast => Direction::Northwest,
            Direction::South => Direction::North,
            Direction::Southwest => Direction::Northeast,
            Direction::West => Direction::East,
            Direction::Northwest => Direction::Southeast,
        }
    }

    /// Direction of travel between two distinct coordinates, judged by the
    /// sign of each axis delta. Returns `None` when the coordinates match.
    #[must_use]
    pub fn between(from: GridCoord, to: GridCoord) -> Option<Direction> {
        let diff = to - from;
        match (diff.x().signum(), diff.y().signum()) {
            (0, 0) => None,
            (1, -1) => Some(Direction::Northeast),
            (-1, -1) => Some(Direction::Northwest),
            (1, 1) => Some(Direction::Southeast),
            (-1, 1) => Some(Direction::Southwest),
            (1, 0) => Some(Direction::East),
            (-1, 0) => Some(Direction::West),
            (0, 1) => Some(Direction::South),
            _ => Some(Direction::North),
        }
    }
}

/// Phase of a transit reservation relative to the step that created it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransitPhase {
    /// The cell is occupied while the agent departs from it.
    Departure,
    /// The cell is occupied as the destination of the step.
    Arrival,
}

/// Direction-and-phase code stored in a transit reservation.
///
/// Departure codes occupy the odd range 1..=15 in clockwise direction order;
/// the matching arrival code is always one greater. Raw codes outside those
/// ranges cannot be decoded and are treated by the collision classifier as
/// "wait and retry".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransitCode(u8);

impl TransitCode {
    /// Encodes a direction of travel and reservation phase.
    #[must_use]
    pub const fn new(direction: Direction, phase: TransitPhase) -> Self {
        let departure = match direction {
            Direction::North => 1,
            Direction::Northeast => 3,
            Direction::East => 5,
            Direction::Southeast => 7,
            Direction::South => 9,
            Direction::Southwest => 11,
            Direction::West => 13,
            Direction::Northwest => 15,
        };
        match phase {
            TransitPhase::Departure => Self(departure),
            TransitPhase::Arrival => Self(departure + 1),
        }
    }

    /// Wraps a raw code without validating it.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// Raw numeric representation of the code.
    #[must_use]
    pub const fn raw(&self) -> u8 {
        self.0
    }

    /// Decodes the direction and phase, or `None` for an undecodable code.
    #[must_use]
    pub const fn decode(&self) -> Option<(Direction, TransitPhase)> {
        let (departure, phase) = if self.0 % 2 == 1 {
            (self.0, TransitPhase::Departure)
        } else if self.0 > 0 {
            (self.0 - 1, TransitPhase::Arrival)
        } else {
            return None;
        };
        let direction = match departure {
            1 => Direction::North,
            3 => Direction::Northeast,
            5 => Direction::East,
            7 => Direction::Southeast,
            9 => Direction::South,
            11 => Direction::Southwest,
            13 => Direction::West,
            15 => Direction::Northwest,
            _ => return None,
        };
        Some((direction, phase))
    }
}

/// Classification applied to one terrain cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainKind {
    /// Ordinary traversable terrain.
    Walkable,
    /// Traversable terrain that doubles the cost of entering it.
    Difficult,
    /// Terrain no agent may enter.
    Blocking,
    /// Terrain that has not been classified yet.
    Undefined,
}

impl TerrainKind {
    /// Parses a collaborator-supplied terrain tag. Unknown tags fall back to
    /// [`TerrainKind::Walkable`].
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "Blocking" => TerrainKind::Blocking,
            "Difficult" => TerrainKind::Difficult,
            _ => TerrainKind::Walkable,
        }
    }

    /// Precedence rank used when several classifications target one cell;
    /// lower ranks win.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            TerrainKind::Blocking => 1,
            TerrainKind::Difficult => 2,
            TerrainKind::Walkable => 3,
            TerrainKind::Undefined => 100,
        }
    }

    /// Reports whether agents are forbidden from entering this terrain.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(self, TerrainKind::Blocking)
    }
}

/// Unique identifier assigned to an agent by its owning collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(u32);

impl AgentId {
    /// Creates a new agent identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Identifier of one loaded grid within the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridId(u32);

impl GridId {
    /// Creates a new grid identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

/// Ordered sequence of grid cells from the next step to the destination.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Path {
    steps: VecDeque<GridCoord>,
}

impl Path {
    /// Creates a path from steps ordered first-step to destination.
    #[must_use]
    pub fn from_steps(steps: Vec<GridCoord>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Next cell the path visits, without consuming it.
    #[must_use]
    pub fn peek_next(&self) -> Option<GridCoord> {
        self.steps.front().copied()
    }

    /// Removes and returns the next cell the path visits.
    pub fn pop_next(&mut self) -> Option<GridCoord> {
        self.steps.pop_front()
    }

    /// Final destination of the path, without consuming it.
    #[must_use]
    pub fn destination(&self) -> Option<GridCoord> {
        self.steps.back().copied()
    }

    /// Appends another path after this one's destination.
    pub fn append(&mut self, mut tail: Path) {
        self.steps.append(&mut tail.steps);
    }

    /// Inserts another path ahead of this one's next step.
    pub fn prepend(&mut self, head: Path) {
        for step in head.steps.into_iter().rev() {
            self.steps.push_front(step);
        }
    }

    /// Iterator over the remaining steps in traversal order.
    pub fn iter(&self) -> impl Iterator<Item = GridCoord> + '_ {
        self.steps.iter().copied()
    }

    /// Number of steps remaining.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Reports whether no steps remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Per-cell terrain input supplied by the collaborator that loads maps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TerrainSpec {
    /// Classification of the cell.
    pub kind: TerrainKind,
    /// World-space anchor of the cell's minimum corner.
    pub anchor: Vec2,
}

/// Raw per-cell map data consumed once at grid construction.
///
/// Cells left unset are fillers: they keep the grid rectangular, block
/// traversal, and carry no true world position.
#[derive(Clone, Debug, PartialEq)]
pub struct TerrainMap {
    width: u32,
    height: u32,
    tile_size: f32,
    origin: Vec2,
    cells: Vec<Option<TerrainSpec>>,
}

impl TerrainMap {
    /// Creates a map of the given dimensions with every cell a filler.
    #[must_use]
    pub fn new(width: u32, height: u32, tile_size: f32, origin: Vec2) -> Self {
        let capacity_u64 = u64::from(width) * u64::from(height);
        let capacity = usize::try_from(capacity_u64).unwrap_or(0);
        Self {
            width,
            height,
            tile_size,
            origin,
            cells: vec![None; capacity],
        }
    }

    /// Classifies a cell, deriving its anchor from the map origin and tile
    /// size. Out-of-bounds coordinates are ignored.
    pub fn set(&mut self, coord: GridCoord, kind: TerrainKind) {
        let anchor = self.origin
            + Vec2::new(
                coord.x() as f32 * self.tile_size,
                coord.y() as f32 * self.tile_size,
            );
        self.set_with_anchor(coord, kind, anchor);
    }

    /// Classifies a cell with an explicit world-space anchor. Out-of-bounds
    /// coordinates are ignored. When several classifications target the same
    /// cell, the lower [`TerrainKind::rank`] wins.
    pub fn set_with_anchor(&mut self, coord: GridCoord, kind: TerrainKind, anchor: Vec2) {
        if let Some(index) = self.index(coord) {
            let slot = &mut self.cells[index];
            let outranked = slot
                .as_ref()
                .is_some_and(|existing| existing.kind.rank() < kind.rank());
            if !outranked {
                *slot = Some(TerrainSpec { kind, anchor });
            }
        }
    }

    /// Terrain supplied for the cell, or `None` for fillers and
    /// out-of-bounds coordinates.
    #[must_use]
    pub fn cell(&self, coord: GridCoord) -> Option<&TerrainSpec> {
        self.index(coord).and_then(|index| self.cells[index].as_ref())
    }

    /// Number of columns in the map.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows in the map.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Side length of one square cell in world units.
    #[must_use]
    pub const fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// World-space anchor of the cell at (0, 0).
    #[must_use]
    pub const fn origin(&self) -> Vec2 {
        self.origin
    }

    fn index(&self, coord: GridCoord) -> Option<usize> {
        let x = usize::try_from(coord.x()).ok()?;
        let y = usize::try_from(coord.y()).ok()?;
        let width = usize::try_from(self.width).ok()?;
        let height = usize::try_from(self.height).ok()?;
        if x < width && y < height {
            Some(y * width + x)
        } else {
            None
        }
    }
}

/// Reasons an agent registration or placement request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum RegistrationError {
    /// An agent with the same identity is already registered.
    #[error("an agent with this identity is already registered")]
    AlreadyRegistered,
    /// No agent with the provided identity exists.
    #[error("no agent with this identity is registered")]
    UnknownAgent,
    /// The supplied position lies outside every loaded grid, or no usable
    /// cell exists near it.
    #[error("position is outside every loaded grid")]
    OutsideGrids,
}

/// Reasons a step request may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum StepError {
    /// No agent with the provided identity exists.
    #[error("no agent with this identity is registered")]
    UnknownAgent,
    /// The agent is already executing a step.
    #[error("agent is already mid-step")]
    AlreadyStepping,
    /// The requested destination is not adjacent to the agent's cell.
    #[error("destination is not adjacent to the agent")]
    NotAdjacent,
    /// No traversable edge leads to the requested destination.
    #[error("no traversable edge leads to the destination")]
    Unreachable,
    /// Another agent holds a transit reservation over a cell the step needs.
    #[error("step conflicts with an existing transit reservation")]
    Contested,
}

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Loads a new grid from raw per-cell terrain data.
    LoadGrid {
        /// Materialised map data for the new grid.
        terrain: TerrainMap,
    },
    /// Selects the grid checked first by ambient world-position queries.
    SetActiveGrid {
        /// Grid to prefer.
        grid: GridId,
    },
    /// Registers an externally owned agent at a world position.
    RegisterAgent {
        /// Stable identity supplied by the owning collaborator.
        agent: AgentId,
        /// World position to place the agent at.
        position: Vec2,
        /// Abstract movement rate of the agent.
        speed: f32,
    },
    /// Re-places an already registered agent at a new world position.
    PlaceAgent {
        /// Identity of the agent to move.
        agent: AgentId,
        /// World position to place the agent at.
        position: Vec2,
    },
    /// Updates an agent's movement rate. Takes effect at the next step if
    /// the agent is mid-step.
    SetAgentSpeed {
        /// Identity of the agent to update.
        agent: AgentId,
        /// New abstract movement rate.
        speed: f32,
    },
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time elapsed since the previous tick.
        dt: Duration,
    },
    /// Removes the blocking override from the agent's standing cell before
    /// it starts moving.
    WakeAgent {
        /// Identity of the agent about to move.
        agent: AgentId,
    },
    /// Marks the agent stationary, re-applying the blocking override to its
    /// standing cell.
    HaltAgent {
        /// Identity of the agent that stopped.
        agent: AgentId,
    },
    /// Requests that an agent begin a single step to an adjacent cell.
    StepAgent {
        /// Identity of the agent to move.
        agent: AgentId,
        /// Adjacent cell the agent should step into.
        to: GridCoord,
        /// Selects the final-step termination test.
        final_step: bool,
    },
    /// Requests cancellation of the agent's in-flight step at the next tick.
    CancelStep {
        /// Identity of the agent whose step should be cancelled.
        agent: AgentId,
    },
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Confirms that a grid was loaded and its graph built.
    GridLoaded {
        /// Identifier assigned to the new grid.
        grid: GridId,
    },
    /// Confirms that an agent was registered and placed.
    AgentRegistered {
        /// Identity of the new agent.
        agent: AgentId,
        /// Grid the agent was placed on.
        grid: GridId,
        /// Cell the agent occupies.
        cell: GridCoord,
    },
    /// Reports that a registration or placement request was rejected.
    AgentRejected {
        /// Identity supplied in the request.
        agent: AgentId,
        /// Specific reason the request failed.
        reason: RegistrationError,
    },
    /// Confirms that an agent was manually re-placed.
    AgentPlaced {
        /// Identity of the agent.
        agent: AgentId,
        /// Grid the agent now occupies.
        grid: GridId,
        /// Cell the agent now occupies.
        cell: GridCoord,
    },
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that an agent's standing cell is no longer overridden to
    /// blocking.
    AgentWoken {
        /// Identity of the agent.
        agent: AgentId,
        /// Cell the agent stands on.
        cell: GridCoord,
    },
    /// Confirms that an agent halted and its standing cell now blocks.
    /// Doubles as the path-complete notification.
    AgentHalted {
        /// Identity of the agent.
        agent: AgentId,
        /// Cell the agent halted on.
        cell: GridCoord,
    },
    /// Confirms that an agent began a single step.
    StepStarted {
        /// Identity of the stepping agent.
        agent: AgentId,
        /// Cell the step departs from.
        from: GridCoord,
        /// Cell the step arrives into.
        to: GridCoord,
    },
    /// Confirms that an agent finished (or abandoned) a step.
    StepCompleted {
        /// Identity of the agent.
        agent: AgentId,
        /// Cell the agent now occupies.
        cell: GridCoord,
        /// True when the step ended through cancellation.
        cancelled: bool,
    },
    /// Reports that a step request was rejected.
    StepRejected {
        /// Identity of the agent.
        agent: AgentId,
        /// Destination supplied in the request.
        to: GridCoord,
        /// Specific reason the step failed.
        reason: StepError,
    },
    /// Announces that a cell's effective blocking state flipped and its
    /// neighborhood edges were rebuilt.
    TerrainChanged {
        /// Grid containing the changed cell.
        grid: GridId,
        /// Cell whose effective classification flipped.
        cell: GridCoord,
    },
}
