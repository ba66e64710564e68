#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Command-line demo that drives the navigation engine over a terrain map.
//!
//! Loads an ASCII map (or paints an open field), registers a handful of
//! agents at random open cells, sends each one toward a random destination,
//! and pumps the engine tick by tick until every journey resolves. Prints
//! the map with final agent positions overlaid and a journey report.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use glam::Vec2;
use gridroute_core::{AgentId, Command, Event, GridCoord, TerrainKind, TerrainMap};
use gridroute_system_routing::Routing;
use gridroute_world::motion::MotionConfig;
use gridroute_world::{apply, query, World};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

/// Grid navigation demo: routes agents across a terrain map.
#[derive(Parser)]
#[command(name = "gridroute", about = "Grid navigation demo", version)]
struct Cli {
    /// ASCII map file: one row per line, cells `W` (walkable), `D`
    /// (difficult), `B` (blocking), `.` (filler)
    #[arg(long)]
    map: Option<PathBuf>,

    /// Open-field width when no map file is given
    #[arg(long, default_value_t = 20)]
    width: u32,

    /// Open-field height when no map file is given
    #[arg(long, default_value_t = 20)]
    height: u32,

    /// Number of agents to route
    #[arg(long, default_value_t = 4)]
    agents: u32,

    /// Seed for agent placement and destinations
    #[arg(long, default_value_t = 7)]
    seed: u64,

    /// Maximum number of ticks to simulate
    #[arg(long, default_value_t = 600)]
    ticks: u32,

    /// Milliseconds of simulated time per tick
    #[arg(long, default_value_t = 100)]
    dt_ms: u64,

    /// Verbose engine tracing
    #[arg(short, long)]
    verbose: bool,
}

/// One agent's requested trip, kept for the final report.
struct Journey {
    agent: AgentId,
    start: GridCoord,
    destination: GridCoord,
}

/// Owns the world and the routing system and pumps commands between them.
struct Driver {
    world: World,
    routing: Routing,
}

impl Driver {
    fn new() -> Self {
        Self {
            world: World::new(MotionConfig::default()),
            routing: Routing::new(),
        }
    }

    /// Applies a command batch, feeds the events back through routing, and
    /// repeats until no new commands appear.
    fn drive(&mut self, mut commands: Vec<Command>) -> Vec<Event> {
        let mut all = Vec::new();
        while !commands.is_empty() {
            let mut events = Vec::new();
            for command in commands.drain(..) {
                apply(&mut self.world, command, &mut events);
            }
            let mut next = Vec::new();
            self.routing.handle(&self.world, &events, &mut next);
            all.extend(events);
            commands = next;
        }
        all
    }

    fn register(&mut self, agent: AgentId, cell: GridCoord, speed: f32) -> Result<()> {
        let position = Vec2::new(cell.x() as f32 + 0.5, cell.y() as f32 + 0.5);
        let events = self.drive(vec![Command::RegisterAgent {
            agent,
            position,
            speed,
        }]);
        let registered = events.iter().any(|event| {
            matches!(event, Event::AgentRegistered { agent: confirmed, .. } if *confirmed == agent)
        });
        if !registered {
            bail!("agent {} was rejected at ({}, {})", agent.get(), cell.x(), cell.y());
        }
        Ok(())
    }

    fn request_move(&mut self, agent: AgentId, destination: GridCoord) {
        let mut commands = Vec::new();
        self.routing
            .request_move(&self.world, agent, destination, &mut commands);
        let _ = self.drive(commands);
    }

    fn tick(&mut self, dt: Duration) {
        let _ = self.drive(vec![Command::Tick { dt }]);
    }

    /// Every cell of the active grid that is currently traversable.
    fn open_cells(&self, width: u32, height: u32) -> Vec<GridCoord> {
        let Some(nav) = query::active_grid(&self.world)
            .and_then(|grid| query::nav(&self.world, grid))
        else {
            return Vec::new();
        };
        let mut cells = Vec::new();
        for y in 0..height {
            for x in 0..width {
                let coord = GridCoord::new(x as i32, y as i32);
                if !nav.is_blocked(coord) {
                    cells.push(coord);
                }
            }
        }
        cells
    }

    /// Terrain sketch of the active grid with agent markers overlaid.
    fn sketch(&self, journeys: &[Journey]) -> Option<String> {
        let nav = query::active_grid(&self.world)
            .and_then(|grid| query::nav(&self.world, grid))?;
        let mut rows: Vec<Vec<char>> = nav
            .terrain_sketch()
            .lines()
            .map(|line| line.chars().collect())
            .collect();
        for (index, journey) in journeys.iter().enumerate() {
            let Some(view) = query::agent(&self.world, journey.agent) else {
                continue;
            };
            let cell = view.cell();
            if cell.x() < 0 || cell.y() < 0 {
                continue;
            }
            if let Some(slot) = rows
                .get_mut(cell.y() as usize)
                .and_then(|row| row.get_mut(cell.x() as usize))
            {
                *slot = marker(index);
            }
        }
        let lines: Vec<String> = rows
            .into_iter()
            .map(|row| row.into_iter().collect())
            .collect();
        Some(lines.join("\n"))
    }
}

fn marker(index: usize) -> char {
    if index < 26 {
        (b'a' + index as u8) as char
    } else {
        '@'
    }
}

/// Parses an ASCII map file into raw terrain data.
fn load_map(path: &Path) -> Result<TerrainMap> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading map file {}", path.display()))?;
    let rows: Vec<&str> = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .collect();
    if rows.is_empty() {
        bail!("map file {} holds no rows", path.display());
    }
    let width = rows[0].chars().count();
    let mut map = TerrainMap::new(width as u32, rows.len() as u32, 1.0, Vec2::ZERO);
    for (y, row) in rows.iter().enumerate() {
        if row.chars().count() != width {
            bail!(
                "map row {} is {} cells wide, expected {width}",
                y + 1,
                row.chars().count()
            );
        }
        for (x, tag) in row.chars().enumerate() {
            let coord = GridCoord::new(x as i32, y as i32);
            match tag {
                'W' => map.set(coord, TerrainKind::Walkable),
                'D' => map.set(coord, TerrainKind::Difficult),
                'B' => map.set(coord, TerrainKind::Blocking),
                '.' => {}
                other => bail!("map row {} holds unknown terrain tag {other:?}", y + 1),
            }
        }
    }
    Ok(map)
}

fn open_field(width: u32, height: u32) -> TerrainMap {
    let mut map = TerrainMap::new(width, height, 1.0, Vec2::ZERO);
    for y in 0..height {
        for x in 0..width {
            map.set(GridCoord::new(x as i32, y as i32), TerrainKind::Walkable);
        }
    }
    map
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    fmt().with_env_filter(filter).with_target(false).init();

    let map = match &cli.map {
        Some(path) => load_map(path)?,
        None => open_field(cli.width, cli.height),
    };
    let (width, height) = (map.width(), map.height());
    info!(width, height, agents = cli.agents, seed = cli.seed, "starting demo");

    let mut driver = Driver::new();
    let _ = driver.drive(vec![Command::LoadGrid { terrain: map }]);

    let open = driver.open_cells(width, height);
    let wanted = cli.agents as usize * 2;
    if open.len() < wanted {
        bail!(
            "map has {} open cells, need {wanted} to place {} agents with destinations",
            open.len(),
            cli.agents
        );
    }
    let mut rng = StdRng::seed_from_u64(cli.seed);
    let picks: Vec<GridCoord> = open.choose_multiple(&mut rng, wanted).copied().collect();

    let mut journeys = Vec::new();
    for index in 0..cli.agents as usize {
        let agent = AgentId::new(index as u32 + 1);
        let start = picks[index];
        let destination = picks[cli.agents as usize + index];
        let speed = 1.0 + 0.25 * (index % 3) as f32;
        driver.register(agent, start, speed)?;
        journeys.push(Journey {
            agent,
            start,
            destination,
        });
    }
    for journey in &journeys {
        driver.request_move(journey.agent, journey.destination);
    }

    let dt = Duration::from_millis(cli.dt_ms);
    let mut ticks_used = 0;
    for _ in 0..cli.ticks {
        if journeys
            .iter()
            .all(|journey| !driver.routing.is_navigating(journey.agent))
        {
            break;
        }
        driver.tick(dt);
        ticks_used += 1;
    }

    let sketch = driver.sketch(&journeys).context("no grid loaded")?;
    println!("{sketch}");
    println!();
    for (index, journey) in journeys.iter().enumerate() {
        let cell = query::agent(&driver.world, journey.agent)
            .map(|view| view.cell())
            .unwrap_or(journey.start);
        let outcome = if cell == journey.destination {
            "arrived"
        } else if driver.routing.is_navigating(journey.agent) {
            "still travelling"
        } else {
            "gave up"
        };
        println!(
            "{}: ({}, {}) -> ({}, {}), now at ({}, {}): {outcome}",
            marker(index),
            journey.start.x(),
            journey.start.y(),
            journey.destination.x(),
            journey.destination.y(),
            cell.x(),
            cell.y(),
        );
    }
    let metrics = driver.routing.metrics();
    println!(
        "{ticks_used} ticks, {} searches, {} completed, {} failed, {} abandoned",
        metrics.searches(),
        metrics.completed_moves(),
        metrics.failed_moves(),
        metrics.abandoned_moves(),
    );
    Ok(())
}
