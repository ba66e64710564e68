#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Grid search engines for the Gridroute routing system.
//!
//! Both engines run over the edge graph a [`Grid`] maintains, so they never
//! re-derive traversability from raw terrain. A* answers single-destination
//! queries under the octile cost model and accepts a [`SearchBias`] that
//! reroutes around cells other agents have claimed; the Dijkstra variant
//! keeps the same contract over the single-key queue as an uninformed
//! fallback.

pub mod queue;

use std::collections::{HashMap, HashSet};

use gridroute_core::{octile_estimate, step_cost, GridCoord, Path};
use gridroute_world::grid::Grid;
use tracing::{debug, trace};

use crate::queue::{DistKey, IndexedQueue, ScoredKey};

/// Cells a search should route around.
///
/// Plain avoided cells are refused anywhere along the path, the goal
/// included, so a bias that covers the destination makes the search fail.
/// First-step avoids are refused only as the first cell entered from the
/// start, which is how a rerouting agent sidesteps an immediate conflict
/// without giving up the cell entirely.
#[derive(Clone, Debug, Default)]
pub struct SearchBias {
    avoid: HashSet<GridCoord>,
    first_step_avoid: HashSet<GridCoord>,
}

impl SearchBias {
    /// Refuses a cell anywhere along the path.
    pub fn avoid(&mut self, coord: GridCoord) {
        let _ = self.avoid.insert(coord);
    }

    /// Refuses a cell as the first step only.
    pub fn avoid_first_step(&mut self, coord: GridCoord) {
        let _ = self.first_step_avoid.insert(coord);
    }

    /// Reports whether the bias refuses no cells at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.avoid.is_empty() && self.first_step_avoid.is_empty()
    }

    fn refuses(&self, from_start: bool, next: GridCoord) -> bool {
        if self.avoid.contains(&next) {
            return true;
        }
        from_start && self.first_step_avoid.contains(&next)
    }
}

/// Path from `start` to `goal` under the octile cost model.
///
/// The estimate folds terrain surcharges in on top of the octile distance,
/// trading strict admissibility for expansions that agree with the step
/// costs. The returned path excludes the start cell; its last step is the
/// goal. An already satisfied query yields an empty path, an unreachable or
/// blocked goal yields `None`.
#[must_use]
pub fn astar(grid: &Grid, start: GridCoord, goal: GridCoord, bias: &SearchBias) -> Option<Path> {
    if start == goal {
        return Some(Path::default());
    }
    if grid.is_blocked(goal) {
        trace!(?goal, "goal cell is blocked");
        return None;
    }
    let mut open: IndexedQueue<ScoredKey> = IndexedQueue::new();
    let mut cost: HashMap<GridCoord, u32> = HashMap::new();
    let mut came_from: HashMap<GridCoord, GridCoord> = HashMap::new();
    let mut closed: HashSet<GridCoord> = HashSet::new();
    let mut expanded = 0_u32;

    let start_h = octile_estimate(start, goal);
    let _ = open.process(start, ScoredKey::new(start_h, start_h));
    let _ = cost.insert(start, 0);

    while let Some((current, _)) = open.pop_min() {
        if current == goal {
            let path = reconstruct(&came_from, start, goal);
            debug!(?start, ?goal, expanded, steps = path.len(), "path found");
            return Some(path);
        }
        if !closed.insert(current) {
            continue;
        }
        expanded += 1;
        let reached = cost[&current];
        for (_, next) in grid.neighbors(current) {
            if closed.contains(&next) || bias.refuses(current == start, next) {
                continue;
            }
            let diagonal = current.diagonal_to(next);
            let step = step_cost(diagonal, grid.is_difficult(next));
            let through = reached + step;
            if cost.get(&next).is_some_and(|&best| through >= best) {
                continue;
            }
            // The estimate carries the terrain surcharge of the producing
            // move, keeping it in line with step costs that already pay it.
            let h = octile_estimate(next, goal) + (step - step_cost(diagonal, false));
            if open.process(next, ScoredKey::new(through + h, h)) {
                let _ = cost.insert(next, through);
                let _ = came_from.insert(next, current);
            }
        }
    }
    debug!(?start, ?goal, expanded, "goal unreachable");
    None
}

fn reconstruct(came_from: &HashMap<GridCoord, GridCoord>, start: GridCoord, goal: GridCoord) -> Path {
    let mut steps = vec![goal];
    let mut cursor = goal;
    while let Some(&previous) = came_from.get(&cursor) {
        if previous == start {
            break;
        }
        steps.push(previous);
        cursor = previous;
    }
    steps.reverse();
    Path::from_steps(steps)
}

/// Uninformed fallback search with the same external contract as [`astar`].
///
/// Runs the single-key variant over the same cost model, honoring the
/// persistent avoid set but not first-step avoidance. The whole open grid is
/// seeded into the frontier at infinite distance up front; the expansion
/// relaxes cells in place and gives up as soon as only unreached cells
/// remain at the head.
#[must_use]
pub fn dijkstra(grid: &Grid, start: GridCoord, goal: GridCoord, bias: &SearchBias) -> Option<Path> {
    if start == goal {
        return Some(Path::default());
    }
    if grid.is_blocked(start) || grid.is_blocked(goal) {
        trace!(?start, ?goal, "endpoint cell is blocked");
        return None;
    }
    let mut open: IndexedQueue<DistKey> = IndexedQueue::new();
    for y in 0..grid.height() {
        for x in 0..grid.width() {
            let coord = GridCoord::new(x as i32, y as i32);
            if !grid.is_blocked(coord) {
                open.push_back(coord, DistKey::INFINITE);
            }
        }
    }
    let _ = open.process(start, DistKey::new(0));

    let mut came_from: HashMap<GridCoord, GridCoord> = HashMap::new();
    let mut settled = 0_u32;
    while let Some((current, key)) = open.pop_min() {
        if key.is_infinite() {
            break;
        }
        if current == goal {
            let path = reconstruct(&came_from, start, goal);
            debug!(?start, ?goal, settled, steps = path.len(), "path found");
            return Some(path);
        }
        settled += 1;
        for (_, next) in grid.neighbors(current) {
            if bias.refuses(false, next) {
                continue;
            }
            let through =
                key.get() + step_cost(current.diagonal_to(next), grid.is_difficult(next));
            if open.process(next, DistKey::new(through)) {
                let _ = came_from.insert(next, current);
            }
        }
    }
    debug!(?start, ?goal, settled, "goal unreachable");
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use gridroute_core::{GridId, TerrainKind, TerrainMap};

    fn build_grid(width: u32, height: u32, paint: impl Fn(GridCoord) -> TerrainKind) -> Grid {
        let mut map = TerrainMap::new(width, height, 1.0, Vec2::ZERO);
        for y in 0..height {
            for x in 0..width {
                let coord = GridCoord::new(x as i32, y as i32);
                map.set(coord, paint(coord));
            }
        }
        Grid::from_map(GridId::new(0), &map)
    }

    fn open_grid(width: u32, height: u32) -> Grid {
        build_grid(width, height, |_| TerrainKind::Walkable)
    }

    fn path_cost(grid: &Grid, start: GridCoord, path: &Path) -> u32 {
        let mut total = 0;
        let mut previous = start;
        for step in path.iter() {
            total += step_cost(previous.diagonal_to(step), grid.is_difficult(step));
            previous = step;
        }
        total
    }

    #[test]
    fn straight_corridor_yields_a_direct_path() {
        let grid = open_grid(5, 1);
        let start = GridCoord::new(0, 0);
        let path = astar(&grid, start, GridCoord::new(4, 0), &SearchBias::default())
            .expect("path exists");
        let steps: Vec<GridCoord> = path.iter().collect();
        assert_eq!(
            steps,
            vec![
                GridCoord::new(1, 0),
                GridCoord::new(2, 0),
                GridCoord::new(3, 0),
                GridCoord::new(4, 0),
            ]
        );
        assert_eq!(path_cost(&grid, start, &path), 40);
    }

    #[test]
    fn open_field_diagonal_is_all_diagonal_steps() {
        let grid = open_grid(20, 20);
        let start = GridCoord::new(0, 0);
        let goal = GridCoord::new(19, 19);
        let path = astar(&grid, start, goal, &SearchBias::default()).expect("path exists");
        assert_eq!(path.len(), 19);
        assert_eq!(path_cost(&grid, start, &path), 19 * 14);
        let mut previous = start;
        for step in path.iter() {
            assert!(previous.diagonal_to(step));
            previous = step;
        }
    }

    #[test]
    fn a_block_forces_a_detour() {
        // 3x3 blocking patch centered on the straight line.
        let grid = build_grid(9, 7, |coord| {
            if (3..=5).contains(&coord.x()) && (2..=4).contains(&coord.y()) {
                TerrainKind::Blocking
            } else {
                TerrainKind::Walkable
            }
        });
        let start = GridCoord::new(0, 3);
        let goal = GridCoord::new(8, 3);
        let path = astar(&grid, start, goal, &SearchBias::default()).expect("path exists");
        for step in path.iter() {
            assert!(!grid.is_blocked(step));
        }
        assert_eq!(path.destination(), Some(goal));
        // Straight through would be eight orthogonal steps; the detour rises
        // over the patch with two diagonal shoulders on each side.
        assert_eq!(path_cost(&grid, start, &path), 96);
    }

    #[test]
    fn difficult_terrain_is_worth_stepping_around() {
        let grid = build_grid(3, 3, |coord| {
            if coord == GridCoord::new(1, 1) {
                TerrainKind::Difficult
            } else {
                TerrainKind::Walkable
            }
        });
        let start = GridCoord::new(0, 1);
        let path = astar(&grid, start, GridCoord::new(2, 1), &SearchBias::default())
            .expect("path exists");
        assert!(path.iter().all(|step| step != GridCoord::new(1, 1)));
        assert_eq!(path_cost(&grid, start, &path), 28);
    }

    #[test]
    fn avoided_cells_are_routed_around() {
        let grid = open_grid(3, 3);
        let mut bias = SearchBias::default();
        bias.avoid(GridCoord::new(1, 1));
        bias.avoid(GridCoord::new(1, 0));
        let path = astar(&grid, GridCoord::new(0, 1), GridCoord::new(2, 1), &bias)
            .expect("path exists");
        assert!(path.iter().all(|step| step != GridCoord::new(1, 1)));
        assert!(path.iter().all(|step| step != GridCoord::new(1, 0)));
        assert!(path.iter().any(|step| step == GridCoord::new(1, 2)));
    }

    #[test]
    fn an_avoided_goal_fails_the_search() {
        let grid = open_grid(3, 1);
        let mut bias = SearchBias::default();
        bias.avoid(GridCoord::new(2, 0));
        assert!(astar(&grid, GridCoord::new(0, 0), GridCoord::new(2, 0), &bias).is_none());
        assert!(dijkstra(&grid, GridCoord::new(0, 0), GridCoord::new(2, 0), &bias).is_none());
    }

    #[test]
    fn difficult_entries_inflate_the_estimate() {
        // A wide difficult band: with the surcharge folded into the estimate,
        // the search still finds the cheapest crossing and pays the doubled
        // step cost exactly once per difficult entry.
        let grid = build_grid(5, 3, |coord| {
            if coord.x() == 2 {
                TerrainKind::Difficult
            } else {
                TerrainKind::Walkable
            }
        });
        let start = GridCoord::new(0, 1);
        let goal = GridCoord::new(4, 1);
        let path = astar(&grid, start, goal, &SearchBias::default()).expect("path exists");
        assert_eq!(path.destination(), Some(goal));
        // Four orthogonal steps, one of them onto difficult ground.
        assert_eq!(path_cost(&grid, start, &path), 50);
    }

    #[test]
    fn first_step_avoidance_only_binds_at_the_start() {
        let grid = open_grid(4, 2);
        let mut bias = SearchBias::default();
        bias.avoid_first_step(GridCoord::new(1, 0));
        let path = astar(&grid, GridCoord::new(0, 0), GridCoord::new(3, 0), &bias)
            .expect("path exists");
        assert_ne!(path.peek_next(), Some(GridCoord::new(1, 0)));
        assert_eq!(path.destination(), Some(GridCoord::new(3, 0)));
    }

    #[test]
    fn walled_off_goals_are_unreachable() {
        let grid = build_grid(5, 3, |coord| {
            if coord.x() == 2 {
                TerrainKind::Blocking
            } else {
                TerrainKind::Walkable
            }
        });
        assert!(astar(
            &grid,
            GridCoord::new(0, 1),
            GridCoord::new(4, 1),
            &SearchBias::default()
        )
        .is_none());
    }

    #[test]
    fn trivial_queries_yield_an_empty_path() {
        let grid = open_grid(2, 2);
        let coord = GridCoord::new(1, 1);
        let path = astar(&grid, coord, coord, &SearchBias::default()).expect("trivial");
        assert!(path.is_empty());
    }

    #[test]
    fn fallback_search_agrees_with_the_informed_one() {
        let grid = build_grid(9, 7, |coord| {
            if (3..=5).contains(&coord.x()) && (2..=4).contains(&coord.y()) {
                TerrainKind::Blocking
            } else {
                TerrainKind::Walkable
            }
        });
        let start = GridCoord::new(0, 3);
        let goal = GridCoord::new(8, 3);
        let bias = SearchBias::default();
        let informed = astar(&grid, start, goal, &bias).expect("path exists");
        let uninformed = dijkstra(&grid, start, goal, &bias).expect("path exists");
        assert_eq!(
            path_cost(&grid, start, &informed),
            path_cost(&grid, start, &uninformed)
        );
        assert_eq!(uninformed.destination(), Some(goal));
    }

    #[test]
    fn fallback_search_honors_the_avoid_set() {
        let grid = open_grid(3, 3);
        let mut bias = SearchBias::default();
        bias.avoid(GridCoord::new(1, 1));
        bias.avoid(GridCoord::new(1, 0));
        let path = dijkstra(&grid, GridCoord::new(0, 1), GridCoord::new(2, 1), &bias)
            .expect("path exists");
        assert!(path.iter().all(|step| step != GridCoord::new(1, 1)));
        assert!(path.iter().all(|step| step != GridCoord::new(1, 0)));
    }

    #[test]
    fn fallback_search_fails_on_walled_off_goals() {
        let grid = build_grid(5, 3, |coord| {
            if coord.x() == 2 {
                TerrainKind::Blocking
            } else {
                TerrainKind::Walkable
            }
        });
        assert!(dijkstra(
            &grid,
            GridCoord::new(0, 1),
            GridCoord::new(4, 1),
            &SearchBias::default()
        )
        .is_none());
    }
}
