//! Terrain grid with precomputed traversability edges.
//!
//! A grid is built once from a [`TerrainMap`] and afterwards mutated only
//! through blocking overrides. Each cell carries an outgoing edge set toward
//! its eight neighbors; whenever a cell's effective blocking state flips, the
//! edges of its 3x3 neighborhood are rebuilt so searches never re-derive
//! traversability from raw terrain.

use glam::Vec2;
use gridroute_core::{Direction, GridCoord, GridId, TerrainKind, TerrainMap};

/// How far [`Grid::resolve_position`] searches for a usable cell, in rings.
const RESOLVE_RADIUS: i32 = 10;

const fn direction_index(direction: Direction) -> usize {
    match direction {
        Direction::North => 0,
        Direction::Northeast => 1,
        Direction::East => 2,
        Direction::Southeast => 3,
        Direction::South => 4,
        Direction::Southwest => 5,
        Direction::West => 6,
        Direction::Northwest => 7,
    }
}

#[derive(Clone, Debug)]
struct TerrainCell {
    kind: TerrainKind,
    anchor: Vec2,
    filler: bool,
    override_blocking: bool,
    edges: [bool; 8],
}

impl TerrainCell {
    fn blocked(&self) -> bool {
        self.filler || self.override_blocking || self.kind.is_blocking()
    }
}

/// One loaded terrain grid and its traversability graph.
#[derive(Clone, Debug)]
pub struct Grid {
    id: GridId,
    width: u32,
    height: u32,
    tile_size: f32,
    origin: Vec2,
    cells: Vec<TerrainCell>,
}

impl Grid {
    /// Materialises a grid from raw map data and builds every edge.
    #[must_use]
    pub fn from_map(id: GridId, map: &TerrainMap) -> Self {
        let mut cells = Vec::new();
        for y in 0..map.height() {
            for x in 0..map.width() {
                let coord = GridCoord::new(x as i32, y as i32);
                let cell = match map.cell(coord) {
                    Some(spec) => TerrainCell {
                        kind: spec.kind,
                        anchor: spec.anchor,
                        filler: false,
                        override_blocking: false,
                        edges: [false; 8],
                    },
                    None => TerrainCell {
                        kind: TerrainKind::Undefined,
                        anchor: map.origin()
                            + Vec2::new(
                                x as f32 * map.tile_size(),
                                y as f32 * map.tile_size(),
                            ),
                        filler: true,
                        override_blocking: false,
                        edges: [false; 8],
                    },
                };
                cells.push(cell);
            }
        }
        let mut grid = Self {
            id,
            width: map.width(),
            height: map.height(),
            tile_size: map.tile_size(),
            origin: map.origin(),
            cells,
        };
        for y in 0..grid.height {
            for x in 0..grid.width {
                grid.rebuild_edges(GridCoord::new(x as i32, y as i32));
            }
        }
        grid
    }

    /// Identifier assigned to this grid at load time.
    #[must_use]
    pub const fn id(&self) -> GridId {
        self.id
    }

    /// Number of columns.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of rows.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Side length of one square cell in world units.
    #[must_use]
    pub const fn tile_size(&self) -> f32 {
        self.tile_size
    }

    /// Reports whether the coordinate addresses a cell of this grid.
    #[must_use]
    pub fn in_bounds(&self, coord: GridCoord) -> bool {
        coord.x() >= 0
            && coord.y() >= 0
            && (coord.x() as u32) < self.width
            && (coord.y() as u32) < self.height
    }

    fn index(&self, coord: GridCoord) -> Option<usize> {
        if self.in_bounds(coord) {
            Some(coord.y() as usize * self.width as usize + coord.x() as usize)
        } else {
            None
        }
    }

    /// Classification of the cell, or [`TerrainKind::Undefined`] outside the
    /// grid and on fillers.
    #[must_use]
    pub fn kind(&self, coord: GridCoord) -> TerrainKind {
        match self.index(coord) {
            Some(index) if !self.cells[index].filler => self.cells[index].kind,
            _ => TerrainKind::Undefined,
        }
    }

    /// Reports whether the cell currently refuses entry. Fillers, blocking
    /// terrain, overridden cells, and out-of-bounds coordinates all block.
    #[must_use]
    pub fn is_blocked(&self, coord: GridCoord) -> bool {
        match self.index(coord) {
            Some(index) => self.cells[index].blocked(),
            None => true,
        }
    }

    /// Reports whether entering the cell doubles the step cost.
    #[must_use]
    pub fn is_difficult(&self, coord: GridCoord) -> bool {
        self.kind(coord) == TerrainKind::Difficult
    }

    /// Reports whether a single step from `from` toward `direction` is
    /// traversable.
    #[must_use]
    pub fn edge(&self, from: GridCoord, direction: Direction) -> bool {
        match self.index(from) {
            Some(index) => self.cells[index].edges[direction_index(direction)],
            None => false,
        }
    }

    /// Traversable neighbors of a cell, paired with the step direction.
    pub fn neighbors(&self, from: GridCoord) -> impl Iterator<Item = (Direction, GridCoord)> + '_ {
        Direction::ALL
            .into_iter()
            .filter(move |direction| self.edge(from, *direction))
            .map(move |direction| (direction, from + direction.offset()))
    }

    /// Recomputes the outgoing edges of one cell.
    ///
    /// A blocked cell has no outgoing edges. A diagonal edge additionally
    /// requires at least one of the two orthogonal corner cells to be open,
    /// so agents never cut through a solid corner.
    pub fn rebuild_edges(&mut self, coord: GridCoord) {
        let Some(index) = self.index(coord) else {
            return;
        };
        let mut edges = [false; 8];
        if !self.cells[index].blocked() {
            for direction in Direction::ALL {
                let next = coord + direction.offset();
                if self.is_blocked(next) {
                    continue;
                }
                if coord.diagonal_to(next) {
                    let corner_a = GridCoord::new(coord.x(), next.y());
                    let corner_b = GridCoord::new(next.x(), coord.y());
                    if self.is_blocked(corner_a) && self.is_blocked(corner_b) {
                        continue;
                    }
                }
                edges[direction_index(direction)] = true;
            }
        }
        self.cells[index].edges = edges;
    }

    /// Rebuilds the edges of a cell and its eight neighbors.
    pub fn rebuild_neighborhood(&mut self, coord: GridCoord) {
        self.rebuild_edges(coord);
        for direction in Direction::ALL {
            self.rebuild_edges(coord + direction.offset());
        }
    }

    /// Applies or removes a blocking override and rebuilds the affected
    /// neighborhood. Returns true when the cell's effective blocking state
    /// actually flipped.
    pub fn set_override(&mut self, coord: GridCoord, blocking: bool) -> bool {
        let Some(index) = self.index(coord) else {
            return false;
        };
        let before = self.cells[index].blocked();
        self.cells[index].override_blocking = blocking;
        let flipped = self.cells[index].blocked() != before;
        if flipped {
            self.rebuild_neighborhood(coord);
        }
        flipped
    }

    /// World-space center of a cell.
    #[must_use]
    pub fn cell_center(&self, coord: GridCoord) -> Option<Vec2> {
        let index = self.index(coord)?;
        Some(self.cells[index].anchor + Vec2::splat(self.tile_size * 0.5))
    }

    /// Reports whether a world position falls inside this grid's footprint.
    #[must_use]
    pub fn contains_position(&self, position: Vec2) -> bool {
        let extent = self.origin
            + Vec2::new(
                self.width as f32 * self.tile_size,
                self.height as f32 * self.tile_size,
            );
        position.x >= self.origin.x
            && position.y >= self.origin.y
            && position.x < extent.x
            && position.y < extent.y
    }

    /// Maps a world position to the nearest usable cell.
    ///
    /// The exact containing cell wins when it is open; otherwise rings of
    /// increasing radius are scanned and the open cell whose center lies
    /// closest to the position is chosen. Gives up beyond radius
    /// [`RESOLVE_RADIUS`].
    #[must_use]
    pub fn resolve_position(&self, position: Vec2) -> Option<GridCoord> {
        let local = (position - self.origin) / self.tile_size;
        let base = GridCoord::new(local.x.floor() as i32, local.y.floor() as i32);
        if self.in_bounds(base) && !self.is_blocked(base) {
            return Some(base);
        }
        for radius in 1..=RESOLVE_RADIUS {
            let mut best: Option<(f32, GridCoord)> = None;
            for dy in -radius..=radius {
                for dx in -radius..=radius {
                    if dx.abs() != radius && dy.abs() != radius {
                        continue;
                    }
                    let coord = base + GridCoord::new(dx, dy);
                    if !self.in_bounds(coord) || self.is_blocked(coord) {
                        continue;
                    }
                    let Some(center) = self.cell_center(coord) else {
                        continue;
                    };
                    let distance = center.distance_squared(position);
                    let closer = best.map_or(true, |(previous, _)| distance < previous);
                    if closer {
                        best = Some((distance, coord));
                    }
                }
            }
            if let Some((_, coord)) = best {
                return Some(coord);
            }
        }
        None
    }

    /// Renders the grid as one character per cell: `W`alkable, `D`ifficult,
    /// `B`locked, and `.` for anything unclassified.
    #[must_use]
    pub fn terrain_sketch(&self) -> String {
        let mut sketch = String::new();
        for y in 0..self.height {
            for x in 0..self.width {
                let coord = GridCoord::new(x as i32, y as i32);
                let glyph = if self.is_blocked(coord) {
                    'B'
                } else {
                    match self.kind(coord) {
                        TerrainKind::Walkable => 'W',
                        TerrainKind::Difficult => 'D',
                        TerrainKind::Blocking => 'B',
                        TerrainKind::Undefined => '.',
                    }
                };
                sketch.push(glyph);
            }
            sketch.push('\n');
        }
        sketch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridroute_core::TerrainKind;

    fn open_map(width: u32, height: u32) -> TerrainMap {
        let mut map = TerrainMap::new(width, height, 1.0, Vec2::ZERO);
        for y in 0..height {
            for x in 0..width {
                map.set(GridCoord::new(x as i32, y as i32), TerrainKind::Walkable);
            }
        }
        map
    }

    #[test]
    fn open_interior_cells_have_eight_edges() {
        let grid = Grid::from_map(GridId::new(0), &open_map(3, 3));
        let center = GridCoord::new(1, 1);
        assert_eq!(grid.neighbors(center).count(), 8);
    }

    #[test]
    fn corner_cells_have_three_edges() {
        let grid = Grid::from_map(GridId::new(0), &open_map(3, 3));
        assert_eq!(grid.neighbors(GridCoord::new(0, 0)).count(), 3);
        assert_eq!(grid.neighbors(GridCoord::new(2, 2)).count(), 3);
    }

    #[test]
    fn blocked_cells_have_no_outgoing_edges() {
        let mut map = open_map(3, 3);
        map.set(GridCoord::new(1, 1), TerrainKind::Blocking);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert_eq!(grid.neighbors(GridCoord::new(1, 1)).count(), 0);
        assert!(!grid.edge(GridCoord::new(0, 0), Direction::Southeast));
    }

    #[test]
    fn diagonal_needs_an_open_corner() {
        // Blocking both corner cells closes the diagonal between them.
        let mut map = open_map(3, 3);
        map.set(GridCoord::new(1, 0), TerrainKind::Blocking);
        map.set(GridCoord::new(0, 1), TerrainKind::Blocking);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert!(!grid.edge(GridCoord::new(0, 0), Direction::Southeast));
        assert!(!grid.edge(GridCoord::new(1, 1), Direction::Northwest));
    }

    #[test]
    fn diagonal_survives_with_one_open_corner() {
        let mut map = open_map(3, 3);
        map.set(GridCoord::new(1, 0), TerrainKind::Blocking);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert!(grid.edge(GridCoord::new(0, 0), Direction::Southeast));
    }

    #[test]
    fn fillers_block_traversal() {
        let mut map = TerrainMap::new(2, 1, 1.0, Vec2::ZERO);
        map.set(GridCoord::new(0, 0), TerrainKind::Walkable);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert!(grid.is_blocked(GridCoord::new(1, 0)));
        assert_eq!(grid.neighbors(GridCoord::new(0, 0)).count(), 0);
    }

    #[test]
    fn override_flips_blocking_and_rebuilds_edges() {
        let mut grid = Grid::from_map(GridId::new(0), &open_map(3, 3));
        assert!(grid.set_override(GridCoord::new(1, 1), true));
        assert!(grid.is_blocked(GridCoord::new(1, 1)));
        assert!(!grid.edge(GridCoord::new(0, 1), Direction::East));
        // A second identical override is a no-op.
        assert!(!grid.set_override(GridCoord::new(1, 1), true));
        assert!(grid.set_override(GridCoord::new(1, 1), false));
        assert!(grid.edge(GridCoord::new(0, 1), Direction::East));
    }

    #[test]
    fn override_on_blocking_terrain_never_flips() {
        let mut map = open_map(2, 2);
        map.set(GridCoord::new(0, 0), TerrainKind::Blocking);
        let mut grid = Grid::from_map(GridId::new(0), &map);
        assert!(!grid.set_override(GridCoord::new(0, 0), true));
        assert!(!grid.set_override(GridCoord::new(0, 0), false));
    }

    #[test]
    fn positions_resolve_to_containing_cell() {
        let grid = Grid::from_map(GridId::new(0), &open_map(4, 4));
        assert_eq!(
            grid.resolve_position(Vec2::new(2.4, 3.9)),
            Some(GridCoord::new(2, 3))
        );
    }

    #[test]
    fn blocked_positions_resolve_to_nearest_open_ring_cell() {
        let mut map = open_map(3, 3);
        map.set(GridCoord::new(1, 1), TerrainKind::Blocking);
        let grid = Grid::from_map(GridId::new(0), &map);
        let resolved = grid.resolve_position(Vec2::new(1.5, 1.9));
        assert_eq!(resolved, Some(GridCoord::new(1, 2)));
    }

    #[test]
    fn resolution_gives_up_outside_the_search_radius() {
        let mut map = TerrainMap::new(30, 1, 1.0, Vec2::ZERO);
        map.set(GridCoord::new(29, 0), TerrainKind::Walkable);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert_eq!(grid.resolve_position(Vec2::new(0.5, 0.5)), None);
        assert_eq!(
            grid.resolve_position(Vec2::new(25.5, 0.5)),
            Some(GridCoord::new(29, 0))
        );
    }

    #[test]
    fn sketch_reports_terrain_classes() {
        let mut map = TerrainMap::new(2, 2, 1.0, Vec2::ZERO);
        map.set(GridCoord::new(0, 0), TerrainKind::Walkable);
        map.set(GridCoord::new(1, 0), TerrainKind::Difficult);
        map.set(GridCoord::new(0, 1), TerrainKind::Blocking);
        let grid = Grid::from_map(GridId::new(0), &map);
        assert_eq!(grid.terrain_sketch(), "WD\nBB\n");
    }
}
