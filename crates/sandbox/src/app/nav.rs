use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::f32::consts::TAU;

use director::{NavigationService, Vec3};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use super::scenario::GridSpec;

const RANDOM_POINT_ATTEMPTS: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct Cell {
    x: u32,
    y: u32,
}

/// Navigation over a uniform passability grid on the XY plane.
#[derive(Debug, Clone)]
pub(crate) struct GridNavigation {
    origin: Vec3,
    cell_size: f32,
    width: u32,
    height: u32,
    walkable: Vec<bool>,
    rng: ChaCha8Rng,
}

impl GridNavigation {
    pub(crate) fn from_spec(spec: &GridSpec, seed: Option<u64>) -> Self {
        let mut walkable = Vec::with_capacity(spec.width as usize * spec.height as usize);
        for y in 0..spec.height {
            for x in 0..spec.width {
                walkable.push(!spec.blocked.iter().any(|rect| rect.contains(x, y)));
            }
        }
        let rng = match seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            origin: spec.origin,
            cell_size: spec.cell_size,
            width: spec.width,
            height: spec.height,
            walkable,
            rng,
        }
    }

    pub(crate) fn walkable_cells(&self) -> usize {
        self.walkable.iter().filter(|walkable| **walkable).count()
    }

    pub(crate) fn is_walkable_at(&self, world: Vec3) -> bool {
        self.world_to_cell(world)
            .is_some_and(|cell| self.is_walkable(cell))
    }

    fn world_to_cell(&self, world: Vec3) -> Option<Cell> {
        let x = ((world.x - self.origin.x) / self.cell_size).floor();
        let y = ((world.y - self.origin.y) / self.cell_size).floor();
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }
        let (x, y) = (x as u32, y as u32);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(Cell { x, y })
    }

    fn cell_center(&self, cell: Cell) -> Vec3 {
        Vec3::new(
            self.origin.x + (cell.x as f32 + 0.5) * self.cell_size,
            self.origin.y + (cell.y as f32 + 0.5) * self.cell_size,
            self.origin.z,
        )
    }

    fn index_of(&self, cell: Cell) -> Option<usize> {
        if cell.x >= self.width || cell.y >= self.height {
            return None;
        }
        Some(cell.y as usize * self.width as usize + cell.x as usize)
    }

    fn cell_at(&self, index: usize) -> Cell {
        let width = self.width as usize;
        Cell {
            x: (index % width) as u32,
            y: (index / width) as u32,
        }
    }

    fn is_walkable(&self, cell: Cell) -> bool {
        self.index_of(cell)
            .and_then(|index| self.walkable.get(index))
            .copied()
            .unwrap_or(false)
    }

    fn neighbors(&self, cell: Cell) -> impl Iterator<Item = Cell> + '_ {
        let north = (cell.y + 1 < self.height).then(|| Cell {
            x: cell.x,
            y: cell.y + 1,
        });
        let east = (cell.x + 1 < self.width).then(|| Cell {
            x: cell.x + 1,
            y: cell.y,
        });
        let south = cell.y.checked_sub(1).map(|y| Cell { x: cell.x, y });
        let west = cell.x.checked_sub(1).map(|x| Cell { x, y: cell.y });
        [north, east, south, west]
            .into_iter()
            .flatten()
            .filter(move |neighbor| self.is_walkable(*neighbor))
    }

    /// A* over 4-connected cells. Ties break on lower h, then row, then column,
    /// then insertion order, so equal-cost maps always yield the same route.
    fn find_cell_path(&self, start: Cell, goal: Cell) -> Option<Vec<Cell>> {
        let start_index = self.index_of(start)?;
        let goal_index = self.index_of(goal)?;
        if !self.is_walkable(start) || !self.is_walkable(goal) {
            return None;
        }
        if start == goal {
            return Some(vec![start]);
        }

        let node_count = self.walkable.len();
        let mut closed = vec![false; node_count];
        let mut best_g = vec![u32::MAX; node_count];
        let mut parent = vec![None::<usize>; node_count];
        let mut open = BinaryHeap::new();
        let mut insertion = 0u64;

        best_g[start_index] = 0;
        let h = manhattan(start, goal);
        open.push(Reverse((h, h, start.y, start.x, insertion, start_index)));

        while let Some(Reverse((_, _, _, _, _, current_index))) = open.pop() {
            if closed[current_index] {
                continue;
            }
            closed[current_index] = true;
            if current_index == goal_index {
                return Some(self.reconstruct(&parent, start_index, goal_index));
            }

            let current = self.cell_at(current_index);
            let tentative_g = best_g[current_index].saturating_add(1);
            for neighbor in self.neighbors(current) {
                let Some(neighbor_index) = self.index_of(neighbor) else {
                    continue;
                };
                if closed[neighbor_index] || tentative_g >= best_g[neighbor_index] {
                    continue;
                }
                best_g[neighbor_index] = tentative_g;
                parent[neighbor_index] = Some(current_index);
                let h = manhattan(neighbor, goal);
                insertion += 1;
                open.push(Reverse((
                    tentative_g.saturating_add(h),
                    h,
                    neighbor.y,
                    neighbor.x,
                    insertion,
                    neighbor_index,
                )));
            }
        }
        None
    }

    fn reconstruct(
        &self,
        parent: &[Option<usize>],
        start_index: usize,
        goal_index: usize,
    ) -> Vec<Cell> {
        let mut cursor = goal_index;
        let mut cells = vec![self.cell_at(cursor)];
        while cursor != start_index {
            match parent.get(cursor).copied().flatten() {
                Some(previous) => cursor = previous,
                None => break,
            }
            cells.push(self.cell_at(cursor));
        }
        cells.reverse();
        cells
    }
}

fn manhattan(a: Cell, b: Cell) -> u32 {
    a.x.abs_diff(b.x).saturating_add(a.y.abs_diff(b.y))
}

impl NavigationService for GridNavigation {
    fn find_random_point_in_radius(&mut self, center: Vec3, radius: f32) -> Option<Vec3> {
        if !center.is_finite() || !radius.is_finite() {
            return None;
        }
        if radius <= 0.0 {
            return self.is_walkable_at(center).then_some(center.with_z(self.origin.z));
        }
        for _ in 0..RANDOM_POINT_ATTEMPTS {
            let angle = self.rng.gen_range(0.0..TAU);
            let distance = radius * self.rng.gen::<f32>().sqrt();
            let candidate = Vec3::new(
                center.x + distance * angle.cos(),
                center.y + distance * angle.sin(),
                self.origin.z,
            );
            if self.is_walkable_at(candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn find_path(&mut self, from: Vec3, to: Vec3) -> Option<Vec<Vec3>> {
        let start = self.world_to_cell(from)?;
        let goal = self.world_to_cell(to)?;
        let cells = self.find_cell_path(start, goal)?;

        let mut points: Vec<Vec3> = cells
            .iter()
            .skip(1)
            .map(|cell| self.cell_center(*cell))
            .collect();
        // Finish on the requested point rather than the goal cell's center.
        match points.last_mut() {
            Some(last) => *last = to.with_z(self.origin.z),
            None => points.push(to.with_z(self.origin.z)),
        }
        Some(points)
    }
}
