//! Uniform spatial hash grid over particle positions
//!
//! Positions map to integer cell coordinates; cells are kept in a hash map
//! keyed by the coordinate triple. The classic three-prime hash drives the
//! map's hashing but never the cell identity, so coordinate collisions
//! cannot mis-bucket particles. Cells exist only while occupied; emptied
//! cells recycle through a lock-free pool.

use crate::core::Vec3;
use crate::particle::error::ParticleError;
use crate::particle::ParticleId;
use crossbeam_queue::ArrayQueue;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Spatial hash primes
const PRIME_X: i64 = 73_856_093;
const PRIME_Y: i64 = 19_349_663;
const PRIME_Z: i64 = 83_492_791;

/// Recycled cells kept around between rebuilds
const CELL_POOL_CAPACITY: usize = 1024;

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Box enclosing a sphere
    pub fn around(center: Vec3, radius: f32) -> Self {
        let r = Vec3::splat(radius);
        Self {
            min: center - r,
            max: center + r,
        }
    }

    #[inline]
    pub fn contains(&self, p: Vec3) -> bool {
        p.x >= self.min.x
            && p.x <= self.max.x
            && p.y >= self.min.y
            && p.y <= self.max.y
            && p.z >= self.min.z
            && p.z <= self.max.z
    }
}

/// Integer cell coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Hash for CellCoord {
    /// Cells hash with the three-prime spatial function; identity stays
    /// the coordinate triple
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(cell_hash(*self));
    }
}

/// The wire-level spatial hash: `(x·p1) ⊕ (y·p2) ⊕ (z·p3)` in wide
/// integer arithmetic
#[inline]
pub fn cell_hash(coord: CellCoord) -> u64 {
    let h = (coord.x as i64).wrapping_mul(PRIME_X)
        ^ (coord.y as i64).wrapping_mul(PRIME_Y)
        ^ (coord.z as i64).wrapping_mul(PRIME_Z);
    h as u64
}

/// One occupied grid cell
#[derive(Debug)]
struct GridCell {
    particles: Vec<ParticleId>,
    /// Lockstep with `particles`; needed to maintain the center of mass
    /// on removal
    positions: Vec<Vec3>,
    position_sum: Vec3,
}

impl GridCell {
    fn new() -> Self {
        Self {
            particles: Vec::new(),
            positions: Vec::new(),
            position_sum: Vec3::ZERO,
        }
    }

    fn reset(&mut self) {
        self.particles.clear();
        self.positions.clear();
        self.position_sum = Vec3::ZERO;
    }

    fn push(&mut self, id: ParticleId, position: Vec3) {
        self.particles.push(id);
        self.positions.push(position);
        self.position_sum = self.position_sum + position;
    }

    /// Swap-remove by id; true when found
    fn remove(&mut self, id: ParticleId) -> bool {
        match self.particles.iter().position(|&p| p == id) {
            Some(at) => {
                self.particles.swap_remove(at);
                let position = self.positions.swap_remove(at);
                self.position_sum = self.position_sum - position;
                true
            }
            None => false,
        }
    }

    fn center_of_mass(&self) -> Vec3 {
        if self.particles.is_empty() {
            Vec3::ZERO
        } else {
            self.position_sum / self.particles.len() as f32
        }
    }
}

/// Lock-free store of recycled cell allocations
struct CellPool {
    recycled: ArrayQueue<GridCell>,
}

impl CellPool {
    fn new() -> Self {
        Self {
            recycled: ArrayQueue::new(CELL_POOL_CAPACITY),
        }
    }

    fn acquire(&self) -> GridCell {
        self.recycled.pop().unwrap_or_else(GridCell::new)
    }

    fn release(&self, mut cell: GridCell) {
        cell.reset();
        // Pool full: let the allocation drop
        let _ = self.recycled.push(cell);
    }

    fn len(&self) -> usize {
        self.recycled.len()
    }
}

/// Cell-hashed spatial index over particle positions
///
/// # Example
/// ```
/// use sim_core::core::Vec3;
/// use sim_core::particle::{Aabb, ParticleId, UniformSpatialGrid};
///
/// let bounds = Aabb::new(Vec3::ZERO, Vec3::splat(100.0));
/// let mut grid = UniformSpatialGrid::new(bounds, Vec3::splat(10.0)).unwrap();
/// grid.insert(ParticleId::from_raw(1), Vec3::new(5.0, 5.0, 5.0));
/// let near = grid.query_radius(Vec3::new(4.0, 4.0, 4.0), 3.0);
/// assert_eq!(near, vec![ParticleId::from_raw(1)]);
/// ```
pub struct UniformSpatialGrid {
    bounds: Aabb,
    cell_size: Vec3,
    inv_cell_size: Vec3,
    cells: HashMap<CellCoord, GridCell>,
    particle_to_cell: HashMap<ParticleId, CellCoord>,
    particle_count: usize,
    cell_pool: CellPool,
}

impl UniformSpatialGrid {
    pub fn new(bounds: Aabb, cell_size: Vec3) -> Result<Self, ParticleError> {
        if cell_size.x <= 0.0 || cell_size.y <= 0.0 || cell_size.z <= 0.0 {
            return Err(ParticleError::InvalidConfiguration {
                reason: "cell size must be positive on every axis".into(),
            });
        }
        if bounds.max.x <= bounds.min.x
            || bounds.max.y <= bounds.min.y
            || bounds.max.z <= bounds.min.z
        {
            return Err(ParticleError::InvalidConfiguration {
                reason: "bounds must have positive extent".into(),
            });
        }
        Ok(Self {
            bounds,
            cell_size,
            inv_cell_size: cell_size.recip_or_zero(),
            cells: HashMap::new(),
            particle_to_cell: HashMap::new(),
            particle_count: 0,
            cell_pool: CellPool::new(),
        })
    }

    /// Cell coordinates for a position
    #[inline]
    pub fn coord_of(&self, position: Vec3) -> CellCoord {
        let rel = (position - self.bounds.min) * self.inv_cell_size;
        CellCoord {
            x: rel.x.floor() as i32,
            y: rel.y.floor() as i32,
            z: rel.z.floor() as i32,
        }
    }

    /// Index a particle position; re-inserting at the same cell is a no-op
    pub fn insert(&mut self, id: ParticleId, position: Vec3) {
        let coord = self.coord_of(position);
        match self.particle_to_cell.get(&id) {
            Some(&current) if current == coord => return,
            Some(&current) => {
                self.detach_from_cell(current, id);
            }
            None => {
                self.particle_count += 1;
            }
        }

        let cell = match self.cells.entry(coord) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(self.cell_pool.acquire())
            }
        };
        cell.push(id, position);
        self.particle_to_cell.insert(id, coord);
    }

    /// Drop a particle from the index
    pub fn remove(&mut self, id: ParticleId) -> Result<(), ParticleError> {
        let coord = self
            .particle_to_cell
            .remove(&id)
            .ok_or(ParticleError::ParticleNotFound { id })?;
        self.detach_from_cell(coord, id);
        self.particle_count -= 1;
        Ok(())
    }

    /// Move a particle between cells
    ///
    /// When the recorded cell disagrees with `old_pos` the call falls back
    /// to a plain insert at the new position.
    pub fn update(&mut self, id: ParticleId, old_pos: Vec3, new_pos: Vec3) {
        let old_coord = self.coord_of(old_pos);
        let new_coord = self.coord_of(new_pos);
        if old_coord == new_coord && self.particle_to_cell.get(&id) == Some(&old_coord) {
            return;
        }
        if self.particle_to_cell.get(&id) != Some(&old_coord) {
            self.insert(id, new_pos);
            return;
        }

        self.detach_from_cell(old_coord, id);
        let cell = match self.cells.entry(new_coord) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(self.cell_pool.acquire())
            }
        };
        cell.push(id, new_pos);
        self.particle_to_cell.insert(id, new_coord);
    }

    /// Particles inside cells intersecting the box
    ///
    /// Cells never share a particle, but the scratch set guards against
    /// misuse all the same.
    pub fn query(&self, bounds: &Aabb) -> Vec<ParticleId> {
        let lo = self.coord_of(bounds.min.max(self.bounds.min));
        let hi = self.coord_of(bounds.max.min(self.bounds.max));
        if hi.x < lo.x || hi.y < lo.y || hi.z < lo.z {
            return Vec::new();
        }

        let mut seen: HashSet<ParticleId> = HashSet::new();
        let mut out = Vec::new();

        let range_volume = (hi.x - lo.x + 1) as usize
            * (hi.y - lo.y + 1) as usize
            * (hi.z - lo.z + 1) as usize;
        if range_volume > self.cells.len() {
            // Sparse occupancy: walk the live cells instead of the range
            for (coord, cell) in &self.cells {
                if coord.x >= lo.x
                    && coord.x <= hi.x
                    && coord.y >= lo.y
                    && coord.y <= hi.y
                    && coord.z >= lo.z
                    && coord.z <= hi.z
                {
                    for &id in &cell.particles {
                        if seen.insert(id) {
                            out.push(id);
                        }
                    }
                }
            }
        } else {
            for x in lo.x..=hi.x {
                for y in lo.y..=hi.y {
                    for z in lo.z..=hi.z {
                        if let Some(cell) = self.cells.get(&CellCoord { x, y, z }) {
                            for &id in &cell.particles {
                                if seen.insert(id) {
                                    out.push(id);
                                }
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Particles inside cells intersecting the sphere's enclosing box
    pub fn query_radius(&self, center: Vec3, radius: f32) -> Vec<ParticleId> {
        self.query(&Aabb::around(center, radius))
    }

    /// Up to `k` candidates ranked by squared distance from `position` to
    /// the owning cell's center of mass
    ///
    /// The search radius starts at the largest cell extent and doubles
    /// until `k` candidates are found or the radius covers the grid.
    pub fn query_nearest(&self, position: Vec3, k: usize) -> Vec<ParticleId> {
        if k == 0 || self.particle_count == 0 {
            return Vec::new();
        }
        let mut radius = self.cell_size.max_element();
        let safety = (self.bounds.max - self.bounds.min).length();

        let mut candidates = loop {
            let found = self.query_radius(position, radius);
            if found.len() >= k || radius > safety {
                break found;
            }
            radius *= 2.0;
        };

        candidates.sort_by(|&a, &b| {
            let da = self.candidate_distance_squared(a, position);
            let db = self.candidate_distance_squared(b, position);
            da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
        });
        candidates.truncate(k);
        candidates
    }

    /// Drop every cell and mapping
    pub fn clear(&mut self) {
        for (_, cell) in self.cells.drain() {
            self.cell_pool.release(cell);
        }
        self.particle_to_cell.clear();
        self.particle_count = 0;
    }

    /// Return any empty cells to the pool
    ///
    /// Occupied-only cells are the steady-state invariant; this sweep
    /// exists for callers that mutate through lower-level paths.
    pub fn optimize(&mut self) {
        let empty: Vec<CellCoord> = self
            .cells
            .iter()
            .filter(|(_, cell)| cell.particles.is_empty())
            .map(|(&coord, _)| coord)
            .collect();
        for coord in empty {
            if let Some(cell) = self.cells.remove(&coord) {
                self.cell_pool.release(cell);
            }
        }
    }

    // -- inspection --------------------------------------------------------

    #[inline]
    pub fn particle_count(&self) -> usize {
        self.particle_count
    }

    #[inline]
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn cell_size(&self) -> Vec3 {
        self.cell_size
    }

    /// Cell a particle currently occupies
    pub fn cell_of(&self, id: ParticleId) -> Option<CellCoord> {
        self.particle_to_cell.get(&id).copied()
    }

    /// Particle density of a cell: occupants per unit volume
    pub fn cell_density(&self, coord: CellCoord) -> f32 {
        let volume = self.cell_size.x * self.cell_size.y * self.cell_size.z;
        self.cells
            .get(&coord)
            .map(|cell| cell.particles.len() as f32 / volume)
            .unwrap_or(0.0)
    }

    /// Center of mass of a cell's occupants
    pub fn cell_center_of_mass(&self, coord: CellCoord) -> Option<Vec3> {
        self.cells.get(&coord).map(GridCell::center_of_mass)
    }

    /// Recycled cells currently pooled
    pub fn pooled_cell_count(&self) -> usize {
        self.cell_pool.len()
    }

    /// Particle ids in one cell, in insertion order (modulo swap-removal)
    pub fn cell_particles(&self, coord: CellCoord) -> Vec<ParticleId> {
        self.cells
            .get(&coord)
            .map(|cell| cell.particles.clone())
            .unwrap_or_default()
    }

    // -- internals ---------------------------------------------------------

    fn detach_from_cell(&mut self, coord: CellCoord, id: ParticleId) {
        let emptied = match self.cells.get_mut(&coord) {
            Some(cell) => {
                cell.remove(id);
                cell.particles.is_empty()
            }
            None => false,
        };
        if emptied {
            if let Some(cell) = self.cells.remove(&coord) {
                self.cell_pool.release(cell);
            }
        }
    }

    fn candidate_distance_squared(&self, id: ParticleId, position: Vec3) -> f32 {
        self.particle_to_cell
            .get(&id)
            .and_then(|coord| self.cells.get(coord))
            .map(|cell| cell.center_of_mass().distance_squared(position))
            .unwrap_or(f32::MAX)
    }

    /// Membership invariant check used by the property tests
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> bool {
        let listed: usize = self.cells.values().map(|c| c.particles.len()).sum();
        if listed != self.particle_count || self.particle_to_cell.len() != self.particle_count {
            return false;
        }
        self.particle_to_cell.iter().all(|(id, coord)| {
            self.cells
                .get(coord)
                .map(|cell| cell.particles.contains(id))
                .unwrap_or(false)
        }) && self.cells.values().all(|cell| !cell.particles.is_empty())
    }
}

impl std::fmt::Debug for UniformSpatialGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniformSpatialGrid")
            .field("bounds", &self.bounds)
            .field("cell_size", &self.cell_size)
            .field("cells", &self.cells.len())
            .field("particles", &self.particle_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn grid() -> UniformSpatialGrid {
        UniformSpatialGrid::new(
            Aabb::new(Vec3::ZERO, Vec3::splat(100.0)),
            Vec3::splat(10.0),
        )
        .unwrap()
    }

    fn id(raw: u32) -> ParticleId {
        ParticleId::from_raw(raw)
    }

    #[test]
    fn test_rejects_bad_configuration() {
        assert!(UniformSpatialGrid::new(
            Aabb::new(Vec3::ZERO, Vec3::splat(10.0)),
            Vec3::new(1.0, 0.0, 1.0)
        )
        .is_err());
        assert!(UniformSpatialGrid::new(
            Aabb::new(Vec3::splat(5.0), Vec3::splat(5.0)),
            Vec3::splat(1.0)
        )
        .is_err());
    }

    #[test]
    fn test_cell_hash_fixture() {
        let h = cell_hash(CellCoord { x: 1, y: 2, z: 3 });
        let expected =
            (73_856_093i64 ^ (2 * 19_349_663) ^ (3 * 83_492_791)) as u64;
        assert_eq!(h, expected);
        // Negative coordinates stay well-defined
        let _ = cell_hash(CellCoord { x: -5, y: -7, z: -9 });
    }

    #[test]
    fn test_coord_of() {
        let grid = grid();
        assert_eq!(
            grid.coord_of(Vec3::new(5.0, 15.0, 25.0)),
            CellCoord { x: 0, y: 1, z: 2 }
        );
        assert_eq!(
            grid.coord_of(Vec3::new(99.0, 0.0, 0.0)),
            CellCoord { x: 9, y: 0, z: 0 }
        );
    }

    #[test]
    fn test_insert_same_cell_is_noop() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(1), Vec3::new(6.0, 6.0, 6.0)); // same cell
        assert_eq!(grid.particle_count(), 1);
        assert_eq!(grid.cell_count(), 1);
        assert!(grid.check_invariants());
    }

    #[test]
    fn test_insert_moves_between_cells() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(1), Vec3::new(55.0, 5.0, 5.0));
        assert_eq!(grid.particle_count(), 1);
        assert_eq!(grid.cell_count(), 1);
        assert_eq!(grid.cell_of(id(1)), Some(CellCoord { x: 5, y: 0, z: 0 }));
        // The vacated cell was recycled
        assert_eq!(grid.pooled_cell_count(), 1);
        assert!(grid.check_invariants());
    }

    #[test]
    fn test_remove_recycles_empty_cells() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(6.0, 5.0, 5.0));
        grid.remove(id(1)).unwrap();
        assert_eq!(grid.cell_count(), 1);
        grid.remove(id(2)).unwrap();
        assert_eq!(grid.cell_count(), 0);
        assert_eq!(grid.particle_count(), 0);
        assert!(matches!(
            grid.remove(id(2)),
            Err(ParticleError::ParticleNotFound { .. })
        ));
        assert!(grid.check_invariants());
    }

    #[test]
    fn test_update_paths() {
        let mut grid = grid();
        let p0 = Vec3::new(5.0, 5.0, 5.0);
        let p1 = Vec3::new(7.0, 5.0, 5.0); // same cell
        let p2 = Vec3::new(25.0, 5.0, 5.0); // different cell
        grid.insert(id(1), p0);

        grid.update(id(1), p0, p1);
        assert_eq!(grid.cell_of(id(1)), Some(CellCoord { x: 0, y: 0, z: 0 }));

        grid.update(id(1), p1, p2);
        assert_eq!(grid.cell_of(id(1)), Some(CellCoord { x: 2, y: 0, z: 0 }));
        assert_eq!(grid.particle_count(), 1);

        // Stale old position falls back to insert
        grid.update(id(1), p0, Vec3::new(45.0, 5.0, 5.0));
        assert_eq!(grid.cell_of(id(1)), Some(CellCoord { x: 4, y: 0, z: 0 }));
        assert_eq!(grid.particle_count(), 1);

        // Unknown particle through update lands as a fresh insert
        grid.update(id(9), p0, p0);
        assert_eq!(grid.particle_count(), 2);
        assert!(grid.check_invariants());
    }

    #[test]
    fn test_query_aabb() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(15.0, 5.0, 5.0));
        grid.insert(id(3), Vec3::new(95.0, 95.0, 95.0));

        let mut found = grid.query(&Aabb::new(Vec3::ZERO, Vec3::splat(20.0)));
        found.sort();
        assert_eq!(found, vec![id(1), id(2)]);

        let all = grid.query(&Aabb::new(Vec3::ZERO, Vec3::splat(100.0)));
        assert_eq!(all.len(), 3);

        let none = grid.query(&Aabb::new(Vec3::splat(40.0), Vec3::splat(42.0)));
        assert!(none.is_empty());
    }

    #[test]
    fn test_query_radius_covers_enclosing_cells() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(50.0, 50.0, 50.0));

        let found = grid.query_radius(Vec3::new(4.0, 4.0, 4.0), 3.0);
        assert_eq!(found, vec![id(1)]);
    }

    #[test]
    fn test_query_nearest() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(15.0, 5.0, 5.0));
        grid.insert(id(3), Vec3::new(85.0, 85.0, 85.0));

        let nearest = grid.query_nearest(Vec3::new(4.0, 4.0, 4.0), 2);
        assert_eq!(nearest.len(), 2);
        assert_eq!(nearest[0], id(1));
        assert!(nearest.contains(&id(2)));

        assert!(grid.query_nearest(Vec3::ZERO, 0).is_empty());
        // Asking for more than exist returns everything
        let all = grid.query_nearest(Vec3::new(4.0, 4.0, 4.0), 10);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_center_of_mass_and_density() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(2.0, 2.0, 2.0));
        grid.insert(id(2), Vec3::new(4.0, 4.0, 4.0));
        let coord = CellCoord { x: 0, y: 0, z: 0 };
        assert_eq!(
            grid.cell_center_of_mass(coord),
            Some(Vec3::new(3.0, 3.0, 3.0))
        );
        assert!((grid.cell_density(coord) - 2.0 / 1000.0).abs() < 1e-9);

        grid.remove(id(2)).unwrap();
        assert_eq!(
            grid.cell_center_of_mass(coord),
            Some(Vec3::new(2.0, 2.0, 2.0))
        );
        assert!(grid.check_invariants());
    }

    #[test]
    fn test_scenario_insert_query_remove_all() {
        let mut grid = grid();
        let count = 50u32;
        for i in 0..count {
            let p = Vec3::new(
                (i % 10) as f32 * 9.5,
                ((i / 10) % 10) as f32 * 9.5,
                (i % 7) as f32 * 9.5,
            );
            grid.insert(id(i + 1), p);
        }
        assert_eq!(grid.particle_count(), count as usize);
        assert!(grid.check_invariants());

        let everything = grid.query(&Aabb::new(Vec3::ZERO, Vec3::splat(100.0)));
        assert_eq!(everything.len(), count as usize);

        for i in 0..count {
            grid.remove(id(i + 1)).unwrap();
        }
        assert_eq!(grid.particle_count(), 0);
        assert_eq!(grid.cell_count(), 0);
    }

    #[test]
    fn test_clear_and_optimize() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(5.0, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(55.0, 5.0, 5.0));
        grid.clear();
        assert_eq!(grid.particle_count(), 0);
        assert_eq!(grid.cell_count(), 0);
        assert!(grid.pooled_cell_count() >= 2);

        grid.insert(id(3), Vec3::new(5.0, 5.0, 5.0));
        grid.optimize(); // no empty cells in steady state
        assert_eq!(grid.cell_count(), 1);
    }

    #[test]
    fn test_query_results_are_unique() {
        let mut grid = grid();
        // Positions straddling a cell border
        grid.insert(id(1), Vec3::new(9.9, 5.0, 5.0));
        grid.insert(id(2), Vec3::new(10.1, 5.0, 5.0));
        let found = grid.query(&Aabb::new(Vec3::new(8.0, 0.0, 0.0), Vec3::new(12.0, 10.0, 10.0)));
        assert_eq!(found.len(), 2);
        let unique: std::collections::HashSet<_> = found.iter().collect();
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_cell_particles_listing() {
        let mut grid = grid();
        grid.insert(id(1), Vec3::new(1.0, 1.0, 1.0));
        grid.insert(id(2), Vec3::new(2.0, 2.0, 2.0));
        let coord = CellCoord { x: 0, y: 0, z: 0 };
        assert_eq!(grid.cell_particles(coord), vec![id(1), id(2)]);
        assert!(grid
            .cell_particles(CellCoord { x: 9, y: 9, z: 9 })
            .is_empty());
    }

    #[test]
    fn test_aabb_contains_and_around() {
        let b = Aabb::around(Vec3::splat(5.0), 2.0);
        assert!(b.contains(Vec3::splat(5.0)));
        assert!(b.contains(Vec3::new(3.0, 5.0, 7.0)));
        assert!(!b.contains(Vec3::new(2.9, 5.0, 5.0)));
    }

    proptest! {
        #[test]
        fn prop_membership_invariant(ops in proptest::collection::vec((0u8..3, 0u32..20, 0f32..100.0, 0f32..100.0, 0f32..100.0), 1..150)) {
            let mut grid = grid();
            let mut present: std::collections::HashSet<u32> = Default::default();
            for (op, raw, x, y, z) in ops {
                let pid = id(raw + 1);
                let p = Vec3::new(x, y, z);
                match op {
                    0 => {
                        grid.insert(pid, p);
                        present.insert(raw + 1);
                    }
                    1 => {
                        if grid.remove(pid).is_ok() {
                            present.remove(&(raw + 1));
                        }
                    }
                    _ => {
                        if let Some(coord) = grid.cell_of(pid) {
                            // Reconstruct a position inside the recorded cell
                            let old = Vec3::new(
                                (coord.x as f32 + 0.5) * 10.0,
                                (coord.y as f32 + 0.5) * 10.0,
                                (coord.z as f32 + 0.5) * 10.0,
                            );
                            grid.update(pid, old, p);
                        }
                    }
                }
                prop_assert!(grid.check_invariants());
                prop_assert_eq!(grid.particle_count(), present.len());
            }
        }
    }
}
