//! Structure-of-Arrays particle storage
//!
//! Every attribute is a dense contiguous array indexed by slot. Scalar
//! columns hold one lane per particle; vector columns hold three, color
//! four. Slots are recycled through a LIFO free list kept in descending
//! order so fresh pops fill ascending indices.
//!
//! Invariants: `count` equals the number of set alive flags; the id/index
//! maps are mutual inverses restricted to alive slots; `free_indices`
//! holds exactly the dead indices below capacity.

use crate::core::Vec3;
use crate::particle::error::ParticleError;
use crate::particle::ParticleId;
use std::cmp::Ordering;
use std::collections::HashMap;

fn write_vec3(column: &mut [f32], index: usize, value: Vec3) {
    let base = index * 3;
    column[base] = value.x;
    column[base + 1] = value.y;
    column[base + 2] = value.z;
}

/// One particle's attributes, gathered for permutation passes
#[derive(Debug, Clone, Copy, Default)]
struct ParticleData {
    position: [f32; 3],
    velocity: [f32; 3],
    acceleration: [f32; 3],
    lifetime: f32,
    age: f32,
    size: [f32; 3],
    color: [f32; 4],
    rotation: [f32; 3],
    angular_velocity: [f32; 3],
    custom: [[f32; 4]; 4],
    id: u32,
}

/// Dense SoA particle store
///
/// # Example
/// ```
/// use sim_core::core::Vec3;
/// use sim_core::particle::ParticleBuffer;
///
/// let mut buf = ParticleBuffer::new();
/// buf.allocate(64).unwrap();
/// let id = buf
///     .add_particle(Vec3::new(1.0, 2.0, 3.0), Vec3::ZERO, 5.0, 0.5, 0xFF00_00FF)
///     .unwrap();
/// assert_eq!(buf.count(), 1);
/// buf.kill_particle(id).unwrap();
/// assert_eq!(buf.count(), 0);
/// ```
#[derive(Debug)]
pub struct ParticleBuffer {
    capacity: usize,
    count: usize,
    allocated: bool,
    next_id: u32,
    alive: Vec<u8>,
    positions: Vec<f32>,
    velocities: Vec<f32>,
    accelerations: Vec<f32>,
    lifetimes: Vec<f32>,
    ages: Vec<f32>,
    sizes: Vec<f32>,
    colors: Vec<f32>,
    rotations: Vec<f32>,
    angular_velocities: Vec<f32>,
    custom: [Vec<f32>; 4],
    index_to_particle: Vec<u32>,
    particle_to_index: HashMap<ParticleId, usize>,
    /// Descending order so `pop()` yields ascending indices
    free_indices: Vec<usize>,
}

impl Default for ParticleBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticleBuffer {
    pub fn new() -> Self {
        Self {
            capacity: 0,
            count: 0,
            allocated: false,
            next_id: 1,
            alive: Vec::new(),
            positions: Vec::new(),
            velocities: Vec::new(),
            accelerations: Vec::new(),
            lifetimes: Vec::new(),
            ages: Vec::new(),
            sizes: Vec::new(),
            colors: Vec::new(),
            rotations: Vec::new(),
            angular_velocities: Vec::new(),
            custom: Default::default(),
            index_to_particle: Vec::new(),
            particle_to_index: HashMap::new(),
            free_indices: Vec::new(),
        }
    }

    /// Allocate every attribute column for `capacity` particles
    pub fn allocate(&mut self, capacity: usize) -> Result<(), ParticleError> {
        if capacity == 0 {
            return Err(ParticleError::InvalidConfiguration {
                reason: "capacity must be positive".into(),
            });
        }
        if self.allocated {
            return Err(ParticleError::InvalidState {
                reason: "buffer already allocated".into(),
            });
        }

        self.capacity = capacity;
        self.count = 0;
        self.alive = vec![0; capacity];
        self.positions = vec![0.0; capacity * 3];
        self.velocities = vec![0.0; capacity * 3];
        self.accelerations = vec![0.0; capacity * 3];
        self.lifetimes = vec![0.0; capacity];
        self.ages = vec![0.0; capacity];
        self.sizes = vec![0.0; capacity * 3];
        self.colors = vec![0.0; capacity * 4];
        self.rotations = vec![0.0; capacity * 3];
        self.angular_velocities = vec![0.0; capacity * 3];
        self.custom = std::array::from_fn(|_| vec![0.0; capacity * 4]);
        self.index_to_particle = vec![0; capacity];
        self.particle_to_index = HashMap::with_capacity(capacity);
        self.free_indices = (0..capacity).rev().collect();
        self.allocated = true;
        Ok(())
    }

    /// Discard all storage and mappings
    pub fn deallocate(&mut self) {
        let next_id = self.next_id;
        *self = Self::new();
        self.next_id = next_id;
    }

    /// Grow to `new_capacity`; shrinking is a no-op
    pub fn resize(&mut self, new_capacity: usize) -> Result<(), ParticleError> {
        if !self.allocated {
            return self.allocate(new_capacity);
        }
        if new_capacity <= self.capacity {
            return Ok(());
        }

        let old = self.capacity;
        grow_column(&mut self.alive, old, new_capacity, 1, 0u8);
        grow_column(&mut self.positions, old, new_capacity, 3, 0.0f32);
        grow_column(&mut self.velocities, old, new_capacity, 3, 0.0);
        grow_column(&mut self.accelerations, old, new_capacity, 3, 0.0);
        grow_column(&mut self.lifetimes, old, new_capacity, 1, 0.0);
        grow_column(&mut self.ages, old, new_capacity, 1, 0.0);
        grow_column(&mut self.sizes, old, new_capacity, 3, 0.0);
        grow_column(&mut self.colors, old, new_capacity, 4, 0.0);
        grow_column(&mut self.rotations, old, new_capacity, 3, 0.0);
        grow_column(&mut self.angular_velocities, old, new_capacity, 3, 0.0);
        for column in &mut self.custom {
            grow_column(column, old, new_capacity, 4, 0.0);
        }
        grow_column(&mut self.index_to_particle, old, new_capacity, 1, 0u32);

        // New slots are dead; descending push keeps ascending pops
        for i in (old..new_capacity).rev() {
            self.free_indices.push(i);
        }
        self.capacity = new_capacity;
        Ok(())
    }

    /// Spawn a particle; doubles capacity when full
    ///
    /// `size` is broadcast to the three size lanes; `color` is a packed
    /// 32-bit word unpacked as R from bits 24..31, G 16..23, B 8..15,
    /// A 0..7, each scaled to `[0, 1]`.
    pub fn add_particle(
        &mut self,
        position: Vec3,
        velocity: Vec3,
        lifetime: f32,
        size: f32,
        color: u32,
    ) -> Option<ParticleId> {
        if self.free_indices.is_empty() && self.resize(self.capacity * 2).is_err() {
            return None;
        }
        let index = self.free_indices.pop()?;

        let id = ParticleId::from_raw(self.next_id);
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let base3 = index * 3;
        self.positions[base3] = position.x;
        self.positions[base3 + 1] = position.y;
        self.positions[base3 + 2] = position.z;
        self.velocities[base3] = velocity.x;
        self.velocities[base3 + 1] = velocity.y;
        self.velocities[base3 + 2] = velocity.z;
        for k in 0..3 {
            self.accelerations[base3 + k] = 0.0;
            self.sizes[base3 + k] = size;
            self.rotations[base3 + k] = 0.0;
            self.angular_velocities[base3 + k] = 0.0;
        }
        self.lifetimes[index] = lifetime;
        self.ages[index] = 0.0;

        let base4 = index * 4;
        self.colors[base4] = ((color >> 24) & 0xFF) as f32 / 255.0;
        self.colors[base4 + 1] = ((color >> 16) & 0xFF) as f32 / 255.0;
        self.colors[base4 + 2] = ((color >> 8) & 0xFF) as f32 / 255.0;
        self.colors[base4 + 3] = (color & 0xFF) as f32 / 255.0;
        for column in &mut self.custom {
            for k in 0..4 {
                column[base4 + k] = 0.0;
            }
        }

        self.alive[index] = 1;
        self.index_to_particle[index] = id.as_raw();
        self.particle_to_index.insert(id, index);
        self.count += 1;
        Some(id)
    }

    /// Remove the particle at a slot
    pub fn remove_particle(&mut self, index: usize) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        let id = ParticleId::from_raw(self.index_to_particle[index]);
        self.alive[index] = 0;
        self.index_to_particle[index] = 0;
        self.particle_to_index.remove(&id);
        self.free_indices.push(index);
        self.count -= 1;
        Ok(())
    }

    /// Remove a particle by id
    pub fn kill_particle(&mut self, id: ParticleId) -> Result<(), ParticleError> {
        let index = *self
            .particle_to_index
            .get(&id)
            .ok_or(ParticleError::ParticleNotFound { id })?;
        self.remove_particle(index)
    }

    /// Drop every particle, keeping storage
    pub fn clear(&mut self) {
        self.alive.fill(0);
        self.index_to_particle.fill(0);
        self.particle_to_index.clear();
        self.free_indices = (0..self.capacity).rev().collect();
        self.count = 0;
    }

    /// Stable compaction: alive particles move to the dense prefix
    /// `[0, count)` preserving order; mappings are rewritten
    pub fn compact(&mut self) {
        let mut write = 0;
        for read in 0..self.capacity {
            if self.alive[read] == 0 {
                continue;
            }
            if read != write {
                let data = self.gather(read);
                self.scatter(write, &data);
                self.alive[write] = 1;
                let id = ParticleId::from_raw(data.id);
                self.particle_to_index.insert(id, write);
            }
            write += 1;
        }
        for index in write..self.capacity {
            self.alive[index] = 0;
            self.index_to_particle[index] = 0;
        }
        self.count = write;
        self.free_indices = (write..self.capacity).rev().collect();
    }

    /// Sort alive particles into the prefix `[0, count)`
    ///
    /// Orders by `compare` over slot indices, or by age ascending when no
    /// comparator is given. Copies flow through a contiguous scratch
    /// buffer; both mappings are rewritten.
    pub fn sort(&mut self, compare: Option<&dyn Fn(usize, usize) -> Ordering>) {
        let mut order: Vec<usize> = (0..self.capacity).filter(|&i| self.alive[i] == 1).collect();
        match compare {
            Some(cmp) => order.sort_by(|&a, &b| cmp(a, b)),
            None => order.sort_by(|&a, &b| {
                self.ages[a]
                    .partial_cmp(&self.ages[b])
                    .unwrap_or(Ordering::Equal)
            }),
        }

        let scratch: Vec<ParticleData> = order.iter().map(|&i| self.gather(i)).collect();
        for (target, data) in scratch.iter().enumerate() {
            self.scatter(target, data);
            self.alive[target] = 1;
            self.particle_to_index
                .insert(ParticleId::from_raw(data.id), target);
        }
        for index in scratch.len()..self.capacity {
            self.alive[index] = 0;
            self.index_to_particle[index] = 0;
        }
        self.count = scratch.len();
        self.free_indices = (scratch.len()..self.capacity).rev().collect();
    }

    // -- accessors ---------------------------------------------------------

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline]
    pub fn is_allocated(&self) -> bool {
        self.allocated
    }

    /// Slot for an id
    pub fn index_of(&self, id: ParticleId) -> Option<usize> {
        self.particle_to_index.get(&id).copied()
    }

    /// Id stored at a slot, if alive
    pub fn particle_at(&self, index: usize) -> Option<ParticleId> {
        if index < self.capacity && self.alive[index] == 1 {
            Some(ParticleId::from_raw(self.index_to_particle[index]))
        } else {
            None
        }
    }

    /// Iterate alive particles as `(id, slot)`
    pub fn iter_alive(&self) -> impl Iterator<Item = (ParticleId, usize)> + '_ {
        (0..self.capacity).filter_map(move |i| self.particle_at(i).map(|id| (id, i)))
    }

    pub fn get_position(&self, index: usize) -> Result<Vec3, ParticleError> {
        self.check_alive(index)?;
        Ok(self.read_vec3(&self.positions, index))
    }

    pub fn set_position(&mut self, index: usize, value: Vec3) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        write_vec3(&mut self.positions, index, value);
        Ok(())
    }

    pub fn get_velocity(&self, index: usize) -> Result<Vec3, ParticleError> {
        self.check_alive(index)?;
        Ok(self.read_vec3(&self.velocities, index))
    }

    pub fn set_velocity(&mut self, index: usize, value: Vec3) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        write_vec3(&mut self.velocities, index, value);
        Ok(())
    }

    pub fn get_acceleration(&self, index: usize) -> Result<Vec3, ParticleError> {
        self.check_alive(index)?;
        Ok(self.read_vec3(&self.accelerations, index))
    }

    pub fn set_acceleration(&mut self, index: usize, value: Vec3) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        write_vec3(&mut self.accelerations, index, value);
        Ok(())
    }

    pub fn get_age(&self, index: usize) -> Result<f32, ParticleError> {
        self.check_alive(index)?;
        Ok(self.ages[index])
    }

    pub fn set_age(&mut self, index: usize, value: f32) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        self.ages[index] = value;
        Ok(())
    }

    pub fn get_lifetime(&self, index: usize) -> Result<f32, ParticleError> {
        self.check_alive(index)?;
        Ok(self.lifetimes[index])
    }

    pub fn get_color(&self, index: usize) -> Result<[f32; 4], ParticleError> {
        self.check_alive(index)?;
        let base = index * 4;
        Ok([
            self.colors[base],
            self.colors[base + 1],
            self.colors[base + 2],
            self.colors[base + 3],
        ])
    }

    /// Lane value from a custom column; `slot < 4`, `lane < 4`
    pub fn get_custom(&self, slot: usize, index: usize, lane: usize) -> Result<f32, ParticleError> {
        self.check_alive(index)?;
        if slot >= 4 || lane >= 4 {
            return Err(ParticleError::InvalidState {
                reason: format!("custom slot {} lane {} out of range", slot, lane),
            });
        }
        Ok(self.custom[slot][index * 4 + lane])
    }

    pub fn set_custom(
        &mut self,
        slot: usize,
        index: usize,
        lane: usize,
        value: f32,
    ) -> Result<(), ParticleError> {
        self.check_alive(index)?;
        if slot >= 4 || lane >= 4 {
            return Err(ParticleError::InvalidState {
                reason: format!("custom slot {} lane {} out of range", slot, lane),
            });
        }
        self.custom[slot][index * 4 + lane] = value;
        Ok(())
    }

    // Column snapshots for vectorised traversal
    pub fn positions(&self) -> &[f32] {
        &self.positions
    }

    pub fn velocities(&self) -> &[f32] {
        &self.velocities
    }

    pub fn accelerations(&self) -> &[f32] {
        &self.accelerations
    }

    pub fn ages(&self) -> &[f32] {
        &self.ages
    }

    pub fn lifetimes(&self) -> &[f32] {
        &self.lifetimes
    }

    pub fn colors(&self) -> &[f32] {
        &self.colors
    }

    pub fn alive_flags(&self) -> &[u8] {
        &self.alive
    }

    // -- internals ---------------------------------------------------------

    fn check_alive(&self, index: usize) -> Result<(), ParticleError> {
        if !self.allocated {
            return Err(ParticleError::SystemNotInitialized);
        }
        if index >= self.capacity {
            return Err(ParticleError::InvalidState {
                reason: format!("index {} out of range {}", index, self.capacity),
            });
        }
        if self.alive[index] == 0 {
            return Err(ParticleError::ParticleNotFound {
                id: ParticleId::ABSENT,
            });
        }
        Ok(())
    }

    fn read_vec3(&self, column: &[f32], index: usize) -> Vec3 {
        let base = index * 3;
        Vec3::new(column[base], column[base + 1], column[base + 2])
    }


    fn gather(&self, index: usize) -> ParticleData {
        let b3 = index * 3;
        let b4 = index * 4;
        ParticleData {
            position: [self.positions[b3], self.positions[b3 + 1], self.positions[b3 + 2]],
            velocity: [
                self.velocities[b3],
                self.velocities[b3 + 1],
                self.velocities[b3 + 2],
            ],
            acceleration: [
                self.accelerations[b3],
                self.accelerations[b3 + 1],
                self.accelerations[b3 + 2],
            ],
            lifetime: self.lifetimes[index],
            age: self.ages[index],
            size: [self.sizes[b3], self.sizes[b3 + 1], self.sizes[b3 + 2]],
            color: [
                self.colors[b4],
                self.colors[b4 + 1],
                self.colors[b4 + 2],
                self.colors[b4 + 3],
            ],
            rotation: [
                self.rotations[b3],
                self.rotations[b3 + 1],
                self.rotations[b3 + 2],
            ],
            angular_velocity: [
                self.angular_velocities[b3],
                self.angular_velocities[b3 + 1],
                self.angular_velocities[b3 + 2],
            ],
            custom: std::array::from_fn(|slot| {
                std::array::from_fn(|lane| self.custom[slot][b4 + lane])
            }),
            id: self.index_to_particle[index],
        }
    }

    fn scatter(&mut self, index: usize, data: &ParticleData) {
        let b3 = index * 3;
        let b4 = index * 4;
        self.positions[b3..b3 + 3].copy_from_slice(&data.position);
        self.velocities[b3..b3 + 3].copy_from_slice(&data.velocity);
        self.accelerations[b3..b3 + 3].copy_from_slice(&data.acceleration);
        self.lifetimes[index] = data.lifetime;
        self.ages[index] = data.age;
        self.sizes[b3..b3 + 3].copy_from_slice(&data.size);
        self.colors[b4..b4 + 4].copy_from_slice(&data.color);
        self.rotations[b3..b3 + 3].copy_from_slice(&data.rotation);
        self.angular_velocities[b3..b3 + 3].copy_from_slice(&data.angular_velocity);
        for (slot, column) in self.custom.iter_mut().enumerate() {
            column[b4..b4 + 4].copy_from_slice(&data.custom[slot]);
        }
        self.index_to_particle[index] = data.id;
    }

    /// Invariant check used by the property tests
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) -> bool {
        let alive_count = self.alive.iter().filter(|&&a| a == 1).count();
        if alive_count != self.count {
            return false;
        }
        let dead: std::collections::HashSet<usize> = (0..self.capacity)
            .filter(|&i| self.alive[i] == 0)
            .collect();
        let free: std::collections::HashSet<usize> = self.free_indices.iter().copied().collect();
        if dead != free || free.len() != self.free_indices.len() {
            return false;
        }
        self.particle_to_index.iter().all(|(&id, &idx)| {
            self.alive[idx] == 1 && self.index_to_particle[idx] == id.as_raw()
        }) && (0..self.capacity).all(|i| {
            self.alive[i] == 0
                || self
                    .particle_to_index
                    .get(&ParticleId::from_raw(self.index_to_particle[i]))
                    == Some(&i)
        })
    }
}

fn grow_column<T: Copy>(column: &mut Vec<T>, old: usize, new: usize, lanes: usize, fill: T) {
    debug_assert_eq!(column.len(), old * lanes);
    column.resize(new * lanes, fill);
}
