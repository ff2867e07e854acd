//! # Core Data Structures
//!
//! This module defines the fundamental data types used throughout the library:
//!
//! - **Vector3**: 3D position/velocity vector with arithmetic operations
//! - **Plane**: half-space constraint in velocity space (ORCA constraint)
//! - **Agent**: complete state of an agent (position, velocity, kinematic limits)
//! - **Workspace**: per-agent scratch state reused across simulation steps

use ordered_float::OrderedFloat;
use pyo3::prelude::*;
use std::ops::{Add, Mul, Sub};

#[pyclass]
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vector3 {
    #[pyo3(get, set)]
    pub x: f64,
    #[pyo3(get, set)]
    pub y: f64,
    #[pyo3(get, set)]
    pub z: f64,
}

#[pymethods]
impl Vector3 {
    #[new]
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Vector3 { x, y, z }
    }

    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn magnitude_sq(&self) -> f64 {
        self.x * self.x + self.y * self.y + self.z * self.z
    }

    pub fn normalize(&self) -> Vector3 {
        let mag = self.magnitude();
        if mag > 0.0 {
            Vector3 {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
            }
        } else {
            Vector3::default()
        }
    }

    pub fn dot(&self, other: &Vector3) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Vector3) -> Vector3 {
        Vector3 {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn __str__(&self) -> String {
        format!("Vector3({:.2}, {:.2}, {:.2})", self.x, self.y, self.z)
    }

    pub fn __add__(&self, other: &Vector3) -> Vector3 {
        *self + *other
    }

    pub fn __sub__(&self, other: &Vector3) -> Vector3 {
        *self - *other
    }

    pub fn __mul__(&self, scalar: f64) -> Vector3 {
        *self * scalar
    }

    pub fn __neg__(&self) -> Vector3 {
        *self * -1.0
    }
}

impl Add for Vector3 {
    type Output = Vector3;

    fn add(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }
}

impl Sub for Vector3 {
    type Output = Vector3;

    fn sub(self, other: Vector3) -> Vector3 {
        Vector3 {
            x: self.x - other.x,
            y: self.y - other.y,
            z: self.z - other.z,
        }
    }
}

impl Mul<f64> for Vector3 {
    type Output = Vector3;

    fn mul(self, scalar: f64) -> Vector3 {
        Vector3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }
}

/// A half-space constraint in velocity space. A velocity `v` is permitted
/// with respect to this constraint if `(v - point) . normal >= 0`.
#[pyclass]
#[derive(Debug, Clone, Copy)]
pub struct Plane {
    #[pyo3(get, set)]
    pub point: Vector3,
    #[pyo3(get, set)]
    pub normal: Vector3,
}

#[pymethods]
impl Plane {
    #[new]
    pub fn new(point: Vector3, normal: Vector3) -> Self {
        Plane { point, normal }
    }

    pub fn __str__(&self) -> String {
        format!(
            "Plane(point={}, normal={})",
            self.point.__str__(),
            self.normal.__str__()
        )
    }
}

// Kinematic limits assigned to newly created agents. Hosts override them
// per agent after `add_agent`.
pub const DEFAULT_MAX_ACCELERATION: f64 = 10.0;
pub const DEFAULT_MAX_DECELERATION: f64 = 15.0;
pub const DEFAULT_MAX_HORIZONTAL_SPEED: f64 = 5.0;
pub const DEFAULT_MAX_VERTICAL_UP_SPEED: f64 = 3.0;
pub const DEFAULT_MAX_VERTICAL_DOWN_SPEED: f64 = 3.0;

/// The complete state and parameters of one agent. The `id` is always the
/// agent's current index in the simulator's collection; removal renumbers
/// the swapped-in agent.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: usize,
    pub position: Vector3,
    pub velocity: Vector3,
    pub pref_velocity: Vector3,
    pub radius: f64,
    pub neighbor_dist: f64,
    pub max_neighbors: usize,
    pub time_horizon: f64,
    pub max_speed: f64,
    pub max_acceleration: f64,
    pub max_deceleration: f64,
    pub max_horizontal_speed: f64,
    pub max_vertical_up_speed: f64,
    pub max_vertical_down_speed: f64,
    pub use_directional_limits: bool,
}

impl Agent {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: usize,
        position: Vector3,
        neighbor_dist: f64,
        max_neighbors: usize,
        time_horizon: f64,
        radius: f64,
        max_speed: f64,
        velocity: Vector3,
    ) -> Self {
        Agent {
            id,
            position,
            velocity,
            pref_velocity: Vector3::default(),
            radius,
            neighbor_dist,
            max_neighbors,
            time_horizon,
            max_speed,
            max_acceleration: DEFAULT_MAX_ACCELERATION,
            max_deceleration: DEFAULT_MAX_DECELERATION,
            max_horizontal_speed: DEFAULT_MAX_HORIZONTAL_SPEED,
            max_vertical_up_speed: DEFAULT_MAX_VERTICAL_UP_SPEED,
            max_vertical_down_speed: DEFAULT_MAX_VERTICAL_DOWN_SPEED,
            use_directional_limits: false,
        }
    }
}

/// Per-agent scratch state. One `Workspace` is kept per agent, parallel to
/// the agent collection, so the per-step computation writes only here while
/// the agent records stay read-only. The vectors retain their capacity
/// across steps; only the low-motion counter carries over as state.
#[derive(Debug, Clone, Default)]
pub struct Workspace {
    pub new_velocity: Vector3,
    pub low_motion_steps: u32,
    /// `(squared distance, agent index)` pairs, ascending by distance.
    pub neighbors: Vec<(f64, usize)>,
    pub orca_planes: Vec<Plane>,
}

impl Workspace {
    /// Inserts a candidate neighbor into the bounded sorted neighbor list.
    ///
    /// Once the list is full, the worst entry is evicted and `range_sq`
    /// shrinks to the new worst distance, tightening the ongoing tree query.
    pub fn insert_neighbor(
        &mut self,
        neighbor: usize,
        dist_sq: f64,
        max_neighbors: usize,
        range_sq: &mut f64,
    ) {
        if dist_sq >= *range_sq {
            return;
        }

        if self.neighbors.len() == max_neighbors {
            self.neighbors.pop();
        }

        let at = self
            .neighbors
            .binary_search_by_key(&OrderedFloat(dist_sq), |&(d, _)| OrderedFloat(d))
            .unwrap_or_else(|i| i);
        self.neighbors.insert(at, (dist_sq, neighbor));

        if self.neighbors.len() == max_neighbors {
            if let Some(&(worst, _)) = self.neighbors.last() {
                *range_sq = worst;
            }
        }
    }
}
