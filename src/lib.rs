//! # 3D Multi-Agent Collision Avoidance
//!
//! A reciprocal collision avoidance engine (ORCA) for populations of
//! spherical agents in three dimensions, extended with per-agent
//! acceleration/deceleration budgets and axis-dependent speed caps.
//!
//! Each simulation step rebuilds a k-d tree over agent positions, selects a
//! collision-free velocity for every agent in parallel, and integrates
//! positions. Preferred velocities are supplied by the host each step; the
//! engine only provides local avoidance.

use pyo3::prelude::*;

mod kdtree;
mod kinematics;
mod orca;
mod simulator;
mod structs;

pub use simulator::{Simulator, ERROR_ID};
pub use structs::{Plane, Vector3};

#[pymodule]
fn avoidance_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    // Core data structures
    m.add_class::<Vector3>()?;
    m.add_class::<Plane>()?;

    // The simulation engine
    m.add_class::<Simulator>()?;

    // Sentinel returned by add_agent when defaults are missing
    m.add("ERROR_ID", ERROR_ID)?;

    Ok(())
}
