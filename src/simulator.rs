//! The simulation owner: agent population, defaults template, spatial
//! index, and the three-phase step loop.
//!
//! A step rebuilds the k-d tree over current positions, computes every
//! agent's new velocity in parallel against that frozen snapshot, then
//! serially installs velocities and advances positions. Workers write only
//! to their own agent's workspace, so no locking is needed.

use crate::kdtree::KdTree;
use crate::kinematics;
use crate::orca;
use crate::structs::{Agent, Plane, Vector3, Workspace};
use pyo3::prelude::*;
use rayon::prelude::*;

/// Returned by identifier-producing operations that fail, e.g. `add_agent`
/// before the agent defaults have been configured.
pub const ERROR_ID: usize = usize::MAX;

#[derive(Debug, Clone)]
struct AgentDefaults {
    neighbor_dist: f64,
    max_neighbors: usize,
    time_horizon: f64,
    radius: f64,
    max_speed: f64,
    velocity: Vector3,
}

/// Runs one agent's phase-2 pipeline against the frozen snapshot: neighbor
/// query, ORCA plane construction, constrained optimization, kinematic
/// post-filter. Writes only to `ws`.
fn compute_agent(agents: &[Agent], tree: &KdTree, time_step: f64, index: usize, ws: &mut Workspace) {
    let agent = &agents[index];

    ws.neighbors.clear();
    if agent.max_neighbors > 0 {
        tree.query_neighbors(agents, agent, ws, agent.neighbor_dist * agent.neighbor_dist);
    }

    ws.low_motion_steps =
        kinematics::update_low_motion_counter(agent.velocity.magnitude(), ws.low_motion_steps);
    let pref_velocity = kinematics::adaptive_pref_velocity(agent, ws.low_motion_steps);

    ws.orca_planes.clear();
    orca::build_orca_planes(agent, agents, &ws.neighbors, time_step, &mut ws.orca_planes);

    let candidate = orca::solve_velocity(&ws.orca_planes, agent.max_speed, &pref_velocity);
    let limited = kinematics::apply_acceleration_limits(agent, candidate, time_step);
    let capped = kinematics::apply_speed_limits(agent, limited);
    ws.new_velocity = kinematics::apply_aggressive_correction(agent, capped, &mut ws.low_motion_steps);
}

#[pyclass]
pub struct Simulator {
    time_step: f64,
    global_time: f64,
    agents: Vec<Agent>,
    workspaces: Vec<Workspace>,
    defaults: Option<AgentDefaults>,
    kd_tree: KdTree,
}

impl Default for Simulator {
    fn default() -> Self {
        Simulator::new()
    }
}

#[pymethods]
impl Simulator {
    #[new]
    pub fn new() -> Self {
        Simulator {
            time_step: 0.0,
            global_time: 0.0,
            agents: Vec::new(),
            workspaces: Vec::new(),
            defaults: None,
            kd_tree: KdTree::new(),
        }
    }

    pub fn set_time_step(&mut self, time_step: f64) {
        self.time_step = time_step;
    }

    pub fn time_step(&self) -> f64 {
        self.time_step
    }

    pub fn global_time(&self) -> f64 {
        self.global_time
    }

    pub fn num_agents(&self) -> usize {
        self.agents.len()
    }

    /// Sets the property template every subsequent `add_agent` copies.
    #[pyo3(signature = (neighbor_dist, max_neighbors, time_horizon, radius, max_speed, velocity=None))]
    pub fn set_agent_defaults(
        &mut self,
        neighbor_dist: f64,
        max_neighbors: usize,
        time_horizon: f64,
        radius: f64,
        max_speed: f64,
        velocity: Option<Vector3>,
    ) {
        self.defaults = Some(AgentDefaults {
            neighbor_dist,
            max_neighbors,
            time_horizon,
            radius,
            max_speed,
            velocity: velocity.unwrap_or_default(),
        });
    }

    /// Adds an agent with the default properties. Returns its identifier,
    /// or `ERROR_ID` when no defaults have been configured.
    pub fn add_agent(&mut self, position: Vector3) -> usize {
        let Some(defaults) = self.defaults.clone() else {
            tracing::debug!("add_agent called before set_agent_defaults");
            return ERROR_ID;
        };

        self.push_agent(
            position,
            defaults.neighbor_dist,
            defaults.max_neighbors,
            defaults.time_horizon,
            defaults.radius,
            defaults.max_speed,
            defaults.velocity,
        )
    }

    /// Adds an agent with explicit properties, bypassing the defaults.
    #[allow(clippy::too_many_arguments)]
    #[pyo3(signature = (position, neighbor_dist, max_neighbors, time_horizon, radius, max_speed, velocity=None))]
    pub fn add_agent_with_params(
        &mut self,
        position: Vector3,
        neighbor_dist: f64,
        max_neighbors: usize,
        time_horizon: f64,
        radius: f64,
        max_speed: f64,
        velocity: Option<Vector3>,
    ) -> usize {
        self.push_agent(
            position,
            neighbor_dist,
            max_neighbors,
            time_horizon,
            radius,
            max_speed,
            velocity.unwrap_or_default(),
        )
    }

    /// Removes an agent. The agent that previously had identifier
    /// `num_agents() - 1` takes over the freed identifier.
    pub fn remove_agent(&mut self, agent_id: usize) {
        self.agents.swap_remove(agent_id);
        self.workspaces.swap_remove(agent_id);
        if agent_id < self.agents.len() {
            self.agents[agent_id].id = agent_id;
        }
        tracing::debug!(agent_id, remaining = self.agents.len(), "agent removed");
    }

    /// Advances the simulation by one time step.
    pub fn do_step(&mut self) {
        self.kd_tree.build(&self.agents);

        let agents = &self.agents;
        let tree = &self.kd_tree;
        let time_step = self.time_step;

        self.workspaces
            .par_iter_mut()
            .enumerate()
            .for_each(|(index, ws)| compute_agent(agents, tree, time_step, index, ws));

        // A non-positive time step leaves velocities and positions as they
        // are; the scratch state above is still refreshed.
        if time_step > 0.0 {
            for (agent, ws) in self.agents.iter_mut().zip(&self.workspaces) {
                agent.velocity = ws.new_velocity;
                agent.position = agent.position + agent.velocity * time_step;
            }
        }

        self.global_time += time_step;
        tracing::trace!(
            agents = self.agents.len(),
            global_time = self.global_time,
            "step complete"
        );
    }

    // Per-agent accessors. Identifiers are dense indices; passing a stale
    // or out-of-range identifier is a host error.

    pub fn agent_position(&self, agent_id: usize) -> Vector3 {
        self.agents[agent_id].position
    }

    pub fn set_agent_position(&mut self, agent_id: usize, position: Vector3) {
        self.agents[agent_id].position = position;
    }

    pub fn agent_velocity(&self, agent_id: usize) -> Vector3 {
        self.agents[agent_id].velocity
    }

    pub fn set_agent_velocity(&mut self, agent_id: usize, velocity: Vector3) {
        self.agents[agent_id].velocity = velocity;
    }

    pub fn agent_pref_velocity(&self, agent_id: usize) -> Vector3 {
        self.agents[agent_id].pref_velocity
    }

    pub fn set_agent_pref_velocity(&mut self, agent_id: usize, pref_velocity: Vector3) {
        self.agents[agent_id].pref_velocity = pref_velocity;
    }

    pub fn agent_radius(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].radius
    }

    pub fn set_agent_radius(&mut self, agent_id: usize, radius: f64) {
        self.agents[agent_id].radius = radius;
    }

    pub fn agent_neighbor_dist(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].neighbor_dist
    }

    pub fn set_agent_neighbor_dist(&mut self, agent_id: usize, neighbor_dist: f64) {
        self.agents[agent_id].neighbor_dist = neighbor_dist;
    }

    pub fn agent_max_neighbors(&self, agent_id: usize) -> usize {
        self.agents[agent_id].max_neighbors
    }

    pub fn set_agent_max_neighbors(&mut self, agent_id: usize, max_neighbors: usize) {
        self.agents[agent_id].max_neighbors = max_neighbors;
    }

    pub fn agent_time_horizon(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].time_horizon
    }

    pub fn set_agent_time_horizon(&mut self, agent_id: usize, time_horizon: f64) {
        self.agents[agent_id].time_horizon = time_horizon;
    }

    pub fn agent_max_speed(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_speed
    }

    pub fn set_agent_max_speed(&mut self, agent_id: usize, max_speed: f64) {
        self.agents[agent_id].max_speed = max_speed;
    }

    pub fn agent_max_acceleration(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_acceleration
    }

    pub fn set_agent_max_acceleration(&mut self, agent_id: usize, max_acceleration: f64) {
        self.agents[agent_id].max_acceleration = max_acceleration;
    }

    pub fn agent_max_deceleration(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_deceleration
    }

    pub fn set_agent_max_deceleration(&mut self, agent_id: usize, max_deceleration: f64) {
        self.agents[agent_id].max_deceleration = max_deceleration;
    }

    pub fn agent_horizontal_speed(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_horizontal_speed
    }

    pub fn set_agent_horizontal_speed(&mut self, agent_id: usize, max_horizontal_speed: f64) {
        self.agents[agent_id].max_horizontal_speed = max_horizontal_speed;
    }

    pub fn agent_vertical_up_speed(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_vertical_up_speed
    }

    pub fn set_agent_vertical_up_speed(&mut self, agent_id: usize, max_vertical_up_speed: f64) {
        self.agents[agent_id].max_vertical_up_speed = max_vertical_up_speed;
    }

    pub fn agent_vertical_down_speed(&self, agent_id: usize) -> f64 {
        self.agents[agent_id].max_vertical_down_speed
    }

    pub fn set_agent_vertical_down_speed(&mut self, agent_id: usize, max_vertical_down_speed: f64) {
        self.agents[agent_id].max_vertical_down_speed = max_vertical_down_speed;
    }

    pub fn set_agent_directional_speeds(
        &mut self,
        agent_id: usize,
        max_horizontal_speed: f64,
        max_vertical_up_speed: f64,
        max_vertical_down_speed: f64,
    ) {
        let agent = &mut self.agents[agent_id];
        agent.max_horizontal_speed = max_horizontal_speed;
        agent.max_vertical_up_speed = max_vertical_up_speed;
        agent.max_vertical_down_speed = max_vertical_down_speed;
    }

    pub fn agent_uses_directional_limits(&self, agent_id: usize) -> bool {
        self.agents[agent_id].use_directional_limits
    }

    pub fn set_agent_use_directional_limits(&mut self, agent_id: usize, use_limits: bool) {
        self.agents[agent_id].use_directional_limits = use_limits;
    }

    // Post-step introspection.

    pub fn agent_num_orca_planes(&self, agent_id: usize) -> usize {
        self.workspaces[agent_id].orca_planes.len()
    }

    pub fn agent_orca_plane(&self, agent_id: usize, plane_no: usize) -> Plane {
        self.workspaces[agent_id].orca_planes[plane_no]
    }

    pub fn agent_num_neighbors(&self, agent_id: usize) -> usize {
        self.workspaces[agent_id].neighbors.len()
    }

    /// The identifier of the `neighbor_no`-th selected neighbor (nearest
    /// first) from the most recent step.
    pub fn agent_neighbor(&self, agent_id: usize, neighbor_no: usize) -> usize {
        self.workspaces[agent_id].neighbors[neighbor_no].1
    }
}

impl Simulator {
    #[allow(clippy::too_many_arguments)]
    fn push_agent(
        &mut self,
        position: Vector3,
        neighbor_dist: f64,
        max_neighbors: usize,
        time_horizon: f64,
        radius: f64,
        max_speed: f64,
        velocity: Vector3,
    ) -> usize {
        let id = self.agents.len();
        self.agents.push(Agent::new(
            id,
            position,
            neighbor_dist,
            max_neighbors,
            time_horizon,
            radius,
            max_speed,
            velocity,
        ));
        self.workspaces.push(Workspace::default());
        id
    }
}
