//! Kinematic post-filter applied to the optimizer's candidate velocity.
//!
//! Enforces per-agent acceleration and deceleration budgets, the spherical
//! or axis-dependent speed caps, and the two deadlock-escape behaviors
//! driven by the per-agent low-motion counter.

use crate::orca::EPSILON;
use crate::structs::{Agent, Vector3};

/// Observed speeds below this count as "not moving" for deadlock detection.
pub const LOW_MOTION_SPEED: f64 = 0.05;
/// Consecutive low-motion steps before the preferred velocity is boosted.
pub const ADAPTIVE_THRESHOLD: u32 = 5;
/// Consecutive low-motion steps before the aggressive correction kicks in.
pub const AGGRESSIVE_THRESHOLD: u32 = 15;
/// The adaptive boost raises a small preferred speed to this fraction of
/// the agent's maximum speed.
pub const ADAPTIVE_BOOST_FACTOR: f64 = 0.5;
/// The aggressive correction steps at this fraction of the maximum speed.
pub const AGGRESSIVE_STEP_FACTOR: f64 = 0.8;

/// Advances the per-agent stall counter: counts consecutive steps at
/// near-zero speed, resetting as soon as motion recovers.
pub fn update_low_motion_counter(current_speed: f64, counter: u32) -> u32 {
    if current_speed < LOW_MOTION_SPEED {
        counter.saturating_add(1)
    } else {
        0
    }
}

/// Returns the preferred velocity to optimize against, boosted along its
/// own direction when the agent has been stalled with a small (but
/// nonzero) preferred speed. A zero preferred velocity is never boosted,
/// so an agent that wants to stand still stays at rest.
pub fn adaptive_pref_velocity(agent: &Agent, low_motion_steps: u32) -> Vector3 {
    if low_motion_steps < ADAPTIVE_THRESHOLD {
        return agent.pref_velocity;
    }

    let pref_speed = agent.pref_velocity.magnitude();
    let target = ADAPTIVE_BOOST_FACTOR * agent.max_speed;

    if pref_speed > EPSILON && pref_speed < target {
        agent.pref_velocity * (target / pref_speed)
    } else {
        agent.pref_velocity
    }
}

/// Caps the velocity change against the acceleration budget (speeding up)
/// or the deceleration budget (slowing down), scaling the change uniformly.
pub fn apply_acceleration_limits(agent: &Agent, candidate: Vector3, time_step: f64) -> Vector3 {
    let delta = candidate - agent.velocity;
    let delta_length = delta.magnitude();

    let limit = if candidate.magnitude() >= agent.velocity.magnitude() {
        agent.max_acceleration
    } else {
        agent.max_deceleration
    };
    let max_change = limit * time_step;

    if delta_length > max_change && delta_length > EPSILON {
        agent.velocity + delta * (max_change / delta_length)
    } else {
        candidate
    }
}

/// Clamps a velocity to the agent's speed caps: the horizontal (x, z)
/// magnitude and vertical (y) component independently when directional
/// limits are enabled, the full magnitude otherwise.
pub fn apply_speed_limits(agent: &Agent, velocity: Vector3) -> Vector3 {
    if !agent.use_directional_limits {
        let speed_sq = velocity.magnitude_sq();
        if speed_sq > agent.max_speed * agent.max_speed && speed_sq > 0.0 {
            return velocity * (agent.max_speed / speed_sq.sqrt());
        }
        return velocity;
    }

    let mut result = velocity;

    let horizontal_sq = velocity.x * velocity.x + velocity.z * velocity.z;
    if horizontal_sq > agent.max_horizontal_speed * agent.max_horizontal_speed {
        let scale = agent.max_horizontal_speed / horizontal_sq.sqrt();
        result.x *= scale;
        result.z *= scale;
    }

    if result.y > agent.max_vertical_up_speed {
        result.y = agent.max_vertical_up_speed;
    } else if result.y < -agent.max_vertical_down_speed {
        result.y = -agent.max_vertical_down_speed;
    }

    result
}

/// Breaks a persistent stall by overriding the filtered velocity with a
/// large step along the preferred direction, re-clamped by the speed caps.
/// Resets the counter when applied.
pub fn apply_aggressive_correction(
    agent: &Agent,
    velocity: Vector3,
    low_motion_steps: &mut u32,
) -> Vector3 {
    if *low_motion_steps < AGGRESSIVE_THRESHOLD {
        return velocity;
    }

    let pref_speed = agent.pref_velocity.magnitude();
    if pref_speed <= EPSILON {
        return velocity;
    }

    *low_motion_steps = 0;
    let escape = agent.pref_velocity * (AGGRESSIVE_STEP_FACTOR * agent.max_speed / pref_speed);
    apply_speed_limits(agent, escape)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_agent(velocity: Vector3, pref_velocity: Vector3, max_speed: f64) -> Agent {
        let mut agent = Agent::new(
            0,
            Vector3::default(),
            15.0,
            10,
            2.0,
            0.5,
            max_speed,
            velocity,
        );
        agent.pref_velocity = pref_velocity;
        agent
    }

    // ==================== Low-Motion Counter Tests ====================

    #[test]
    fn test_counter_increments_when_stalled() {
        assert_eq!(update_low_motion_counter(0.0, 0), 1);
        assert_eq!(update_low_motion_counter(0.01, 7), 8);
    }

    #[test]
    fn test_counter_resets_when_moving() {
        assert_eq!(update_low_motion_counter(1.0, 12), 0);
        assert_eq!(update_low_motion_counter(LOW_MOTION_SPEED, 3), 0);
    }

    // ==================== Adaptive Preferred Velocity Tests ====================

    #[test]
    fn test_adaptive_boost_below_threshold_is_identity() {
        let agent = make_agent(Vector3::default(), Vector3::new(0.1, 0.0, 0.0), 2.0);
        let pref = adaptive_pref_velocity(&agent, ADAPTIVE_THRESHOLD - 1);
        assert_eq!(pref, agent.pref_velocity);
    }

    #[test]
    fn test_adaptive_boost_raises_small_pref_speed() {
        let agent = make_agent(Vector3::default(), Vector3::new(0.1, 0.0, 0.0), 2.0);
        let pref = adaptive_pref_velocity(&agent, ADAPTIVE_THRESHOLD);
        assert!((pref.magnitude() - 1.0).abs() < 1e-9); // 0.5 * max_speed
        assert!((pref.normalize() - agent.pref_velocity.normalize()).magnitude() < 1e-9);
    }

    #[test]
    fn test_adaptive_boost_ignores_zero_pref() {
        let agent = make_agent(Vector3::default(), Vector3::default(), 2.0);
        let pref = adaptive_pref_velocity(&agent, 100);
        assert_eq!(pref, Vector3::default());
    }

    #[test]
    fn test_adaptive_boost_ignores_large_pref() {
        let agent = make_agent(Vector3::default(), Vector3::new(1.5, 0.0, 0.0), 2.0);
        let pref = adaptive_pref_velocity(&agent, 100);
        assert_eq!(pref, agent.pref_velocity);
    }

    // ==================== Acceleration Limit Tests ====================

    #[test]
    fn test_acceleration_clamp() {
        let mut agent = make_agent(Vector3::default(), Vector3::default(), 10.0);
        agent.max_acceleration = 5.0;
        let result = apply_acceleration_limits(&agent, Vector3::new(10.0, 0.0, 0.0), 0.1);
        assert!((result.magnitude() - 0.5).abs() < 1e-9);
        assert!(result.x > 0.0);
    }

    #[test]
    fn test_deceleration_clamp() {
        let mut agent = make_agent(Vector3::new(10.0, 0.0, 0.0), Vector3::default(), 10.0);
        agent.max_deceleration = 8.0;
        let result = apply_acceleration_limits(&agent, Vector3::default(), 0.1);
        assert!(((agent.velocity - result).magnitude() - 0.8).abs() < 1e-9);
        assert!(result.magnitude() > 0.0);
    }

    #[test]
    fn test_change_within_budget_passes_through() {
        let mut agent = make_agent(Vector3::new(1.0, 0.0, 0.0), Vector3::default(), 10.0);
        agent.max_acceleration = 10.0;
        let candidate = Vector3::new(1.5, 0.0, 0.0);
        let result = apply_acceleration_limits(&agent, candidate, 0.1);
        assert_eq!(result, candidate);
    }

    #[test]
    fn test_direction_change_at_equal_speed_uses_acceleration() {
        // Same speed, new direction: |candidate| == |current| selects the
        // acceleration budget.
        let mut agent = make_agent(Vector3::new(1.0, 0.0, 0.0), Vector3::default(), 10.0);
        agent.max_acceleration = 2.0;
        agent.max_deceleration = 100.0;
        let candidate = Vector3::new(0.0, 1.0, 0.0);
        let result = apply_acceleration_limits(&agent, candidate, 0.1);
        let change = (result - agent.velocity).magnitude();
        assert!((change - 0.2).abs() < 1e-9);
    }

    // ==================== Speed Cap Tests ====================

    #[test]
    fn test_spherical_clamp() {
        let agent = make_agent(Vector3::default(), Vector3::default(), 2.0);
        let result = apply_speed_limits(&agent, Vector3::new(3.0, 4.0, 0.0));
        assert!((result.magnitude() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_spherical_clamp_leaves_slow_velocity() {
        let agent = make_agent(Vector3::default(), Vector3::default(), 2.0);
        let v = Vector3::new(0.5, 0.5, 0.5);
        assert_eq!(apply_speed_limits(&agent, v), v);
    }

    #[test]
    fn test_directional_caps() {
        let mut agent = make_agent(Vector3::default(), Vector3::default(), 10.0);
        agent.use_directional_limits = true;
        agent.max_horizontal_speed = 1.0;
        agent.max_vertical_up_speed = 0.25;
        agent.max_vertical_down_speed = 2.0;

        let result = apply_speed_limits(&agent, Vector3::new(5.0, 5.0, 0.0));
        let horizontal = (result.x * result.x + result.z * result.z).sqrt();
        assert!((horizontal - 1.0).abs() < 1e-9);
        assert!((result.y - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_directional_down_cap() {
        let mut agent = make_agent(Vector3::default(), Vector3::default(), 10.0);
        agent.use_directional_limits = true;
        agent.max_horizontal_speed = 1.0;
        agent.max_vertical_up_speed = 0.25;
        agent.max_vertical_down_speed = 2.0;

        let result = apply_speed_limits(&agent, Vector3::new(0.5, -5.0, 0.0));
        assert_eq!(result.x, 0.5);
        assert!((result.y - (-2.0)).abs() < 1e-9);
    }

    #[test]
    fn test_directional_caps_scale_horizontal_uniformly() {
        let mut agent = make_agent(Vector3::default(), Vector3::default(), 10.0);
        agent.use_directional_limits = true;
        agent.max_horizontal_speed = 2.0;

        let result = apply_speed_limits(&agent, Vector3::new(3.0, 0.0, 4.0));
        assert!((result.x - 1.2).abs() < 1e-9);
        assert!((result.z - 1.6).abs() < 1e-9);
    }

    // ==================== Aggressive Correction Tests ====================

    #[test]
    fn test_aggressive_correction_below_threshold_is_identity() {
        let agent = make_agent(Vector3::default(), Vector3::new(1.0, 0.0, 0.0), 2.0);
        let mut counter = AGGRESSIVE_THRESHOLD - 1;
        let v = Vector3::new(0.01, 0.0, 0.0);
        assert_eq!(apply_aggressive_correction(&agent, v, &mut counter), v);
        assert_eq!(counter, AGGRESSIVE_THRESHOLD - 1);
    }

    #[test]
    fn test_aggressive_correction_overrides_and_resets() {
        let agent = make_agent(Vector3::default(), Vector3::new(0.1, 0.0, 0.0), 2.0);
        let mut counter = AGGRESSIVE_THRESHOLD;
        let result = apply_aggressive_correction(&agent, Vector3::default(), &mut counter);
        assert_eq!(counter, 0);
        assert!((result.magnitude() - 1.6).abs() < 1e-9); // 0.8 * max_speed
        assert!(result.x > 0.0);
    }

    #[test]
    fn test_aggressive_correction_respects_directional_caps() {
        let mut agent = make_agent(Vector3::default(), Vector3::new(0.0, 1.0, 0.0), 2.0);
        agent.use_directional_limits = true;
        agent.max_vertical_up_speed = 0.25;
        let mut counter = AGGRESSIVE_THRESHOLD + 3;
        let result = apply_aggressive_correction(&agent, Vector3::default(), &mut counter);
        assert!((result.y - 0.25).abs() < 1e-9);
        assert_eq!(counter, 0);
    }

    #[test]
    fn test_aggressive_correction_ignores_zero_pref() {
        let agent = make_agent(Vector3::default(), Vector3::default(), 2.0);
        let mut counter = 50;
        let result = apply_aggressive_correction(&agent, Vector3::default(), &mut counter);
        assert_eq!(result, Vector3::default());
        assert_eq!(counter, 50);
    }
}
