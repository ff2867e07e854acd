//! ORCA constraint construction and the constrained velocity optimizer.
//!
//! For each neighbor, the velocity obstacle over the agent's time horizon is
//! a truncated cone in relative-velocity space; projecting the current
//! relative velocity onto its boundary yields one half-space constraint
//! (reciprocal, so each agent takes half of the correction). The optimizer
//! is an incremental linear program over those half-spaces and the maximum
//! speed sphere, with a minimum-penetration fallback when the constraints
//! admit no velocity at all.

use crate::structs::{Agent, Plane, Vector3};

pub const EPSILON: f64 = 1e-5;

/// A directed line used by the one-dimensional subproblem.
struct Line {
    direction: Vector3,
    point: Vector3,
}

/// Builds one ORCA half-space per neighbor, in neighbor order (ascending
/// distance), appending to `planes`.
pub fn build_orca_planes(
    agent: &Agent,
    agents: &[Agent],
    neighbors: &[(f64, usize)],
    time_step: f64,
    planes: &mut Vec<Plane>,
) {
    let inv_time_horizon = 1.0 / agent.time_horizon;

    for &(_, other_id) in neighbors {
        let other = &agents[other_id];

        let relative_position = other.position - agent.position;
        let relative_velocity = agent.velocity - other.velocity;
        let dist_sq = relative_position.magnitude_sq();
        let combined_radius = agent.radius + other.radius;
        let combined_radius_sq = combined_radius * combined_radius;

        let normal;
        let u;

        if dist_sq > combined_radius_sq {
            // No collision yet. `w` runs from the cutoff-sphere center to
            // the relative velocity.
            let w = relative_velocity - relative_position * inv_time_horizon;
            let w_length_sq = w.magnitude_sq();

            let dot_product = w.dot(&relative_position);

            if dot_product < 0.0 && dot_product * dot_product > combined_radius_sq * w_length_sq {
                // Project on the cutoff sphere.
                let w_length = w_length_sq.sqrt();
                let unit_w = w * (1.0 / w_length);

                normal = unit_w;
                u = unit_w * (combined_radius * inv_time_horizon - w_length);
            } else {
                // Project on the cone surface.
                let a = dist_sq;
                let b = relative_position.dot(&relative_velocity);
                let cross = relative_position.cross(&relative_velocity);
                let c = relative_velocity.magnitude_sq()
                    - cross.magnitude_sq() / (dist_sq - combined_radius_sq);
                let t = (b + (b * b - a * c).max(0.0).sqrt()) / a;
                let w = relative_velocity - relative_position * t;
                let w_length = w.magnitude();
                let unit_w = if w_length > EPSILON {
                    w * (1.0 / w_length)
                } else {
                    Vector3::new(1.0, 0.0, 0.0)
                };

                normal = unit_w;
                u = unit_w * (combined_radius * t - w_length);
            }
        } else {
            // Already overlapping: resolve within a single time step.
            let inv_time_step = 1.0 / time_step;
            let w = relative_velocity - relative_position * inv_time_step;
            let w_length = w.magnitude();
            let unit_w = if w_length > EPSILON {
                w * (1.0 / w_length)
            } else {
                Vector3::new(1.0, 0.0, 0.0)
            };

            normal = unit_w;
            u = unit_w * (combined_radius * inv_time_step - w_length);
        }

        planes.push(Plane {
            point: agent.velocity + u * 0.5,
            normal,
        });
    }
}

/// Finds the velocity closest to `pref_velocity` satisfying every plane and
/// the speed sphere. Infeasible systems fall back to the minimum-penetration
/// solution; the result is always defined.
pub fn solve_velocity(planes: &[Plane], max_speed: f64, pref_velocity: &Vector3) -> Vector3 {
    let mut result = Vector3::default();
    let plane_fail = linear_program3(planes, max_speed, pref_velocity, false, &mut result);

    if plane_fail < planes.len() {
        linear_program4(planes, plane_fail, max_speed, &mut result);
    }

    result
}

/// One-dimensional program on `line`, clipped by the speed sphere and by
/// the planes before `plane_no`. Returns false (leaving `result` untouched)
/// when the feasible interval is empty.
fn linear_program1(
    planes: &[Plane],
    plane_no: usize,
    line: &Line,
    radius: f64,
    opt_velocity: &Vector3,
    direction_opt: bool,
    result: &mut Vector3,
) -> bool {
    let dot_product = line.point.dot(&line.direction);
    let discriminant = dot_product * dot_product + radius * radius - line.point.magnitude_sq();

    if discriminant < 0.0 {
        // Max speed sphere fully invalidates the line.
        return false;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot_product - sqrt_discriminant;
    let mut t_right = -dot_product + sqrt_discriminant;

    for plane in &planes[..plane_no] {
        let numerator = (plane.point - line.point).dot(&plane.normal);
        let denominator = line.direction.dot(&plane.normal);

        if denominator * denominator <= EPSILON {
            // The line is (almost) parallel to this plane.
            if numerator > 0.0 {
                return false;
            }
            continue;
        }

        let t = numerator / denominator;

        if denominator >= 0.0 {
            // Plane bounds the line on the left.
            t_left = t_left.max(t);
        } else {
            // Plane bounds the line on the right.
            t_right = t_right.min(t);
        }

        if t_left > t_right {
            return false;
        }
    }

    if direction_opt {
        // Optimize direction.
        if opt_velocity.dot(&line.direction) > 0.0 {
            *result = line.point + line.direction * t_right;
        } else {
            *result = line.point + line.direction * t_left;
        }
    } else {
        // Optimize closest point.
        let t = line.direction.dot(&(*opt_velocity - line.point));

        if t < t_left {
            *result = line.point + line.direction * t_left;
        } else if t > t_right {
            *result = line.point + line.direction * t_right;
        } else {
            *result = line.point + line.direction * t;
        }
    }

    true
}

/// Two-dimensional program on plane `plane_no`, subject to the planes before
/// it and the speed sphere. Returns false when infeasible.
fn linear_program2(
    planes: &[Plane],
    plane_no: usize,
    radius: f64,
    opt_velocity: &Vector3,
    direction_opt: bool,
    result: &mut Vector3,
) -> bool {
    let plane = &planes[plane_no];
    let plane_dist = plane.point.dot(&plane.normal);
    let plane_dist_sq = plane_dist * plane_dist;
    let radius_sq = radius * radius;

    if plane_dist_sq > radius_sq {
        // Max speed sphere fully invalidates the plane.
        return false;
    }

    let plane_radius_sq = radius_sq - plane_dist_sq;
    let plane_center = plane.normal * plane_dist;

    if direction_opt {
        // Project direction opt_velocity onto the plane.
        let plane_opt_velocity =
            *opt_velocity - plane.normal * opt_velocity.dot(&plane.normal);
        let plane_opt_velocity_length_sq = plane_opt_velocity.magnitude_sq();

        if plane_opt_velocity_length_sq <= EPSILON {
            *result = plane_center;
        } else {
            *result = plane_center
                + plane_opt_velocity
                    * (plane_radius_sq / plane_opt_velocity_length_sq).sqrt();
        }
    } else {
        // Project point opt_velocity onto the plane.
        *result = *opt_velocity
            + plane.normal * (plane.point - *opt_velocity).dot(&plane.normal);

        // If outside the in-plane disc, project onto its rim.
        if result.magnitude_sq() > radius_sq {
            let plane_result = *result - plane_center;
            let plane_result_length_sq = plane_result.magnitude_sq();
            *result =
                plane_center + plane_result * (plane_radius_sq / plane_result_length_sq).sqrt();
        }
    }

    for i in 0..plane_no {
        if planes[i].normal.dot(&(planes[i].point - *result)) > 0.0 {
            // The current result violates plane i: restrict to the
            // intersection line of the two planes.
            let cross_product = planes[i].normal.cross(&plane.normal);

            if cross_product.magnitude_sq() <= EPSILON {
                // Planes are (almost) parallel; plane i fully invalidates
                // plane plane_no.
                return false;
            }

            let line_direction = cross_product.normalize();
            let line_normal = line_direction.cross(&plane.normal);
            let line = Line {
                direction: line_direction,
                point: plane.point
                    + line_normal
                        * ((planes[i].point - plane.point).dot(&planes[i].normal)
                            / line_normal.dot(&planes[i].normal)),
            };

            if !linear_program1(planes, i, &line, radius, opt_velocity, direction_opt, result) {
                return false;
            }
        }
    }

    true
}

/// Three-dimensional program over all planes and the speed sphere. Returns
/// the index of the first plane on which the program became infeasible, or
/// `planes.len()` on success; `result` holds the best velocity found.
fn linear_program3(
    planes: &[Plane],
    radius: f64,
    opt_velocity: &Vector3,
    direction_opt: bool,
    result: &mut Vector3,
) -> usize {
    if direction_opt {
        // The optimization velocity is a unit direction in this case.
        *result = *opt_velocity * radius;
    } else if opt_velocity.magnitude_sq() > radius * radius {
        *result = opt_velocity.normalize() * radius;
    } else {
        *result = *opt_velocity;
    }

    for i in 0..planes.len() {
        if planes[i].normal.dot(&(planes[i].point - *result)) > 0.0 {
            let temp_result = *result;

            if !linear_program2(planes, i, radius, opt_velocity, direction_opt, result) {
                *result = temp_result;
                return i;
            }
        }
    }

    planes.len()
}

/// Minimum-penetration fallback: starting from the first failing plane,
/// pushes the result as deep as possible into each violated half-space while
/// staying feasible for the planes already satisfied.
fn linear_program4(planes: &[Plane], begin_plane: usize, radius: f64, result: &mut Vector3) {
    let mut distance = 0.0;

    for i in begin_plane..planes.len() {
        if planes[i].normal.dot(&(planes[i].point - *result)) > distance {
            // Result does not satisfy the constraint of plane i.
            let mut proj_planes: Vec<Plane> = Vec::new();

            for j in 0..i {
                let cross_product = planes[j].normal.cross(&planes[i].normal);

                let point;
                if cross_product.magnitude_sq() <= EPSILON {
                    // Planes i and j are (almost) parallel.
                    if planes[i].normal.dot(&planes[j].normal) > 0.0 {
                        // Same direction: plane j is redundant here.
                        continue;
                    }
                    point = (planes[i].point + planes[j].point) * 0.5;
                } else {
                    let line_normal = cross_product.cross(&planes[i].normal);
                    point = planes[i].point
                        + line_normal
                            * ((planes[j].point - planes[i].point).dot(&planes[j].normal)
                                / line_normal.dot(&planes[j].normal));
                }

                proj_planes.push(Plane {
                    point,
                    normal: (planes[j].normal - planes[i].normal).normalize(),
                });
            }

            let temp_result = *result;

            if linear_program3(&proj_planes, radius, &planes[i].normal, true, result)
                < proj_planes.len()
            {
                // In principle unreachable: the result is already feasible
                // for this program. Kept against floating point drift.
                *result = temp_result;
            }

            distance = planes[i].normal.dot(&(planes[i].point - *result));
        }
    }
}
