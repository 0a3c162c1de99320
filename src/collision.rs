//! Wall reflection and molecule-molecule elastic collisions.
//!
//! Angles use screen coordinates: x grows to the right, y grows downwards, so
//! the top wall sits at `y = 0` and its interior normal points along `+y`.

use gas_common::{vec_to_angle, wrap_angle, Vec2};
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

/// Boundary case hit by a molecule's disc. Corners take precedence over walls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WallContact {
    Left,
    Top,
    Right,
    Bottom,
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl WallContact {
    /// Direction pointing out of the solid boundary into the enclosure.
    pub fn normal_angle(self) -> f64 {
        match self {
            WallContact::Left => 0.0,
            WallContact::Top => FRAC_PI_2,
            WallContact::Right => PI,
            WallContact::Bottom => -FRAC_PI_2,
            WallContact::TopLeft => FRAC_PI_4,
            WallContact::TopRight => 3.0 * FRAC_PI_4,
            WallContact::BottomLeft => -FRAC_PI_4,
            WallContact::BottomRight => -3.0 * FRAC_PI_4,
        }
    }
}

/// Finds which boundary, if any, the disc centered at `position` has crossed.
pub fn detect_wall_contact(position: Vec2, radius: f64, width: f64, height: f64) -> Option<WallContact> {
    let past_left = position.x - radius < 0.0;
    let past_right = position.x + radius > width;
    let past_top = position.y - radius < 0.0;
    let past_bottom = position.y + radius > height;

    match (past_left, past_right, past_top, past_bottom) {
        (true, _, true, _) => Some(WallContact::TopLeft),
        (_, true, true, _) => Some(WallContact::TopRight),
        (true, _, _, true) => Some(WallContact::BottomLeft),
        (_, true, _, true) => Some(WallContact::BottomRight),
        (true, _, _, _) => Some(WallContact::Left),
        (_, _, true, _) => Some(WallContact::Top),
        (_, true, _, _) => Some(WallContact::Right),
        (_, _, _, true) => Some(WallContact::Bottom),
        _ => None,
    }
}

/// Specular reflection of `velocity` about the surface normal at `normal_angle`.
///
/// Returns `None` when the molecule is not moving into the surface, so a molecule
/// that already bounced and is still overlapping the wall is left alone.
pub fn reflect_off_wall(velocity: Vec2, normal_angle: f64) -> Option<Vec2> {
    let magnitude = velocity.length();
    if magnitude == 0.0 {
        return None;
    }
    let rel_angle = wrap_angle(vec_to_angle(velocity) - normal_angle);
    if rel_angle > -FRAC_PI_2 && rel_angle < FRAC_PI_2 {
        return None;
    }
    let new_angle = PI - rel_angle + normal_angle;
    Some(Vec2::from_polar(new_angle, magnitude))
}

/// Wall test for one molecule. Yields the contact and the reflected velocity when
/// a reflection actually took place.
pub fn resolve_wall_collision(
    position: Vec2,
    velocity: Vec2,
    radius: f64,
    width: f64,
    height: f64,
) -> Option<(WallContact, Vec2)> {
    let contact = detect_wall_contact(position, radius, width, height)?;
    reflect_off_wall(velocity, contact.normal_angle()).map(|v| (contact, v))
}

/// Kinematic state of one side of a pair collision.
#[derive(Debug, Clone, Copy)]
pub struct Body {
    pub position: Vec2,
    pub velocity: Vec2,
    pub mass: f64,
    pub radius: f64,
}

/// Whether two discs overlap.
#[inline(always)]
pub fn discs_overlap(a: &Body, b: &Body) -> bool {
    let contact = a.radius + b.radius;
    a.position.distance_squared(b.position) < contact * contact
}

/// Elastic collision of two overlapping, approaching discs along the line of centers.
///
/// Returns the post-collision velocities, or `None` if the discs do not overlap,
/// share a center, or are already separating.
pub fn resolve_elastic_collision(a: &Body, b: &Body) -> Option<(Vec2, Vec2)> {
    if !discs_overlap(a, b) {
        return None;
    }
    let axis = (b.position - a.position).normalize_or_zero();
    if axis == Vec2::zero() {
        return None;
    }

    let u1 = a.velocity.dot(axis);
    let u2 = b.velocity.dot(axis);
    if u1 - u2 <= 0.0 {
        return None;
    }

    let (m1, m2) = (a.mass, b.mass);
    let total = m1 + m2;
    let u1_new = ((m1 - m2) * u1 + 2.0 * m2 * u2) / total;
    let u2_new = ((m2 - m1) * u2 + 2.0 * m1 * u1) / total;

    Some((
        a.velocity + axis * (u1_new - u1),
        b.velocity + axis * (u2_new - u2),
    ))
}
