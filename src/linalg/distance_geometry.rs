//! Locating points from known distances.
//!
//! Used to place a contact from its measured distances to reference points
//! (fiducials or already-localized contacts). Edge lengths that cannot form a
//! triangle are rejected with [`LocalizeError::DegenerateTriangle`] rather than
//! clamped, since a silently clamped solution is a wrong coordinate.

use crate::error::{LocalizeError, Result};
use crate::Vector3;

/// Relative slack allowed on the triangle inequality before rejecting.
const TRIANGLE_SLACK: f64 = 1e-9;

/// Place the apex of a triangle with base `a → b`.
///
/// The apex lies at distance `da` from `a` and `db` from `b`, in the plane
/// spanned by the base and `toward`, on the same side of the base as `toward`.
pub fn triangle_apex(
    a: &Vector3,
    b: &Vector3,
    da: f64,
    db: f64,
    toward: &Vector3,
) -> Result<Vector3> {
    let base = b - a;
    let d = base.norm();
    if d <= f64::EPSILON {
        return Err(LocalizeError::DegenerateTriangle(
            "base points coincide".to_string(),
        ));
    }
    check_edges(d, da, db)?;

    let ex = base / d;
    let w = toward - a;
    let perp = w - ex * w.dot(&ex);
    let ey = if perp.norm() > f64::EPSILON {
        perp.normalize()
    } else {
        return Err(LocalizeError::DegenerateTriangle(
            "reference direction is collinear with the base".to_string(),
        ));
    };

    let x = (da * da - db * db + d * d) / (2.0 * d);
    let y = (da * da - x * x).max(0.0).sqrt();
    Ok(a + ex * x + ey * y)
}

/// Find the points at distances `distances[i]` from `anchors[i]`.
///
/// Three spheres meet in at most two points, mirror images across the anchor
/// plane; both are returned, the first on the side of the anchor-plane normal
/// `(p1 - p0) × (p2 - p0)`. A tangent configuration returns the same point twice.
pub fn trilaterate(anchors: &[Vector3; 3], distances: &[f64; 3]) -> Result<[Vector3; 2]> {
    let [p0, p1, p2] = anchors;
    let [r0, r1, r2] = *distances;
    if distances.iter().any(|&r| !(r >= 0.0) || !r.is_finite()) {
        return Err(LocalizeError::DegenerateTriangle(format!(
            "distances must be finite and non-negative: {:?}",
            distances
        )));
    }

    let e01 = p1 - p0;
    let d = e01.norm();
    if d <= f64::EPSILON {
        return Err(LocalizeError::DegenerateTriangle(
            "first two anchors coincide".to_string(),
        ));
    }
    let ex = e01 / d;
    let t = p2 - p0;
    let i = ex.dot(&t);
    let perp = t - ex * i;
    let j = perp.norm();
    if j <= f64::EPSILON * d.max(1.0) {
        return Err(LocalizeError::DegenerateTriangle(
            "anchors are collinear".to_string(),
        ));
    }
    let ey = perp / j;
    let ez = ex.cross(&ey);

    let x = (r0 * r0 - r1 * r1 + d * d) / (2.0 * d);
    let y = (r0 * r0 - r2 * r2 + i * i + j * j) / (2.0 * j) - (i / j) * x;
    let z2 = r0 * r0 - x * x - y * y;
    let scale = r0.max(r1).max(r2).max(d);
    if z2 < -TRIANGLE_SLACK * scale * scale {
        return Err(LocalizeError::DegenerateTriangle(format!(
            "spheres of radii {:?} do not intersect",
            distances
        )));
    }
    let z = z2.max(0.0).sqrt();
    let base = p0 + ex * x + ey * y;
    Ok([base + ez * z, base - ez * z])
}

fn check_edges(d: f64, da: f64, db: f64) -> Result<()> {
    if !(da >= 0.0 && db >= 0.0) || !da.is_finite() || !db.is_finite() {
        return Err(LocalizeError::DegenerateTriangle(format!(
            "edge lengths must be finite and non-negative ({}, {})",
            da, db
        )));
    }
    let slack = TRIANGLE_SLACK * d.max(da).max(db);
    if da + db < d - slack || da + d < db - slack || db + d < da - slack {
        return Err(LocalizeError::DegenerateTriangle(format!(
            "edges {:.4}, {:.4} cannot span base {:.4}",
            da, db, d
        )));
    }
    Ok(())
}
