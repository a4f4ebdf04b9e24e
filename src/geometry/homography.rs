//! Plane-to-image homography estimated with the normalized DLT.

use super::{null_vector, GeometryError};
use nalgebra::{DMatrix, Matrix3, Vector2, Vector3};

/// Similarity transform that moves the centroid to the origin and scales the
/// mean distance to `sqrt(2)`.
fn normalization_transform(points: &[Vector2<f64>]) -> Result<Matrix3<f64>, GeometryError> {
    let n = points.len() as f64;
    let centroid = points.iter().fold(Vector2::zeros(), |acc, p| acc + p) / n;
    let mean_dist = points.iter().map(|p| (p - centroid).norm()).sum::<f64>() / n;
    if mean_dist <= f64::EPSILON {
        return Err(GeometryError::Degenerate(
            "all points coincide".to_string(),
        ));
    }
    let s = std::f64::consts::SQRT_2 / mean_dist;
    Ok(Matrix3::new(
        s, 0.0, -s * centroid.x, //
        0.0, s, -s * centroid.y, //
        0.0, 0.0, 1.0,
    ))
}

fn apply(t: &Matrix3<f64>, p: &Vector2<f64>) -> Vector2<f64> {
    let h = t * Vector3::new(p.x, p.y, 1.0);
    Vector2::new(h.x / h.z, h.y / h.z)
}

/// Estimates `H` with `image ~ H * [world.x, world.y, 1]`.
///
/// # Arguments
///
/// * `world` - Target points on the `z = 0` plane.
/// * `image` - Corresponding pixel observations.
///
/// # Returns
///
/// The homography scaled so that `H[(2, 2)] == 1`.
pub fn find_homography(
    world: &[Vector2<f64>],
    image: &[Vector2<f64>],
) -> Result<Matrix3<f64>, GeometryError> {
    if world.len() != image.len() || world.len() < 4 {
        return Err(GeometryError::NotEnoughPoints {
            needed: 4,
            got: world.len().min(image.len()),
        });
    }

    let t_world = normalization_transform(world)?;
    let t_image = normalization_transform(image)?;

    let n = world.len();
    let mut a = DMatrix::<f64>::zeros(2 * n, 9);
    for (i, (w, m)) in world.iter().zip(image).enumerate() {
        let w = apply(&t_world, w);
        let m = apply(&t_image, m);
        let (x, y, u, v) = (w.x, w.y, m.x, m.y);

        let r0 = 2 * i;
        a[(r0, 0)] = -x;
        a[(r0, 1)] = -y;
        a[(r0, 2)] = -1.0;
        a[(r0, 6)] = u * x;
        a[(r0, 7)] = u * y;
        a[(r0, 8)] = u;

        let r1 = r0 + 1;
        a[(r1, 3)] = -x;
        a[(r1, 4)] = -y;
        a[(r1, 5)] = -1.0;
        a[(r1, 6)] = v * x;
        a[(r1, 7)] = v * y;
        a[(r1, 8)] = v;
    }

    let h = null_vector(&a)?;
    let h_norm = Matrix3::from_row_slice(h.as_slice());

    let t_image_inv = t_image
        .try_inverse()
        .ok_or_else(|| GeometryError::Degenerate("singular normalization".to_string()))?;
    let mut h = t_image_inv * h_norm * t_world;

    let scale = h[(2, 2)];
    if scale.abs() <= f64::EPSILON {
        return Err(GeometryError::Degenerate(
            "homography maps the origin to infinity".to_string(),
        ));
    }
    h /= scale;
    Ok(h)
}
