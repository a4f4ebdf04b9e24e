//! Pinhole projection with plumb-bob (radial-tangential) distortion.
//!
//! Distortion coefficients follow the OpenCV order `[k1, k2, p1, p2, k3]`.

use super::coefficient;
use nalgebra::{RealField, Vector2, Vector3};

/// Applies radial and tangential distortion to normalized coordinates.
pub fn distort<T: RealField>(x: T, y: T, distortion: &[T]) -> (T, T) {
    let k1 = coefficient(distortion, 0);
    let k2 = coefficient(distortion, 1);
    let p1 = coefficient(distortion, 2);
    let p2 = coefficient(distortion, 3);
    let k3 = coefficient(distortion, 4);

    let r2 = x.clone() * x.clone() + y.clone() * y.clone();
    let r4 = r2.clone() * r2.clone();
    let r6 = r4.clone() * r2.clone();
    let radial = T::one() + k1 * r2.clone() + k2 * r4 + k3 * r6;

    let two = T::one() + T::one();
    let xy = x.clone() * y.clone();
    let x_tan = two.clone() * p1.clone() * xy.clone()
        + p2.clone() * (r2.clone() + two.clone() * x.clone() * x.clone());
    let y_tan = p1 * (r2 + two.clone() * y.clone() * y.clone()) + two * p2 * xy;

    (x * radial.clone() + x_tan, y * radial + y_tan)
}

/// `u = fx * x_d + cx`, `v = fy * y_d + cy` with `(x_d, y_d)` the distorted
/// normalized coordinates of `point`.
pub fn project<T: RealField>(intrinsics: &[T], distortion: &[T], point: &Vector3<T>) -> Vector2<T> {
    let x = point.x.clone() / point.z.clone();
    let y = point.y.clone() / point.z.clone();
    let (xd, yd) = distort(x, y, distortion);
    Vector2::new(
        intrinsics[0].clone() * xd + intrinsics[2].clone(),
        intrinsics[1].clone() * yd + intrinsics[3].clone(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pinhole_project_without_distortion() {
        let intr: [f64; 4] = [500.0, 500.0, 320.0, 240.0];
        let p = project(&intr, &[0.0; 5], &Vector3::new(0.1, 0.2, 1.0));
        // u = 500 * 0.1 + 320, v = 500 * 0.2 + 240
        assert_relative_eq!(p.x, 370.0, epsilon = 1e-9);
        assert_relative_eq!(p.y, 340.0, epsilon = 1e-9);
    }

    #[test]
    fn test_radial_distortion_pulls_points_inwards() {
        let intr: [f64; 4] = [500.0, 500.0, 320.0, 240.0];
        let point = Vector3::new(0.3, 0.2, 1.0);
        let undistorted = project(&intr, &[0.0; 5], &point);
        let barrel = project(&intr, &[-0.2, 0.0, 0.0, 0.0, 0.0], &point);
        assert!((barrel.x - 320.0).abs() < (undistorted.x - 320.0).abs());
        assert!((barrel.y - 240.0).abs() < (undistorted.y - 240.0).abs());
    }

    #[test]
    fn test_short_distortion_vector_treated_as_zero_tail() {
        let intr: [f64; 4] = [400.0, 410.0, 300.0, 200.0];
        let point = Vector3::new(-0.2, 0.15, 2.0);
        let full = project(&intr, &[0.05, -0.01, 0.0, 0.0, 0.0], &point);
        let short = project(&intr, &[0.05, -0.01], &point);
        assert_relative_eq!(full, short, epsilon = 1e-12);
    }
}
