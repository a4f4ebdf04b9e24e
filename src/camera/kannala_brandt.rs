//! Equidistant fisheye (Kannala-Brandt) projection.
//!
//! `theta_d = theta * (1 + k1 theta^2 + k2 theta^4 + k3 theta^6 + k4 theta^8)`.

use super::coefficient;
use nalgebra::{RealField, Vector2, Vector3};

pub fn project<T: RealField>(intrinsics: &[T], distortion: &[T], point: &Vector3<T>) -> Vector2<T> {
    let x = point.x.clone();
    let y = point.y.clone();
    let z = point.z.clone();

    let r_squared = x.clone() * x.clone() + y.clone() * y.clone();

    // Near the optical axis theta_d / r tends to 1 / z; avoid sqrt(0) in the derivative.
    let (mx, my) = if r_squared < T::from_f64(1e-16).unwrap() {
        (x / z.clone(), y / z)
    } else {
        let r = r_squared.sqrt();
        let theta = r.clone().atan2(z);
        let theta2 = theta.clone() * theta.clone();
        let theta4 = theta2.clone() * theta2.clone();
        let theta6 = theta4.clone() * theta2.clone();
        let theta8 = theta4.clone() * theta4.clone();

        let theta_d = theta
            * (T::one()
                + coefficient(distortion, 0) * theta2
                + coefficient(distortion, 1) * theta4
                + coefficient(distortion, 2) * theta6
                + coefficient(distortion, 3) * theta8);

        let scale = theta_d / r;
        (x * scale.clone(), y * scale)
    };

    Vector2::new(
        intrinsics[0].clone() * mx + intrinsics[2].clone(),
        intrinsics[1].clone() * my + intrinsics[3].clone(),
    )
}
