use num::traits::Num;
use std::{
    fmt::Display,
    ops::{Add, Div, Mul, Sub},
};

/// A 3D vector in the world frame, generic over any numeric type.
///
/// Represents positions and displacements in meters and provides the
/// arithmetic and distance operations the decision core relies on.
///
/// # Type Parameters
/// * `T` - The functionality for the vector depends on traits implemented by `T`.
#[derive(Debug, PartialEq, Clone, Copy)]
pub struct Vec3D<T> {
    /// The x-component of the vector.
    x: T,
    /// The y-component of the vector.
    y: T,
    /// The z-component (altitude) of the vector.
    z: T,
}

impl<T: Copy> Vec3D<T> {
    /// Creates a new vector from its components.
    pub fn new(x: T, y: T, z: T) -> Self { Self { x, y, z } }

    /// Returns the x-component.
    pub fn x(&self) -> T { self.x }

    /// Returns the y-component.
    pub fn y(&self) -> T { self.y }

    /// Returns the z-component.
    pub fn z(&self) -> T { self.z }

    /// Returns the components as a fixed-size array `[x, y, z]`.
    pub fn to_array(self) -> [T; 3] { [self.x, self.y, self.z] }
}

impl<T> Display for Vec3D<T>
where T: Display
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

impl<T: Num + Copy> Add for Vec3D<T> {
    type Output = Vec3D<T>;

    fn add(self, rhs: Self) -> Self::Output {
        Vec3D::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<T: Num + Copy> Sub for Vec3D<T> {
    type Output = Vec3D<T>;

    fn sub(self, rhs: Self) -> Self::Output {
        Vec3D::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<T: Num + Copy> Mul<T> for Vec3D<T> {
    type Output = Vec3D<T>;

    fn mul(self, rhs: T) -> Self::Output {
        Vec3D::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl<T: Num + Copy> Div<T> for Vec3D<T> {
    type Output = Vec3D<T>;

    fn div(self, rhs: T) -> Self::Output {
        Vec3D::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

impl<T: Copy> From<[T; 3]> for Vec3D<T> {
    fn from(value: [T; 3]) -> Self { Vec3D::new(value[0], value[1], value[2]) }
}

impl Vec3D<f64> {
    /// The all-zero vector.
    pub fn zero() -> Self { Vec3D::new(0.0, 0.0, 0.0) }

    /// Returns the Euclidean length of the vector.
    pub fn norm(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    /// Returns the full 3D Euclidean distance to `other`.
    pub fn distance_to(&self, other: &Self) -> f64 { (*self - *other).norm() }

    /// Returns the ground-plane distance to `other`, ignoring altitude.
    ///
    /// Spatial task costs are evaluated over the ground track since task and
    /// vehicle operating altitudes differ by design.
    pub fn xy_distance_to(&self, other: &Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}
