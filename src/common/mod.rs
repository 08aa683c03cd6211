//! Common utilities and types for the CLF-CBF controller

/// Common types and utilities used across the codebase
pub mod types {
    use nalgebra::Vector2;
    use serde::{Deserialize, Serialize};

    /// A 2D point in the plane
    pub type Point2D = Vector2<f64>;

    /// A 2D velocity, which is also the control input of a single integrator
    pub type Velocity2D = Vector2<f64>;

    /// A circular obstacle as supplied by the caller for one tick
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub struct Obstacle {
        #[serde(with = "crate::common::point_serde")]
        pub position: Point2D,
        pub radius: f64,
    }

    impl Obstacle {
        /// Create a new obstacle
        pub fn new(x: f64, y: f64, radius: f64) -> Self {
            Obstacle {
                position: Point2D::new(x, y),
                radius,
            }
        }
    }

    /// Squared Euclidean distance between two points
    pub fn distance_squared(a: &Point2D, b: &Point2D) -> f64 {
        (a - b).norm_squared()
    }
}

/// Serializes a `Point2D` as a plain `[x, y]` pair.
pub mod point_serde {
    use super::types::Point2D;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(point: &Point2D, serializer: S) -> Result<S::Ok, S::Error> {
        [point.x, point.y].serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Point2D, D::Error> {
        let [x, y] = <[f64; 2]>::deserialize(deserializer)?;
        Ok(Point2D::new(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::types::*;

    #[test]
    fn obstacle_json_uses_coordinate_pairs() {
        let obstacle = Obstacle::new(1.2, -3.5, 0.5);
        let json = serde_json::to_string(&obstacle).unwrap();
        assert_eq!(json, r#"{"position":[1.2,-3.5],"radius":0.5}"#);

        let parsed: Obstacle = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, obstacle);
    }

    #[test]
    fn distance_squared_is_symmetric() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_eq!(distance_squared(&a, &b), 25.0);
        assert_eq!(distance_squared(&b, &a), 25.0);
    }
}
