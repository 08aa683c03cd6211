//! Closed-loop trajectory generation
//!
//! Drives a controller tick by tick, feeding each returned position back in
//! as the next input. This is the caller side of the control loop; the
//! controller itself keeps no trajectory.

use super::controllers::ClfCbfController;
use super::error::ControlError;
use crate::common::point_serde;
use crate::common::types::{Obstacle, Point2D, Velocity2D};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Start, goal and static obstacles of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(with = "point_serde")]
    pub start: Point2D,
    #[serde(with = "point_serde")]
    pub goal: Point2D,
    #[serde(default)]
    pub obstacles: Vec<Obstacle>,
}

impl Scenario {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Why a rollout stopped
#[derive(Debug, Clone, PartialEq)]
pub enum RolloutEnd {
    GoalReached,
    TickLimit,
    Failed(ControlError),
}

/// Positions visited and controls applied during a rollout
#[derive(Debug, Clone, PartialEq)]
pub struct Rollout {
    /// Starts with the initial position, one entry per completed tick after it
    pub positions: Vec<Point2D>,
    pub velocities: Vec<Velocity2D>,
    pub end: RolloutEnd,
}

impl Rollout {
    /// An empty rollout positioned at `start`
    pub fn new(start: Point2D) -> Self {
        Rollout {
            positions: vec![start],
            velocities: Vec::new(),
            end: RolloutEnd::TickLimit,
        }
    }

    pub fn final_position(&self) -> Point2D {
        self.positions.last().copied().unwrap_or_else(Point2D::zeros)
    }

    /// Number of completed ticks
    pub fn ticks(&self) -> usize {
        self.velocities.len()
    }
}

/// A trajectory generator that repeatedly ticks a controller
#[derive(Debug, Clone, Copy)]
pub struct TrajectoryGenerator {
    max_ticks: usize,
    goal_tolerance: f64,
}

impl TrajectoryGenerator {
    /// Create a new trajectory generator
    pub fn new(max_ticks: usize, goal_tolerance: f64) -> Self {
        TrajectoryGenerator {
            max_ticks,
            goal_tolerance,
        }
    }

    pub fn max_ticks(&self) -> usize {
        self.max_ticks
    }

    /// Whether `position` is within tolerance of the controller's goal
    pub fn reached(&self, controller: &ClfCbfController, position: &Point2D) -> bool {
        controller
            .goal()
            .map_or(false, |goal| (position - goal).norm() <= self.goal_tolerance)
    }

    /// Run one tick from the rollout's last position
    ///
    /// Returns `false` once the rollout has ended, either at the goal or on a
    /// controller error.
    pub fn step(&self, controller: &mut ClfCbfController, rollout: &mut Rollout, obstacles: &[Obstacle]) -> bool {
        let position = rollout.final_position();
        if self.reached(controller, &position) {
            rollout.end = RolloutEnd::GoalReached;
            return false;
        }

        match controller.generate_control(position, obstacles) {
            Ok(output) => {
                rollout.positions.push(output.next_position);
                rollout.velocities.push(output.velocity);
                true
            }
            Err(err) => {
                warn!(tick = rollout.ticks(), %err, "rollout stopped");
                rollout.end = RolloutEnd::Failed(err);
                false
            }
        }
    }

    /// Settle the end state after the last tick
    pub fn finish(&self, controller: &ClfCbfController, rollout: &mut Rollout) {
        if rollout.end == RolloutEnd::TickLimit && self.reached(controller, &rollout.final_position()) {
            rollout.end = RolloutEnd::GoalReached;
        }
        info!(ticks = rollout.ticks(), end = ?rollout.end, "rollout finished");
    }

    /// Generate a trajectory from `start` toward the controller's goal
    pub fn generate(&self, controller: &mut ClfCbfController, start: Point2D, obstacles: &[Obstacle]) -> Rollout {
        let mut rollout = Rollout::new(start);
        for _ in 0..self.max_ticks {
            if !self.step(controller, &mut rollout, obstacles) {
                break;
            }
        }
        self.finish(controller, &mut rollout);
        rollout
    }
}
