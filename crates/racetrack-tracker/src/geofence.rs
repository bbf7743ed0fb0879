//! Checkpoint geofence matching

use racetrack_core::{Checkpoint, CheckpointId, PositionFix};

use std::collections::HashSet;
use tracing::info;

/// A checkpoint entered by a fix
#[derive(Debug, Clone)]
pub struct Crossing {
    pub checkpoint: Checkpoint,
    /// Measured distance from the checkpoint center, in meters
    pub distance_m: f64,
}

/// Tests every unvisited checkpoint against each fix.
///
/// A checkpoint is marked visited in the same call that reports it, so a
/// later fix can never report it again. Route order is not enforced:
/// overlapping geofences may all be crossed by one fix.
#[derive(Debug, Default, Clone)]
pub struct GeofenceMatcher {
    checkpoints: Vec<Checkpoint>,
    visited: HashSet<CheckpointId>,
}

impl GeofenceMatcher {
    pub fn new(mut checkpoints: Vec<Checkpoint>) -> Self {
        checkpoints.sort_by_key(|c| c.route_order);
        Self {
            checkpoints,
            visited: HashSet::new(),
        }
    }

    /// Crossings produced by `fix`, in route order; the boundary counts as inside
    pub fn check(&mut self, fix: &PositionFix) -> Vec<Crossing> {
        let position = fix.position();
        let mut crossings = Vec::new();

        for checkpoint in &self.checkpoints {
            if self.visited.contains(&checkpoint.id) {
                continue;
            }

            let distance_m = checkpoint.geofence().distance_from_center(&position);
            if distance_m <= checkpoint.radius_meters {
                self.visited.insert(checkpoint.id.clone());
                info!(
                    "Checkpoint {} ({}) crossed at {:.1}m",
                    checkpoint.name, checkpoint.id, distance_m
                );
                crossings.push(Crossing {
                    checkpoint: checkpoint.clone(),
                    distance_m,
                });
            }
        }

        crossings
    }

    pub fn is_visited(&self, id: &CheckpointId) -> bool {
        self.visited.contains(id)
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.len()
    }

    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints
    }

    /// Checkpoints not yet crossed, in route order
    pub fn remaining(&self) -> impl Iterator<Item = &Checkpoint> {
        self.checkpoints
            .iter()
            .filter(|c| !self.visited.contains(&c.id))
    }
}

// ============================================================================
// TESTS
// ============================================================================
