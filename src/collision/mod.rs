//! Collision detection: broad-phase BVH, GJK distance, shape casts, time
//! of impact, contact manifolds.

pub mod aabb;
pub mod broadphase;
pub mod bvh;
pub mod contact;
pub mod distance;
pub mod manifold;
pub mod toi;

use glam::Vec2;

pub use aabb::Aabb;
pub use broadphase::BroadPhase;
pub use bvh::DynamicTree;
pub use distance::{DistanceInput, DistanceOutput, DistanceProxy, SimplexCache};
pub use manifold::{Manifold, ManifoldPoint};
pub use toi::{time_of_impact, Sweep, ToiInput, ToiOutput, ToiState};

/// Ray defined by an origin, a translation, and a fraction cap.
#[derive(Debug, Clone, Copy)]
pub struct RayCastInput {
    pub origin: Vec2,
    pub translation: Vec2,
    pub max_fraction: f32,
}

/// Result of a ray or shape cast.
#[derive(Debug, Clone, Copy)]
pub struct CastOutput {
    pub hit: bool,
    pub point: Vec2,
    pub normal: Vec2,
    pub fraction: f32,
    pub iterations: usize,
}

impl Default for CastOutput {
    fn default() -> Self {
        Self {
            hit: false,
            point: Vec2::ZERO,
            normal: Vec2::ZERO,
            fraction: 0.0,
            iterations: 0,
        }
    }
}
