//! Pure builder from a `ShapeInfo` descriptor to a backend collision shape
//! (§4.B). `build` has no side effects; `ShapeCache` is the only thing that
//! calls it and decides caching/async policy.

use std::sync::mpsc::Sender;

use nalgebra::{Isometry3, Point3, Vector3};
use once_cell::sync::Lazy;
use rapier3d::prelude::SharedShape;

use crate::error::{PhysicsCoreError, Result};
use crate::shape_cache::BuiltMeshShape;
use crate::shape_info::{ShapeHash, ShapeInfo, ShapeType};

/// Mesh (triangle-mesh / model-sourced hull) shapes are built asynchronously;
/// everything else is cheap enough to build inline on the simulation thread.
pub fn is_async_build_required(shape_type: &ShapeType) -> bool {
    matches!(shape_type, ShapeType::TriangleMesh) || false
}

/// Spawns a worker thread that builds the shape and delivers it back over
/// `tx`. Worker threads never touch the `ShapeCache` map directly (§4.A
/// concurrency policy) — they only ever see this channel.
pub fn spawn_mesh_build(info: ShapeInfo, hash: ShapeHash, tx: Sender<BuiltMeshShape>) {
    std::thread::spawn(move || match build(&info) {
        Ok(shape) => {
            let _ = tx.send(BuiltMeshShape { hash, shape });
        }
        Err(err) => {
            log::debug!("mesh build failed for shape {:?}: {}", hash, err);
        }
    });
}

pub fn build(info: &ShapeInfo) -> Result<SharedShape> {
    let base = build_base_shape(info)?;
    Ok(match info.offset {
        Some(offset) if offset != Vector3::zeros() => {
            let transform = Isometry3::translation(offset.x, offset.y, offset.z);
            SharedShape::compound(vec![(transform, base)])
        }
        _ => base,
    })
}

fn build_base_shape(info: &ShapeInfo) -> Result<SharedShape> {
    match info.shape_type {
        ShapeType::None => Err(shape_build_failure(info, "ShapeType::None has no geometry")),
        ShapeType::Box => Ok(SharedShape::cuboid(
            info.half_extents.x,
            info.half_extents.y,
            info.half_extents.z,
        )),
        ShapeType::Sphere => Ok(SharedShape::ball(info.half_extents.x)),
        ShapeType::CapsuleY => {
            let radius = info.half_extents.x.max(info.half_extents.z);
            let half_height = (info.half_extents.y - radius).max(0.0);
            Ok(SharedShape::capsule_y(half_height, radius))
        }
        ShapeType::ConvexHull => {
            let points = flatten_single_hull(info)?;
            let reduced = reduce_hull(&points);
            SharedShape::convex_hull(&reduced)
                .ok_or_else(|| shape_build_failure(info, "convex hull construction failed"))
        }
        ShapeType::Compound => {
            let hulls = info
                .point_collection
                .as_ref()
                .filter(|c| !c.is_empty())
                .ok_or_else(|| shape_build_failure(info, "compound shape has no hulls"))?;
            let mut parts = Vec::with_capacity(hulls.len());
            for hull in hulls {
                let reduced = if hull.len() > crate::constants::HULL_REDUCTION_POINT_THRESHOLD {
                    reduce_hull(hull)
                } else {
                    hull.clone()
                };
                let shape = SharedShape::convex_hull(&reduced)
                    .ok_or_else(|| shape_build_failure(info, "compound hull construction failed"))?;
                parts.push((Isometry3::identity(), shape));
            }
            Ok(SharedShape::compound(parts))
        }
        ShapeType::TriangleMesh => {
            let points = flatten_single_hull(info)?;
            let indices = info
                .triangle_indices
                .clone()
                .ok_or_else(|| shape_build_failure(info, "triangle mesh has no indices"))?;
            SharedShape::trimesh(points, indices)
                .map_err(|e| shape_build_failure(info, &e.to_string()))
        }
    }
}

fn flatten_single_hull(info: &ShapeInfo) -> Result<Vec<Point3<f32>>> {
    let hulls = info
        .point_collection
        .as_ref()
        .filter(|c| !c.is_empty() && !c[0].is_empty())
        .ok_or_else(|| shape_build_failure(info, "hull with zero points"))?;
    Ok(hulls[0].clone())
}

fn shape_build_failure(info: &ShapeInfo, reason: &str) -> PhysicsCoreError {
    PhysicsCoreError::ShapeBuildFailure {
        entity_id: uuid::Uuid::nil(),
        reason: format!("{:?}: {reason}", info.shape_type),
    }
}

/// When a hull has more than [`crate::constants::HULL_REDUCTION_POINT_THRESHOLD`]
/// points, project along each of the 42 canonical directions and keep only
/// the farthest-projected vertex per direction (§4.B).
pub fn reduce_hull(points: &[Point3<f32>]) -> Vec<Point3<f32>> {
    if points.len() <= crate::constants::HULL_REDUCTION_POINT_THRESHOLD {
        return points.to_vec();
    }

    let mut reduced: Vec<Point3<f32>> = Vec::with_capacity(CANONICAL_DIRECTIONS.len());
    for direction in CANONICAL_DIRECTIONS.iter() {
        if let Some(farthest) = points
            .iter()
            .max_by(|a, b| {
                let da = a.coords.dot(direction);
                let db = b.coords.dot(direction);
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
        {
            if !reduced.iter().any(|p| p == farthest) {
                reduced.push(*farthest);
            }
        }
    }
    reduced
}

/// 42 canonical unit directions: one per face-center and one per
/// edge-midpoint of a regular duodecahedron. Built from the 12 vertices of a
/// regular icosahedron (which are exactly the face-normal directions of its
/// dual dodecahedron) plus the 30 unit directions of the icosahedron's edge
/// midpoints (which coincide with the dodecahedron's edge-midpoint
/// directions, since dual polyhedra share an edge-tangent sphere).
static CANONICAL_DIRECTIONS: Lazy<Vec<Vector3<f32>>> = Lazy::new(build_canonical_directions);

fn build_canonical_directions() -> Vec<Vector3<f32>> {
    let phi = (1.0 + 5.0f32.sqrt()) / 2.0;
    let mut vertices = Vec::with_capacity(12);
    for &sy in &[-1.0f32, 1.0] {
        for &sz in &[-1.0f32, 1.0] {
            vertices.push(Vector3::new(0.0, sy * 1.0, sz * phi).normalize());
        }
    }
    for &sx in &[-1.0f32, 1.0] {
        for &sy in &[-1.0f32, 1.0] {
            vertices.push(Vector3::new(sx * 1.0, sy * phi, 0.0).normalize());
        }
    }
    for &sz in &[-1.0f32, 1.0] {
        for &sx in &[-1.0f32, 1.0] {
            vertices.push(Vector3::new(sx * phi, 0.0, sz * 1.0).normalize());
        }
    }

    // Shortest pairwise distance among the 12 vertices is the icosahedron's
    // edge length; collecting all pairs at that distance yields the 30 edges.
    let mut min_dist = f32::MAX;
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let d = (vertices[i] - vertices[j]).norm();
            if d < min_dist {
                min_dist = d;
            }
        }
    }

    let mut directions = vertices.clone();
    for i in 0..vertices.len() {
        for j in (i + 1)..vertices.len() {
            let d = (vertices[i] - vertices[j]).norm();
            if (d - min_dist).abs() < min_dist * 0.01 {
                let midpoint = (vertices[i] + vertices[j]) * 0.5;
                directions.push(midpoint.normalize());
            }
        }
    }
    directions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_directions_has_42_unit_vectors() {
        assert_eq!(CANONICAL_DIRECTIONS.len(), 42);
        for d in CANONICAL_DIRECTIONS.iter() {
            assert!((d.norm() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn box_builds_without_hull_reduction() {
        let info = ShapeInfo::new_box(Vector3::new(1.0, 2.0, 3.0));
        assert!(build(&info).is_ok());
    }

    #[test]
    fn none_shape_fails_to_build() {
        let mut info = ShapeInfo::new_box(Vector3::new(1.0, 1.0, 1.0));
        info.shape_type = ShapeType::None;
        assert!(build(&info).is_err());
    }

    #[test]
    fn hull_at_or_below_threshold_is_untouched() {
        let points: Vec<Point3<f32>> = (0..10).map(|i| Point3::new(i as f32, 0.0, 0.0)).collect();
        let reduced = reduce_hull(&points);
        assert_eq!(reduced.len(), points.len());
    }

    #[test]
    fn oversized_hull_is_reduced_to_at_most_42_points() {
        let points: Vec<Point3<f32>> = (0..200)
            .map(|i| {
                let t = i as f32 * 0.31;
                Point3::new(t.cos(), t.sin(), (i as f32 * 0.02).sin())
            })
            .collect();
        let reduced = reduce_hull(&points);
        assert!(reduced.len() <= crate::constants::CANONICAL_HULL_DIRECTIONS);
    }
}
