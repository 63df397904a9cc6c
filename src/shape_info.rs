//! `ShapeInfo` descriptor and its content hash (§3.1, §4.A).

use nalgebra::{Point3, Vector3};

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ShapeType {
    None,
    Box,
    Sphere,
    CapsuleY,
    ConvexHull,
    Compound,
    TriangleMesh,
}

#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ShapeInfo {
    pub shape_type: ShapeType,
    pub half_extents: Vector3<f32>,
    pub point_collection: Option<Vec<Vec<Point3<f32>>>>,
    pub triangle_indices: Option<Vec<[u32; 3]>>,
    pub model_url: Option<String>,
    pub offset: Option<Vector3<f32>>,
}

impl ShapeInfo {
    pub fn new_box(half_extents: Vector3<f32>) -> Self {
        Self {
            shape_type: ShapeType::Box,
            half_extents,
            point_collection: None,
            triangle_indices: None,
            model_url: None,
            offset: None,
        }
    }

    pub fn new_sphere(radius: f32) -> Self {
        Self {
            shape_type: ShapeType::Sphere,
            half_extents: Vector3::new(radius, radius, radius),
            point_collection: None,
            triangle_indices: None,
            model_url: None,
            offset: None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self.shape_type, ShapeType::None)
    }

    /// 64-bit content hash, represented as two 32-bit halves so the cache can
    /// probe buckets the way `ShapeManager`'s `HashKey`/`DoubleHashKey` does:
    /// two shapes collide iff both halves match (§4.A).
    pub fn hash(&self) -> ShapeHash {
        use std::hash::{Hash, Hasher};

        struct Fnv(u64);
        impl Hasher for Fnv {
            fn finish(&self) -> u64 {
                self.0
            }
            fn write(&mut self, bytes: &[u8]) {
                for &b in bytes {
                    self.0 ^= b as u64;
                    self.0 = self.0.wrapping_mul(0x0000_0100_0000_01B3);
                }
            }
        }

        let mut first = Fnv(0xcbf2_9ce4_8422_2325);
        discriminant_bytes(&self.shape_type).hash(&mut first);
        for component in self.half_extents.iter() {
            component.to_bits().hash(&mut first);
        }
        if let Some(offset) = self.offset {
            for component in offset.iter() {
                component.to_bits().hash(&mut first);
            }
        }

        let mut second = Fnv(0x1000_0000_01B3_CBF2);
        if let Some(points) = &self.point_collection {
            for hull in points {
                for p in hull {
                    p.x.to_bits().hash(&mut second);
                    p.y.to_bits().hash(&mut second);
                    p.z.to_bits().hash(&mut second);
                }
            }
        }
        if let Some(indices) = &self.triangle_indices {
            for tri in indices {
                tri.hash(&mut second);
            }
        }
        if let Some(url) = &self.model_url {
            url.hash(&mut second);
        }

        ShapeHash((first.0 as u32, second.0 as u32))
    }
}

fn discriminant_bytes(shape_type: &ShapeType) -> u8 {
    match shape_type {
        ShapeType::None => 0,
        ShapeType::Box => 1,
        ShapeType::Sphere => 2,
        ShapeType::CapsuleY => 3,
        ShapeType::ConvexHull => 4,
        ShapeType::Compound => 5,
        ShapeType::TriangleMesh => 6,
    }
}

/// Two 32-bit halves rather than a flattened `u64`: matches the source's
/// double-hash probing, where a collision requires both halves to match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ShapeHash(pub (u32, u32));
