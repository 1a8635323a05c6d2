//! Built-in geometry
//!
//! Everything here goes through the public [`Geometry`] construction API, the
//! same way asset loaders build their geometry.

use crate::resources::*;
use glam::{Vec2, Vec3, Vec4};

/// Interleaved layout used by the lit primitives: position, normal, texcoord, tangent
const LIT_STRIDE: u32 = 48;

fn lit_layout() -> [AttributeDesc; 4] {
    [
        AttributeDesc::new(Semantic::Position, 3, 0),
        AttributeDesc::new(Semantic::Normal, 3, 12),
        AttributeDesc::new(Semantic::Texcoord0, 2, 24),
        AttributeDesc::new(Semantic::Tangent, 4, 32),
    ]
}

fn push_vertex(data: &mut Vec<f32>, position: Vec3, normal: Vec3, uv: Vec2, tangent: Vec4) {
    data.extend_from_slice(&position.to_array());
    data.extend_from_slice(&normal.to_array());
    data.extend_from_slice(&uv.to_array());
    data.extend_from_slice(&tangent.to_array());
}

fn build_lit(name: &str, vertices: Vec<f32>, indices: Vec<u16>) -> Result<Geometry, GeometryError> {
    let mut geometry = Geometry::new(name);
    geometry.add_multi_attribute(&lit_layout(), LIT_STRIDE, BufferData::F32(vertices), Usage::Static)?;
    let count = indices.len() as u32;
    geometry.set_index_data(BufferData::U16(indices), Usage::Static)?;
    geometry.set_draw_parameter(count, DrawMode::Triangles, 0)?;
    Ok(geometry)
}

/// Unit quad in the XY plane: a single position stream and a texcoord stream,
/// two triangles over six 16-bit indices
pub fn quad() -> Result<Geometry, GeometryError> {
    let mut geometry = Geometry::new("quad");
    geometry.add_single_attribute(
        "quad:position",
        Semantic::Position,
        3,
        BufferData::F32(vec![
            -0.5, -0.5, 0.0, //
            0.5, -0.5, 0.0, //
            0.5, 0.5, 0.0, //
            -0.5, 0.5, 0.0,
        ]),
        Usage::Static,
    )?;
    geometry.add_single_attribute(
        "quad:texcoord",
        Semantic::Texcoord0,
        2,
        BufferData::F32(vec![0.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
        Usage::Static,
    )?;
    geometry.set_index_data(BufferData::U16(vec![0, 1, 2, 0, 2, 3]), Usage::Static)?;
    geometry.set_draw_parameter(6, DrawMode::Triangles, 0)?;
    Ok(geometry)
}

/// Unit cube centered at origin
pub fn cube() -> Result<Geometry, GeometryError> {
    let faces = [
        // Front face
        (Vec3::new(-0.5, -0.5, 0.5), Vec3::Z, Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, -0.5, 0.5), Vec3::Z, Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, 0.5, 0.5), Vec3::Z, Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, 0.5, 0.5), Vec3::Z, Vec2::new(0.0, 0.0)),
        // Back face
        (Vec3::new(0.5, -0.5, -0.5), -Vec3::Z, Vec2::new(0.0, 1.0)),
        (Vec3::new(-0.5, -0.5, -0.5), -Vec3::Z, Vec2::new(1.0, 1.0)),
        (Vec3::new(-0.5, 0.5, -0.5), -Vec3::Z, Vec2::new(1.0, 0.0)),
        (Vec3::new(0.5, 0.5, -0.5), -Vec3::Z, Vec2::new(0.0, 0.0)),
        // Right face
        (Vec3::new(0.5, -0.5, 0.5), Vec3::X, Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, -0.5, -0.5), Vec3::X, Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, 0.5, -0.5), Vec3::X, Vec2::new(1.0, 0.0)),
        (Vec3::new(0.5, 0.5, 0.5), Vec3::X, Vec2::new(0.0, 0.0)),
        // Left face
        (Vec3::new(-0.5, -0.5, -0.5), -Vec3::X, Vec2::new(0.0, 1.0)),
        (Vec3::new(-0.5, -0.5, 0.5), -Vec3::X, Vec2::new(1.0, 1.0)),
        (Vec3::new(-0.5, 0.5, 0.5), -Vec3::X, Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, 0.5, -0.5), -Vec3::X, Vec2::new(0.0, 0.0)),
        // Top face
        (Vec3::new(-0.5, 0.5, 0.5), Vec3::Y, Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, 0.5, 0.5), Vec3::Y, Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, 0.5, -0.5), Vec3::Y, Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, 0.5, -0.5), Vec3::Y, Vec2::new(0.0, 0.0)),
        // Bottom face
        (Vec3::new(-0.5, -0.5, -0.5), -Vec3::Y, Vec2::new(0.0, 1.0)),
        (Vec3::new(0.5, -0.5, -0.5), -Vec3::Y, Vec2::new(1.0, 1.0)),
        (Vec3::new(0.5, -0.5, 0.5), -Vec3::Y, Vec2::new(1.0, 0.0)),
        (Vec3::new(-0.5, -0.5, 0.5), -Vec3::Y, Vec2::new(0.0, 0.0)),
    ];

    let mut vertices = Vec::with_capacity(faces.len() * 12);
    for (position, normal, uv) in faces {
        let tangent = if normal.abs().y > 0.9 {
            Vec4::new(1.0, 0.0, 0.0, 1.0)
        } else {
            Vec3::Y.cross(normal).normalize().extend(1.0)
        };
        push_vertex(&mut vertices, position, normal, uv, tangent);
    }

    let mut indices = Vec::with_capacity(36);
    for face in 0..6u16 {
        let base = face * 4;
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    build_lit("cube", vertices, indices)
}

/// Plane on the XZ axis
pub fn plane(width: f32, depth: f32, subdivisions: u32) -> Result<Geometry, GeometryError> {
    let subdivisions = subdivisions.max(1);
    let half_width = width / 2.0;
    let half_depth = depth / 2.0;
    let step_x = width / subdivisions as f32;
    let step_z = depth / subdivisions as f32;

    let mut vertices = Vec::new();
    for z in 0..=subdivisions {
        for x in 0..=subdivisions {
            let px = -half_width + x as f32 * step_x;
            let pz = -half_depth + z as f32 * step_z;
            push_vertex(
                &mut vertices,
                Vec3::new(px, 0.0, pz),
                Vec3::Y,
                Vec2::new(x as f32 / subdivisions as f32, z as f32 / subdivisions as f32),
                Vec4::new(1.0, 0.0, 0.0, 1.0),
            );
        }
    }

    let mut indices = Vec::new();
    for z in 0..subdivisions {
        for x in 0..subdivisions {
            let current = z * (subdivisions + 1) + x;
            let next = current + subdivisions + 1;
            indices.extend(
                [current, next, current + 1, current + 1, next, next + 1]
                    .iter()
                    .map(|i| *i as u16),
            );
        }
    }

    build_lit("plane", vertices, indices)
}

/// UV sphere of diameter 1
pub fn sphere(segments: u32, rings: u32) -> Result<Geometry, GeometryError> {
    let segment_angle = 2.0 * std::f32::consts::PI / segments as f32;
    let ring_angle = std::f32::consts::PI / rings as f32;

    let mut vertices = Vec::new();
    for ring in 0..=rings {
        let phi = ring as f32 * ring_angle;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = segment as f32 * segment_angle;
            let x = ring_radius * theta.cos();
            let z = ring_radius * theta.sin();
            // Tangent along theta direction
            let tangent = Vec3::new(-theta.sin(), 0.0, theta.cos()).normalize();
            push_vertex(
                &mut vertices,
                Vec3::new(x * 0.5, y * 0.5, z * 0.5),
                Vec3::new(x, y, z).normalize_or_zero(),
                Vec2::new(segment as f32 / segments as f32, ring as f32 / rings as f32),
                tangent.extend(1.0),
            );
        }
    }

    let mut indices = Vec::new();
    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend(
                [current, next, current + 1, current + 1, next, next + 1]
                    .iter()
                    .map(|i| *i as u16),
            );
        }
    }

    build_lit("sphere", vertices, indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_layout() {
        let geometry = quad().unwrap();
        assert_eq!(geometry.vertex_count(), 4);
        let draw = geometry.draw_parameter().unwrap();
        assert_eq!(draw.count, 6);
        assert_eq!(draw.mode, DrawMode::Triangles);
        assert_eq!(draw.mode.primitive_count(draw.count), 2);
    }

    #[test]
    fn test_cube_bounds() {
        let mut geometry = cube().unwrap();
        assert_eq!(geometry.vertex_count(), 24);
        let aabb = geometry.bounding().unwrap();
        assert_eq!(aabb.min, Vec3::splat(-0.5));
        assert_eq!(aabb.max, Vec3::splat(0.5));
        assert!(geometry.has_semantic(Semantic::Tangent));
    }

    #[test]
    fn test_plane_index_count() {
        let geometry = plane(2.0, 2.0, 4).unwrap();
        assert_eq!(geometry.vertex_count(), 25);
        assert_eq!(geometry.draw_parameter().unwrap().count, 4 * 4 * 6);
    }
}
