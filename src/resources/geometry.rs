//! Geometry: vertex buffers, an optional index buffer and a draw descriptor

use crate::backend::types::PrimitiveTopology;
use crate::cache::CacheEntry;
use crate::resources::buffer::*;
use glam::Vec3;
use thiserror::Error;

/// Largest index count addressable with 8 or 16-bit indices
pub const MAX_SHORT_INDEX_COUNT: usize = 65535;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Attribute component count must be 1 to 4, got {0}")]
    InvalidComponentCount(u8),
    #[error("Vertex buffer '{0}' has no attributes")]
    NoAttributes(String),
    #[error("Index buffer cannot hold {0:?} data")]
    InvalidIndexType(ComponentType),
    #[error("Attribute {semantic:?} at offset {offset} does not fit stride {stride}")]
    AttributeOutsideStride {
        semantic: Semantic,
        offset: u32,
        stride: u32,
    },
    #[error("Data length {len} is not a multiple of the element stride {stride}")]
    DataLength { len: usize, stride: usize },
    #[error("Data type mismatch: expected {expected:?}, found {found:?}")]
    TypeMismatch {
        expected: ComponentType,
        found: ComponentType,
    },
    #[error("Buffer '{0}' is static and cannot be updated")]
    StaticBuffer(String),
    #[error("{0} indices exceed the 16-bit index ceiling of 65535")]
    IndexCeiling(usize),
    #[error("Draw count {0} exceeds the 16-bit index ceiling of 65535")]
    DrawCountCeiling(u32),
    #[error("Draw range ends at {end} but only {available} elements are available")]
    DrawOutOfRange { end: u64, available: u64 },
    #[error("No buffer at index {0}")]
    BufferIndex(usize),
}

/// Primitive assembly mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

impl DrawMode {
    /// GPU topology, `None` for modes the GPU cannot assemble directly
    pub fn topology(&self) -> Option<PrimitiveTopology> {
        match self {
            DrawMode::Points => Some(PrimitiveTopology::PointList),
            DrawMode::Lines => Some(PrimitiveTopology::LineList),
            DrawMode::LineStrip => Some(PrimitiveTopology::LineStrip),
            DrawMode::Triangles => Some(PrimitiveTopology::TriangleList),
            DrawMode::TriangleStrip => Some(PrimitiveTopology::TriangleStrip),
            DrawMode::LineLoop | DrawMode::TriangleFan => None,
        }
    }

    /// Number of primitives assembled from `count` vertices
    pub fn primitive_count(&self, count: u32) -> u32 {
        match self {
            DrawMode::Points => count,
            DrawMode::Lines => count / 2,
            DrawMode::LineStrip => count.saturating_sub(1),
            DrawMode::LineLoop => if count > 1 { count } else { 0 },
            DrawMode::Triangles => count / 3,
            DrawMode::TriangleStrip | DrawMode::TriangleFan => count.saturating_sub(2),
        }
    }
}

/// How a geometry is drawn; a count of zero draws nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DrawParameter {
    pub count: u32,
    pub mode: DrawMode,
    pub offset: u32,
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    pub fn from_point(p: Vec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn extend(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> Vec3 {
        self.max - self.min
    }

    pub fn contains(&self, p: Vec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }
}

/// A drawable set of vertex streams
#[derive(Debug, Clone)]
pub struct Geometry {
    name: String,
    buffers: Vec<Buffer>,
    index: Option<Buffer>,
    /// (buffer, attribute) holding positions
    position: Option<(usize, usize)>,
    draw: Option<DrawParameter>,
    bounding: Option<CacheEntry<Option<Aabb>>>,
    version: u64,
}

impl Geometry {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            buffers: Vec::new(),
            index: None,
            position: None,
            draw: None,
            bounding: None,
            version: 1,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bumped by every mutation; buffers carry the version they were last written at
    pub fn version(&self) -> u64 {
        self.version
    }

    fn bump(&mut self) -> u64 {
        self.version += 1;
        self.version
    }

    /// Add a buffer holding exactly one attribute at offset 0
    ///
    /// Returns the buffer's index.
    pub fn add_single_attribute(
        &mut self,
        name: &str,
        semantic: Semantic,
        components: u8,
        data: BufferData,
        usage: Usage,
    ) -> Result<usize, GeometryError> {
        let attribute = Attribute {
            semantic,
            components,
            offset: 0,
            component_type: data.component_type(),
            normalized: false,
        };
        let version = self.version + 1;
        let buffer = Buffer::vertex(name, data, vec![attribute], 0, usage, version)?;
        self.push_buffer(buffer)
    }

    /// Add one interleaved buffer whose attributes share a data block and stride
    pub fn add_multi_attribute(
        &mut self,
        descs: &[AttributeDesc],
        stride: u32,
        data: BufferData,
        usage: Usage,
    ) -> Result<usize, GeometryError> {
        let component_type = data.component_type();
        let attributes = descs
            .iter()
            .map(|d| Attribute {
                semantic: d.semantic,
                components: d.components,
                offset: d.offset,
                component_type,
                normalized: d.normalized,
            })
            .collect();
        let name = format!("{}:interleaved{}", self.name, self.buffers.len());
        let version = self.version + 1;
        let buffer = Buffer::vertex(&name, data, attributes, stride, usage, version)?;
        self.push_buffer(buffer)
    }

    fn push_buffer(&mut self, buffer: Buffer) -> Result<usize, GeometryError> {
        let index = self.buffers.len();
        if let Some((attr, _)) = buffer.attribute(Semantic::Position) {
            self.position = Some((index, attr));
        }
        self.buffers.push(buffer);
        self.bump();
        Ok(index)
    }

    /// Replace the index buffer
    ///
    /// 8 and 16-bit index data longer than [`MAX_SHORT_INDEX_COUNT`] is rejected, leaving
    /// the geometry without indices and without a draw descriptor.
    pub fn set_index_data(&mut self, data: BufferData, usage: Usage) -> Result<(), GeometryError> {
        let short = matches!(
            data.component_type(),
            ComponentType::Uint8 | ComponentType::Uint16
        );
        if short && data.len() > MAX_SHORT_INDEX_COUNT {
            log::error!(
                "Geometry '{}': {} indices exceed the 16-bit ceiling",
                self.name,
                data.len()
            );
            self.index = None;
            self.draw = None;
            self.bump();
            return Err(GeometryError::IndexCeiling(data.len()));
        }

        let version = self.version + 1;
        let name = format!("{}:index", self.name);
        self.index = Some(Buffer::index(&name, data, usage, version)?);
        self.bump();
        Ok(())
    }

    /// Set the draw descriptor
    ///
    /// Counts are never inferred from the data; a count of 0 draws nothing.
    /// The range is checked against the index data, or against the vertex
    /// data when there are no indices. A geometry without any data yet
    /// accepts any range; it is checked again at draw time.
    pub fn set_draw_parameter(&mut self, count: u32, mode: DrawMode, offset: u32) -> Result<(), GeometryError> {
        let short_indices = self
            .index
            .as_ref()
            .map(|i| i.component_type() != ComponentType::Uint32)
            .unwrap_or(false);
        if short_indices && count as usize > MAX_SHORT_INDEX_COUNT {
            log::error!("Geometry '{}': draw count {} exceeds the 16-bit ceiling", self.name, count);
            self.draw = None;
            return Err(GeometryError::DrawCountCeiling(count));
        }

        let available = match &self.index {
            Some(index) => Some(index.element_count()),
            None if !self.buffers.is_empty() => Some(self.vertex_count()),
            None => None,
        };
        let end = offset as u64 + count as u64;
        if let Some(available) = available.map(|a| a as u64).filter(|a| end > *a) {
            log::error!(
                "Geometry '{}': draw range {}..{} exceeds {} elements",
                self.name,
                offset,
                end,
                available
            );
            self.draw = None;
            return Err(GeometryError::DrawOutOfRange { end, available });
        }
        self.draw = Some(DrawParameter { count, mode, offset });
        Ok(())
    }

    pub fn draw_parameter(&self) -> Option<DrawParameter> {
        self.draw
    }

    pub fn buffers(&self) -> &[Buffer] {
        &self.buffers
    }

    pub fn index_buffer(&self) -> Option<&Buffer> {
        self.index.as_ref()
    }

    /// Replace the data of a dynamic or stream buffer, keeping its layout
    pub fn update_buffer_data(&mut self, buffer: usize, data: BufferData) -> Result<(), GeometryError> {
        let version = self.version + 1;
        self.buffers
            .get_mut(buffer)
            .ok_or(GeometryError::BufferIndex(buffer))?
            .replace_data(data, version)?;
        self.bump();
        Ok(())
    }

    /// Number of complete vertices across all vertex buffers
    pub fn vertex_count(&self) -> usize {
        self.buffers
            .iter()
            .map(|b| b.element_count())
            .min()
            .unwrap_or(0)
    }

    pub fn has_semantic(&self, semantic: Semantic) -> bool {
        self.buffers.iter().any(|b| b.attribute(semantic).is_some())
    }

    /// Bounding box, computed on first use and cached until the geometry changes
    ///
    /// `None` when there is no position data.
    pub fn bounding(&mut self) -> Option<Aabb> {
        if let Some(entry) = &self.bounding {
            if entry.is_current(self.version) {
                return entry.value;
            }
        }
        let built = self.build_bounding();
        self.bounding = Some(CacheEntry::new(self.version, built));
        built
    }

    /// Drop the cached bounding box
    pub fn remove_bounding(&mut self) {
        self.bounding = None;
    }

    pub fn has_cached_bounding(&self) -> bool {
        self.bounding
            .as_ref()
            .map(|e| e.is_current(self.version))
            .unwrap_or(false)
    }

    /// Compute the bounding box from the registered position attribute
    ///
    /// Walks the index buffer when present, else every vertex. Two-component
    /// positions get z = 0. Indices pointing past the data are ignored.
    pub fn build_bounding(&self) -> Option<Aabb> {
        let (buffer_index, attr_index) = self.position?;
        let buffer = self.buffers.get(buffer_index)?;
        let attr = buffer.attributes().get(attr_index)?;
        let data = buffer.data();

        let stride = match buffer.stride() {
            0 => buffer.element_stride() as usize,
            s => (s / buffer.component_type().bytes()) as usize,
        };
        let offset = (attr.offset / buffer.component_type().bytes()) as usize;
        let comps = (attr.components as usize).min(3);
        if stride == 0 || comps < 2 {
            return None;
        }

        let read = |vertex: usize| -> Option<Vec3> {
            let base = vertex * stride + offset;
            if base + comps > data.len() {
                return None;
            }
            let x = data.read_f32(base)?;
            let y = data.read_f32(base + 1)?;
            let z = if comps == 3 { data.read_f32(base + 2)? } else { 0.0 };
            Some(Vec3::new(x, y, z))
        };

        let mut aabb: Option<Aabb> = None;
        let mut visit = |p: Vec3| {
            aabb = Some(match aabb {
                Some(mut b) => {
                    b.extend(p);
                    b
                }
                None => Aabb::from_point(p),
            });
        };

        match &self.index {
            Some(index) => {
                for i in 0..index.data().len() {
                    if let Some(p) = index.data().read_index(i).and_then(|v| read(v as usize)) {
                        visit(p);
                    }
                }
            }
            None => {
                let mut vertex = 0;
                while let Some(p) = read(vertex) {
                    visit(p);
                    vertex += 1;
                }
            }
        }

        aabb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> Geometry {
        let mut geometry = Geometry::new("quad");
        geometry
            .add_single_attribute(
                "position",
                Semantic::Position,
                3,
                BufferData::F32(vec![
                    -0.5, -0.5, 0.0, 0.5, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0,
                ]),
                Usage::Static,
            )
            .unwrap();
        geometry
            .set_index_data(BufferData::U16(vec![0, 1, 2, 0, 2, 3]), Usage::Static)
            .unwrap();
        geometry.set_draw_parameter(6, DrawMode::Triangles, 0).unwrap();
        geometry
    }

    #[test]
    fn test_quad_bounding() {
        let mut geometry = quad();
        let aabb = geometry.bounding().unwrap();
        assert_eq!(aabb.min, Vec3::new(-0.5, -0.5, 0.0));
        assert_eq!(aabb.max, Vec3::new(0.5, 0.5, 0.0));
        assert!(geometry.has_cached_bounding());
    }

    #[test]
    fn test_bounding_only_visits_indexed_vertices() {
        let mut geometry = Geometry::new("partial");
        geometry
            .add_single_attribute(
                "position",
                Semantic::Position,
                2,
                BufferData::F32(vec![0.0, 0.0, 1.0, 1.0, 100.0, 100.0]),
                Usage::Static,
            )
            .unwrap();
        geometry
            .set_index_data(BufferData::U8(vec![0, 1, 9]), Usage::Static)
            .unwrap();

        let aabb = geometry.build_bounding().unwrap();
        assert_eq!(aabb.max, Vec3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn test_interleaved_bounding_skips_other_attributes() {
        let mut geometry = Geometry::new("interleaved");
        // position(3) + normal(3)
        let data = vec![
            1.0, 2.0, 3.0, 9.0, 9.0, 9.0, //
            -1.0, -2.0, -3.0, -9.0, -9.0, -9.0,
        ];
        geometry
            .add_multi_attribute(
                &[
                    AttributeDesc::new(Semantic::Position, 3, 0),
                    AttributeDesc::new(Semantic::Normal, 3, 12),
                ],
                24,
                BufferData::F32(data),
                Usage::Static,
            )
            .unwrap();

        let aabb = geometry.build_bounding().unwrap();
        assert_eq!(aabb.min, Vec3::new(-1.0, -2.0, -3.0));
        assert_eq!(aabb.max, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(geometry.vertex_count(), 2);
    }

    #[test]
    fn test_no_position_means_no_bounding() {
        let mut geometry = Geometry::new("colors");
        geometry
            .add_single_attribute("color", Semantic::Color, 4, BufferData::F32(vec![1.0; 8]), Usage::Static)
            .unwrap();
        assert_eq!(geometry.bounding(), None);
    }

    #[test]
    fn test_index_ceiling_clears_draw_parameter() {
        let mut geometry = quad();
        let result = geometry.set_index_data(BufferData::U16(vec![0; 70000]), Usage::Static);
        assert_eq!(result, Err(GeometryError::IndexCeiling(70000)));
        assert!(geometry.index_buffer().is_none());
        assert!(geometry.draw_parameter().is_none());
    }

    #[test]
    fn test_wide_indices_are_not_capped() {
        let mut geometry = quad();
        assert!(geometry
            .set_index_data(BufferData::U32(vec![0; 70000]), Usage::Static)
            .is_ok());
        assert!(geometry.set_draw_parameter(70000, DrawMode::Triangles, 0).is_ok());
    }

    #[test]
    fn test_draw_count_ceiling() {
        let mut geometry = quad();
        assert_eq!(
            geometry.set_draw_parameter(65536, DrawMode::Triangles, 0),
            Err(GeometryError::DrawCountCeiling(65536))
        );
        assert!(geometry.draw_parameter().is_none());
    }

    #[test]
    fn test_draw_range_checked_against_data() {
        let mut geometry = quad();
        assert_eq!(
            geometry.set_draw_parameter(6, DrawMode::Triangles, 3),
            Err(GeometryError::DrawOutOfRange { end: 9, available: 6 })
        );
        assert!(geometry.draw_parameter().is_none());
        assert!(geometry.set_draw_parameter(3, DrawMode::Triangles, 3).is_ok());

        let mut unindexed = Geometry::new("unindexed");
        assert!(unindexed.set_draw_parameter(3, DrawMode::Triangles, 0).is_ok());
        unindexed
            .add_single_attribute(
                "position",
                Semantic::Position,
                3,
                BufferData::F32(vec![0.0; 9]),
                Usage::Static,
            )
            .unwrap();
        assert_eq!(
            unindexed.set_draw_parameter(4, DrawMode::Points, 0),
            Err(GeometryError::DrawOutOfRange { end: 4, available: 3 })
        );
    }

    #[test]
    fn test_dynamic_update_invalidates_bounding() {
        let mut geometry = Geometry::new("dynamic");
        let buffer = geometry
            .add_single_attribute(
                "position",
                Semantic::Position,
                3,
                BufferData::F32(vec![0.0, 0.0, 0.0, 1.0, 1.0, 1.0]),
                Usage::Dynamic,
            )
            .unwrap();
        assert_eq!(geometry.bounding().unwrap().max, Vec3::ONE);

        geometry
            .update_buffer_data(buffer, BufferData::F32(vec![0.0, 0.0, 0.0, 2.0, 2.0, 2.0]))
            .unwrap();
        assert!(!geometry.has_cached_bounding());
        assert_eq!(geometry.bounding().unwrap().max, Vec3::splat(2.0));
    }

    #[test]
    fn test_draw_parameter_defaults() {
        let parameter = DrawParameter::default();
        assert_eq!(parameter.count, 0);
        assert_eq!(parameter.mode, DrawMode::Triangles);
        assert_eq!(DrawMode::Triangles.primitive_count(6), 2);
    }
}
