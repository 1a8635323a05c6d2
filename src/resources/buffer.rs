//! Vertex and index buffers with their attribute layouts

use crate::backend::types::{VertexFormat, VertexAttribute, VertexBufferLayout, VertexStepMode};
use crate::resources::GeometryError;

/// Vertex data channel semantic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Semantic {
    Position,
    Normal,
    Texcoord0,
    Tangent,
    Binormal,
    Color,
    Texcoord1,
    SkinIndex,
    SkinWeight,
}

impl Semantic {
    /// Shader input location the semantic is bound to
    pub fn location(&self) -> u32 {
        match self {
            Semantic::Position => 0,
            Semantic::Normal => 1,
            Semantic::Texcoord0 => 2,
            Semantic::Tangent => 3,
            Semantic::Binormal => 4,
            Semantic::Color => 5,
            Semantic::Texcoord1 => 6,
            Semantic::SkinIndex => 7,
            Semantic::SkinWeight => 8,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Semantic::Position => "position",
            Semantic::Normal => "normal",
            Semantic::Texcoord0 => "texcoord0",
            Semantic::Tangent => "tangent",
            Semantic::Binormal => "binormal",
            Semantic::Color => "color",
            Semantic::Texcoord1 => "texcoord1",
            Semantic::SkinIndex => "skin_index",
            Semantic::SkinWeight => "skin_weight",
        }
    }
}

/// Element type of a buffer's data block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    Float32,
    Uint32,
    Uint16,
    Uint8,
    Int16,
    Int8,
}

impl ComponentType {
    pub fn bytes(&self) -> u32 {
        match self {
            ComponentType::Float32 | ComponentType::Uint32 => 4,
            ComponentType::Uint16 | ComponentType::Int16 => 2,
            ComponentType::Uint8 | ComponentType::Int8 => 1,
        }
    }
}

/// Upload hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    #[default]
    Static,
    Dynamic,
    Stream,
}

impl Usage {
    pub fn allows_updates(&self) -> bool {
        !matches!(self, Usage::Static)
    }
}

/// Typed CPU-side data block
#[derive(Debug, Clone, PartialEq)]
pub enum BufferData {
    F32(Vec<f32>),
    U32(Vec<u32>),
    U16(Vec<u16>),
    U8(Vec<u8>),
    I16(Vec<i16>),
    I8(Vec<i8>),
}

impl BufferData {
    pub fn component_type(&self) -> ComponentType {
        match self {
            BufferData::F32(_) => ComponentType::Float32,
            BufferData::U32(_) => ComponentType::Uint32,
            BufferData::U16(_) => ComponentType::Uint16,
            BufferData::U8(_) => ComponentType::Uint8,
            BufferData::I16(_) => ComponentType::Int16,
            BufferData::I8(_) => ComponentType::Int8,
        }
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        match self {
            BufferData::F32(d) => d.len(),
            BufferData::U32(d) => d.len(),
            BufferData::U16(d) => d.len(),
            BufferData::U8(d) => d.len(),
            BufferData::I16(d) => d.len(),
            BufferData::I8(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.len() * self.component_type().bytes() as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            BufferData::F32(d) => bytemuck::cast_slice(d),
            BufferData::U32(d) => bytemuck::cast_slice(d),
            BufferData::U16(d) => bytemuck::cast_slice(d),
            BufferData::U8(d) => d,
            BufferData::I16(d) => bytemuck::cast_slice(d),
            BufferData::I8(d) => bytemuck::cast_slice(d),
        }
    }

    /// Element `i` converted to f32
    pub fn read_f32(&self, i: usize) -> Option<f32> {
        match self {
            BufferData::F32(d) => d.get(i).copied(),
            BufferData::U32(d) => d.get(i).map(|v| *v as f32),
            BufferData::U16(d) => d.get(i).map(|v| *v as f32),
            BufferData::U8(d) => d.get(i).map(|v| *v as f32),
            BufferData::I16(d) => d.get(i).map(|v| *v as f32),
            BufferData::I8(d) => d.get(i).map(|v| *v as f32),
        }
    }

    /// Element `i` as an index; `None` for signed or float data
    pub fn read_index(&self, i: usize) -> Option<u32> {
        match self {
            BufferData::U32(d) => d.get(i).copied(),
            BufferData::U16(d) => d.get(i).map(|v| *v as u32),
            BufferData::U8(d) => d.get(i).map(|v| *v as u32),
            _ => None,
        }
    }
}

/// One vertex data channel inside a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Attribute {
    pub semantic: Semantic,
    /// 1 to 4
    pub components: u8,
    /// Byte offset from the start of a vertex
    pub offset: u32,
    pub component_type: ComponentType,
    pub normalized: bool,
}

impl Attribute {
    pub fn byte_size(&self) -> u32 {
        self.components as u32 * self.component_type.bytes()
    }

    /// GPU vertex format, `None` when the GPU has no matching format
    pub fn vertex_format(&self) -> Option<VertexFormat> {
        use ComponentType::*;
        let format = match (self.component_type, self.components, self.normalized) {
            (Float32, 1, _) => VertexFormat::Float32,
            (Float32, 2, _) => VertexFormat::Float32x2,
            (Float32, 3, _) => VertexFormat::Float32x3,
            (Float32, 4, _) => VertexFormat::Float32x4,
            (Uint32, 1, _) => VertexFormat::Uint32,
            (Uint32, 2, _) => VertexFormat::Uint32x2,
            (Uint32, 3, _) => VertexFormat::Uint32x3,
            (Uint32, 4, _) => VertexFormat::Uint32x4,
            (Uint16, 2, false) => VertexFormat::Uint16x2,
            (Uint16, 4, false) => VertexFormat::Uint16x4,
            (Uint16, 2, true) => VertexFormat::Unorm16x2,
            (Uint16, 4, true) => VertexFormat::Unorm16x4,
            (Int16, 2, _) => VertexFormat::Sint16x2,
            (Int16, 4, _) => VertexFormat::Sint16x4,
            (Uint8, 2, false) => VertexFormat::Uint8x2,
            (Uint8, 4, false) => VertexFormat::Uint8x4,
            (Uint8, 2, true) => VertexFormat::Unorm8x2,
            (Uint8, 4, true) => VertexFormat::Unorm8x4,
            (Int8, 2, _) => VertexFormat::Sint8x2,
            (Int8, 4, _) => VertexFormat::Sint8x4,
            _ => return None,
        };
        Some(format)
    }
}

/// Attribute description for interleaved buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeDesc {
    pub semantic: Semantic,
    pub components: u8,
    pub offset: u32,
    pub normalized: bool,
}

impl AttributeDesc {
    pub fn new(semantic: Semantic, components: u8, offset: u32) -> Self {
        Self {
            semantic,
            components,
            offset,
            normalized: false,
        }
    }
}

/// A CPU-side block of vertex or index data plus upload metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Buffer {
    name: String,
    data: BufferData,
    attributes: Vec<Attribute>,
    /// Bytes between consecutive vertices, 0 means tightly packed
    stride: u32,
    usage: Usage,
    is_index: bool,
    version: u64,
}

impl Buffer {
    /// A vertex buffer holding at least one attribute
    pub(crate) fn vertex(
        name: &str,
        data: BufferData,
        attributes: Vec<Attribute>,
        stride: u32,
        usage: Usage,
        version: u64,
    ) -> Result<Self, GeometryError> {
        if attributes.is_empty() {
            return Err(GeometryError::NoAttributes(name.to_string()));
        }
        for attr in &attributes {
            if !(1..=4).contains(&attr.components) {
                return Err(GeometryError::InvalidComponentCount(attr.components));
            }
            let outside = attr.offset.checked_add(attr.byte_size()).map_or(true, |end| end > stride);
            if stride != 0 && outside {
                return Err(GeometryError::AttributeOutsideStride {
                    semantic: attr.semantic,
                    offset: attr.offset,
                    stride,
                });
            }
        }

        let buffer = Self {
            name: name.to_string(),
            data,
            attributes,
            stride,
            usage,
            is_index: false,
            version,
        };
        let elements = buffer.element_stride() as usize;
        if elements == 0 || buffer.data.len() % elements != 0 {
            return Err(GeometryError::DataLength {
                len: buffer.data.len(),
                stride: elements,
            });
        }
        Ok(buffer)
    }

    /// An index buffer; never carries attributes
    pub(crate) fn index(name: &str, data: BufferData, usage: Usage, version: u64) -> Result<Self, GeometryError> {
        if !matches!(
            data.component_type(),
            ComponentType::Uint8 | ComponentType::Uint16 | ComponentType::Uint32
        ) {
            return Err(GeometryError::InvalidIndexType(data.component_type()));
        }
        Ok(Self {
            name: name.to_string(),
            data,
            attributes: Vec::new(),
            stride: 0,
            usage,
            is_index: true,
            version,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &BufferData {
        &self.data
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    pub fn is_index(&self) -> bool {
        self.is_index
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn component_type(&self) -> ComponentType {
        self.data.component_type()
    }

    /// Byte stride, computing the packed size when the stored stride is 0
    pub fn byte_stride(&self) -> u32 {
        if self.stride != 0 {
            return self.stride;
        }
        self.attributes.iter().map(|a| a.byte_size()).sum()
    }

    /// Stride measured in elements of the data block
    pub fn element_stride(&self) -> u32 {
        self.byte_stride() / self.component_type().bytes()
    }

    /// Number of complete vertices (or indices) in the data block
    pub fn element_count(&self) -> usize {
        if self.is_index {
            return self.data.len();
        }
        match self.element_stride() as usize {
            0 => 0,
            stride => self.data.len() / stride,
        }
    }

    pub fn attribute(&self, semantic: Semantic) -> Option<(usize, &Attribute)> {
        self.attributes
            .iter()
            .enumerate()
            .find(|(_, a)| a.semantic == semantic)
    }

    /// GPU layout for this buffer, `None` when an attribute has no GPU format
    pub fn vertex_layout(&self) -> Option<VertexBufferLayout> {
        let attributes = self
            .attributes
            .iter()
            .map(|a| {
                a.vertex_format().map(|format| VertexAttribute {
                    location: a.semantic.location(),
                    format,
                    offset: a.offset as u64,
                })
            })
            .collect::<Option<Vec<_>>>()?;

        Some(VertexBufferLayout {
            array_stride: self.byte_stride() as u64,
            step_mode: VertexStepMode::Vertex,
            attributes,
        })
    }

    pub(crate) fn replace_data(&mut self, data: BufferData, version: u64) -> Result<(), GeometryError> {
        if !self.usage.allows_updates() {
            return Err(GeometryError::StaticBuffer(self.name.clone()));
        }
        if data.component_type() != self.component_type() {
            return Err(GeometryError::TypeMismatch {
                expected: self.component_type(),
                found: data.component_type(),
            });
        }
        let elements = self.element_stride() as usize;
        if !self.is_index && (elements == 0 || data.len() % elements != 0) {
            return Err(GeometryError::DataLength {
                len: data.len(),
                stride: elements,
            });
        }
        self.data = data;
        self.version = version;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(components: u8, offset: u32) -> Attribute {
        Attribute {
            semantic: Semantic::Position,
            components,
            offset,
            component_type: ComponentType::Float32,
            normalized: false,
        }
    }

    #[test]
    fn test_packed_stride() {
        let buffer = Buffer::vertex(
            "pos",
            BufferData::F32(vec![0.0; 9]),
            vec![position(3, 0)],
            0,
            Usage::Static,
            1,
        )
        .unwrap();
        assert_eq!(buffer.byte_stride(), 12);
        assert_eq!(buffer.element_stride(), 3);
        assert_eq!(buffer.element_count(), 3);
    }

    #[test]
    fn test_vertex_buffer_requires_attribute() {
        let result = Buffer::vertex("empty", BufferData::F32(vec![0.0; 3]), vec![], 0, Usage::Static, 1);
        assert!(matches!(result, Err(GeometryError::NoAttributes(_))));
    }

    #[test]
    fn test_index_buffer_rejects_float_data() {
        let result = Buffer::index("idx", BufferData::F32(vec![0.0]), Usage::Static, 1);
        assert!(matches!(result, Err(GeometryError::InvalidIndexType(_))));
    }

    #[test]
    fn test_attribute_must_fit_stride() {
        let result = Buffer::vertex(
            "interleaved",
            BufferData::F32(vec![0.0; 8]),
            vec![position(3, 8)],
            16,
            Usage::Static,
            1,
        );
        assert!(matches!(result, Err(GeometryError::AttributeOutsideStride { .. })));
    }

    #[test]
    fn test_huge_attribute_offset_is_outside_stride() {
        let result = Buffer::vertex(
            "interleaved",
            BufferData::F32(vec![0.0; 4]),
            vec![position(3, u32::MAX)],
            16,
            Usage::Static,
            1,
        );
        assert!(matches!(
            result,
            Err(GeometryError::AttributeOutsideStride { offset: u32::MAX, stride: 16, .. })
        ));
    }

    #[test]
    fn test_static_buffer_rejects_update() {
        let mut buffer = Buffer::vertex(
            "pos",
            BufferData::F32(vec![0.0; 3]),
            vec![position(3, 0)],
            0,
            Usage::Static,
            1,
        )
        .unwrap();
        assert!(buffer.replace_data(BufferData::F32(vec![1.0; 3]), 2).is_err());
        assert_eq!(buffer.version(), 1);
    }

    #[test]
    fn test_vertex_format_mapping() {
        assert_eq!(position(3, 0).vertex_format(), Some(VertexFormat::Float32x3));
        let byte_color = Attribute {
            semantic: Semantic::Color,
            components: 4,
            offset: 0,
            component_type: ComponentType::Uint8,
            normalized: true,
        };
        assert_eq!(byte_color.vertex_format(), Some(VertexFormat::Unorm8x4));
        let odd = Attribute {
            components: 3,
            ..byte_color
        };
        assert_eq!(odd.vertex_format(), None);
    }
}
