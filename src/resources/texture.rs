//! Texture descriptors and image loading

use crate::backend::types::*;
use image::{DynamicImage, GenericImageView};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TextureError {
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("Texture '{0}' has zero size")]
    ZeroSize(String),
    #[error("Texture data is {actual} bytes, expected {expected}")]
    DataSize { expected: usize, actual: usize },
    #[error("Layer {layer} is out of range for a texture with {layers} layers")]
    Layer { layer: u32, layers: u32 },
}

/// Loaded texture data
#[derive(Debug, Clone)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub data: Vec<u8>,
    pub name: String,
}

impl TextureData {
    /// Load texture from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TextureError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();

        let img = image::open(path)?;
        Ok(Self::from_image(img, &name))
    }

    /// Load texture from bytes
    pub fn from_bytes(bytes: &[u8], name: &str) -> Result<Self, TextureError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: DynamicImage, name: &str) -> Self {
        let (width, height) = img.dimensions();
        Self {
            width,
            height,
            format: TextureFormat::Rgba8UnormSrgb,
            data: img.to_rgba8().into_raw(),
            name: name.to_string(),
        }
    }

    /// Create a solid color texture
    pub fn solid_color(color: [u8; 4], name: &str) -> Self {
        Self {
            width: 1,
            height: 1,
            format: TextureFormat::Rgba8Unorm,
            data: color.to_vec(),
            name: name.to_string(),
        }
    }

    /// Create a default white texture
    pub fn white() -> Self {
        Self::solid_color([255, 255, 255, 255], "white")
    }

    /// Create a checkerboard texture with 8 pixel cells
    pub fn checkerboard(size: u32, color1: [u8; 4], color2: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity((size * size * 4) as usize);

        for y in 0..size {
            for x in 0..size {
                let is_even = ((x / 8) + (y / 8)) % 2 == 0;
                let color = if is_even { color1 } else { color2 };
                data.extend_from_slice(&color);
            }
        }

        Self {
            width: size,
            height: size,
            format: TextureFormat::Rgba8Unorm,
            data,
            name: "checkerboard".to_string(),
        }
    }
}

/// CPU-side texture descriptor
///
/// Sampled textures carry per-layer data; render targets carry none and are
/// only allocated on the GPU. Any change bumps `version`.
#[derive(Debug, Clone)]
pub struct Texture {
    name: String,
    kind: TextureDimension,
    format: TextureFormat,
    width: u32,
    height: u32,
    data: Vec<Option<Vec<u8>>>,
    pub filter: FilterMode,
    pub wrap: AddressMode,
    version: u64,
}

impl Texture {
    /// A 2D texture without CPU data, usable as a render target
    pub fn new_2d(name: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        Self::with_kind(name, TextureDimension::D2, width, height, format)
    }

    /// A cube texture with six square faces
    pub fn cube(name: &str, size: u32, format: TextureFormat) -> Self {
        Self::with_kind(name, TextureDimension::Cube, size, size, format)
    }

    fn with_kind(name: &str, kind: TextureDimension, width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            name: name.to_string(),
            kind,
            format,
            width,
            height,
            data: vec![None; kind.layer_count() as usize],
            filter: FilterMode::Linear,
            wrap: AddressMode::Repeat,
            version: 1,
        }
    }

    /// A 2D texture initialized from loaded data
    pub fn from_data(data: TextureData) -> Result<Self, TextureError> {
        let mut texture = Self::new_2d(&data.name, data.width, data.height, data.format);
        texture.set_data(0, data.data)?;
        Ok(texture)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> TextureDimension {
        self.kind
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn layer_data(&self, layer: u32) -> Option<&[u8]> {
        self.data.get(layer as usize).and_then(|d| d.as_deref())
    }

    pub fn with_sampler(mut self, filter: FilterMode, wrap: AddressMode) -> Self {
        self.filter = filter;
        self.wrap = wrap;
        self
    }

    /// Replace the texels of one layer
    pub fn set_data(&mut self, layer: u32, data: Vec<u8>) -> Result<(), TextureError> {
        let layers = self.kind.layer_count();
        if layer >= layers {
            return Err(TextureError::Layer { layer, layers });
        }
        if self.width == 0 || self.height == 0 {
            return Err(TextureError::ZeroSize(self.name.clone()));
        }
        let expected = (self.width * self.height * self.format.bytes_per_pixel()) as usize;
        if data.len() != expected {
            return Err(TextureError::DataSize {
                expected,
                actual: data.len(),
            });
        }
        self.data[layer as usize] = Some(data);
        self.version += 1;
        Ok(())
    }

    /// Change the size; CPU data no longer matches and is dropped
    pub(crate) fn resize(&mut self, width: u32, height: u32) {
        if self.width == width && self.height == height {
            return;
        }
        self.width = width;
        self.height = match self.kind {
            TextureDimension::Cube => width,
            TextureDimension::D2 => height,
        };
        self.data.iter_mut().for_each(|d| *d = None);
        self.version += 1;
    }

    /// GPU descriptor for this texture
    pub fn descriptor(&self) -> TextureDescriptor {
        let usage = if self.format.is_depth() {
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING
        } else {
            TextureUsage::RENDER_ATTACHMENT | TextureUsage::TEXTURE_BINDING | TextureUsage::COPY_DST
        };
        TextureDescriptor {
            label: Some(self.name.clone()),
            width: self.width,
            height: self.height,
            dimension: self.kind,
            mip_levels: 1,
            format: self.format,
            usage,
        }
    }

    pub fn sampler_descriptor(&self) -> SamplerDescriptor {
        SamplerDescriptor {
            label: Some(format!("{} sampler", self.name)),
            ..SamplerDescriptor::new(self.filter, self.wrap)
        }
    }
}
