//! Storage formats usable with image load/store.
use crate::api::{self as gl, types::*};
use fxhash::FxHashMap;
use lazy_static::lazy_static;

/// Representation of a channel on the shader side.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum BaseType {
    Float,
    Int,
    Uint,
}

/// How the channels of a format are stored.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ChannelKind {
    Float,
    Unorm,
    Snorm,
    Int,
    Uint,
}

//--------------------------------------------------------------------------------------------------

/// Static description of an image storage format.
#[derive(Debug)]
pub struct ImageFormat {
    /// GLSL layout qualifier name (`rgba32f`).
    pub name: &'static str,
    /// Internal format enum.
    pub format: GLenum,
    /// Client-side pixel format of the packed representation.
    pub pixel_format: GLenum,
    /// Client-side pixel type of the packed representation.
    pub pixel_type: GLenum,
    /// Bits per channel, zero for absent channels.
    pub bits: [u32; 4],
}

macro_rules! image_format {
    ($name:expr, $format:ident, $pixel_format:ident, $pixel_type:ident, $bits:expr) => {
        ImageFormat {
            name: $name,
            format: gl::$format,
            pixel_format: gl::$pixel_format,
            pixel_type: gl::$pixel_type,
            bits: $bits,
        }
    };
}

/// All formats supported by image load/store.
pub static IMAGE_FORMATS_LOAD_STORE: [ImageFormat; 39] = [
    image_format!("rgba32f", RGBA32F, RGBA, FLOAT, [32, 32, 32, 32]),
    image_format!("rgba16f", RGBA16F, RGBA, HALF_FLOAT, [16, 16, 16, 16]),
    image_format!("rg32f", RG32F, RG, FLOAT, [32, 32, 0, 0]),
    image_format!("rg16f", RG16F, RG, HALF_FLOAT, [16, 16, 0, 0]),
    image_format!(
        "r11f_g11f_b10f",
        R11F_G11F_B10F,
        RGB,
        UNSIGNED_INT_10F_11F_11F_REV,
        [11, 11, 10, 0]
    ),
    image_format!("r32f", R32F, RED, FLOAT, [32, 0, 0, 0]),
    image_format!("r16f", R16F, RED, HALF_FLOAT, [16, 0, 0, 0]),
    image_format!("rgba32ui", RGBA32UI, RGBA_INTEGER, UNSIGNED_INT, [32, 32, 32, 32]),
    image_format!("rgba16ui", RGBA16UI, RGBA_INTEGER, UNSIGNED_SHORT, [16, 16, 16, 16]),
    image_format!(
        "rgb10_a2ui",
        RGB10_A2UI,
        RGBA_INTEGER,
        UNSIGNED_INT_2_10_10_10_REV,
        [10, 10, 10, 2]
    ),
    image_format!("rgba8ui", RGBA8UI, RGBA_INTEGER, UNSIGNED_BYTE, [8, 8, 8, 8]),
    image_format!("rg32ui", RG32UI, RG_INTEGER, UNSIGNED_INT, [32, 32, 0, 0]),
    image_format!("rg16ui", RG16UI, RG_INTEGER, UNSIGNED_SHORT, [16, 16, 0, 0]),
    image_format!("rg8ui", RG8UI, RG_INTEGER, UNSIGNED_BYTE, [8, 8, 0, 0]),
    image_format!("r32ui", R32UI, RED_INTEGER, UNSIGNED_INT, [32, 0, 0, 0]),
    image_format!("r16ui", R16UI, RED_INTEGER, UNSIGNED_SHORT, [16, 0, 0, 0]),
    image_format!("r8ui", R8UI, RED_INTEGER, UNSIGNED_BYTE, [8, 0, 0, 0]),
    image_format!("rgba32i", RGBA32I, RGBA_INTEGER, INT, [32, 32, 32, 32]),
    image_format!("rgba16i", RGBA16I, RGBA_INTEGER, SHORT, [16, 16, 16, 16]),
    image_format!("rgba8i", RGBA8I, RGBA_INTEGER, BYTE, [8, 8, 8, 8]),
    image_format!("rg32i", RG32I, RG_INTEGER, INT, [32, 32, 0, 0]),
    image_format!("rg16i", RG16I, RG_INTEGER, SHORT, [16, 16, 0, 0]),
    image_format!("rg8i", RG8I, RG_INTEGER, BYTE, [8, 8, 0, 0]),
    image_format!("r32i", R32I, RED_INTEGER, INT, [32, 0, 0, 0]),
    image_format!("r16i", R16I, RED_INTEGER, SHORT, [16, 0, 0, 0]),
    image_format!("r8i", R8I, RED_INTEGER, BYTE, [8, 0, 0, 0]),
    image_format!("rgba16", RGBA16, RGBA, UNSIGNED_SHORT, [16, 16, 16, 16]),
    image_format!(
        "rgb10_a2",
        RGB10_A2,
        RGBA,
        UNSIGNED_INT_2_10_10_10_REV,
        [10, 10, 10, 2]
    ),
    image_format!("rgba8", RGBA8, RGBA, UNSIGNED_BYTE, [8, 8, 8, 8]),
    image_format!("rg16", RG16, RG, UNSIGNED_SHORT, [16, 16, 0, 0]),
    image_format!("rg8", RG8, RG, UNSIGNED_BYTE, [8, 8, 0, 0]),
    image_format!("r16", R16, RED, UNSIGNED_SHORT, [16, 0, 0, 0]),
    image_format!("r8", R8, RED, UNSIGNED_BYTE, [8, 0, 0, 0]),
    image_format!("rgba16_snorm", RGBA16_SNORM, RGBA, SHORT, [16, 16, 16, 16]),
    image_format!("rgba8_snorm", RGBA8_SNORM, RGBA, BYTE, [8, 8, 8, 8]),
    image_format!("rg16_snorm", RG16_SNORM, RG, SHORT, [16, 16, 0, 0]),
    image_format!("rg8_snorm", RG8_SNORM, RG, BYTE, [8, 8, 0, 0]),
    image_format!("r16_snorm", R16_SNORM, RED, SHORT, [16, 0, 0, 0]),
    image_format!("r8_snorm", R8_SNORM, RED, BYTE, [8, 0, 0, 0]),
];

lazy_static! {
    static ref FORMATS_BY_ENUM: FxHashMap<GLenum, &'static ImageFormat> = IMAGE_FORMATS_LOAD_STORE
        .iter()
        .map(|f| (f.format, f))
        .collect();
}

/// Looks up a format by internal format enum.
///
/// `None` means the format is not usable with image load/store, the caller should
/// skip the test.
pub fn get_image_format(format: GLenum) -> Option<&'static ImageFormat> {
    FORMATS_BY_ENUM.get(&format).cloned()
}

pub fn get_image_format_by_name(name: &str) -> Option<&'static ImageFormat> {
    IMAGE_FORMATS_LOAD_STORE.iter().find(|f| f.name == name)
}

fn expect_format(format: GLenum) -> &'static ImageFormat {
    get_image_format(format).expect("format missing from the load/store table")
}

impl ImageFormat {
    fn is_integer(&self) -> bool {
        match self.pixel_format {
            gl::RED_INTEGER | gl::RG_INTEGER | gl::RGB_INTEGER | gl::RGBA_INTEGER => true,
            _ => false,
        }
    }

    fn is_signed_type(&self) -> bool {
        match self.pixel_type {
            gl::BYTE | gl::SHORT | gl::INT => true,
            _ => false,
        }
    }

    pub fn channel_kind(&self) -> ChannelKind {
        match self.pixel_type {
            gl::FLOAT | gl::HALF_FLOAT | gl::UNSIGNED_INT_10F_11F_11F_REV => ChannelKind::Float,
            _ if self.is_integer() && self.is_signed_type() => ChannelKind::Int,
            _ if self.is_integer() => ChannelKind::Uint,
            _ if self.is_signed_type() => ChannelKind::Snorm,
            _ => ChannelKind::Unorm,
        }
    }

    pub fn base_type(&self) -> BaseType {
        match self.channel_kind() {
            ChannelKind::Int => BaseType::Int,
            ChannelKind::Uint => BaseType::Uint,
            _ => BaseType::Float,
        }
    }

    /// Client-side type used to transfer unpacked pixel data (one 32-bit word per channel).
    pub fn base_pixel_type(&self) -> GLenum {
        match self.base_type() {
            BaseType::Float => gl::FLOAT,
            BaseType::Int => gl::INT,
            BaseType::Uint => gl::UNSIGNED_INT,
        }
    }

    /// The 4-channel 32-bit format with the same base type.
    pub fn base_format(&self) -> &'static ImageFormat {
        match self.base_type() {
            BaseType::Float => expect_format(gl::RGBA32F),
            BaseType::Int => expect_format(gl::RGBA32I),
            BaseType::Uint => expect_format(gl::RGBA32UI),
        }
    }

    pub fn num_components(&self) -> usize {
        self.bits.iter().take_while(|&&b| b != 0).count()
    }

    /// Size of a packed pixel, in bits.
    pub fn pixel_size(&self) -> u32 {
        self.bits.iter().sum()
    }

    /// Same-size unsigned integer format, used to reinterpret the raw bits of an image.
    pub fn compat_format(&self) -> &'static ImageFormat {
        match self.pixel_size() {
            128 => expect_format(gl::RGBA32UI),
            64 => expect_format(gl::RG32UI),
            32 => expect_format(gl::R32UI),
            16 => expect_format(gl::R16UI),
            8 => expect_format(gl::R8UI),
            bits => panic!("no compatible format with {} bits per pixel", bits),
        }
    }

    /// GLSL type prefix of samplers and images (`""`, `"i"` or `"u"`).
    pub fn glsl_type_prefix(&self) -> &'static str {
        match self.base_type() {
            BaseType::Float => "",
            BaseType::Int => "i",
            BaseType::Uint => "u",
        }
    }

    pub fn scalar_type_name(&self) -> &'static str {
        match self.base_type() {
            BaseType::Float => "float",
            BaseType::Int => "int",
            BaseType::Uint => "uint",
        }
    }

    pub fn vector_type_name(&self) -> &'static str {
        match self.base_type() {
            BaseType::Float => "vec4",
            BaseType::Int => "ivec4",
            BaseType::Uint => "uvec4",
        }
    }

    /// `image`, `iimage` or `uimage`.
    pub fn image_type_name(&self) -> String {
        format!("{}image", self.glsl_type_prefix())
    }

    /// Largest magnitude representable in each channel, zero for absent channels.
    pub fn scale(&self) -> [f64; 4] {
        let mut v = [0.0; 4];
        for (s, &bits) in v.iter_mut().zip(self.bits.iter()) {
            if bits == 0 {
                continue;
            }
            *s = match self.channel_kind() {
                ChannelKind::Float | ChannelKind::Unorm | ChannelKind::Snorm => 1.0,
                ChannelKind::Uint => 2f64.powi(bits as i32) - 1.0,
                ChannelKind::Int => 2f64.powi(bits as i32 - 1) - 1.0,
            };
        }
        v
    }

    fn fraction_bits(&self, bits: u32) -> u32 {
        match self.channel_kind() {
            ChannelKind::Unorm => bits,
            ChannelKind::Snorm => bits - 1,
            ChannelKind::Float => match bits {
                32 => 23,
                16 => 10,
                11 => 6,
                10 => 5,
                _ => unreachable!("unexpected float channel size {}", bits),
            },
            ChannelKind::Int | ChannelKind::Uint => 0,
        }
    }

    /// Per-channel comparison tolerance. Integer formats compare exactly.
    pub fn epsilon(&self) -> [f64; 4] {
        let mut v = [0.0; 4];
        for (e, &bits) in v.iter_mut().zip(self.bits.iter()) {
            if bits == 0 {
                continue;
            }
            *e = match self.channel_kind() {
                ChannelKind::Int | ChannelKind::Uint => 0.0,
                _ => 2f64.powi(-(self.fraction_bits(bits) as i32)),
            };
        }
        v
    }

    /// Encodes a value as one 32-bit word of the base type.
    pub fn encode(&self, x: f64) -> u32 {
        match self.base_type() {
            BaseType::Float => (x as f32).to_bits(),
            BaseType::Int => (x as i32) as u32,
            BaseType::Uint => x as u32,
        }
    }

    pub fn decode(&self, x: u32) -> f64 {
        match self.base_type() {
            BaseType::Float => f64::from(f32::from_bits(x)),
            BaseType::Int => f64::from(x as i32),
            BaseType::Uint => f64::from(x),
        }
    }
}
