//! Texture targets usable with image load/store.
use crate::api::{self as gl, types::*};
use crate::extent::ImageExtent;

/// Static description of one texture target.
#[derive(Debug)]
pub struct ImageTarget {
    /// Suffix of the GLSL image type (`image2DArray` -> `2DArray`).
    pub name: &'static str,
    pub target: GLenum,
    /// GLSL type of image coordinates.
    pub addr_type_name: &'static str,
}

pub static IMAGE_TARGETS: [ImageTarget; 11] = [
    ImageTarget {
        name: "1D",
        target: gl::TEXTURE_1D,
        addr_type_name: "int",
    },
    ImageTarget {
        name: "2D",
        target: gl::TEXTURE_2D,
        addr_type_name: "ivec2",
    },
    ImageTarget {
        name: "3D",
        target: gl::TEXTURE_3D,
        addr_type_name: "ivec3",
    },
    ImageTarget {
        name: "2DRect",
        target: gl::TEXTURE_RECTANGLE,
        addr_type_name: "ivec2",
    },
    ImageTarget {
        name: "Cube",
        target: gl::TEXTURE_CUBE_MAP,
        addr_type_name: "ivec3",
    },
    ImageTarget {
        name: "Buffer",
        target: gl::TEXTURE_BUFFER,
        addr_type_name: "int",
    },
    ImageTarget {
        name: "1DArray",
        target: gl::TEXTURE_1D_ARRAY,
        addr_type_name: "ivec2",
    },
    ImageTarget {
        name: "2DArray",
        target: gl::TEXTURE_2D_ARRAY,
        addr_type_name: "ivec3",
    },
    ImageTarget {
        name: "CubeArray",
        target: gl::TEXTURE_CUBE_MAP_ARRAY,
        addr_type_name: "ivec3",
    },
    ImageTarget {
        name: "2DMS",
        target: gl::TEXTURE_2D_MULTISAMPLE,
        addr_type_name: "ivec2",
    },
    ImageTarget {
        name: "2DMSArray",
        target: gl::TEXTURE_2D_MULTISAMPLE_ARRAY,
        addr_type_name: "ivec3",
    },
];

pub fn get_image_target(target: GLenum) -> Option<&'static ImageTarget> {
    IMAGE_TARGETS.iter().find(|t| t.target == target)
}

fn expect_target(target: GLenum) -> &'static ImageTarget {
    get_image_target(target).expect("target missing from the load/store table")
}

impl ImageTarget {
    /// Number of components of the image coordinate vector.
    pub fn address_dimensions(&self) -> usize {
        match self.addr_type_name {
            "int" => 1,
            "ivec2" => 2,
            "ivec3" => 3,
            other => unreachable!("unexpected address type {}", other),
        }
    }

    pub fn is_multisample(&self) -> bool {
        match self.target {
            gl::TEXTURE_2D_MULTISAMPLE | gl::TEXTURE_2D_MULTISAMPLE_ARRAY => true,
            _ => false,
        }
    }

    /// Number of leading extent dimensions that shrink with each mipmap level.
    pub fn mipmapping_dimensions(&self) -> usize {
        match self.target {
            gl::TEXTURE_1D | gl::TEXTURE_1D_ARRAY => 1,
            gl::TEXTURE_2D | gl::TEXTURE_CUBE_MAP | gl::TEXTURE_2D_ARRAY
            | gl::TEXTURE_CUBE_MAP_ARRAY => 2,
            gl::TEXTURE_3D => 3,
            _ => 0,
        }
    }

    /// Target of a single layer (or face) of an image of this target, for targets
    /// that can be bound non-layered.
    pub fn layer_target(&self) -> Option<&'static ImageTarget> {
        match self.target {
            gl::TEXTURE_1D_ARRAY => Some(expect_target(gl::TEXTURE_1D)),
            gl::TEXTURE_3D
            | gl::TEXTURE_CUBE_MAP
            | gl::TEXTURE_2D_ARRAY
            | gl::TEXTURE_CUBE_MAP_ARRAY => Some(expect_target(gl::TEXTURE_2D)),
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => Some(expect_target(gl::TEXTURE_2D_MULTISAMPLE)),
            _ => None,
        }
    }

    /// Shapes a `w×h` grid into the native extent of this target.
    ///
    /// The product of the extent is `w * h` as long as the caller respects the
    /// target's constraints: cube maps need `h == 6 * w`, cube map arrays need `h`
    /// to be a multiple of `6 * w`, multisample targets need an even `w` (and an
    /// even `h` for arrays), otherwise they fall back to a single sample. A grid of
    /// width 0 gives an empty extent.
    pub fn extent_for_grid(&self, w: u32, h: u32) -> ImageExtent {
        match self.target {
            gl::TEXTURE_1D | gl::TEXTURE_BUFFER => ImageExtent::new(w * h, 1, 1, 1),
            gl::TEXTURE_2D | gl::TEXTURE_RECTANGLE | gl::TEXTURE_1D_ARRAY => {
                ImageExtent::new(w, h, 1, 1)
            }
            gl::TEXTURE_3D | gl::TEXTURE_2D_ARRAY => {
                if w > 0 && h % w == 0 {
                    ImageExtent::new(w, w, h / w, 1)
                } else {
                    ImageExtent::new(w, h, 1, 1)
                }
            }
            gl::TEXTURE_CUBE_MAP | gl::TEXTURE_CUBE_MAP_ARRAY => {
                if w > 0 {
                    ImageExtent::new(w, w, h / w, 1)
                } else {
                    ImageExtent::new(0, 0, 1, 1)
                }
            }
            gl::TEXTURE_2D_MULTISAMPLE => {
                if w % 2 == 0 {
                    ImageExtent::new(2, w / 2, h, 1)
                } else {
                    ImageExtent::new(1, w, h, 1)
                }
            }
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => {
                if w % 2 == 0 && h % 2 == 0 {
                    ImageExtent::new(2, w / 2, h / 2, 2)
                } else {
                    ImageExtent::new(1, w, h, 1)
                }
            }
            other => unreachable!("unknown image target 0x{:04x}", other),
        }
    }
}
