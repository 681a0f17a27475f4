use crate::api::types::*;
use crate::format::{get_image_format, ImageFormat};
use crate::target::{get_image_target, ImageTarget};
use std::cmp::max;
use std::ops::{Index, IndexMut};

/// Up to four dimensions of an image or grid. Unused dimensions are 1.
///
/// For multisample targets `x` is the number of samples.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct ImageExtent {
    pub x: u32,
    pub y: u32,
    pub z: u32,
    pub w: u32,
}

impl ImageExtent {
    pub fn new(x: u32, y: u32, z: u32, w: u32) -> ImageExtent {
        ImageExtent { x, y, z, w }
    }

    pub fn from_array(v: [u32; 4]) -> ImageExtent {
        ImageExtent::new(v[0], v[1], v[2], v[3])
    }

    pub fn to_array(self) -> [u32; 4] {
        [self.x, self.y, self.z, self.w]
    }

    /// Number of elements. Panics if it does not fit in a `u32`; driver limits can
    /// exceed that, use `is_empty` to test them.
    pub fn product(&self) -> u32 {
        self.x
            .checked_mul(self.y)
            .and_then(|p| p.checked_mul(self.z))
            .and_then(|p| p.checked_mul(self.w))
            .unwrap_or_else(|| panic!("extent {:?} has more than 2^32 elements", self))
    }

    /// True if any dimension is 0.
    pub fn is_empty(&self) -> bool {
        self.x == 0 || self.y == 0 || self.z == 0 || self.w == 0
    }
}

impl Index<usize> for ImageExtent {
    type Output = u32;

    fn index(&self, i: usize) -> &u32 {
        match i {
            0 => &self.x,
            1 => &self.y,
            2 => &self.z,
            3 => &self.w,
            _ => panic!("extent index out of range: {}", i),
        }
    }
}

impl IndexMut<usize> for ImageExtent {
    fn index_mut(&mut self, i: usize) -> &mut u32 {
        match i {
            0 => &mut self.x,
            1 => &mut self.y,
            2 => &mut self.z,
            3 => &mut self.w,
            _ => panic!("extent index out of range: {}", i),
        }
    }
}

//--------------------------------------------------------------------------------------------------

/// One concrete image: target, storage format, native extent and comparison tolerance.
#[derive(Copy, Clone, Debug)]
pub struct ImageInfo {
    pub target: &'static ImageTarget,
    pub format: &'static ImageFormat,
    pub size: ImageExtent,
    pub epsilon: [f64; 4],
}

impl ImageInfo {
    /// Image holding one pixel per cell of a `w×h` grid, shaped for `target`.
    pub fn new(
        target: &'static ImageTarget,
        format: &'static ImageFormat,
        w: u32,
        h: u32,
    ) -> ImageInfo {
        ImageInfo::with_size(target, format, target.extent_for_grid(w, h))
    }

    pub fn with_size(
        target: &'static ImageTarget,
        format: &'static ImageFormat,
        size: ImageExtent,
    ) -> ImageInfo {
        ImageInfo {
            target,
            format,
            size,
            epsilon: format.epsilon(),
        }
    }

    /// Same as `new`, by enum. `None` if either enum is unknown.
    pub fn from_enums(target: GLenum, format: GLenum, w: u32, h: u32) -> Option<ImageInfo> {
        Some(ImageInfo::new(
            get_image_target(target)?,
            get_image_format(format)?,
            w,
            h,
        ))
    }

    pub fn num_samples(&self) -> u32 {
        if self.target.is_multisample() {
            self.size.x
        } else {
            1
        }
    }

    /// Number of layers (or faces) of the image, 1 for non-layered targets.
    pub fn num_layers(&self) -> u32 {
        use crate::api as gl;
        match self.target.target {
            gl::TEXTURE_1D_ARRAY => self.size.y,
            gl::TEXTURE_3D
            | gl::TEXTURE_CUBE_MAP
            | gl::TEXTURE_2D_ARRAY
            | gl::TEXTURE_CUBE_MAP_ARRAY => self.size.z,
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => self.size.w,
            _ => 1,
        }
    }

    /// Number of levels of a full mipmap pyramid.
    pub fn num_levels(&self) -> u32 {
        let d = self.target.mipmapping_dimensions();
        let largest = (0..d).map(|i| self.size[i]).max().unwrap_or(1);
        32 - max(largest, 1).leading_zeros()
    }

    /// Extent of mipmap level `l`.
    pub fn level_size(&self, l: u32) -> ImageExtent {
        let mut size = self.size;
        for i in 0..self.target.mipmapping_dimensions() {
            size[i] = max(size[i] >> l, 1);
        }
        size
    }

    /// Offset of level `l` in a flat buffer holding all levels back to back, in pixels.
    pub fn level_offset(&self, l: u32) -> u32 {
        (0..l).map(|i| self.level_size(i).product()).sum()
    }

    /// Inverse of the linear pixel index: position in the native extent.
    pub fn address(&self, index: u32) -> [u32; 4] {
        let mut coord = [0; 4];
        let mut n = index;
        for (i, c) in coord.iter_mut().enumerate() {
            let d = max(self.size[i], 1);
            if i == 3 {
                *c = n;
            } else {
                *c = n % d;
                n /= d;
            }
        }
        coord
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api as gl;

    fn image(target: GLenum, size: ImageExtent) -> ImageInfo {
        ImageInfo::with_size(
            get_image_target(target).unwrap(),
            get_image_format(gl::RGBA8).unwrap(),
            size,
        )
    }

    #[test]
    fn empty_extents() {
        assert!(ImageExtent::new(4, 0, 1, 1).is_empty());
        assert!(!ImageExtent::new(16384, 16384, 2048, 1).is_empty());
        assert_eq!(ImageExtent::new(16, 96, 1, 1).product(), 1536);
    }

    #[test]
    #[should_panic(expected = "more than 2^32 elements")]
    fn product_overflow_panics() {
        ImageExtent::new(2048, 2048, 2048, 1).product();
    }

    #[test]
    fn levels_of_2d_image() {
        let img = image(gl::TEXTURE_2D, ImageExtent::new(16, 8, 1, 1));
        assert_eq!(img.num_levels(), 5);
        assert_eq!(img.level_size(0), ImageExtent::new(16, 8, 1, 1));
        assert_eq!(img.level_size(1), ImageExtent::new(8, 4, 1, 1));
        assert_eq!(img.level_size(4), ImageExtent::new(1, 1, 1, 1));
        assert_eq!(img.level_offset(0), 0);
        assert_eq!(img.level_offset(1), 128);
        assert_eq!(img.level_offset(2), 160);
        assert_eq!(img.level_offset(5), 128 + 32 + 8 + 2 + 1);
    }

    #[test]
    fn array_layers_do_not_shrink() {
        let img = image(gl::TEXTURE_2D_ARRAY, ImageExtent::new(8, 8, 3, 1));
        assert_eq!(img.num_layers(), 3);
        assert_eq!(img.num_levels(), 4);
        assert_eq!(img.level_size(2), ImageExtent::new(2, 2, 3, 1));

        let img = image(gl::TEXTURE_1D_ARRAY, ImageExtent::new(8, 5, 1, 1));
        assert_eq!(img.num_layers(), 5);
        assert_eq!(img.level_size(3), ImageExtent::new(1, 5, 1, 1));
    }

    #[test]
    fn multisample_images_have_one_level() {
        let img = image(gl::TEXTURE_2D_MULTISAMPLE_ARRAY, ImageExtent::new(4, 8, 8, 2));
        assert_eq!(img.num_samples(), 4);
        assert_eq!(img.num_layers(), 2);
        assert_eq!(img.num_levels(), 1);
        assert_eq!(img.level_size(3), img.size);
    }

    #[test]
    fn address_decomposes_linear_index() {
        let img = image(gl::TEXTURE_2D_ARRAY, ImageExtent::new(16, 96, 1, 1));
        assert_eq!(img.address(163), [3, 10, 0, 0]);

        let img = image(gl::TEXTURE_3D, ImageExtent::new(4, 4, 4, 1));
        assert_eq!(img.address(4 * 4 * 2 + 4 + 3), [3, 1, 2, 0]);
    }
}
