//! Moving pixel data in and out of images of every target.
//!
//! Pixel data is always unpacked: one 32-bit word per channel, in the base type of
//! the image format, levels stored back to back (see `ImageInfo::level_offset`).
use crate::api::{self as gl, types::*, Gl};
use crate::context::Harness;
use crate::error::{check_gl, Error, Result};
use crate::extent::{ImageExtent, ImageInfo};
use crate::format::ImageFormat;
use crate::framebuffer::Framebuffer;
use crate::grid::GridInfo;
use crate::shader::{image_hunk, SourceBuilder};
use crate::stage::StageFlags;
use crate::target::get_image_target;
use std::cmp::min;

fn words_per_pixel(img: &ImageInfo) -> usize {
    img.format.num_components()
}

/// Number of words holding level `level` of `img`.
fn level_words(img: &ImageInfo, level: u32) -> usize {
    img.level_size(level).product() as usize * words_per_pixel(img)
}

fn level_range(img: &ImageInfo, level: u32) -> std::ops::Range<usize> {
    let start = img.level_offset(level) as usize * words_per_pixel(img);
    start..start + level_words(img, level)
}

fn image_2d(format: &'static ImageFormat, w: u32, h: u32) -> ImageInfo {
    let target = get_image_target(gl::TEXTURE_2D).expect("2D target missing from the table");
    ImageInfo::with_size(target, format, ImageExtent::new(w, h, 1, 1))
}

/// Runs `f` with `param` temporarily set to `value`.
unsafe fn with_pixel_store<R>(gl: &Gl, param: GLenum, value: GLint, f: impl FnOnce() -> R) -> R {
    let mut prev = 0;
    gl.GetIntegerv(param, &mut prev);
    gl.PixelStorei(param, value);
    let r = f();
    gl.PixelStorei(param, prev);
    r
}

/// Creates immutable storage for `img` with `num_levels` levels. Not for buffer images.
pub(crate) fn create_texture(gl: &Gl, img: &ImageInfo, num_levels: u32) -> Result<GLuint> {
    let fmt = img.format.format;
    let levels = num_levels as GLsizei;
    let s = img.size;
    let (x, y, z, w) = (s.x as GLsizei, s.y as GLsizei, s.z as GLsizei, s.w as GLsizei);
    let mut obj = 0;
    unsafe {
        gl.CreateTextures(img.target.target, 1, &mut obj);
        match img.target.target {
            gl::TEXTURE_1D => gl.TextureStorage1D(obj, levels, fmt, x),
            gl::TEXTURE_2D
            | gl::TEXTURE_RECTANGLE
            | gl::TEXTURE_1D_ARRAY
            | gl::TEXTURE_CUBE_MAP => {
                gl.TextureStorage2D(obj, levels, fmt, x, y)
            }
            gl::TEXTURE_3D | gl::TEXTURE_2D_ARRAY | gl::TEXTURE_CUBE_MAP_ARRAY => {
                gl.TextureStorage3D(obj, levels, fmt, x, y, z)
            }
            gl::TEXTURE_2D_MULTISAMPLE => {
                gl.TextureStorage2DMultisample(obj, x, fmt, y, z, gl::TRUE)
            }
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => {
                gl.TextureStorage3DMultisample(obj, x, fmt, y, z, w, gl::TRUE)
            }
            other => unreachable!("no texture storage for target 0x{:04x}", other),
        }

        if !img.target.is_multisample() {
            gl.TextureParameteri(obj, gl::TEXTURE_MIN_FILTER, gl::NEAREST as GLint);
            gl.TextureParameteri(obj, gl::TEXTURE_MAG_FILTER, gl::NEAREST as GLint);
        }
    }

    if let Err(e) = check_gl(gl, "glTextureStorage") {
        unsafe {
            gl.DeleteTextures(1, &obj);
        }
        return Err(e);
    }
    Ok(obj)
}

/// Uploads one level of unpacked pixel data. Cube faces are the `z` dimension.
fn set_texture_level(gl: &Gl, tex: GLuint, img: &ImageInfo, level: u32, data: &[u32]) {
    assert_eq!(data.len(), level_words(img, level), "pixel data size mismatch");
    let s = img.level_size(level);
    let (x, y, z) = (s.x as GLsizei, s.y as GLsizei, s.z as GLsizei);
    let (format, ty) = (img.format.pixel_format, img.format.base_pixel_type());
    let level = level as GLint;
    let ptr = data.as_ptr() as *const GLvoid;
    unsafe {
        match img.target.target {
            gl::TEXTURE_1D => gl.TextureSubImage1D(tex, level, 0, x, format, ty, ptr),
            gl::TEXTURE_2D | gl::TEXTURE_RECTANGLE | gl::TEXTURE_1D_ARRAY => {
                gl.TextureSubImage2D(tex, level, 0, 0, x, y, format, ty, ptr)
            }
            gl::TEXTURE_3D
            | gl::TEXTURE_CUBE_MAP
            | gl::TEXTURE_2D_ARRAY
            | gl::TEXTURE_CUBE_MAP_ARRAY => {
                gl.TextureSubImage3D(tex, level, 0, 0, 0, x, y, z, format, ty, ptr)
            }
            other => unreachable!("no direct upload for target 0x{:04x}", other),
        }
    }
}

/// Reads back one level of `tex` as unpacked pixel data laid out as `img`.
pub(crate) fn get_texture_level(
    gl: &Gl,
    tex: GLuint,
    img: &ImageInfo,
    level: u32,
) -> Result<Vec<u32>> {
    let mut data = vec![0u32; level_words(img, level)];
    unsafe {
        gl.GetTextureImage(
            tex,
            level as GLint,
            img.format.pixel_format,
            img.format.base_pixel_type(),
            (data.len() * 4) as GLsizei,
            data.as_mut_ptr() as *mut GLvoid,
        );
    }
    check_gl(gl, "glGetTextureImage")?;
    Ok(data)
}

fn bind_image(gl: &Gl, unit: u32, tex: GLuint, level: u32, format: &ImageFormat) -> Result<()> {
    unsafe {
        gl.BindImageTexture(
            unit,
            tex,
            level as GLint,
            gl::TRUE,
            0,
            gl::READ_WRITE,
            format.format,
        );
    }
    check_gl(gl, "glBindImageTexture")
}

/// Size in bytes of the packed contents of `img`.
fn packed_size(img: &ImageInfo) -> usize {
    img.size.product() as usize * img.format.pixel_size() as usize / 8
}

/// 2D shape holding `n` pixels, at most `max_width` wide. The last row may be partial.
fn staging_shape(n: u32, max_width: u32) -> (u32, u32) {
    let w = min(n, max_width).max(1);
    (w, (n + w - 1) / w)
}

/// Grid covering every sample of a multisample image, one invocation per sample.
fn multisample_grid_size(img: &ImageInfo) -> (u32, u32) {
    let s = img.size;
    (s.x * s.y, s.z * s.w)
}

//--------------------------------------------------------------------------------------------------

impl Harness {
    /// Creates `img` with a single level, fills it with `pixels` and binds it to image
    /// unit `unit`, replacing whatever image was there.
    pub fn upload_image(&self, img: &ImageInfo, unit: u32, pixels: &[u32]) -> Result<()> {
        self.upload_image_levels(img, 1, 0, unit, pixels)
    }

    /// Same as `upload_image` for an image with `num_levels` mipmap levels, all stored
    /// in `pixels`. Level `level` is bound to the image unit.
    pub fn upload_image_levels(
        &self,
        img: &ImageInfo,
        num_levels: u32,
        level: u32,
        unit: u32,
        pixels: &[u32],
    ) -> Result<()> {
        let gl = self.gl();
        let needed = img.level_offset(num_levels) as usize * words_per_pixel(img);
        assert!(
            pixels.len() >= needed,
            "{} words of pixel data for an image needing {}",
            pixels.len(),
            needed
        );

        let target = img.target.target;
        if target == gl::TEXTURE_BUFFER || img.target.is_multisample() {
            assert_eq!(num_levels, 1, "{} images have no mipmaps", img.target.name);
        }

        let (tex, buf) = if target == gl::TEXTURE_BUFFER {
            self.upload_buffer(img, &pixels[..needed])?
        } else if img.target.is_multisample() {
            (self.upload_multisample(img, unit, &pixels[..needed])?, 0)
        } else {
            let tex = create_texture(gl, img, num_levels)?;
            for l in 0..num_levels {
                set_texture_level(gl, tex, img, l, &pixels[level_range(img, l)]);
            }
            if let Err(e) = check_gl(gl, "glTextureSubImage") {
                unsafe {
                    gl.DeleteTextures(1, &tex);
                }
                return Err(e);
            }
            (tex, 0)
        };

        self.set_image(unit, tex, buf);
        debug!(
            "uploaded {} {} image {:?} ({} levels) to unit {}",
            img.format.name, img.target.name, img.size, num_levels, unit
        );
        bind_image(gl, unit, tex, level, img.format)
    }

    /// Reads back the image at `unit`, laid out as `img`.
    pub fn download_image(&self, img: &ImageInfo, unit: u32) -> Result<Vec<u32>> {
        self.download_image_levels(img, 1, unit)
    }

    /// Reads back `num_levels` levels of the image at `unit`, back to back.
    pub fn download_image_levels(
        &self,
        img: &ImageInfo,
        num_levels: u32,
        unit: u32,
    ) -> Result<Vec<u32>> {
        let gl = self.gl();
        let tex = self.texture(unit).ok_or(Error::MissingImage(unit))?;
        self.memory_barrier(gl::ALL_BARRIER_BITS)?;

        if img.target.target == gl::TEXTURE_BUFFER {
            let buf = self.buffer(unit).ok_or(Error::MissingImage(unit))?;
            return self.download_buffer(img, buf);
        }
        if img.target.is_multisample() {
            return self.download_multisample(img, unit, tex);
        }

        let len = img.level_offset(num_levels) as usize * words_per_pixel(img);
        let mut pixels = Vec::with_capacity(len);
        for l in 0..num_levels {
            pixels.extend(get_texture_level(gl, tex, img, l)?);
        }
        Ok(pixels)
    }

    //----------------------------------------------------------------------------------------------

    /// Staging image used to convert between unpacked and packed buffer contents.
    fn buffer_staging_image(&self, img: &ImageInfo) -> ImageInfo {
        let max_width = self.caps_integer(gl::MAX_TEXTURE_SIZE).max(1) as u32;
        let (w, h) = staging_shape(img.size.x, max_width);
        image_2d(img.format, w, h)
    }

    /// Packs `pixels` through a 2D texture and stores them in a new buffer object
    /// backing a buffer texture. Returns the texture and the buffer.
    fn upload_buffer(&self, img: &ImageInfo, pixels: &[u32]) -> Result<(GLuint, GLuint)> {
        let gl = self.gl();
        let fmt = img.format;
        let staging_img = self.buffer_staging_image(img);
        let staging = create_texture(gl, &staging_img, 1)?;

        let mut padded = pixels.to_vec();
        padded.resize(level_words(&staging_img, 0), 0);
        set_texture_level(gl, staging, &staging_img, 0, &padded);

        let mut packed = vec![0u8; packed_size(&staging_img)];
        unsafe {
            with_pixel_store(gl, gl::PACK_ALIGNMENT, 1, || {
                gl.GetTextureImage(
                    staging,
                    0,
                    fmt.pixel_format,
                    fmt.pixel_type,
                    packed.len() as GLsizei,
                    packed.as_mut_ptr() as *mut GLvoid,
                )
            });
            gl.DeleteTextures(1, &staging);
        }
        check_gl(gl, "glGetTextureImage")?;
        packed.truncate(packed_size(img));

        let mut buf = 0;
        let mut tex = 0;
        unsafe {
            gl.CreateBuffers(1, &mut buf);
            gl.NamedBufferStorage(
                buf,
                packed.len() as GLsizeiptr,
                packed.as_ptr() as *const GLvoid,
                0,
            );
            gl.CreateTextures(gl::TEXTURE_BUFFER, 1, &mut tex);
            gl.TextureBuffer(tex, fmt.format, buf);
        }
        match unsafe { gl.GetError() } {
            gl::NO_ERROR => {}
            code => {
                unsafe {
                    gl.DeleteTextures(1, &tex);
                    gl.DeleteBuffers(1, &buf);
                }
                return Err(if code == gl::INVALID_ENUM {
                    Error::Unsupported(format!("{} buffer textures", fmt.name))
                } else {
                    Error::Gl {
                        call: "glTextureBuffer",
                        code,
                    }
                });
            }
        }

        Ok((tex, buf))
    }

    /// Unpacks the contents of buffer `buf` through a 2D texture.
    fn download_buffer(&self, img: &ImageInfo, buf: GLuint) -> Result<Vec<u32>> {
        let gl = self.gl();
        let fmt = img.format;
        let staging_img = self.buffer_staging_image(img);
        let staging = create_texture(gl, &staging_img, 1)?;

        let mut packed = vec![0u8; packed_size(&staging_img)];
        let (w, h) = (staging_img.size.x as GLsizei, staging_img.size.y as GLsizei);
        unsafe {
            gl.GetNamedBufferSubData(
                buf,
                0,
                packed_size(img) as GLsizeiptr,
                packed.as_mut_ptr() as *mut GLvoid,
            );
            with_pixel_store(gl, gl::UNPACK_ALIGNMENT, 1, || {
                gl.TextureSubImage2D(
                    staging,
                    0,
                    0,
                    0,
                    w,
                    h,
                    fmt.pixel_format,
                    fmt.pixel_type,
                    packed.as_ptr() as *const GLvoid,
                )
            });
        }
        let result = check_gl(gl, "glTextureSubImage2D")
            .and_then(|_| get_texture_level(gl, staging, &staging_img, 0));
        unsafe {
            gl.DeleteTextures(1, &staging);
        }
        let mut pixels = result?;
        pixels.truncate(level_words(img, 0));
        Ok(pixels)
    }

    //----------------------------------------------------------------------------------------------

    /// Runs a fragment grid over every sample of `img` with `op`, into `fb`.
    fn run_sample_grid(
        &self,
        img: &ImageInfo,
        op: &str,
        fb: &Framebuffer,
        uniforms: &[(&str, u32)],
    ) -> Result<()> {
        let gl = self.gl();
        let (w, h) = multisample_grid_size(img);
        let grid = GridInfo::new(StageFlags::FRAGMENT, img.format.base_format(), w, h);
        let program = self.generate_program(&grid, &[(StageFlags::FRAGMENT, Some(op))])?;

        let prev = Framebuffer::current(gl);
        fb.bind(gl);
        let result = uniforms
            .iter()
            .try_for_each(|&(name, v)| program.set_uniform_int(gl, name, v as GLint))
            .and_then(|_| self.draw_grid(&grid, &program));
        unsafe {
            gl.BindFramebuffer(gl::FRAMEBUFFER, prev);
        }
        self.delete_program(program);
        result
    }

    /// Fills a multisample image by copying a 2D staging texture sample by sample.
    fn upload_multisample(&self, img: &ImageInfo, unit: u32, pixels: &[u32]) -> Result<GLuint> {
        let gl = self.gl();
        let (w, h) = multisample_grid_size(img);
        let src_img = image_2d(img.format, w, h);
        let staging = create_texture(gl, &image_2d(img.format.base_format(), w, h), 1)?;
        set_texture_level(gl, staging, &src_img, 0, pixels);

        let tex = match create_texture(gl, img, 1) {
            Ok(tex) => tex,
            Err(e) => {
                unsafe {
                    gl.DeleteTextures(1, &staging);
                }
                return Err(e);
            }
        };

        let op = SourceBuilder::new()
            .push(image_hunk(img, ""))
            .push(format!(
                "uniform {}sampler2D src_tex;\n\
                 uniform IMAGE_T dst_img;\n",
                img.format.glsl_type_prefix()
            ))
            .push(
                "GRID_T\n\
                 op(ivec2 idx, GRID_T x) {\n\
                 \x20       imageStore(dst_img, IMAGE_ADDR(idx), IMAGE_SAMPLE(idx),\n\
                 \x20                  DATA_T(texelFetch(src_tex, idx, 0)));\n\
                 \x20       return x;\n\
                 }\n",
            )
            .build();

        let result = (|| {
            check_gl(gl, "glTextureSubImage2D")?;
            bind_image(gl, unit, tex, 0, img.format)?;
            unsafe {
                gl.BindTextureUnit(0, staging);
            }
            let fb = Framebuffer::empty(gl, w, h)?;
            let r = self.run_sample_grid(img, &op, &fb, &[("src_tex", 0), ("dst_img", unit)]);
            fb.destroy(gl);
            r?;
            self.memory_barrier(gl::ALL_BARRIER_BITS)
        })();

        unsafe {
            gl.BindTextureUnit(0, 0);
            gl.DeleteTextures(1, &staging);
        }
        match result {
            Ok(()) => Ok(tex),
            Err(e) => {
                unsafe {
                    gl.DeleteTextures(1, &tex);
                }
                Err(e)
            }
        }
    }

    /// Reads a multisample image sample by sample into the color attachment of a
    /// 2D framebuffer.
    fn download_multisample(&self, img: &ImageInfo, unit: u32, tex: GLuint) -> Result<Vec<u32>> {
        let gl = self.gl();
        let (w, h) = multisample_grid_size(img);
        bind_image(gl, unit, tex, 0, img.format)?;

        let op = SourceBuilder::new()
            .push(image_hunk(img, ""))
            .push("uniform IMAGE_T src_img;\n")
            .push(
                "GRID_T\n\
                 op(ivec2 idx, GRID_T x) {\n\
                 \x20       return GRID_T(imageLoad(src_img, IMAGE_ADDR(idx), IMAGE_SAMPLE(idx)));\n\
                 }\n",
            )
            .build();

        let fb = Framebuffer::with_color(gl, img.format.base_format(), w, h)?;
        let result = self
            .run_sample_grid(img, &op, &fb, &[("src_img", unit)])
            .and_then(|_| fb.read_color(gl, &image_2d(img.format, w, h)));
        fb.destroy(gl);
        result
    }
}
