use crate::api::{self as gl, types::*, Gl};
use crate::context::Harness;
use crate::error::{check_gl, Error, Result};
use crate::extent::ImageInfo;
use crate::format::{BaseType, ImageFormat};
use crate::grid::GridInfo;
use crate::image;
use crate::pixels::init_pixels;
use crate::stage::StageFlags;
use crate::target::get_image_target;

/// Framebuffer receiving the output of graphics grids.
///
/// Either has a single color attachment, or no attachment at all and a default size
/// (for grids whose only output goes through images).
#[derive(Debug)]
pub(crate) struct Framebuffer {
    pub(crate) obj: GLuint,
    color: Option<GLuint>,
}

impl Framebuffer {
    /// Framebuffer with a `w×h` 2D texture of `format` bound to `GL_COLOR_ATTACHMENT0`.
    pub(crate) fn with_color(
        gl: &Gl,
        format: &ImageFormat,
        w: u32,
        h: u32,
    ) -> Result<Framebuffer> {
        let mut obj = 0;
        let mut tex = 0;
        unsafe {
            gl.CreateTextures(gl::TEXTURE_2D, 1, &mut tex);
            gl.TextureStorage2D(tex, 1, format.format, w as GLsizei, h as GLsizei);
            gl.CreateFramebuffers(1, &mut obj);
            gl.NamedFramebufferTexture(obj, gl::COLOR_ATTACHMENT0, tex, 0);
            gl.NamedFramebufferDrawBuffer(obj, gl::COLOR_ATTACHMENT0);
        }
        let fb = Framebuffer {
            obj,
            color: Some(tex),
        };
        fb.check_complete(gl).map_err(|e| {
            fb.destroy(gl);
            e
        })?;
        Ok(fb)
    }

    /// Framebuffer without attachments, rasterizing a `w×h` area.
    pub(crate) fn empty(gl: &Gl, w: u32, h: u32) -> Result<Framebuffer> {
        let mut obj = 0;
        unsafe {
            gl.CreateFramebuffers(1, &mut obj);
            gl.NamedFramebufferParameteri(obj, gl::FRAMEBUFFER_DEFAULT_WIDTH, w as GLint);
            gl.NamedFramebufferParameteri(obj, gl::FRAMEBUFFER_DEFAULT_HEIGHT, h as GLint);
        }
        let fb = Framebuffer { obj, color: None };
        fb.check_complete(gl).map_err(|e| {
            fb.destroy(gl);
            e
        })?;
        Ok(fb)
    }

    fn check_complete(&self, gl: &Gl) -> Result<()> {
        check_gl(gl, "glCreateFramebuffers")?;
        let status = unsafe { gl.CheckNamedFramebufferStatus(self.obj, gl::DRAW_FRAMEBUFFER) };
        if status == gl::FRAMEBUFFER_COMPLETE {
            Ok(())
        } else {
            error!("framebuffer {} incomplete: 0x{:04x}", self.obj, status);
            Err(Error::FramebufferIncomplete(status))
        }
    }

    /// Clears the color attachment to `value`, converted to the base type of `format`.
    pub(crate) fn clear(&self, gl: &Gl, format: &ImageFormat, value: f64) {
        unsafe {
            match format.base_type() {
                BaseType::Float => {
                    let v = [value as f32; 4];
                    gl.ClearNamedFramebufferfv(self.obj, gl::COLOR, 0, v.as_ptr());
                }
                BaseType::Int => {
                    let v = [value as i32; 4];
                    gl.ClearNamedFramebufferiv(self.obj, gl::COLOR, 0, v.as_ptr());
                }
                BaseType::Uint => {
                    let v = [value as u32; 4];
                    gl.ClearNamedFramebufferuiv(self.obj, gl::COLOR, 0, v.as_ptr());
                }
            }
        }
    }

    /// Contents of the color attachment, one word per channel of `img`.
    pub(crate) fn read_color(&self, gl: &Gl, img: &ImageInfo) -> Result<Vec<u32>> {
        let tex = self
            .color
            .expect("reading back a framebuffer without color attachment");
        image::get_texture_level(gl, tex, img, 0)
    }

    /// Currently bound draw framebuffer.
    pub(crate) fn current(gl: &Gl) -> GLuint {
        let mut obj = 0;
        unsafe {
            gl.GetIntegerv(gl::DRAW_FRAMEBUFFER_BINDING, &mut obj);
        }
        obj as GLuint
    }

    pub(crate) fn bind(&self, gl: &Gl) {
        unsafe {
            gl.BindFramebuffer(gl::FRAMEBUFFER, self.obj);
        }
    }

    pub(crate) fn destroy(&self, gl: &Gl) {
        unsafe {
            gl.DeleteFramebuffers(1, &self.obj);
            if let Some(tex) = self.color {
                gl.DeleteTextures(1, &tex);
            }
        }
    }
}

//--------------------------------------------------------------------------------------------------

/// Image receiving the results of `grid`: the color attachment of the result framebuffer,
/// or the image bound to the result unit for compute grids.
fn result_image(grid: &GridInfo) -> ImageInfo {
    let target = get_image_target(gl::TEXTURE_2D).expect("2D target missing from the table");
    ImageInfo::new(target, grid.format, grid.size.x, grid.size.y)
}

impl Harness {
    /// Sets up the destination of `grid` and fills it with the configured clear value.
    pub fn init_fb(&self, grid: &GridInfo) -> Result<()> {
        let gl = self.gl();
        let clear = self.config().clear_value;

        if grid.stages.contains(StageFlags::COMPUTE) {
            let img = result_image(grid);
            let pixels = init_pixels(&img, [clear; 4]);
            return self.upload_image(&img, self.result_unit(), &pixels);
        }

        let fb = Framebuffer::with_color(gl, grid.format, grid.size.x, grid.size.y)?;
        fb.bind(gl);
        fb.clear(gl, grid.format, clear);
        unsafe {
            gl.Viewport(0, 0, grid.size.x as GLsizei, grid.size.y as GLsizei);
        }
        if let Some(old) = self.framebuffer.borrow_mut().replace(fb) {
            old.destroy(gl);
        }
        check_gl(gl, "glClearNamedFramebuffer")
    }

    /// Reads back what the last grid run wrote, `grid.size.product() * 4` words.
    pub fn download_result(&self, grid: &GridInfo) -> Result<Vec<u32>> {
        let img = result_image(grid);
        if grid.stages.contains(StageFlags::COMPUTE) {
            return self.download_image(&img, self.result_unit());
        }
        let fb = self.framebuffer.borrow();
        fb.as_ref()
            .expect("download_result called before init_fb")
            .read_color(self.gl(), &img)
    }
}
