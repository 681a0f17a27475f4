use crate::api::{self as gl, types::*, Gl};
use crate::caps::Capabilities;
use crate::error::{check_gl, Error, Result};
use crate::extent::{ImageExtent, ImageInfo};
use crate::framebuffer::Framebuffer;
use crate::grid::{GridPrimitive, GridVertexArray};
use crate::settings::HarnessConfig;
use crate::shader::Program;
use crate::stage::ImageStage;
use crate::target::ImageTarget;
use fxhash::FxHashMap;
use std::cell::RefCell;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::os::raw::c_void;
use std::{ptr, slice};

extern "system" fn debug_callback(
    _source: GLenum,
    _ty: GLenum,
    _id: GLuint,
    severity: GLenum,
    length: GLsizei,
    msg: *const GLchar,
    _data: *mut GLvoid,
) {
    let msg = unsafe { slice::from_raw_parts(msg as *const u8, length.max(0) as usize) };
    let msg = String::from_utf8_lossy(msg);
    let level = match severity {
        gl::DEBUG_SEVERITY_HIGH => log::Level::Error,
        gl::DEBUG_SEVERITY_MEDIUM => log::Level::Warn,
        gl::DEBUG_SEVERITY_LOW => log::Level::Info,
        gl::DEBUG_SEVERITY_NOTIFICATION => log::Level::Debug,
        _ => log::Level::Debug,
    };
    log!(level, "(GL) {}", msg);
}

/// State shared by every step of a test, bound to the thread owning the GL context.
///
/// Owns the GL objects created on behalf of the test: the image bound to each image
/// unit (and its buffer, for buffer images), the vertex arrays used to draw grids and
/// the result framebuffer. They are released when the harness is dropped, which must
/// happen while the context is still current.
pub struct Harness {
    gl: Gl,
    config: HarnessConfig,
    caps: Capabilities,
    /// Texture bound to each image unit, 0 if none.
    textures: RefCell<Vec<GLuint>>,
    /// Buffer backing the texture of each image unit, 0 if none.
    buffers: RefCell<Vec<GLuint>>,
    pub(crate) grid_arrays: RefCell<FxHashMap<(GridPrimitive, u32, u32), GridVertexArray>>,
    pub(crate) framebuffer: RefCell<Option<Framebuffer>>,
}

impl Harness {
    /// Wraps a loaded function table. The context it was loaded from must be current.
    pub fn new(gl: Gl, config: HarnessConfig) -> Harness {
        unsafe {
            if config.gl_debug {
                gl.Enable(gl::DEBUG_OUTPUT_SYNCHRONOUS);
                gl.DebugMessageCallback(Some(debug_callback), ptr::null());
                gl.DebugMessageControl(
                    gl::DONT_CARE,
                    gl::DONT_CARE,
                    gl::DONT_CARE,
                    0,
                    ptr::null(),
                    gl::TRUE,
                );
            }

            let mut major_version = 0;
            let mut minor_version = 0;
            gl.GetIntegerv(gl::MAJOR_VERSION, &mut major_version);
            gl.GetIntegerv(gl::MINOR_VERSION, &mut minor_version);
            let vendor = gl.GetString(gl::VENDOR);
            let renderer = gl.GetString(gl::RENDERER);
            if !vendor.is_null() && !renderer.is_null() {
                info!(
                    "OpenGL version {}.{} (vendor: {:?}, renderer: {:?})",
                    major_version,
                    minor_version,
                    CStr::from_ptr(vendor as *const c_char),
                    CStr::from_ptr(renderer as *const c_char)
                );
            }
        }

        Harness {
            gl,
            config,
            caps: Capabilities::new(),
            textures: RefCell::new(Vec::new()),
            buffers: RefCell::new(Vec::new()),
            grid_arrays: RefCell::new(FxHashMap::default()),
            framebuffer: RefCell::new(None),
        }
    }

    /// Loads the GL function table with `loader` and wraps it.
    pub fn load_with<F>(loader: F, config: HarnessConfig) -> Harness
    where
        F: FnMut(&'static str) -> *const c_void,
    {
        Harness::new(Gl::load_with(loader), config)
    }

    pub fn gl(&self) -> &Gl {
        &self.gl
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn caps(&self) -> &Capabilities {
        &self.caps
    }

    pub(crate) fn caps_integer(&self, pname: GLenum) -> i32 {
        self.caps.integer(&self.gl, pname)
    }

    /// Image unit receiving the results of compute grids.
    pub fn result_unit(&self) -> u32 {
        self.config
            .result_unit
            .unwrap_or_else(|| self.max_image_units().max(1) - 1)
    }

    //----------------------------------------------------------------------------------------------

    pub fn image_stages(&self) -> Vec<&'static ImageStage> {
        self.caps.image_stages(&self.gl)
    }

    pub fn image_targets(&self) -> Vec<&'static ImageTarget> {
        self.caps.image_targets(&self.gl)
    }

    pub fn image_target_limits(&self, target: &ImageTarget) -> ImageExtent {
        self.caps.image_target_limits(&self.gl, target)
    }

    pub fn image_stage_max_images(&self, stage: &ImageStage) -> u32 {
        self.caps.image_stage_max_images(&self.gl, stage)
    }

    pub fn max_image_units(&self) -> u32 {
        self.caps.max_image_units(&self.gl)
    }

    pub fn max_combined_images(&self) -> u32 {
        self.caps.max_combined_images(&self.gl)
    }

    /// Fails with `Error::Unsupported` if the driver cannot create `img`.
    pub fn require_image(&self, img: &ImageInfo) -> Result<()> {
        if !self
            .image_targets()
            .iter()
            .any(|t| t.target == img.target.target)
        {
            return Err(Error::Unsupported(format!("{} images", img.target.name)));
        }
        let limits = self.image_target_limits(img.target);
        if (0..4).any(|i| img.size[i] > limits[i]) {
            return Err(Error::Unsupported(format!(
                "{} image of size {:?} (limits {:?})",
                img.target.name, img.size, limits
            )));
        }
        Ok(())
    }

    /// Fails with `Error::Unsupported` if `stage` cannot access `count` images.
    pub fn require_stage_images(&self, stage: &ImageStage, count: u32) -> Result<()> {
        let max = self.image_stage_max_images(stage);
        if max < count {
            Err(Error::Unsupported(format!(
                "{} image uniforms in {} shaders (max {})",
                count, stage.name, max
            )))
        } else {
            Ok(())
        }
    }

    pub fn memory_barrier(&self, barriers: GLbitfield) -> Result<()> {
        unsafe {
            self.gl.MemoryBarrier(barriers);
        }
        check_gl(&self.gl, "glMemoryBarrier")
    }

    pub fn delete_program(&self, program: Program) {
        unsafe {
            self.gl.DeleteProgram(program.obj);
        }
    }

    //----------------------------------------------------------------------------------------------

    /// Texture last uploaded to image unit `unit`.
    pub fn texture(&self, unit: u32) -> Option<GLuint> {
        get_object(&self.textures, unit)
    }

    /// Buffer backing the buffer image at `unit`.
    pub fn buffer(&self, unit: u32) -> Option<GLuint> {
        get_object(&self.buffers, unit)
    }

    /// Makes `tex` (backed by `buf` for buffer images, 0 otherwise) the image of `unit`,
    /// deleting the objects it replaces.
    pub(crate) fn set_image(&self, unit: u32, tex: GLuint, buf: GLuint) {
        let old_tex = set_object(&self.textures, unit, tex);
        let old_buf = set_object(&self.buffers, unit, buf);
        unsafe {
            if old_tex != 0 {
                self.gl.DeleteTextures(1, &old_tex);
            }
            if old_buf != 0 {
                self.gl.DeleteBuffers(1, &old_buf);
            }
        }
    }
}

fn get_object(table: &RefCell<Vec<GLuint>>, unit: u32) -> Option<GLuint> {
    match table.borrow().get(unit as usize) {
        Some(&obj) if obj != 0 => Some(obj),
        _ => None,
    }
}

/// Stores `obj` at `unit`, returning the previous object (or 0).
fn set_object(table: &RefCell<Vec<GLuint>>, unit: u32, obj: GLuint) -> GLuint {
    let mut table = table.borrow_mut();
    let i = unit as usize;
    if table.len() <= i {
        table.resize(i + 1, 0);
    }
    std::mem::replace(&mut table[i], obj)
}

impl Drop for Harness {
    fn drop(&mut self) {
        let gl = &self.gl;
        unsafe {
            for &tex in self.textures.borrow().iter().filter(|&&t| t != 0) {
                gl.DeleteTextures(1, &tex);
            }
            for &buf in self.buffers.borrow().iter().filter(|&&b| b != 0) {
                gl.DeleteBuffers(1, &buf);
            }
        }
        for (_, va) in self.grid_arrays.borrow_mut().drain() {
            va.destroy(gl);
        }
        if let Some(fb) = self.framebuffer.borrow_mut().take() {
            fb.destroy(gl);
        }
    }
}
