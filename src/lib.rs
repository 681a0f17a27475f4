//! Grid harness for `ARB_shader_image_load_store` conformance tests.
//!
//! A test describes the cross product it exercises with the static metadata tables
//! ([`ImageFormat`], [`ImageTarget`], [`ImageStage`]), hands a GLSL `op()` hunk to
//! [`Harness::generate_program`], uploads its images, runs the grid with
//! [`Harness::draw_grid`] and checks what comes back with the [`pixels`] helpers.
//!
//! All state that the driver side needs (capability cache, per-unit textures and
//! buffers, cached grid vertex arrays, the result framebuffer) lives in the
//! [`Harness`] context object, which is bound to the thread owning the GL context.
#[macro_use]
extern crate log;

pub mod api;
mod caps;
mod context;
mod error;
pub mod extent;
pub mod format;
mod framebuffer;
pub mod grid;
mod image;
pub mod pixels;
mod settings;
pub mod shader;
pub mod stage;
pub mod target;

pub use self::caps::{Capabilities, CapabilityQuery};
pub use self::context::Harness;
pub use self::error::{Error, Mismatch, Result};
pub use self::extent::{ImageExtent, ImageInfo};
pub use self::format::{get_image_format, get_image_format_by_name, BaseType, ImageFormat};
pub use self::grid::{generate_grid_arrays, GridInfo, GridPrimitive};
pub use self::settings::HarnessConfig;
pub use self::shader::Program;
pub use self::stage::{get_image_stage, ImageStage, StageFlags};
pub use self::target::{get_image_target, ImageTarget};
