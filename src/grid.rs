//! Grid programs: building them and running them over a W×H grid of invocations.
use crate::api::{self as gl, types::*, Gl};
use crate::context::Harness;
use crate::error::{check_gl, Error, Result};
use crate::extent::ImageExtent;
use crate::format::{get_image_format, ImageFormat};
use crate::shader::{self, generate_stage_source, Program};
use crate::stage::{get_image_stage, StageFlags};
use smallvec::SmallVec;
use std::mem;

/// Shape and return format of one pipeline run.
#[derive(Copy, Clone, Debug)]
pub struct GridInfo {
    /// Requested stages. Missing stages are added when the program is built.
    pub stages: StageFlags,
    /// Format of the values returned by `op()`. Always has four components.
    pub format: &'static ImageFormat,
    pub size: ImageExtent,
}

impl GridInfo {
    pub fn new(stages: StageFlags, format: &'static ImageFormat, w: u32, h: u32) -> GridInfo {
        assert_eq!(
            format.num_components(),
            4,
            "grid format {} is not a 4-component format",
            format.name
        );
        GridInfo {
            stages,
            format,
            size: ImageExtent::new(w, h, 1, 1),
        }
    }

    /// Same as `new`, with the stage and format given as GL enums.
    pub fn from_enums(stage: GLenum, format: GLenum, w: u32, h: u32) -> Option<GridInfo> {
        Some(GridInfo::new(
            get_image_stage(stage)?.bit,
            get_image_format(format)?,
            w,
            h,
        ))
    }

    pub fn with_size(&self, w: u32, h: u32) -> GridInfo {
        GridInfo {
            size: ImageExtent::new(w, h, 1, 1),
            ..*self
        }
    }

    /// This grid with the stage set completed into a runnable pipeline.
    pub fn expanded(&self) -> GridInfo {
        GridInfo {
            stages: self.stages.expanded(),
            ..*self
        }
    }
}

//--------------------------------------------------------------------------------------------------

/// Primitive used to hit each grid cell exactly once.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum GridPrimitive {
    /// One patch of four vertices per 2×2 block of cells.
    Patches,
    /// One point per cell.
    Points,
    /// A single quad covering the viewport.
    TriangleStrip,
}

impl GridPrimitive {
    /// Primitive for a program where `requested` are the stages that run `op()`.
    /// `None` for compute.
    pub fn for_stages(requested: StageFlags) -> Option<GridPrimitive> {
        if requested.contains(StageFlags::COMPUTE) {
            None
        } else if requested.intersects(StageFlags::TESS) {
            Some(GridPrimitive::Patches)
        } else if requested.intersects(StageFlags::VERTEX | StageFlags::GEOMETRY) {
            Some(GridPrimitive::Points)
        } else {
            Some(GridPrimitive::TriangleStrip)
        }
    }

    fn mode(self) -> GLenum {
        match self {
            GridPrimitive::Patches => gl::PATCHES,
            GridPrimitive::Points => gl::POINTS,
            GridPrimitive::TriangleStrip => gl::TRIANGLE_STRIP,
        }
    }
}

fn cell_center(x: u32, y: u32, w: u32, h: u32) -> [f32; 2] {
    [
        (2 * x + 1) as f32 / w as f32 - 1.0,
        (2 * y + 1) as f32 / h as f32 - 1.0,
    ]
}

/// Clip-space vertex positions drawing a `w×h` grid with `prim`.
///
/// Patch vertices come in `(x, y) (x+1, y) (x, y+1) (x+1, y+1)` order. Cells of the
/// last block row or column can fall outside the grid when `w` or `h` is odd.
pub fn generate_grid_arrays(prim: GridPrimitive, w: u32, h: u32) -> Vec<[f32; 2]> {
    match prim {
        GridPrimitive::Points => {
            let mut v = Vec::with_capacity((w * h) as usize);
            for y in 0..h {
                for x in 0..w {
                    v.push(cell_center(x, y, w, h));
                }
            }
            v
        }
        GridPrimitive::Patches => {
            let (bw, bh) = ((w + 1) / 2, (h + 1) / 2);
            let mut v = Vec::with_capacity((4 * bw * bh) as usize);
            for by in 0..bh {
                for bx in 0..bw {
                    let (x, y) = (2 * bx, 2 * by);
                    v.push(cell_center(x, y, w, h));
                    v.push(cell_center(x + 1, y, w, h));
                    v.push(cell_center(x, y + 1, w, h));
                    v.push(cell_center(x + 1, y + 1, w, h));
                }
            }
            v
        }
        GridPrimitive::TriangleStrip => vec![[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]],
    }
}

/// Vertex array holding the result of `generate_grid_arrays`.
#[derive(Debug)]
pub(crate) struct GridVertexArray {
    vao: GLuint,
    vbo: GLuint,
    count: GLsizei,
}

impl GridVertexArray {
    fn new(gl: &Gl, prim: GridPrimitive, w: u32, h: u32) -> Result<GridVertexArray> {
        let verts = generate_grid_arrays(prim, w, h);
        let stride = mem::size_of::<[f32; 2]>();
        let mut vao = 0;
        let mut vbo = 0;
        unsafe {
            gl.CreateBuffers(1, &mut vbo);
            gl.NamedBufferStorage(
                vbo,
                (verts.len() * stride) as GLsizeiptr,
                verts.as_ptr() as *const GLvoid,
                0,
            );
            gl.CreateVertexArrays(1, &mut vao);
            gl.VertexArrayVertexBuffer(vao, 0, vbo, 0, stride as GLsizei);
            gl.EnableVertexArrayAttrib(vao, 0);
            gl.VertexArrayAttribFormat(vao, 0, 2, gl::FLOAT, gl::FALSE, 0);
            gl.VertexArrayAttribBinding(vao, 0, 0);
        }
        let va = GridVertexArray {
            vao,
            vbo,
            count: verts.len() as GLsizei,
        };
        if let Err(e) = check_gl(gl, "glCreateVertexArrays") {
            va.destroy(gl);
            return Err(e);
        }
        debug!(
            "grid vertex array {} for {:?} {}x{}: {} vertices",
            vao, prim, w, h, va.count
        );
        Ok(va)
    }

    pub(crate) fn destroy(&self, gl: &Gl) {
        unsafe {
            gl.DeleteVertexArrays(1, &self.vao);
            gl.DeleteBuffers(1, &self.vbo);
        }
    }
}

//--------------------------------------------------------------------------------------------------

impl Harness {
    /// Builds a program running `grid`.
    ///
    /// Each entry of `ops` names one or more stages and the GLSL defining `op()` for
    /// them. The stage set (requested stages plus `grid.stages`) is completed into a
    /// runnable pipeline; stages that were not requested pass values through unchanged.
    pub fn generate_program(
        &self,
        grid: &GridInfo,
        ops: &[(StageFlags, Option<&str>)],
    ) -> Result<Program> {
        let requested = ops.iter().fold(grid.stages, |acc, &(s, _)| acc | s);
        let stages = requested.expanded();
        let gl = self.gl();

        let mut shaders: SmallVec<[GLuint; 5]> = SmallVec::new();
        for stage in stages.stages() {
            let op = ops
                .iter()
                .find(|(s, _)| s.contains(stage.bit))
                .and_then(|&(_, op)| op);
            let source = generate_stage_source(grid, stages, stage, op);
            if self.config().log_shader_source {
                debug!("{} shader source:\n{}", stage.name, source);
            }
            match shader::create_shader_from_glsl(gl, stage, &source) {
                Ok(obj) => shaders.push(obj),
                Err(e) => {
                    debug!("failing {} shader source:\n{}", stage.name, source);
                    shader::delete_shaders(gl, &shaders);
                    return Err(e);
                }
            }
        }

        let obj = shader::link_program(gl, &shaders)?;
        debug!(
            "program {} for {}x{} grid, stages {:?}",
            obj, grid.size.x, grid.size.y, stages
        );
        Ok(Program {
            obj,
            stages,
            requested,
        })
    }

    /// `generate_program` with stages given as `GL_*_SHADER` enums.
    pub fn generate_program_v(
        &self,
        grid: &GridInfo,
        ops: &[(GLenum, Option<&str>)],
    ) -> Result<Program> {
        let mut flags: SmallVec<[(StageFlags, Option<&str>); 6]> = SmallVec::new();
        for &(stage, op) in ops {
            let stage = get_image_stage(stage)
                .ok_or_else(|| Error::Unsupported(format!("shader stage 0x{:04x}", stage)))?;
            flags.push((stage.bit, op));
        }
        self.generate_program(grid, &flags)
    }

    /// Runs `program` once per cell of `grid`, into the currently bound framebuffer or,
    /// for compute programs, into the result image unit.
    pub fn draw_grid(&self, grid: &GridInfo, program: &Program) -> Result<()> {
        let gl = self.gl();
        let (w, h) = (grid.size.x, grid.size.y);
        let prim = GridPrimitive::for_stages(program.requested);
        // may query the driver, which must not see errors left by this draw
        let result_unit = if prim.is_none() { self.result_unit() } else { 0 };
        unsafe {
            gl.UseProgram(program.obj);
        }
        check_gl(gl, "glUseProgram")?;

        match prim {
            None => {
                program.set_uniform_int(gl, "ret_img", result_unit as i32)?;
                unsafe {
                    gl.DispatchCompute(1, h, 1);
                }
                check_gl(gl, "glDispatchCompute")
            }
            Some(prim) => {
                let key = (prim, w, h);
                if !self.grid_arrays.borrow().contains_key(&key) {
                    let va = GridVertexArray::new(gl, prim, w, h)?;
                    self.grid_arrays.borrow_mut().insert(key, va);
                }
                let grid_arrays = self.grid_arrays.borrow();
                let va = &grid_arrays[&key];

                unsafe {
                    gl.Viewport(0, 0, w as GLsizei, h as GLsizei);
                    gl.BindVertexArray(va.vao);
                    if prim == GridPrimitive::Patches {
                        gl.PatchParameteri(gl::PATCH_VERTICES, 4);
                    }
                    gl.DrawArrays(prim.mode(), 0, va.count);
                }
                check_gl(gl, "glDrawArrays")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_cell(p: [f32; 2], w: u32, h: u32) -> (i32, i32) {
        (
            ((p[0] + 1.0) * w as f32 / 2.0) as i32,
            ((p[1] + 1.0) * h as f32 / 2.0) as i32,
        )
    }

    #[test]
    fn points_hit_every_cell_once() {
        let (w, h) = (7, 5);
        let v = generate_grid_arrays(GridPrimitive::Points, w, h);
        assert_eq!(v.len(), 35);
        let mut seen = vec![0; (w * h) as usize];
        for p in v {
            let (x, y) = to_cell(p, w, h);
            assert!(x >= 0 && y >= 0 && x < w as i32 && y < h as i32);
            seen[(x + w as i32 * y) as usize] += 1;
        }
        assert!(seen.iter().all(|&n| n == 1));
    }

    #[test]
    fn patches_cover_blocks_in_corner_order() {
        let (w, h) = (4, 3);
        let v = generate_grid_arrays(GridPrimitive::Patches, w, h);
        assert_eq!(v.len(), 4 * 2 * 2);

        let cells: Vec<_> = v.iter().map(|&p| to_cell(p, w, h)).collect();
        assert_eq!(&cells[0..4], &[(0, 0), (1, 0), (0, 1), (1, 1)]);
        assert_eq!(&cells[4..8], &[(2, 0), (3, 0), (2, 1), (3, 1)]);
        // last block row sticks out of the grid
        assert_eq!(&cells[8..12], &[(0, 2), (1, 2), (0, 3), (1, 3)]);

        let inside = cells
            .iter()
            .filter(|&&(x, y)| x < w as i32 && y < h as i32)
            .count();
        assert_eq!(inside, (w * h) as usize);
    }

    #[test]
    fn strip_covers_viewport() {
        let v = generate_grid_arrays(GridPrimitive::TriangleStrip, 16, 16);
        assert_eq!(v, vec![[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]);
    }

    #[test]
    fn primitive_follows_requested_stages() {
        use GridPrimitive::*;
        assert_eq!(GridPrimitive::for_stages(StageFlags::FRAGMENT), Some(TriangleStrip));
        assert_eq!(GridPrimitive::for_stages(StageFlags::VERTEX), Some(Points));
        assert_eq!(
            GridPrimitive::for_stages(StageFlags::GEOMETRY | StageFlags::FRAGMENT),
            Some(Points)
        );
        assert_eq!(
            GridPrimitive::for_stages(StageFlags::VERTEX | StageFlags::TESS_EVAL),
            Some(Patches)
        );
        assert_eq!(GridPrimitive::for_stages(StageFlags::COMPUTE), None);
    }

    #[test]
    fn grid_info_helpers() {
        let g = GridInfo::from_enums(gl::TESS_CONTROL_SHADER, gl::RGBA32UI, 8, 4).unwrap();
        assert_eq!(g.size, ImageExtent::new(8, 4, 1, 1));
        assert_eq!(g.expanded().stages.stages().count(), 4);
        assert_eq!(g.with_size(2, 2).size.product(), 4);
        assert!(GridInfo::from_enums(gl::TEXTURE_2D, gl::RGBA32UI, 8, 4).is_none());
    }

    #[test]
    #[should_panic]
    fn grid_format_needs_four_components() {
        GridInfo::new(
            StageFlags::FRAGMENT,
            get_image_format(gl::RG32F).unwrap(),
            4,
            4,
        );
    }
}
