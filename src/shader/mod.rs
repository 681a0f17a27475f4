//! GLSL compilation and program linking.
use crate::api::{self as gl, types::*, Gl};
use crate::error::{Error, Result};
use crate::stage::{ImageStage, StageFlags};
use lazy_static::lazy_static;
use regex::Regex;
use std::ffi::CString;

pub mod source;

pub use self::source::{generate_stage_source, header_hunk, image_hunk, SourceBuilder};

//--------------------------------------------------------------------------------------------------

/// A linked GL program and the stages it was built from.
///
/// Released with `Harness::delete_program`.
#[derive(Debug)]
pub struct Program {
    pub(crate) obj: GLuint,
    pub(crate) stages: StageFlags,
    /// Stages running the caller's `op()`, which decide how the grid is drawn.
    pub(crate) requested: StageFlags,
}

impl Program {
    pub fn obj(&self) -> GLuint {
        self.obj
    }

    /// Stages actually linked into the program, after expansion.
    pub fn stages(&self) -> StageFlags {
        self.stages
    }

    pub fn requested_stages(&self) -> StageFlags {
        self.requested
    }

    /// Sets an `int` (or sampler/image unit) uniform. Unknown names are ignored, like GL does.
    pub fn set_uniform_int(&self, gl: &Gl, name: &str, value: i32) -> Result<()> {
        let name = CString::new(name).expect("uniform name contains a nul byte");
        unsafe {
            let loc = gl.GetUniformLocation(self.obj, name.as_ptr());
            if loc < 0 {
                debug!("uniform {:?} not active in program {}", name, self.obj);
                return Ok(());
            }
            gl.ProgramUniform1i(self.obj, loc, value);
        }
        crate::error::check_gl(gl, "glProgramUniform1i")
    }
}

//--------------------------------------------------------------------------------------------------

fn info_log_to_string(mut buf: Vec<u8>, len: GLsizei) -> String {
    buf.truncate(len.max(0) as usize);
    String::from_utf8_lossy(&buf).into_owned()
}

fn get_shader_info_log(gl: &Gl, obj: GLuint) -> String {
    unsafe {
        let mut capacity = 0;
        gl.GetShaderiv(obj, gl::INFO_LOG_LENGTH, &mut capacity);
        let mut buf = vec![0u8; capacity.max(1) as usize];
        let mut len = 0;
        gl.GetShaderInfoLog(obj, capacity, &mut len, buf.as_mut_ptr() as *mut GLchar);
        info_log_to_string(buf, len)
    }
}

fn get_program_info_log(gl: &Gl, obj: GLuint) -> String {
    unsafe {
        let mut capacity = 0;
        gl.GetProgramiv(obj, gl::INFO_LOG_LENGTH, &mut capacity);
        let mut buf = vec![0u8; capacity.max(1) as usize];
        let mut len = 0;
        gl.GetProgramInfoLog(obj, capacity, &mut len, buf.as_mut_ptr() as *mut GLchar);
        info_log_to_string(buf, len)
    }
}

/// Compiles one shader object. On failure the object is deleted and the info log returned.
pub(crate) fn create_shader_from_glsl(
    gl: &Gl,
    stage: &ImageStage,
    source: &str,
) -> Result<GLuint> {
    unsafe {
        let obj = gl.CreateShader(stage.stage);
        let sources = [source.as_ptr() as *const GLchar];
        let lengths = [source.len() as GLint];
        gl.ShaderSource(obj, 1, sources.as_ptr(), lengths.as_ptr());
        gl.CompileShader(obj);
        let mut status = 0;
        gl.GetShaderiv(obj, gl::COMPILE_STATUS, &mut status);
        if status != gl::TRUE as GLint {
            let log = get_shader_info_log(gl, obj);
            gl.DeleteShader(obj);
            error!(
                "{} shader failed to compile:\n{}",
                stage.name,
                annotate_info_log(source, &log)
            );
            Err(Error::ShaderCompile {
                stage: stage.name,
                log,
            })
        } else {
            Ok(obj)
        }
    }
}

/// Standard attribute locations of grid programs.
pub(crate) const VERTEX_ATTRIBUTES: [(GLuint, &str); 2] = [(0, "in_position"), (1, "in_texcoord")];

/// Links `shaders` into a new program. The shader objects stay attached to the program
/// and are flagged for deletion, so they go away together with it.
pub(crate) fn link_program(gl: &Gl, shaders: &[GLuint]) -> Result<GLuint> {
    unsafe {
        let obj = gl.CreateProgram();
        for &sh in shaders {
            gl.AttachShader(obj, sh);
        }
        for &(loc, name) in VERTEX_ATTRIBUTES.iter() {
            let name = CString::new(name).expect("attribute name contains a nul byte");
            gl.BindAttribLocation(obj, loc, name.as_ptr());
        }
        gl.LinkProgram(obj);
        for &sh in shaders {
            gl.DeleteShader(sh);
        }

        let mut status = 0;
        gl.GetProgramiv(obj, gl::LINK_STATUS, &mut status);
        if status != gl::TRUE as GLint {
            let log = get_program_info_log(gl, obj);
            gl.DeleteProgram(obj);
            error!("program failed to link:\n{}", log);
            return Err(Error::ProgramLink(log));
        }
        Ok(obj)
    }
}

/// Number of shader objects attached to `program`.
pub fn attached_shader_count(gl: &Gl, program: &Program) -> u32 {
    let mut n = 0;
    unsafe {
        gl.GetProgramiv(program.obj, gl::ATTACHED_SHADERS, &mut n);
    }
    n.max(0) as u32
}

pub(crate) fn delete_shaders(gl: &Gl, shaders: &[GLuint]) {
    for &sh in shaders {
        unsafe {
            gl.DeleteShader(sh);
        }
    }
}

//--------------------------------------------------------------------------------------------------

lazy_static! {
    // "0:12(5): error ..." (Mesa) or "0(12) : error ..." (NVIDIA)
    static ref LOG_LINE_REF: Regex = Regex::new(r"(?:^|\s)\d+[:(](?P<line>\d+)").unwrap();
}

/// Follows each info log line referring to a source line by the text of that line.
pub fn annotate_info_log(source: &str, log: &str) -> String {
    let lines: Vec<&str> = source.lines().collect();
    let mut out = String::new();
    for msg in log.lines() {
        out.push_str(msg);
        out.push('\n');
        let line = LOG_LINE_REF
            .captures(msg)
            .and_then(|c| c["line"].parse::<usize>().ok());
        if let Some(text) = line.and_then(|l| l.checked_sub(1)).and_then(|l| lines.get(l)) {
            out.push_str("    > ");
            out.push_str(text.trim());
            out.push('\n');
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "#version 450 core\nvoid main() {\n    foo = 1;\n}\n";

    #[test]
    fn annotate_mesa_log() {
        let log = "0:3(5): error: `foo' undeclared\n";
        assert_eq!(
            annotate_info_log(SOURCE, log),
            "0:3(5): error: `foo' undeclared\n    > foo = 1;\n"
        );
    }

    #[test]
    fn annotate_nvidia_log() {
        let log = "0(3) : error C1008: undefined variable \"foo\"";
        let out = annotate_info_log(SOURCE, log);
        assert!(out.ends_with("    > foo = 1;\n"));
    }

    #[test]
    fn lines_without_reference_are_kept() {
        let log = "link failed\n0:99(1): error: out of range";
        assert_eq!(
            annotate_info_log(SOURCE, log),
            "link failed\n0:99(1): error: out of range\n"
        );
    }
}
