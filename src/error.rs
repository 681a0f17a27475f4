use crate::api::{self as gl, types::*, Gl};
use std::error;
use std::fmt;

//--------------------------------------------------------------------------------------------------

/// First mismatching pixel found by the comparison helpers.
#[derive(Clone, Debug, PartialEq)]
pub struct Mismatch {
    /// Position of the pixel in the native extent of the image (x, y, z, w).
    pub coord: [u32; 4],
    pub expected: [f64; 4],
    pub observed: [f64; 4],
    pub components: usize,
}

fn format_pixel(f: &mut fmt::Formatter, pixel: &[f64]) -> fmt::Result {
    for (i, v) in pixel.iter().enumerate() {
        if i > 0 {
            write!(f, " ")?;
        }
        write!(f, "{}", v)?;
    }
    Ok(())
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let n = self.components;
        write!(
            f,
            "probe value at ({}, {}, {}, {})\n  expected: ",
            self.coord[0], self.coord[1], self.coord[2], self.coord[3]
        )?;
        format_pixel(f, &self.expected[..n])?;
        write!(f, "\n  observed: ")?;
        format_pixel(f, &self.observed[..n])
    }
}

//--------------------------------------------------------------------------------------------------
#[derive(Debug)]
pub enum Error {
    /// The format, target, stage or feature is not available on this driver.
    /// Tests should report this as a skip.
    Unsupported(String),
    ShaderCompile {
        stage: &'static str,
        log: String,
    },
    ProgramLink(String),
    /// `glGetError` returned something other than `GL_NO_ERROR` after `call`.
    Gl {
        call: &'static str,
        code: GLenum,
    },
    FramebufferIncomplete(GLenum),
    /// Nothing was ever uploaded to this image unit.
    MissingImage(u32),
    Mismatch(Mismatch),
}

impl Error {
    pub fn is_unsupported(&self) -> bool {
        match self {
            Error::Unsupported(_) => true,
            _ => false,
        }
    }
}

pub fn gl_error_name(code: GLenum) -> &'static str {
    match code {
        gl::NO_ERROR => "GL_NO_ERROR",
        gl::INVALID_ENUM => "GL_INVALID_ENUM",
        gl::INVALID_VALUE => "GL_INVALID_VALUE",
        gl::INVALID_OPERATION => "GL_INVALID_OPERATION",
        gl::INVALID_FRAMEBUFFER_OPERATION => "GL_INVALID_FRAMEBUFFER_OPERATION",
        gl::OUT_OF_MEMORY => "GL_OUT_OF_MEMORY",
        gl::STACK_UNDERFLOW => "GL_STACK_UNDERFLOW",
        gl::STACK_OVERFLOW => "GL_STACK_OVERFLOW",
        _ => "unknown GL error",
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Unsupported(what) => write!(f, "unsupported: {}", what),
            Error::ShaderCompile { stage, log } => {
                write!(f, "failed to compile {} shader:\n{}", stage, log)
            }
            Error::ProgramLink(log) => write!(f, "failed to link program:\n{}", log),
            Error::Gl { call, code } => write!(
                f,
                "{} failed with {} (0x{:04x})",
                call,
                gl_error_name(*code),
                code
            ),
            Error::FramebufferIncomplete(status) => {
                write!(f, "framebuffer incomplete (status 0x{:04x})", status)
            }
            Error::MissingImage(unit) => write!(f, "no image uploaded to unit {}", unit),
            Error::Mismatch(m) => write!(f, "{}", m),
        }
    }
}

impl error::Error for Error {}

impl From<Mismatch> for Error {
    fn from(m: Mismatch) -> Self {
        Error::Mismatch(m)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Fails with `Error::Gl` if the last GL call raised an error.
pub(crate) fn check_gl(gl: &Gl, call: &'static str) -> Result<()> {
    let code = unsafe { gl.GetError() };
    if code == gl::NO_ERROR {
        Ok(())
    } else {
        error!("{} raised {} (0x{:04x})", call, gl_error_name(code), code);
        Err(Error::Gl { call, code })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_display_lists_used_channels_only() {
        let m = Mismatch {
            coord: [3, 10, 0, 0],
            expected: [1.0, 0.5, 0.0, 0.0],
            observed: [1.0, 0.25, 7.0, 7.0],
            components: 2,
        };
        let s = m.to_string();
        assert_eq!(s, "probe value at (3, 10, 0, 0)\n  expected: 1 0.5\n  observed: 1 0.25");
    }

    #[test]
    fn gl_error_display() {
        let e = Error::Gl {
            call: "glTextureSubImage2D",
            code: gl::INVALID_OPERATION,
        };
        assert_eq!(
            e.to_string(),
            "glTextureSubImage2D failed with GL_INVALID_OPERATION (0x0502)"
        );
        assert!(!e.is_unsupported());
        assert!(Error::Unsupported("cube arrays".into()).is_unsupported());
    }
}
