//! OpenGL function table generated by `gl_generator` (see `build.rs`).
#![allow(clippy::all)]
#![allow(non_camel_case_types, non_snake_case, non_upper_case_globals, dead_code)]

include!(concat!(env!("OUT_DIR"), "/gl_bindings.rs"));
