//! GLSL generation for grid programs.
//!
//! Every stage of a grid program wraps a caller-supplied
//! `GRID_T op(ivec2 idx, GRID_T x)` function. The value returned by a stage's `op()`
//! is handed to the next present stage as its `x` argument; the first stage starts
//! from `GRID_T(0)`. The compute stage and the last graphics stage write the final
//! value to the result image or to the framebuffer.
use crate::extent::ImageInfo;
use crate::grid::GridInfo;
use crate::stage::{ImageStage, StageFlags};
use std::fmt::Write;

/// Accumulates hunks of GLSL, one per line group.
///
/// Hunks are taken by value; once pushed they belong to the builder.
#[derive(Clone, Debug, Default)]
pub struct SourceBuilder {
    buf: String,
}

impl SourceBuilder {
    pub fn new() -> SourceBuilder {
        SourceBuilder::default()
    }

    pub fn push(mut self, hunk: impl Into<String>) -> SourceBuilder {
        let hunk = hunk.into();
        self.buf.push_str(&hunk);
        if !hunk.ends_with('\n') {
            self.buf.push('\n');
        }
        self
    }

    pub fn build(self) -> String {
        self.buf
    }
}

//--------------------------------------------------------------------------------------------------

/// `#define`s describing `img` to GLSL, all names prefixed with `prefix`.
///
/// `{p}IMAGE_ADDR(idx)` maps a grid index to the address of the pixel with the
/// same linear index `{p}IMAGE_IDX(idx)` in the image. For multisample images the
/// sample index varies fastest and is given by `{p}IMAGE_SAMPLE(idx)`.
///
/// Relies on `W` from `header_hunk`.
pub fn image_hunk(img: &ImageInfo, prefix: &str) -> String {
    let p = prefix;
    let fmt = img.format;
    let scale = fmt.scale();
    let size = img.size;
    let multisample = img.target.is_multisample();
    let first = if multisample { 1 } else { 0 };
    let dims = img.target.address_dimensions();

    let mut stride = 1;
    for i in 0..first {
        stride *= size[i];
    }
    let mut components = Vec::with_capacity(dims);
    for i in first..first + dims {
        components.push(format!("({}IMAGE_IDX(idx) / {} % {})", p, stride, size[i]));
        stride *= size[i];
    }

    let mut s = String::new();
    let _ = writeln!(s, "#define {}BASE_T {}", p, fmt.scalar_type_name());
    let _ = writeln!(s, "#define {}DATA_T {}", p, fmt.vector_type_name());
    let _ = writeln!(
        s,
        "#define {}SCALE vec4({:.8e}, {:.8e}, {:.8e}, {:.8e})",
        p, scale[0], scale[1], scale[2], scale[3]
    );
    let _ = writeln!(s, "#define {}IMAGE_IDX(idx) ((idx).x + W * (idx).y)", p);
    let _ = writeln!(
        s,
        "#define {}IMAGE_ADDR(idx) {}({})",
        p,
        img.target.addr_type_name,
        components.join(", ")
    );
    if multisample {
        let _ = writeln!(
            s,
            "#define {}IMAGE_SAMPLE(idx) ({}IMAGE_IDX(idx) % {})",
            p, p, size.x
        );
    }
    let _ = writeln!(s, "#define {}IMAGE_LAYOUT_Q layout({})", p, fmt.name);
    let _ = writeln!(
        s,
        "#define {}IMAGE_BARE_T {}{}",
        p,
        fmt.image_type_name(),
        img.target.name
    );
    let _ = writeln!(s, "#define {}IMAGE_T {}IMAGE_LAYOUT_Q {}IMAGE_BARE_T", p, p, p);
    s
}

/// Version directive and the grid-wide `#define`s every stage starts with.
pub fn header_hunk(grid: &GridInfo) -> String {
    let fmt = grid.format;
    let mut s = String::new();
    let _ = writeln!(s, "#version 450 core");
    let _ = writeln!(s, "#extension GL_ARB_shader_image_load_store : enable");
    let _ = writeln!(s, "#define W {}", grid.size.x);
    let _ = writeln!(s, "#define H {}", grid.size.y);
    let _ = writeln!(s, "#define N {}", grid.size.product());
    let _ = writeln!(s, "#define GRID_T {}", fmt.vector_type_name());
    let _ = writeln!(
        s,
        "#define RET_IMAGE_T layout({}) {}2D",
        fmt.name,
        fmt.image_type_name()
    );
    let _ = writeln!(
        s,
        "#define IN_GRID(idx) ((idx).x >= 0 && (idx).y >= 0 && (idx).x < W && (idx).y < H)"
    );
    s
}

const IDENTITY_OP: &str = "GRID_T
op(ivec2 idx, GRID_T x) {
        return x;
}
";

/// Names of the index and value variables written by `stage`.
fn outputs(stage: &ImageStage) -> (String, String) {
    (
        format!("{}idx", stage.out_prefix),
        format!("{}color", stage.out_prefix),
    )
}

/// Complete source of `stage` for a program made of `stages`.
///
/// `op` is the GLSL defining `op()` (plus whatever it needs); the identity is used
/// when it is `None`.
pub fn generate_stage_source(
    grid: &GridInfo,
    stages: StageFlags,
    stage: &ImageStage,
    op: Option<&str>,
) -> String {
    let op = op.unwrap_or(IDENTITY_OP);
    let (out_idx, out_color) = outputs(stage);
    let pred = stages.predecessor(stage).map(outputs);

    let (decls, main) = match stage.bit {
        StageFlags::VERTEX => (
            format!(
                "in vec4 in_position;\n\
                 flat out ivec2 {idx};\n\
                 flat out GRID_T {color};\n",
                idx = out_idx,
                color = out_color
            ),
            format!(
                "void main() {{\n\
                 \x20       ivec2 idx = ivec2((in_position.xy + 1.0) * vec2(W, H) / 2.0);\n\
                 \n\
                 \x20       gl_Position = in_position;\n\
                 \x20       {idx} = idx;\n\
                 \x20       {color} = (IN_GRID(idx) ? op(idx, GRID_T(0)) : GRID_T(0));\n\
                 }}\n",
                idx = out_idx,
                color = out_color
            ),
        ),
        StageFlags::TESS_CONTROL => {
            let (in_idx, in_color) = pred.expect("tessellation control stage without input");
            (
                format!(
                    "layout(vertices = 4) out;\n\
                     \n\
                     flat in ivec2 {in_idx}[];\n\
                     flat in GRID_T {in_color}[];\n\
                     flat out ivec2 {idx}[];\n\
                     flat out GRID_T {color}[];\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
                format!(
                    "void main() {{\n\
                     \x20       int i = gl_InvocationID;\n\
                     \x20       ivec2 idx = {in_idx}[i];\n\
                     \n\
                     \x20       gl_out[i].gl_Position = gl_in[i].gl_Position;\n\
                     \x20       {idx}[i] = idx;\n\
                     \x20       {color}[i] = (IN_GRID(idx) ? op(idx, {in_color}[i]) : {in_color}[i]);\n\
                     \n\
                     \x20       gl_TessLevelInner[0] = 1.0;\n\
                     \x20       gl_TessLevelInner[1] = 1.0;\n\
                     \x20       gl_TessLevelOuter[0] = 1.0;\n\
                     \x20       gl_TessLevelOuter[1] = 1.0;\n\
                     \x20       gl_TessLevelOuter[2] = 1.0;\n\
                     \x20       gl_TessLevelOuter[3] = 1.0;\n\
                     }}\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
            )
        }
        StageFlags::TESS_EVAL => {
            let (in_idx, in_color) = pred.expect("tessellation evaluation stage without input");
            (
                format!(
                    "layout(quads, point_mode) in;\n\
                     \n\
                     flat in ivec2 {in_idx}[];\n\
                     flat in GRID_T {in_color}[];\n\
                     flat out ivec2 {idx};\n\
                     flat out GRID_T {color};\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
                format!(
                    "void main() {{\n\
                     \x20       int i = (gl_TessCoord.x > 0.5 ? 1 : 0) +\n\
                     \x20               (gl_TessCoord.y > 0.5 ? 2 : 0);\n\
                     \x20       ivec2 idx = {in_idx}[i];\n\
                     \n\
                     \x20       gl_Position = gl_in[i].gl_Position;\n\
                     \x20       {idx} = idx;\n\
                     \x20       {color} = (IN_GRID(idx) ? op(idx, {in_color}[i]) : {in_color}[i]);\n\
                     }}\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
            )
        }
        StageFlags::GEOMETRY => {
            let (in_idx, in_color) = pred.expect("geometry stage without input");
            (
                format!(
                    "layout(points) in;\n\
                     layout(points, max_vertices = 1) out;\n\
                     \n\
                     flat in ivec2 {in_idx}[];\n\
                     flat in GRID_T {in_color}[];\n\
                     flat out ivec2 {idx};\n\
                     flat out GRID_T {color};\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
                format!(
                    "void main() {{\n\
                     \x20       ivec2 idx = {in_idx}[0];\n\
                     \n\
                     \x20       if (IN_GRID(idx)) {{\n\
                     \x20               gl_Position = gl_in[0].gl_Position;\n\
                     \x20               {idx} = idx;\n\
                     \x20               {color} = op(idx, {in_color}[0]);\n\
                     \x20               EmitVertex();\n\
                     \x20       }}\n\
                     }}\n",
                    in_idx = in_idx,
                    in_color = in_color,
                    idx = out_idx,
                    color = out_color
                ),
            )
        }
        StageFlags::FRAGMENT => {
            let (_, in_color) = pred.expect("fragment stage without input");
            (
                format!(
                    "flat in GRID_T {in_color};\n\
                     out GRID_T {color};\n",
                    in_color = in_color,
                    color = out_color
                ),
                format!(
                    "void main() {{\n\
                     \x20       {color} = op(ivec2(gl_FragCoord.xy), {in_color});\n\
                     }}\n",
                    in_color = in_color,
                    color = out_color
                ),
            )
        }
        StageFlags::COMPUTE => (
            "layout(local_size_x = W) in;\n\
             \n\
             uniform RET_IMAGE_T ret_img;\n"
                .to_string(),
            "void main() {\n\
             \x20       ivec2 idx = ivec2(gl_GlobalInvocationID);\n\
             \n\
             \x20       imageStore(ret_img, idx, op(idx, GRID_T(0)));\n\
             }\n"
                .to_string(),
        ),
        other => unreachable!("not a single shader stage: {:?}", other),
    };

    SourceBuilder::new()
        .push(header_hunk(grid))
        .push(decls)
        .push(op)
        .push(main)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api as gl;
    use crate::extent::ImageExtent;
    use crate::format::get_image_format;
    use crate::stage::stage_for_bit;
    use crate::target::get_image_target;
    use regex::Regex;

    fn define<'a>(src: &'a str, name: &str) -> &'a str {
        let re = Regex::new(&format!(r"(?m)^#define {}(?:\(idx\))? (.*)$", regex::escape(name)))
            .unwrap();
        re.captures(src)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or_else(|| panic!("{} not defined in:\n{}", name, src))
    }

    /// Evaluates an `IMAGE_ADDR`/`IMAGE_SAMPLE` expansion for the given linear index.
    fn eval_components(expr: &str, n: u32) -> Vec<u32> {
        let re = Regex::new(r"\(\w*IMAGE_IDX\(idx\)(?: / (\d+))? % (\d+)\)").unwrap();
        re.captures_iter(expr)
            .map(|c| {
                let stride: u32 = c.get(1).map_or(1, |m| m.as_str().parse().unwrap());
                let size: u32 = c[2].parse().unwrap();
                n / stride % size
            })
            .collect()
    }

    fn grid(w: u32, h: u32) -> GridInfo {
        GridInfo::new(
            StageFlags::FRAGMENT,
            get_image_format(gl::RGBA32F).unwrap(),
            w,
            h,
        )
    }

    #[test]
    fn builder_separates_hunks() {
        let s = SourceBuilder::new()
            .push("a")
            .push(String::from("b\n"))
            .push("c")
            .build();
        assert_eq!(s, "a\nb\nc\n");
    }

    #[test]
    fn address_of_2d_array_image() {
        let img = ImageInfo::with_size(
            get_image_target(gl::TEXTURE_2D_ARRAY).unwrap(),
            get_image_format(gl::RGBA32F).unwrap(),
            ImageExtent::new(16, 96, 1, 1),
        );
        let src = image_hunk(&img, "src_");

        let w = 16;
        let (x, y) = (3, 10);
        let n = x + w * y;
        assert_eq!(n, 163);
        assert_eq!(define(&src, "src_IMAGE_IDX"), "((idx).x + W * (idx).y)");

        let addr = define(&src, "src_IMAGE_ADDR");
        assert!(addr.starts_with("ivec3("));
        assert_eq!(eval_components(addr, n), [3, 10, 0]);
        assert!(!src.contains("IMAGE_SAMPLE"));
        assert_eq!(define(&src, "src_IMAGE_BARE_T"), "image2DArray");
        assert_eq!(define(&src, "src_IMAGE_LAYOUT_Q"), "layout(rgba32f)");
        assert_eq!(
            define(&src, "src_IMAGE_T"),
            "src_IMAGE_LAYOUT_Q src_IMAGE_BARE_T"
        );
    }

    #[test]
    fn multisample_sample_varies_fastest() {
        let img = ImageInfo::new(
            get_image_target(gl::TEXTURE_2D_MULTISAMPLE_ARRAY).unwrap(),
            get_image_format(gl::RGBA8UI).unwrap(),
            8,
            4,
        );
        assert_eq!(img.size, ImageExtent::new(2, 4, 2, 2));
        let src = image_hunk(&img, "");

        let addr = define(&src, "IMAGE_ADDR");
        let sample = define(&src, "IMAGE_SAMPLE");
        assert!(addr.starts_with("ivec3("));
        // idx (5, 2) -> n = 21 -> sample 1 of pixel 10, which is (2, 0) in layer 1
        assert_eq!(eval_components(sample, 21), [1]);
        assert_eq!(eval_components(addr, 21), [2, 0, 1]);
        assert_eq!(define(&src, "BASE_T"), "uint");
        assert_eq!(define(&src, "DATA_T"), "uvec4");
        assert_eq!(define(&src, "IMAGE_BARE_T"), "uimage2DMSArray");
    }

    #[test]
    fn scale_is_per_channel() {
        let img = ImageInfo::new(
            get_image_target(gl::TEXTURE_2D).unwrap(),
            get_image_format(gl::RG16I).unwrap(),
            4,
            4,
        );
        let src = image_hunk(&img, "");
        assert_eq!(
            define(&src, "SCALE"),
            "vec4(3.27670000e4, 3.27670000e4, 0.00000000e0, 0.00000000e0)"
        );
    }

    #[test]
    fn header_defines_grid() {
        let g = GridInfo::new(
            StageFlags::COMPUTE,
            get_image_format(gl::RGBA32UI).unwrap(),
            16,
            8,
        );
        let src = header_hunk(&g);
        assert!(src.starts_with("#version 450 core\n"));
        assert_eq!(define(&src, "W"), "16");
        assert_eq!(define(&src, "H"), "8");
        assert_eq!(define(&src, "N"), "128");
        assert_eq!(define(&src, "GRID_T"), "uvec4");
        assert_eq!(define(&src, "RET_IMAGE_T"), "layout(rgba32ui) uimage2D");
        assert!(src.contains("#define IN_GRID(idx)"));
    }

    #[test]
    fn inputs_come_from_present_predecessor() {
        let g = grid(4, 4);
        let frag = stage_for_bit(StageFlags::FRAGMENT);

        let stages = StageFlags::TESS_EVAL.expanded();
        let src = generate_stage_source(&g, stages, frag, None);
        assert!(src.contains("flat in GRID_T tecolor;"));
        assert!(src.contains("fcolor = op(ivec2(gl_FragCoord.xy), tecolor);"));

        let stages = (StageFlags::TESS_CONTROL | StageFlags::GEOMETRY).expanded();
        let src = generate_stage_source(&g, stages, frag, None);
        assert!(src.contains("flat in GRID_T gcolor;"));
        let geom = stage_for_bit(StageFlags::GEOMETRY);
        let src = generate_stage_source(&g, stages, geom, None);
        assert!(src.contains("flat in ivec2 teidx[];"));

        let stages = StageFlags::FRAGMENT.expanded();
        let src = generate_stage_source(&g, stages, frag, None);
        assert!(src.contains("flat in GRID_T vcolor;"));
        assert!(!src.contains("IN("));
    }

    #[test]
    fn stage_sources_are_ordered() {
        let g = grid(8, 8);
        let op = "GRID_T op(ivec2 idx, GRID_T x) { return x + GRID_T(1); }";
        let vert = stage_for_bit(StageFlags::VERTEX);
        let src = generate_stage_source(&g, StageFlags::VERTEX.expanded(), vert, Some(op));

        let version = src.find("#version").unwrap();
        let decl = src.find("in vec4 in_position;").unwrap();
        let op_pos = src.find(op).unwrap();
        let main = src.find("void main()").unwrap();
        assert_eq!(version, 0);
        assert!(decl < op_pos && op_pos < main);
        assert!(!src.contains("return x;"));
    }

    #[test]
    fn compute_writes_result_image() {
        let g = GridInfo::new(
            StageFlags::COMPUTE,
            get_image_format(gl::RGBA32I).unwrap(),
            8,
            8,
        );
        let cs = stage_for_bit(StageFlags::COMPUTE);
        let src = generate_stage_source(&g, StageFlags::COMPUTE, cs, None);
        assert!(src.contains("layout(local_size_x = W) in;"));
        assert!(src.contains("uniform RET_IMAGE_T ret_img;"));
        assert!(src.contains("imageStore(ret_img, idx, op(idx, GRID_T(0)));"));
        assert!(src.contains("return x;"));
    }
}
