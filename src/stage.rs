//! Shader stages a grid can run through.
use crate::api::{self as gl, types::*};
use bitflags::bitflags;

bitflags! {
    /// Set of shader stages. Bit values match the `GL_*_SHADER_BIT` tokens.
    pub struct StageFlags: u32 {
        const VERTEX = gl::VERTEX_SHADER_BIT;
        const TESS_CONTROL = gl::TESS_CONTROL_SHADER_BIT;
        const TESS_EVAL = gl::TESS_EVALUATION_SHADER_BIT;
        const GEOMETRY = gl::GEOMETRY_SHADER_BIT;
        const FRAGMENT = gl::FRAGMENT_SHADER_BIT;
        const COMPUTE = gl::COMPUTE_SHADER_BIT;

        const TESS = Self::TESS_CONTROL.bits | Self::TESS_EVAL.bits;
        const GRAPHICS = Self::VERTEX.bits
            | Self::TESS_CONTROL.bits
            | Self::TESS_EVAL.bits
            | Self::GEOMETRY.bits
            | Self::FRAGMENT.bits;
    }
}

impl StageFlags {
    /// Completes a requested stage set into something that can actually run.
    ///
    /// Tessellation needs vertex, both tessellation stages and fragment. Any other
    /// graphics stage needs at least vertex and fragment. Compute runs alone.
    ///
    /// Panics if compute is mixed with graphics stages.
    pub fn expanded(self) -> StageFlags {
        if self.contains(StageFlags::COMPUTE) {
            assert!(
                !self.intersects(StageFlags::GRAPHICS),
                "compute and graphics stages cannot share a grid"
            );
            return StageFlags::COMPUTE;
        }

        let mut stages = self;
        if stages.intersects(StageFlags::TESS) {
            stages |= StageFlags::VERTEX | StageFlags::TESS | StageFlags::FRAGMENT;
        } else if stages.intersects(StageFlags::GRAPHICS) {
            stages |= StageFlags::VERTEX | StageFlags::FRAGMENT;
        }
        stages
    }

    /// Stages of this set in pipeline order.
    pub fn stages(self) -> impl Iterator<Item = &'static ImageStage> {
        IMAGE_STAGES.iter().filter(move |s| self.contains(s.bit))
    }

    /// The stage of this set that runs immediately before `stage`, if any.
    pub fn predecessor(self, stage: &ImageStage) -> Option<&'static ImageStage> {
        if stage.bit == StageFlags::COMPUTE {
            return None;
        }
        IMAGE_STAGES
            .iter()
            .take_while(|s| s.bit != stage.bit)
            .filter(|s| self.contains(s.bit))
            .last()
    }
}

//--------------------------------------------------------------------------------------------------

/// Static description of one shader stage.
#[derive(Debug)]
pub struct ImageStage {
    /// Human readable name, used in logs and subtest names.
    pub name: &'static str,
    /// `GL_*_SHADER` enum.
    pub stage: GLenum,
    pub bit: StageFlags,
    /// Limit queried for the number of image uniforms usable from this stage.
    pub max_images_param: GLenum,
    /// Prefix of the variables this stage passes down the pipeline
    /// (`vidx`/`vcolor` for the vertex stage, etc.).
    pub(crate) out_prefix: &'static str,
}

/// Known stages, in pipeline order.
pub static IMAGE_STAGES: [ImageStage; 6] = [
    ImageStage {
        name: "Vertex",
        stage: gl::VERTEX_SHADER,
        bit: StageFlags::VERTEX,
        max_images_param: gl::MAX_VERTEX_IMAGE_UNIFORMS,
        out_prefix: "v",
    },
    ImageStage {
        name: "Tessellation control",
        stage: gl::TESS_CONTROL_SHADER,
        bit: StageFlags::TESS_CONTROL,
        max_images_param: gl::MAX_TESS_CONTROL_IMAGE_UNIFORMS,
        out_prefix: "tc",
    },
    ImageStage {
        name: "Tessellation evaluation",
        stage: gl::TESS_EVALUATION_SHADER,
        bit: StageFlags::TESS_EVAL,
        max_images_param: gl::MAX_TESS_EVALUATION_IMAGE_UNIFORMS,
        out_prefix: "te",
    },
    ImageStage {
        name: "Geometry",
        stage: gl::GEOMETRY_SHADER,
        bit: StageFlags::GEOMETRY,
        max_images_param: gl::MAX_GEOMETRY_IMAGE_UNIFORMS,
        out_prefix: "g",
    },
    ImageStage {
        name: "Fragment",
        stage: gl::FRAGMENT_SHADER,
        bit: StageFlags::FRAGMENT,
        max_images_param: gl::MAX_FRAGMENT_IMAGE_UNIFORMS,
        out_prefix: "f",
    },
    ImageStage {
        name: "Compute",
        stage: gl::COMPUTE_SHADER,
        bit: StageFlags::COMPUTE,
        max_images_param: gl::MAX_COMPUTE_IMAGE_UNIFORMS,
        out_prefix: "c",
    },
];

pub fn get_image_stage(stage: GLenum) -> Option<&'static ImageStage> {
    IMAGE_STAGES.iter().find(|s| s.stage == stage)
}

/// Stage description for a single-bit flag.
///
/// Panics if `bit` is not exactly one known stage.
pub fn stage_for_bit(bit: StageFlags) -> &'static ImageStage {
    IMAGE_STAGES
        .iter()
        .find(|s| s.bit == bit)
        .unwrap_or_else(|| panic!("not a single shader stage: {:?}", bit))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(stages: StageFlags) -> Vec<&'static str> {
        stages.stages().map(|s| s.name).collect()
    }

    #[test]
    fn tess_control_pulls_in_full_pipeline() {
        let s = StageFlags::TESS_CONTROL.expanded();
        assert_eq!(
            names(s),
            [
                "Vertex",
                "Tessellation control",
                "Tessellation evaluation",
                "Fragment"
            ]
        );
        let s = (StageFlags::TESS_EVAL | StageFlags::GEOMETRY).expanded();
        assert_eq!(s.stages().count(), 5);
    }

    #[test]
    fn graphics_stages_get_vertex_and_fragment() {
        assert_eq!(
            StageFlags::FRAGMENT.expanded(),
            StageFlags::VERTEX | StageFlags::FRAGMENT
        );
        assert_eq!(
            StageFlags::VERTEX.expanded(),
            StageFlags::VERTEX | StageFlags::FRAGMENT
        );
        assert_eq!(
            StageFlags::GEOMETRY.expanded(),
            StageFlags::VERTEX | StageFlags::GEOMETRY | StageFlags::FRAGMENT
        );
        assert_eq!(StageFlags::COMPUTE.expanded(), StageFlags::COMPUTE);
        assert_eq!(StageFlags::empty().expanded(), StageFlags::empty());
    }

    #[test]
    #[should_panic]
    fn compute_does_not_mix_with_graphics() {
        (StageFlags::COMPUTE | StageFlags::FRAGMENT).expanded();
    }

    #[test]
    fn predecessor_follows_present_stages() {
        let frag = stage_for_bit(StageFlags::FRAGMENT);
        let geom = stage_for_bit(StageFlags::GEOMETRY);
        let tes = stage_for_bit(StageFlags::TESS_EVAL);
        let vert = stage_for_bit(StageFlags::VERTEX);

        let s = StageFlags::GEOMETRY.expanded();
        assert_eq!(s.predecessor(frag).unwrap().out_prefix, "g");
        assert_eq!(s.predecessor(geom).unwrap().out_prefix, "v");
        assert!(s.predecessor(vert).is_none());

        let s = StageFlags::TESS_CONTROL.expanded();
        assert_eq!(s.predecessor(frag).unwrap().out_prefix, "te");
        assert_eq!(s.predecessor(tes).unwrap().out_prefix, "tc");

        let s = StageFlags::FRAGMENT.expanded();
        assert_eq!(s.predecessor(frag).unwrap().out_prefix, "v");
    }

    #[test]
    fn lookup_by_enum() {
        assert_eq!(
            get_image_stage(gl::TESS_EVALUATION_SHADER).unwrap().bit,
            StageFlags::TESS_EVAL
        );
        assert!(get_image_stage(gl::TEXTURE_2D).is_none());
    }
}
