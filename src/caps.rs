//! Driver limits relevant to image load/store, queried lazily and memoized.
use crate::api::{self as gl, types::*, Gl};
use crate::extent::ImageExtent;
use crate::stage::{ImageStage, IMAGE_STAGES};
use crate::target::{ImageTarget, IMAGE_TARGETS};
use fxhash::FxHashMap;
use std::cell::RefCell;

/// Source of integer implementation limits.
pub trait CapabilityQuery {
    /// Value of `pname`, or `None` if the driver rejects the query.
    fn get_integer(&self, pname: GLenum) -> Option<i32>;
}

impl CapabilityQuery for Gl {
    fn get_integer(&self, pname: GLenum) -> Option<i32> {
        let mut v = 0;
        unsafe {
            self.GetIntegerv(pname, &mut v);
            if self.GetError() == gl::NO_ERROR {
                Some(v)
            } else {
                None
            }
        }
    }
}

/// Memoized view of the driver limits.
///
/// Every value is fetched from the driver at most once; the stage and target
/// lists are built on first use and returned from the cache afterwards.
#[derive(Default)]
pub struct Capabilities {
    ints: RefCell<FxHashMap<GLenum, i32>>,
    stages: RefCell<Option<Vec<&'static ImageStage>>>,
    targets: RefCell<Option<Vec<&'static ImageTarget>>>,
}

impl Capabilities {
    pub fn new() -> Capabilities {
        Capabilities::default()
    }

    /// Integer limit `pname`. Queries the driver on first use; unsupported queries read as 0.
    pub fn integer(&self, q: &dyn CapabilityQuery, pname: GLenum) -> i32 {
        if let Some(&v) = self.ints.borrow().get(&pname) {
            return v;
        }
        let v = q.get_integer(pname).unwrap_or_else(|| {
            debug!("limit 0x{:04x} not supported by the driver", pname);
            0
        });
        self.ints.borrow_mut().insert(pname, v);
        v
    }

    fn limit(&self, q: &dyn CapabilityQuery, pname: GLenum) -> u32 {
        self.integer(q, pname).max(0) as u32
    }

    pub fn image_stage_max_images(&self, q: &dyn CapabilityQuery, stage: &ImageStage) -> u32 {
        self.limit(q, stage.max_images_param)
    }

    pub fn max_image_units(&self, q: &dyn CapabilityQuery) -> u32 {
        self.limit(q, gl::MAX_IMAGE_UNITS)
    }

    pub fn max_combined_images(&self, q: &dyn CapabilityQuery) -> u32 {
        self.limit(q, gl::MAX_COMBINED_IMAGE_UNIFORMS)
    }

    /// Largest extent an image of `target` can have, in the target's native layout.
    pub fn image_target_limits(
        &self,
        q: &dyn CapabilityQuery,
        target: &ImageTarget,
    ) -> ImageExtent {
        let size = self.limit(q, gl::MAX_TEXTURE_SIZE);
        let layers = || self.limit(q, gl::MAX_ARRAY_TEXTURE_LAYERS);
        let cube = || self.limit(q, gl::MAX_CUBE_MAP_TEXTURE_SIZE);
        let samples = || self.limit(q, gl::MAX_IMAGE_SAMPLES);

        match target.target {
            gl::TEXTURE_1D => ImageExtent::new(size, 1, 1, 1),
            gl::TEXTURE_2D => ImageExtent::new(size, size, 1, 1),
            gl::TEXTURE_3D => {
                let s = self.limit(q, gl::MAX_3D_TEXTURE_SIZE);
                ImageExtent::new(s, s, s, 1)
            }
            gl::TEXTURE_RECTANGLE => {
                let s = self.limit(q, gl::MAX_RECTANGLE_TEXTURE_SIZE);
                ImageExtent::new(s, s, 1, 1)
            }
            gl::TEXTURE_CUBE_MAP => ImageExtent::new(cube(), cube(), 6, 1),
            gl::TEXTURE_BUFFER => {
                ImageExtent::new(self.limit(q, gl::MAX_TEXTURE_BUFFER_SIZE), 1, 1, 1)
            }
            gl::TEXTURE_1D_ARRAY => ImageExtent::new(size, layers(), 1, 1),
            gl::TEXTURE_2D_ARRAY => ImageExtent::new(size, size, layers(), 1),
            gl::TEXTURE_CUBE_MAP_ARRAY => ImageExtent::new(cube(), cube(), layers(), 1),
            gl::TEXTURE_2D_MULTISAMPLE => ImageExtent::new(samples(), size, size, 1),
            gl::TEXTURE_2D_MULTISAMPLE_ARRAY => ImageExtent::new(samples(), size, size, layers()),
            other => unreachable!("unknown image target 0x{:04x}", other),
        }
    }

    /// Stages that can access at least one image uniform.
    pub fn image_stages(&self, q: &dyn CapabilityQuery) -> Vec<&'static ImageStage> {
        if let Some(stages) = &*self.stages.borrow() {
            return stages.clone();
        }
        let stages: Vec<_> = IMAGE_STAGES
            .iter()
            .filter(|s| self.image_stage_max_images(q, s) > 0)
            .collect();
        debug!(
            "image stages: {:?}",
            stages.iter().map(|s| s.name).collect::<Vec<_>>()
        );
        *self.stages.borrow_mut() = Some(stages.clone());
        stages
    }

    /// Targets the driver can create images of.
    pub fn image_targets(&self, q: &dyn CapabilityQuery) -> Vec<&'static ImageTarget> {
        if let Some(targets) = &*self.targets.borrow() {
            return targets.clone();
        }
        let targets: Vec<_> = IMAGE_TARGETS
            .iter()
            .filter(|t| !self.image_target_limits(q, t).is_empty())
            .collect();
        debug!(
            "image targets: {:?}",
            targets.iter().map(|t| t.name).collect::<Vec<_>>()
        );
        *self.targets.borrow_mut() = Some(targets.clone());
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Answers every limit with a fixed value and counts the queries.
    struct CountingQuery {
        calls: Cell<usize>,
        samples: i32,
    }

    impl CountingQuery {
        fn new(samples: i32) -> CountingQuery {
            CountingQuery {
                calls: Cell::new(0),
                samples,
            }
        }
    }

    impl CapabilityQuery for CountingQuery {
        fn get_integer(&self, pname: GLenum) -> Option<i32> {
            self.calls.set(self.calls.get() + 1);
            match pname {
                gl::MAX_IMAGE_SAMPLES => Some(self.samples),
                gl::MAX_GEOMETRY_IMAGE_UNIFORMS => None,
                gl::MAX_TESS_CONTROL_IMAGE_UNIFORMS => Some(0),
                _ => Some(2048),
            }
        }
    }

    #[test]
    fn stage_list_is_cached() {
        let q = CountingQuery::new(4);
        let caps = Capabilities::new();

        let first = caps.image_stages(&q);
        let calls = q.calls.get();
        assert!(calls > 0);
        let second = caps.image_stages(&q);
        assert_eq!(q.calls.get(), calls);

        assert_eq!(first.len(), second.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(std::ptr::eq(*a, *b));
        }
        let names: Vec<_> = first.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            ["Vertex", "Tessellation evaluation", "Fragment", "Compute"]
        );
    }

    #[test]
    fn target_list_is_cached() {
        let q = CountingQuery::new(4);
        let caps = Capabilities::new();

        let first = caps.image_targets(&q);
        let calls = q.calls.get();
        let second = caps.image_targets(&q);
        assert_eq!(q.calls.get(), calls);
        assert_eq!(first.len(), IMAGE_TARGETS.len());
        for (a, b) in first.iter().zip(second.iter()) {
            assert!(std::ptr::eq(*a, *b));
        }
    }

    #[test]
    fn no_multisample_images_without_samples() {
        let q = CountingQuery::new(0);
        let caps = Capabilities::new();
        let targets = caps.image_targets(&q);
        assert_eq!(targets.len(), IMAGE_TARGETS.len() - 2);
        assert!(targets.iter().all(|t| !t.is_multisample()));
    }

    /// Mock with the limits of a typical desktop driver.
    struct DesktopQuery;

    impl CapabilityQuery for DesktopQuery {
        fn get_integer(&self, pname: GLenum) -> Option<i32> {
            Some(match pname {
                gl::MAX_TEXTURE_SIZE
                | gl::MAX_RECTANGLE_TEXTURE_SIZE
                | gl::MAX_CUBE_MAP_TEXTURE_SIZE => 16384,
                gl::MAX_3D_TEXTURE_SIZE | gl::MAX_ARRAY_TEXTURE_LAYERS => 2048,
                gl::MAX_TEXTURE_BUFFER_SIZE => 134_217_728,
                gl::MAX_IMAGE_SAMPLES => 0,
                _ => 8,
            })
        }
    }

    #[test]
    fn large_limits_keep_layered_targets() {
        let caps = Capabilities::new();
        let names: Vec<_> = caps
            .image_targets(&DesktopQuery)
            .iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(
            names,
            ["1D", "2D", "3D", "2DRect", "Cube", "Buffer", "1DArray", "2DArray", "CubeArray"]
        );

        let array = crate::target::get_image_target(gl::TEXTURE_2D_ARRAY).unwrap();
        assert_eq!(
            caps.image_target_limits(&DesktopQuery, array),
            ImageExtent::new(16384, 16384, 2048, 1)
        );
    }

    #[test]
    fn integers_are_memoized() {
        let q = CountingQuery::new(8);
        let caps = Capabilities::new();
        assert_eq!(caps.integer(&q, gl::MAX_IMAGE_SAMPLES), 8);
        assert_eq!(caps.integer(&q, gl::MAX_IMAGE_SAMPLES), 8);
        assert_eq!(caps.integer(&q, gl::MAX_GEOMETRY_IMAGE_UNIFORMS), 0);
        assert_eq!(caps.integer(&q, gl::MAX_GEOMETRY_IMAGE_UNIFORMS), 0);
        assert_eq!(q.calls.get(), 2);

        let cube = crate::target::get_image_target(gl::TEXTURE_CUBE_MAP).unwrap();
        assert_eq!(
            caps.image_target_limits(&q, cube),
            ImageExtent::new(2048, 2048, 6, 1)
        );
    }
}
