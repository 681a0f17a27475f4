//! Creating and checking unpacked pixel data.
//!
//! Expected values are `f64`s in the domain of the format (normalized formats in
//! `[0, 1]` or `[-1, 1]`, integer formats as integers). A non-finite expected value
//! matches anything.
use crate::error::{Mismatch, Result};
use crate::extent::ImageInfo;

/// Pixel data for `img` with every pixel set to `value`.
pub fn init_pixels(img: &ImageInfo, value: [f64; 4]) -> Vec<u32> {
    init_pixels_with(img, |_| value)
}

/// Pixel data for `img`, with the value of each pixel given by `f(linear index)`.
pub fn init_pixels_with<F>(img: &ImageInfo, mut f: F) -> Vec<u32>
where
    F: FnMut(u32) -> [f64; 4],
{
    let m = img.format.num_components();
    let n = img.size.product();
    let mut pixels = Vec::with_capacity(n as usize * m);
    for i in 0..n {
        let v = f(i);
        pixels.extend(v[..m].iter().map(|&c| img.format.encode(c)));
    }
    pixels
}

/// Checks that every pixel of `pixels` equals `expect`.
pub fn check_pixels(img: &ImageInfo, pixels: &[u32], expect: [f64; 4]) -> Result<()> {
    check_pixels_vs(img, 0, pixels, &expect)
}

/// Checks `pixels` against per-pixel expected values, laid out like the pixel data.
pub fn check_pixels_v(img: &ImageInfo, pixels: &[u32], expect: &[f64]) -> Result<()> {
    check_pixels_vs(img, 1, pixels, expect)
}

/// Checks pixel `i` of `pixels` against the components starting at
/// `expect[i * stride * components]`. A `stride` of 0 compares every pixel to the
/// same value.
///
/// Stops at the first mismatching pixel.
pub fn check_pixels_vs(
    img: &ImageInfo,
    stride: usize,
    pixels: &[u32],
    expect: &[f64],
) -> Result<()> {
    let fmt = img.format;
    let m = fmt.num_components();
    let n = img.size.product() as usize;
    assert!(pixels.len() >= n * m, "not enough pixel data to check");
    assert!(
        n == 0 || expect.len() >= ((n - 1) * stride + 1) * m,
        "{} expected values for {} pixels of {} components at stride {}",
        expect.len(),
        n,
        m,
        stride
    );

    for i in 0..n {
        let e = &expect[i * stride * m..][..m];
        let p = &pixels[i * m..][..m];
        let bad = (0..m).any(|c| {
            let observed = fmt.decode(p[c]);
            e[c].is_finite() && (e[c] - observed).abs() > img.epsilon[c]
        });

        if bad {
            let mut expected = [0.0; 4];
            let mut observed = [0.0; 4];
            for c in 0..m {
                expected[c] = e[c];
                observed[c] = fmt.decode(p[c]);
            }
            let mismatch = Mismatch {
                coord: img.address(i as u32),
                expected,
                observed,
                components: m,
            };
            warn!("{} {} image: {}", fmt.name, img.target.name, mismatch);
            return Err(mismatch.into());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api as gl;
    use crate::error::Error;
    use crate::extent::ImageExtent;
    use crate::format::get_image_format;
    use crate::target::get_image_target;

    fn image(format: u32, size: ImageExtent) -> ImageInfo {
        ImageInfo::with_size(
            get_image_target(gl::TEXTURE_2D).unwrap(),
            get_image_format(format).unwrap(),
            size,
        )
    }

    #[test]
    fn init_encodes_used_channels() {
        let img = image(gl::RG32I, ImageExtent::new(2, 2, 1, 1));
        let pixels = init_pixels(&img, [-1.0, 7.0, 3.0, 3.0]);
        assert_eq!(pixels.len(), 8);
        assert_eq!(&pixels[..2], &[(-1i32) as u32, 7]);
        assert!(check_pixels(&img, &pixels, [-1.0, 7.0, 0.0, 0.0]).is_ok());
    }

    #[test]
    fn mismatch_reports_first_bad_pixel() {
        let _ = pretty_env_logger::try_init();
        let img = image(gl::R32UI, ImageExtent::new(4, 4, 1, 1));
        let mut pixels = init_pixels_with(&img, |i| [f64::from(i), 0.0, 0.0, 0.0]);
        pixels[6] = 100;
        pixels[9] = 100;

        let expect: Vec<f64> = (0..16).map(f64::from).collect();
        match check_pixels_v(&img, &pixels, &expect) {
            Err(Error::Mismatch(m)) => {
                assert_eq!(m.coord, [2, 1, 0, 0]);
                assert_eq!(m.expected[0], 6.0);
                assert_eq!(m.observed[0], 100.0);
                assert_eq!(m.components, 1);
            }
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn float_formats_compare_within_epsilon() {
        let img = image(gl::RGBA8, ImageExtent::new(2, 1, 1, 1));
        let pixels = init_pixels(&img, [0.5, 0.25, 1.0, 0.0]);
        assert!(check_pixels(&img, &pixels, [0.5 + 1.0 / 512.0, 0.25, 1.0, 0.0]).is_ok());
        assert!(check_pixels(&img, &pixels, [0.5 + 1.0 / 128.0, 0.25, 1.0, 0.0]).is_err());
    }

    #[test]
    #[should_panic(expected = "8 expected values for 16 pixels")]
    fn short_expectations_are_rejected() {
        let img = image(gl::RG32F, ImageExtent::new(4, 4, 1, 1));
        let pixels = init_pixels(&img, [0.0; 4]);
        let _ = check_pixels_v(&img, &pixels, &[0.0; 8]);
    }

    #[test]
    fn constant_expectation_needs_one_pixel() {
        let img = image(gl::RG32F, ImageExtent::new(4, 4, 1, 1));
        let pixels = init_pixels(&img, [0.25, 0.5, 0.0, 0.0]);
        assert!(check_pixels_vs(&img, 0, &pixels, &[0.25, 0.5]).is_ok());
    }

    #[test]
    fn non_finite_expectations_are_ignored() {
        let img = image(gl::RGBA32F, ImageExtent::new(2, 2, 1, 1));
        let pixels = init_pixels(&img, [1.0, 2.0, 3.0, 4.0]);
        assert!(check_pixels(&img, &pixels, [1.0, std::f64::NAN, 3.0, std::f64::INFINITY]).is_ok());
        assert!(check_pixels(&img, &pixels, [1.0, std::f64::NAN, 0.0, 4.0]).is_err());
    }
}
