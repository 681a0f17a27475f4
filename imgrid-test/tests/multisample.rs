//! Multisample images go through shader blits in both directions.
//!
//! These need an OpenGL 4.5 context; run with `cargo test -p imgrid-test -- --ignored`.
use imgrid::api as gl;
use imgrid::pixels::{check_pixels_v, init_pixels_with};
use imgrid::stage::stage_for_bit;
use imgrid::{get_image_format, ImageInfo, StageFlags};
use imgrid_test::{check, with_test_fixture};
use log::info;

const FORMATS: [u32; 4] = [gl::RGBA32F, gl::RGBA8, gl::RG16I, gl::R32UI];

fn value(i: u32, c: usize, integer: bool) -> f64 {
    let k = i * 4 + c as u32;
    if integer {
        f64::from(k % 251)
    } else {
        f64::from(k % 255) / 255.0
    }
}

#[test]
#[ignore]
fn multisample_round_trip() {
    with_test_fixture("multisample_round_trip", |h| {
        for target in h.image_targets() {
            if !target.is_multisample() {
                continue;
            }
            for &format in FORMATS.iter() {
                let fmt = get_image_format(format).unwrap();
                let img = ImageInfo::new(target, fmt, 16, 32);
                assert_eq!(img.num_samples(), 2);
                info!("{} {} {:?}", target.name, fmt.name, img.size);

                let integer = fmt.base_type() != imgrid::BaseType::Float;
                let m = fmt.num_components();
                check((|| {
                    h.require_image(&img)?;
                    h.require_stage_images(stage_for_bit(StageFlags::FRAGMENT), 1)?;
                    let pixels = init_pixels_with(&img, |i| {
                        let mut v = [0.0; 4];
                        for (c, x) in v.iter_mut().enumerate() {
                            *x = value(i, c, integer);
                        }
                        v
                    });
                    h.upload_image(&img, 1, &pixels)?;
                    let observed = h.download_image(&img, 1)?;

                    let expect: Vec<f64> = (0..img.size.product())
                        .flat_map(|i| (0..m).map(move |c| value(i, c, integer)))
                        .collect();
                    check_pixels_v(&img, &observed, &expect)
                })());
            }
        }
    })
}
