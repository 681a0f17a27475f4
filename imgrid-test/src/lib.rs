//! Test fixtures for imgrid.
//! Creates a hidden window and an OpenGL 4.5 core context with glutin and hands a
//! `Harness` bound to it to the test body.
use glutin::GlContext;
use imgrid::{Harness, HarnessConfig};
use log::warn;

/// Reads `imgrid.toml` (if present) and `IMGRID_*` environment variables,
/// e.g. `IMGRID_HARNESS__CLEAR_VALUE=0.25`.
pub fn load_config() -> config::Config {
    let mut cfg = config::Config::new();
    cfg.merge(config::File::with_name("imgrid").required(false))
        .expect("invalid imgrid.toml");
    cfg.merge(config::Environment::with_prefix("IMGRID").separator("__"))
        .expect("invalid IMGRID_* environment variables");
    cfg
}

pub fn with_test_fixture<F>(title: &str, f: F)
where
    F: FnOnce(&Harness),
{
    let _ = pretty_env_logger::try_init();

    let events_loop = glutin::EventsLoop::new();
    let window_builder = glutin::WindowBuilder::new()
        .with_title(title)
        .with_visibility(false)
        .with_dimensions((64, 64).into());
    let context_builder = glutin::ContextBuilder::new()
        .with_gl_profile(glutin::GlProfile::Core)
        .with_gl_debug_flag(true)
        .with_gl(glutin::GlRequest::Specific(glutin::Api::OpenGl, (4, 5)));
    let window = glutin::GlWindow::new(window_builder, context_builder, &events_loop)
        .expect("unable to create window");

    let cfg = load_config();
    let harness = unsafe {
        window.make_current().expect("unable to make context current");
        Harness::load_with(
            |symbol| window.get_proc_address(symbol) as *const _,
            HarnessConfig::from_config(&cfg),
        )
    };

    f(&harness);

    // GL objects go away while the context is still alive
    drop(harness);
}

/// Fails the test on error, except for unsupported features which only get logged.
pub fn check(result: imgrid::Result<()>) {
    match result {
        Ok(()) => {}
        Err(ref e) if e.is_unsupported() => warn!("skipped: {}", e),
        Err(e) => panic!("{}", e),
    }
}
