use config::Config;

/// Tunables of the harness, read from the `harness.*` keys of a `config::Config`.
#[derive(Clone, Debug)]
pub struct HarnessConfig {
    /// Image unit receiving the results of compute grids. Defaults to the last unit.
    pub result_unit: Option<u32>,
    /// Value the result image or framebuffer is cleared to before a grid runs.
    pub clear_value: f64,
    /// Log every generated shader source at debug level, not only failing ones.
    pub log_shader_source: bool,
    /// Install the GL debug output callback.
    pub gl_debug: bool,
}

impl Default for HarnessConfig {
    fn default() -> HarnessConfig {
        HarnessConfig {
            result_unit: None,
            clear_value: 0.5,
            log_shader_source: false,
            gl_debug: true,
        }
    }
}

impl HarnessConfig {
    pub fn from_config(cfg: &Config) -> HarnessConfig {
        let default = HarnessConfig::default();
        HarnessConfig {
            result_unit: cfg.get::<u32>("harness.result_unit").ok(),
            clear_value: cfg
                .get::<f64>("harness.clear_value")
                .unwrap_or(default.clear_value),
            log_shader_source: cfg
                .get::<bool>("harness.log_shader_source")
                .unwrap_or(default.log_shader_source),
            gl_debug: cfg.get::<bool>("harness.gl_debug").unwrap_or(default.gl_debug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let c = HarnessConfig::from_config(&Config::new());
        assert_eq!(c.result_unit, None);
        assert_eq!(c.clear_value, 0.5);
        assert!(!c.log_shader_source);
        assert!(c.gl_debug);
    }

    #[test]
    fn reads_harness_keys() {
        let mut cfg = Config::new();
        cfg.set("harness.result_unit", 3i64).unwrap();
        cfg.set("harness.clear_value", 0.25).unwrap();
        cfg.set("harness.gl_debug", false).unwrap();
        let c = HarnessConfig::from_config(&cfg);
        assert_eq!(c.result_unit, Some(3));
        assert_eq!(c.clear_value, 0.25);
        assert!(!c.gl_debug);
        assert!(!c.log_shader_source);
    }
}
