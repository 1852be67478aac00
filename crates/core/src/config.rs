//! Runtime configuration.
//!
//! The binary fills a [`RendererConfig`] from the command line; library
//! crates only ever see the validated struct.

use std::path::PathBuf;

use crate::error::{Error, Result};

/// Which Gaussian splats survive loading.
///
/// `alpha_cutoff` compares against the activated opacity (after the sigmoid),
/// so `0.0` keeps every splat. `min_scale` is the optional epsilon filter:
/// when set, splats whose largest activated scale axis is below it are
/// dropped. It is off by default because it changes what the scene looks like.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SplatFilter {
    pub alpha_cutoff: f32,
    pub min_scale: Option<f32>,
}

impl Default for SplatFilter {
    fn default() -> Self {
        Self {
            alpha_cutoff: 0.0,
            min_scale: None,
        }
    }
}

impl SplatFilter {
    /// Returns `true` when a splat with the given activated alpha and scale
    /// should be kept.
    pub fn keeps(&self, alpha: f32, scale: [f32; 3]) -> bool {
        if alpha < self.alpha_cutoff {
            return false;
        }
        match self.min_scale {
            Some(epsilon) => scale.iter().copied().fold(f32::MIN, f32::max) >= epsilon,
            None => true,
        }
    }
}

/// Everything needed to bring up a window and renderer.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    /// Enable `VK_LAYER_KHRONOS_validation` and the debug messenger.
    pub validation: bool,
    /// Force FIFO even when mailbox is available.
    pub vsync: bool,
    pub clear_color: [f32; 4],
    /// Directory holding the compiled `*.spv` shaders.
    pub shader_dir: PathBuf,
    /// Gaussian-splat PLY to display.
    pub point_cloud: Option<PathBuf>,
    pub splat_filter: SplatFilter,
    pub move_speed: f32,
    pub look_speed: f32,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: "Starlight".to_string(),
            validation: cfg!(debug_assertions),
            vsync: false,
            clear_color: [0.01, 0.01, 0.01, 1.0],
            shader_dir: PathBuf::from("shaders"),
            point_cloud: None,
            splat_filter: SplatFilter::default(),
            move_speed: 3.0,
            look_speed: 1.5,
        }
    }
}

impl RendererConfig {
    /// Check invariants that the rest of the workspace relies on.
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(Error::Config(format!(
                "window extent must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        let cutoff = self.splat_filter.alpha_cutoff;
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(Error::Config(format!(
                "alpha cutoff must be within [0, 1], got {cutoff}"
            )));
        }

        if let Some(epsilon) = self.splat_filter.min_scale
            && (epsilon.is_nan() || epsilon <= 0.0)
        {
            return Err(Error::Config(format!(
                "scale epsilon must be positive, got {epsilon}"
            )));
        }

        if self.move_speed < 0.0 || self.look_speed < 0.0 {
            return Err(Error::Config("camera speeds must not be negative".to_string()));
        }

        Ok(())
    }

    /// Path of a compiled shader inside [`shader_dir`](Self::shader_dir).
    pub fn shader_path(&self, name: &str) -> PathBuf {
        self.shader_dir.join(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = RendererConfig::default();
        assert_eq!((config.width, config.height), (800, 600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_extent_rejected() {
        let config = RendererConfig {
            height: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_alpha_cutoff_range() {
        let mut config = RendererConfig::default();
        config.splat_filter.alpha_cutoff = 1.5;
        assert!(config.validate().is_err());
        config.splat_filter.alpha_cutoff = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_scale_epsilon_must_be_positive() {
        let mut config = RendererConfig::default();
        config.splat_filter.min_scale = Some(0.0);
        assert!(config.validate().is_err());
        config.splat_filter.min_scale = Some(f32::NAN);
        assert!(config.validate().is_err());
        config.splat_filter.min_scale = Some(1e-4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_filter_keeps_everything() {
        let filter = SplatFilter::default();
        assert!(filter.keeps(0.0, [0.0; 3]));
        assert!(filter.keeps(1.0, [1e-9; 3]));
    }

    #[test]
    fn test_filter_alpha_cutoff() {
        let filter = SplatFilter {
            alpha_cutoff: 0.1,
            min_scale: None,
        };
        assert!(!filter.keeps(0.05, [1.0; 3]));
        assert!(filter.keeps(0.1, [1.0; 3]));
    }

    #[test]
    fn test_filter_scale_epsilon_uses_largest_axis() {
        let filter = SplatFilter {
            alpha_cutoff: 0.0,
            min_scale: Some(0.01),
        };
        assert!(!filter.keeps(1.0, [0.001, 0.002, 0.005]));
        assert!(filter.keeps(1.0, [0.001, 0.02, 0.005]));
    }

    #[test]
    fn test_shader_path() {
        let config = RendererConfig::default();
        assert_eq!(
            config.shader_path("mesh.vert.spv"),
            PathBuf::from("shaders").join("mesh.vert.spv")
        );
    }
}
