//! Output settings for an export.

use serde::{Deserialize, Serialize};

use crate::timeline::TimelineError;

/// Named output presets with fixed resolutions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PlatformPreset {
    /// 9:16 vertical reel.
    InstagramReel,
    /// 1:1 feed post.
    InstagramSquare,
    /// 4:5 feed post.
    InstagramPortrait,
    /// 16:9 landscape.
    YouTube,
    /// 9:16 vertical.
    TikTok,
    /// Caller-defined resolution.
    #[default]
    Custom,
}

impl PlatformPreset {
    /// Fixed `(width, height)` for the preset, `None` for [`PlatformPreset::Custom`].
    pub fn resolution(self) -> Option<(u32, u32)> {
        match self {
            PlatformPreset::InstagramReel | PlatformPreset::TikTok => Some((1080, 1920)),
            PlatformPreset::InstagramSquare => Some((1080, 1080)),
            PlatformPreset::InstagramPortrait => Some((1080, 1350)),
            PlatformPreset::YouTube => Some((1920, 1080)),
            PlatformPreset::Custom => None,
        }
    }
}

/// Output raster and timing settings. Immutable for the duration of one export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorSettings {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    #[serde(default)]
    pub preset: PlatformPreset,
    /// Snap distance in frames used by [`crate::sequencer::snap_frame`].
    #[serde(default = "default_snap_tolerance")]
    pub snap_tolerance_frames: u64,
}

fn default_snap_tolerance() -> u64 {
    5
}

impl Default for EditorSettings {
    fn default() -> Self {
        Self::for_preset(PlatformPreset::InstagramReel, 30.0)
    }
}

impl EditorSettings {
    /// Settings for a named preset. `Custom` starts at 1080x1080.
    pub fn for_preset(preset: PlatformPreset, fps: f64) -> Self {
        let (width, height) = preset.resolution().unwrap_or((1080, 1080));
        Self {
            width,
            height,
            fps,
            preset,
            snap_tolerance_frames: default_snap_tolerance(),
        }
    }

    /// Custom resolution.
    pub fn custom(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            preset: PlatformPreset::Custom,
            snap_tolerance_frames: default_snap_tolerance(),
        }
    }

    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height.max(1) as f64
    }

    pub fn validate(&self) -> Result<(), TimelineError> {
        if self.width == 0 || self.height == 0 {
            return Err(TimelineError::InvalidSettings {
                message: format!("output size {}x{} must be non-zero", self.width, self.height),
            });
        }
        if !self.fps.is_finite() || self.fps <= 0.0 {
            return Err(TimelineError::InvalidSettings {
                message: format!("frame rate {} must be positive", self.fps),
            });
        }
        if let Some(expected) = self.preset.resolution() {
            if expected != (self.width, self.height) {
                tracing::warn!(
                    preset = ?self.preset,
                    width = self.width,
                    height = self.height,
                    "Output size differs from preset resolution"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preset_resolutions() {
        assert_eq!(PlatformPreset::InstagramReel.resolution(), Some((1080, 1920)));
        assert_eq!(PlatformPreset::YouTube.resolution(), Some((1920, 1080)));
        assert_eq!(PlatformPreset::Custom.resolution(), None);
    }

    #[test]
    fn test_settings_validation() {
        assert!(EditorSettings::default().validate().is_ok());
        assert!(EditorSettings::custom(0, 100, 30.0).validate().is_err());
        assert!(EditorSettings::custom(100, 100, 0.0).validate().is_err());
        assert!(EditorSettings::custom(100, 100, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_settings_deserialization_defaults() {
        let json = r#"{ "width": 640, "height": 360, "fps": 12.0 }"#;
        let settings: EditorSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.preset, PlatformPreset::Custom);
        assert_eq!(settings.snap_tolerance_frames, 5);
        assert!((settings.aspect_ratio() - 16.0 / 9.0).abs() < 1e-9);
    }
}
