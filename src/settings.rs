//! Host-facing blur tunables.

use serde::{Deserialize, Serialize};

/// Tunables for the pyramid blur path.
///
/// Hosts typically persist this as plain configuration data and hand it
/// back every frame; all fields are clamped on use, so stale or
/// out-of-range persisted values cannot break a render.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurSettings {
    /// Perceived blur radius control in `[0, 10]`.
    pub diffusion: f32,
    /// Selects the cheap 4-tap downsample / box upsample kernel pair
    /// instead of the 13-tap / tent pair.
    pub fast_mode: bool,
}

impl Default for BlurSettings {
    fn default() -> Self {
        Self {
            diffusion: 0.0,
            fast_mode: false,
        }
    }
}

impl BlurSettings {
    /// Copy with `diffusion` clamped to `[0, 10]` (non-finite values
    /// collapse to 0).
    pub fn clamped(self) -> Self {
        let diffusion = if self.diffusion.is_finite() {
            self.diffusion.clamp(0.0, 10.0)
        } else {
            0.0
        };
        Self { diffusion, ..self }
    }
}
