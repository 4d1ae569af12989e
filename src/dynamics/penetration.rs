use serde::{Deserialize, Serialize};

/// Share of the correction budget given to each body of a pair.
pub const PAIRING_SHARE: f32 = 0.5;
/// Share of a body's budget spent on translation.
pub const TRANSLATION_SHARE: f32 = 0.75;
/// Share of a body's budget spent on rotation.
pub const ROTATION_SHARE: f32 = 0.25;

/// Caps on the correction velocity a body may receive within one substep.
///
/// A pair may close at most `max_penetration` per substep. Each body gets
/// half of that, split 3/4 translation and 1/4 rotation; the rotational part
/// is turned into an angular rate over the body's characteristic length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PenetrationLimits {
    pub max_penetration: f32,
    pub characteristic_length: f32,
}

impl Default for PenetrationLimits {
    fn default() -> Self {
        Self::unlimited()
    }
}

impl PenetrationLimits {
    pub fn new(max_penetration: f32, characteristic_length: f32) -> Self {
        Self {
            max_penetration,
            characteristic_length: characteristic_length.max(1e-3),
        }
    }

    pub fn unlimited() -> Self {
        Self {
            max_penetration: f32::INFINITY,
            characteristic_length: 1.0,
        }
    }

    pub fn is_unlimited(&self) -> bool {
        self.max_penetration.is_infinite()
    }

    /// Largest change of the linear velocity within one substep.
    pub fn vmax_translation(&self, dt: f32) -> f32 {
        self.max_penetration / dt * PAIRING_SHARE * TRANSLATION_SHARE
    }

    /// Largest change of the angular velocity within one substep.
    pub fn wmax(&self, dt: f32) -> f32 {
        self.max_penetration / dt * PAIRING_SHARE * ROTATION_SHARE / self.characteristic_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn budgets_follow_apportionment() {
        let limits = PenetrationLimits::new(0.2, 2.0);
        let dt = 0.01;
        assert!((limits.vmax_translation(dt) - 0.2 / dt * 0.375).abs() < 1e-3);
        assert!((limits.wmax(dt) - 0.2 / dt * 0.125 / 2.0).abs() < 1e-3);
    }

    #[test]
    fn unlimited_budget_is_infinite() {
        assert!(PenetrationLimits::unlimited().vmax_translation(0.01).is_infinite());
    }
}
