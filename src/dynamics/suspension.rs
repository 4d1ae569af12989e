use serde::{Deserialize, Serialize};

/// Damped spring between wheel and chassis.
///
/// `position` is the current compression (m, positive when compressed) as
/// measured by the last tire ray. Damping acts on the closing speed at the
/// contact point, sampled on every solver pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShockAbsorber {
    /// Spring constant (N/m).
    pub ks: f32,
    /// Damping constant (N·s/m).
    pub ka: f32,
    pub position: f32,
}

impl ShockAbsorber {
    pub fn new(ks: f32, ka: f32) -> Self {
        Self {
            ks,
            ka,
            position: 0.0,
        }
    }

    /// Restoring force for a compression and the closing speed of the chassis
    /// towards the ground. The spring only pushes.
    pub fn force(&self, compression: f32, closing_speed: f32) -> f32 {
        (self.ks * compression + self.ka * closing_speed).max(0.0)
    }

    pub fn set_compression(&mut self, compression: f32) {
        self.position = compression.max(0.0);
    }

    /// Wheel lost ground contact: the spring extends fully.
    pub fn set_airborne(&mut self) {
        self.position = 0.0;
    }

    pub fn reset(&mut self) {
        self.position = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spring_never_pulls() {
        let shock = ShockAbsorber::new(1e4, 1e3);
        assert_eq!(shock.force(0.01, -1.0), 0.0);
        assert!((shock.force(0.1, 0.0) - 1000.0).abs() < 1e-3);
        assert!(shock.force(0.1, 0.5) > shock.force(0.1, 0.0));
    }

    #[test]
    fn compression_is_clamped_and_cleared() {
        let mut shock = ShockAbsorber::new(1e4, 1e3);
        shock.set_compression(-0.02);
        assert_eq!(shock.position, 0.0);
        shock.set_compression(0.05);
        assert_eq!(shock.position, 0.05);
        shock.reset();
        assert_eq!(shock, ShockAbsorber::new(1e4, 1e3));
    }
}
