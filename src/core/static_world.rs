use glam::{DMat4, DVec3, Vec3};

/// Read-only snapshot of the environment for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticWorld {
    /// Scene coordinates to geographic coordinates.
    pub geographic_mapping: DMat4,
    /// Geographic coordinates to scene coordinates.
    pub inverse_geographic_mapping: DMat4,
    pub gravity: Vec3,
    pub wind: Vec3,
    /// Simulation time in seconds.
    pub time: f64,
}

impl Default for StaticWorld {
    fn default() -> Self {
        Self {
            geographic_mapping: DMat4::IDENTITY,
            inverse_geographic_mapping: DMat4::IDENTITY,
            gravity: Vec3::new(0.0, -9.8, 0.0),
            wind: Vec3::ZERO,
            time: 0.0,
        }
    }
}

impl StaticWorld {
    pub fn with_geographic_mapping(mut self, mapping: DMat4) -> Self {
        self.geographic_mapping = mapping;
        self.inverse_geographic_mapping = mapping.inverse();
        self
    }

    pub fn to_geographic(&self, position: DVec3) -> DVec3 {
        self.geographic_mapping.transform_point3(position)
    }

    pub fn from_geographic(&self, position: DVec3) -> DVec3 {
        self.inverse_geographic_mapping.transform_point3(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geographic_mapping_round_trips() {
        let world = StaticWorld::default()
            .with_geographic_mapping(DMat4::from_translation(DVec3::new(1000.0, 0.0, -250.0)));
        let local = DVec3::new(3.0, 4.0, 5.0);
        let geo = world.to_geographic(local);
        assert_eq!(geo, DVec3::new(1003.0, 4.0, -245.0));
        assert!((world.from_geographic(geo) - local).length() < 1e-9);
    }
}
