//! Optional typed facets of a body, looked up by name.

use glam::Vec3;

use crate::dynamics::vehicle::Vehicle;

/// Health pool that contact impulses can drain.
#[derive(Debug, Clone, PartialEq)]
pub struct Damageable {
    pub health: f32,
    pub max_health: f32,
    /// Impulses below this magnitude cause no damage (N·s).
    pub impulse_threshold: f32,
    /// Health lost per N·s above the threshold.
    pub damage_per_impulse: f32,
}

impl Damageable {
    pub fn new(max_health: f32) -> Self {
        Self {
            health: max_health,
            max_health,
            impulse_threshold: 500.0,
            damage_per_impulse: 0.01,
        }
    }

    /// Returns the health lost, if any.
    pub fn absorb_impulse(&mut self, impulse: f32) -> Option<f32> {
        let excess = impulse.abs() - self.impulse_threshold;
        if excess <= 0.0 || self.is_destroyed() {
            return None;
        }
        let damage = (excess * self.damage_per_impulse).min(self.health);
        self.health -= damage;
        Some(damage)
    }

    pub fn is_destroyed(&self) -> bool {
        self.health <= 0.0
    }

    pub fn reset(&mut self) {
        self.health = self.max_health;
    }
}

/// Body-local point that snaps onto rails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Grinder {
    pub grind_point: Vec3,
    pub enabled: bool,
}

impl Grinder {
    pub fn new(grind_point: Vec3) -> Self {
        Self {
            grind_point,
            enabled: true,
        }
    }
}

/// Borrowed view of one capability.
#[derive(Debug, Clone, Copy)]
pub enum CapabilityRef<'a> {
    Vehicle(&'a Vehicle),
    Damageable(&'a Damageable),
    Grinder(&'a Grinder),
}

/// Optional facets a body may carry.
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    pub vehicle: Option<Vehicle>,
    pub damageable: Option<Damageable>,
    pub grinder: Option<Grinder>,
}

impl Capabilities {
    pub const VEHICLE: &'static str = "vehicle";
    pub const DAMAGEABLE: &'static str = "damageable";
    pub const GRINDER: &'static str = "grinder";

    pub fn query(&self, name: &str) -> Option<CapabilityRef<'_>> {
        match name {
            Self::VEHICLE => self.vehicle.as_ref().map(CapabilityRef::Vehicle),
            Self::DAMAGEABLE => self.damageable.as_ref().map(CapabilityRef::Damageable),
            Self::GRINDER => self.grinder.as_ref().map(CapabilityRef::Grinder),
            _ => None,
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.query(name).is_some()
    }

    /// Names of the capabilities present.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.vehicle.is_some() {
            names.push(Self::VEHICLE);
        }
        if self.damageable.is_some() {
            names.push(Self::DAMAGEABLE);
        }
        if self.grinder.is_some() {
            names.push(Self::GRINDER);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_by_name() {
        let caps = Capabilities {
            damageable: Some(Damageable::new(100.0)),
            ..Default::default()
        };
        assert!(matches!(
            caps.query(Capabilities::DAMAGEABLE),
            Some(CapabilityRef::Damageable(_))
        ));
        assert!(caps.query(Capabilities::VEHICLE).is_none());
        assert!(caps.query("wings").is_none());
        assert_eq!(caps.names(), vec!["damageable"]);
    }

    #[test]
    fn small_impulses_cause_no_damage() {
        let mut d = Damageable::new(100.0);
        assert_eq!(d.absorb_impulse(100.0), None);
        let lost = d.absorb_impulse(1500.0).expect("above threshold");
        assert!((lost - 10.0).abs() < 1e-4);
        assert!((d.health - 90.0).abs() < 1e-4);
    }
}
