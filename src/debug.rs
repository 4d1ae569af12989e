//! Debug visualization side channel.
//!
//! The engine pushes [`Beacon`]s into a [`DebugContext`] handed to
//! [`PhysicsEngine::advance_time`](crate::world::PhysicsEngine::advance_time);
//! the renderer drains them once per frame.

use glam::DVec3;

/// Marker at a world position, drawn with the named resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Beacon {
    pub location: DVec3,
    pub resource_name: &'static str,
}

impl Beacon {
    pub const CONTACT: &'static str = "contact";
    pub const TIRE: &'static str = "tire";
    pub const GRIND: &'static str = "grind";

    pub fn new(location: DVec3, resource_name: &'static str) -> Self {
        Self {
            location,
            resource_name,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DebugContext {
    beacons: Vec<Beacon>,
    /// Upper bound on buffered beacons; older ones are kept.
    capacity: Option<usize>,
}

impl DebugContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity_limit(limit: usize) -> Self {
        Self {
            beacons: Vec::new(),
            capacity: Some(limit),
        }
    }

    pub fn push(&mut self, beacon: Beacon) {
        if self.capacity.map_or(true, |limit| self.beacons.len() < limit) {
            self.beacons.push(beacon);
        }
    }

    pub fn beacons(&self) -> &[Beacon] {
        &self.beacons
    }

    pub fn len(&self) -> usize {
        self.beacons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.beacons.is_empty()
    }

    /// Hands the buffered beacons to the caller and empties the context.
    pub fn drain(&mut self) -> Vec<Beacon> {
        std::mem::take(&mut self.beacons)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_empties_and_limit_caps() {
        let mut debug = DebugContext::with_capacity_limit(2);
        for i in 0..5 {
            debug.push(Beacon::new(DVec3::splat(i as f64), Beacon::CONTACT));
        }
        assert_eq!(debug.len(), 2);
        let drained = debug.drain();
        assert_eq!(drained[1].location, DVec3::ONE);
        assert!(debug.is_empty());
    }
}
