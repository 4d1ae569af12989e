//! Permanent contacts: rail grinding.
//!
//! A grind starts when detection finds a rail line within
//! `grind_threshold` of a body's grind point and lasts until the point
//! drifts further than `grind_release_threshold` from the rail or one of
//! the two bodies is destroyed. While it lasts, the rail contributes a
//! [`LineContact`] to every substep without running the narrow phase.

use std::collections::HashMap;

use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::{DVec3, Vec3};

use crate::{
    collision::contact::{ContactInfo, ContactSet, LineContact},
    config::PhysicsEngineConfig,
    core::rigidbody::RigidBody,
    dynamics::grouping::CollisionGroup,
    utils::{
        allocator::{Arena, BodyId},
        math::closest_point_on_segment,
    },
};

/// State of one grind relationship.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrindInfo {
    /// Squared distance of the grind point from the rail at the last update.
    pub distance2: f64,
    /// Closest point on the rail, in world coordinates.
    pub point: DVec3,
    /// Unit rail direction in world coordinates.
    pub direction: Vec3,
    /// Body carrying the rail; `None` for static geometry.
    pub rail_body: Option<BodyId>,
    /// Rail endpoints in the coordinates of `rail_body` (world for static rails).
    pub rail: [DVec3; 2],
}

impl GrindInfo {
    /// Grind candidate for `grind_point` against a rail given in world
    /// coordinates, if the point is close enough.
    pub fn detect(
        grind_point: DVec3,
        world_rail: [DVec3; 2],
        local_rail: [DVec3; 2],
        rail_body: Option<BodyId>,
        threshold: f32,
    ) -> Option<Self> {
        let (point, _) = closest_point_on_segment(grind_point, world_rail[0], world_rail[1]);
        let distance2 = (grind_point - point).length_squared();
        let direction = (world_rail[1] - world_rail[0]).normalize_or_zero().as_vec3();
        if distance2 > f64::from(threshold).powi(2) || direction == Vec3::ZERO {
            return None;
        }
        Some(Self {
            distance2,
            point,
            direction,
            rail_body,
            rail: local_rail,
        })
    }
}

/// Provider of contacts that persist across substeps.
pub trait PermanentContacts: Send + Sync {
    /// Appends the contacts of the bodies in `group` to `contacts`.
    fn extend_contact_infos(
        &mut self,
        config: &PhysicsEngineConfig,
        bodies: &Arena<RigidBody>,
        group: &CollisionGroup,
        contacts: &mut ContactSet,
    );

    /// Body pairs that must be resolved in the same collision group.
    fn links(&self) -> Vec<(BodyId, BodyId)>;
}

/// Active grinds, keyed by the grinding body.
#[derive(Debug)]
pub struct RailContacts {
    grinds: HashMap<BodyId, GrindInfo>,
    destroyed_tx: Sender<BodyId>,
    destroyed_rx: Receiver<BodyId>,
}

impl Default for RailContacts {
    fn default() -> Self {
        Self::new()
    }
}

impl RailContacts {
    pub fn new() -> Self {
        let (destroyed_tx, destroyed_rx) = unbounded();
        Self {
            grinds: HashMap::new(),
            destroyed_tx,
            destroyed_rx,
        }
    }

    pub fn len(&self) -> usize {
        self.grinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grinds.is_empty()
    }

    pub fn grind(&self, body: BodyId) -> Option<&GrindInfo> {
        self.grinds.get(&body)
    }

    pub fn is_grinding(&self, body: BodyId) -> bool {
        self.grinds.contains_key(&body)
    }

    /// Starts a grind and subscribes to the destruction of both bodies.
    /// An existing grind of `body` is kept.
    pub fn register(&mut self, body: BodyId, info: GrindInfo, bodies: &mut Arena<RigidBody>) {
        if self.grinds.contains_key(&body) {
            return;
        }
        for id in std::iter::once(body).chain(info.rail_body) {
            if let Some(participant) = bodies.get_mut(id) {
                participant.destruction.subscribe(self.destroyed_tx.clone());
            }
        }
        log::debug!("{body:?} starts grinding on {:?}", info.rail_body);
        self.grinds.insert(body, info);
    }

    pub fn release(&mut self, body: BodyId) -> Option<GrindInfo> {
        self.grinds.remove(&body)
    }

    /// Drops every grind whose grinder or rail body announced its
    /// destruction. Returns the number of grinds removed.
    pub fn process_destructions(&mut self) -> usize {
        let before = self.grinds.len();
        for destroyed in self.destroyed_rx.try_iter() {
            self.grinds
                .retain(|grinder, info| *grinder != destroyed && info.rail_body != Some(destroyed));
        }
        before - self.grinds.len()
    }

    pub fn clear(&mut self) {
        self.grinds.clear();
    }

    /// Rail endpoints in world coordinates, or `None` when the rail body is gone.
    fn world_rail(info: &GrindInfo, bodies: &Arena<RigidBody>) -> Option<[DVec3; 2]> {
        match info.rail_body {
            None => Some(info.rail),
            Some(id) => {
                let pose = bodies.get(id)?.pose();
                Some(info.rail.map(|p| pose.transform_point(p.as_vec3())))
            }
        }
    }
}

impl PermanentContacts for RailContacts {
    fn extend_contact_infos(
        &mut self,
        config: &PhysicsEngineConfig,
        bodies: &Arena<RigidBody>,
        group: &CollisionGroup,
        contacts: &mut ContactSet,
    ) {
        let release2 = f64::from(config.grind_release_threshold).powi(2);
        self.grinds.retain(|&grinder_id, info| {
            if !group.contains(grinder_id) {
                return true;
            }
            let Some(grinder) = bodies.get(grinder_id) else {
                return false;
            };
            let Some(grind_point) = grinder
                .capabilities
                .grinder
                .filter(|g| g.enabled)
                .map(|g| grinder.pose().transform_point(g.grind_point))
            else {
                return false;
            };
            let Some([a, b]) = Self::world_rail(info, bodies) else {
                return false;
            };
            // A moving rail in another group joins this one through `links`
            // on the next frame; until then it is left alone.
            if let Some(rail_id) = info.rail_body {
                if !group.contains(rail_id) && !bodies.get(rail_id).is_some_and(RigidBody::is_static) {
                    return true;
                }
            }
            let (point, _) = closest_point_on_segment(grind_point, a, b);
            info.distance2 = (grind_point - point).length_squared();
            if info.distance2 > release2 {
                log::debug!("{grinder_id:?} leaves the rail");
                return false;
            }
            info.point = point;
            info.direction = (b - a).normalize_or_zero().as_vec3();
            contacts.push(ContactInfo::Line(LineContact::new(
                grinder_id,
                info.rail_body,
                grind_point,
                point,
                info.direction,
            )));
            true
        });
    }

    fn links(&self) -> Vec<(BodyId, BodyId)> {
        let mut links: Vec<(BodyId, BodyId)> = self
            .grinds
            .iter()
            .filter_map(|(&grinder, info)| info.rail_body.map(|rail| (grinder, rail)))
            .collect();
        links.sort_unstable();
        links
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::capabilities::Grinder;
    use crate::core::types::{InertiaTensorExt, Pose};
    use glam::Mat3;

    fn board(x: f64) -> RigidBody {
        RigidBody::new(
            "board",
            5.0,
            Mat3::for_solid_box(Vec3::new(0.2, 0.1, 0.8), 5.0),
            Pose::from_position(DVec3::new(x, 1.0, 0.0)),
        )
        .with_grinder(Grinder::new(Vec3::new(0.0, -0.1, 0.0)))
    }

    fn rail() -> [DVec3; 2] {
        [DVec3::new(-10.0, 0.85, 0.0), DVec3::new(10.0, 0.85, 0.0)]
    }

    fn group(bodies: &[BodyId]) -> CollisionGroup {
        let mut bodies = bodies.to_vec();
        bodies.sort_unstable();
        CollisionGroup {
            penetration_class: Default::default(),
            nsubsteps: 8,
            divider: 4,
            bodies,
        }
    }

    #[test]
    fn grind_is_detected_within_threshold_only() {
        let point = DVec3::new(0.0, 0.9, 0.0);
        let info = GrindInfo::detect(point, rail(), rail(), None, 0.3).unwrap();
        assert!((info.distance2 - 0.0025).abs() < 1e-9);
        assert_eq!(info.direction, Vec3::X);
        assert!(GrindInfo::detect(DVec3::new(0.0, 2.0, 0.0), rail(), rail(), None, 0.3).is_none());
    }

    #[test]
    fn grind_emits_line_contact_until_released() {
        let mut bodies = Arena::new();
        let id = bodies.insert(board(0.0));
        let mut rails = RailContacts::new();
        let info = GrindInfo::detect(DVec3::new(0.0, 0.9, 0.0), rail(), rail(), None, 0.3).unwrap();
        rails.register(id, info, &mut bodies);

        let config = PhysicsEngineConfig::default();
        let mut contacts = ContactSet::new();
        rails.extend_contact_infos(&config, &bodies, &group(&[id]), &mut contacts);
        assert_eq!(contacts.len(), 1);
        assert!(matches!(contacts.contacts[0], ContactInfo::Line(_)));

        bodies.get_mut(id).unwrap().set_pose(Pose::from_position(DVec3::new(0.0, 3.0, 0.0)));
        contacts.clear();
        rails.extend_contact_infos(&config, &bodies, &group(&[id]), &mut contacts);
        assert!(contacts.is_empty());
        assert!(rails.is_empty());
    }

    #[test]
    fn moving_rail_in_other_group_gets_no_contact() {
        let mut bodies = Arena::new();
        let grinder = bodies.insert(board(0.0));
        let rail_body = bodies.insert(RigidBody::new(
            "rail",
            10.0,
            Mat3::for_solid_box(Vec3::new(10.0, 0.05, 0.05), 10.0),
            Pose::default(),
        ));
        let mut rails = RailContacts::new();
        let info = GrindInfo::detect(DVec3::new(0.0, 0.9, 0.0), rail(), rail(), Some(rail_body), 0.3)
            .unwrap();
        rails.register(grinder, info, &mut bodies);

        let config = PhysicsEngineConfig::default();
        let mut contacts = ContactSet::new();
        rails.extend_contact_infos(&config, &bodies, &group(&[grinder]), &mut contacts);
        assert!(contacts.is_empty());
        assert!(rails.is_grinding(grinder));

        rails.extend_contact_infos(&config, &bodies, &group(&[grinder, rail_body]), &mut contacts);
        assert_eq!(contacts.len(), 1);
    }

    #[test]
    fn destroying_rail_body_ends_grind() {
        let mut bodies = Arena::new();
        let grinder = bodies.insert(board(0.0));
        let rail_body = bodies.insert(RigidBody::fixed("rail", Pose::default()));
        let mut rails = RailContacts::new();
        let info = GrindInfo::detect(DVec3::new(0.0, 0.9, 0.0), rail(), rail(), Some(rail_body), 0.3)
            .unwrap();
        rails.register(grinder, info, &mut bodies);
        assert_eq!(rails.links(), vec![(grinder, rail_body)]);

        let mut removed = bodies.remove(rail_body).unwrap();
        removed.destruction.notify(rail_body);
        assert_eq!(rails.process_destructions(), 1);
        assert!(!rails.is_grinding(grinder));
    }
}
