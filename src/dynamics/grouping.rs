//! Partitioning of the moving bodies into collision groups.
//!
//! Bodies whose swept bounds overlap, or that are linked by a permanent
//! contact, end up in the same group through union-find, so a body is never
//! resolved under two different substep counts in the same frame. Static
//! bodies never join a group; every group collides against them.

use crate::{
    config::{PenetrationClass, PhysicsEngineConfig},
    core::{mesh::Aabb, rigidbody::RigidBody},
    error::FatalInvariantViolation,
    utils::allocator::{Arena, BodyId},
};

/// Bodies resolved together, with their substep schedule.
#[derive(Debug, Clone, PartialEq)]
pub struct CollisionGroup {
    pub penetration_class: PenetrationClass,
    pub nsubsteps: usize,
    /// Global substeps (those of the strictest class) per group substep.
    pub divider: usize,
    /// Sorted member ids.
    pub bodies: Vec<BodyId>,
}

impl CollisionGroup {
    pub fn contains(&self, id: BodyId) -> bool {
        self.bodies.binary_search(&id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn substep_dt(&self, dt: f32) -> f32 {
        dt / self.nsubsteps as f32
    }
}

/// Context handed down the call chain of one substep.
#[derive(Debug, Clone, Copy)]
pub struct PhysicsPhase<'a> {
    pub burn_in: bool,
    pub substep: usize,
    pub group: &'a CollisionGroup,
}

impl<'a> PhysicsPhase<'a> {
    pub fn new(burn_in: bool, substep: usize, group: &'a CollisionGroup) -> Self {
        Self {
            burn_in,
            substep,
            group,
        }
    }

    pub fn is_last_substep(&self) -> bool {
        self.substep + 1 == self.group.nsubsteps
    }
}

/// Disjoint-set forest with union by rank and path halving.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    pub fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    pub fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Builds the collision groups of a frame.
#[derive(Debug, Default)]
pub struct CollisionGrouper {
    groups: Vec<CollisionGroup>,
}

impl CollisionGrouper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regroups the moving bodies. `links` are body pairs that must share a
    /// group regardless of their bounds.
    pub fn build_groups(
        &mut self,
        config: &PhysicsEngineConfig,
        bodies: &Arena<RigidBody>,
        links: &[(BodyId, BodyId)],
    ) -> Result<&[CollisionGroup], FatalInvariantViolation> {
        self.groups.clear();

        let mut members: Vec<(BodyId, Aabb, PenetrationClass)> = bodies
            .iter()
            .filter(|(_, body)| !body.is_static())
            .map(|(id, body)| {
                (
                    id,
                    body.swept_aabb(config.dt, f64::from(config.grouping_padding)),
                    body.penetration_class,
                )
            })
            .collect();
        if members.is_empty() {
            return Ok(&self.groups);
        }
        members.sort_by(|a, b| a.1.min.x.total_cmp(&b.1.min.x));

        let mut sets = UnionFind::new(members.len());
        for i in 0..members.len() {
            for j in (i + 1)..members.len() {
                if members[j].1.min.x > members[i].1.max.x {
                    break;
                }
                let overlap = members[i].1.intersects(&members[j].1);
                debug_assert_eq!(overlap, members[j].1.intersects(&members[i].1));
                if overlap {
                    sets.union(i, j);
                }
            }
        }

        let position = |id: BodyId| members.iter().position(|m| m.0 == id);
        for &(a, b) in links {
            if let (Some(i), Some(j)) = (position(a), position(b)) {
                sets.union(i, j);
            }
        }

        let mut roots: Vec<(usize, CollisionGroup)> = Vec::new();
        for (i, (id, _, class)) in members.iter().enumerate() {
            let root = sets.find(i);
            match roots.iter_mut().find(|(r, _)| *r == root) {
                Some((_, group)) => {
                    group.bodies.push(*id);
                    group.penetration_class = group.penetration_class.max(*class);
                }
                None => roots.push((
                    root,
                    CollisionGroup {
                        penetration_class: *class,
                        nsubsteps: 0,
                        divider: 0,
                        bodies: vec![*id],
                    },
                )),
            }
        }

        let max_substeps = config.substeps(PenetrationClass::BulletLine);
        for (_, mut group) in roots {
            let nsubsteps = config.substeps(group.penetration_class);
            if nsubsteps == 0 || max_substeps % nsubsteps != 0 {
                return Err(FatalInvariantViolation::GroupComposition {
                    nsubsteps,
                    max_substeps,
                });
            }
            group.nsubsteps = nsubsteps;
            group.divider = max_substeps / nsubsteps;
            group.bodies.sort_unstable();
            self.groups.push(group);
        }
        self.groups.sort_by_key(|g| g.bodies[0]);
        Ok(&self.groups)
    }

    pub fn groups(&self) -> &[CollisionGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::mesh::{CollisionLine, CollisionMesh, CollisionSphere};
    use crate::core::types::{InertiaTensorExt, PhysicsMaterial, Pose};
    use glam::{DVec3, Mat3};

    fn ball(x: f64) -> RigidBody {
        RigidBody::new(
            "ball",
            1.0,
            Mat3::for_solid_sphere(1.0, 1.0),
            Pose::from_position(DVec3::new(x, 0.0, 0.0)),
        )
        .with_mesh(CollisionMesh::new("hull").with_sphere(CollisionSphere::new(
            DVec3::ZERO,
            1.0,
            PhysicsMaterial::default(),
        )))
    }

    #[test]
    fn union_find_merges_chains() {
        let mut sets = UnionFind::new(5);
        sets.union(0, 1);
        sets.union(3, 4);
        sets.union(1, 4);
        assert_eq!(sets.find(0), sets.find(3));
        assert_ne!(sets.find(0), sets.find(2));
    }

    #[test]
    fn touching_chain_forms_one_group() {
        let mut bodies = Arena::new();
        let a = bodies.insert(ball(0.0));
        let b = bodies.insert(ball(1.9));
        let c = bodies.insert(ball(3.8));
        let d = bodies.insert(ball(20.0));
        let config = PhysicsEngineConfig::default();
        let mut grouper = CollisionGrouper::new();
        let groups = grouper.build_groups(&config, &bodies, &[]).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].bodies, vec![a, b, c]);
        assert_eq!(groups[1].bodies, vec![d]);
    }

    #[test]
    fn static_bodies_do_not_bridge_groups() {
        let mut bodies = Arena::new();
        bodies.insert(
            RigidBody::fixed("slab", Pose::default())
                .with_mesh(CollisionMesh::ground(50.0, 0.0, PhysicsMaterial::default())),
        );
        bodies.insert(ball(-10.0));
        bodies.insert(ball(10.0));
        let config = PhysicsEngineConfig::default();
        let mut grouper = CollisionGrouper::new();
        assert_eq!(grouper.build_groups(&config, &bodies, &[]).unwrap().len(), 2);
    }

    #[test]
    fn bullet_member_raises_group_class() {
        let mut bodies = Arena::new();
        bodies.insert(ball(0.0));
        let bullet = bodies.insert(ball(1.5).with_mesh(CollisionMesh::new("trace").with_line(
            CollisionLine::new(DVec3::ZERO, DVec3::X, PhysicsMaterial::bullet()),
        )));
        let config = PhysicsEngineConfig::default();
        let mut grouper = CollisionGrouper::new();
        let groups = grouper.build_groups(&config, &bodies, &[]).unwrap();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].contains(bullet));
        assert_eq!(groups[0].penetration_class, PenetrationClass::BulletLine);
        assert_eq!(groups[0].nsubsteps, config.bullet_line_substeps);
        assert_eq!(groups[0].divider, 1);
    }

    #[test]
    fn links_join_distant_bodies() {
        let mut bodies = Arena::new();
        let a = bodies.insert(ball(0.0));
        let b = bodies.insert(ball(100.0));
        let config = PhysicsEngineConfig::default();
        let mut grouper = CollisionGrouper::new();
        let groups = grouper.build_groups(&config, &bodies, &[(a, b)]).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].divider, config.bullet_line_substeps / config.nsubsteps);
    }
}
