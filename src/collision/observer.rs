//! Synchronous collision, impact and damage notifications.

use glam::{DVec3, Vec3};

use crate::collision::contact::Impact;
use crate::utils::allocator::BodyId;

/// A contact about to be handed to the solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollisionEvent {
    pub body: BodyId,
    /// `None` for static geometry.
    pub other: Option<BodyId>,
    pub position: DVec3,
    pub normal: Vec3,
    pub overlap: f32,
    /// Relative velocity of `body` with respect to `other` at `position`.
    pub relative_velocity: Vec3,
}

/// Health lost by a damageable body.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DamageEvent {
    pub body: BodyId,
    pub other: Option<BodyId>,
    pub damage: f32,
    pub health: f32,
    pub destroyed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionResponse {
    #[default]
    Continue,
    /// Drop the contact; it contributes nothing this substep.
    Abort,
}

/// Receives engine events on the physics thread. No events are delivered
/// during burn-in.
pub trait CollisionObserver: Send + Sync {
    fn notify_collision(&mut self, _event: &CollisionEvent) -> CollisionResponse {
        CollisionResponse::Continue
    }

    fn notify_impact(&mut self, _impact: &Impact) {}

    fn notify_damage(&mut self, _event: &DamageEvent) {}
}

/// Registered observers, notified in registration order.
#[derive(Default)]
pub struct ObserverList {
    observers: Vec<Box<dyn CollisionObserver>>,
}

impl ObserverList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<O: CollisionObserver + 'static>(&mut self, observer: O) {
        self.observers.push(Box::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Every observer sees the event; one abort suffices to drop the contact.
    pub fn notify_collision(&mut self, event: &CollisionEvent) -> CollisionResponse {
        let mut response = CollisionResponse::Continue;
        for observer in &mut self.observers {
            if observer.notify_collision(event) == CollisionResponse::Abort {
                response = CollisionResponse::Abort;
            }
        }
        if response == CollisionResponse::Abort {
            log::warn!(
                "collision of {:?} with {:?} aborted by observer",
                event.body,
                event.other
            );
        }
        response
    }

    pub fn notify_impact(&mut self, impact: &Impact) {
        for observer in &mut self.observers {
            observer.notify_impact(impact);
        }
    }

    pub fn notify_damage(&mut self, event: &DamageEvent) {
        for observer in &mut self.observers {
            observer.notify_damage(event);
        }
    }
}

impl std::fmt::Debug for ObserverList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverList")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::Arena;

    struct Veto;

    impl CollisionObserver for Veto {
        fn notify_collision(&mut self, _event: &CollisionEvent) -> CollisionResponse {
            CollisionResponse::Abort
        }
    }

    struct Passive;

    impl CollisionObserver for Passive {}

    #[test]
    fn single_abort_wins() {
        let mut arena = Arena::new();
        let body = arena.insert(());
        let event = CollisionEvent {
            body,
            other: None,
            position: DVec3::ZERO,
            normal: Vec3::Y,
            overlap: 0.01,
            relative_velocity: Vec3::ZERO,
        };
        let mut observers = ObserverList::new();
        observers.add(Passive);
        assert_eq!(observers.notify_collision(&event), CollisionResponse::Continue);
        observers.add(Veto);
        assert_eq!(observers.notify_collision(&event), CollisionResponse::Abort);
    }
}
