//! Impact notifications
//!
//! Each collision produces one event per body, routed to the handlers
//! registered for that body's owner kind. Handlers run in registration order
//! until one consumes the event.

use std::collections::HashMap;

use crate::foundation::collections::BodyHandle;
use crate::foundation::math::Vec3;

use super::body::OwnerKind;

/// What the other side of an impact was
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactSource {
    /// Another body
    Body(BodyHandle),
    /// Environment terrain
    Terrain,
}

/// One body's view of a collision
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactEvent {
    /// Body being notified
    pub body: BodyHandle,
    /// Owner kind of the notified body
    pub owner: OwnerKind,
    /// What it collided with
    pub other: ImpactSource,
    /// Contact point
    pub contact_point: Vec3,
    /// Contact normal, pointing towards the notified body
    pub normal: Vec3,
    /// Velocity before the impact
    pub pre_impact_velocity: Vec3,
    /// Change in velocity caused by the impact
    pub velocity_change: Vec3,
    /// Magnitude of `velocity_change`
    pub velocity_change_magnitude: f32,
    /// `|Δv| · mass` for this body
    pub impact_force: f32,
    /// Sum of the impact force over both bodies
    pub total_impact_force: f32,
    /// Set when the impact came from a swept (CCD) test
    pub continuous: bool,
}

impl ImpactEvent {
    /// Velocity after the impact
    pub fn post_impact_velocity(&self) -> Vec3 {
        self.pre_impact_velocity + self.velocity_change
    }
}

/// Handler verdict for an impact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImpactResponse {
    /// Pass the event on to later handlers
    Ignore,
    /// Stop forwarding the event
    Consumed,
    /// Stop forwarding and destroy the notified body immediately
    Destroy,
}

/// Receiver of impact events
pub trait ImpactHandler {
    /// Handle an impact
    fn on_impact(&mut self, event: &ImpactEvent) -> ImpactResponse;
}

impl<F> ImpactHandler for F
where
    F: FnMut(&ImpactEvent) -> ImpactResponse,
{
    fn on_impact(&mut self, event: &ImpactEvent) -> ImpactResponse {
        self(event)
    }
}

/// Routes impact events to handlers by owner kind
#[derive(Default)]
pub struct ImpactDispatcher {
    handlers: HashMap<OwnerKind, Vec<Box<dyn ImpactHandler>>>,
    dispatched: usize,
}

impl std::fmt::Debug for ImpactDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImpactDispatcher")
            .field("owners", &self.handlers.keys().collect::<Vec<_>>())
            .field("dispatched", &self.dispatched)
            .finish()
    }
}

impl ImpactDispatcher {
    /// Create an empty dispatcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for bodies owned by `owner`
    pub fn register_handler(&mut self, owner: OwnerKind, handler: Box<dyn ImpactHandler>) {
        self.handlers.entry(owner).or_default().push(handler);
    }

    /// Number of events dispatched since creation
    pub const fn dispatched(&self) -> usize {
        self.dispatched
    }

    /// Deliver an event; returns true if a handler asked for the body to be destroyed
    pub fn dispatch(&mut self, event: &ImpactEvent) -> bool {
        self.dispatched += 1;
        let Some(handlers) = self.handlers.get_mut(&event.owner) else {
            return false;
        };
        for handler in handlers {
            match handler.on_impact(event) {
                ImpactResponse::Ignore => {}
                ImpactResponse::Consumed => return false,
                ImpactResponse::Destroy => return true,
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;
    use std::cell::Cell;
    use std::rc::Rc;

    fn event(body: BodyHandle, owner: OwnerKind) -> ImpactEvent {
        ImpactEvent {
            body,
            owner,
            other: ImpactSource::Terrain,
            contact_point: Vec3::zeros(),
            normal: Vec3::y(),
            pre_impact_velocity: Vec3::new(0.0, -2.0, 0.0),
            velocity_change: Vec3::new(0.0, 3.0, 0.0),
            velocity_change_magnitude: 3.0,
            impact_force: 6.0,
            total_impact_force: 6.0,
            continuous: false,
        }
    }

    #[test]
    fn test_routes_by_owner_and_stops_when_consumed() {
        let mut keys: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let body = keys.insert(());
        let seen = Rc::new(Cell::new(0));

        let mut dispatcher = ImpactDispatcher::new();
        let counter = Rc::clone(&seen);
        dispatcher.register_handler(
            OwnerKind::Ship,
            Box::new(move |_: &ImpactEvent| {
                counter.set(counter.get() + 1);
                ImpactResponse::Consumed
            }),
        );
        let counter = Rc::clone(&seen);
        dispatcher.register_handler(
            OwnerKind::Ship,
            Box::new(move |_: &ImpactEvent| {
                counter.set(counter.get() + 100);
                ImpactResponse::Destroy
            }),
        );

        assert!(!dispatcher.dispatch(&event(body, OwnerKind::Ship)));
        assert!(!dispatcher.dispatch(&event(body, OwnerKind::Actor)));
        assert_eq!(seen.get(), 1);
        assert_eq!(dispatcher.dispatched(), 2);
    }

    #[test]
    fn test_destroy_request() {
        let mut keys: SlotMap<BodyHandle, ()> = SlotMap::with_key();
        let body = keys.insert(());
        let mut dispatcher = ImpactDispatcher::new();
        dispatcher.register_handler(
            OwnerKind::Projectile,
            Box::new(|e: &ImpactEvent| {
                if e.impact_force > 5.0 {
                    ImpactResponse::Destroy
                } else {
                    ImpactResponse::Ignore
                }
            }),
        );
        let e = event(body, OwnerKind::Projectile);
        assert!(dispatcher.dispatch(&e));
        assert_eq!(e.post_impact_velocity(), Vec3::new(0.0, 1.0, 0.0));
    }
}
