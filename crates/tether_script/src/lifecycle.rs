//! Lifetime reconciliation between the host and the script GC
//!
//! Two event sources meet here:
//!
//! - **Finalization:** the GC collected a wrapper. Depending on who still
//!   needs the host object, it is destroyed, detached from script, or
//!   rescued with a fresh pinned wrapper.
//! - **Refcount transitions:** a reference-counted object dropped a host
//!   reference. When only the script side is left the object's pin is
//!   released, handing ownership to the GC.
//!
//! The engine cannot resurrect an object from inside its finalizer, so a
//! rescue is deferred: the object is queued and re-wrapped at the next safe
//! point (end of [`Bridge::with`](crate::Bridge::with), evaluation, explicit
//! collection).

use crate::state::BridgeState;
use rquickjs::{Ctx, Object};
use std::rc::Rc;
use tether_core::{CallError, ObjectHooks, ObjectId, Variant};
use tether_metrics::metrics;
use tracing::{debug, trace, warn};

/// What finalizing a wrapper did to its host object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finalization {
    /// The object was freed.
    Destroyed,
    /// The host still owns the object; it lost its script side.
    Detached,
    /// The object is queued for a new pinned wrapper.
    Rescued,
}

impl BridgeState {
    /// Runs when a wrapper for `id` has been collected. Idempotent: a second
    /// call for the same object finds nothing to do.
    pub(crate) fn finalize(&self, id: ObjectId) -> Option<Finalization> {
        let object = self.objects.get(id)?;
        if !self.registry.borrow_mut().clear_weak(id) {
            return None;
        }
        metrics! {
            self.stats.borrow_mut().increment("finalized", 1);
        }

        let outcome = if !object.is_refcounted() {
            self.forget(id);
            if self.closing.get() {
                // Shutdown releases wrappers, not host objects.
                return None;
            }
            self.objects.free(id);
            Finalization::Destroyed
        } else if self.objects.unreference(id) {
            self.objects.free(id);
            Finalization::Destroyed
        } else if object.has_binding() {
            self.forget(id);
            self.objects.free(id);
            Finalization::Detached
        } else {
            if !self.closing.get() {
                self.rescues.borrow_mut().push(id);
            }
            Finalization::Rescued
        };

        debug!(%id, class_name = object.class_name(), ?outcome, "wrapper finalized");
        metrics! {
            let name = match outcome {
                Finalization::Destroyed => "destroyed",
                Finalization::Detached => "detached",
                Finalization::Rescued => "rescued",
            };
            self.stats.borrow_mut().increment(name, 1);
        }
        Some(outcome)
    }

    /// Gives every queued object a fresh pinned wrapper.
    pub(crate) fn process_rescues(self: &Rc<Self>, ctx: &Ctx<'_>) {
        let pending = std::mem::take(&mut *self.rescues.borrow_mut());
        for id in pending {
            let Some(object) = self.objects.get(id) else {
                continue;
            };
            if self.registry.borrow().has_strong(id) {
                continue;
            }

            let wrapper = match self.existing_wrapper(ctx, id) {
                Some(wrapper) => Ok(wrapper),
                None => self
                    .instance_prototype(ctx, &object)
                    .and_then(|proto| self.new_wrapper(ctx, id, &proto)),
            };
            match wrapper {
                Ok(wrapper) => {
                    self.pin(ctx, id, &wrapper);
                    trace!(%id, "wrapper rescued");
                }
                Err(err) => warn!(%id, error = %err, "failed to re-create wrapper"),
            }
        }
    }

    /// Keeps `wrapper` alive for as long as the host object lives.
    pub(crate) fn pin<'js>(&self, ctx: &Ctx<'js>, id: ObjectId, wrapper: &Object<'js>) {
        let displaced = self.registry.borrow_mut().set_strong(ctx, id, wrapper);
        drop(displaced);
        self.objects.binding(id);
        metrics! {
            self.stats.borrow_mut().increment("pins", 1);
        }
    }

    /// Releases the pin but keeps the weak entry: the wrapper stays the
    /// object's wrapper until it is collected.
    pub(crate) fn unpin(&self, id: ObjectId) {
        let released = self.registry.borrow_mut().clear_strong(id);
        drop(released);
    }

    /// Drops every registry entry for `id`.
    pub(crate) fn forget(&self, id: ObjectId) {
        let released = {
            let mut registry = self.registry.borrow_mut();
            registry.clear_weak(id);
            registry.clear_strong(id)
        };
        drop(released);
    }
}

impl ObjectHooks for BridgeState {
    /// Binding data exists exactly for objects the script side pins.
    fn alloc_binding(&self, id: ObjectId) -> bool {
        self.registry.borrow().has_strong(id)
    }

    fn object_freed(&self, id: ObjectId) {
        self.forget(id);
        self.rescues.borrow_mut().retain(|queued| *queued != id);
    }

    fn refcount_incremented(&self, _id: ObjectId) {}

    fn call_script(&self, id: ObjectId, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        let state = self.this().ok_or(CallError::InstanceIsNull)?;
        state.invoke_script_method(id, method, args)
    }

    fn refcount_decremented(&self, id: ObjectId) -> bool {
        let Some(object) = self.objects.get(id) else {
            return true;
        };
        let last_reference = object.refcount() == 0;
        if !self.objects.binding(id) {
            return last_reference;
        }
        if last_reference {
            // Only the script side is left; the GC decides from here on.
            trace!(%id, "pin released");
            self.unpin(id);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::fixture;
    use tether_core::{ObjectId, Variant};

    fn drop_global(fixture: &crate::test_support::Fixture, name: &str) {
        fixture.bridge.with(|ctx| {
            ctx.eval::<(), _>(format!("globalThis.{name} = undefined;")).unwrap();
        });
        fixture.bridge.collect_garbage();
        assert!(fixture.pools_consistent());
    }

    #[test]
    fn script_only_objects_die_with_their_wrapper() {
        let fixture = fixture();
        let id: ObjectId = fixture.bridge.with(|ctx| {
            let res: rquickjs::Value = ctx.eval("globalThis.res = new godot.Resource(); res").unwrap();
            fixture.bridge.unwrap(&ctx, &res).unwrap()
        });
        assert_eq!(fixture.objects.get(id).unwrap().refcount(), 1);

        drop_global(&fixture, "res");
        assert!(!fixture.objects.contains(id));
        assert!(!fixture.bridge.is_wrapped(id));
        assert_eq!(fixture.bridge.stat("destroyed"), 1);
        assert!(fixture.pools_consistent());
    }

    #[test]
    fn host_references_keep_the_object_through_collection() {
        let fixture = fixture();
        let id: ObjectId = fixture.bridge.with(|ctx| {
            let res: rquickjs::Value = ctx.eval("globalThis.res = new godot.Resource(); res").unwrap();
            fixture.bridge.unwrap(&ctx, &res).unwrap()
        });
        fixture.objects.reference(id);

        // Wrapper collected while the host holds a reference: the count
        // drops to one and the object gets a fresh pinned wrapper.
        drop_global(&fixture, "res");
        assert!(fixture.objects.contains(id));
        assert_eq!(fixture.objects.get(id).unwrap().refcount(), 1);
        assert_eq!(fixture.bridge.stat("rescued"), 1);
        assert!(fixture.bridge.is_pinned(id));
        assert!(fixture.pools_consistent());

        // Re-wrapping yields the rescued wrapper.
        fixture.bridge.with(|ctx| {
            let again = fixture.bridge.wrap(&ctx, id).unwrap();
            assert_eq!(fixture.bridge.unwrap(&ctx, &again), Some(id));
        });
    }

    #[test]
    fn rescued_wrappers_shut_down_cleanly() {
        let fixture = fixture();
        let id: ObjectId = fixture.bridge.with(|ctx| {
            let res: rquickjs::Value = ctx.eval("globalThis.res = new godot.Resource(); res").unwrap();
            fixture.bridge.unwrap(&ctx, &res).unwrap()
        });
        fixture.objects.reference(id);
        drop_global(&fixture, "res");
        assert!(fixture.bridge.is_pinned(id));

        assert!(fixture.bridge.set_instance_property(id, "hp", &Variant::Number(4.0)));
        assert_eq!(fixture.bridge.get_instance_property(id, "hp"), Some(Variant::Number(4.0)));
        fixture.bridge.with(|ctx| {
            let first = fixture.bridge.wrap(&ctx, id).unwrap();
            let second = fixture.bridge.wrap(&ctx, id).unwrap();
            assert_eq!(first, second);
        });

        let crate::test_support::Fixture { objects, bridge, .. } = fixture;
        drop(bridge);
        let reference = objects.create("Reference", true);
        assert!(objects.release(reference));
    }

    #[test]
    fn host_release_to_zero_destroys_unbound_objects() {
        let fixture = fixture();
        let id = fixture.classes.instantiate(&fixture.objects, "Resource").unwrap();

        fixture.bridge.with(|ctx| {
            let wrapper = fixture.bridge.wrap(&ctx, id).unwrap();
            ctx.globals().set("res", wrapper).unwrap();
        });
        assert!(fixture.bridge.is_wrapped(id));
        assert!(!fixture.bridge.is_pinned(id));

        assert!(fixture.objects.reference(id));
        assert!(!fixture.objects.unreference(id));
        assert!(fixture.bridge.is_wrapped(id));
        assert!(!fixture.bridge.is_pinned(id));

        assert!(fixture.objects.release(id));
        assert!(!fixture.bridge.is_wrapped(id));
        assert!(fixture.pools_consistent());

        // The stale wrapper now reads as a null instance.
        let message: String = fixture.bridge.with(|ctx| {
            ctx.eval(r#"let m = ""; try { res.get_path(); } catch (e) { m = e.message; } m"#).unwrap()
        });
        assert_eq!(message, "get_path: instance is null");
        drop_global(&fixture, "res");
    }

    #[test]
    fn pinned_refcounted_objects_unpin_at_zero() {
        let fixture = fixture();
        let id = fixture.classes.instantiate(&fixture.objects, "Resource").unwrap();
        fixture.bridge.with(|ctx| {
            let wrapper = fixture.bridge.wrap(&ctx, id).unwrap();
            ctx.globals().set("res", wrapper.clone()).unwrap();
            fixture.bridge.state().pin(&ctx, id, &wrapper.into_object().unwrap());
        });
        assert!(fixture.bridge.is_pinned(id));
        assert!(fixture.objects.get(id).unwrap().has_binding());

        fixture.objects.reference(id);
        assert!(!fixture.objects.unreference(id));
        assert!(fixture.bridge.is_pinned(id));

        assert!(!fixture.objects.unreference(id));
        assert!(!fixture.bridge.is_pinned(id));
        assert!(fixture.bridge.is_wrapped(id));
        assert!(fixture.objects.contains(id));

        // Bound object: collection detaches and frees it exactly once.
        drop_global(&fixture, "res");
        assert!(!fixture.objects.contains(id));
        assert!(!fixture.bridge.is_wrapped(id));
        assert_eq!(fixture.bridge.stat("detached"), 1);
        assert!(fixture.pools_consistent());
        assert_eq!(fixture.bridge.state().finalize(id), None);
    }

    #[test]
    fn freed_plain_objects_leave_the_registry() {
        let fixture = fixture();
        let id = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();
        fixture.bridge.with(|ctx| {
            fixture.bridge.wrap(&ctx, id).unwrap();
        });
        assert!(fixture.bridge.is_pinned(id));

        fixture.objects.free(id);
        assert!(!fixture.bridge.is_wrapped(id));
        assert!(!fixture.bridge.is_pinned(id));
        fixture.bridge.collect_garbage();
        assert!(fixture.pools_consistent());
    }
}
