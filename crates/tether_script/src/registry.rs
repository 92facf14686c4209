//! Wrapper pools keyed by object identity
//!
//! The weak pool maps every object that currently has a wrapper to that
//! wrapper without keeping it alive. The strong pool pins wrappers whose
//! lifetime is governed by the host; an entry there is a GC root.
//!
//! Dropping a pinned handle can run finalizers synchronously, so operations
//! that displace a pin hand it back to the caller instead of dropping it
//! while the registry is borrowed.

use rquickjs::{qjs, Ctx, Object, Persistent, Value};
use std::collections::HashMap;
use tether_core::ObjectId;

/// Engine handle that does not own a reference.
#[derive(Clone, Copy)]
struct WeakHandle(qjs::JSValue);

pub type Pin = Persistent<Object<'static>>;

#[derive(Default)]
pub struct WrapperRegistry {
    weak: HashMap<ObjectId, WeakHandle>,
    strong: HashMap<ObjectId, Pin>,
}

impl WrapperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live wrapper for `id`, if the weak pool knows one.
    pub fn get_weak<'js>(&self, ctx: &Ctx<'js>, id: ObjectId) -> Option<Object<'js>> {
        let handle = self.weak.get(&id)?;
        // SAFETY: a wrapper's finalizer removes its weak entry before the
        // engine reclaims the object, so the handle points at a live object.
        // The value owns the reference taken here.
        let value = unsafe { Value::from_raw(ctx.clone(), qjs::JS_DupValue(handle.0)) };
        value.into_object()
    }

    pub fn set_weak(&mut self, id: ObjectId, wrapper: &Object<'_>) {
        self.weak.insert(id, WeakHandle(wrapper.as_value().as_raw()));
    }

    /// Pins `wrapper` and records it in the weak pool as well. Returns the
    /// pin it replaced, if any.
    #[must_use = "drop the displaced pin after releasing the registry borrow"]
    pub fn set_strong<'js>(&mut self, ctx: &Ctx<'js>, id: ObjectId, wrapper: &Object<'js>) -> Option<Pin> {
        self.set_weak(id, wrapper);
        self.strong.insert(id, Persistent::save(ctx, wrapper.clone()))
    }

    pub fn clear_weak(&mut self, id: ObjectId) -> bool {
        self.weak.remove(&id).is_some()
    }

    #[must_use = "drop the released pin after releasing the registry borrow"]
    pub fn clear_strong(&mut self, id: ObjectId) -> Option<Pin> {
        self.strong.remove(&id)
    }

    pub fn has_weak(&self, id: ObjectId) -> bool {
        self.weak.contains_key(&id)
    }

    pub fn has_strong(&self, id: ObjectId) -> bool {
        self.strong.contains_key(&id)
    }

    pub fn weak_len(&self) -> usize {
        self.weak.len()
    }

    pub fn strong_len(&self) -> usize {
        self.strong.len()
    }

    /// Every pinned object also has a weak entry.
    #[cfg(test)]
    pub fn is_consistent(&self) -> bool {
        self.strong.keys().all(|id| self.weak.contains_key(id))
    }

    /// Empties the strong pool, handing back every pin. Weak entries stay
    /// until the wrappers' finalizers clear them.
    #[must_use = "drop the released pins after releasing the registry borrow"]
    pub fn drain_strong(&mut self) -> Vec<Pin> {
        self.strong.drain().map(|(_, pin)| pin).collect()
    }
}
