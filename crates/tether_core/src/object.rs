//! Host objects and their identities

use crate::Variant;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;

/// Stable identity of a host object.
///
/// Ids are allocated monotonically and never reused, so a stale id simply
/// stops resolving once its object is freed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(u64);

impl ObjectId {
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A native object owned by the [`ObjectDb`](crate::ObjectDb).
#[derive(Debug)]
pub struct HostObject {
    id: ObjectId,
    class_name: String,
    refcounted: bool,
    refcount: Cell<u32>,
    binding: Cell<bool>,
    script_class: RefCell<Option<String>>,
    properties: RefCell<HashMap<String, Variant>>,
}

impl HostObject {
    pub(crate) fn new(id: ObjectId, class_name: &str, refcounted: bool) -> Self {
        Self {
            id,
            class_name: class_name.to_string(),
            refcounted,
            refcount: Cell::new(u32::from(refcounted)),
            binding: Cell::new(false),
            script_class: RefCell::new(None),
            properties: RefCell::new(HashMap::new()),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    pub fn is_refcounted(&self) -> bool {
        self.refcounted
    }

    pub fn refcount(&self) -> u32 {
        self.refcount.get()
    }

    /// Whether script binding data has been attached.
    pub fn has_binding(&self) -> bool {
        self.binding.get()
    }

    pub(crate) fn attach_binding(&self) {
        self.binding.set(true);
    }

    pub(crate) fn increment(&self) -> u32 {
        let count = self.refcount.get().saturating_add(1);
        self.refcount.set(count);
        count
    }

    /// Saturates at zero.
    pub(crate) fn decrement(&self) -> u32 {
        let count = self.refcount.get().saturating_sub(1);
        self.refcount.set(count);
        count
    }

    /// Name of the script class attached to this object, if any.
    pub fn script_class(&self) -> Option<String> {
        self.script_class.borrow().clone()
    }

    pub fn set_script_class(&self, class_name: Option<&str>) {
        *self.script_class.borrow_mut() = class_name.map(str::to_string);
    }

    pub fn get(&self, name: &str) -> Option<Variant> {
        self.properties.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Variant) {
        self.properties.borrow_mut().insert(name.to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refcount_starts_at_one_only_for_refcounted_objects() {
        let counted = HostObject::new(ObjectId::from_raw(1), "Reference", true);
        let plain = HostObject::new(ObjectId::from_raw(2), "Node", false);

        assert_eq!(counted.refcount(), 1);
        assert_eq!(plain.refcount(), 0);
    }

    #[test]
    fn decrement_saturates() {
        let object = HostObject::new(ObjectId::from_raw(1), "Reference", true);
        assert_eq!(object.increment(), 2);
        assert_eq!(object.decrement(), 1);
        assert_eq!(object.decrement(), 0);
        assert_eq!(object.decrement(), 0);
    }

    #[test]
    fn id_display() {
        assert_eq!(ObjectId::from_raw(42).to_string(), "#42");
    }
}
