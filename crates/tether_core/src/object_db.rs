//! Object database: allocation, lookup, reference counting
//!
//! Every host object lives here. Scripting layers observe lifetime changes
//! through [`ObjectHooks`]; the database never calls a hook while one of its
//! own borrows is held, so hooks are free to call back in.

use crate::{CallError, HostObject, ObjectId, Variant};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Callbacks installed by a scripting layer.
pub trait ObjectHooks {
    /// Asked when binding data is requested for an object that has none yet.
    /// Returning `false` leaves the object without a binding.
    fn alloc_binding(&self, id: ObjectId) -> bool;

    /// The object has been destroyed.
    fn object_freed(&self, id: ObjectId);

    fn refcount_incremented(&self, id: ObjectId);

    /// Returns whether the object may be destroyed.
    fn refcount_decremented(&self, id: ObjectId) -> bool;

    /// Calls `method` on the script instance attached to the object. May be
    /// reached from inside a script call.
    fn call_script(&self, _id: ObjectId, _method: &str, _args: &[Variant]) -> Result<Variant, CallError> {
        Err(CallError::InvalidMethod)
    }
}

pub struct ObjectDb {
    objects: RefCell<HashMap<ObjectId, Rc<HostObject>>>,
    next_id: Cell<u64>,
    hooks: RefCell<Option<Weak<dyn ObjectHooks>>>,
}

impl ObjectDb {
    pub fn new() -> Self {
        Self {
            objects: RefCell::new(HashMap::new()),
            next_id: Cell::new(1),
            hooks: RefCell::new(None),
        }
    }

    pub fn set_hooks(&self, hooks: Weak<dyn ObjectHooks>) {
        *self.hooks.borrow_mut() = Some(hooks);
    }

    pub fn clear_hooks(&self) {
        self.hooks.borrow_mut().take();
    }

    fn hooks(&self) -> Option<Rc<dyn ObjectHooks>> {
        self.hooks.borrow().as_ref().and_then(Weak::upgrade)
    }

    /// Allocates a new object. Reference-counted objects start with one
    /// reference owned by the caller.
    pub fn create(&self, class_name: &str, refcounted: bool) -> ObjectId {
        let id = ObjectId::from_raw(self.next_id.get());
        self.next_id.set(id.to_raw() + 1);

        let object = Rc::new(HostObject::new(id, class_name, refcounted));
        self.objects.borrow_mut().insert(id, object);
        tracing::trace!(%id, class_name, refcounted, "object created");
        id
    }

    pub fn get(&self, id: ObjectId) -> Option<Rc<HostObject>> {
        self.objects.borrow().get(&id).cloned()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.borrow().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.borrow().is_empty()
    }

    /// Destroys the object. Returns `false` if it was already gone.
    pub fn free(&self, id: ObjectId) -> bool {
        let removed = self.objects.borrow_mut().remove(&id);
        let Some(object) = removed else {
            return false;
        };

        tracing::trace!(%id, class_name = object.class_name(), "object freed");
        if let Some(hooks) = self.hooks() {
            hooks.object_freed(id);
        }
        true
    }

    pub fn reference(&self, id: ObjectId) -> bool {
        let Some(object) = self.get(id) else {
            return false;
        };
        if !object.is_refcounted() {
            return false;
        }

        object.increment();
        if let Some(hooks) = self.hooks() {
            hooks.refcount_incremented(id);
        }
        true
    }

    /// Drops one reference and reports whether the object may die.
    ///
    /// The object is not freed here; see [`ObjectDb::release`].
    pub fn unreference(&self, id: ObjectId) -> bool {
        let Some(object) = self.get(id) else {
            return false;
        };
        if !object.is_refcounted() {
            return false;
        }

        let mut may_die = object.decrement() == 0;
        if let Some(hooks) = self.hooks() {
            may_die = hooks.refcount_decremented(id) && may_die;
        }
        may_die
    }

    /// Drops one reference and frees the object when nothing else may keep
    /// it alive. Returns whether the object was freed.
    pub fn release(&self, id: ObjectId) -> bool {
        self.unreference(id) && self.free(id)
    }

    /// Returns whether the object carries binding data, allocating it
    /// through the hooks when it does not yet.
    pub fn binding(&self, id: ObjectId) -> bool {
        let Some(object) = self.get(id) else {
            return false;
        };
        if object.has_binding() {
            return true;
        }

        let allocated = self
            .hooks()
            .map(|hooks| hooks.alloc_binding(id))
            .unwrap_or(false);
        if allocated {
            object.attach_binding();
        }
        allocated
    }

    /// Dispatches `method` to the object's script instance.
    /// [`CallError::InvalidMethod`] means no script handles it.
    pub fn call_script(&self, id: ObjectId, method: &str, args: &[Variant]) -> Result<Variant, CallError> {
        if !self.contains(id) {
            return Err(CallError::InstanceIsNull);
        }
        match self.hooks() {
            Some(hooks) => hooks.call_script(id, method, args),
            None => Err(CallError::InvalidMethod),
        }
    }

    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.borrow().keys().copied().collect();
        ids.sort();
        ids
    }
}

impl Default for ObjectDb {
    fn default() -> Self {
        Self::new()
    }
}
