use crate::Bridge;
use std::rc::Rc;
use tether_core::builtin::builtin_classes;
use tether_core::{CallError, ClassDb, ClassDescriptor, MethodBind, ObjectDb, Variant, VariantType};
use tether_services::ScriptSettings;

pub(crate) struct Fixture {
    pub objects: Rc<ObjectDb>,
    pub classes: Rc<ClassDb>,
    pub bridge: Bridge,
}

fn calculator() -> ClassDescriptor {
    ClassDescriptor::new("Calculator")
        .inherits("Object")
        .instantiable()
        .method(MethodBind::new("add", 2, |_objects, _id, args| {
            let a = CallError::expect(args, 0, VariantType::Number, Variant::as_number)?;
            let b = CallError::expect(args, 1, VariantType::Number, Variant::as_number)?;
            Ok(Variant::Number(a + b))
        }))
        .method(MethodBind::new("arity", 2, |_objects, _id, args| {
            Ok(Variant::Number(args.len() as f64))
        }))
        .method(MethodBind::new("echo", 1, |_objects, _id, args| {
            Ok(args.first().cloned().unwrap_or_default())
        }))
}

pub(crate) fn fixture_with(settings: ScriptSettings) -> Fixture {
    let objects = Rc::new(ObjectDb::new());
    let mut classes = builtin_classes(&objects).unwrap();
    classes.register(calculator()).unwrap();
    let classes = Rc::new(classes);
    let bridge = Bridge::initialize(Rc::clone(&objects), Rc::clone(&classes), settings).unwrap();
    Fixture { objects, classes, bridge }
}

impl Fixture {
    /// Strong entries imply weak entries.
    pub fn pools_consistent(&self) -> bool {
        self.bridge.state().registry.borrow().is_consistent()
    }
}

pub(crate) fn fixture() -> Fixture {
    fixture_with(ScriptSettings::default())
}
