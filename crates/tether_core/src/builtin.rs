//! Built-in host classes
//!
//! A small hierarchy shared by the runtime binary and by tests:
//!
//! ```text
//! Object ─┬─ Node
//!         ├─ Engine            (singleton)
//!         └─ Reference ── Resource   (reference-counted)
//! ```

use crate::{CallError, ClassDb, ClassDbError, ClassDescriptor, MethodBind, ObjectDb, Variant, VariantType};

fn object_methods() -> ClassDescriptor {
    ClassDescriptor::new("Object")
        .constant("NOTIFICATION_POSTINITIALIZE", 0)
        .constant("NOTIFICATION_PREDELETE", 1)
        .enumeration(
            "ConnectFlags",
            &[("CONNECT_DEFERRED", 1), ("CONNECT_PERSIST", 2), ("CONNECT_ONESHOT", 4)],
        )
        .method(MethodBind::new("get_class", 0, |objects, id, _args| {
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            Ok(Variant::from(object.class_name()))
        }))
        .method(MethodBind::new("get_instance_id", 0, |_objects, id, _args| {
            Ok(Variant::Number(id.to_raw() as f64))
        }))
        .method(MethodBind::new("get", 1, |objects, id, args| {
            let name = CallError::expect(args, 0, VariantType::String, |v| v.as_str().map(str::to_owned))?;
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            Ok(object.get(&name).unwrap_or_default())
        }))
        .method(
            MethodBind::new("set", 2, |objects, id, args| {
                let name = CallError::expect(args, 0, VariantType::String, |v| v.as_str().map(str::to_owned))?;
                let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                object.set(&name, args.get(1).cloned().unwrap_or_default());
                Ok(Variant::Nil)
            })
            .without_return(),
        )
        .method(
            MethodBind::new("notification", 1, |objects, id, args| {
                let what = CallError::expect(args, 0, VariantType::Number, Variant::as_number)?;
                match objects.call_script(id, "_notification", &[Variant::Number(what)]) {
                    Ok(_) | Err(CallError::InvalidMethod) => Ok(Variant::Nil),
                    Err(err) => Err(err),
                }
            })
            .without_return(),
        )
        .method(MethodBind::virtual_method("_notification", 1))
}

fn node_methods() -> ClassDescriptor {
    ClassDescriptor::new("Node")
        .inherits("Object")
        .instantiable()
        .constant("NOTIFICATION_READY", 13)
        .enumeration(
            "PauseMode",
            &[("PAUSE_MODE_INHERIT", 0), ("PAUSE_MODE_STOP", 1), ("PAUSE_MODE_PROCESS", 2)],
        )
        .property(
            "name",
            Some(MethodBind::new("get_name", 0, |objects, id, _args| {
                let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                Ok(object.get("name").unwrap_or_else(|| Variant::from("")))
            })),
            Some(
                MethodBind::new("set_name", 1, |objects, id, args| {
                    let name = CallError::expect(args, 0, VariantType::String, |v| v.as_str().map(str::to_owned))?;
                    let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                    object.set("name", Variant::String(name));
                    Ok(Variant::Nil)
                })
                .without_return(),
            ),
        )
        .method(
            MethodBind::new("add_child", 1, |objects, id, args| {
                let child = CallError::expect(args, 0, VariantType::Object, Variant::as_object)?;
                if !objects.contains(child) {
                    return Err(CallError::InvalidArgument {
                        index: 0,
                        expected: VariantType::Object,
                    });
                }
                let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                let mut children = match object.get("children") {
                    Some(Variant::Array(children)) => children,
                    _ => Vec::new(),
                };
                children.push(Variant::Object(child));
                object.set("children", Variant::Array(children));
                Ok(Variant::Nil)
            })
            .without_return(),
        )
        .method(MethodBind::new("get_child_count", 0, |objects, id, _args| {
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            let count = match object.get("children") {
                Some(Variant::Array(children)) => children.len(),
                _ => 0,
            };
            Ok(Variant::Number(count as f64))
        }))
        .method(MethodBind::new("get_child", 1, |objects, id, args| {
            let index = CallError::expect(args, 0, VariantType::Number, Variant::as_number)?;
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            let child = match object.get("children") {
                Some(Variant::Array(children)) if index >= 0.0 => children.get(index as usize).cloned(),
                _ => None,
            };
            Ok(child.unwrap_or_default())
        }))
        .method(MethodBind::new("get_children", 0, |objects, id, _args| {
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            Ok(object.get("children").unwrap_or(Variant::Array(Vec::new())))
        }))
        .method(MethodBind::virtual_method("_ready", 0))
        .method(MethodBind::virtual_method("_process", 1))
}

fn reference_methods() -> ClassDescriptor {
    ClassDescriptor::new("Reference")
        .inherits("Object")
        .refcounted()
        .instantiable()
        .method(MethodBind::new("reference_get_count", 0, |objects, id, _args| {
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            Ok(Variant::Number(f64::from(object.refcount())))
        }))
}

fn resource_methods() -> ClassDescriptor {
    ClassDescriptor::new("Resource").inherits("Reference").instantiable().property(
        "resource_path",
        Some(MethodBind::new("get_path", 0, |objects, id, _args| {
            let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
            Ok(object.get("resource_path").unwrap_or_else(|| Variant::from("")))
        })),
        Some(
            MethodBind::new("set_path", 1, |objects, id, args| {
                let path = CallError::expect(args, 0, VariantType::String, |v| v.as_str().map(str::to_owned))?;
                let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                object.set("resource_path", Variant::String(path));
                Ok(Variant::Nil)
            })
            .without_return(),
        ),
    )
}

fn engine_methods() -> ClassDescriptor {
    ClassDescriptor::new("Engine")
        .inherits("Object")
        .method(MethodBind::new("get_version", 0, |_objects, _id, _args| {
            Ok(Variant::from(crate::VERSION))
        }))
        .property(
            "time_scale",
            Some(MethodBind::new("get_time_scale", 0, |objects, id, _args| {
                let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                Ok(object.get("time_scale").unwrap_or(Variant::Number(1.0)))
            })),
            Some(
                MethodBind::new("set_time_scale", 1, |objects, id, args| {
                    let scale = CallError::expect(args, 0, VariantType::Number, Variant::as_number)?;
                    let object = objects.get(id).ok_or(CallError::InstanceIsNull)?;
                    object.set("time_scale", Variant::Number(scale));
                    Ok(Variant::Nil)
                })
                .without_return(),
            ),
        )
}

/// Builds the built-in class database and allocates its singletons in
/// `objects`.
pub fn builtin_classes(objects: &ObjectDb) -> Result<ClassDb, ClassDbError> {
    let mut classes = ClassDb::new();
    classes.register(object_methods())?;
    classes.register(node_methods())?;
    classes.register(reference_methods())?;
    classes.register(resource_methods())?;
    classes.register(engine_methods())?;

    let engine = objects.create("Engine", false);
    classes.add_singleton(objects, "Engine", engine)?;

    for (name, value) in [("OK", 0), ("FAILED", 1), ("ERR_UNAVAILABLE", 2)] {
        classes.add_global_constant(name, Some("Error"), value);
    }
    for (name, value) in [("MARGIN_LEFT", 0), ("MARGIN_TOP", 1), ("MARGIN_RIGHT", 2), ("MARGIN_BOTTOM", 3)] {
        classes.add_global_constant(name, Some("Margin"), value);
    }
    classes.add_global_constant("TYPE_MAX", None, 27);

    Ok(classes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_hierarchy() {
        let objects = ObjectDb::new();
        let classes = builtin_classes(&objects).unwrap();

        assert!(classes.is_parent_class("Resource", "Object"));
        assert!(classes.is_refcounted("Resource"));
        assert!(!classes.is_refcounted("Node"));
        assert_eq!(classes.singletons().len(), 1);
        assert_eq!(objects.len(), 1);

        let node = classes.get("Node").unwrap();
        assert!(node.get_method("_ready").unwrap().is_virtual());
        assert!(node.properties().contains_key("name"));
        assert!(node.get_method("set_name").is_some());
    }

    #[test]
    fn node_children_and_names() {
        let objects = ObjectDb::new();
        let classes = builtin_classes(&objects).unwrap();
        let node = classes.get("Node").unwrap();
        let parent = classes.instantiate(&objects, "Node").unwrap();
        let child = classes.instantiate(&objects, "Node").unwrap();

        let call = |name: &str, id, args: &[Variant]| node.get_method(name).unwrap().call(&objects, id, args);

        call("set_name", parent, &[Variant::from("root")]).unwrap();
        assert_eq!(call("get_name", parent, &[]), Ok(Variant::from("root")));

        let object = classes.get("Object").unwrap();
        let notify = object.get_method("notification").unwrap();
        assert_eq!(notify.call(&objects, parent, &[Variant::Number(13.0)]), Ok(Variant::Nil));

        call("add_child", parent, &[Variant::Object(child)]).unwrap();
        assert_eq!(call("get_child_count", parent, &[]), Ok(Variant::Number(1.0)));
        assert_eq!(call("get_child", parent, &[Variant::Number(0.0)]), Ok(Variant::Object(child)));
        assert_eq!(call("get_child", parent, &[Variant::Number(3.0)]), Ok(Variant::Nil));

        assert_eq!(
            call("set_name", parent, &[Variant::Number(1.0)]),
            Err(CallError::InvalidArgument {
                index: 0,
                expected: VariantType::String
            })
        );
    }
}
