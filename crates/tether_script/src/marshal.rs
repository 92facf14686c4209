//! Conversion between host variants and script values

use crate::state::BridgeState;
use crate::wrapper;
use rquickjs::{Ctx, Value};
use std::rc::Rc;
use tether_core::Variant;

/// Script value to variant. Wrappers of live objects become object
/// variants; anything without a host representation reads as nil.
pub(crate) fn to_variant<'js>(state: &BridgeState, ctx: &Ctx<'js>, value: &Value<'js>) -> Variant {
    if let Some(flag) = value.as_bool() {
        Variant::Bool(flag)
    } else if let Some(number) = value.as_number() {
        Variant::Number(number)
    } else if let Some(text) = value.as_string() {
        text.to_string().map(Variant::String).unwrap_or_default()
    } else if value.is_object() {
        wrapper::object_id(ctx, value)
            .filter(|id| state.objects.contains(*id))
            .map(Variant::Object)
            .unwrap_or_default()
    } else {
        Variant::Nil
    }
}

/// Variant to script value. Object variants resolve to the object's unique
/// wrapper, or `undefined` once the object is gone.
pub(crate) fn to_value<'js>(state: &Rc<BridgeState>, ctx: &Ctx<'js>, variant: &Variant) -> rquickjs::Result<Value<'js>> {
    match variant {
        Variant::Nil => Ok(Value::new_null(ctx.clone())),
        Variant::Bool(flag) => Ok(Value::new_bool(ctx.clone(), *flag)),
        Variant::Number(number) => Ok(Value::new_number(ctx.clone(), *number)),
        Variant::String(text) => rquickjs::String::from_str(ctx.clone(), text).map(|text| text.into_value()),
        Variant::Object(id) => state.wrap(ctx, Some(*id)),
        // TODO: bridge arrays once host containers grow a script representation.
        Variant::Array(_) => Ok(Value::new_undefined(ctx.clone())),
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::fixture;
    use tether_core::Variant;

    #[test]
    fn scalars_cross_in_both_directions() {
        let fixture = fixture();
        let calc = fixture.classes.instantiate(&fixture.objects, "Calculator").unwrap();

        fixture.bridge.with(|ctx| {
            ctx.globals().set("calc", fixture.bridge.wrap(&ctx, calc).unwrap()).unwrap();
            let results: Vec<rquickjs::Value> = ctx
                .eval(r#"[calc.add(2, 3.5), calc.echo("text"), calc.echo(true), calc.echo(null), calc.echo(undefined)]"#)
                .unwrap();
            assert_eq!(results[0].as_number(), Some(5.5));
            assert_eq!(results[1].as_string().unwrap().to_string().unwrap(), "text");
            assert_eq!(results[2].as_bool(), Some(true));
            assert!(results[3].is_null());
            assert!(results[4].is_null());
        });
    }

    #[test]
    fn wrappers_of_freed_objects_read_as_nil() {
        let fixture = fixture();
        let calc = fixture.classes.instantiate(&fixture.objects, "Calculator").unwrap();
        let node = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();

        fixture.bridge.with(|ctx| {
            ctx.globals().set("calc", fixture.bridge.wrap(&ctx, calc).unwrap()).unwrap();
            let stale = fixture.bridge.wrap(&ctx, node).unwrap();
            ctx.globals().set("stale", stale.clone()).unwrap();

            fixture.objects.free(node);
            assert_eq!(fixture.bridge.to_variant(&ctx, &stale), Variant::Nil);
            assert!(ctx.eval::<bool, _>("calc.echo(stale) === null").unwrap());
        });
    }

    #[test]
    fn objects_keep_their_identity() {
        let fixture = fixture();
        let parent = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();

        let identical: bool = fixture.bridge.with(|ctx| {
            ctx.globals().set("parent", fixture.bridge.wrap(&ctx, parent).unwrap()).unwrap();
            ctx.eval(
                r#"
                const child = new godot.Node();
                parent.add_child(child);
                parent.get_child(0) === child && parent.get_child(0).get_class() === "Node"
                "#,
            )
            .unwrap()
        });
        assert!(identical);
        assert_eq!(
            fixture.objects.get(parent).unwrap().get("children").map(|c| matches!(c, Variant::Array(ref v) if v.len() == 1)),
            Some(true)
        );
    }

    #[test]
    fn host_arrays_and_plain_objects_do_not_cross() {
        let fixture = fixture();
        let node = fixture.classes.instantiate(&fixture.objects, "Node").unwrap();

        fixture.bridge.with(|ctx| {
            ctx.globals().set("node", fixture.bridge.wrap(&ctx, node).unwrap()).unwrap();
            let children_undefined: bool = ctx.eval("node.get_children() === undefined").unwrap();
            assert!(children_undefined);
        });

        let echoed = fixture.bridge.with(|ctx| {
            let calc = fixture.classes.instantiate(&fixture.objects, "Calculator").unwrap();
            ctx.globals().set("calc", fixture.bridge.wrap(&ctx, calc).unwrap()).unwrap();
            ctx.eval::<bool, _>("calc.echo({ a: 1 }) === null && calc.echo(function () {}) === null")
                .unwrap()
        });
        assert!(echoed);
    }
}
