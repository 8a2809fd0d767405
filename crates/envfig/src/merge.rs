//! Merge engine applying a decoded override tree onto a typed target.
//!
//! Responsibilities:
//! - Walk an override document depth-first and write each compatible value
//!   through the typed [`Target`] views.
//! - Enforce the permissive override policy: unknown keys and
//!   shape-incompatible values are skipped without error.
//!
//! Does NOT handle:
//! - File I/O or JSON decoding (see `loader` module).
//! - Field name registration (see `overlay` module).
//!
//! Invariants:
//! - Override arrays replace the target sequence wholesale; elements of the
//!   old sequence never survive, whatever the two lengths were.
//! - A skipped value leaves the target untouched, including `Option` fields
//!   whose override turned out to be shape-incompatible.
//! - The walk is total: no input tree can make it panic or error.

use serde_json::{Map, Value};

use crate::overlay::{Overlay, OverlayStruct, Target};

/// Merges `overrides` onto `target`, field by field.
///
/// Keys with no registered field on the target, and values whose JSON shape
/// does not match the field they address, are silently ignored. Fields not
/// mentioned by the override keep their current value.
pub fn merge<T: Overlay + ?Sized>(overrides: &Map<String, Value>, target: &mut T) {
    match target.target() {
        Target::Struct(fields) => merge_struct(overrides, fields),
        Target::Map(entries) => {
            for (key, value) in overrides {
                merge_value(value, entries.entry_mut(key));
            }
        }
        _ => {}
    }
}

fn merge_struct(overrides: &Map<String, Value>, target: &mut dyn OverlayStruct) {
    for (key, value) in overrides {
        if let Some(field) = target.field_mut(key) {
            merge_value(value, field);
        }
    }
}

/// Applies one override node to one field view.
///
/// Returns whether the node and the view were shape-compatible; `false`
/// means the target was left untouched.
fn merge_value(value: &Value, target: Target<'_>) -> bool {
    match (value, target) {
        (Value::Object(map), Target::Struct(fields)) => {
            merge_struct(map, fields);
            true
        }
        (Value::Object(map), Target::Map(entries)) => {
            for (key, item) in map {
                merge_value(item, entries.entry_mut(key));
            }
            true
        }
        (Value::Array(items), Target::Seq(seq)) => {
            seq.reset(items.len());
            for (index, item) in items.iter().enumerate() {
                merge_value(item, seq.elem_mut(index));
            }
            true
        }
        (Value::String(text), Target::Str(slot)) => {
            *slot = text.clone();
            true
        }
        (Value::Bool(flag), Target::Bool(slot)) => {
            *slot = *flag;
            true
        }
        (Value::Number(number), Target::Number(slot)) => match number.as_f64() {
            Some(decoded) => {
                slot.set(decoded);
                true
            }
            None => false,
        },
        (Value::Null, Target::Opt(opt)) => {
            opt.clear();
            true
        }
        (value, Target::Opt(opt)) => {
            // Undo the materialized default if the inner shape rejects the
            // value, so a mismatch stays a strict no-op.
            let was_none = opt.is_none();
            let applied = merge_value(value, opt.materialize());
            if !applied && was_none {
                opt.clear();
            }
            applied
        }
        _ => false,
    }
}
