//! Typed field registration for override merging.
//!
//! Responsibilities:
//! - Define the [`Overlay`] trait connecting a configuration value to a
//!   mutable [`Target`] view the merge engine can write through.
//! - Implement [`Overlay`] for scalars, `Vec`, string-keyed maps and
//!   `Option` so nested configuration graphs compose without glue code.
//! - Provide the [`overlay!`] macro that registers a struct's external
//!   field names against its Rust fields.
//!
//! Does NOT handle:
//! - Walking an override document (see `merge` module).
//! - File I/O or decoding (see `loader` module).
//!
//! Invariants:
//! - Field lookup is a case-sensitive exact match on the registered name.
//! - A duplicate external name inside one `overlay!` block expands to a
//!   duplicate `match` arm, which rustc flags as an unreachable pattern.

use std::collections::{BTreeMap, HashMap};

/// A mutable, shape-tagged view of a single configuration value.
///
/// The merge engine matches a decoded JSON node against the variant to
/// decide whether an override applies; incompatible pairings are skipped.
pub enum Target<'a> {
    /// A string field.
    Str(&'a mut String),
    /// A boolean field.
    Bool(&'a mut bool),
    /// Any numeric field, assigned through a widening/narrowing cast.
    Number(&'a mut dyn NumericTarget),
    /// A nested struct with registered field names.
    Struct(&'a mut dyn OverlayStruct),
    /// An ordered sequence, replaced wholesale by override arrays.
    Seq(&'a mut dyn OverlaySeq),
    /// A string-keyed map merged entry by entry.
    Map(&'a mut dyn OverlayMap),
    /// An optional value, cleared by JSON `null`.
    Opt(&'a mut dyn OverlayOpt),
}

/// A configuration value that can receive overrides.
///
/// Implemented for the standard scalar and container types below; structs
/// opt in through the [`overlay!`] macro.
pub trait Overlay {
    /// Returns the mutable view the merge engine writes through.
    fn target(&mut self) -> Target<'_>;
}

/// A numeric field assignable from a JSON number.
///
/// JSON numbers are decoded as `f64` and converted with `as`, so values
/// outside the field's range truncate the way a direct cast does.
pub trait NumericTarget {
    /// Assigns the decoded number, casting to the concrete type.
    fn set(&mut self, value: f64);
}

/// A record-shaped value whose fields are addressed by external name.
pub trait OverlayStruct {
    /// Returns the field registered under `name`, if any.
    fn field_mut(&mut self, name: &str) -> Option<Target<'_>>;
}

/// A sequence-shaped field.
///
/// Override arrays replace the sequence wholesale: `reset` discards the
/// existing elements, then each override element is merged into the
/// freshly allocated slot of the same index.
pub trait OverlaySeq {
    /// Drops all existing elements and allocates `len` default ones.
    fn reset(&mut self, len: usize);
    /// Returns the element at `index`. Only called for `index < len`
    /// after a matching `reset`.
    fn elem_mut(&mut self, index: usize) -> Target<'_>;
}

/// A string-keyed map field. Missing keys are inserted as defaults before
/// the override value is merged into them.
pub trait OverlayMap {
    /// Returns the entry for `key`, inserting a default if absent.
    fn entry_mut(&mut self, key: &str) -> Target<'_>;
}

/// An optional field.
pub trait OverlayOpt {
    /// Whether the field currently holds no value.
    fn is_none(&self) -> bool;
    /// Returns the contained value, materializing a default first if the
    /// field is `None`.
    fn materialize(&mut self) -> Target<'_>;
    /// Resets the field to `None`.
    fn clear(&mut self);
}

impl Overlay for String {
    fn target(&mut self) -> Target<'_> {
        Target::Str(self)
    }
}

impl Overlay for bool {
    fn target(&mut self) -> Target<'_> {
        Target::Bool(self)
    }
}

macro_rules! numeric_overlay {
    ($($ty:ty),* $(,)?) => {
        $(
            impl NumericTarget for $ty {
                fn set(&mut self, value: f64) {
                    *self = value as $ty;
                }
            }

            impl Overlay for $ty {
                fn target(&mut self) -> Target<'_> {
                    Target::Number(self)
                }
            }
        )*
    };
}

numeric_overlay!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl<T: Overlay + Default> Overlay for Vec<T> {
    fn target(&mut self) -> Target<'_> {
        Target::Seq(self)
    }
}

impl<T: Overlay + Default> OverlaySeq for Vec<T> {
    fn reset(&mut self, len: usize) {
        self.clear();
        self.resize_with(len, T::default);
    }

    fn elem_mut(&mut self, index: usize) -> Target<'_> {
        self[index].target()
    }
}

impl<T: Overlay + Default> Overlay for BTreeMap<String, T> {
    fn target(&mut self) -> Target<'_> {
        Target::Map(self)
    }
}

impl<T: Overlay + Default> OverlayMap for BTreeMap<String, T> {
    fn entry_mut(&mut self, key: &str) -> Target<'_> {
        self.entry(key.to_string()).or_default().target()
    }
}

impl<T: Overlay + Default> Overlay for HashMap<String, T> {
    fn target(&mut self) -> Target<'_> {
        Target::Map(self)
    }
}

impl<T: Overlay + Default> OverlayMap for HashMap<String, T> {
    fn entry_mut(&mut self, key: &str) -> Target<'_> {
        self.entry(key.to_string()).or_default().target()
    }
}

impl<T: Overlay + Default> Overlay for Option<T> {
    fn target(&mut self) -> Target<'_> {
        Target::Opt(self)
    }
}

impl<T: Overlay + Default> OverlayOpt for Option<T> {
    fn is_none(&self) -> bool {
        Option::is_none(self)
    }

    fn materialize(&mut self) -> Target<'_> {
        self.get_or_insert_with(T::default).target()
    }

    fn clear(&mut self) {
        *self = None;
    }
}

/// Registers the external field names of one or more configuration structs.
///
/// Each entry maps the name used in override documents to the struct field
/// it writes to. Unregistered fields are never touched by a merge.
///
/// ```
/// use serde::Deserialize;
///
/// #[derive(Default, Deserialize)]
/// struct ServerConfig {
///     host: String,
///     port: u16,
/// }
///
/// envfig::overlay! {
///     ServerConfig {
///         "host" => host,
///         "port" => port,
///     }
/// }
/// ```
#[macro_export]
macro_rules! overlay {
    ($($ty:ty { $($name:literal => $field:ident),* $(,)? })+) => {
        $(
            impl $crate::OverlayStruct for $ty {
                fn field_mut(&mut self, name: &str) -> Option<$crate::Target<'_>> {
                    match name {
                        $($name => Some($crate::Overlay::target(&mut self.$field)),)*
                        _ => None,
                    }
                }
            }

            impl $crate::Overlay for $ty {
                fn target(&mut self) -> $crate::Target<'_> {
                    $crate::Target::Struct(self)
                }
            }
        )+
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Inner {
        value: i32,
    }

    crate::overlay! {
        Inner {
            "value" => value,
        }
    }

    #[test]
    fn test_numeric_cast_truncates_like_direct_cast() {
        let mut int_field: i32 = 0;
        int_field.set(123.9);
        assert_eq!(int_field, 123);

        let mut narrow: u8 = 0;
        narrow.set(300.0);
        assert_eq!(narrow, 300.0 as u8);

        let mut float_field: f32 = 0.0;
        float_field.set(1.5);
        assert_eq!(float_field, 1.5);
    }

    #[test]
    fn test_seq_reset_discards_existing_elements() {
        let mut values = vec![1i64, 2, 3];
        values.reset(2);
        assert_eq!(values, vec![0, 0]);
    }

    #[test]
    fn test_map_entry_inserts_default_for_missing_key() {
        let mut map: BTreeMap<String, Inner> = BTreeMap::new();
        match map.entry_mut("fresh") {
            Target::Struct(_) => {}
            _ => panic!("expected a struct view for the inserted entry"),
        }
        assert!(map.contains_key("fresh"));
    }

    #[test]
    fn test_option_materialize_and_clear() {
        let mut field: Option<String> = None;
        assert!(OverlayOpt::is_none(&field));

        if let Target::Str(slot) = field.materialize() {
            *slot = "set".to_string();
        }
        assert_eq!(field.as_deref(), Some("set"));

        OverlayOpt::clear(&mut field);
        assert!(field.is_none());
    }

    #[test]
    fn test_unregistered_field_name_returns_none() {
        let mut inner = Inner::default();
        assert!(inner.field_mut("unknown").is_none());
        assert!(inner.field_mut("Value").is_none(), "lookup is case-sensitive");
    }
}
