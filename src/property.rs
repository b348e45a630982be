//! Typed, range-checked node properties with revision tracking.
//!
//! Every node owns a [`Properties`] table built from a static list of
//! [`PropertyDescriptor`]s. Writes go through one validator
//! ([`PropertyDescriptor::validate`]) no matter where they come from: node
//! construction, a direct call on the table, or a [`Handle`](crate::Handle) on
//! the control thread.
//!
//! # Change detection
//!
//! The table keeps a monotonically increasing *generation*. Each write bumps it
//! and stamps the written property with the new value as its revision. A node
//! remembers the generation it last looked at and asks
//! [`changed_since`](Properties::changed_since) at the top of the next block:
//!
//! ```
//! use klangkern::{Properties, PropertyDescriptor, PropertyId};
//!
//! const GAIN: PropertyId = PropertyId::new(0);
//! let mut props = Properties::new(&[PropertyDescriptor::float("gain", 1.0, 0.0, 2.0)]);
//!
//! let seen = props.generation();
//! assert!(!props.changed_since(GAIN, seen));
//!
//! props.set_float(GAIN, 0.5).unwrap();
//! assert!(props.changed_since(GAIN, seen));
//! // Asking again is harmless; nothing is cleared by the query.
//! assert!(props.changed_since(GAIN, seen));
//! ```

use alloc::vec::Vec;
use core::fmt;

use hashbrown::HashMap;

use crate::error::{Error, Result};

/// The two scalar types a property can hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueType {
    Float,
    Int,
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Float => f.write_str("float"),
            ValueType::Int => f.write_str("int"),
        }
    }
}

/// A property value.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyValue {
    Float(f32),
    Int(i32),
}

impl PropertyValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            PropertyValue::Float(_) => ValueType::Float,
            PropertyValue::Int(_) => ValueType::Int,
        }
    }
}

impl From<f32> for PropertyValue {
    fn from(v: f32) -> Self {
        PropertyValue::Float(v)
    }
}

impl From<i32> for PropertyValue {
    fn from(v: i32) -> Self {
        PropertyValue::Int(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Int(v as i32)
    }
}

/// Type, default and inclusive range of a property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PropertyKind {
    Float { default: f32, min: f32, max: f32 },
    Int { default: i32, min: i32, max: i32 },
}

/// Static description of one property.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PropertyDescriptor {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub read_only: bool,
}

impl PropertyDescriptor {
    pub const fn float(name: &'static str, default: f32, min: f32, max: f32) -> Self {
        Self {
            name,
            kind: PropertyKind::Float { default, min, max },
            read_only: false,
        }
    }

    pub const fn int(name: &'static str, default: i32, min: i32, max: i32) -> Self {
        Self {
            name,
            kind: PropertyKind::Int { default, min, max },
            read_only: false,
        }
    }

    /// Mark the property as settable only during construction.
    pub const fn read_only(self) -> Self {
        Self { read_only: true, ..self }
    }

    pub fn value_type(&self) -> ValueType {
        match self.kind {
            PropertyKind::Float { .. } => ValueType::Float,
            PropertyKind::Int { .. } => ValueType::Int,
        }
    }

    pub fn default_value(&self) -> PropertyValue {
        match self.kind {
            PropertyKind::Float { default, .. } => PropertyValue::Float(default),
            PropertyKind::Int { default, .. } => PropertyValue::Int(default),
        }
    }

    /// Check type and range. This is the only validator in the crate; the
    /// read-only flag is enforced by the caller since construction may bypass it.
    pub fn validate(&self, value: PropertyValue) -> Result<PropertyValue> {
        match (self.kind, value) {
            (PropertyKind::Float { min, max, .. }, PropertyValue::Float(v)) => {
                // NaN fails both comparisons, so test for containment instead
                if v >= min && v <= max {
                    Ok(value)
                } else {
                    Err(Error::range(self.name, v, min, max))
                }
            }
            (PropertyKind::Int { min, max, .. }, PropertyValue::Int(v)) => {
                if (min..=max).contains(&v) {
                    Ok(value)
                } else {
                    Err(Error::range(self.name, v, min, max))
                }
            }
            _ => Err(Error::WrongType {
                name: self.name,
                expected: self.value_type(),
            }),
        }
    }
}

/// Index of a property inside a node's table.
///
/// Nodes export their ids as associated constants, e.g.
/// [`FilteredDelayNode::DELAY`](crate::nodes::FilteredDelayNode::DELAY).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyId(usize);

impl PropertyId {
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    pub const fn index(self) -> usize {
        self.0
    }
}

/// One slot in a [`Properties`] table.
#[derive(Clone, Debug)]
pub struct Property {
    descriptor: PropertyDescriptor,
    value: PropertyValue,
    revision: u64,
}

impl Property {
    pub fn descriptor(&self) -> &PropertyDescriptor {
        &self.descriptor
    }

    pub fn value(&self) -> PropertyValue {
        self.value
    }

    /// Generation at which this property was last written.
    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// The property table owned by a node.
#[derive(Clone, Debug)]
pub struct Properties {
    entries: Vec<Property>,
    by_name: HashMap<&'static str, PropertyId>,
    generation: u64,
}

impl Properties {
    /// Build a table holding every descriptor at its default value.
    pub fn new(descriptors: &[PropertyDescriptor]) -> Self {
        let generation = 1;
        let entries: Vec<Property> = descriptors
            .iter()
            .map(|d| Property {
                descriptor: *d,
                value: d.default_value(),
                revision: generation,
            })
            .collect();
        let by_name = descriptors
            .iter()
            .enumerate()
            .map(|(i, d)| (d.name, PropertyId(i)))
            .collect();

        Self {
            entries,
            by_name,
            generation,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look a property up by name.
    pub fn find(&self, name: &str) -> Option<PropertyId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: PropertyId) -> Result<&Property> {
        self.entries.get(id.0).ok_or(Error::UnknownProperty(id.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PropertyId, &Property)> {
        self.entries.iter().enumerate().map(|(i, p)| (PropertyId(i), p))
    }

    /// Copy of every descriptor, in id order.
    pub fn descriptors(&self) -> Vec<PropertyDescriptor> {
        self.entries.iter().map(|p| p.descriptor).collect()
    }

    /// Read a float property. Int properties are converted.
    ///
    /// Panics if `id` does not belong to this table; nodes only read their own ids.
    #[inline]
    pub fn float(&self, id: PropertyId) -> f32 {
        match self.entries[id.0].value {
            PropertyValue::Float(v) => v,
            PropertyValue::Int(v) => v as f32,
        }
    }

    /// Read an int property. Float properties are truncated.
    #[inline]
    pub fn int(&self, id: PropertyId) -> i32 {
        match self.entries[id.0].value {
            PropertyValue::Int(v) => v,
            PropertyValue::Float(v) => v as i32,
        }
    }

    /// Validated write from outside the node.
    pub fn set(&mut self, id: PropertyId, value: impl Into<PropertyValue>) -> Result<()> {
        let descriptor = self.get(id)?.descriptor;
        if descriptor.read_only {
            return Err(Error::ReadOnly(descriptor.name));
        }
        let value = descriptor.validate(value.into())?;
        self.write(id, value);
        Ok(())
    }

    pub fn set_float(&mut self, id: PropertyId, value: f32) -> Result<()> {
        self.set(id, value)
    }

    pub fn set_int(&mut self, id: PropertyId, value: i32) -> Result<()> {
        self.set(id, value)
    }

    /// Construction-time write: validated, but allowed on read-only properties.
    pub fn init(&mut self, id: PropertyId, value: impl Into<PropertyValue>) -> Result<()> {
        let descriptor = self.get(id)?.descriptor;
        let value = descriptor.validate(value.into())?;
        self.write(id, value);
        Ok(())
    }

    /// Narrow or widen a float property's range during construction.
    ///
    /// Fails if the current value would fall outside the new range.
    pub fn set_float_range(&mut self, id: PropertyId, min: f32, max: f32) -> Result<()> {
        let entry = self.entries.get_mut(id.0).ok_or(Error::UnknownProperty(id.0))?;
        match entry.descriptor.kind {
            PropertyKind::Float { default, .. } => {
                let narrowed = PropertyDescriptor {
                    kind: PropertyKind::Float { default, min, max },
                    ..entry.descriptor
                };
                narrowed.validate(entry.value)?;
                entry.descriptor = narrowed;
                Ok(())
            }
            PropertyKind::Int { .. } => Err(Error::WrongType {
                name: entry.descriptor.name,
                expected: ValueType::Int,
            }),
        }
    }

    /// Node-side write of a status value. Skips validation and the read-only
    /// flag, and only bumps the revision when the value actually changes.
    pub(crate) fn publish(&mut self, id: PropertyId, value: impl Into<PropertyValue>) {
        let value = value.into();
        if self.entries[id.0].value != value {
            self.write(id, value);
        }
    }

    fn write(&mut self, id: PropertyId, value: PropertyValue) {
        self.generation += 1;
        let entry = &mut self.entries[id.0];
        entry.value = value;
        entry.revision = self.generation;
    }

    /// Current generation. Store this after reacting to changes.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn revision(&self, id: PropertyId) -> u64 {
        self.entries[id.0].revision
    }

    /// Whether `id` was written after generation `seen`.
    #[inline]
    pub fn changed_since(&self, id: PropertyId, seen: u64) -> bool {
        self.entries[id.0].revision > seen
    }

    /// Whether any of `ids` was written after generation `seen`.
    #[inline]
    pub fn any_changed_since(&self, ids: &[PropertyId], seen: u64) -> bool {
        ids.iter().any(|&id| self.changed_since(id, seen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAIN: PropertyId = PropertyId::new(0);
    const MODE: PropertyId = PropertyId::new(1);
    const LIMIT: PropertyId = PropertyId::new(2);

    fn table() -> Properties {
        Properties::new(&[
            PropertyDescriptor::float("gain", 1.0, 0.0, 2.0),
            PropertyDescriptor::int("mode", 0, 0, 3),
            PropertyDescriptor::float("limit", 1.0, 0.0, 10.0).read_only(),
        ])
    }

    #[test]
    fn defaults_are_loaded() {
        let props = table();
        assert_eq!(props.len(), 3);
        assert_eq!(props.float(GAIN), 1.0);
        assert_eq!(props.int(MODE), 0);
        assert_eq!(props.find("limit"), Some(LIMIT));
        assert_eq!(props.find("nope"), None);
    }

    #[test]
    fn out_of_range_write_is_rejected_and_leaves_value() {
        let mut props = table();
        let seen = props.generation();
        let err = props.set_float(GAIN, 2.5).unwrap_err();
        assert!(matches!(err, Error::Range { name: "gain", .. }));
        assert_eq!(props.float(GAIN), 1.0);
        assert!(!props.changed_since(GAIN, seen));
    }

    #[test]
    fn nan_is_out_of_range() {
        let mut props = table();
        assert!(props.set_float(GAIN, f32::NAN).is_err());
    }

    #[test]
    fn type_mismatch_is_rejected() {
        let mut props = table();
        assert_eq!(
            props.set_int(GAIN, 1),
            Err(Error::WrongType { name: "gain", expected: ValueType::Float })
        );
        assert!(props.set_float(MODE, 1.0).is_err());
    }

    #[test]
    fn read_only_only_writable_through_init() {
        let mut props = table();
        assert_eq!(props.set_float(LIMIT, 2.0), Err(Error::ReadOnly("limit")));
        props.init(LIMIT, 2.0f32).unwrap();
        assert_eq!(props.float(LIMIT), 2.0);
        // init still validates the range
        assert!(props.init(LIMIT, 20.0f32).is_err());
    }

    #[test]
    fn unknown_property() {
        let mut props = table();
        assert_eq!(props.set_float(PropertyId::new(9), 0.0), Err(Error::UnknownProperty(9)));
    }

    #[test]
    fn revisions_track_individual_properties() {
        let mut props = table();
        let seen = props.generation();
        props.set_int(MODE, 2).unwrap();
        assert!(props.changed_since(MODE, seen));
        assert!(!props.changed_since(GAIN, seen));
        assert!(props.any_changed_since(&[GAIN, MODE], seen));

        let seen = props.generation();
        assert!(!props.any_changed_since(&[GAIN, MODE], seen));
    }

    #[test]
    fn writing_the_same_value_still_counts_as_a_write() {
        let mut props = table();
        let seen = props.generation();
        props.set_float(GAIN, 1.0).unwrap();
        assert!(props.changed_since(GAIN, seen));
    }

    #[test]
    fn publish_skips_unchanged_values() {
        let mut props = table();
        let seen = props.generation();
        props.publish(MODE, 0);
        assert!(!props.changed_since(MODE, seen));
        props.publish(MODE, 3);
        assert!(props.changed_since(MODE, seen));
        assert_eq!(props.int(MODE), 3);
    }

    #[test]
    fn float_range_can_be_narrowed_at_construction() {
        let mut props = table();
        props.set_float_range(GAIN, 0.0, 1.5).unwrap();
        assert!(props.set_float(GAIN, 1.75).is_err());
        assert!(props.set_float(GAIN, 1.25).is_ok());
        // current value 1.25 no longer fits
        assert!(props.set_float_range(GAIN, 0.0, 1.0).is_err());
        assert!(props.set_float_range(MODE, 0.0, 1.0).is_err());
    }
}
