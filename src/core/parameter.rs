//! Parameter binding
//!
//! A [`ParameterSet`] is the ordered, name-unique collection of bindings a
//! command carries between executions. Names compare case-insensitively and
//! without their placeholder prefix (`@`, `:` or `$`), so `@Id`, `:id` and `ID`
//! all address the same binding. Re-binding a name overwrites the existing
//! entry in place: its position never changes, which keeps positional drivers
//! from ever seeing a duplicate.

use super::error::{DatabaseError, Result};
use super::value::{DatabaseValue, DbType, ToValue};
use std::collections::{BTreeMap, HashMap};

/// Placeholder prefixes stripped before names are compared
const PREFIXES: &[char] = &['@', ':', '$'];

/// Direction of a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParameterDirection {
    /// Value flows into the command
    #[default]
    Input,
    /// Value is produced by the command
    Output,
    /// Value flows both ways
    InputOutput,
}

/// One named binding
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    /// Name as given by the caller
    pub name: String,
    /// Bound value
    pub value: DatabaseValue,
    /// Declared or inferred type, kept when the value is null
    pub db_type: DbType,
    /// Parameter direction
    pub direction: ParameterDirection,
}

impl Parameter {
    /// Create an input parameter from any bindable value
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Binding`] if the name is empty or the value
    /// has no database representation.
    pub fn from_value<V: ToValue + ?Sized>(name: &str, value: &V) -> Result<Self> {
        if normalize_name(name).is_empty() {
            return Err(DatabaseError::binding(format!(
                "parameter name '{}' is empty",
                name
            )));
        }
        Ok(Self {
            name: name.to_string(),
            value: value.to_value()?,
            db_type: value.db_type(),
            direction: ParameterDirection::Input,
        })
    }

    /// Set the direction
    pub fn with_direction(mut self, direction: ParameterDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Name used for comparisons
    pub fn key(&self) -> String {
        normalize_name(&self.name)
    }
}

/// Strip the placeholder prefix and fold case
pub fn normalize_name(name: &str) -> String {
    name.trim().trim_start_matches(PREFIXES).to_lowercase()
}

/// Ordered collection of uniquely named parameters
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterSet {
    parameters: Vec<Parameter>,
}

impl ParameterSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `value` under `name`, replacing an existing binding in place
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Binding`] for an empty name or an
    /// unrepresentable value; the set is left unchanged.
    pub fn bind<V: ToValue + ?Sized>(&mut self, name: &str, value: &V) -> Result<&mut Self> {
        self.upsert(Parameter::from_value(name, value)?);
        Ok(self)
    }

    /// Bind with an explicit direction
    pub fn bind_with_direction<V: ToValue + ?Sized>(
        &mut self,
        name: &str,
        value: &V,
        direction: ParameterDirection,
    ) -> Result<&mut Self> {
        self.upsert(Parameter::from_value(name, value)?.with_direction(direction));
        Ok(self)
    }

    /// Bind every field of a record, skipping the names in `exclude`
    ///
    /// Either all fields are bound or, on error, none are.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Binding`] if two fields fold to the same name
    /// or a field value cannot be represented.
    pub fn bind_record<R: ToParameters + ?Sized>(
        &mut self,
        record: &R,
        exclude: &[&str],
    ) -> Result<&mut Self> {
        let excluded: Vec<String> = exclude.iter().map(|name| normalize_name(name)).collect();
        let mut incoming: Vec<Parameter> = Vec::new();
        for parameter in record.to_parameters()? {
            let key = parameter.key();
            if excluded.contains(&key) {
                continue;
            }
            if incoming.iter().any(|p| p.key() == key) {
                return Err(DatabaseError::binding(format!(
                    "record binds '{}' more than once (names are case-insensitive)",
                    parameter.name
                )));
            }
            incoming.push(parameter);
        }
        for parameter in incoming {
            self.upsert(parameter);
        }
        Ok(self)
    }

    /// Merge another set into this one, later bindings winning
    pub fn extend(&mut self, other: ParameterSet) {
        for parameter in other.parameters {
            self.upsert(parameter);
        }
    }

    fn upsert(&mut self, parameter: Parameter) {
        let key = parameter.key();
        match self.parameters.iter_mut().find(|p| p.key() == key) {
            Some(existing) => *existing = parameter,
            None => self.parameters.push(parameter),
        }
    }

    /// Look up a binding by name (prefix and case insensitive)
    pub fn get(&self, name: &str) -> Option<&Parameter> {
        let key = normalize_name(name);
        self.parameters.iter().find(|p| p.key() == key)
    }

    /// Bindings in position order
    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }

    /// Names in position order
    pub fn names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    /// True when nothing is bound
    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    /// Reject output and in-out parameters for drivers that cannot return them
    pub fn require_input_only(&self, driver: &str) -> Result<()> {
        match self
            .parameters
            .iter()
            .find(|p| p.direction != ParameterDirection::Input)
        {
            Some(p) => Err(DatabaseError::binding(format!(
                "driver '{}' does not support {:?} parameter '{}'",
                driver, p.direction, p.name
            ))),
            None => Ok(()),
        }
    }
}

impl<'a> IntoIterator for &'a ParameterSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A value whose fields bind as named parameters
///
/// Implemented by [`record!`](crate::record) types and by name → value maps.
pub trait ToParameters {
    /// One parameter per field, in field order
    fn to_parameters(&self) -> Result<Vec<Parameter>>;
}

impl<K: AsRef<str>, V: ToValue> ToParameters for [(K, V)] {
    fn to_parameters(&self) -> Result<Vec<Parameter>> {
        self.iter()
            .map(|(name, value)| Parameter::from_value(name.as_ref(), value))
            .collect()
    }
}

impl<K: AsRef<str>, V: ToValue> ToParameters for Vec<(K, V)> {
    fn to_parameters(&self) -> Result<Vec<Parameter>> {
        self.as_slice().to_parameters()
    }
}

impl<K: AsRef<str>, V: ToValue> ToParameters for BTreeMap<K, V> {
    fn to_parameters(&self) -> Result<Vec<Parameter>> {
        self.iter()
            .map(|(name, value)| Parameter::from_value(name.as_ref(), value))
            .collect()
    }
}

impl<K: AsRef<str>, V: ToValue, S> ToParameters for HashMap<K, V, S> {
    fn to_parameters(&self) -> Result<Vec<Parameter>> {
        self.iter()
            .map(|(name, value)| Parameter::from_value(name.as_ref(), value))
            .collect()
    }
}
