//! Parameters, parameter spaces and training sets.
//!
//! A [`Parameter`] assigns a fixed-shape array of real numbers to every named
//! component of a [`ParameterType`]. Parameters are validated once, at
//! construction, and are immutable afterwards. Because all stored values are
//! finite and `-0.0` is canonicalized to `0.0`, bitwise comparison coincides with
//! numeric comparison, which lets [`Parameter`] implement [`Eq`] and [`Hash`] and
//! be used as a key when checking training-set membership.
//!
//! A [`ParameterSpace`] is an axis-aligned box in parameter space. The only
//! sampling strategy provided is the uniform tensor grid
//! ([`ParameterSpace::sample_uniformly`]), which is how training sets are
//! usually produced.

use std::{
    collections::BTreeMap,
    fmt,
    hash::{Hash, Hasher},
};
use thiserror::Error;

/// Errors raised while constructing or validating parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParameterError {
    /// A value was supplied for a component the parameter type does not declare.
    #[error("Unknown parameter component '{0}'.")]
    UnknownComponent(String),
    /// A component declared by the parameter type has no value.
    #[error("Missing value for parameter component '{0}'.")]
    MissingComponent(String),
    /// The number of values does not match the declared shape.
    #[error("Shape mismatch for component '{name}': expected shape {expected:?} ({size} values), got {actual} values.")]
    ShapeMismatch {
        name: String,
        expected: Vec<usize>,
        size: usize,
        actual: usize,
    },
    /// NaN or infinite values are not valid parameter entries.
    #[error("Parameter component '{0}' contains a non-finite value.")]
    NonFinite(String),
    /// A parameter space range is empty or not finite.
    #[error("Invalid range [{min}, {max}] for parameter component '{name}'.")]
    InvalidRange { name: String, min: f64, max: f64 },
    /// The number of grid points does not fit in `usize`.
    #[error("A uniform grid with {count} points along each of {entries} entries is too large.")]
    GridTooLarge { count: usize, entries: usize },
}

/// The layout of a parameter: an ordered set of component names with their shapes.
///
/// Components are kept sorted by name, so two types declaring the same components
/// compare equal regardless of declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ParameterType {
    components: BTreeMap<String, Vec<usize>>,
}

impl ParameterType {
    pub fn new<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<usize>)>,
        S: Into<String>,
    {
        Self {
            components: components
                .into_iter()
                .map(|(name, shape)| (name.into(), shape))
                .collect(),
        }
    }

    /// Returns the declared shape of a component.
    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.components.get(name).map(Vec::as_slice)
    }

    /// Number of scalar entries of a component.
    pub fn size(&self, name: &str) -> Option<usize> {
        self.shape(name).map(shape_size)
    }

    /// Total number of scalar entries over all components.
    pub fn dim(&self) -> usize {
        self.components.values().map(|s| shape_size(s)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Iterates over `(name, shape)` pairs in name order.
    pub fn components(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.components
            .iter()
            .map(|(name, shape)| (name.as_str(), shape.as_slice()))
    }
}

fn shape_size(shape: &[usize]) -> usize {
    shape.iter().product()
}

#[derive(Debug, Clone, PartialEq)]
struct ComponentValue {
    shape: Vec<usize>,
    data: Vec<f64>,
}

/// An immutable point in parameter space.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    values: BTreeMap<String, ComponentValue>,
}

impl Parameter {
    /// Builds a parameter of type `ty` from `(name, values)` pairs.
    ///
    /// Values of array-valued components are given in row-major order. Every
    /// component of `ty` must be present, no other component may be given, and
    /// all values must be finite.
    pub fn new<I, S>(ty: &ParameterType, entries: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (S, Vec<f64>)>,
        S: Into<String>,
    {
        let mut values = BTreeMap::new();
        for (name, data) in entries {
            let name = name.into();
            let shape = ty
                .shape(&name)
                .ok_or_else(|| ParameterError::UnknownComponent(name.clone()))?;
            let size = shape_size(shape);
            if data.len() != size {
                return Err(ParameterError::ShapeMismatch {
                    name,
                    expected: shape.to_vec(),
                    size,
                    actual: data.len(),
                });
            }
            if data.iter().any(|v| !v.is_finite()) {
                return Err(ParameterError::NonFinite(name));
            }
            // Canonicalize -0.0 so that bitwise hashing agrees with `==`.
            let data = data
                .into_iter()
                .map(|v| if v == 0.0 { 0.0 } else { v })
                .collect();
            values.insert(
                name,
                ComponentValue {
                    shape: shape.to_vec(),
                    data,
                },
            );
        }

        if let Some((missing, _)) = ty.components().find(|(name, _)| !values.contains_key(*name)) {
            return Err(ParameterError::MissingComponent(missing.to_string()));
        }

        Ok(Self { values })
    }

    /// The values of a component in row-major order.
    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(|c| c.data.as_slice())
    }

    /// A single scalar entry of a component.
    pub fn component(&self, name: &str, index: usize) -> Option<f64> {
        self.get(name).and_then(|data| data.get(index).copied())
    }

    /// Reconstructs the type this parameter was validated against.
    pub fn parameter_type(&self) -> ParameterType {
        ParameterType::new(
            self.values
                .iter()
                .map(|(name, c)| (name.clone(), c.shape.clone())),
        )
    }

    /// Checks that this parameter has exactly the layout `ty`.
    pub fn check_type(&self, ty: &ParameterType) -> Result<(), ParameterError> {
        for (name, value) in &self.values {
            let shape = ty
                .shape(name)
                .ok_or_else(|| ParameterError::UnknownComponent(name.clone()))?;
            if shape != value.shape.as_slice() {
                return Err(ParameterError::ShapeMismatch {
                    name: name.clone(),
                    expected: shape.to_vec(),
                    size: shape_size(shape),
                    actual: value.data.len(),
                });
            }
        }
        match ty.components().find(|(name, _)| !self.values.contains_key(*name)) {
            Some((missing, _)) => Err(ParameterError::MissingComponent(missing.to_string())),
            None => Ok(()),
        }
    }
}

impl Eq for Parameter {}

impl Hash for Parameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for (name, value) in &self.values {
            name.hash(state);
            value.shape.hash(state);
            for v in &value.data {
                v.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.values.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            if value.shape.is_empty() {
                write!(f, "{name}: {}", value.data[0])?;
            } else {
                write!(f, "{name}: [")?;
                for (j, v) in value.data.iter().enumerate() {
                    if j > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{v}")?;
                }
                write!(f, "]")?;
            }
        }
        write!(f, "}}")
    }
}

/// An axis-aligned box of admissible parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpace {
    parameter_type: ParameterType,
    ranges: BTreeMap<String, (f64, f64)>,
}

impl ParameterSpace {
    /// A cube `[min, max]^d` shared by all components.
    pub fn new(parameter_type: ParameterType, min: f64, max: f64) -> Result<Self, ParameterError> {
        let ranges = parameter_type
            .components()
            .map(|(name, _)| (name.to_string(), (min, max)))
            .collect();
        Self::with_ranges(parameter_type, ranges)
    }

    /// A box with an individual range per component.
    pub fn with_ranges(
        parameter_type: ParameterType,
        ranges: BTreeMap<String, (f64, f64)>,
    ) -> Result<Self, ParameterError> {
        for (name, _) in parameter_type.components() {
            let &(min, max) = ranges
                .get(name)
                .ok_or_else(|| ParameterError::MissingComponent(name.to_string()))?;
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(ParameterError::InvalidRange {
                    name: name.to_string(),
                    min,
                    max,
                });
            }
        }
        if let Some(unknown) = ranges.keys().find(|k| parameter_type.shape(k).is_none()) {
            return Err(ParameterError::UnknownComponent(unknown.clone()));
        }
        Ok(Self {
            parameter_type,
            ranges,
        })
    }

    pub fn parameter_type(&self) -> &ParameterType {
        &self.parameter_type
    }

    /// Whether `mu` has the right type and lies inside the box.
    pub fn contains(&self, mu: &Parameter) -> bool {
        if mu.check_type(&self.parameter_type).is_err() {
            return false;
        }
        self.ranges.iter().all(|(name, &(min, max))| {
            mu.get(name)
                .is_some_and(|data| data.iter().all(|&v| min <= v && v <= max))
        })
    }

    /// Samples a uniform tensor grid with `count` points per scalar entry.
    ///
    /// End points are included. Points are ordered lexicographically: components
    /// in name order, entries within a component in row-major order, with the
    /// last entry varying fastest. For `count == 1` the lower corner is returned.
    ///
    /// # Errors
    ///
    /// [`ParameterError::GridTooLarge`] if `count^entries` overflows `usize`.
    pub fn sample_uniformly(&self, count: usize) -> Result<Vec<Parameter>, ParameterError> {
        if count == 0 {
            return Ok(Vec::new());
        }

        // One axis of grid values per scalar entry.
        let mut axes: Vec<(String, Vec<f64>)> = Vec::new();
        for (name, shape) in self.parameter_type.components() {
            let (min, max) = self.ranges[name];
            let axis = linspace(min, max, count);
            for _ in 0..shape_size(shape) {
                axes.push((name.to_string(), axis.clone()));
            }
        }

        let entries = axes.len();
        let total = u32::try_from(entries)
            .ok()
            .and_then(|exp| count.checked_pow(exp))
            .ok_or(ParameterError::GridTooLarge { count, entries })?;
        let mut samples = Vec::new();
        let mut digits = vec![0usize; axes.len()];
        for _ in 0..total {
            let mut entries: BTreeMap<String, Vec<f64>> = BTreeMap::new();
            for ((name, axis), &d) in axes.iter().zip(&digits) {
                entries.entry(name.clone()).or_default().push(axis[d]);
            }
            // Grid values are finite and the layout follows the type, so this cannot fail.
            if let Ok(mu) = Parameter::new(&self.parameter_type, entries) {
                samples.push(mu);
            }
            for d in digits.iter_mut().rev() {
                *d += 1;
                if *d < count {
                    break;
                }
                *d = 0;
            }
        }
        Ok(samples)
    }
}

fn linspace(min: f64, max: f64, count: usize) -> Vec<f64> {
    if count == 1 {
        return vec![min];
    }
    let step = (max - min) / (count - 1) as f64;
    (0..count)
        .map(|i| if i == count - 1 { max } else { min + step * i as f64 })
        .collect()
}

/// An ordered, finite collection of candidate parameters for a greedy search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    parameters: Vec<Parameter>,
}

impl TrainingSet {
    pub fn new(parameters: Vec<Parameter>) -> Self {
        Self { parameters }
    }

    /// The uniform grid of `space` with `count` points per scalar entry.
    pub fn uniform(space: &ParameterSpace, count: usize) -> Result<Self, ParameterError> {
        space.sample_uniformly(count).map(Self::new)
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Parameter> {
        self.parameters.get(index)
    }

    pub fn as_slice(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Parameter> {
        self.parameters.iter()
    }
}

impl From<Vec<Parameter>> for TrainingSet {
    fn from(parameters: Vec<Parameter>) -> Self {
        Self::new(parameters)
    }
}

impl FromIterator<Parameter> for TrainingSet {
    fn from_iter<I: IntoIterator<Item = Parameter>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a TrainingSet {
    type Item = &'a Parameter;
    type IntoIter = std::slice::Iter<'a, Parameter>;

    fn into_iter(self) -> Self::IntoIter {
        self.parameters.iter()
    }
}
