//! Tunable parameter descriptors.
//!
//! Every user-facing field of the synth carries a static [`Descriptor`]
//! (unit, range, response curve, or a set of symbolic choices). Types that
//! own such fields implement [`Tunable`] and report them to a
//! [`KnobVisitor`], recursing into nested structures. The core never
//! formats or prints these; display is left to whatever walks them.

use serde::Serialize;

use crate::error::SynthError;

/// Physical unit of a numeric parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    None,
    Milliseconds,
    Decibels,
}

/// How a control should map its travel onto the parameter range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    Linear,
    Logarithmic,
}

/// Static description of one tunable field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Descriptor {
    Numeric {
        unit: Unit,
        min: f64,
        max: f64,
        /// Quantisation step; `None` for continuous parameters.
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<f64>,
        curve: Curve,
    },
    Choice {
        choices: &'static [&'static str],
    },
}

impl Descriptor {
    /// Unitless whole-number range with a step of 1.
    pub const fn integer(min: i32, max: i32) -> Self {
        Descriptor::Numeric {
            unit: Unit::None,
            min: min as f64,
            max: max as f64,
            step: Some(1.0),
            curve: Curve::Linear,
        }
    }

    pub const fn continuous(unit: Unit, min: f64, max: f64, curve: Curve) -> Self {
        Descriptor::Numeric {
            unit,
            min,
            max,
            step: None,
            curve,
        }
    }

    /// Reject `value` if it falls outside this descriptor's range.
    ///
    /// For choice descriptors `value` is the choice index.
    pub fn check(&self, name: &'static str, value: f64) -> Result<(), SynthError> {
        let (min, max) = match *self {
            Descriptor::Numeric { min, max, .. } => (min, max),
            Descriptor::Choice { choices } => (0.0, choices.len().saturating_sub(1) as f64),
        };
        if value.is_finite() && value >= min && value <= max {
            Ok(())
        } else {
            Err(SynthError::ParameterOutOfRange {
                name,
                value,
                min,
                max,
            })
        }
    }
}

/// Current value of a knob.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum KnobValue {
    Integer(i64),
    Float(f64),
    Choice(&'static str),
}

/// One tunable field as reported to a visitor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Knob {
    pub name: &'static str,
    pub type_name: &'static str,
    pub descriptor: Descriptor,
    pub value: KnobValue,
}

/// Receives knobs from a [`Tunable`], bracketed by `enter`/`leave` for each
/// nested structure. `index` is set for elements of a sequence.
pub trait KnobVisitor {
    fn enter(&mut self, _name: &'static str, _index: Option<usize>) {}
    fn leave(&mut self) {}
    fn knob(&mut self, knob: Knob);
}

/// A structure exposing tunable fields.
pub trait Tunable {
    fn visit_knobs(&self, visitor: &mut dyn KnobVisitor);
}

/// Flattened knob with its full dotted path, e.g. `oscillators[1].cents`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KnobInfo {
    pub path: String,
    pub type_name: &'static str,
    pub descriptor: Descriptor,
    pub value: KnobValue,
}

#[derive(Default)]
struct PathCollector {
    segments: Vec<String>,
    knobs: Vec<KnobInfo>,
}

impl KnobVisitor for PathCollector {
    fn enter(&mut self, name: &'static str, index: Option<usize>) {
        match index {
            Some(i) => self.segments.push(format!("{name}[{i}]")),
            None => self.segments.push(name.to_string()),
        }
    }

    fn leave(&mut self) {
        self.segments.pop();
    }

    fn knob(&mut self, knob: Knob) {
        let mut path = self.segments.join(".");
        if !path.is_empty() {
            path.push('.');
        }
        path.push_str(knob.name);
        self.knobs.push(KnobInfo {
            path,
            type_name: knob.type_name,
            descriptor: knob.descriptor,
            value: knob.value,
        });
    }
}

/// Walk `root` and return every knob it exposes, in visiting order.
pub fn collect_knobs(root: &dyn Tunable) -> Vec<KnobInfo> {
    let mut collector = PathCollector::default();
    root.visit_knobs(&mut collector);
    collector.knobs
}
