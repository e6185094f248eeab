use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::impl_sqlx_json_text_type_encode_decode;

pub const GRADES_COUNT: usize = 12;
pub const MIN_GRADE: f64 = 0.0;
pub const MAX_GRADE: f64 = 10.0;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum GradeVectorError {
    #[error("Grades must contain exactly {expected} values, got {actual}")]
    WrongLength { expected: usize, actual: usize },
    #[error("Grades must be an array")]
    NotAnArray,
}

#[derive(thiserror::Error, Debug, PartialEq)]
#[error("Invalid grade bounds: min {min}, max {max}")]
pub struct InvalidGradeBounds {
    pub min: f64,
    pub max: f64,
}

/// Inclusive range every stored grade must lie in.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GradeBounds {
    pub min: f64,
    pub max: f64,
}
impl Default for GradeBounds {
    fn default() -> Self {
        Self { min: MIN_GRADE, max: MAX_GRADE }
    }
}
impl GradeBounds {
    pub fn new(min: f64, max: f64) -> Result<Self, InvalidGradeBounds> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(InvalidGradeBounds { min, max });
        }
        Ok(Self { min, max })
    }
    pub fn contains(&self, grade: f64) -> bool {
        grade >= self.min && grade <= self.max
    }
    /// Coerces `value` to a number and clamps it into the bounds.
    pub fn clamp(&self, value: &Value) -> f64 {
        clamp(value, self.min, self.max)
    }
}

/// Numeric reading of an arbitrary JSON value, `None` when it is not a number.
pub fn coerce(value: &Value) -> Option<f64> {
    let num = match value {
        Value::Null => 0.0,
        Value::Bool(b) => if *b { 1.0 } else { 0.0 },
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() { 0.0 } else { parse_decimal(s)? }
        }
        Value::Array(_) | Value::Object(_) => return None,
    };
    if num.is_nan() { None } else { Some(num) }
}

// decimal notation only, `inf` and `NaN` spellings are not numbers here
fn parse_decimal(s: &str) -> Option<f64> {
    if !s.bytes().any(|b| b.is_ascii_digit()) {
        return None;
    }
    if !s.bytes().all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E')) {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Non-numeric input yields 0, which is then clamped like any other value.
pub fn clamp(value: &Value, min: f64, max: f64) -> f64 {
    coerce(value).unwrap_or(0.0).max(min).min(max)
}

pub fn validate_grade_vector(grades: &[f64], expected_len: usize, bounds: &GradeBounds) -> bool {
    grades.len() == expected_len && grades.iter().all(|&g| bounds.contains(g))
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq)]
pub struct Aggregate {
    pub total: f64,
    pub average: f64,
}

/// The average always divides by [`GRADES_COUNT`], placeholder zeros included.
pub fn aggregate(grades: &[f64]) -> Aggregate {
    let total: f64 = grades.iter().sum();
    Aggregate {
        total,
        average: total / GRADES_COUNT as f64,
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(transparent)]
pub struct GradeVector(pub Vec<f64>);
impl_sqlx_json_text_type_encode_decode!(GradeVector);

impl GradeVector {
    pub fn zeroed() -> Self {
        Self(vec![0.0; GRADES_COUNT])
    }
    /// Full-vector replacement: the length must match exactly, elements are clamped.
    pub fn from_values(values: &Value, bounds: &GradeBounds) -> Result<Self, GradeVectorError> {
        let Value::Array(values) = values else {
            return Err(GradeVectorError::NotAnArray);
        };
        if values.len() != GRADES_COUNT {
            return Err(GradeVectorError::WrongLength { expected: GRADES_COUNT, actual: values.len() });
        }
        Ok(Self(values.iter().map(|v| bounds.clamp(v)).collect()))
    }
    pub fn is_valid(&self, bounds: &GradeBounds) -> bool {
        validate_grade_vector(&self.0, GRADES_COUNT, bounds)
    }
    pub fn aggregate(&self) -> Aggregate {
        aggregate(&self.0)
    }
}
