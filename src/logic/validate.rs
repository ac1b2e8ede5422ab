use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A failed check on one control. Validation failures are states, not errors:
/// they gate `valid` but never stop editing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub error_type: ValidationErrorType,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationErrorType {
    Required,
    MinLength,
    MaxLength,
    Minimum,
    Maximum,
    Pattern,
    NullValue,
    NotAllowed,
    /// Contributed by a nested sub-form, not by a validator
    SubForm,
}

impl ValidationError {
    fn new(error_type: ValidationErrorType, message: String) -> Self {
        Self {
            error_type,
            message,
            expected: None,
            actual: None,
        }
    }

    fn with(mut self, expected: impl ToString, actual: impl ToString) -> Self {
        self.expected = Some(expected.to_string());
        self.actual = Some(actual.to_string());
        self
    }

    pub fn sub_form(message: impl Into<String>) -> Self {
        Self::new(ValidationErrorType::SubForm, message.into())
    }
}

/// Checks attached to a control by the form builder
#[derive(Debug, Clone)]
pub enum Validator {
    Required,
    MinLength(usize),
    MaxLength(usize),
    Minimum(f64),
    Maximum(f64),
    Pattern { source: String, regex: Regex },
    /// Invalid while the value still equals the empty sentinel
    NullValue(Value),
    OneOf(Vec<Value>),
}

/// Null, `""` and `[]` count as "nothing entered"
pub fn is_empty_input(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Equal to the sentinel, or for object-shaped values carrying the same `id`.
/// Only `id` is compared for objects; other fields are ignored.
pub fn is_null_equivalent(value: &Value, sentinel: &Value) -> bool {
    if value == sentinel {
        return true;
    }
    match (value, sentinel) {
        (Value::Object(value), Value::Object(sentinel)) => match sentinel.get("id") {
            Some(id) => value.get("id") == Some(id),
            None => false,
        },
        _ => false,
    }
}

fn length_of(value: &Value) -> Option<usize> {
    match value {
        Value::String(s) => Some(s.chars().count()),
        Value::Array(items) => Some(items.len()),
        _ => None,
    }
}

fn number_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| !n.is_nan())
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl Validator {
    /// Anchored pattern validator; `None` for patterns that do not compile
    pub fn pattern(source: &str) -> Option<Self> {
        let anchored = format!(
            "^(?:{})$",
            source.trim_start_matches('^').trim_end_matches('$')
        );
        match Regex::new(&anchored) {
            Ok(regex) => Some(Validator::Pattern {
                source: source.to_string(),
                regex,
            }),
            Err(err) => {
                log::warn!("Ignoring invalid pattern '{}': {}", source, err);
                None
            }
        }
    }

    pub fn validate(&self, value: &Value) -> Option<ValidationError> {
        use ValidationErrorType as T;

        match self {
            Validator::Required => is_empty_input(value)
                .then(|| ValidationError::new(T::Required, "This field is required".to_string())),
            Validator::MinLength(min) => {
                if is_empty_input(value) {
                    return None;
                }
                let len = length_of(value)?;
                (len < *min).then(|| {
                    ValidationError::new(T::MinLength, format!("Minimum length is {}", min))
                        .with(min, len)
                })
            }
            Validator::MaxLength(max) => {
                let len = length_of(value)?;
                (len > *max).then(|| {
                    ValidationError::new(T::MaxLength, format!("Maximum length is {}", max))
                        .with(max, len)
                })
            }
            Validator::Minimum(min) => {
                let n = number_of(value)?;
                (n < *min).then(|| {
                    ValidationError::new(T::Minimum, format!("Value must be at least {}", min))
                        .with(min, n)
                })
            }
            Validator::Maximum(max) => {
                let n = number_of(value)?;
                (n > *max).then(|| {
                    ValidationError::new(T::Maximum, format!("Value must be at most {}", max))
                        .with(max, n)
                })
            }
            Validator::Pattern { source, regex } => {
                if is_empty_input(value) {
                    return None;
                }
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Number(n) => n.to_string(),
                    _ => return None,
                };
                (!regex.is_match(&text)).then(|| {
                    ValidationError::new(
                        T::Pattern,
                        format!("Value does not match the required format {}", source),
                    )
                    .with(source, text)
                })
            }
            Validator::NullValue(sentinel) => is_null_equivalent(value, sentinel).then(|| {
                ValidationError::new(T::NullValue, "Please fill in this field".to_string())
                    .with("a value", display(value))
            }),
            Validator::OneOf(allowed) => {
                if is_empty_input(value) || allowed.contains(value) {
                    return None;
                }
                let options: Vec<String> = allowed.iter().map(display).collect();
                Some(
                    ValidationError::new(
                        T::NotAllowed,
                        format!("Value must be one of: {}", options.join(", ")),
                    )
                    .with(options.join("|"), display(value)),
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_required() {
        assert!(Validator::Required.validate(&json!("")).is_some());
        assert!(Validator::Required.validate(&json!([])).is_some());
        assert!(Validator::Required.validate(&Value::Null).is_some());
        assert!(Validator::Required.validate(&json!(0)).is_none());
        assert!(Validator::Required.validate(&json!({"id": -1})).is_none());
    }

    #[test]
    fn test_lengths_and_bounds() {
        assert!(Validator::MinLength(3).validate(&json!("ab")).is_some());
        assert!(Validator::MinLength(3).validate(&json!("")).is_none());
        assert!(Validator::MaxLength(1).validate(&json!(["a", "b"])).is_some());
        assert!(Validator::Minimum(1.0).validate(&json!(0)).is_some());
        assert!(Validator::Maximum(10.0).validate(&json!("11")).is_some());
        assert!(Validator::Maximum(10.0).validate(&json!(10)).is_none());

        let err = Validator::MinLength(3).validate(&json!("ab")).unwrap();
        assert_eq!(err.message, "Minimum length is 3");
        assert_eq!(err.actual.as_deref(), Some("2"));
    }

    #[test]
    fn test_pattern_is_anchored() {
        let opus = Validator::pattern("[0-9]+").unwrap();
        assert!(opus.validate(&json!("123")).is_none());
        assert!(opus.validate(&json!("12a")).is_some());
        assert!(opus.validate(&json!("")).is_none());
        assert!(Validator::pattern("([").is_none());
    }

    #[test]
    fn test_null_equivalence() {
        let sentinel = json!({"id": -1});
        let validator = Validator::NullValue(sentinel.clone());
        assert!(validator.validate(&json!({"id": -1, "name": "x"})).is_some());
        assert!(validator.validate(&json!({"id": 4})).is_none());
        assert!(is_null_equivalent(&sentinel, &sentinel));

        let validator = Validator::NullValue(json!(""));
        assert!(validator.validate(&json!("")).is_some());
        assert!(validator.validate(&json!("Messe")).is_none());
    }

    #[test]
    fn test_one_of() {
        let validator = Validator::OneOf(vec![json!("major"), json!("minor")]);
        assert!(validator.validate(&json!("minor")).is_none());
        let err = validator.validate(&json!("lydian")).unwrap();
        assert_eq!(err.error_type, ValidationErrorType::NotAllowed);
    }
}
