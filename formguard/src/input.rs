//! Inputs: the named fields of the document and their constraint validity.

use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use regex::Regex;

use crate::error::{PatternError, SelectorError};

/// One of the standard constraint-validation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Constraint {
    ValueMissing,
    TooShort,
    TooLong,
    PatternMismatch,
    RangeUnderflow,
    RangeOverflow,
    StepMismatch,
    TypeMismatch,
    BadInput,
    CustomError,
}

impl Constraint {
    pub const ALL: [Constraint; 10] = [
        Self::ValueMissing,
        Self::TooShort,
        Self::TooLong,
        Self::PatternMismatch,
        Self::RangeUnderflow,
        Self::RangeOverflow,
        Self::StepMismatch,
        Self::TypeMismatch,
        Self::BadInput,
        Self::CustomError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValueMissing => "valueMissing",
            Self::TooShort => "tooShort",
            Self::TooLong => "tooLong",
            Self::PatternMismatch => "patternMismatch",
            Self::RangeUnderflow => "rangeUnderflow",
            Self::RangeOverflow => "rangeOverflow",
            Self::StepMismatch => "stepMismatch",
            Self::TypeMismatch => "typeMismatch",
            Self::BadInput => "badInput",
            Self::CustomError => "customError",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Constraint {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| SelectorError(s.to_string()))
    }
}

/// Which constraints the current value violates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidityState {
    pub value_missing: bool,
    pub too_short: bool,
    pub too_long: bool,
    pub pattern_mismatch: bool,
    pub range_underflow: bool,
    pub range_overflow: bool,
    pub step_mismatch: bool,
    pub type_mismatch: bool,
    pub bad_input: bool,
    pub custom_error: bool,
}

impl ValidityState {
    pub fn has(&self, constraint: Constraint) -> bool {
        match constraint {
            Constraint::ValueMissing => self.value_missing,
            Constraint::TooShort => self.too_short,
            Constraint::TooLong => self.too_long,
            Constraint::PatternMismatch => self.pattern_mismatch,
            Constraint::RangeUnderflow => self.range_underflow,
            Constraint::RangeOverflow => self.range_overflow,
            Constraint::StepMismatch => self.step_mismatch,
            Constraint::TypeMismatch => self.type_mismatch,
            Constraint::BadInput => self.bad_input,
            Constraint::CustomError => self.custom_error,
        }
    }

    pub fn set(&mut self, constraint: Constraint, violated: bool) {
        let flag = match constraint {
            Constraint::ValueMissing => &mut self.value_missing,
            Constraint::TooShort => &mut self.too_short,
            Constraint::TooLong => &mut self.too_long,
            Constraint::PatternMismatch => &mut self.pattern_mismatch,
            Constraint::RangeUnderflow => &mut self.range_underflow,
            Constraint::RangeOverflow => &mut self.range_overflow,
            Constraint::StepMismatch => &mut self.step_mismatch,
            Constraint::TypeMismatch => &mut self.type_mismatch,
            Constraint::BadInput => &mut self.bad_input,
            Constraint::CustomError => &mut self.custom_error,
        };
        *flag = violated;
    }

    /// The first violated constraint, worst first.
    pub fn first_violation(&self) -> Option<Constraint> {
        Constraint::ALL.into_iter().find(|c| self.has(*c))
    }

    pub fn is_valid(&self) -> bool {
        self.first_violation().is_none()
    }
}

/// A named input living in the form's document.
///
/// The form reads the value and validity at the start of each pass.
pub trait FieldInput: Send + Sync {
    /// Field name, shared by the input and its rule groups.
    fn name(&self) -> String;

    /// Current raw value.
    fn value(&self) -> String;

    /// Constraint validity of the current value.
    fn validity(&self) -> ValidityState;

    /// Message describing the first violated constraint, empty when valid.
    fn validation_message(&self) -> String;
}

/// Value and validity of an input, captured once per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSnapshot {
    pub name: String,
    pub value: String,
    pub validity: ValidityState,
    pub validation_message: String,
}

impl FieldSnapshot {
    pub fn capture(input: &dyn FieldInput) -> Self {
        Self {
            name: input.name(),
            value: input.value(),
            validity: input.validity(),
            validation_message: input.validation_message(),
        }
    }
}

/// Kind of value a [`TextInput`] accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum InputType {
    #[default]
    Text,
    Password,
    Email,
    Number,
}

#[derive(Debug, Clone, Default)]
struct Constraints {
    input_type: InputType,
    required: bool,
    min_length: Option<usize>,
    max_length: Option<usize>,
    pattern: Option<Regex>,
    min: Option<f64>,
    max: Option<f64>,
    step: Option<f64>,
}

#[derive(Debug, Default)]
struct TextInputState {
    value: String,
    custom_validity: String,
}

/// A text input with HTML-style constraints.
///
/// Cheap to clone; clones share the value, like [`Arc`].
///
/// # Example
///
/// ```ignore
/// let username = TextInput::new("username").required().min_length(3);
/// username.set_value("jo");
/// assert!(username.validity().too_short);
/// ```
#[derive(Debug, Clone)]
pub struct TextInput {
    name: String,
    constraints: Arc<Constraints>,
    state: Arc<RwLock<TextInputState>>,
}

impl TextInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            constraints: Arc::new(Constraints::default()),
            state: Arc::new(RwLock::new(TextInputState::default())),
        }
    }

    fn configure(mut self, f: impl FnOnce(&mut Constraints)) -> Self {
        let mut constraints = Arc::unwrap_or_clone(self.constraints);
        f(&mut constraints);
        self.constraints = Arc::new(constraints);
        self
    }

    pub fn input_type(self, input_type: InputType) -> Self {
        self.configure(|c| c.input_type = input_type)
    }

    pub fn required(self) -> Self {
        self.configure(|c| c.required = true)
    }

    pub fn min_length(self, min: usize) -> Self {
        self.configure(|c| c.min_length = Some(min))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.configure(|c| c.max_length = Some(max))
    }

    /// Require the whole value to match `pattern`.
    pub fn pattern(self, pattern: &str) -> Result<Self, PatternError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| PatternError {
            input: self.name.clone(),
            source,
        })?;
        Ok(self.configure(|c| c.pattern = Some(regex)))
    }

    pub fn min(self, min: f64) -> Self {
        self.configure(|c| c.min = Some(min))
    }

    pub fn max(self, max: f64) -> Self {
        self.configure(|c| c.max = Some(max))
    }

    pub fn step(self, step: f64) -> Self {
        self.configure(|c| c.step = Some(step))
    }

    /// Start with `value`.
    pub fn with_value(self, value: impl Into<String>) -> Self {
        self.set_value(value);
        self
    }

    pub fn set_value(&self, value: impl Into<String>) {
        self.write().value = value.into();
    }

    /// Set a custom error message; an empty message clears it.
    pub fn set_custom_validity(&self, message: impl Into<String>) {
        self.write().custom_validity = message.into();
    }

    fn write(&self) -> RwLockWriteGuard<'_, TextInputState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&TextInputState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    fn number(&self, value: &str) -> Option<f64> {
        if self.constraints.input_type == InputType::Number {
            value.trim().parse::<f64>().ok().filter(|n| n.is_finite())
        } else {
            None
        }
    }
}

impl FieldInput for TextInput {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn value(&self) -> String {
        self.read(|state| state.value.clone())
    }

    fn validity(&self) -> ValidityState {
        let c = &self.constraints;
        let (value, custom) = self.read(|state| (state.value.clone(), state.custom_validity.clone()));
        let mut validity = ValidityState::default();
        let length = value.chars().count();
        let empty = value.is_empty();

        validity.value_missing = c.required && empty;
        validity.too_short = !empty && c.min_length.is_some_and(|min| length < min);
        validity.too_long = c.max_length.is_some_and(|max| length > max);
        validity.pattern_mismatch = !empty
            && c.pattern
                .as_ref()
                .is_some_and(|pattern| !pattern.is_match(&value));
        validity.type_mismatch = !empty
            && c.input_type == InputType::Email
            && !email_address::EmailAddress::is_valid(&value);
        validity.custom_error = !custom.is_empty();

        if c.input_type == InputType::Number && !empty {
            match self.number(&value) {
                None => validity.bad_input = true,
                Some(n) => {
                    validity.range_underflow = c.min.is_some_and(|min| n < min);
                    validity.range_overflow = c.max.is_some_and(|max| n > max);
                    validity.step_mismatch = c.step.is_some_and(|step| {
                        let steps = (n - c.min.unwrap_or(0.0)) / step;
                        step > 0.0 && (steps - steps.round()).abs() > 1e-9
                    });
                }
            }
        }

        validity
    }

    fn validation_message(&self) -> String {
        let Some(violation) = self.validity().first_violation() else {
            return String::new();
        };
        let c = &self.constraints;
        let length = self.read(|state| state.value.chars().count());

        match violation {
            Constraint::ValueMissing => "Please fill out this field.".to_string(),
            Constraint::TooShort => format!(
                "Please lengthen this text to {} characters or more (you are currently using {} characters).",
                c.min_length.unwrap_or_default(),
                length
            ),
            Constraint::TooLong => format!(
                "Please shorten this text to {} characters or less (you are currently using {} characters).",
                c.max_length.unwrap_or_default(),
                length
            ),
            Constraint::PatternMismatch => "Please match the requested format.".to_string(),
            Constraint::RangeUnderflow => format!(
                "Value must be greater than or equal to {}.",
                c.min.unwrap_or_default()
            ),
            Constraint::RangeOverflow => format!(
                "Value must be less than or equal to {}.",
                c.max.unwrap_or_default()
            ),
            Constraint::StepMismatch => "Please enter a valid value.".to_string(),
            Constraint::TypeMismatch => "Please enter an email address.".to_string(),
            Constraint::BadInput => "Please enter a number.".to_string(),
            Constraint::CustomError => self.read(|state| state.custom_validity.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constraint_names_round_trip() {
        for constraint in Constraint::ALL {
            assert_eq!(constraint.as_str().parse::<Constraint>(), Ok(constraint));
        }
        assert!("tooshort".parse::<Constraint>().is_err());
    }

    #[test]
    fn test_required_and_min_length() {
        let input = TextInput::new("username").required().min_length(3);
        assert!(input.validity().value_missing);
        assert!(!input.validity().too_short);
        assert_eq!(input.validation_message(), "Please fill out this field.");

        input.set_value("jo");
        let validity = input.validity();
        assert!(validity.too_short);
        assert_eq!(validity.first_violation(), Some(Constraint::TooShort));

        input.set_value("john");
        assert!(input.validity().is_valid());
        assert_eq!(input.validation_message(), "");
    }

    #[test]
    fn test_pattern_matches_whole_value() {
        let input = TextInput::new("password").pattern(".{5,}").unwrap();
        input.set_value("abcd");
        assert!(input.validity().pattern_mismatch);
        input.set_value("abcde");
        assert!(input.validity().is_valid());

        let input = TextInput::new("code").pattern("[0-9]+").unwrap();
        input.set_value("12a");
        assert!(input.validity().pattern_mismatch);
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let err = TextInput::new("broken").pattern("(").unwrap_err();
        assert_eq!(err.input, "broken");
    }

    #[test]
    fn test_email_type() {
        let input = TextInput::new("email").input_type(InputType::Email);
        input.set_value("not-an-email");
        assert!(input.validity().type_mismatch);
        input.set_value("jo@example.com");
        assert!(input.validity().is_valid());
    }

    #[test]
    fn test_number_range_and_step() {
        let input = TextInput::new("age")
            .input_type(InputType::Number)
            .min(18.0)
            .max(99.0)
            .step(1.0);

        input.set_value("abc");
        assert!(input.validity().bad_input);
        input.set_value("12");
        assert!(input.validity().range_underflow);
        input.set_value("120");
        assert!(input.validity().range_overflow);
        input.set_value("20.5");
        assert!(input.validity().step_mismatch);
        input.set_value("42");
        assert!(input.validity().is_valid());
    }

    #[test]
    fn test_custom_validity() {
        let input = TextInput::new("nickname");
        input.set_custom_validity("Reserved name");
        assert!(input.validity().custom_error);
        assert_eq!(input.validation_message(), "Reserved name");
        input.set_custom_validity("");
        assert!(input.validity().is_valid());
    }

    #[test]
    fn test_writes_survive_poisoned_lock() {
        let input = TextInput::new("username").with_value("jo");
        let shared = input.clone();
        let crashed = std::thread::spawn(move || {
            let _state = shared.state.write().unwrap();
            panic!("writer crashed");
        })
        .join();
        assert!(crashed.is_err());
        assert!(input.state.is_poisoned());

        input.set_value("john");
        input.set_custom_validity("Reserved name");
        assert_eq!(input.value(), "john");
        assert_eq!(input.validation_message(), "Reserved name");
    }
}
