use std::sync::Arc;

use chrono::format::{Item, StrftimeItems};
use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use super::{EmailChecker, Registry, ValidationError, Validator, path, validator};
use crate::spec_args::{SpecArgs, SpecError};
use crate::value::AnswerValue;

pub(crate) const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const DEFAULT_TIME_FORMAT: &str = "%H:%M";

const TRUE_WORDS: &[&str] = &["true", "1", "yes", "y"];
const FALSE_WORDS: &[&str] = &["false", "0", "no", "n"];

static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,4}$").expect("email regex")
});

pub(super) fn register_all(registry: &mut Registry) {
    registry.register("nonempty", nonempty);
    registry.register("constant", constant);
    registry.register("oneOf", one_of);
    registry.register("str", string);
    registry.register("password", string);
    registry.register("int", int);
    registry.register("float", float);
    registry.register("number", number);
    registry.register("bool", boolean);
    registry.register("yesno", boolean);
    registry.register("regex", regex);
    registry.register("re", regex);
    registry.register("path", path::factory);
    registry.register("date", date);
    registry.register("time", time);
    registry.register("color", color);
    registry.register("email", |args: &SpecArgs| email(args, None));
}

fn nonempty(_: &SpecArgs) -> Result<Validator, SpecError> {
    Ok(nonempty_validator())
}

fn nonempty_validator() -> Validator {
    validator(|value| {
        if value.is_blank() {
            Err(ValidationError::value_error("Please enter something."))
        } else {
            Ok(value.clone())
        }
    })
}

fn constant(args: &SpecArgs) -> Result<Validator, SpecError> {
    let fixed = args
        .first()
        .ok_or_else(|| SpecError::Unsupported("constant requires a value".into()))?;
    let fixed = AnswerValue::from(fixed);
    Ok(validator(move |_| Ok(fixed.clone())))
}

fn one_of(args: &SpecArgs) -> Result<Validator, SpecError> {
    let choices = args.positional().to_vec();
    if choices.is_empty() {
        return Err(SpecError::Unsupported("oneOf requires at least one choice".into()));
    }
    Ok(validator(move |value| {
        let text = value.to_string();
        if choices.contains(&text) {
            Ok(AnswerValue::Text(text))
        } else {
            Err(ValidationError::value_error(format!(
                "Value must be one of {}",
                choices.join(", ")
            )))
        }
    }))
}

fn string(args: &SpecArgs) -> Result<Validator, SpecError> {
    if args.first() == Some("nonempty") {
        return Ok(nonempty_validator());
    }
    let min = args.parsed::<usize>("min")?;
    let max = args.parsed::<usize>("max")?;
    Ok(validator(move |value| {
        if value.is_blank() {
            return Ok(AnswerValue::Text(String::new()));
        }
        let text = value.to_string();
        let length = text.chars().count();
        if let Some(min) = min
            && length < min
        {
            return Err(ValidationError::value_error(format!(
                "String must be at least {min} characters"
            )));
        }
        if let Some(max) = max
            && length > max
        {
            return Err(ValidationError::value_error(format!(
                "String must be a maximum of {max} characters"
            )));
        }
        Ok(AnswerValue::Text(text))
    }))
}

fn decimal_separator(args: &SpecArgs) -> char {
    args.keyword("decimal")
        .and_then(|raw| raw.chars().next())
        .unwrap_or('.')
}

fn int(args: &SpecArgs) -> Result<Validator, SpecError> {
    let min = args.parsed::<i64>("min")?;
    let max = args.parsed::<i64>("max")?;
    let decimal = decimal_separator(args);
    Ok(validator(move |value| {
        let parsed = match value {
            AnswerValue::Int(int) => *int,
            AnswerValue::Text(text) => {
                let text = text.trim();
                if text.contains(decimal) {
                    return Err(ValidationError::value_error("Invalid integer value"));
                }
                text.parse::<i64>()
                    .map_err(|_| ValidationError::value_error("Invalid integer value"))?
            }
            AnswerValue::Null => {
                return Err(ValidationError::value_error("Invalid integer value"));
            }
            other => {
                return Err(ValidationError::type_error(format!(
                    "Invalid integer value: expected an integer, got {}",
                    other.type_name()
                )));
            }
        };
        if let Some(min) = min
            && parsed < min
        {
            return Err(ValidationError::value_error(format!(
                "Integer value less than minimum {min}"
            )));
        }
        if let Some(max) = max
            && parsed > max
        {
            return Err(ValidationError::value_error(format!(
                "Integer value greater than maximum {max}"
            )));
        }
        Ok(AnswerValue::Int(parsed))
    }))
}

/// Shared numeric parsing for `float` and `number`.
struct FloatRules {
    min: Option<f64>,
    max: Option<f64>,
    decimal: char,
    nocoerce: bool,
    label: &'static str,
}

impl FloatRules {
    fn from_args(args: &SpecArgs, nocoerce: bool, label: &'static str) -> Result<Self, SpecError> {
        Ok(Self {
            min: args.parsed::<f64>("min")?,
            max: args.parsed::<f64>("max")?,
            decimal: decimal_separator(args),
            nocoerce,
            label,
        })
    }

    fn apply(&self, value: &AnswerValue) -> Result<AnswerValue, ValidationError> {
        let invalid = || ValidationError::value_error(format!("Invalid {}", self.label));
        let parsed = match value {
            AnswerValue::Float(float) => *float,
            AnswerValue::Int(_) if self.nocoerce => {
                return Err(ValidationError::type_error(format!(
                    "Invalid {}: expected a fractional value, got int",
                    self.label
                )));
            }
            AnswerValue::Int(int) => *int as f64,
            AnswerValue::Text(text) => {
                let text = text.trim();
                if self.nocoerce && !text.contains(self.decimal) {
                    return Err(invalid());
                }
                let normalized = if self.decimal == '.' {
                    text.to_string()
                } else {
                    text.replace(self.decimal, ".")
                };
                normalized.parse::<f64>().map_err(|_| invalid())?
            }
            AnswerValue::Null => return Err(invalid()),
            other => {
                return Err(ValidationError::type_error(format!(
                    "Invalid {}: expected a number, got {}",
                    self.label,
                    other.type_name()
                )));
            }
        };
        if !parsed.is_finite() {
            return Err(invalid());
        }
        if let Some(min) = self.min
            && parsed < min
        {
            return Err(ValidationError::value_error(format!(
                "Value less than minimum {min}"
            )));
        }
        if let Some(max) = self.max
            && parsed > max
        {
            return Err(ValidationError::value_error(format!(
                "Value greater than maximum {max}"
            )));
        }
        Ok(AnswerValue::Float(parsed))
    }
}

fn float(args: &SpecArgs) -> Result<Validator, SpecError> {
    let rules = FloatRules::from_args(args, args.has_flag("nocoerce"), "floating point value")?;
    Ok(validator(move |value| rules.apply(value)))
}

fn number(args: &SpecArgs) -> Result<Validator, SpecError> {
    let rules = FloatRules::from_args(args, false, "number")?;
    Ok(validator(move |value| rules.apply(value)))
}

fn boolean(_: &SpecArgs) -> Result<Validator, SpecError> {
    Ok(validator(|value| match value {
        AnswerValue::Bool(flag) => Ok(AnswerValue::Bool(*flag)),
        AnswerValue::Int(int) => Ok(AnswerValue::Bool(*int != 0)),
        AnswerValue::Text(text) => {
            let lowered = text.trim().to_lowercase();
            if TRUE_WORDS.contains(&lowered.as_str()) {
                Ok(AnswerValue::Bool(true))
            } else if FALSE_WORDS.contains(&lowered.as_str()) {
                Ok(AnswerValue::Bool(false))
            } else {
                Err(ValidationError::value_error("Invalid boolean value"))
            }
        }
        _ => Err(ValidationError::value_error("Invalid boolean value")),
    }))
}

fn regex(args: &SpecArgs) -> Result<Validator, SpecError> {
    let Some(pattern) = args.first().or_else(|| args.keyword("pattern")) else {
        return string(&SpecArgs::default());
    };
    let anchored = Regex::new(&format!("^(?:{pattern})"))
        .map_err(|err| SpecError::Unsupported(format!("invalid regex '{pattern}': {err}")))?;
    let pattern = pattern.to_string();
    Ok(validator(move |value| {
        let text = value.as_str().ok_or_else(|| {
            ValidationError::type_error(format!(
                "Expected text to match against a regex, got {}",
                value.type_name()
            ))
        })?;
        if anchored.is_match(text) {
            Ok(value.clone())
        } else {
            Err(ValidationError::value_error(format!(
                "Please enter a string which matches the regex {pattern}"
            )))
        }
    }))
}

fn check_format(format: &str) -> Result<(), SpecError> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(SpecError::Unsupported(format!("invalid format '{format}'")));
    }
    Ok(())
}

/// Human form of a strftime pattern, e.g. `%Y-%m-%d` -> `YYYY-MM-DD`.
fn describe_format(format: &str) -> String {
    [
        ("%Y", "YYYY"),
        ("%y", "YY"),
        ("%m", "MM"),
        ("%d", "DD"),
        ("%H", "hh"),
        ("%M", "mm"),
        ("%S", "ss"),
    ]
    .iter()
    .fold(format.to_string(), |acc, (from, to)| acc.replace(from, to))
}

fn date(args: &SpecArgs) -> Result<Validator, SpecError> {
    let format = args.first().unwrap_or(DEFAULT_DATE_FORMAT).to_string();
    check_format(&format)?;
    Ok(validator(move |value| match value {
        AnswerValue::Date(date) => Ok(AnswerValue::Date(*date)),
        _ if value.is_blank() => Ok(AnswerValue::Text(String::new())),
        AnswerValue::Text(text) => parse_date(text.trim(), &format)
            .map(AnswerValue::Date)
            .ok_or_else(|| {
                ValidationError::value_error(format!(
                    "Please enter a valid date in {} format.",
                    describe_format(&format)
                ))
            }),
        other => Err(ValidationError::type_error(format!(
            "Expected a date, got {}",
            other.type_name()
        ))),
    }))
}

/// Dates rendered back into templates are ISO, so accept that form too.
fn parse_date(text: &str, format: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text, format)
        .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
        .ok()
}

fn time(args: &SpecArgs) -> Result<Validator, SpecError> {
    let format = args.first().unwrap_or(DEFAULT_TIME_FORMAT).to_string();
    check_format(&format)?;
    Ok(validator(move |value| match value {
        AnswerValue::Time(time) => Ok(AnswerValue::Time(*time)),
        _ if value.is_blank() => Ok(AnswerValue::Text(String::new())),
        AnswerValue::Text(text) => parse_time(text.trim(), &format)
            .map(AnswerValue::Time)
            .ok_or_else(|| {
                ValidationError::value_error(format!(
                    "Please enter a valid time in {} format.",
                    describe_format(&format)
                ))
            }),
        other => Err(ValidationError::type_error(format!(
            "Expected a time, got {}",
            other.type_name()
        ))),
    }))
}

/// Times rendered back into templates carry seconds, so accept that form too.
fn parse_time(text: &str, format: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, format)
        .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S"))
        .ok()
}

fn color(args: &SpecArgs) -> Result<Validator, SpecError> {
    match args.first().unwrap_or("rgbhex") {
        "rgbhex" => Ok(validator(rgb_hex)),
        "rgb" => Ok(validator(rgb_triple)),
        other => Err(SpecError::Unsupported(format!(
            "unknown color format '{other}'"
        ))),
    }
}

fn rgb_hex(value: &AnswerValue) -> Result<AnswerValue, ValidationError> {
    let text = value.as_str().ok_or_else(|| {
        ValidationError::type_error(format!(
            "Expected an RGB hex string, got {}",
            value.type_name()
        ))
    })?;
    let valid = text
        .strip_prefix('#')
        .filter(|digits| matches!(digits.len(), 3 | 6))
        .is_some_and(|digits| digits.chars().all(|ch| ch.is_ascii_hexdigit()));
    if valid {
        Ok(value.clone())
    } else {
        Err(ValidationError::value_error("Invalid RGB hex value"))
    }
}

fn rgb_triple(value: &AnswerValue) -> Result<AnswerValue, ValidationError> {
    let invalid = || ValidationError::value_error("Please enter a color as rgb(r,g,b) or r,g,b");
    let text = match value {
        AnswerValue::Rgb(..) => return Ok(value.clone()),
        AnswerValue::Text(text) => text.trim(),
        other => {
            return Err(ValidationError::type_error(format!(
                "Expected an rgb color, got {}",
                other.type_name()
            )));
        }
    };
    let inner = match text.strip_prefix("rgb(") {
        Some(rest) => rest.strip_suffix(')').ok_or_else(invalid)?,
        None => text,
    };
    let channels = inner
        .split(',')
        .map(|part| part.trim().parse::<u8>().map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()?;
    match channels.as_slice() {
        [red, green, blue] => Ok(AnswerValue::Rgb(*red, *green, *blue)),
        _ => Err(invalid()),
    }
}

pub(super) fn email(
    args: &SpecArgs,
    checker: Option<Arc<dyn EmailChecker>>,
) -> Result<Validator, SpecError> {
    let checker = checker.filter(|_| !args.has_flag("re"));
    Ok(validator(move |value| {
        let text = value.as_str().ok_or_else(|| {
            ValidationError::type_error(format!(
                "Expected an email address, got {}",
                value.type_name()
            ))
        })?;
        let valid = match &checker {
            Some(checker) => checker.is_email(text),
            None => EMAIL.is_match(text),
        };
        if valid {
            Ok(value.clone())
        } else {
            Err(ValidationError::value_error("Invalid email address"))
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describes_formats_for_humans() {
        assert_eq!(describe_format("%Y-%m-%d"), "YYYY-MM-DD");
        assert_eq!(describe_format("%H:%M"), "hh:mm");
    }

    #[test]
    fn rejects_bad_strftime_patterns() {
        assert!(check_format("%Y-%m-%d").is_ok());
        assert!(check_format("%Q").is_err());
    }
}
