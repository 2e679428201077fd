use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use serde_json::Value;

/// Loosely-typed value flowing into and out of validators.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum AnswerValue {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Time(NaiveTime),
    Rgb(u8, u8, u8),
}

impl AnswerValue {
    /// `Null` or empty text; blank input means "use the default".
    pub fn is_blank(&self) -> bool {
        match self {
            AnswerValue::Null => true,
            AnswerValue::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            AnswerValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            AnswerValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AnswerValue::Float(value) => Some(*value),
            AnswerValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AnswerValue::Bool(flag) => Some(*flag),
            _ => None,
        }
    }

    /// Short name of the variant, used in type error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            AnswerValue::Null => "null",
            AnswerValue::Bool(_) => "bool",
            AnswerValue::Int(_) => "int",
            AnswerValue::Float(_) => "float",
            AnswerValue::Text(_) => "text",
            AnswerValue::Date(_) => "date",
            AnswerValue::Time(_) => "time",
            AnswerValue::Rgb(..) => "rgb",
        }
    }

    /// JSON form used by result payloads.
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnswerValue::Null => Ok(()),
            AnswerValue::Bool(flag) => write!(f, "{flag}"),
            AnswerValue::Int(value) => write!(f, "{value}"),
            // Keep a fractional part so the text re-parses as a float.
            AnswerValue::Float(value) if value.is_finite() && value.fract() == 0.0 => {
                write!(f, "{value:.1}")
            }
            AnswerValue::Float(value) => write!(f, "{value}"),
            AnswerValue::Text(text) => f.write_str(text),
            AnswerValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            AnswerValue::Time(time) => write!(f, "{}", time.format("%H:%M:%S")),
            AnswerValue::Rgb(red, green, blue) => write!(f, "{red},{green},{blue}"),
        }
    }
}

impl From<&str> for AnswerValue {
    fn from(value: &str) -> Self {
        AnswerValue::Text(value.to_string())
    }
}

impl From<String> for AnswerValue {
    fn from(value: String) -> Self {
        AnswerValue::Text(value)
    }
}

impl From<bool> for AnswerValue {
    fn from(value: bool) -> Self {
        AnswerValue::Bool(value)
    }
}

impl From<i64> for AnswerValue {
    fn from(value: i64) -> Self {
        AnswerValue::Int(value)
    }
}

impl From<f64> for AnswerValue {
    fn from(value: f64) -> Self {
        AnswerValue::Float(value)
    }
}

impl From<NaiveDate> for AnswerValue {
    fn from(value: NaiveDate) -> Self {
        AnswerValue::Date(value)
    }
}

impl From<NaiveTime> for AnswerValue {
    fn from(value: NaiveTime) -> Self {
        AnswerValue::Time(value)
    }
}

impl From<Value> for AnswerValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => AnswerValue::Null,
            Value::Bool(flag) => AnswerValue::Bool(flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => AnswerValue::Int(int),
                None => AnswerValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(text) => AnswerValue::Text(text),
            Value::Array(items) => rgb_triple(&items)
                .unwrap_or_else(|| AnswerValue::Text(Value::Array(items).to_string())),
            other => AnswerValue::Text(other.to_string()),
        }
    }
}

fn rgb_triple(items: &[Value]) -> Option<AnswerValue> {
    let [red, green, blue] = items else {
        return None;
    };
    let channel = |value: &Value| value.as_u64().and_then(|n| u8::try_from(n).ok());
    Some(AnswerValue::Rgb(
        channel(red)?,
        channel(green)?,
        channel(blue)?,
    ))
}
