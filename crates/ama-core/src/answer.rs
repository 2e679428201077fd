use serde::Serialize;

use crate::validator::ValidationError;
use crate::value::AnswerValue;

/// Whether the user has supplied their own value for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EditState {
    /// The answer tracks its live default.
    #[default]
    Unedited,
    /// The user supplied input; propagation leaves the answer alone.
    Edited,
}

/// Current state of one question in a session.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Answer {
    raw: AnswerValue,
    value: Option<AnswerValue>,
    last_good: Option<AnswerValue>,
    error: Option<ValidationError>,
    edit: EditState,
}

impl Answer {
    /// The input last fed to the validator: user text, or the rendered default.
    pub fn raw(&self) -> &AnswerValue {
        &self.raw
    }

    /// The validated value; `None` while invalid.
    pub fn value(&self) -> Option<&AnswerValue> {
        self.value.as_ref()
    }

    /// Most recent valid value, kept across later rejections.
    pub fn last_good(&self) -> Option<&AnswerValue> {
        self.last_good.as_ref()
    }

    pub fn error(&self) -> Option<&ValidationError> {
        self.error.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.value.is_some()
    }

    pub fn edit_state(&self) -> EditState {
        self.edit
    }

    pub fn is_edited(&self) -> bool {
        self.edit == EditState::Edited
    }

    /// Records a validator outcome for `raw`.
    pub(crate) fn record(&mut self, raw: AnswerValue, outcome: &Result<AnswerValue, ValidationError>) {
        self.raw = raw;
        match outcome {
            Ok(value) => {
                self.value = Some(value.clone());
                self.last_good = Some(value.clone());
                self.error = None;
            }
            Err(err) => {
                self.value = None;
                self.error = Some(err.clone());
            }
        }
    }

    /// The only transition into `Edited`; there is none back except `reset`.
    pub(crate) fn mark_edited(&mut self) {
        self.edit = EditState::Edited;
    }

    /// Returns the answer to default tracking, used by the explicit clear action.
    pub(crate) fn reset(&mut self) {
        self.edit = EditState::Unedited;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::ErrorKind;

    #[test]
    fn rejection_keeps_last_good_value() {
        let mut answer = Answer::default();
        answer.record(AnswerValue::from("4"), &Ok(AnswerValue::Int(4)));
        answer.record(
            AnswerValue::from("x"),
            &Err(ValidationError::value_error("not a number")),
        );
        assert!(!answer.is_valid());
        assert_eq!(answer.last_good(), Some(&AnswerValue::Int(4)));
        assert_eq!(answer.raw(), &AnswerValue::from("x"));
        assert_eq!(answer.error().map(|e| e.kind), Some(ErrorKind::Value));
    }

    #[test]
    fn edit_state_is_one_way_until_reset() {
        let mut answer = Answer::default();
        assert_eq!(answer.edit_state(), EditState::Unedited);
        answer.mark_edited();
        answer.record(AnswerValue::from("a"), &Ok(AnswerValue::from("a")));
        assert!(answer.is_edited());
        answer.reset();
        assert!(!answer.is_edited());
    }
}
