//! Answer propagation engine.
//!
//! A [`Session`] owns the answers for one [`QuestionSet`]. Every write goes
//! through [`Session::on_answer_changed`] (or [`Session::clear`]), which
//! validates the input and then walks `depended_on_by` breadth-first,
//! recomputing the defaults of unedited dependents. Each key is visited at
//! most once per pass, so cyclic templates terminate.
//!
//! Methods take `&self`; a pass holds a coarse guard while it runs and while
//! listeners are notified, so a listener that calls back into the session gets
//! [`SessionError::ReentrantUpdate`].

use std::cell::{Cell, RefCell};
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::answer::Answer;
use crate::question::QuestionSet;
use crate::validator::{ErrorKind, ValidationError};
use crate::value::AnswerValue;

/// Session-level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
    /// Commit even when required answers are invalid.
    pub allow_invalid: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Collecting,
    Finalizing,
    Committed,
    Cancelled,
}

impl SessionPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Committed | SessionPhase::Cancelled)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Collecting => "collecting",
            SessionPhase::Finalizing => "finalizing",
            SessionPhase::Committed => "committed",
            SessionPhase::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A rejected answer, with enough context to render a message.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("question '{key}' rejected '{raw}' ({validator}): {kind}: {message}")]
pub struct AnswerError {
    pub key: String,
    pub raw: AnswerValue,
    pub validator: String,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("unknown question '{0}'")]
    UnknownKey(String),
    #[error(transparent)]
    Rejected(AnswerError),
    #[error("answer changed while a propagation pass was running")]
    ReentrantUpdate,
    #[error("session is not ready: {} required answer(s) invalid", .errors.len())]
    NotReady { errors: Vec<AnswerError> },
    #[error("session is {0}")]
    Closed(SessionPhase),
}

/// Notification for one value written by the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    pub key: String,
    pub value: Option<AnswerValue>,
    pub valid: bool,
    pub error: Option<ValidationError>,
}

impl StagedChange {
    fn new(key: &str, answer: &Answer) -> Self {
        Self {
            key: key.to_string(),
            value: answer.value().cloned(),
            valid: answer.is_valid(),
            error: answer.error().cloned(),
        }
    }
}

/// Result of one accepted change: the key written plus every staged dependent,
/// in notification order.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeOutcome {
    pub key: String,
    pub staged: Vec<StagedChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Cancel,
}

/// Final session output; invalid answers are reported as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionResult {
    pub status: ResultStatus,
    pub answers: IndexMap<String, AnswerValue>,
    pub valid: bool,
}

impl SessionResult {
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "status": self.status,
            "answers": self
                .answers
                .iter()
                .map(|(key, value)| (key.clone(), value.to_json()))
                .collect::<serde_json::Map<_, _>>(),
            "valid": self.valid,
        })
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

type Listener = Box<dyn FnMut(&StagedChange)>;

struct State {
    phase: SessionPhase,
    answers: Vec<Answer>,
}

pub struct Session {
    questions: QuestionSet,
    policy: SessionPolicy,
    state: RefCell<State>,
    propagating: Cell<bool>,
    listeners: RefCell<Vec<Listener>>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("questions", &self.questions)
            .field("policy", &self.policy)
            .field("phase", &self.phase())
            .field("propagating", &self.propagating.get())
            .finish()
    }
}

struct PassGuard<'a>(&'a Cell<bool>);

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Session {
    /// Starts a session with every answer tracking its template default.
    pub fn new(questions: QuestionSet, policy: SessionPolicy) -> Self {
        let mut answers = vec![Answer::default(); questions.len()];
        for idx in questions.graph().evaluation_order() {
            let input = render_default(&questions, &answers, idx);
            let _ = evaluate(&questions, &mut answers[idx], idx, input);
        }
        debug!(questions = questions.len(), "session started");
        Self {
            questions,
            policy,
            state: RefCell::new(State {
                phase: SessionPhase::Collecting,
                answers,
            }),
            propagating: Cell::new(false),
            listeners: RefCell::new(Vec::new()),
        }
    }

    /// Starts a session and applies already-known answers as user edits, in
    /// definition order. Rejected initial answers stay recorded as invalid.
    pub fn with_initial_answers<I, K, V>(
        questions: QuestionSet,
        policy: SessionPolicy,
        initial: I,
    ) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<AnswerValue>,
    {
        let session = Self::new(questions, policy);
        let mut known = Vec::new();
        for (key, value) in initial {
            let key = key.as_ref();
            let idx = session
                .questions
                .position(key)
                .ok_or_else(|| SessionError::UnknownKey(key.to_string()))?;
            known.push((idx, value.into()));
        }
        known.sort_by_key(|(idx, _)| *idx);

        {
            let mut state = session.state.borrow_mut();
            for (idx, raw) in known {
                if let Err(err) = apply(&session.questions, &mut state.answers, idx, raw, true) {
                    warn!(key = %err.key, error = %err, "initial answer rejected");
                }
            }
        }
        Ok(session)
    }

    pub fn questions(&self) -> &QuestionSet {
        &self.questions
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.borrow().phase
    }

    /// Snapshot of one answer.
    pub fn answer(&self, key: &str) -> Option<Answer> {
        let idx = self.questions.position(key)?;
        self.state.borrow().answers.get(idx).cloned()
    }

    /// Snapshot of every answer in definition order.
    pub fn answers(&self) -> Vec<(String, Answer)> {
        let state = self.state.borrow();
        self.questions
            .keys()
            .zip(state.answers.iter())
            .map(|(key, answer)| (key.to_string(), answer.clone()))
            .collect()
    }

    /// Registers a callback for every staged change, run after each pass.
    pub fn subscribe(&self, listener: impl FnMut(&StagedChange) + 'static) {
        self.listeners.borrow_mut().push(Box::new(listener));
    }

    /// Validates `raw` for `key` and propagates to unedited dependents.
    ///
    /// Blank input re-renders the current default; the edit flag only moves
    /// to `Edited` for non-blank input with `edited` set.
    pub fn on_answer_changed(
        &self,
        key: &str,
        raw: impl Into<AnswerValue>,
        edited: bool,
    ) -> Result<ChangeOutcome, SessionError> {
        let _guard = self.begin_pass()?;
        let idx = self.collecting_index(key)?;
        let staged = {
            let mut state = self.state.borrow_mut();
            apply(&self.questions, &mut state.answers, idx, raw.into(), edited)
                .map_err(SessionError::Rejected)?
        };
        self.notify(&staged);
        Ok(ChangeOutcome {
            key: key.to_string(),
            staged,
        })
    }

    /// Returns `key` to default tracking and propagates the recomputed value.
    pub fn clear(&self, key: &str) -> Result<ChangeOutcome, SessionError> {
        let _guard = self.begin_pass()?;
        let idx = self.collecting_index(key)?;
        let staged = {
            let mut state = self.state.borrow_mut();
            let answers = &mut state.answers;
            answers[idx].reset();
            let input = render_default(&self.questions, answers, idx);
            let outcome = evaluate(&self.questions, &mut answers[idx], idx, input);
            debug!(key, valid = outcome.is_ok(), "cleared answer");
            let mut staged = vec![StagedChange::new(key, &answers[idx])];
            if outcome.is_ok() {
                staged.extend(propagate(&self.questions, answers, idx));
            }
            staged
        };
        self.notify(&staged);
        Ok(ChangeOutcome {
            key: key.to_string(),
            staged,
        })
    }

    /// Recomputes unedited defaults, validates every answer and commits.
    ///
    /// With invalid required answers and `allow_invalid` unset, the session
    /// returns to `Collecting` and reports the failures. Invalid optional
    /// answers commit as `null` and clear the result's `valid` flag.
    pub fn finalize(&self) -> Result<SessionResult, SessionError> {
        let _guard = self.begin_pass()?;
        let mut borrowed = self.state.borrow_mut();
        let state = &mut *borrowed;
        if state.phase != SessionPhase::Collecting {
            return Err(SessionError::Closed(state.phase));
        }
        state.phase = SessionPhase::Finalizing;

        let questions = &self.questions;
        let answers = &mut state.answers;
        for idx in questions.graph().evaluation_order() {
            let input = if answers[idx].is_edited() {
                answers[idx].raw().clone()
            } else {
                render_default(questions, answers, idx)
            };
            let _ = evaluate(questions, &mut answers[idx], idx, input);
        }

        let errors = questions
            .iter()
            .zip(answers.iter())
            .filter(|(spec, answer)| spec.required && !answer.is_valid())
            .map(|(spec, answer)| answer_error(questions, spec.key.as_str(), answer))
            .collect::<Vec<_>>();
        if !errors.is_empty() && !self.policy.allow_invalid {
            state.phase = SessionPhase::Collecting;
            warn!(invalid = errors.len(), "finalize refused");
            return Err(SessionError::NotReady { errors });
        }

        let valid = answers.iter().all(Answer::is_valid);
        let result = SessionResult {
            status: ResultStatus::Ok,
            answers: questions
                .keys()
                .zip(answers.iter())
                .map(|(key, answer)| {
                    let value = answer.value().cloned().unwrap_or_default();
                    (key.to_string(), value)
                })
                .collect(),
            valid,
        };
        state.phase = SessionPhase::Committed;
        debug!(valid = result.valid, "session committed");
        Ok(result)
    }

    /// Aborts the session and discards its answers.
    pub fn cancel(&self) -> Result<SessionResult, SessionError> {
        let mut state = self.state.borrow_mut();
        if state.phase.is_terminal() {
            return Err(SessionError::Closed(state.phase));
        }
        state.phase = SessionPhase::Cancelled;
        state.answers.clear();
        debug!("session cancelled");
        Ok(SessionResult {
            status: ResultStatus::Cancel,
            answers: IndexMap::new(),
            valid: false,
        })
    }

    fn begin_pass(&self) -> Result<PassGuard<'_>, SessionError> {
        if self.propagating.replace(true) {
            return Err(SessionError::ReentrantUpdate);
        }
        Ok(PassGuard(&self.propagating))
    }

    fn collecting_index(&self, key: &str) -> Result<usize, SessionError> {
        let phase = self.phase();
        if phase != SessionPhase::Collecting {
            return Err(SessionError::Closed(phase));
        }
        self.questions
            .position(key)
            .ok_or_else(|| SessionError::UnknownKey(key.to_string()))
    }

    fn notify(&self, staged: &[StagedChange]) {
        if staged.is_empty() {
            return;
        }
        let mut listeners = std::mem::take(&mut *self.listeners.borrow_mut());
        for change in staged {
            for listener in listeners.iter_mut() {
                listener(change);
            }
        }
        let mut slot = self.listeners.borrow_mut();
        listeners.append(&mut slot);
        *slot = listeners;
    }
}

/// Writes `raw` to `idx` and, when valid, propagates to dependents.
fn apply(
    questions: &QuestionSet,
    answers: &mut [Answer],
    idx: usize,
    raw: AnswerValue,
    edited: bool,
) -> Result<Vec<StagedChange>, AnswerError> {
    let key = questions.entry(idx).spec.key.as_str();
    let input = if raw.is_blank() {
        render_default(questions, answers, idx)
    } else {
        if edited {
            answers[idx].mark_edited();
        }
        raw
    };

    if evaluate(questions, &mut answers[idx], idx, input).is_err() {
        let err = answer_error(questions, key, &answers[idx]);
        warn!(key, validator = %err.validator, error = %err.message, "answer rejected");
        return Err(err);
    }
    debug!(key, edited = answers[idx].is_edited(), "answer accepted");
    Ok(propagate(questions, answers, idx))
}

/// Breadth-first recomputation of unedited dependents of `start`. Each depth is
/// processed in definition order and every key is visited at most once.
fn propagate(questions: &QuestionSet, answers: &mut [Answer], start: usize) -> Vec<StagedChange> {
    let graph = questions.graph();
    let mut visited = vec![false; answers.len()];
    visited[start] = true;
    let mut frontier = vec![start];
    let mut staged = Vec::new();
    let mut depth = 0usize;

    while !frontier.is_empty() {
        depth += 1;
        let mut level = frontier
            .iter()
            .flat_map(|&idx| graph.depended_on_by(idx).iter().copied())
            .filter(|&dependent| !visited[dependent])
            .collect::<Vec<_>>();
        level.sort_unstable();
        level.dedup();

        frontier = Vec::with_capacity(level.len());
        for dependent in level {
            visited[dependent] = true;
            let key = questions.entry(dependent).spec.key.as_str();
            if answers[dependent].is_edited() {
                trace!(key, depth, "skipping edited dependent");
                continue;
            }
            let input = render_default(questions, answers, dependent);
            let outcome = evaluate(questions, &mut answers[dependent], dependent, input);
            debug!(key, depth, valid = outcome.is_ok(), "recomputed default");
            staged.push(StagedChange::new(key, &answers[dependent]));
            if outcome.is_ok() {
                frontier.push(dependent);
            }
        }
    }
    staged
}

/// Renders `idx`'s default from the current answers. A placeholder takes the
/// source's valid value, else its last good value, else stays verbatim.
fn render_default(questions: &QuestionSet, answers: &[Answer], idx: usize) -> AnswerValue {
    let rendered = questions.entry(idx).template.render(|name| {
        let source = &answers[questions.position(name)?];
        source
            .value()
            .or_else(|| source.last_good())
            .map(ToString::to_string)
    });
    AnswerValue::Text(rendered)
}

fn evaluate(
    questions: &QuestionSet,
    answer: &mut Answer,
    idx: usize,
    input: AnswerValue,
) -> Result<AnswerValue, ValidationError> {
    let outcome = (questions.entry(idx).validator)(&input);
    answer.record(input, &outcome);
    outcome
}

fn answer_error(questions: &QuestionSet, key: &str, answer: &Answer) -> AnswerError {
    let (kind, message) = answer
        .error()
        .map(|err| (err.kind, err.message.clone()))
        .unwrap_or((ErrorKind::Value, "invalid answer".to_string()));
    AnswerError {
        key: key.to_string(),
        raw: answer.raw().clone(),
        validator: questions
            .get(key)
            .map(|spec| spec.validator_name.clone())
            .unwrap_or_default(),
        kind,
        message,
    }
}
