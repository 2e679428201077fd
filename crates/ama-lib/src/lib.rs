use std::collections::HashSet;

use ama_core::{
    AnswerError, AnswerValue, BuildError, QuestionSet, QuestionSpec, Registry, Session,
    SessionError, SessionPolicy, SessionResult,
};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct AskConfig {
    pub questions_json: String,
    pub initial_answers_json: Option<String>,
    /// Also ask questions that already have an initial answer.
    pub ask_all: bool,
    pub policy: SessionPolicy,
    pub max_attempts: usize,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            questions_json: "[]".into(),
            initial_answers_json: None,
            ask_all: false,
            policy: SessionPolicy::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// What the answer provider sees for one question.
#[derive(Clone, Debug, PartialEq)]
pub struct QuestionPrompt {
    pub key: String,
    pub label: String,
    pub help: String,
    pub validator: String,
    pub required: bool,
    /// Current staged value, as substituted into templates.
    pub default: Option<String>,
    /// Rejection of the previous attempt, if any.
    pub error: Option<AnswerError>,
    pub attempt: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// Keep the staged default.
    Accept,
    Answer(AnswerValue),
    Cancel,
}

impl From<&str> for Reply {
    fn from(text: &str) -> Self {
        if text.is_empty() {
            Reply::Accept
        } else {
            Reply::Answer(AnswerValue::from(text))
        }
    }
}

#[derive(Debug, Error)]
pub enum AskError {
    #[error("json parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid question set: {0}")]
    Build(#[from] BuildError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("initial answers must be a JSON object")]
    InitialAnswersShape,
    #[error("session needs interaction")]
    NeedsInteraction,
    #[error("question '{key}' rejected {attempts} answers: {last}")]
    TooManyAttempts {
        key: String,
        attempts: usize,
        #[source]
        last: AnswerError,
    },
    #[error("answer provider failed: {0}")]
    Provider(String),
}

pub type AnswerProvider = dyn FnMut(&QuestionPrompt) -> Result<Reply, AskError>;

/// Drives one session from JSON question records and a reply callback.
pub struct Asker {
    session: Session,
    preset: HashSet<String>,
    ask_all: bool,
    max_attempts: usize,
}

impl Asker {
    pub fn new(config: AskConfig, registry: &Registry) -> Result<Self, AskError> {
        let questions: Vec<QuestionSpec> = serde_json::from_str(&config.questions_json)?;
        let set = QuestionSet::build(questions, registry)?;

        let initial = match config.initial_answers_json {
            Some(raw) => match serde_json::from_str::<Value>(&raw)? {
                Value::Object(map) => map,
                Value::Null => Map::new(),
                _ => return Err(AskError::InitialAnswersShape),
            },
            None => Map::new(),
        };
        let preset = initial.keys().cloned().collect();
        let session = Session::with_initial_answers(
            set,
            config.policy,
            initial
                .into_iter()
                .map(|(key, value)| (key, AnswerValue::from(value))),
        )?;

        Ok(Self {
            session,
            preset,
            ask_all: config.ask_all,
            max_attempts: config.max_attempts.max(1),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Asks every question in definition order, then finalizes.
    pub fn run(self, provider: &mut AnswerProvider) -> Result<SessionResult, AskError> {
        let keys = self
            .session
            .questions()
            .keys()
            .map(str::to_string)
            .collect::<Vec<_>>();

        for key in keys {
            if !self.ask_all && self.preset.contains(&key) {
                debug!(key = %key, "skipping preset answer");
                continue;
            }
            if !self.ask(&key, provider)? {
                return Ok(self.session.cancel()?);
            }
        }
        Ok(self.session.finalize()?)
    }

    /// Accepts every staged default without asking.
    pub fn run_non_interactive(self) -> Result<SessionResult, AskError> {
        match self.session.finalize() {
            Ok(result) if result.valid => Ok(result),
            Ok(_) | Err(SessionError::NotReady { .. }) => Err(AskError::NeedsInteraction),
            Err(err) => Err(err.into()),
        }
    }

    /// Returns `false` when the provider cancels.
    fn ask(&self, key: &str, provider: &mut AnswerProvider) -> Result<bool, AskError> {
        let mut error = None;
        for attempt in 1..=self.max_attempts {
            let prompt = self.prompt(key, error.take(), attempt)?;
            let reply = provider(&prompt)?;
            debug!(key, attempt, ?reply, "reply received");
            let outcome = match reply {
                Reply::Cancel => return Ok(false),
                Reply::Accept if self.current_is_valid(key) => return Ok(true),
                Reply::Accept => self.session.on_answer_changed(key, AnswerValue::Null, false),
                Reply::Answer(value) => self.session.on_answer_changed(key, value, true),
            };
            match outcome {
                Ok(_) => return Ok(true),
                Err(SessionError::Rejected(err)) if !prompt.required && reply_was_blank(&err) => {
                    return Ok(true);
                }
                Err(SessionError::Rejected(err)) => {
                    warn!(key, attempt, error = %err.message, "answer rejected, asking again");
                    error = Some(err);
                }
                Err(other) => return Err(other.into()),
            }
        }
        Err(AskError::TooManyAttempts {
            key: key.to_string(),
            attempts: self.max_attempts,
            last: error.ok_or_else(|| AskError::Provider("no attempt recorded".into()))?,
        })
    }

    fn current_is_valid(&self, key: &str) -> bool {
        self.session
            .answer(key)
            .is_some_and(|answer| answer.is_valid())
    }

    fn prompt(
        &self,
        key: &str,
        error: Option<AnswerError>,
        attempt: usize,
    ) -> Result<QuestionPrompt, AskError> {
        let spec = self
            .session
            .questions()
            .get(key)
            .ok_or_else(|| SessionError::UnknownKey(key.to_string()))?;
        let default = self.session.answer(key).and_then(|answer| {
            answer
                .value()
                .or_else(|| answer.last_good())
                .map(ToString::to_string)
        });
        Ok(QuestionPrompt {
            key: spec.key.clone(),
            label: spec.label.clone(),
            help: spec.help_text.clone(),
            validator: spec.validator_name.clone(),
            required: spec.required,
            default,
            error,
            attempt,
        })
    }
}

/// Optional questions may be left on an invalid empty default.
fn reply_was_blank(err: &AnswerError) -> bool {
    err.raw.is_blank()
}
