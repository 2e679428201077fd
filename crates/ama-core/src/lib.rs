#![allow(missing_docs)]

pub mod answer;
pub mod question;
pub mod session;
pub mod spec_args;
pub mod template;
pub mod validator;
pub mod value;

pub use answer::{Answer, EditState};
pub use question::{BuildError, DependencyGraph, QuestionSet, QuestionSpec, question_schema};
pub use session::{
    AnswerError, ChangeOutcome, ResultStatus, Session, SessionError, SessionPhase, SessionPolicy,
    SessionResult, StagedChange,
};
pub use spec_args::{SpecArgs, SpecError};
pub use template::{Template, TemplateError, dependencies};
pub use validator::{
    EmailChecker, ErrorKind, PluginLoader, Registry, RegistryError, ValidationError, Validator,
    ValidatorFactory, is_plugin_reference, validator,
};
pub use value::AnswerValue;
