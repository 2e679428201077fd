use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use ama_core::{AnswerValue, Registry, ResultStatus, SessionError, SessionPolicy};
use ama_lib::{AskConfig, AskError, Asker, QuestionPrompt, Reply};
use serde_json::json;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn config(questions: serde_json::Value) -> AskConfig {
    init_tracing();
    AskConfig {
        questions_json: questions.to_string(),
        ..AskConfig::default()
    }
}

fn greeting_questions() -> serde_json::Value {
    json!([
        {"key": "name", "label": "Name", "validator": "str", "spec": "nonempty"},
        {"key": "port", "label": "Port", "validator": "int", "spec": "min=1|max=65535", "default": "8080"},
        {"key": "greeting", "label": "Greeting", "help": "Shown on login", "validator": "str", "default": "Hello {name}"}
    ])
}

/// Replies from a script and records every prompt it was shown.
fn scripted(
    replies: Vec<Reply>,
) -> (
    impl FnMut(&QuestionPrompt) -> Result<Reply, AskError>,
    Rc<RefCell<Vec<QuestionPrompt>>>,
) {
    let prompts = Rc::new(RefCell::new(Vec::new()));
    let seen = Rc::clone(&prompts);
    let mut replies = VecDeque::from(replies);
    let provider = move |prompt: &QuestionPrompt| {
        seen.borrow_mut().push(prompt.clone());
        replies
            .pop_front()
            .ok_or_else(|| AskError::Provider(format!("no reply scripted for {}", prompt.key)))
    };
    (provider, prompts)
}

#[test]
fn asks_in_definition_order_with_live_defaults() {
    let asker = Asker::new(config(greeting_questions()), &Registry::with_builtins()).expect("asker");
    let (mut provider, prompts) = scripted(vec![Reply::from("Ada"), Reply::Accept, Reply::Accept]);

    let result = asker.run(&mut provider).expect("run");
    assert_eq!(result.status, ResultStatus::Ok);
    assert!(result.valid);
    assert_eq!(result.answers["name"], AnswerValue::from("Ada"));
    assert_eq!(result.answers["port"], AnswerValue::Int(8080));
    assert_eq!(result.answers["greeting"], AnswerValue::from("Hello Ada"));

    let prompts = prompts.borrow();
    let keys = prompts.iter().map(|p| p.key.as_str()).collect::<Vec<_>>();
    assert_eq!(keys, vec!["name", "port", "greeting"]);
    assert_eq!(prompts[1].default.as_deref(), Some("8080"));
    assert_eq!(prompts[2].default.as_deref(), Some("Hello Ada"));
    assert_eq!(prompts[2].help, "Shown on login");
}

#[test]
fn rejected_answers_are_asked_again_with_the_error() {
    let asker = Asker::new(config(greeting_questions()), &Registry::with_builtins()).expect("asker");
    let (mut provider, prompts) = scripted(vec![
        Reply::from("Ada"),
        Reply::from("99999"),
        Reply::Answer(AnswerValue::Int(443)),
        Reply::Accept,
    ]);

    let result = asker.run(&mut provider).expect("run");
    assert_eq!(result.answers["port"], AnswerValue::Int(443));

    let prompts = prompts.borrow();
    assert_eq!(prompts[2].key, "port");
    assert_eq!(prompts[2].attempt, 2);
    let error = prompts[2].error.as_ref().expect("error attached");
    assert_eq!(error.raw, AnswerValue::from("99999"));
}

#[test]
fn gives_up_after_max_attempts() {
    let mut cfg = config(greeting_questions());
    cfg.max_attempts = 2;
    let asker = Asker::new(cfg, &Registry::with_builtins()).expect("asker");
    let (mut provider, _) = scripted(vec![Reply::Accept, Reply::Accept]);

    let err = asker.run(&mut provider).expect_err("name is required");
    assert!(matches!(
        err,
        AskError::TooManyAttempts { ref key, attempts: 2, .. } if key == "name"
    ));
}

#[test]
fn cancel_reply_cancels_the_session() {
    let asker = Asker::new(config(greeting_questions()), &Registry::with_builtins()).expect("asker");
    let (mut provider, _) = scripted(vec![Reply::from("Ada"), Reply::Cancel]);
    let result = asker.run(&mut provider).expect("run");
    assert_eq!(result.status, ResultStatus::Cancel);
    assert!(result.answers.is_empty());
    assert!(!result.valid);
}

#[test]
fn initial_answers_are_skipped_unless_ask_all() {
    let mut cfg = config(greeting_questions());
    cfg.initial_answers_json = Some(json!({"name": "Grace", "port": 22}).to_string());
    let asker = Asker::new(cfg.clone(), &Registry::with_builtins()).expect("asker");
    let (mut provider, prompts) = scripted(vec![Reply::Accept]);
    let result = asker.run(&mut provider).expect("run");
    assert_eq!(result.answers["greeting"], AnswerValue::from("Hello Grace"));
    assert_eq!(result.answers["port"], AnswerValue::Int(22));
    assert_eq!(prompts.borrow().len(), 1);

    cfg.ask_all = true;
    let asker = Asker::new(cfg, &Registry::with_builtins()).expect("asker");
    let (mut provider, prompts) = scripted(vec![Reply::Accept, Reply::Accept, Reply::Accept]);
    asker.run(&mut provider).expect("run");
    let prompts = prompts.borrow();
    assert_eq!(prompts.len(), 3);
    assert_eq!(prompts[0].default.as_deref(), Some("Grace"));
}

#[test]
fn non_interactive_needs_valid_defaults() {
    let asker = Asker::new(config(greeting_questions()), &Registry::with_builtins()).expect("asker");
    assert!(matches!(
        asker.run_non_interactive(),
        Err(AskError::NeedsInteraction)
    ));

    let mut cfg = config(greeting_questions());
    cfg.initial_answers_json = Some(json!({"name": "Ada"}).to_string());
    let result = Asker::new(cfg, &Registry::with_builtins())
        .expect("asker")
        .run_non_interactive()
        .expect("all defaults valid");
    assert_eq!(result.answers["greeting"], AnswerValue::from("Hello Ada"));

    let pretty = result.to_json_pretty().expect("json");
    let parsed: serde_json::Value = serde_json::from_str(&pretty).expect("parse");
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["answers"]["port"], 8080);
}

#[test]
fn allow_invalid_policy_is_read_from_config() {
    let cfg: AskConfig = serde_json::from_value(json!({
        "questions_json": greeting_questions().to_string(),
        "policy": {"allow_invalid": true}
    }))
    .expect("config");
    assert_eq!(cfg.max_attempts, 3);
    assert_eq!(cfg.policy, SessionPolicy { allow_invalid: true });

    let asker = Asker::new(cfg, &Registry::with_builtins()).expect("asker");
    let (mut provider, _) = scripted(vec![Reply::Cancel]);
    assert_eq!(asker.run(&mut provider).expect("run").status, ResultStatus::Cancel);
}

#[test]
fn definition_errors_surface_from_new() {
    let err = Asker::new(
        config(json!([{"key": "a", "validator": "str", "default": "{missing}"}])),
        &Registry::with_builtins(),
    )
    .err()
    .expect("unknown dependency");
    assert!(matches!(err, AskError::Build(_)));

    let err = Asker::new(config(json!({"not": "a list"})), &Registry::with_builtins())
        .err()
        .expect("bad json shape");
    assert!(matches!(err, AskError::Json(_)));

    let mut cfg = config(greeting_questions());
    cfg.initial_answers_json = Some(json!({"unknown": 1}).to_string());
    let err = Asker::new(cfg, &Registry::with_builtins())
        .err()
        .expect("unknown initial key");
    assert!(matches!(
        err,
        AskError::Session(SessionError::UnknownKey(ref key)) if key == "unknown"
    ));
}
