use ama_core::{BuildError, QuestionSet, QuestionSpec, Registry, RegistryError, question_schema};
use serde_json::json;

fn build(questions: Vec<QuestionSpec>) -> Result<QuestionSet, BuildError> {
    QuestionSet::build(questions, &Registry::with_builtins())
}

#[test]
fn records_forward_and_inverse_edges_in_definition_order() {
    let set = build(vec![
        QuestionSpec::new("first", "str"),
        QuestionSpec::new("last", "str"),
        QuestionSpec::new("full", "str").with_default("{last}, {first}"),
        QuestionSpec::new("greeting", "str").with_default("Hello {first} ({full})"),
    ])
    .expect("build");

    assert_eq!(set.depends_on("full"), vec!["first", "last"]);
    assert_eq!(set.depends_on("greeting"), vec!["first", "full"]);
    assert_eq!(set.depended_on_by("first"), vec!["full", "greeting"]);
    assert_eq!(set.depended_on_by("full"), vec!["greeting"]);
    assert!(set.depended_on_by("greeting").is_empty());
    assert_eq!(set.keys().collect::<Vec<_>>(), vec!["first", "last", "full", "greeting"]);
    assert_eq!(set.position("full"), Some(2));
    assert!(set.validator("full").is_some());
    assert!(set.get("missing").is_none());
}

#[test]
fn inverse_index_is_the_transpose() {
    let set = build(vec![
        QuestionSpec::new("a", "str").with_default("{c}"),
        QuestionSpec::new("b", "str").with_default("{a}{c}"),
        QuestionSpec::new("c", "str").with_default("{b}"),
    ])
    .expect("build");

    for from in set.keys() {
        for to in set.depends_on(from) {
            assert!(set.depended_on_by(to).contains(&from));
        }
        for by in set.depended_on_by(from) {
            assert!(set.depends_on(by).contains(&from));
        }
    }
}

#[test]
fn cycles_are_accepted() {
    let set = build(vec![
        QuestionSpec::new("a", "str").with_default("{b}"),
        QuestionSpec::new("b", "str").with_default("{a}"),
    ])
    .expect("cycles are legal");
    assert!(set.graph().in_cycle(0));
}

#[test]
fn unknown_dependency_is_rejected() {
    let err = build(vec![QuestionSpec::new("greeting", "str").with_default("Hello {name}")])
        .expect_err("unknown reference");
    assert_eq!(
        err,
        BuildError::UnknownDependency {
            key: "greeting".into(),
            dependency: "name".into(),
        }
    );
}

#[test]
fn definition_errors() {
    assert_eq!(
        build(vec![QuestionSpec::new("a", "str"), QuestionSpec::new("a", "int")])
            .expect_err("duplicate"),
        BuildError::DuplicateKey("a".into())
    );
    assert!(matches!(
        build(vec![QuestionSpec::new("a", "str").with_default("{oops")]),
        Err(BuildError::InvalidTemplate { key, .. }) if key == "a"
    ));
    assert!(matches!(
        build(vec![QuestionSpec::new("a", "postcode")]),
        Err(BuildError::Validator {
            source: RegistryError::UnknownValidator(_),
            ..
        })
    ));
    assert!(matches!(
        build(vec![QuestionSpec::new("a", "int").with_spec("max=ten")]),
        Err(BuildError::Validator {
            source: RegistryError::InvalidSpec { .. },
            ..
        })
    ));
}

#[test]
fn deserializes_question_records() {
    let questions: Vec<QuestionSpec> = serde_json::from_value(json!([
        {"key": "name", "label": "Your name", "validator": "str"},
        {
            "key": "port",
            "label": "Port",
            "help": "TCP port to listen on",
            "validator": "int",
            "spec": "min=1|max=65535",
            "default": "8080",
            "required": false
        }
    ]))
    .expect("records");

    assert_eq!(questions[0].help_text, "");
    assert!(questions[0].required);
    assert_eq!(questions[1].validator_spec.as_deref(), Some("min=1|max=65535"));
    assert_eq!(questions[1].default_template.as_deref(), Some("8080"));
    assert!(!questions[1].required);
    assert!(build(questions).is_ok());
}

#[test]
fn minimal_records_default_to_text_answers() {
    let questions: Vec<QuestionSpec> =
        serde_json::from_value(json!([{"key": "motd", "label": "Message of the day"}]))
            .expect("minimal record");
    assert_eq!(questions[0].validator_name, "str");
    assert_eq!(questions[0].validator_spec, None);
    assert!(questions[0].required);
    let set = build(questions).expect("set");
    assert!(set.validator("motd").is_some());
}

#[test]
fn schema_describes_question_records() {
    let schema = serde_json::to_value(question_schema()).expect("schema json");
    assert_eq!(schema["type"], "array");
    let text = schema.to_string();
    for field in ["key", "validator", "spec", "default", "required"] {
        assert!(text.contains(&format!("\"{field}\"")), "missing {field}");
    }
}
