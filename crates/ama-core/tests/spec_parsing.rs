use ama_core::{SpecArgs, TemplateError, dependencies};
use proptest::prelude::*;

#[test]
fn splits_positional_and_keywords() {
    let args = SpecArgs::parse(Some("existing|min=3|max=6")).expect("parse");
    assert_eq!(args.positional(), ["existing".to_string()]);
    assert_eq!(
        args.keywords().collect::<Vec<_>>(),
        vec![("min", "3"), ("max", "6")]
    );
    assert!(args.has_flag("existing"));
    assert!(args.has_flag("min"));
    assert!(!args.has_flag("max=6"));
}

#[test]
fn quoted_tokens_keep_the_delimiter() {
    let args = SpecArgs::parse(Some(r#""a|b"|"pattern=x|y""#)).expect("parse");
    assert_eq!(args.first(), Some("a|b"));
    assert_eq!(args.keyword("pattern"), Some("x|y"));
}

#[test]
fn commas_are_not_delimiters() {
    let args = SpecArgs::parse(Some("+*.py,-*.tmp")).expect("parse");
    assert_eq!(args.positional(), ["+*.py,-*.tmp".to_string()]);
}

#[test]
fn newlines_separate_tokens_and_empty_tokens_drop() {
    let args = SpecArgs::parse(Some("nonempty||\nmin=1")).expect("parse");
    assert_eq!(args.positional(), ["nonempty".to_string()]);
    assert_eq!(args.keyword("min"), Some("1"));
}

#[test]
fn absent_spec_is_empty() {
    assert!(SpecArgs::parse(None).expect("none").is_empty());
    assert!(SpecArgs::parse(Some("")).expect("empty").is_empty());
}

#[test]
fn extracts_template_dependencies_in_order() {
    assert_eq!(
        dependencies("{last}, {first} {last}").expect("parse"),
        vec!["last".to_string(), "first".to_string()]
    );
    assert!(dependencies("plain text").expect("parse").is_empty());
    assert_eq!(
        dependencies("{{literal}} {name}").expect("parse"),
        vec!["name".to_string()]
    );
}

#[test]
fn unbalanced_braces_are_errors() {
    assert_eq!(dependencies("Hello {name"), Err(TemplateError::UnclosedField(6)));
    assert_eq!(dependencies("Hello name}"), Err(TemplateError::StrayClose(10)));
    assert_eq!(dependencies("{}"), Err(TemplateError::EmptyField(0)));
    assert!(matches!(
        dependencies("{items[0]}"),
        Err(TemplateError::UnsupportedField { .. })
    ));
}

proptest! {
    #[test]
    fn parsing_is_idempotent(spec in r#"[a-z0-9=|,+*.\\" -]{0,32}"#) {
        let first = SpecArgs::parse(Some(&spec));
        let second = SpecArgs::parse(Some(&spec));
        prop_assert_eq!(first, second);
    }

    #[test]
    fn dependency_extraction_is_deduplicated(names in proptest::collection::vec("[a-c]{1,2}", 0..6)) {
        let template = names
            .iter()
            .map(|name| format!("{{{name}}}"))
            .collect::<Vec<_>>()
            .join("-");
        let fields = dependencies(&template).expect("well-formed template");
        let mut expected: Vec<String> = Vec::new();
        for name in &names {
            if !expected.contains(name) {
                expected.push(name.clone());
            }
        }
        prop_assert_eq!(fields, expected);
    }
}
