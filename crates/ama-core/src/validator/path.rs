use std::fs;
use std::path::{Component, Path};

use globset::{GlobBuilder, GlobMatcher};
use walkdir::WalkDir;

use super::{ValidationError, Validator, validator};
use crate::spec_args::{SpecArgs, SpecError};
use crate::value::AnswerValue;

const MAX_COMPONENT_BYTES: usize = 255;

/// Builds the `path` validator for `existing`, `new`, `empty`, `nonempty` or a
/// `+glob`/`-glob` contents spec.
pub(super) fn factory(args: &SpecArgs) -> Result<Validator, SpecError> {
    match args.first() {
        None | Some("existing") => Ok(validator(|value| {
            let path = path_text(value)?;
            existing_dir(path)?;
            Ok(value.clone())
        })),
        Some("new") => Ok(validator(new_path)),
        Some("empty") => Ok(validator(|value| {
            let path = path_text(value)?;
            if entry_count(existing_dir(path)?)? != 0 {
                return Err(ValidationError::value_error("Path should be empty."));
            }
            Ok(value.clone())
        })),
        Some("nonempty") => Ok(validator(|value| {
            let path = path_text(value)?;
            if entry_count(existing_dir(path)?)? == 0 {
                return Err(ValidationError::value_error("Path should contain files."));
            }
            Ok(value.clone())
        })),
        Some(_) => contents(args),
    }
}

fn path_text(value: &AnswerValue) -> Result<&str, ValidationError> {
    value.as_str().ok_or_else(|| {
        ValidationError::type_error(format!("Expected a path, got {}", value.type_name()))
    })
}

fn existing_dir(path: &str) -> Result<&Path, ValidationError> {
    let path = Path::new(path);
    if path.is_dir() {
        Ok(path)
    } else {
        Err(ValidationError::value_error("Path does not exist."))
    }
}

fn entry_count(dir: &Path) -> Result<usize, ValidationError> {
    fs::read_dir(dir)
        .map(|entries| entries.count())
        .map_err(|err| ValidationError::value_error(format!("Unable to read path: {err}")))
}

fn new_path(value: &AnswerValue) -> Result<AnswerValue, ValidationError> {
    let text = path_text(value)?;
    if text.is_empty() {
        return Ok(AnswerValue::Text(String::new()));
    }
    if Path::new(text).exists() {
        return Err(ValidationError::value_error("Path already exists."));
    }
    let well_formed = !text.contains('\0')
        && Path::new(text).components().all(|component| match component {
            Component::Normal(part) => {
                let len = part.len();
                len > 0 && len <= MAX_COMPONENT_BYTES
            }
            _ => true,
        });
    if well_formed {
        Ok(value.clone())
    } else {
        Err(ValidationError::value_error("Invalid path name."))
    }
}

struct GlobRule {
    pattern: String,
    matcher: GlobMatcher,
    depth: usize,
}

impl GlobRule {
    fn new(pattern: &str) -> Result<Self, SpecError> {
        let pattern = pattern.trim().trim_matches('"');
        let matcher = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|err| SpecError::Unsupported(format!("invalid glob '{pattern}': {err}")))?
            .compile_matcher();
        let depth = if pattern.contains("**") {
            usize::MAX
        } else {
            pattern.split('/').count()
        };
        Ok(Self {
            pattern: pattern.to_string(),
            matcher,
            depth,
        })
    }
}

fn contents(args: &SpecArgs) -> Result<Validator, SpecError> {
    let mut include = Vec::new();
    let mut exclude = Vec::new();
    for token in args.positional().iter().flat_map(|token| token.split(',')) {
        let token = token.trim();
        if let Some(glob) = token.strip_prefix('+') {
            include.push(GlobRule::new(glob)?);
        } else if let Some(glob) = token.strip_prefix('-') {
            exclude.push(GlobRule::new(glob)?);
        } else if !token.is_empty() {
            return Err(SpecError::Unsupported(format!(
                "unknown path mode '{token}'"
            )));
        }
    }
    if include.is_empty() && exclude.is_empty() {
        return Err(SpecError::Unsupported("empty path contents spec".into()));
    }

    let depth = include
        .iter()
        .chain(&exclude)
        .map(|rule| rule.depth)
        .max()
        .unwrap_or(1);

    Ok(validator(move |value| {
        let text = path_text(value)?;
        let dir = existing_dir(text)?;
        let entries = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(depth)
            .into_iter()
            .map(|entry| {
                entry
                    .map(|entry| entry.path().strip_prefix(dir).unwrap_or(entry.path()).to_path_buf())
                    .map_err(|err| ValidationError::value_error(format!("Unable to read path: {err}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let matches = |rule: &GlobRule| entries.iter().any(|entry| rule.matcher.is_match(entry));

        let missing = include
            .iter()
            .filter(|rule| !matches(*rule))
            .map(|rule| rule.pattern.as_str())
            .collect::<Vec<_>>();
        let forbidden = exclude
            .iter()
            .filter(|rule| matches(*rule))
            .map(|rule| rule.pattern.as_str())
            .collect::<Vec<_>>();
        if missing.is_empty() && forbidden.is_empty() {
            return Ok(value.clone());
        }

        let mut message = vec![format!("Path {text}")];
        if !missing.is_empty() {
            message.push(format!("should contain files matching {}", missing.join(",")));
        }
        if !forbidden.is_empty() {
            if !missing.is_empty() {
                message.push("and".into());
            }
            message.push(format!(
                "should not contain files matching {}",
                forbidden.join(",")
            ));
        }
        Err(ValidationError::value_error(message.join(" ")))
    }))
}
