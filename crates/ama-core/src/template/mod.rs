//! Default-value templates with flat `{name}` placeholders.
//!
//! `{{` and `}}` render literal braces. Field names are plain identifiers of
//! other questions: no attribute or index lookups, conversions or format specs.

use thiserror::Error;

/// Errors raised while tokenizing a template.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("unmatched '{{' at offset {0}")]
    UnclosedField(usize),
    #[error("single '}}' encountered at offset {0}")]
    StrayClose(usize),
    #[error("empty placeholder at offset {0}")]
    EmptyField(usize),
    #[error("unsupported placeholder '{{{field}}}' at offset {offset}")]
    UnsupportedField { field: String, offset: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Field(String),
}

/// Parsed template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.char_indices().peekable();

        while let Some((offset, ch)) = chars.next() {
            match ch {
                '{' if chars.next_if(|(_, next)| *next == '{').is_some() => literal.push('{'),
                '}' if chars.next_if(|(_, next)| *next == '}').is_some() => literal.push('}'),
                '}' => return Err(TemplateError::StrayClose(offset)),
                '{' => {
                    let mut field = String::new();
                    let mut closed = false;
                    for (_, inner) in chars.by_ref() {
                        if inner == '}' {
                            closed = true;
                            break;
                        }
                        field.push(inner);
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedField(offset));
                    }
                    check_field(&field, offset)?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Field(field));
                }
                other => literal.push(other),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Referenced field names in order of first appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for segment in &self.segments {
            if let Segment::Field(name) = segment
                && !seen.contains(&name.as_str())
            {
                seen.push(name);
            }
        }
        seen
    }

    pub fn has_fields(&self) -> bool {
        self.segments
            .iter()
            .any(|segment| matches!(segment, Segment::Field(_)))
    }

    /// Substitutes every placeholder through `lookup`. A `None` re-emits the
    /// placeholder text unchanged.
    pub fn render<F>(&self, mut lookup: F) -> String
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Field(name) => match lookup(name) {
                    Some(value) => out.push_str(&value),
                    None => {
                        out.push('{');
                        out.push_str(name);
                        out.push('}');
                    }
                },
            }
        }
        out
    }
}

/// Ordered, de-duplicated keys referenced by `template`.
pub fn dependencies(template: &str) -> Result<Vec<String>, TemplateError> {
    Ok(Template::parse(template)?
        .fields()
        .into_iter()
        .map(str::to_string)
        .collect())
}

fn check_field(field: &str, offset: usize) -> Result<(), TemplateError> {
    if field.trim().is_empty() {
        return Err(TemplateError::EmptyField(offset));
    }
    if field
        .chars()
        .any(|ch| matches!(ch, '.' | '[' | ']' | '!' | ':' | '{'))
    {
        return Err(TemplateError::UnsupportedField {
            field: field.to_string(),
            offset,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubled_braces_are_literal() {
        let template = Template::parse("{{x}} {name}").expect("parse");
        assert_eq!(template.fields(), vec!["name"]);
        assert_eq!(
            template.render(|_| Some("Ada".into())),
            "{x} Ada".to_string()
        );
    }

    #[test]
    fn unresolved_fields_render_verbatim() {
        let template = Template::parse("Hello {name}").expect("parse");
        assert_eq!(template.render(|_| None), "Hello {name}");
    }

    #[test]
    fn rejects_attribute_lookups() {
        assert!(matches!(
            Template::parse("{user.name}"),
            Err(TemplateError::UnsupportedField { .. })
        ));
        assert!(matches!(
            Template::parse("{value:>10}"),
            Err(TemplateError::UnsupportedField { .. })
        ));
    }
}
