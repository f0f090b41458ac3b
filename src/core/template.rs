//! Text templates: variable interpolation for `Say` orders.

use thiserror::Error;

use crate::core::variable::VariableStore;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    #[error("template parse error: {0}")]
    Parse(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// Variable interpolation: `{key}`.
    Variable(String),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq)]
pub struct TextTemplate {
    pub segments: Vec<TemplateSegment>,
}

impl TextTemplate {
    /// Parse a template string into a sequence of segments.
    ///
    /// Syntax:
    /// - `{key}` → `Variable`
    /// - `{{` / `}}` → literal `{` / `}`
    /// - Everything else → `Literal`
    pub fn parse(input: &str) -> Result<TextTemplate, TemplateError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            if chars[i] == '{' {
                if i + 1 < len && chars[i + 1] == '{' {
                    literal_buf.push('{');
                    i += 2;
                    continue;
                }

                if !literal_buf.is_empty() {
                    segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                }

                let start = i + 1;
                let mut end = start;
                while end < len && chars[end] != '}' {
                    if chars[end] == '{' {
                        return Err(TemplateError::Parse(
                            "nested braces are not allowed".to_string(),
                        ));
                    }
                    end += 1;
                }
                if end == len {
                    return Err(TemplateError::Parse("unclosed brace".to_string()));
                }

                let key: String = chars[start..end].iter().collect();
                let key = key.trim();
                if key.is_empty() {
                    return Err(TemplateError::Parse("empty braces".to_string()));
                }

                segments.push(TemplateSegment::Variable(key.to_string()));
                i = end + 1;
            } else if chars[i] == '}' {
                if i + 1 < len && chars[i + 1] == '}' {
                    literal_buf.push('}');
                    i += 2;
                    continue;
                }
                return Err(TemplateError::Parse(
                    "unmatched closing brace".to_string(),
                ));
            } else {
                literal_buf.push(chars[i]);
                i += 1;
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(TextTemplate { segments })
    }

    /// Render against a variable store. Unknown keys are left in place as
    /// `{key}` and returned alongside the text.
    pub fn render(&self, store: &VariableStore) -> (String, Vec<String>) {
        let mut out = String::new();
        let mut missing = Vec::new();

        for segment in &self.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::Variable(key) => match store.lookup(key) {
                    Some(variable) => out.push_str(&variable.get().to_string()),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                        missing.push(key.clone());
                    }
                },
            }
        }

        (out, missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::variable::GlobalEnvironment;
    use crate::schema::order::Scope;
    use crate::schema::story::VariableDecl;
    use crate::schema::value::Value;

    #[test]
    fn parse_literal_only() {
        let t = TextTemplate::parse("Hello, traveller.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Hello, traveller.".to_string())]
        );
    }

    #[test]
    fn parse_variable() {
        let t = TextTemplate::parse("You carry {gold} coins.").unwrap();
        assert_eq!(t.segments.len(), 3);
        assert_eq!(t.segments[1], TemplateSegment::Variable("gold".to_string()));
    }

    #[test]
    fn parse_escaped_braces() {
        let t = TextTemplate::parse("Use {{braces}} here.").unwrap();
        assert_eq!(
            t.segments,
            vec![TemplateSegment::Literal("Use {braces} here.".to_string())]
        );
    }

    #[test]
    fn parse_errors() {
        assert!(TextTemplate::parse("Bad {} here").is_err());
        assert!(TextTemplate::parse("Bad {outer{inner}} here").is_err());
        assert!(TextTemplate::parse("Bad {unclosed here").is_err());
        assert!(TextTemplate::parse("Bad } here").is_err());
    }

    #[test]
    fn render_values_and_missing_keys() {
        let globals = GlobalEnvironment::new();
        globals.get_or_create("day", Value::Integer(3)).unwrap();
        let mut store = VariableStore::new(globals);
        store.declare(&VariableDecl::new("name", Scope::Private, "Ada"));

        let t = TextTemplate::parse("{name} on day {day} meets {stranger}.").unwrap();
        let (text, missing) = t.render(&store);
        assert_eq!(text, "Ada on day 3 meets {stranger}.");
        assert_eq!(missing, vec!["stranger".to_string()]);
    }
}
