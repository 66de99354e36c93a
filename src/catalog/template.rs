//! Native ID templates.
//!
//! A template is a format string such as `"{project}-{environment}-vpc"` or
//! `"arn:aws:iam::{account}:oidc-provider/token.actions.githubusercontent.com"`.
//! Templates are parsed once when the catalog is built, so a typo in a
//! placeholder is a load-time configuration error rather than a bad lookup
//! at probe time. `{{` and `}}` produce literal braces.

use serde::Serialize;
use std::fmt;

use crate::error::ConfigError;

/// Values available to templates. Built once at the CLI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateParams {
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Cloud account or subscription ID.
    pub account: Option<String>,
    /// Cloud region.
    pub region: Option<String>,
}

/// A recognised placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Placeholder {
    /// `{project}`
    Project,
    /// `{environment}`
    Environment,
    /// `{account}`
    Account,
    /// `{region}`
    Region,
    /// `{name}`, the resource's logical name.
    Name,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// A parsed native ID template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeIdTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl Placeholder {
    fn parse(token: &str) -> Option<Self> {
        match token {
            "project" => Some(Self::Project),
            "environment" | "env" => Some(Self::Environment),
            "account" => Some(Self::Account),
            "region" => Some(Self::Region),
            "name" => Some(Self::Name),
            _ => None,
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Environment => "environment",
            Self::Account => "account",
            Self::Region => "region",
            Self::Name => "name",
        }
    }
}

impl TemplateParams {
    /// Creates parameters without an account or region.
    #[must_use]
    pub fn new(project: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            environment: environment.into(),
            account: None,
            region: None,
        }
    }
}

impl NativeIdTemplate {
    /// Parses a template string.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty template, an unknown placeholder, or an
    /// unbalanced brace.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        if raw.trim().is_empty() {
            return Err(ConfigError::template(raw, "template is empty"));
        }

        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = raw.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut token = String::new();
                    let mut closed = false;
                    for t in chars.by_ref() {
                        if t == '}' {
                            closed = true;
                            break;
                        }
                        token.push(t);
                    }
                    if !closed {
                        return Err(ConfigError::template(raw, "unclosed '{'"));
                    }
                    let placeholder = Placeholder::parse(token.trim()).ok_or_else(|| {
                        ConfigError::template(raw, format!("unknown placeholder '{{{token}}}'"))
                    })?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                }
                '}' => return Err(ConfigError::template(raw, "unmatched '}'")),
                other => literal.push(other),
            }
        }

        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    /// Returns the template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns the placeholders used by this template.
    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Renders the template for the resource called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the template needs `{account}` or `{region}` and
    /// the parameters do not provide it.
    pub fn render(&self, params: &TemplateParams, name: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(self.raw.len() + 16);
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Placeholder(p) => {
                    let value = match p {
                        Placeholder::Project => Some(params.project.as_str()),
                        Placeholder::Environment => Some(params.environment.as_str()),
                        Placeholder::Account => params.account.as_deref(),
                        Placeholder::Region => params.region.as_deref(),
                        Placeholder::Name => Some(name),
                    };
                    let value = value.ok_or_else(|| {
                        ConfigError::template(
                            &self.raw,
                            format!("'{{{}}}' is not set for this project", p.as_str()),
                        )
                    })?;
                    out.push_str(value);
                }
            }
        }
        Ok(out)
    }
}

impl fmt::Display for NativeIdTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TemplateParams {
        TemplateParams {
            project: String::from("runners"),
            environment: String::from("dev"),
            account: Some(String::from("123456789012")),
            region: None,
        }
    }

    #[test]
    fn test_render_project_environment() {
        let t = NativeIdTemplate::parse("{project}-{environment}-rg").unwrap();
        assert_eq!(t.render(&params(), "rg").unwrap(), "runners-dev-rg");
    }

    #[test]
    fn test_render_arn_with_account() {
        let t = NativeIdTemplate::parse(
            "arn:aws:iam::{account}:oidc-provider/token.actions.githubusercontent.com",
        )
        .unwrap();
        assert_eq!(
            t.render(&params(), "oidc").unwrap(),
            "arn:aws:iam::123456789012:oidc-provider/token.actions.githubusercontent.com"
        );
    }

    #[test]
    fn test_escaped_braces_and_name() {
        let t = NativeIdTemplate::parse("{{{name}}}").unwrap();
        assert_eq!(t.render(&params(), "vm").unwrap(), "{vm}");
    }

    #[test]
    fn test_missing_region_is_error() {
        let t = NativeIdTemplate::parse("{project}-{region}").unwrap();
        let err = t.render(&params(), "x").unwrap_err();
        assert!(err.to_string().contains("region"));
    }

    #[test]
    fn test_parse_errors() {
        assert!(NativeIdTemplate::parse("").is_err());
        assert!(NativeIdTemplate::parse("{project").is_err());
        assert!(NativeIdTemplate::parse("project}").is_err());
        assert!(NativeIdTemplate::parse("{projcet}-vpc").is_err());
    }

    #[test]
    fn test_placeholders() {
        let t = NativeIdTemplate::parse("{project}-{account}-x").unwrap();
        let found: Vec<_> = t.placeholders().collect();
        assert_eq!(found, vec![Placeholder::Project, Placeholder::Account]);
    }
}
