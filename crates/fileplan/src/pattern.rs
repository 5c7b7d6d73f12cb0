//! Stored patterns and the document format they are persisted in.
//!
//! A [`Pattern`] is an immutable value: every edit returns a new value, and
//! the compiled query always belongs to the expression next to it. Storage
//! itself is the host's business; this module only defines the serialized
//! shape ([`PatternDocument`]) and recompiles on load.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ParseError};
use crate::query::{
    classify, InputForm, IntelligentParser, ParsedQuery, PatternComplexity, QueryAst,
};
use crate::token::TokenContext;
use crate::types::PatternId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub user_expression: String,
    #[serde(skip)]
    pub compiled_query: Option<QueryAst>,
    pub complexity: PatternComplexity,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default)]
    pub last_used: Option<NaiveDateTime>,
    #[serde(default)]
    pub retired_at: Option<NaiveDateTime>,
    pub is_valid: bool,
    #[serde(default)]
    pub validation_errors: Vec<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
}

impl Pattern {
    /// Compiles `expression`. A pattern that fails to compile is still
    /// returned, marked invalid with the parse error recorded.
    pub fn compile(
        name: impl Into<String>,
        expression: impl Into<String>,
        parser: &IntelligentParser,
        context: &TokenContext,
    ) -> Self {
        Self::compile_with_id(PatternId::generate(), name, expression, parser, context)
    }

    pub fn compile_with_id(
        id: PatternId,
        name: impl Into<String>,
        expression: impl Into<String>,
        parser: &IntelligentParser,
        context: &TokenContext,
    ) -> Self {
        let expression = expression.into();
        let parsed = parser.parse(&expression, context);
        Self::from_parsed(id, name, expression, parsed)
    }

    pub fn from_parsed(
        id: PatternId,
        name: impl Into<String>,
        expression: String,
        parsed: Result<ParsedQuery, ParseError>,
    ) -> Self {
        let mut pattern = Self {
            id,
            name: name.into(),
            complexity: fallback_complexity(&expression),
            user_expression: expression,
            compiled_query: None,
            tags: BTreeSet::new(),
            group_id: None,
            usage_count: 0,
            last_used: None,
            retired_at: None,
            is_valid: false,
            validation_errors: Vec::new(),
            warnings: Vec::new(),
        };
        match parsed {
            Ok(parsed) => {
                pattern.complexity = parsed.complexity;
                pattern.warnings = parsed
                    .issues
                    .iter()
                    .map(|issue| issue.message.clone())
                    .collect();
                pattern.compiled_query = Some(parsed.ast);
                pattern.is_valid = true;
            }
            Err(error) => pattern.validation_errors.push(error.to_string()),
        }
        pattern
    }

    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some()
    }

    /// Same pattern with a new expression, recompiled.
    pub fn with_expression(
        &self,
        expression: impl Into<String>,
        parser: &IntelligentParser,
        context: &TokenContext,
    ) -> Self {
        let recompiled =
            Self::compile_with_id(self.id.clone(), self.name.clone(), expression, parser, context);
        Self {
            tags: self.tags.clone(),
            group_id: self.group_id.clone(),
            usage_count: self.usage_count,
            last_used: self.last_used,
            retired_at: self.retired_at,
            ..recompiled
        }
    }

    pub fn with_tags<I, S>(&self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..self.clone()
        }
    }

    pub fn with_group(&self, group_id: impl Into<String>) -> Self {
        Self {
            group_id: Some(group_id.into()),
            ..self.clone()
        }
    }

    pub fn record_use(&self, now: NaiveDateTime) -> Self {
        Self {
            usage_count: self.usage_count.saturating_add(1),
            last_used: Some(now),
            ..self.clone()
        }
    }

    /// Soft delete; the pattern stays addressable.
    pub fn retire(&self, now: NaiveDateTime) -> Self {
        Self {
            retired_at: Some(self.retired_at.unwrap_or(now)),
            ..self.clone()
        }
    }

    pub fn to_definition(&self) -> PatternDefinition {
        PatternDefinition {
            id: Some(self.id.clone()),
            name: self.name.clone(),
            expression: self.user_expression.clone(),
            tags: self.tags.clone(),
            group_id: self.group_id.clone(),
            usage_count: self.usage_count,
            last_used: self.last_used,
            retired_at: self.retired_at,
        }
    }

    pub fn from_definition(
        definition: PatternDefinition,
        parser: &IntelligentParser,
        context: &TokenContext,
    ) -> Self {
        let id = definition.id.unwrap_or_else(PatternId::generate);
        let compiled =
            Self::compile_with_id(id, definition.name, definition.expression, parser, context);
        Self {
            tags: definition.tags,
            group_id: definition.group_id,
            usage_count: definition.usage_count,
            last_used: definition.last_used,
            retired_at: definition.retired_at,
            ..compiled
        }
    }
}

fn fallback_complexity(expression: &str) -> PatternComplexity {
    match classify(expression, expression.contains('$')) {
        InputForm::AdvancedQuery => PatternComplexity::Advanced,
        InputForm::EnhancedGlob | InputForm::Shorthand => PatternComplexity::Enhanced,
        InputForm::SimpleGlob => PatternComplexity::Simple,
    }
}

/// Persisted form of a pattern. The compiled query is never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDefinition {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PatternId>,
    pub name: String,
    pub expression: String,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(default)]
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retired_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupDefinition {
    pub name: String,
    pub expression: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternDocument {
    #[serde(default)]
    pub patterns: Vec<PatternDefinition>,
    #[serde(default)]
    pub groups: Vec<GroupDefinition>,
}

impl PatternDocument {
    pub fn from_patterns<'a>(patterns: impl IntoIterator<Item = &'a Pattern>) -> Self {
        Self {
            patterns: patterns.into_iter().map(Pattern::to_definition).collect(),
            groups: Vec::new(),
        }
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_yaml_string(&self) -> Result<String, ConfigError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reads a `.json` file as JSON and anything else as YAML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        if is_json(path) {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = if is_json(path) {
            self.to_json_string()?
        } else {
            self.to_yaml_string()?
        };
        fs::write(path, text)?;
        Ok(())
    }

    /// Recompiles every stored pattern.
    pub fn compile(&self, parser: &IntelligentParser, context: &TokenContext) -> Vec<Pattern> {
        self.patterns
            .iter()
            .cloned()
            .map(|definition| Pattern::from_definition(definition, parser, context))
            .collect()
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("json"))
}
