//! The validated-operation boundary (spec.md §1 "out of scope: the GraphQL
//! text→AST parser + query validator"). This module defines the shape that
//! collaborator is assumed to hand back — a [`PreparedOperation`]: a
//! selection tree with variables already substituted and defaults already
//! resolved — plus the [`AstProvider`] trait a caller supplies an
//! implementation of. [`crate::parser_adapter`] wraps `async-graphql-parser`
//! as the default.
//!
//! Everything downstream of this module (the selection evaluator, C5) works
//! only against these types, never against a concrete parser's AST, so a
//! caller is free to swap in a different parser/validator entirely.

use indexmap::IndexMap;

use crate::value::InputValue;

/// Which of the three root records an operation selects against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Query,
    Mutation,
    Subscription,
}

/// One `@directive(...)` attached to a field or fragment selection, with its
/// arguments already variable-substituted. The evaluator only interprets
/// `@skip`/`@include` (§4.5.2 step 1); any other directive here is inert as
/// far as this crate is concerned, but is still handed through so a caller
/// composing the evaluator into a larger system can inspect it.
#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub arguments: IndexMap<String, InputValue>,
}

impl Directive {
    /// Evaluates `@skip(if: ...)` / `@include(if: ...)` against this
    /// directive, if it is one. Non-boolean `if` arguments are treated as
    /// `false` defensively — the external validator should have rejected
    /// them already.
    fn applies_skip(&self) -> Option<bool> {
        match self.name.as_str() {
            "skip" => Some(self.if_arg()),
            _ => None,
        }
    }

    fn applies_include(&self) -> Option<bool> {
        match self.name.as_str() {
            "include" => Some(self.if_arg()),
            _ => None,
        }
    }

    fn if_arg(&self) -> bool {
        matches!(self.arguments.get("if"), Some(InputValue::Bool(true)))
    }
}

/// Evaluates a selection's directive list against `@skip`/`@include`
/// (§4.5.2, §8 "a selection protected by @skip(if: true) or @include(if:
/// false) contributes no key to the output"). Multiple skip/include
/// directives compose: any one of them saying "omit" wins.
pub fn is_skipped(directives: &[Directive]) -> bool {
    for d in directives {
        if let Some(true) = d.applies_skip() {
            return true;
        }
        if let Some(false) = d.applies_include() {
            return true;
        }
    }
    false
}

/// One entry of a selection set: a field, an inline fragment, or a named
/// fragment spread (§4.5 "Dispatch per selection").
#[derive(Debug, Clone)]
pub enum Selection {
    Field(Field),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

#[derive(Debug, Clone)]
pub struct Field {
    /// The output key: the alias if given, otherwise the field name.
    pub alias: Option<String>,
    pub name: String,
    /// Arguments as written in the query, with `$variable` references
    /// already substituted by the external validator (§4.9, §6).
    pub arguments: IndexMap<String, InputValue>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

impl Field {
    pub fn output_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct InlineFragment {
    /// `... on TypeName { ... }`; `None` for a bare `... { ... }`.
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone)]
pub struct FragmentSpread {
    pub fragment_name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub type_condition: String,
    pub selection_set: SelectionSet,
}

pub type SelectionSet = Vec<Selection>;

/// A fully validated, variable-substituted operation — the output of the
/// external parser/validator collaborator (§1). This is what the selection
/// evaluator (C5) and request dispatch (C9) operate on directly.
#[derive(Debug, Clone)]
pub struct PreparedOperation {
    pub kind: OperationKind,
    pub selection_set: SelectionSet,
    pub fragments: IndexMap<String, FragmentDefinition>,
}

/// The out-of-scope external collaborator (spec.md §1): given schema text
/// and a query (plus already-JSON-decoded variables and an optional
/// operation name), produces a validated [`PreparedOperation`] with
/// variable defaults resolved and directive arguments substituted.
///
/// A schema-aware implementation can additionally validate the query
/// against the supplied schema text; this trait's contract only requires
/// that it produce *a* parsed, variable-substituted selection tree — the
/// engine's own components (C1-C9) do not re-validate argument shapes
/// beyond what the value coercer (C4) does at field-resolution time.
pub trait AstProvider: Send + Sync {
    fn prepare(
        &self,
        schema_text: &str,
        query: &str,
        operation_name: Option<&str>,
        variables: &IndexMap<String, serde_json::Value>,
    ) -> Result<PreparedOperation, crate::error::QueryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skip_true() -> Directive {
        let mut args = IndexMap::new();
        args.insert("if".to_string(), InputValue::Bool(true));
        Directive {
            name: "skip".to_string(),
            arguments: args,
        }
    }

    fn include_false() -> Directive {
        let mut args = IndexMap::new();
        args.insert("if".to_string(), InputValue::Bool(false));
        Directive {
            name: "include".to_string(),
            arguments: args,
        }
    }

    #[test]
    fn skip_if_true_omits() {
        assert!(is_skipped(&[skip_true()]));
    }

    #[test]
    fn include_if_false_omits() {
        assert!(is_skipped(&[include_false()]));
    }

    #[test]
    fn no_directives_keeps_selection() {
        assert!(!is_skipped(&[]));
    }

    #[test]
    fn output_key_prefers_alias() {
        let f = Field {
            alias: Some("a".to_string()),
            name: "i".to_string(),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: Vec::new(),
        };
        assert_eq!(f.output_key(), "a");
    }
}
