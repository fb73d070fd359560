//! Default [`AstProvider`] (spec.md §1, §6), wrapping `async-graphql-parser`
//! — the teacher's own parser dependency, and exactly the collaborator
//! spec.md §1 describes: "given schema text and a query, produces a
//! validated operation AST with resolved variable defaults and directive
//! arguments". Schema text is accepted for interface parity with that
//! description; this adapter itself does not re-validate a query against
//! it beyond what the parser's own grammar enforces, since full schema
//! validation is explicitly the out-of-scope collaborator's job, not this
//! crate's (§1 Non-goals).

use async_graphql_parser::types::{
    DocumentOperations, ExecutableDocument, OperationType, Selection as AstSelection,
    SelectionSet as AstSelectionSet,
};
use async_graphql_parser::{parse_query, Positioned};
use async_graphql_value::Value as AstValue;
use indexmap::IndexMap;

use crate::ast::{
    AstProvider, Directive, Field, FragmentDefinition, FragmentSpread, InlineFragment,
    OperationKind, PreparedOperation, Selection, SelectionSet,
};
use crate::error::QueryError;
use crate::value::InputValue;

/// Wraps `async_graphql_parser::parse_query` and lowers its AST into this
/// crate's own [`crate::ast`] types, substituting `$variable` references as
/// it goes (§4.9's "validated operation AST with resolved variable
/// defaults" requirement).
#[derive(Debug, Clone, Copy, Default)]
pub struct AsyncGraphqlParserProvider;

impl AstProvider for AsyncGraphqlParserProvider {
    fn prepare(
        &self,
        _schema_text: &str,
        query: &str,
        operation_name: Option<&str>,
        variables: &IndexMap<String, serde_json::Value>,
    ) -> Result<PreparedOperation, QueryError> {
        let doc: ExecutableDocument =
            parse_query(query).map_err(|e| QueryError(e.to_string()))?;

        let operation = select_operation(&doc, operation_name)?;

        let kind = match operation.ty {
            OperationType::Query => OperationKind::Query,
            OperationType::Mutation => OperationKind::Mutation,
            OperationType::Subscription => OperationKind::Subscription,
        };

        let var_defaults = collect_variable_defaults(operation);
        let bound = bind_variables(variables, &var_defaults);

        let selection_set = lower_selection_set(&operation.selection_set.node, &bound)?;

        let mut fragments = IndexMap::new();
        for (name, frag) in doc.fragments.iter() {
            let lowered = FragmentDefinition {
                type_condition: frag.node.type_condition.node.on.node.to_string(),
                selection_set: lower_selection_set(&frag.node.selection_set.node, &bound)?,
            };
            fragments.insert(name.to_string(), lowered);
        }

        Ok(PreparedOperation {
            kind,
            selection_set,
            fragments,
        })
    }
}

fn select_operation<'a>(
    doc: &'a ExecutableDocument,
    operation_name: Option<&str>,
) -> Result<&'a async_graphql_parser::types::OperationDefinition, QueryError> {
    match &doc.operations {
        DocumentOperations::Single(op) => Ok(&op.node),
        DocumentOperations::Multiple(ops) => {
            let name = operation_name.ok_or_else(|| {
                QueryError("multiple operations present; operationName is required".to_string())
            })?;
            ops.get(name)
                .map(|op| &op.node)
                .ok_or_else(|| QueryError(format!("unknown operation `{name}`")))
        }
    }
}

/// Every `$name: Type = default` declared on the selected operation, keyed
/// by name, carrying its already-parsed default literal (if any).
fn collect_variable_defaults(
    operation: &async_graphql_parser::types::OperationDefinition,
) -> IndexMap<String, Option<InputValue>> {
    let mut out = IndexMap::new();
    for var in &operation.variable_definitions {
        let default = var
            .node
            .default_value
            .as_ref()
            .map(|v| const_value_to_input(&v.node));
        out.insert(var.node.name.node.to_string(), default);
    }
    out
}

/// Resolves every declared variable to its bound request value, falling
/// back to its declared default literal, then to `Null` (§4.9 "variable
/// bindings"; §4.5.2 "use the default literal ... if absent").
fn bind_variables(
    supplied: &IndexMap<String, serde_json::Value>,
    defaults: &IndexMap<String, Option<InputValue>>,
) -> IndexMap<String, InputValue> {
    let mut bound = IndexMap::new();
    for (name, default) in defaults {
        let value = supplied
            .get(name)
            .map(crate::value::json_to_input_value)
            .or_else(|| default.clone())
            .unwrap_or(InputValue::Null);
        bound.insert(name.clone(), value);
    }
    // Variables supplied but not declared on the operation are still bound,
    // in case a fragment-only reference uses them.
    for (name, value) in supplied {
        bound
            .entry(name.clone())
            .or_insert_with(|| crate::value::json_to_input_value(value));
    }
    bound
}

fn lower_selection_set(
    set: &AstSelectionSet,
    vars: &IndexMap<String, InputValue>,
) -> Result<SelectionSet, QueryError> {
    set.items
        .iter()
        .map(|item| lower_selection(&item.node, vars))
        .collect()
}

fn lower_selection(
    sel: &AstSelection,
    vars: &IndexMap<String, InputValue>,
) -> Result<Selection, QueryError> {
    match sel {
        AstSelection::Field(f) => {
            let f = &f.node;
            let mut arguments = IndexMap::new();
            for (name, value) in &f.arguments {
                arguments.insert(name.node.to_string(), value_to_input(&value.node, vars));
            }
            Ok(Selection::Field(Field {
                alias: f.alias.as_ref().map(|a| a.node.to_string()),
                name: f.name.node.to_string(),
                arguments,
                directives: lower_directives(&f.directives, vars),
                selection_set: lower_selection_set(&f.selection_set.node, vars)?,
            }))
        }
        AstSelection::InlineFragment(frag) => {
            let frag = &frag.node;
            Ok(Selection::InlineFragment(InlineFragment {
                type_condition: frag
                    .type_condition
                    .as_ref()
                    .map(|t| t.node.on.node.to_string()),
                directives: lower_directives(&frag.directives, vars),
                selection_set: lower_selection_set(&frag.selection_set.node, vars)?,
            }))
        }
        AstSelection::FragmentSpread(spread) => {
            let spread = &spread.node;
            Ok(Selection::FragmentSpread(FragmentSpread {
                fragment_name: spread.fragment_name.node.to_string(),
                directives: lower_directives(&spread.directives, vars),
            }))
        }
    }
}

fn lower_directives(
    directives: &[Positioned<async_graphql_parser::types::Directive>],
    vars: &IndexMap<String, InputValue>,
) -> Vec<Directive> {
    directives
        .iter()
        .map(|d| {
            let mut arguments = IndexMap::new();
            for (name, value) in &d.node.arguments {
                arguments.insert(name.node.to_string(), value_to_input(&value.node, vars));
            }
            Directive {
                name: d.node.name.node.to_string(),
                arguments,
            }
        })
        .collect()
}

/// Lowers a query-literal `Value` (which may reference `$variable`s) into
/// an [`InputValue`], substituting variable references from `vars`.
fn value_to_input(value: &AstValue, vars: &IndexMap<String, InputValue>) -> InputValue {
    match value {
        AstValue::Variable(name) => vars.get(name.as_str()).cloned().unwrap_or(InputValue::Null),
        AstValue::Null => InputValue::Null,
        AstValue::Boolean(b) => InputValue::Bool(*b),
        AstValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                InputValue::Int(i)
            } else {
                InputValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        AstValue::String(s) => InputValue::String(s.clone()),
        AstValue::Enum(name) => InputValue::Enum(name.to_string()),
        AstValue::List(items) => {
            InputValue::List(items.iter().map(|v| value_to_input(v, vars)).collect())
        }
        AstValue::Object(fields) => {
            let mut out = IndexMap::with_capacity(fields.len());
            for (k, v) in fields {
                out.insert(k.to_string(), value_to_input(v, vars));
            }
            InputValue::Object(out)
        }
        // Binary/upload-style literals have no meaning for this engine's
        // scalar set; treated as null rather than rejected outright, since
        // the grammar may evolve additional literal kinds over time.
        _ => InputValue::Null,
    }
}

fn const_value_to_input(value: &async_graphql_parser::types::ConstValue) -> InputValue {
    use async_graphql_parser::types::ConstValue;
    match value {
        ConstValue::Null => InputValue::Null,
        ConstValue::Boolean(b) => InputValue::Bool(*b),
        ConstValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                InputValue::Int(i)
            } else {
                InputValue::Float(n.as_f64().unwrap_or(0.0))
            }
        }
        ConstValue::String(s) => InputValue::String(s.clone()),
        ConstValue::Enum(name) => InputValue::Enum(name.to_string()),
        ConstValue::List(items) => {
            InputValue::List(items.iter().map(const_value_to_input).collect())
        }
        ConstValue::Object(fields) => {
            let mut out = IndexMap::with_capacity(fields.len());
            for (k, v) in fields {
                out.insert(k.to_string(), const_value_to_input(v));
            }
            InputValue::Object(out)
        }
        _ => InputValue::Null,
    }
}
