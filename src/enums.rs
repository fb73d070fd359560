//! Enum dictionary (§3.4, §6). An external, caller-supplied map from enum
//! type name to an ordered list of value names; ordinal equals index.
//! Value names may carry trailing `#description` and `@directive`
//! annotations that must be stripped from the lookup key but preserved
//! for introspection.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct EnumValue {
    /// The stripped name used for GraphQL output and lookup.
    pub name: String,
    pub description: Option<String>,
    /// Raw `@directive(...)` text, e.g. `@deprecated(reason: "...")`.
    pub directives: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct EnumType {
    /// Ordinal = index into this vector.
    pub values: Vec<EnumValue>,
    name_to_ordinal: HashMap<String, i64>,
}

impl EnumType {
    fn build(raw_values: &[String]) -> Self {
        let mut values = Vec::with_capacity(raw_values.len());
        let mut name_to_ordinal = HashMap::with_capacity(raw_values.len());
        for (ordinal, raw) in raw_values.iter().enumerate() {
            let value = parse_enum_value(raw);
            name_to_ordinal.insert(value.name.clone(), ordinal as i64);
            values.push(value);
        }
        Self {
            values,
            name_to_ordinal,
        }
    }

    pub fn ordinal_of(&self, name: &str) -> Option<i64> {
        self.name_to_ordinal.get(name).copied()
    }

    pub fn name_of(&self, ordinal: i64) -> Option<&str> {
        self.values.get(ordinal as usize).map(|v| v.name.as_str())
    }
}

/// The full set of enum types known to one schema.
#[derive(Debug, Clone, Default)]
pub struct EnumDictionary {
    types: HashMap<String, EnumType>,
}

impl EnumDictionary {
    /// Builds a dictionary from the external source: enum type name ->
    /// ordered raw value strings (each possibly carrying `#desc`/`@dir`
    /// suffixes).
    pub fn build(raw: HashMap<String, Vec<String>>) -> Self {
        let types = raw
            .into_iter()
            .map(|(name, values)| (name, EnumType::build(&values)))
            .collect();
        Self { types }
    }

    pub fn type_of(&self, enum_type_name: &str) -> Option<&EnumType> {
        self.types.get(enum_type_name)
    }

    pub fn ordinal_of(&self, enum_type_name: &str, value_name: &str) -> Option<i64> {
        self.types.get(enum_type_name)?.ordinal_of(value_name)
    }

    pub fn name_of(&self, enum_type_name: &str, ordinal: i64) -> Option<&str> {
        self.types.get(enum_type_name)?.name_of(ordinal)
    }
}

/// Strips trailing `#description` and `@directive` suffixes from one raw
/// enum value string, in whichever order they appear.
fn parse_enum_value(raw: &str) -> EnumValue {
    let (head, mut rest) = match raw.find(['#', '@']) {
        Some(idx) => (&raw[..idx], &raw[idx..]),
        None => (raw, ""),
    };

    let mut description = None;
    let mut directives = Vec::new();

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix('#') {
            let end = stripped.find('@').unwrap_or(stripped.len());
            let desc = stripped[..end].trim();
            if !desc.is_empty() {
                description = Some(desc.to_string());
            }
            rest = &stripped[end..];
        } else if rest.starts_with('@') {
            let end = rest[1..].find('#').map(|i| i + 1).unwrap_or(rest.len());
            directives.push(rest[..end].trim().to_string());
            rest = &rest[end..];
        } else {
            break;
        }
    }

    EnumValue {
        name: head.trim().to_string(),
        description,
        directives,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict() -> EnumDictionary {
        let mut raw = HashMap::new();
        raw.insert(
            "E".to_string(),
            vec!["E0".to_string(), "E1".to_string(), "E2".to_string()],
        );
        EnumDictionary::build(raw)
    }

    #[test]
    fn ordinal_roundtrip() {
        let d = dict();
        for (name, ordinal) in [("E0", 0), ("E1", 1), ("E2", 2)] {
            assert_eq!(d.ordinal_of("E", name), Some(ordinal));
            assert_eq!(d.name_of("E", ordinal), Some(name));
        }
    }

    #[test]
    fn strips_description_and_directive_suffixes() {
        let mut raw = HashMap::new();
        raw.insert(
            "Status".to_string(),
            vec![
                "ACTIVE#currently active".to_string(),
                "RETIRED@deprecated(reason: \"use ARCHIVED\")".to_string(),
                "ARCHIVED#no longer in use@since(version: \"2\")".to_string(),
            ],
        );
        let d = EnumDictionary::build(raw);
        let t = d.type_of("Status").unwrap();
        assert_eq!(t.values[0].name, "ACTIVE");
        assert_eq!(t.values[0].description.as_deref(), Some("currently active"));
        assert_eq!(t.values[1].name, "RETIRED");
        assert_eq!(t.values[1].directives.len(), 1);
        assert_eq!(t.values[2].name, "ARCHIVED");
        assert_eq!(t.values[2].description.as_deref(), Some("no longer in use"));
        assert_eq!(t.values[2].directives.len(), 1);
        assert_eq!(d.ordinal_of("Status", "ARCHIVED"), Some(2));
    }
}
