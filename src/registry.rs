//! Resolver index (C3). Built once per schema from its root record shapes:
//! walks every reachable record type, runs the field analyzer (C2) over
//! each of its fields, flattens embedded compositions into the enclosing
//! type, and allocates a cache slot (C6) for every field the cache policy
//! covers (§3.2, §4.3).

use std::collections::HashSet;
use std::sync::Arc;

use fnv::FnvHashMap;
use indexmap::IndexMap;

use crate::cache::CacheSlot;
use crate::descriptor::{analyze_field, FieldDescriptor};
use crate::error::{Error, ShapeError};
use crate::shape::{RecordShape, ShapeHint};

/// One resolvable field of a type, as registered in its [`TypeIndex`].
#[derive(Clone)]
pub struct ResolverEntry {
    /// The field's compiled descriptor, taken from the innermost (leaf)
    /// definition — the one that actually carries the resolver.
    pub descriptor: FieldDescriptor,
    /// Positions of enclosing `embedded` fields to walk through, outermost
    /// first, before reaching `descriptor.position` on the innermost
    /// record's own shape. Empty for a field that wasn't promoted.
    pub embed_path: Vec<usize>,
    /// Present when this field is eligible for per-request memoization
    /// (§3.2).
    pub cache_slot: Option<Arc<CacheSlot>>,
}

/// The compiled field table for one record type.
pub struct TypeIndex {
    pub type_name: &'static str,
    pub fields: IndexMap<String, ResolverEntry>,
}

/// The full resolver index for a schema: every record type reachable from
/// its root query/mutation/subscription records, keyed by type name.
pub struct ResolverIndex {
    pub types: FnvHashMap<&'static str, Arc<TypeIndex>>,
}

impl ResolverIndex {
    pub fn type_of(&self, type_name: &str) -> Option<&Arc<TypeIndex>> {
        self.types.get(type_name)
    }

    /// Builds the index from the schema's root record shapes.
    ///
    /// `cache_enabled` is the schema-wide function-cache switch (§3.2); a
    /// field still gets a slot if it carries `@cacheControl` even when this
    /// is off, but never gets one when it isn't callable at all.
    pub fn build(roots: &[RecordShape], cache_enabled: bool) -> Result<Self, Error> {
        let mut built = FnvHashMap::default();
        let mut building = HashSet::new();
        for root in roots {
            build_type(root, cache_enabled, &mut building, &mut built)?;
        }
        Ok(ResolverIndex { types: built })
    }
}

fn build_type(
    shape: &RecordShape,
    cache_enabled: bool,
    building: &mut HashSet<&'static str>,
    built: &mut FnvHashMap<&'static str, Arc<TypeIndex>>,
) -> Result<(), Error> {
    if built.contains_key(shape.type_name) || building.contains(shape.type_name) {
        return Ok(());
    }
    building.insert(shape.type_name);

    let mut fields = IndexMap::new();
    let result = collect_fields(shape, &[], cache_enabled, building, built, &mut fields);

    building.remove(shape.type_name);
    result?;

    built.insert(
        shape.type_name,
        Arc::new(TypeIndex {
            type_name: shape.type_name,
            fields,
        }),
    );
    Ok(())
}

fn collect_fields(
    shape: &RecordShape,
    embed_path: &[usize],
    cache_enabled: bool,
    building: &mut HashSet<&'static str>,
    built: &mut FnvHashMap<&'static str, Arc<TypeIndex>>,
    out: &mut IndexMap<String, ResolverEntry>,
) -> Result<(), Error> {
    for (position, spec) in shape.fields.iter().enumerate() {
        let Some(descriptor) = analyze_field(spec, position)? else {
            continue;
        };

        if descriptor.embedded {
            if descriptor.empty_embedded {
                continue;
            }
            if let ShapeHint::Record(make_nested) = &descriptor.result_type {
                let nested = make_nested();
                let mut nested_path = embed_path.to_vec();
                nested_path.push(position);
                collect_fields(&nested, &nested_path, cache_enabled, building, built, out)?;
            }
            continue;
        }

        check_no_unguarded_recursion(shape.type_name, &descriptor.result_type, building)?;
        register_reachable(&descriptor.result_type, cache_enabled, building, built)?;

        let cache_slot = if should_cache(&descriptor, cache_enabled) {
            Some(CacheSlot::new())
        } else {
            None
        };

        let entry = ResolverEntry {
            descriptor: descriptor.clone(),
            embed_path: embed_path.to_vec(),
            cache_slot,
        };

        if out.insert(descriptor.name.clone(), entry).is_some() {
            return Err(ShapeError::DuplicateField {
                type_name: shape.type_name.to_string(),
                field: descriptor.name,
            }
            .into());
        }
    }
    Ok(())
}

/// A field eligible for memoization is one the resolver index gives a slot
/// to: either it is explicitly annotated for caching regardless of the
/// global switch, or it's a callable field and both the global switch is
/// on and the field didn't opt out with `no_cache` (§3.2, §4.6).
fn should_cache(descriptor: &FieldDescriptor, cache_enabled: bool) -> bool {
    let explicitly_cached = descriptor
        .directives
        .iter()
        .any(|d| d.starts_with("@cacheControl"));
    explicitly_cached || (descriptor.callable && cache_enabled && !descriptor.no_cache)
}

fn register_reachable(
    hint: &ShapeHint,
    cache_enabled: bool,
    building: &mut HashSet<&'static str>,
    built: &mut FnvHashMap<&'static str, Arc<TypeIndex>>,
) -> Result<(), Error> {
    if let Some(make_shape) = record_thunk(hint) {
        let nested = make_shape();
        build_type(&nested, cache_enabled, building, built)?;
    }
    Ok(())
}

/// A field whose result type is a record reached with no intervening
/// `Option`/`List`/`Map` boundary, and which cycles back to a type
/// currently being built, describes a value with no finite representation
/// (§4.3 "a cycle entered before the placeholder guard can prevent it").
fn check_no_unguarded_recursion(
    owner_type_name: &'static str,
    hint: &ShapeHint,
    building: &HashSet<&'static str>,
) -> Result<(), Error> {
    if let ShapeHint::Record(make_shape) = hint {
        let nested_name = make_shape().type_name;
        if building.contains(nested_name) {
            return Err(ShapeError::UnguardedRecursion(owner_type_name.to_string()).into());
        }
    }
    Ok(())
}

fn record_thunk(hint: &ShapeHint) -> Option<fn() -> RecordShape> {
    match hint {
        ShapeHint::Record(f) => Some(*f),
        ShapeHint::Option(inner) | ShapeHint::List(inner) => record_thunk(inner),
        ShapeHint::Map(_, value) => record_thunk(value),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::FieldCallContext;
    use crate::error::FieldError;
    use crate::shape::{FieldSpec, Primitive, ResolvedValue, Resolvable};
    use futures::future::BoxFuture;

    struct Leaf;

    #[async_trait::async_trait]
    impl Resolvable for Leaf {
        fn type_name() -> &'static str {
            "Leaf"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "value",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Scalar(Primitive::Int),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(
            &self,
            _ctx: &FieldCallContext<'_>,
            _position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::Int(1))
        }
    }

    fn leaf_fields() -> &'static [FieldSpec] {
        Leaf::field_specs()
    }

    struct Embedder;

    #[async_trait::async_trait]
    impl Resolvable for Embedder {
        fn type_name() -> &'static str {
            "Embedder"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "Leaf",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Record(|| RecordShape::of::<Leaf>()),
                embedded: true,
            }];
            FIELDS
        }
        async fn resolve_field(
            &self,
            ctx: &FieldCallContext<'_>,
            position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            let _ = (ctx, position);
            unreachable!()
        }
    }

    #[test]
    fn flattens_embedded_member_with_path() {
        let _ = leaf_fields();
        let root = RecordShape::of::<Embedder>();
        let index = ResolverIndex::build(&[root], true).unwrap();
        let embedder = index.type_of("Embedder").unwrap();
        let entry = embedder.fields.get("value").unwrap();
        assert_eq!(entry.embed_path, vec![0]);
        assert_eq!(entry.descriptor.position, 0);
        assert!(index.type_of("Leaf").is_none());
    }

    struct WithFunction;

    #[async_trait::async_trait]
    impl Resolvable for WithFunction {
        fn type_name() -> &'static str {
            "WithFunction"
        }
        fn field_specs() -> &'static [FieldSpec] {
            static FIELDS: &[FieldSpec] = &[FieldSpec {
                rust_name: "compute",
                tag: "f,args(a)",
                legacy_tag: None,
                shape: ShapeHint::Function(crate::shape::FunctionShape {
                    has_context: false,
                    has_error: false,
                    params: vec![ShapeHint::Scalar(Primitive::Int)],
                    ret: Box::new(ShapeHint::Scalar(Primitive::Int)),
                }),
                embedded: false,
            }];
            FIELDS
        }
        async fn resolve_field(
            &self,
            _ctx: &FieldCallContext<'_>,
            _position: usize,
        ) -> Result<ResolvedValue, FieldError> {
            Ok(ResolvedValue::Int(1))
        }
    }

    #[test]
    fn callable_field_gets_a_cache_slot_when_enabled() {
        let root = RecordShape::of::<WithFunction>();
        let index = ResolverIndex::build(&[root], true).unwrap();
        let t = index.type_of("WithFunction").unwrap();
        assert!(t.fields.get("f").unwrap().cache_slot.is_some());
    }

    #[test]
    fn callable_field_has_no_slot_when_switch_is_off() {
        let root = RecordShape::of::<WithFunction>();
        let index = ResolverIndex::build(&[root], false).unwrap();
        let t = index.type_of("WithFunction").unwrap();
        assert!(t.fields.get("f").unwrap().cache_slot.is_none());
    }

    fn self_ref_shape() -> RecordShape {
        RecordShape {
            type_name: "SelfRef",
            fields: std::sync::Arc::new(vec![FieldSpec {
                rust_name: "Me",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::Record(self_ref_shape),
                embedded: false,
            }]),
            resolve: |_, _, _| -> BoxFuture<'static, Result<ResolvedValue, FieldError>> {
                Box::pin(async { unreachable!() })
            },
        }
    }

    #[test]
    fn direct_self_reference_without_boundary_is_rejected() {
        let root = self_ref_shape();
        assert!(ResolverIndex::build(&[root], true).is_err());
    }

    fn listed_self_ref_shape() -> RecordShape {
        RecordShape {
            type_name: "ListedSelfRef",
            fields: std::sync::Arc::new(vec![FieldSpec {
                rust_name: "Children",
                tag: "",
                legacy_tag: None,
                shape: ShapeHint::List(Box::new(ShapeHint::Record(listed_self_ref_shape))),
                embedded: false,
            }]),
            resolve: |_, _, _| -> BoxFuture<'static, Result<ResolvedValue, FieldError>> {
                Box::pin(async { unreachable!() })
            },
        }
    }

    #[test]
    fn list_boundary_permits_self_reference() {
        let root = listed_self_ref_shape();
        let index = ResolverIndex::build(&[root], true).unwrap();
        assert!(index.type_of("ListedSelfRef").is_some());
    }
}
