//! Integration tests for specification composition and compilation.

mod common;

use common::{Grant, Permission, ids, permissions};
use pretty_assertions::assert_eq;
use sift::prelude::*;
use sift::{CacheStats, Expr, PredicateCache, QueryResult, Subject};

fn spec<F>(build: F) -> Specification<Permission>
where
    F: FnOnce(&Subject<Permission>) -> QueryResult<Condition>,
{
    Specification::build(build).unwrap()
}

fn samples() -> Vec<Specification<Permission>> {
    vec![
        spec(|x| Ok(x.property("Name")?.contains("can"))),
        spec(|x| Ok(x.property("Level")?.gte(3))),
        spec(|x| Ok(x.property("Active")?.is_true())),
        spec(|x| Ok(x.property("Roles")?.overlaps([4i64]))),
        Specification::always(),
        Specification::never(),
    ]
}

fn truth(spec: &Specification<Permission>, rows: &[Permission]) -> Vec<bool> {
    rows.iter().map(|row| spec.is_satisfied_by(row).unwrap()).collect()
}

#[test]
fn test_and_or_match_boolean_operators() {
    let rows = permissions();
    for a in samples() {
        for b in samples() {
            let and = a.and(&b);
            let or = a.or(&b);
            for row in &rows {
                let (x, y) = (a.is_satisfied_by(row).unwrap(), b.is_satisfied_by(row).unwrap());
                assert_eq!(and.is_satisfied_by(row).unwrap(), x && y, "{} AND {}", a, b);
                assert_eq!(or.is_satisfied_by(row).unwrap(), x || y, "{} OR {}", a, b);
            }
        }
    }
}

#[test]
fn test_double_negation() {
    let rows = permissions();
    for a in samples() {
        assert_eq!(truth(&a.not().not(), &rows), truth(&a, &rows));
        assert_eq!(
            truth(&a.not(), &rows),
            truth(&a, &rows).into_iter().map(|b| !b).collect::<Vec<_>>()
        );
    }
}

#[test]
fn test_associative_and_commutative() {
    let rows = permissions();
    let specs = samples();
    let (a, b, c) = (&specs[0], &specs[1], &specs[3]);

    assert_eq!(truth(&a.and(b).and(c), &rows), truth(&a.and(&b.and(c)), &rows));
    assert_eq!(truth(&a.or(b).or(c), &rows), truth(&a.or(&b.or(c)), &rows));
    assert_eq!(truth(&a.and(b), &rows), truth(&b.and(a), &rows));
    assert_eq!(truth(&a.or(b), &rows), truth(&b.or(a), &rows));
}

#[test]
fn test_rebinding_matches_shared_parameter() {
    let rows = permissions();
    let separate = spec(|x| Ok(x.property("Name")?.starts_with("can")))
        .and(&spec(|y| Ok(y.property("Level")?.lte(3))));
    let shared = spec(|x| {
        Ok(x.property("Name")?
            .starts_with("can")
            .and(x.property("Level")?.lte(3)))
    });

    assert_eq!(truth(&separate, &rows), truth(&shared, &rows));
    assert_eq!(ids(separate.filter_slice(&rows).unwrap()), vec![1, 2]);
    assert_eq!(separate.to_string(), shared.to_string());
}

#[test]
fn test_all_and_any() {
    let rows = permissions();
    let specs = samples();

    let all = Specification::all(&specs[..2]);
    assert_eq!(ids(all.filter_slice(&rows).unwrap()), vec![1, 3]);

    let any = Specification::any(&specs[..2]);
    assert_eq!(ids(any.filter_slice(&rows).unwrap()), vec![1, 2, 3, 4, 7, 9]);

    let none: &[Specification<Permission>] = &[];
    assert_eq!(Specification::all(none).filter_slice(&rows).unwrap().len(), 9);
    assert!(Specification::any(none).filter_slice(&rows).unwrap().is_empty());
}

#[test]
fn test_tree_round_trip() {
    let original = spec(|x| Ok(x.property("Id")?.gt(6)));
    let tree: PredicateTree<Permission> = original.clone().into();
    let back = Specification::from(tree.clone());

    assert_eq!(back.tree().id(), tree.id());
    assert_eq!(back.to_string(), "x => (x.Id > 6)");
    assert_eq!(ids(back.filter_slice(&permissions()).unwrap()), vec![7, 8, 9]);
}

#[test]
fn test_lifting_onto_parent() {
    let privileged = spec(|x| Ok(x.property("Level")?.gte(4)));
    let for_ops = Specification::<Grant>::build(|g| Ok(g.property("Grantee")?.eq("ops"))).unwrap();

    let grants: Vec<Grant> = permissions()
        .into_iter()
        .enumerate()
        .map(|(i, permission)| Grant {
            grantee: if i % 2 == 0 { "ops".into() } else { "dev".into() },
            permission,
        })
        .collect();

    let lifted = privileged
        .from_parent("permission", |g: &Grant| &g.permission)
        .unwrap()
        .and(&for_ops);

    let matched: Vec<i64> = lifted
        .filter_slice(&grants)
        .unwrap()
        .into_iter()
        .map(|g| g.permission.id)
        .collect();
    assert_eq!(matched, vec![3, 7, 9]);
}

#[test]
fn test_lifting_through_derived_view() {
    let long_name = spec(|x| Ok(x.property("Name")?.ends_with("User")));
    let lifted = long_name
        .from_derived("as_permission", |g: &Grant| g.permission.clone())
        .unwrap();

    let grant = Grant {
        grantee: "ops".into(),
        permission: Permission::new(42, "canEditUser", None, &[]),
    };
    assert!(lifted.is_satisfied_by(&grant).unwrap());
}

#[test]
fn test_opaque_tests_evaluate_but_do_not_lift() {
    let odd = spec(|x| x.test("odd_id", |p: &Permission| p.id % 2 == 1));
    assert_eq!(ids(odd.filter_slice(&permissions()).unwrap()), vec![1, 3, 5, 7, 9]);

    let err = odd.from_parent("permission", |g: &Grant| &g.permission).unwrap_err();
    assert!(err.is_unsupported_node());
}

#[test]
fn test_private_cache_compiles_each_tree_once() {
    let cache = PredicateCache::new();
    let a = spec(|x| Ok(x.property("Level")?.between(2, 4)));

    let first = cache.compile(a.tree()).unwrap();
    let second = cache.compile(a.clone().tree()).unwrap();
    assert!(first.ptr_eq(&second));
    assert_eq!(cache.stats(), CacheStats { hits: 1, misses: 1, compilations: 1 });

    let rebuilt = spec(|x| Ok(x.property("Level")?.between(2, 4)));
    cache.compile(rebuilt.tree()).unwrap();
    assert_eq!(cache.stats().compilations, 2);

    let rows = permissions();
    let results: Vec<bool> = rows.iter().map(|p| first.call(p)).collect();
    assert_eq!(results, truth(&a, &rows));
}

#[test]
fn test_compiled_with_memoizes() {
    let cache = PredicateCache::new();
    let a = spec(|x| Ok(x.property("Id")?.lt(3)));

    let first = a.compiled_with(&cache).unwrap();
    let again = a.compiled_with(&cache).unwrap();
    assert!(first.ptr_eq(&again));
    assert_eq!(cache.stats().misses + cache.stats().hits, 1);
}

#[test]
fn test_tree_with_foreign_parameter_is_rejected() {
    let borrowed = spec(|x| Ok(x.property("Id")?.eq(1)));
    let stranger = sift::Parameter::new::<Permission>("y");

    let tree = PredicateTree::<Permission>::from_parts(stranger, borrowed.tree().body().clone()).unwrap();
    let err = PredicateCache::new().compile(&tree).unwrap_err();
    assert!(err.is_invalid_tree());

    let wrong_entity = sift::Parameter::new::<Grant>("x");
    let err = PredicateTree::<Permission>::from_parts(wrong_entity, Expr::boolean(true)).unwrap_err();
    assert!(err.is_invalid_tree());
}
