//! Benchmarks for leaf-to-root propagation.
//!
//! Run with: cargo bench -p sigform-core

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use sigform_core::{DeepSignal, Field, NodeTree, Patch, SigForm, Value};
use std::hint::black_box;

/// A chain of `depth` nested fields; returns the form and the deepest leaf.
fn nested_form(depth: usize) -> (SigForm, NodeTree, Vec<Field>) {
    let form = SigForm::default();
    let tree = NodeTree::new();
    let mut parent = tree.root(form.marker());
    let mut fields = Vec::with_capacity(depth);
    for level in 0..depth {
        let node = tree.append(parent, Some(&format!("l{level}")));
        let default = (level + 1 == depth).then(|| Value::from(0));
        fields.push(form.mount_field(tree.anchor(node), default));
        parent = node;
    }
    form.settle().expect("form settles");
    (form, tree, fields)
}

fn bench_leaf_edit(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/leaf_edit");

    for depth in [1, 3, 6, 12] {
        let (form, _tree, fields) = nested_form(depth);
        let leaf = fields.last().expect("leaf field").clone();
        let mut n = 0i64;
        group.bench_with_input(BenchmarkId::new("depth", depth), &leaf, |b, leaf| {
            b.iter(|| {
                n += 1;
                leaf.set(n);
                black_box(form.value())
            })
        });
    }

    group.finish();
}

fn bench_batched_siblings(c: &mut Criterion) {
    let mut group = c.benchmark_group("propagation/batched_siblings");

    for width in [4, 16, 64] {
        let form = SigForm::default();
        let tree = NodeTree::new();
        let root = tree.root(form.marker());
        let fields: Vec<Field> = (0..width)
            .map(|i| {
                let node = tree.append(root, Some(&format!("f{i}")));
                form.mount_field(tree.anchor(node), Some(Value::from(0)))
            })
            .collect();
        form.settle().expect("form settles");

        let mut n = 0i64;
        group.bench_with_input(BenchmarkId::new("width", width), &fields, |b, fields| {
            b.iter(|| {
                n += 1;
                form.batch(|| fields.iter().for_each(|field| field.set(n)));
            })
        });
    }

    group.finish();
}

fn bench_apply_patches(c: &mut Criterion) {
    let mut group = c.benchmark_group("deep/apply_patches");
    let doc = Value::from(json!({
        "user": {"name": "Taro", "tags": ["a", "b", "c"]},
        "todos": [{"id": 1, "done": false}, {"id": 2, "done": true}],
    }));
    let cell = DeepSignal::wrap(doc);
    let mut flip = false;

    group.bench_function("local_leaf_write", |b| {
        b.iter(|| {
            flip = !flip;
            let patch = Patch::replace(
                vec!["todos".into(), "1".into(), "done".into()],
                Value::from(flip),
            );
            cell.apply_patches(black_box(&[patch])).expect("patch applies")
        })
    });

    group.finish();
}

criterion_group!(benches, bench_leaf_edit, bench_batched_siblings, bench_apply_patches);
criterion_main!(benches);
