//! Benchmarks for doc-comment tokenizing and annotation parsing.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, criterion_group, criterion_main};
use phpantom_meta::annotations::{
    AnnotationClass, AnnotationRegistry, DocParser, IgnoredNames, ImportTable, tokenize,
};

const ENTITY_DOC: &str = r#"/**
 * A mapped entity.
 *
 * @ORM\Entity(repositoryClass="App\Repository\UserRepository")
 * @ORM\Table(name="users", indexes={@ORM\Index(name="email_idx", columns={"email"})})
 * @author Someone
 */"#;

const JOIN_TABLE_DOC: &str = r#"/**
 * @ManyToMany(targetEntity="Group")
 * @JoinTable(name="users_groups",
 *      joinColumns={@JoinColumn(name="user_id", referencedColumnName="id")},
 *      inverseJoinColumns={@JoinColumn(name="group_id", referencedColumnName="id", unique=true)}
 * )
 * @var Group[]
 */"#;

fn registry() -> Arc<AnnotationRegistry> {
    let mut registry = AnnotationRegistry::new();
    for name in [
        "Doctrine\\ORM\\Mapping\\Entity",
        "Doctrine\\ORM\\Mapping\\Table",
        "Doctrine\\ORM\\Mapping\\Index",
        "Doctrine\\ORM\\Mapping\\ManyToMany",
        "Doctrine\\ORM\\Mapping\\JoinTable",
        "Doctrine\\ORM\\Mapping\\JoinColumn",
    ] {
        registry.register(AnnotationClass::new(name));
    }
    Arc::new(registry)
}

fn parser() -> DocParser {
    DocParser::new(registry())
        .with_imports(ImportTable::from_entries([
            ("orm", "Doctrine\\ORM\\Mapping"),
            ("manytomany", "Doctrine\\ORM\\Mapping\\ManyToMany"),
            ("jointable", "Doctrine\\ORM\\Mapping\\JoinTable"),
            ("joincolumn", "Doctrine\\ORM\\Mapping\\JoinColumn"),
        ]))
        .with_ignored_names(IgnoredNames::defaults())
}

fn bench_tokenize(c: &mut Criterion) {
    c.bench_function("tokenize_join_table", |b| {
        b.iter(|| black_box(tokenize(black_box(JOIN_TABLE_DOC))));
    });
}

fn bench_parse_entity(c: &mut Criterion) {
    let parser = parser();
    c.bench_function("parse_entity_doc", |b| {
        b.iter(|| {
            let annotations = parser.parse(black_box(ENTITY_DOC), "class User").unwrap();
            black_box(annotations)
        });
    });
}

fn bench_parse_join_table(c: &mut Criterion) {
    let parser = parser();
    c.bench_function("parse_join_table_doc", |b| {
        b.iter(|| {
            let annotations = parser
                .parse(black_box(JOIN_TABLE_DOC), "property User::$groups")
                .unwrap();
            black_box(annotations)
        });
    });
}

criterion_group!(
    benches,
    bench_tokenize,
    bench_parse_entity,
    bench_parse_join_table
);
criterion_main!(benches);
