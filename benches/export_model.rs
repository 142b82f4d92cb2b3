//! This bench test exports a large model that references many nodes of a
//! dependency, exercising alias allocation and namespace re-indexing.

#![allow(missing_docs)]

use std::fmt::Write;

use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use uanodeset::{Catalog, export, standard_aliases, storage::xml};

const NODES: u32 = 2_000;

fn nodeset(uri: &str, requires: Option<&str>, body: &str) -> String {
    let (extra, required) = requires.map_or_else(
        || (String::new(), String::new()),
        |dep| {
            (
                format!("<Uri>{dep}</Uri>"),
                format!("<RequiredModel ModelUri=\"{dep}\" />"),
            )
        },
    );
    format!(
        "<UANodeSet><NamespaceUris><Uri>{uri}</Uri>{extra}</NamespaceUris>\
         <Models><Model ModelUri=\"{uri}\">{required}</Model></Models>{body}</UANodeSet>"
    )
}

/// A base model of object types and a dependant model with one instance
/// per type.
fn preseed_catalog() -> Catalog {
    let mut types = String::new();
    let mut instances = String::new();
    for i in 1..=NODES {
        write!(
            types,
            "<UAObjectType NodeId=\"ns=1;i={i}\" BrowseName=\"1:Type{}\"><DisplayName>Type{}</DisplayName></UAObjectType>",
            i % 100,
            i % 100
        )
        .unwrap();
        write!(
            instances,
            "<UAObject NodeId=\"ns=1;i={i}\" BrowseName=\"1:Instance{i}\">\
             <References><Reference ReferenceType=\"i=40\">ns=2;i={i}</Reference>\
             <Reference ReferenceType=\"i=47\" IsForward=\"false\">i=85</Reference></References>\
             <Value><NodeId>ns=2;i={i}</NodeId></Value></UAObject>"
        )
        .unwrap();
    }

    let base = nodeset("urn:bench:base", None, &types);
    let app = nodeset("urn:bench:app", Some("urn:bench:base"), &instances);

    [base, app]
        .iter()
        .flat_map(|document| xml::parse(document).unwrap().models)
        .collect()
}

fn export_model(c: &mut Criterion) {
    let seed = standard_aliases();
    c.bench_function("export model", |b| {
        b.iter_batched(
            preseed_catalog,
            |catalog| {
                let model = catalog.model("urn:bench:app").unwrap();
                export(model, &catalog, Some(&seed)).to_xml().unwrap()
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, export_model);
criterion_main!(benches);
