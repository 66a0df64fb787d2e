//! Benchmarks for schema compilation and validation
//!
//! Measures:
//! - Full compilation of a schema with abstract patterns
//! - Validation of documents of growing size with a cached validator

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use schematron::prelude::*;

const SCHEMA: &str = r#"<schema xmlns="http://purl.oclc.org/dsdl/schematron">
  <let name="max" value="100"/>
  <pattern abstract="true" id="positive">
    <rule context="$element">
      <assert test="number($attr) &gt; 0"><name/> must have a positive <value-of select="'$attr'"/></assert>
    </rule>
  </pattern>
  <pattern is-a="positive" id="qty">
    <param name="element" value="item"/>
    <param name="attr" value="@qty"/>
  </pattern>
  <pattern id="limits">
    <rule context="item">
      <assert test="@qty &lt;= $max">Quantity over <value-of select="$max"/></assert>
      <report test="@legacy">Legacy item</report>
    </rule>
  </pattern>
</schema>"#;

fn document(items: usize) -> String {
    let mut xml = String::from("<order>");
    for i in 0..items {
        xml.push_str(&format!(r#"<item sku="s{}" qty="{}"/>"#, i, i % 120));
    }
    xml.push_str("</order>");
    xml
}

fn compile_schema(c: &mut Criterion) {
    let mut group = c.benchmark_group("compile");

    group.bench_function("schema", |b| {
        b.iter(|| black_box(Schematron::new(Source::from_xml(SCHEMA)).unwrap()));
    });

    group.bench_function("schema_and_validator", |b| {
        b.iter(|| {
            let compiled = Schematron::new(Source::from_xml(SCHEMA)).unwrap();
            black_box(compiled.create_validator().unwrap())
        });
    });

    group.finish();
}

fn validate_documents(c: &mut Criterion) {
    let mut group = c.benchmark_group("validate");
    let compiled = Schematron::new(Source::from_xml(SCHEMA)).unwrap();
    let validator = compiled.create_validator().unwrap();

    for items in [10usize, 100, 1000] {
        let doc = Document::parse(&document(items), None).unwrap();
        group.bench_with_input(BenchmarkId::new("items", items), &doc, |b, doc| {
            b.iter(|| black_box(validator.validate_document(doc, None).unwrap()));
        });
    }

    group.finish();
}

criterion_group!(benches, compile_schema, validate_documents);
criterion_main!(benches);
