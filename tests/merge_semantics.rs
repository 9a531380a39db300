//! Merge semantics shared by every provider shape: deep-merged mappings,
//! replaced sequences, explicit-null erasure, anchors with native merge
//! keys, and the strict/permissive split.

use std::collections::HashMap;

use anyhow::Result;
use rstest::rstest;
use serde::Deserialize;
use strata::{ErrorKind, Node, Provider, ROOT};

const BASE: &str = "
nothing: ~
fun:
  - maserati
  - porsche
practical: &ptr
  toyota: camry
  honda: accord
antique_scalar: model_t
antique_sequence:
  - model_t
antique_mapping_empty:
  ford: model_t
antique_mapping_nil:
  ford: model_t
occupants:
  honda:
    driver: jane
    backseat: [nate]
extra_practical:
  <<: *ptr
  volkswagon: jetta
";

const OVERRIDE: &str = "
fun:
  - maserati
  - lamborghini
practical:
  honda: civic
  nissan: altima
antique_scalar: ~
antique_sequence: ~
antique_mapping_empty: {}
antique_mapping_nil: ~
occupants:
  honda:
    passenger: arthur
    backseat: [nora]
";

#[derive(Debug, Clone, Copy)]
enum Kind {
    Strict,
    Permissive,
    Static,
    Grouped,
}

fn provider(kind: Kind) -> Provider {
    match kind {
        Kind::Strict => Provider::builder()
            .source(BASE.as_bytes())
            .source(OVERRIDE.as_bytes())
            .build()
            .expect("couldn't build strict provider"),
        Kind::Permissive => Provider::builder()
            .source(BASE.as_bytes())
            .source(OVERRIDE.as_bytes())
            .permissive()
            .build()
            .expect("couldn't build permissive provider"),
        Kind::Static => {
            // Exercise in-memory sources with the same suite: round each
            // document through a provider to obtain a serializable tree.
            let base: Node = Provider::builder()
                .source(BASE.as_bytes())
                .build()
                .expect("couldn't parse base")
                .get(ROOT)
                .populate()
                .expect("couldn't copy base");
            let layered: Node = Provider::builder()
                .source(OVERRIDE.as_bytes())
                .build()
                .expect("couldn't parse override")
                .get(ROOT)
                .populate()
                .expect("couldn't copy override");
            Provider::builder()
                .static_source(&base)
                .static_source(&layered)
                .build()
                .expect("couldn't build static provider")
        }
        Kind::Grouped => {
            let base = Provider::builder()
                .source(BASE.as_bytes())
                .build()
                .expect("couldn't build base provider");
            let layered = Provider::builder()
                .source(OVERRIDE.as_bytes())
                .build()
                .expect("couldn't build override provider");
            Provider::group("grouped", [base, layered]).expect("couldn't group providers")
        }
    }
}

#[rstest]
fn missing_paths_have_no_value(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let provider = provider(kind);
    for path in ["not_a_key", "practical.cadillac", "fun.not_there"] {
        let value = provider.get(path);
        assert!(!value.has_value(), "path {path} should be missing");
        let s: String = value.populate()?;
        assert_eq!(s, "", "path {path} should populate to empty");
    }
    Ok(())
}

#[rstest]
fn explicit_null_is_a_value(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let value = provider(kind).get("nothing");
    assert!(value.has_value());
    assert_eq!(value.value(), Node::Null);
    let s: String = value.populate()?;
    assert_eq!(s, "");
    Ok(())
}

#[rstest]
fn scalars_survive_merging(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let s: String = provider(kind).get("practical.toyota").populate()?;
    assert_eq!(s, "camry");
    Ok(())
}

#[rstest]
fn mappings_deep_merge(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let m: HashMap<String, String> = provider(kind).get("practical").populate()?;
    let expected: HashMap<String, String> = [
        ("toyota", "camry"),
        ("honda", "civic"),
        ("nissan", "altima"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    assert_eq!(m, expected);
    Ok(())
}

#[rstest]
fn sequences_are_replaced(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let s: Vec<String> = provider(kind).get("fun").populate()?;
    assert_eq!(s, ["maserati", "lamborghini"]);
    Ok(())
}

#[rstest]
fn structs_assemble_across_sources(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Occupants {
        #[serde(default)]
        driver: String,
        #[serde(default)]
        passenger: String,
        #[serde(default)]
        backseat: Vec<String>,
    }

    let o: Occupants = provider(kind).get("occupants.honda").populate()?;
    assert_eq!(
        o,
        Occupants {
            driver: "jane".into(),
            passenger: "arthur".into(),
            backseat: vec!["nora".into()],
        }
    );
    Ok(())
}

#[rstest]
fn null_erases_scalars_sequences_and_mappings(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let provider = provider(kind);

    let scalar = provider.get("antique_scalar");
    assert!(scalar.has_value());
    assert_eq!(scalar.value(), Node::Null);
    let s: String = scalar.populate()?;
    assert_eq!(s, "");

    let sequence = provider.get("antique_sequence");
    assert_eq!(sequence.value(), Node::Null);
    let s: Vec<String> = sequence.populate()?;
    assert!(s.is_empty());

    let mapping = provider.get("antique_mapping_nil");
    assert_eq!(mapping.value(), Node::Null);
    let m: HashMap<String, String> = mapping.populate()?;
    assert!(m.is_empty());
    Ok(())
}

#[rstest]
fn empty_mapping_merges_as_a_no_op(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let m: HashMap<String, String> = provider(kind).get("antique_mapping_empty").populate()?;
    assert_eq!(m, HashMap::from([("ford".to_owned(), "model_t".to_owned())]));
    Ok(())
}

#[rstest]
fn anchors_and_native_merge_keys_resolve(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let m: HashMap<String, String> = provider(kind).get("extra_practical").populate()?;
    let expected: HashMap<String, String> = [
        ("toyota", "camry"),
        ("honda", "accord"),
        ("volkswagon", "jetta"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    assert_eq!(m, expected);
    Ok(())
}

#[rstest]
fn handles_nest_with_repeated_gets(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    let s: String = provider(kind)
        .get("occupants")
        .get("honda")
        .get("driver")
        .populate()?;
    assert_eq!(s, "jane");
    Ok(())
}

#[rstest]
fn renamed_fields_follow_their_alias(
    #[values(Kind::Strict, Kind::Permissive, Kind::Static, Kind::Grouped)] kind: Kind,
) -> Result<()> {
    #[derive(Debug, Deserialize)]
    struct Practical {
        toyota: String,
        #[allow(dead_code)]
        honda: String,
        #[serde(rename = "nissan")]
        datsun: String,
    }

    let c: Practical = provider(kind).get("practical").populate()?;
    assert_eq!(c.toyota, "camry");
    assert_eq!(c.datsun, "altima");
    Ok(())
}

#[test]
fn strict_mode_rejects_type_mismatched_merges() {
    let err = Provider::builder()
        .source("mismatch: foo".as_bytes())
        .source("mismatch: [foo]".as_bytes())
        .build()
        .expect_err("strict construction succeeded");
    assert_eq!(err.kind(), ErrorKind::MergeTypeMismatch);
    assert!(err.to_string().contains("couldn't merge"), "got: {err}");
    assert!(
        err.to_string().contains("can't merge a sequence into a scalar"),
        "got: {err}"
    );
}

#[test]
fn permissive_mode_prefers_the_higher_layer_on_mismatch() {
    let provider = Provider::builder()
        .source("mismatch: foo".as_bytes())
        .source("mismatch: [foo]".as_bytes())
        .permissive()
        .build()
        .expect("permissive construction failed");
    let s: Vec<String> = provider
        .get("mismatch")
        .populate()
        .expect("populate failed");
    assert_eq!(s, ["foo"]);
}

#[test]
fn strict_mode_rejects_duplicate_keys() {
    let err = Provider::builder()
        .source("dupe: foo\ndupe: bar".as_bytes())
        .build()
        .expect_err("strict construction succeeded");
    assert_eq!(err.kind(), ErrorKind::DuplicateKey);
    assert!(
        err.to_string().contains(r#"key "dupe" already set in map"#),
        "got: {err}"
    );
}

#[test]
fn permissive_mode_lets_the_last_duplicate_win() {
    let provider = Provider::builder()
        .source("dupe: foo\ndupe: bar".as_bytes())
        .permissive()
        .build()
        .expect("permissive construction failed");
    let s: String = provider.get("dupe").populate().expect("populate failed");
    assert_eq!(s, "bar");
}

#[test]
fn empty_and_comment_only_sources_are_skipped() {
    let full = "foo: bar";
    let cases: &[(&[&str], Option<&str>)] = &[
        (&[], None),
        (&["", full], Some("bar")),
        (&[full, ""], Some("bar")),
        (&["", ""], None),
        (&["# just a comment", full], Some("bar")),
        (&[full, "# just a comment"], Some("bar")),
        (&["", "# just a comment"], None),
    ];

    for (sources, expected) in cases {
        let mut builder = Provider::builder();
        for source in *sources {
            builder = builder.source(source.as_bytes());
        }
        let provider = builder.build().expect("construction failed");
        let value = provider.get("foo");
        assert_eq!(value.has_value(), expected.is_some(), "sources: {sources:?}");
        let s: String = value.populate().expect("populate failed");
        assert_eq!(s, expected.unwrap_or(""), "sources: {sources:?}");

        // A provider with no content still accepts defaults.
        let defaulted = provider
            .get("not_there")
            .with_default(&42)
            .expect("couldn't set default");
        let n: i64 = defaulted.populate().expect("populate failed");
        assert_eq!(n, 42);
    }
}

#[test]
fn null_sources_erase_but_empty_sources_do_not() {
    let full = "foo: bar";

    let provider = Provider::builder()
        .source("~".as_bytes())
        .source("".as_bytes())
        .source(full.as_bytes())
        .build()
        .expect("construction failed");
    let s: String = provider.get("foo").populate().expect("populate failed");
    assert_eq!(s, "bar");

    let provider = Provider::builder()
        .source(full.as_bytes())
        .source("".as_bytes())
        .source("~".as_bytes())
        .build()
        .expect("construction failed");
    assert_eq!(provider.get("foo").value(), Node::Null);

    // With an explicit null on top, defaults have no effect anywhere.
    let defaulted = provider
        .get("not_there")
        .with_default(&42)
        .expect("couldn't set default");
    assert_eq!(defaulted.value(), Node::Null);
}

#[test]
fn grouping_behaves_like_merging_the_same_sources() {
    let member = |text: &str| {
        Provider::builder()
            .source(std::io::Cursor::new(text.to_owned()))
            .build()
            .expect("couldn't build member")
    };

    let grouped = Provider::group(
        "global",
        [member("foo: bar"), member(""), member("foo: quux")],
    )
    .expect("couldn't group providers");
    assert_eq!(grouped.name(), "global");
    let s: String = grouped.get("foo").populate().expect("populate failed");
    assert_eq!(s, "quux");

    // A null member erases, and defaults stay underneath it.
    let erased = Provider::group("global", [member("foo: bar"), member("~")])
        .expect("couldn't group providers");
    assert_eq!(erased.get("foo").value(), Node::Null);
    let defaulted = erased
        .get("not_there")
        .with_default(&42)
        .expect("couldn't set default");
    assert_eq!(defaulted.value(), Node::Null);

    // A group of empty members is itself empty, but accepts defaults.
    let empty = Provider::group("global", [member(""), member("# comment")])
        .expect("couldn't group providers");
    assert!(!empty.get(ROOT).has_value());
    let defaulted = empty
        .get("not_there")
        .with_default(&42)
        .expect("couldn't set default");
    let n: i64 = defaulted.populate().expect("populate failed");
    assert_eq!(n, 42);
}
