//! `with_default` semantics: the default joins the merge as the lowest
//! priority layer, so every existing source, including an explicit null,
//! overrides it.

use std::collections::HashMap;

use anyhow::Result;
use rstest::rstest;
use serde::{Deserialize, Serialize};
use strata::{ErrorKind, Provider};

const BASE: &str = "
nothing: ~
fun:
  - maserati
  - lamborghini
practical:
  toyota: camry
  honda: civic
  nissan: altima
library:
  author: Dreiser
  title: The Financier
";

fn provider() -> Provider {
    Provider::builder()
        .source(BASE.as_bytes())
        .build()
        .expect("couldn't build provider")
}

#[test]
fn defaults_fill_missing_values() -> Result<()> {
    let value = provider().get("not_there").with_default(&"something")?;
    assert!(value.has_value());
    let s: String = value.populate()?;
    assert_eq!(s, "something");
    Ok(())
}

#[test]
fn existing_scalars_override_defaults() -> Result<()> {
    let value = provider().get("practical.honda").with_default(&"CRV")?;
    let s: String = value.populate()?;
    assert_eq!(s, "civic");
    Ok(())
}

#[test]
fn explicit_null_overrides_defaults() -> Result<()> {
    let value = provider().get("nothing").with_default(&"something")?;
    assert!(value.has_value());
    let s: String = value.populate()?;
    assert_eq!(s, "");
    Ok(())
}

#[test]
fn mapping_defaults_merge_under_existing_keys() -> Result<()> {
    let default: HashMap<&str, &str> = [("ford", "fiesta"), ("toyota", "corolla")].into();
    let value = provider().get("practical").with_default(&default)?;
    let m: HashMap<String, String> = value.populate()?;
    let expected: HashMap<String, String> = [
        ("toyota", "camry"),
        ("honda", "civic"),
        ("nissan", "altima"),
        ("ford", "fiesta"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    assert_eq!(m, expected);
    Ok(())
}

#[test]
fn sequence_defaults_are_replaced_wholesale() -> Result<()> {
    let value = provider().get("fun").with_default(&["delorean"])?;
    let s: Vec<String> = value.populate()?;
    assert_eq!(s, ["maserati", "lamborghini"]);
    Ok(())
}

#[test]
fn chained_defaults_deep_merge_with_the_newest_lowest() -> Result<()> {
    // Each call re-merges all existing configuration on top of its
    // default, so repeated calls deep-merge the supplied defaults with
    // the last call at the lowest priority.
    let value = provider()
        .get("top")
        .with_default(&HashMap::from([("middle", "bottom")]))?
        .with_default(&HashMap::from([("other_middle", "other_bottom")]))?
        .with_default(&HashMap::from([("other_middle", "should be overwritten")]))?;

    let m: HashMap<String, String> = value.populate()?;
    let expected: HashMap<String, String> = [
        ("middle", "bottom"),
        ("other_middle", "other_bottom"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    assert_eq!(m, expected);
    Ok(())
}

#[test]
fn struct_defaults_fill_only_the_gaps() -> Result<()> {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Library {
        author: String,
        title: String,
        year: u16,
    }

    #[derive(Serialize)]
    struct LibraryDefault {
        title: &'static str,
        year: u16,
    }

    let value = provider().get("library").with_default(&LibraryDefault {
        title: "An American Tragedy",
        year: 1925,
    })?;
    let library: Library = value.populate()?;
    assert_eq!(
        library,
        Library {
            author: "Dreiser".into(),
            title: "The Financier".into(),
            year: 1925,
        }
    );
    Ok(())
}

#[test]
fn strict_mode_rejects_type_mismatched_defaults() {
    let err = provider()
        .get("practical.honda")
        .with_default(&["foo"])
        .expect_err("mismatched default accepted");
    assert_eq!(err.kind(), ErrorKind::MergeTypeMismatch);
    assert!(err.to_string().contains("can't merge"), "got: {err}");
}

#[test]
fn permissive_mode_ignores_type_mismatched_defaults() -> Result<()> {
    let provider = Provider::builder()
        .source("mismatch: foo".as_bytes())
        .permissive()
        .build()?;
    let value = provider.get("mismatch").with_default(&["foo"])?;
    let s: String = value.populate()?;
    assert_eq!(s, "foo");
    Ok(())
}

#[rstest]
#[case::empty_segment("a..b")]
#[case::trailing_dot("a.")]
fn defaults_reject_malformed_paths(#[case] path: &str) {
    let err = provider()
        .get(path)
        .with_default(&1)
        .expect_err("malformed path accepted");
    assert_eq!(err.kind(), ErrorKind::PathSyntax);
}

#[test]
fn defaults_keep_the_handle_path() -> Result<()> {
    let value = provider()
        .get("library")
        .with_default(&HashMap::from([("year", 1912)]))?;
    let year: u16 = value.get("year").populate()?;
    assert_eq!(year, 1912);
    Ok(())
}

#[test]
fn defaults_are_not_subject_to_expansion() -> Result<()> {
    // A default value containing `$` is data, not a reference, even when
    // the provider expands its sources.
    let provider = Provider::builder()
        .source("zone: $ZONE".as_bytes())
        .expand(|key| (key == "ZONE").then(|| "west1".to_owned()))
        .build()?;
    let value = provider.get("secret").with_default(&"abc$ZONE")?;
    let s: String = value.populate()?;
    assert_eq!(s, "abc$ZONE");
    Ok(())
}
