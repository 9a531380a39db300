//! Dotted-path addressing: flattened literal keys, literal-vs-nested
//! collisions where the longest literal path wins, and keys that are
//! nothing but dots.

use std::collections::HashMap;

use anyhow::Result;
use serde::Deserialize;
use strata::{Provider, ROOT};

#[derive(Debug, Deserialize, PartialEq, Default)]
struct Composer {
    #[serde(default)]
    s: String,
    #[serde(default)]
    i: i64,
}

#[derive(Debug, Deserialize, PartialEq, Default)]
struct Outer {
    #[serde(default)]
    b: Composer,
}

#[test]
fn flattened_keys_populate_nested_structs() -> Result<()> {
    let provider = Provider::builder()
        .source("a.b.s: Beethoven\na.b.i: 1770\n".as_bytes())
        .permissive()
        .build()?;

    let a: Outer = provider.get("a").populate()?;
    assert_eq!(a.b.s, "Beethoven");
    assert_eq!(a.b.i, 1770);
    Ok(())
}

#[test]
fn longest_literal_path_wins_on_collision() -> Result<()> {
    let provider = Provider::builder()
        .source("a:\n  b:\n    s: Mozart\n    i: 1756\na.b:\n  i: 1791\n".as_bytes())
        .permissive()
        .build()?;

    let a: Outer = provider.get("a").populate()?;
    assert_eq!(a.b.i, 1791, "literal a.b should shadow the nested i");
    assert_eq!(a.b.s, "Mozart", "missing literal keys fall back to nesting");
    Ok(())
}

#[test]
fn dotted_keys_combine_across_sources() -> Result<()> {
    let base = "a:\n  b:\n    s: Chopin\n    i: 1810\n";
    let development = "a.b:\n  s: Liszt\na.b.i: 1811\n";
    let provider = Provider::builder()
        .source(base.as_bytes())
        .source(development.as_bytes())
        .permissive()
        .build()?;

    let a: Outer = provider.get("a").populate()?;
    assert_eq!(a.b.i, 1811);
    assert_eq!(a.b.s, "Liszt");
    Ok(())
}

#[test]
fn dot_only_keys_stay_addressable() -> Result<()> {
    let provider = Provider::builder()
        .source("'.': '.'\n'..': '..'\n'...': 3\n".as_bytes())
        .build()?;

    let s: String = provider.get(".").populate()?;
    assert_eq!(s, ".");
    let s: String = provider.get("..").populate()?;
    assert_eq!(s, "..");
    let n: i64 = provider.get("...").populate()?;
    assert_eq!(n, 3);
    Ok(())
}

#[test]
fn dotted_literal_keys_list_verbatim_in_maps() -> Result<()> {
    let provider = Provider::builder()
        .source("a: b\na.b: c\na.b.c: d\na.b.c.d: e\n".as_bytes())
        .build()?;

    let m: HashMap<String, String> = provider.get(ROOT).populate()?;
    let expected: HashMap<String, String> = [
        ("a", "b"),
        ("a.b", "c"),
        ("a.b.c", "d"),
        ("a.b.c.d", "e"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_owned(), v.to_owned()))
    .collect();
    assert_eq!(m, expected);
    Ok(())
}

#[test]
fn root_sentinel_returns_the_whole_tree() -> Result<()> {
    let provider = Provider::builder()
        .source("appid: keyvalue\nmodules:\n  rpc:\n    bind: ':28941'\n".as_bytes())
        .build()?;

    let value = provider.get(ROOT);
    assert!(value.has_value());
    let m: HashMap<String, strata::Node> = value.populate()?;
    assert!(m.contains_key("appid"));

    let bind: String = provider.get("modules.rpc.bind").populate()?;
    assert_eq!(bind, ":28941");
    Ok(())
}
