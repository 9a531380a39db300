//! File sources: lazy opening at build time, merge order against other
//! sources, the raw tag, and I/O failure reporting.

use std::io::Write;

use anyhow::Result;
use strata::{ErrorKind, Provider};
use tempfile::NamedTempFile;

fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("couldn't create temp file");
    file.write_all(contents.as_bytes())
        .expect("couldn't write temp file");
    file.flush().expect("couldn't flush temp file");
    file
}

#[test]
fn files_merge_in_declaration_order() -> Result<()> {
    let base = write_file("practical:\n  toyota: camry\n  honda: accord\n");
    let overlay = write_file("practical:\n  honda: civic\n");

    let provider = Provider::builder()
        .file(base.path())
        .file(overlay.path())
        .build()?;

    let honda: String = provider.get("practical.honda").populate()?;
    assert_eq!(honda, "civic");
    let toyota: String = provider.get("practical.toyota").populate()?;
    assert_eq!(toyota, "camry");
    Ok(())
}

#[test]
fn files_and_readers_share_one_priority_order() -> Result<()> {
    let file = write_file("zone: file\nonly_file: file-only\n");
    let provider = Provider::builder()
        .file(file.path())
        .source("zone: reader\n".as_bytes())
        .build()?;

    let zone: String = provider.get("zone").populate()?;
    assert_eq!(zone, "reader");
    let only: String = provider.get("only_file").populate()?;
    assert_eq!(only, "file-only");
    Ok(())
}

#[test]
fn raw_files_bypass_expansion() -> Result<()> {
    let secrets = write_file("secret: abc$ZONE\n");
    let provider = Provider::builder()
        .source("zone: $ZONE".as_bytes())
        .raw_file(secrets.path())
        .expand(|key| (key == "ZONE").then(|| "west1".to_owned()))
        .build()?;

    let zone: String = provider.get("zone").populate()?;
    assert_eq!(zone, "west1");
    let secret: String = provider.get("secret").populate()?;
    assert_eq!(secret, "abc$ZONE");
    Ok(())
}

#[test]
fn missing_files_fail_construction_with_their_path() {
    let err = Provider::builder()
        .file("/definitely/not/here.yaml")
        .build()
        .expect_err("construction succeeded");
    assert_eq!(err.kind(), ErrorKind::IO);
    assert!(err.to_string().contains("here.yaml"), "got: {err}");
}

#[test]
fn unparsable_files_fail_construction() {
    let broken = write_file("foo: [unclosed\n");
    let err = Provider::builder()
        .file(broken.path())
        .build()
        .expect_err("construction succeeded");
    assert_eq!(err.kind(), ErrorKind::ParseFailure);
}
