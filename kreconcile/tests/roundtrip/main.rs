use std::path::Path;

use anyhow::Context;
use kreconcile::{Pipeline, Specification, Written};

datatest_stable::harness! {
    { test = roundtrip, root = "tests/roundtrip/testdata", pattern = r".*\.ya?ml$" },
}

/// Running a filter that changes nothing must leave the file byte for byte as it was.
fn roundtrip(path: &Path) -> datatest_stable::Result<()> {
    let expected = std::fs::read_to_string(path).context("reading fixture")?;

    let dir = tempfile::tempdir()?;
    let pkg = dir.path().join("pkg");
    std::fs::create_dir(&pkg)?;
    let file = pkg.join(path.file_name().context("fixture has no file name")?);
    std::fs::write(&file, &expected)?;

    let noop = Specification::parse("kind: LabelSetter\nlabels: {}\n")?;
    let outcome = tokio::runtime::Runtime::new()?
        .block_on(Pipeline::new(&pkg).specification(noop).run())?;

    let actual = std::fs::read_to_string(&file).context("reading result")?;
    compare(path, &expected, &actual)?;

    if outcome.written != Written::Files(vec![]) {
        return Err(format!("{} was rewritten: {:?}", path.display(), outcome.written).into());
    }
    Ok(())
}

fn compare(path: &Path, expected: &str, actual: &str) -> datatest_stable::Result<()> {
    if expected == actual {
        return Ok(());
    }

    let formatted = format_chunks(dissimilar::diff(expected, actual));
    eprintln!("Round trip mismatch for {}:\n{}", path.display(), formatted);

    Err(format!("Round trip mismatch for {}", path.display()).into())
}

fn format_chunks(chunks: Vec<dissimilar::Chunk>) -> String {
    let mut buf = String::new();
    for chunk in chunks {
        let formatted = match chunk {
            dissimilar::Chunk::Equal(text) => text.into(),
            dissimilar::Chunk::Delete(text) => format!("\x1b[4m\x1b[31m{}\x1b[0m", text),
            dissimilar::Chunk::Insert(text) => format!("\x1b[4m\x1b[32m{}\x1b[0m", text),
        };
        buf.push_str(&formatted);
    }
    buf
}
