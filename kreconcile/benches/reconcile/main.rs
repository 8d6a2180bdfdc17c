use std::path::Path;

use kreconcile::{Pipeline, Specification};

fn main() {
    divan::main();
}

fn replacer() -> Specification {
    Specification::parse("kind: ValueReplacer\nstringMatch: web\nreplace: api\nallFields: true\n").unwrap()
}

fn package(dir: &Path, files: usize, documents: usize) {
    for file in 0..files {
        let text = (0..documents)
            .map(|doc| {
                format!(
                    "# resource {doc}\napiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web-{file}-{doc}\n  labels:\n    app: web\nspec:\n  replicas: 3\n  template:\n    spec:\n      containers:\n      - name: web\n        image: web:1.0\n"
                )
            })
            .collect::<Vec<_>>()
            .join("---\n");
        std::fs::write(dir.join(format!("file-{file}.yaml")), text).unwrap();
    }
}

#[divan::bench(args = [1, 10, 100])]
fn stream(bencher: divan::Bencher, files: usize) {
    let dir = tempfile::tempdir().unwrap();
    package(dir.path(), files, 10);
    let runtime = tokio::runtime::Runtime::new().unwrap();

    bencher.bench_local(|| {
        let mut out = Vec::new();
        runtime
            .block_on(
                Pipeline::new(dir.path())
                    .specification(replacer())
                    .output(&mut out)
                    .run(),
            )
            .unwrap();
        out
    });
}

#[divan::bench]
fn noop_in_place(bencher: divan::Bencher) {
    let dir = tempfile::tempdir().unwrap();
    package(dir.path(), 10, 10);
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let noop = Specification::parse("kind: LabelSetter\nlabels: {}\n").unwrap();

    bencher.bench_local(|| {
        runtime
            .block_on(Pipeline::new(dir.path()).specification(noop.clone()).run())
            .unwrap()
    });
}
