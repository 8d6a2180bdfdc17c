use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use kreconcile::{
    Error, Filter, FilterProvider, Pipeline, Resource, ResourceCollection, Specification, Stage,
    Written,
};

const DEPLOYMENT: &str = "\
# The web frontend
apiVersion: apps/v1
kind: Deployment # replaced
metadata:
  name: web
  labels:
    app.kubernetes.io/component: Deployment
spec:
  replicas: 3 # keep
  template:
    spec:
      containers:
        - name: web
          image: \"nginx:1.25\"
";

const SERVICE: &str = "\
apiVersion: v1
kind: Service
metadata:
  name: web # service
---
# config
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  mode: Deployment
";

const REPLACER: &str = "\
apiVersion: gcr.io/example.com/image:version
kind: ValueReplacer
stringMatch: Deployment
replace: StatefulSet
";

struct Package {
    _dir: tempfile::TempDir,
    root: PathBuf,
}

impl Package {
    fn new(files: &[(&str, &str)]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("pkg");
        fs::create_dir(&root).unwrap();
        for (path, text) in files {
            let path = root.join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, text).unwrap();
        }
        Package { _dir: dir, root }
    }

    fn read(&self, path: &str) -> String {
        fs::read_to_string(self.root.join(path)).unwrap()
    }

    fn path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }

    fn sibling(&self, path: &str) -> PathBuf {
        self.root.parent().unwrap().join(path)
    }
}

fn standard() -> Package {
    Package::new(&[
        ("filter.yaml", REPLACER),
        ("app/deployment.yaml", DEPLOYMENT),
        ("app/service.yaml", SERVICE),
    ])
}

#[tokio::test]
async fn replaces_deployment_in_place() {
    let pkg = standard();
    let outcome = Pipeline::new(&pkg.root).run().await.unwrap();

    assert_eq!(outcome.resources, 3);
    assert_eq!(
        outcome.written,
        Written::Files(vec![pkg.path("app/deployment.yaml")])
    );

    // Only `kind` is rewritten, the label and the ConfigMap data keep their `Deployment`.
    assert_eq!(
        pkg.read("app/deployment.yaml"),
        DEPLOYMENT.replacen("kind: Deployment", "kind: StatefulSet", 1)
    );
    assert_eq!(pkg.read("app/service.yaml"), SERVICE);
    assert_eq!(pkg.read("filter.yaml"), REPLACER);
}

#[tokio::test]
async fn stream_output_leaves_files_alone() {
    let pkg = standard();
    let mut out = Vec::new();
    let outcome = Pipeline::new(&pkg.root)
        .output(&mut out)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.written, Written::Stream);
    assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    assert_eq!(pkg.read("app/service.yaml"), SERVICE);

    let out = String::from_utf8(out).unwrap();
    assert!(out.contains("kind: StatefulSet # replaced"), "{out}");
    assert!(out.contains("app.kubernetes.io/component: Deployment"), "{out}");
    assert!(out.contains("mode: Deployment"), "{out}");
    assert_eq!(out.matches("\n---\n").count(), 2, "{out}");
}

#[tokio::test]
async fn specification_file_outside_the_package() {
    let pkg = Package::new(&[("deployment.yaml", DEPLOYMENT)]);
    let spec = pkg.sibling("fn-config.yaml");
    fs::write(&spec, "apiVersion: v1\nkind: FieldSetter\nfieldPath: spec/replicas\nvalue: 5\n")
        .unwrap();

    Pipeline::new(&pkg.root).spec_path(&spec).run().await.unwrap();
    assert!(pkg.read("deployment.yaml").contains("replicas: 5 # keep\n"));
}

#[tokio::test]
async fn auxiliary_packages_are_written_back() {
    let pkg = Package::new(&[("filter.yaml", REPLACER), ("a.yaml", "kind: Deployment\n")]);
    let aux = pkg.sibling("aux");
    fs::create_dir(&aux).unwrap();
    fs::write(aux.join("b.yaml"), "kind: Deployment\n").unwrap();

    let outcome = Pipeline::new(&pkg.root)
        .aux_package(&aux)
        .run()
        .await
        .unwrap();
    assert_eq!(outcome.resources, 2);
    assert_eq!(pkg.read("a.yaml"), "kind: StatefulSet\n");
    assert_eq!(fs::read_to_string(aux.join("b.yaml")).unwrap(), "kind: StatefulSet\n");
}

#[tokio::test]
async fn missing_specification() {
    let pkg = Package::new(&[("deployment.yaml", DEPLOYMENT)]);
    let err = Pipeline::new(&pkg.root).run().await.unwrap_err();
    assert!(matches!(err, Error::SpecNotFound { .. }), "{err}");
    assert_eq!(err.stage(), Stage::Resolve);
    assert_eq!(pkg.read("deployment.yaml"), DEPLOYMENT);
}

#[tokio::test]
async fn invalid_configuration_touches_nothing() {
    let pkg = Package::new(&[
        ("filter.yaml", "kind: ValueReplacer\nreplace: x\n"),
        ("deployment.yaml", DEPLOYMENT),
    ]);
    let err = Pipeline::new(&pkg.root).run().await.unwrap_err();
    assert!(matches!(err, Error::Config { .. }), "{err}");
    assert_eq!(pkg.read("deployment.yaml"), DEPLOYMENT);
}

#[tokio::test]
async fn load_failure() {
    let pkg = Package::new(&[("filter.yaml", REPLACER), ("bad.yaml", "kind: [\n")]);
    let err = Pipeline::new(&pkg.root).run().await.unwrap_err();
    assert_eq!(err.stage(), Stage::Load);
}

#[tokio::test]
async fn execution_failure_touches_nothing() {
    let pkg = Package::new(&[
        (
            "filter.yaml",
            "kind: FieldSetter\nfieldPath: spec/replicas\nvalue: 1\n",
        ),
        ("a.yaml", "kind: A\nspec:\n  replicas: 2\n"),
        ("b.yaml", "kind: B\nspec: [oops]\n"),
    ]);
    let err = Pipeline::new(&pkg.root).run().await.unwrap_err();
    assert!(matches!(err, Error::Execute { ref kind, .. } if kind == "FieldSetter"), "{err}");
    assert_eq!(pkg.read("a.yaml"), "kind: A\nspec:\n  replicas: 2\n");
}

#[tokio::test]
async fn noop_is_idempotent() {
    let pkg = Package::new(&[
        ("filter.yaml", "kind: LabelSetter\nlabels: {}\n"),
        ("app/deployment.yaml", DEPLOYMENT),
        ("app/service.yaml", SERVICE),
    ]);
    let modified_before = fs::metadata(pkg.path("app/service.yaml"))
        .unwrap()
        .modified()
        .unwrap();

    let outcome = Pipeline::new(&pkg.root).run().await.unwrap();
    assert_eq!(outcome.written, Written::Files(vec![]));
    assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    assert_eq!(pkg.read("app/service.yaml"), SERVICE);
    assert_eq!(
        fs::metadata(pkg.path("app/service.yaml"))
            .unwrap()
            .modified()
            .unwrap(),
        modified_before
    );
}

#[tokio::test]
async fn explicit_specification_wins() {
    let pkg = standard();
    let spec = Specification::parse(
        "kind: LabelSetter\nlabels:\n  team: platform\ntarget:\n  kind: Service\n",
    )
    .unwrap();

    Pipeline::new(&pkg.root)
        .specification(spec)
        .run()
        .await
        .unwrap();

    assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    assert!(
        pkg.read("app/service.yaml")
            .starts_with("apiVersion: v1\nkind: Service\nmetadata:\n  name: web # service\n  labels:\n    team: platform\n---\n# config\n")
    );
}

/// Appends a copy of every resource with a new name, like a generator would.
struct Duplicate;

#[async_trait::async_trait]
impl Filter for Duplicate {
    async fn filter(&mut self, resources: &mut ResourceCollection) -> kreconcile::Result<()> {
        let copies = resources
            .iter()
            .map(|resource| {
                let mut root = serde_yaml::Value::Mapping(resource.root().clone());
                root["metadata"]["name"] = format!("{}-copy", resource.name().unwrap()).into();
                Resource::from_value(root).unwrap()
            })
            .collect::<Vec<_>>();
        resources.extend(copies);
        Ok(())
    }
}

#[tokio::test]
async fn custom_filter_provider() {
    let pkg = Package::new(&[
        ("filter.yaml", "apiVersion: example.com/duplicate:v1\nkind: Duplicate\n"),
        ("a.yaml", "kind: A\nmetadata:\n  name: a\n"),
        ("z.yaml", "kind: Z\nmetadata:\n  name: z\n"),
    ]);

    let provider: FilterProvider = Arc::new(|backend: &str, spec: &Specification| {
        assert_eq!(backend, "example.com/duplicate:v1");
        assert_eq!(spec.kind(), "Duplicate");
        Ok::<_, Error>(Box::new(Duplicate) as Box<dyn Filter>)
    });

    let outcome = Pipeline::new(&pkg.root)
        .filter_provider(provider)
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.resources, 4);
    assert_eq!(outcome.written, Written::Files(vec![pkg.path("z.yaml")]));
    assert_eq!(pkg.read("a.yaml"), "kind: A\nmetadata:\n  name: a\n");
    assert_eq!(
        pkg.read("z.yaml"),
        "kind: Z\nmetadata:\n  name: z\n---\nkind: A\nmetadata:\n  name: a-copy\n---\nkind: Z\nmetadata:\n  name: z-copy\n"
    );
}

#[tokio::test]
async fn removing_every_resource_of_a_file() {
    struct DropKind(&'static str);

    #[async_trait::async_trait]
    impl Filter for DropKind {
        async fn filter(&mut self, resources: &mut ResourceCollection) -> kreconcile::Result<()> {
            resources.retain(|resource| resource.kind() != self.0);
            Ok(())
        }
    }

    let pkg = Package::new(&[
        ("filter.yaml", "kind: DropKind\n"),
        ("a.yaml", "kind: A\n"),
        ("b.yaml", "kind: A\n---\nkind: B\n"),
    ]);
    let outcome = Pipeline::new(&pkg.root)
        .filter_provider(Arc::new(|_: &str, _: &Specification| {
            Ok::<_, Error>(Box::new(DropKind("A")) as Box<dyn Filter>)
        }))
        .run()
        .await
        .unwrap();

    assert_eq!(outcome.resources, 1);
    assert_eq!(pkg.read("a.yaml"), "kind: A\n");
    assert_eq!(pkg.read("b.yaml"), "kind: B\n");
}

#[cfg(unix)]
mod function {
    use std::time::Duration;

    use kreconcile::CommandRuntime;

    use super::*;

    const FUNCTION: &str = "apiVersion: example.com/fn:v1\nkind: Custom\nsetting: value\n";

    /// A runtime running `script` with `sh`. The image is `$0`, the `ResourceList` is on stdin.
    fn sh(script: &str) -> Arc<CommandRuntime> {
        Arc::new(CommandRuntime::new("sh", ["-c", script]))
    }

    fn package() -> Package {
        Package::new(&[
            ("filter.yaml", FUNCTION),
            ("app/deployment.yaml", DEPLOYMENT),
            ("app/service.yaml", SERVICE),
        ])
    }

    fn pipeline(pkg: &Package, script: &str) -> Pipeline<'static> {
        Pipeline::new(&pkg.root).runtime(sh(script))
    }

    #[tokio::test]
    async fn echo_is_a_noop() {
        let pkg = package();
        let outcome = pipeline(&pkg, "cat").run().await.unwrap();
        assert_eq!(outcome.resources, 3);
        assert_eq!(outcome.written, Written::Files(vec![]));
        assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
        assert_eq!(pkg.read("app/service.yaml"), SERVICE);
    }

    #[tokio::test]
    async fn function_receives_config_and_annotations() {
        let pkg = package();
        let captured = pkg.sibling("input.yaml");
        let script = format!("tee '{}'", captured.display());
        pipeline(&pkg, &script).run().await.unwrap();

        let input = fs::read_to_string(captured).unwrap();
        assert!(input.starts_with("apiVersion: config.kubernetes.io/v1\nkind: ResourceList\n"));
        assert!(input.contains("functionConfig:\n  apiVersion: example.com/fn:v1\n  kind: Custom\n  setting: value\n"));
        assert!(input.contains("config.kubernetes.io/path: app/service.yaml"));
        assert!(input.contains("config.kubernetes.io/index: '1'"));
    }

    #[tokio::test]
    async fn mutations_keep_provenance() {
        let pkg = package();
        pipeline(&pkg, "sed 's/kind: Deployment/kind: StatefulSet/'")
            .run()
            .await
            .unwrap();

        assert_eq!(
            pkg.read("app/deployment.yaml"),
            DEPLOYMENT.replacen("kind: Deployment", "kind: StatefulSet", 1)
        );
        assert_eq!(pkg.read("app/service.yaml"), SERVICE);
    }

    #[tokio::test]
    async fn bare_metadata_survives_a_round_trip() {
        let bare = "kind: ConfigMap\nmetadata:\ndata:\n  a: b\n";
        let pkg = Package::new(&[("filter.yaml", FUNCTION), ("cm.yaml", bare)]);
        let outcome = pipeline(&pkg, "cat").run().await.unwrap();
        assert_eq!(outcome.written, Written::Files(vec![]));
        assert_eq!(pkg.read("cm.yaml"), bare);
    }

    #[tokio::test]
    async fn plain_stream_output() {
        let pkg = package();
        let mut out = Vec::new();
        let outcome = Pipeline::new(&pkg.root)
            .runtime(sh("cat >/dev/null; printf 'kind: A\\n---\\nkind: B\\n'"))
            .output(&mut out)
            .run()
            .await
            .unwrap();
        assert_eq!(outcome.resources, 2);
        assert_eq!(String::from_utf8(out).unwrap(), "kind: A\n---\nkind: B\n");
    }

    #[tokio::test]
    async fn non_zero_exit() {
        let pkg = package();
        let err = pipeline(&pkg, "cat >/dev/null; echo broken >&2; exit 2")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendInvocation { .. }), "{err}");
        assert_eq!(err.stage(), Stage::Execute);
        assert!(format!("{:#}", anyhow::Error::from(err)).contains("broken"));
        assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    }

    #[tokio::test]
    async fn garbage_output() {
        let pkg = package();
        let err = pipeline(&pkg, "cat >/dev/null; echo 'kind: ['")
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendOutput { .. }), "{err}");
        assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    }

    #[tokio::test]
    async fn timeout() {
        let pkg = package();
        let err = pipeline(&pkg, "sleep 30")
            .timeout(Duration::from_millis(200))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendInvocation { .. }), "{err}");
        assert_eq!(pkg.read("app/deployment.yaml"), DEPLOYMENT);
    }

    #[tokio::test]
    async fn missing_runtime() {
        let pkg = package();
        let err = Pipeline::new(&pkg.root)
            .runtime(Arc::new(CommandRuntime::new(
                Path::new("/nonexistent/engine"),
                ["run"],
            )))
            .run()
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BackendInvocation { .. }), "{err}");
    }
}
