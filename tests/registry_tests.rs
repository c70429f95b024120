use action_gen::{
    ActionError, FunctionBuilder, FunctionDescriptor, FunctionRegistry, KeepAlive, ParameterSpec,
    ScriptRewriter,
};
use std::fs;
use std::path::Path;
use std::process::Command;

fn registry_in(dir: &Path) -> FunctionRegistry {
    FunctionRegistry::new(dir, dir.join("tools.json"), "py")
}

fn builder_in(dir: &Path) -> FunctionBuilder {
    FunctionBuilder::new(registry_in(dir), ScriptRewriter::new("run").unwrap())
}

const SEARCH_RECORDING: &str = "\
def run(session):
    page = session.new_page()
    page.goto(\"https://example.com\")
    page.close()
    context.close()

with sync_playwright() as p:
    run(p)
";

#[test]
fn test_registry_round_trip_keeps_parameter_order() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    assert!(registry.load().is_empty());

    let descriptor = FunctionDescriptor::new(
        "search_foo",
        "searches foo",
        vec![
            ParameterSpec::string("zeta", "last alphabetically"),
            ParameterSpec::number("alpha", "first alphabetically"),
        ],
    );
    registry.save(&[descriptor.clone()]).unwrap();

    let loaded = registry.load();
    assert_eq!(loaded, vec![descriptor]);
    assert_eq!(loaded[0].parameters[0].variable, "zeta");

    let raw: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(registry.registry_path()).unwrap()).unwrap();
    assert_eq!(raw[0]["type"], "function");
    assert_eq!(raw[0]["function"]["parameters"]["required"][0], "zeta");
    assert_eq!(
        raw[0]["function"]["parameters"]["properties"]["alpha"]["type"],
        "number"
    );
}

#[test]
fn test_malformed_registry_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    fs::write(registry.registry_path(), "{ not json").unwrap();

    assert!(registry.load().is_empty());
    assert!(registry.try_load().is_err());
}

#[test]
fn test_upsert_replaces_by_name() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());

    registry
        .upsert(FunctionDescriptor::new("open_mail", "opens mail", Vec::new()))
        .unwrap();
    registry
        .upsert(FunctionDescriptor::new("open_mail", "opens mail", Vec::new()))
        .unwrap();
    assert_eq!(registry.load().len(), 1);

    registry
        .upsert(FunctionDescriptor::new(
            "open_mail",
            "opens the inbox",
            vec![ParameterSpec::string("folder", "folder name")],
        ))
        .unwrap();
    let loaded = registry.load();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0].description, "opens the inbox");
    assert_eq!(loaded[0].parameters.len(), 1);
}

#[test]
fn test_remove_deletes_script_and_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder_in(dir.path());
    builder
        .build(SEARCH_RECORDING, "search_foo", "searches foo", &[])
        .unwrap();
    builder
        .build(SEARCH_RECORDING, "search_bar", "searches bar", &[])
        .unwrap();

    let registry = builder.registry();
    assert!(registry.remove("search_foo").unwrap());
    assert!(!registry.script_path("search_foo").exists());
    assert!(registry.script_path("search_bar").exists());
    assert_eq!(registry.load().len(), 1);

    // unknown names are a no-op
    assert!(!registry.remove("search_foo").unwrap());
}

#[test]
fn test_rebuild_from_directory() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());
    fs::write(dir.path().join("b_task.py"), "# does b\nprint('b')\n").unwrap();
    fs::write(dir.path().join("a_task.py"), "print('a')\n").unwrap();
    fs::write(dir.path().join("tmp_codegen.py"), "# scratch\n").unwrap();
    fs::write(dir.path().join("bad name.py"), "# nope\n").unwrap();
    fs::write(dir.path().join("notes.txt"), "# not a script\n").unwrap();

    let rebuilt = registry.rebuild_from_directory().unwrap();
    let names: Vec<&str> = rebuilt.iter().map(|d| d.name.as_str()).collect();
    assert_eq!(names, vec!["a_task", "b_task"]);
    assert_eq!(rebuilt[1].description, "does b");
    assert!(rebuilt.iter().all(|d| d.parameters.is_empty()));
    assert_eq!(registry.load(), rebuilt);
}

#[test]
fn test_names_cannot_leave_functions_dir() {
    let dir = tempfile::tempdir().unwrap();
    let functions = dir.path().join("functions");
    fs::create_dir_all(&functions).unwrap();
    let outside = dir.path().join("victim.py");
    fs::write(&outside, "print('keep me')\n").unwrap();

    let registry = registry_in(&functions);
    let err = registry.remove("../victim").unwrap_err();
    assert!(matches!(err, ActionError::Validation(_)));
    assert!(outside.exists());

    let err = registry.read_script("../victim").unwrap_err();
    assert!(matches!(err, ActionError::Validation(_)));
}

#[test]
fn test_read_and_write_script() {
    let dir = tempfile::tempdir().unwrap();
    let registry = registry_in(dir.path());

    let err = registry.read_script("missing").unwrap_err();
    assert!(matches!(err, ActionError::FunctionNotFound(_)));

    registry.write_script("edited", "print('edited')\n").unwrap();
    assert_eq!(registry.read_script("edited").unwrap(), "print('edited')\n");
    assert!(registry.write_script("../escape", "x").is_err());
}

#[test]
fn test_build_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder_in(dir.path());

    let report = builder
        .build(
            SEARCH_RECORDING,
            "search_foo",
            "searches foo",
            &[ParameterSpec::string("q", "query")],
        )
        .unwrap();

    assert!(report.is_clean(), "{:?}", report.warnings);
    assert_eq!(report.keep_alive, KeepAlive::PageWait("page".to_string()));

    let source = fs::read_to_string(&report.script_path).unwrap();
    assert!(source.starts_with("# searches foo\n"));
    assert!(source.contains("def run(session, q: str):"));
    assert!(source.contains("parser.add_argument(\"--q\", type=str, required=True, help=\"query\")"));
    assert!(source.contains("page.wait_for_timeout(1000)"));
    assert!(!source.contains("page.close()"));
    assert!(!source.contains("with sync_playwright() as p:\n    run(p)\n"));
    assert!(source.contains("    with sync_playwright() as p:\n        run(p, q=args.q)\n"));

    let loaded = builder.registry().load();
    assert_eq!(loaded.len(), 1);
    assert_eq!(loaded[0], report.descriptor);
}

#[test]
fn test_build_without_patterns_still_saves() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder_in(dir.path());

    let report = builder
        .build("print('hello')\n", "say_hello", "says hello", &[])
        .unwrap();
    assert_eq!(report.warnings.len(), 3);
    assert!(report.script_path.exists());
    assert_eq!(builder.registry().load().len(), 1);
}

#[test]
fn test_build_rejections_write_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let builder = builder_in(dir.path());

    let cases: Vec<(&str, &str, Vec<ParameterSpec>)> = vec![
        ("", "desc", Vec::new()),
        ("has space", "desc", Vec::new()),
        ("ok_name", "   ", Vec::new()),
        ("ok_name", "desc", vec![ParameterSpec::string("q", "")]),
        ("ok_name", "desc", vec![ParameterSpec::string("", "query")]),
        (
            "ok_name",
            "desc",
            vec![
                ParameterSpec::string("q", "query"),
                ParameterSpec::number("q", "again"),
            ],
        ),
        ("ok_name", "desc", vec![ParameterSpec::string("class", "keyword")]),
        ("ok_name", "desc", vec![ParameterSpec::string("args", "parsed args")]),
        ("ok_name", "desc", vec![ParameterSpec::string("session", "entry argument")]),
        ("ok_name", "desc", vec![ParameterSpec::string("p", "session variable")]),
    ];

    for (name, description, params) in cases {
        let err = builder
            .build(SEARCH_RECORDING, name, description, &params)
            .unwrap_err();
        assert_eq!(
            err.error_code(),
            "VALIDATION_ERROR",
            "{name:?} {description:?} {params:?}"
        );
    }

    assert!(builder.registry().load().is_empty());
    let written: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
    assert!(written.is_empty());
}

fn python3_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[test]
fn test_built_scripts_are_valid_python() {
    if !python3_available() {
        eprintln!("python3 not found, skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let builder = builder_in(dir.path());
    let params = vec![
        ParameterSpec::string("q", "the \"query\"\nto run"),
        ParameterSpec::number("limit", "max results"),
    ];
    let without_page = "\
def run(session):
    context = session.new_context()
    context.close()

if __name__ == \"__main__\":
    with sync_playwright() as p:
        run(p)
";

    let reports = vec![
        builder
            .build(SEARCH_RECORDING, "with_page", "searches \"foo\"\nfast", &params)
            .unwrap(),
        builder
            .build(without_page, "without_page", "sleeps", &params)
            .unwrap(),
        builder
            .build("print('hello')\n", "no_patterns", "says hello", &[])
            .unwrap(),
    ];
    assert_eq!(reports[1].keep_alive, KeepAlive::Sleep);

    for report in reports {
        let output = Command::new("python3")
            .args(["-m", "py_compile"])
            .arg(&report.script_path)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "{} does not compile: {}",
            report.script_path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
    }
}
