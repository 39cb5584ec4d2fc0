use apiprobe_cli::cli::{self, Cli};
use clap::Parser;

const SWAGGER: &str = r##"
swagger: "2.0"
host: 127.0.0.1:9
schemes: [http]
definitions:
  Pet:
    type: object
    required: [name]
    properties:
      id: {type: integer}
      name: {type: string}
paths:
  /pets:
    get:
      responses:
        "200":
          description: ok
          schema:
            type: array
            items: {$ref: "#/definitions/Pet"}
"##;

const PLAN: &str = r#"
- name: smoke
  tests:
    - name: list
      path: /pets
      method: get
"#;

fn write_docs(dir: &tempfile::TempDir) -> (String, String) {
    let swagger_path = dir.path().join("swagger.yaml");
    let plan_path = dir.path().join("plan.yaml");
    std::fs::write(&swagger_path, SWAGGER).unwrap();
    std::fs::write(&plan_path, PLAN).unwrap();
    (
        swagger_path.to_string_lossy().into_owned(),
        plan_path.to_string_lossy().into_owned(),
    )
}

#[tokio::test]
async fn test_validate_command_exit_ok() {
    let dir = tempfile::tempdir().unwrap();
    let (swagger, plan) = write_docs(&dir);

    let cli = Cli::parse_from([
        "apiprobe",
        "validate",
        "--swagger",
        swagger.as_str(),
        "--plan",
        plan.as_str(),
    ]);
    let code = cli::run_with_cli(cli).await.unwrap();
    assert_eq!(code, cli::EXIT_OK);
}

#[tokio::test]
async fn test_validate_command_flags_bad_plan() {
    let dir = tempfile::tempdir().unwrap();
    let (swagger, _) = write_docs(&dir);
    let bad_plan = dir.path().join("bad.yaml");
    std::fs::write(
        &bad_plan,
        "- name: c\n  tests:\n    - {name: x, path: /nope, method: get}\n",
    )
    .unwrap();

    let bad_plan = bad_plan.to_string_lossy().into_owned();
    let cli = Cli::parse_from([
        "apiprobe",
        "validate",
        "--swagger",
        swagger.as_str(),
        "--plan",
        bad_plan.as_str(),
    ]);
    let code = cli::run_with_cli(cli).await.unwrap();
    assert_eq!(code, cli::EXIT_EXPECT);
}

#[tokio::test]
async fn test_run_command_reports_transport_failure() {
    // Port 9 (discard) is not listening; the step must surface a
    // transport error, not a panic.
    let dir = tempfile::tempdir().unwrap();
    let (swagger, plan) = write_docs(&dir);

    let cli = Cli::parse_from([
        "apiprobe",
        "run",
        "--swagger",
        swagger.as_str(),
        "--plan",
        plan.as_str(),
    ]);
    let code = cli::run_with_cli(cli).await.unwrap();
    assert_eq!(code, cli::EXIT_TRANSPORT);
}

#[tokio::test]
async fn test_run_command_missing_document_errors() {
    let dir = tempfile::tempdir().unwrap();
    let (_, plan) = write_docs(&dir);

    let cli = Cli::parse_from([
        "apiprobe",
        "run",
        "--swagger",
        "/nope.yaml",
        "--plan",
        plan.as_str(),
    ]);
    assert!(cli::run_with_cli(cli).await.is_err());
}
