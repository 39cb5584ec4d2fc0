use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Write;
use std::sync::Arc;

use apiprobe::{MirrorDb, RestClient, Swagger, TestPlan};

/// All steps passed.
pub const EXIT_OK: i32 = 0;
/// A document failed to load or parse.
pub const EXIT_LOAD: i32 = 2;
/// At least one step failed an expectation or validation.
pub const EXIT_EXPECT: i32 = 3;
/// At least one step hit a transport error.
pub const EXIT_TRANSPORT: i32 = 4;

#[derive(Parser)]
#[command(name = "apiprobe")]
#[command(about = "Exercise an HTTP API described by a swagger 2.0 document", long_about = None)]
pub struct Cli {
    /// Increase verbosity (can be used multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a test plan against a live server
    Run {
        /// Path to the swagger document (YAML or JSON)
        #[arg(long)]
        swagger: String,
        /// Path to the test plan
        #[arg(long)]
        plan: String,
        /// Stop at the first failing step
        #[arg(long)]
        fail_fast: bool,
        /// Write the executed plan, with observed results, to this file
        #[arg(long)]
        result: Option<String>,
    },
    /// Check that every plan step is covered by the swagger document
    Validate {
        #[arg(long)]
        swagger: String,
        #[arg(long)]
        plan: String,
    },
}

/// Run the CLI application, returning the process exit code.
///
/// # Errors
///
/// Returns an error when a document cannot be loaded; execution failures
/// are reported through the exit code instead.
pub async fn run() -> Result<i32> {
    let cli = Cli::parse();
    run_with_cli(cli).await
}

/// Execute CLI commands with a parsed Cli struct.
/// This function is separated from `run()` to allow for testing.
///
/// # Errors
///
/// Returns an error when document loading or result writing fails.
pub async fn run_with_cli(cli: Cli) -> Result<i32> {
    // WARNING (no -v), INFO (-v), DEBUG (-vv)
    let log_level = match cli.verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };

    // Only initialize logging if not already initialized (for testing)
    let _ = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .try_init();

    run_command(cli).await
}

async fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Run {
            swagger,
            plan,
            fail_fast,
            result,
        } => {
            let doc =
                Swagger::from_file(&swagger).with_context(|| format!("loading {swagger}"))?;
            let plan = TestPlan::from_file(&plan).with_context(|| format!("loading {plan}"))?;

            let db = MirrorDb::new(Arc::new(doc));
            let client = RestClient::new();
            let summary = plan.run(&db, &client, fail_fast).await;
            print_result(&summary)?;

            if let Some(path) = result {
                let rendered = summary.executed_yaml()?;
                std::fs::write(&path, rendered).with_context(|| format!("writing {path}"))?;
            }

            Ok(if summary.failed == 0 {
                EXIT_OK
            } else if summary.has_transport_errors() {
                EXIT_TRANSPORT
            } else {
                EXIT_EXPECT
            })
        }
        Commands::Validate { swagger, plan } => {
            let doc =
                Swagger::from_file(&swagger).with_context(|| format!("loading {swagger}"))?;
            let plan = TestPlan::from_file(&plan).with_context(|| format!("loading {plan}"))?;
            let report = validate(&doc, &plan);
            print_result(&report)?;
            Ok(if report.ok { EXIT_OK } else { EXIT_EXPECT })
        }
    }
}

#[derive(Debug, serde::Serialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub errors: Vec<String>,
}

/// Checks every step of the plan against the swagger document without
/// issuing any requests.
#[must_use]
pub fn validate(doc: &Swagger, plan: &TestPlan) -> ValidationReport {
    let mut errors = Vec::new();
    for case in &plan.cases {
        for test in &case.tests {
            let mut path = test.path.as_str();
            let mut method = test.method;
            if !test.ref_name.is_empty() {
                match plan.find_template(&test.ref_name) {
                    Some(template) => {
                        if path.is_empty() {
                            path = &template.path;
                            method = template.method;
                        }
                    }
                    None => {
                        errors.push(format!(
                            "{}/{}: ref {} not found in the plan",
                            case.name, test.name, test.ref_name
                        ));
                        continue;
                    }
                }
            }
            match doc.path_item(path) {
                None => errors.push(format!(
                    "{}/{}: path {path} not in the swagger document",
                    case.name, test.name
                )),
                Some(item) => {
                    if item.operation(method).is_none() {
                        errors.push(format!(
                            "{}/{}: no {method} operation under {path}",
                            case.name, test.name
                        ));
                    }
                }
            }
        }
    }
    ValidationReport {
        ok: errors.is_empty(),
        errors,
    }
}

fn print_result<T: serde::Serialize>(value: &T) -> Result<()> {
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    serde_json::to_writer_pretty(&mut handle, value)?;
    writeln!(handle)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_run() {
        let args = vec![
            "apiprobe",
            "run",
            "--swagger",
            "petstore.yaml",
            "--plan",
            "plan.yaml",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.verbose, 0);
        match cli.command {
            Commands::Run {
                swagger,
                plan,
                fail_fast,
                result,
            } => {
                assert_eq!(swagger, "petstore.yaml");
                assert_eq!(plan, "plan.yaml");
                assert!(!fail_fast);
                assert!(result.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_run_with_options() {
        let args = vec![
            "apiprobe",
            "-vv",
            "run",
            "--swagger",
            "s.yaml",
            "--plan",
            "p.yaml",
            "--fail-fast",
            "--result",
            "out.yaml",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Run {
                fail_fast, result, ..
            } => {
                assert!(fail_fast);
                assert_eq!(result, Some("out.yaml".to_owned()));
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_cli_parse_validate() {
        let args = vec![
            "apiprobe",
            "validate",
            "--swagger",
            "s.yaml",
            "--plan",
            "p.yaml",
        ];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.command {
            Commands::Validate { swagger, plan } => {
                assert_eq!(swagger, "s.yaml");
                assert_eq!(plan, "p.yaml");
            }
            _ => panic!("Expected Validate command"),
        }
    }

    const SWAGGER: &str = r#"
swagger: "2.0"
host: example.com
paths:
  /pets:
    get:
      responses:
        "200": {description: ok}
"#;

    #[test]
    fn test_validate_flags_unknown_paths_and_methods() {
        let doc = Swagger::from_yaml(SWAGGER).unwrap();
        let plan = TestPlan::from_yaml(
            r#"
- name: c
  tests:
    - {name: ok, path: /pets, method: get}
    - {name: bad-path, path: /dogs, method: get}
    - {name: bad-method, path: /pets, method: post}
    - {name: bad-ref, ref: nobody}
"#,
        )
        .unwrap();

        let report = validate(&doc, &plan);
        assert!(!report.ok);
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_validate_resolves_ref_templates() {
        let doc = Swagger::from_yaml(SWAGGER).unwrap();
        let plan = TestPlan::from_yaml(
            r#"
- name: c
  tests:
    - {name: base, path: /pets, method: get}
    - {name: again, ref: base}
"#,
        )
        .unwrap();

        let report = validate(&doc, &plan);
        assert!(report.ok, "errors: {:?}", report.errors);
    }

    #[test]
    fn test_print_result_json() {
        let report = ValidationReport {
            ok: true,
            errors: Vec::new(),
        };
        assert!(print_result(&report).is_ok());
    }
}
