//! Executing one loaded test artifact and capturing its outcome.

use std::{
    env,
    process::{Command, Output},
};

use super::{LoadContext, LoadedUnit, QualifiedName, TestRun};
use crate::error::{Error, Result};

/// The "execute and capture outcome" seam of the test executor.
///
/// Implementations run every test contained in `unit` and report them as one
/// [`TestRun`]. An `Err` means the artifact could not be executed at all.
pub trait TestRunner {
    fn run(&self, context: &LoadContext, unit: &LoadedUnit) -> Result<TestRun>;
}

/// Runs each artifact in a child process built from a command template.
///
/// Template placeholders: `{name}` (qualified name), `{search-path}` (test
/// root then submission root) and `{artifact}` (resolved file). The child
/// sees only `PATH` from our environment, with `HOME` and `TMPDIR` pointed at
/// the context's scratch directory, which is also its working directory.
#[derive(Debug, Clone)]
pub struct CommandRunner {
    template: Vec<String>,
}

impl CommandRunner {
    pub fn new(template: Vec<String>) -> Result<Self> {
        if template.first().is_none_or(String::is_empty) {
            return Err(Error::Configuration(
                "runner command template is empty".to_string(),
            ));
        }
        Ok(Self { template })
    }

    fn command(&self, context: &LoadContext, unit: &LoadedUnit) -> Result<Command> {
        let search_path = context.search_path()?;
        let search_path = search_path.to_str().ok_or_else(|| {
            Error::Configuration("search path is not valid UTF-8".to_string())
        })?;
        let name = unit.name.to_string();
        let artifact = unit.path.to_string_lossy();

        let mut args = self.template.iter().map(|arg| {
            arg.replace("{name}", &name)
                .replace("{search-path}", search_path)
                .replace("{artifact}", &artifact)
        });
        // `new` guarantees a program.
        let program = args.next().unwrap_or_default();

        let mut command = Command::new(program);
        command
            .args(args)
            .env_clear()
            .env("HOME", context.scratch_dir())
            .env("TMPDIR", context.scratch_dir())
            .current_dir(context.scratch_dir());
        if let Some(path) = env::var_os("PATH") {
            command.env("PATH", path);
        }
        Ok(command)
    }
}

impl TestRunner for CommandRunner {
    fn run(&self, context: &LoadContext, unit: &LoadedUnit) -> Result<TestRun> {
        let output = self
            .command(context, unit)?
            .output()
            .map_err(|e| Error::load_failure(&unit.name, format!("cannot start runner: {e}")))?;

        let run = parse_report(&unit.name, &output);
        tracing::debug!(
            name = %unit.name,
            status = ?run.status,
            run_count = run.run_count,
            failure_count = run.failure_count,
            "test artifact finished"
        );
        Ok(run)
    }
}

/// Summary counts printed by the runner, if any.
struct Summary {
    run_count: usize,
    failure_count: usize,
}

/// Turn runner output into a [`TestRun`].
///
/// Understands `OK (N tests)` and `Tests run: N,  Failures: M` summaries,
/// and numbered `N) test(Class)` failure headers followed by their message.
fn parse_report(name: &QualifiedName, output: &Output) -> TestRun {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().map(str::trim).collect();

    let mut summary = None;
    let mut failures = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(rest) = line.strip_prefix("OK (") {
            summary = Some(Summary {
                run_count: leading_number(rest).unwrap_or(0),
                failure_count: 0,
            });
        } else if let Some(rest) = line.strip_prefix("Tests run: ") {
            let failure_count = rest
                .split_once("Failures: ")
                .and_then(|(_, tail)| leading_number(tail))
                .unwrap_or(0);
            summary = Some(Summary {
                run_count: leading_number(rest).unwrap_or(0),
                failure_count,
            });
        } else if let Some(header) = failure_header(line) {
            let message = lines.get(i + 1).filter(|next| !next.is_empty());
            failures.push(match message {
                Some(message) => format!("{header}: {message}"),
                None => header.to_string(),
            });
        }
    }

    match summary {
        Some(summary) if summary.failure_count == 0 => TestRun::passed(name.clone(), summary.run_count),
        Some(summary) => TestRun::failed(
            name.clone(),
            summary.run_count,
            summary.failure_count,
            failures,
        ),
        None if output.status.success() => TestRun::passed(name.clone(), 1),
        None => {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("runner exited with {} and no test summary", output.status),
                text => text.to_string(),
            };
            TestRun::errored(name.clone(), message)
        }
    }
}

fn leading_number(text: &str) -> Option<usize> {
    let digits: String = text.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// `3) testAdd(edu.MainTest)` yields `testAdd(edu.MainTest)`.
fn failure_header(line: &str) -> Option<&str> {
    let (number, rest) = line.split_once(") ")?;
    (!number.is_empty() && number.chars().all(|c| c.is_ascii_digit())).then_some(rest)
}
