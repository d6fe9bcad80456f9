//! Command-line interface for intake.
//!
//! Each subcommand drives one stage of the pipeline (or all of them, for
//! `verify`) and prints its result as JSON on stdout. Logs go to stderr.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use intake::{
    archive::{ArchiveHandler, ZipHandler},
    compile::{CleanPolicy, CompilerOutput, CompilerOutputBuilder, split_javac_output},
    config::Config,
    fingerprint::fingerprint,
    pipeline::{Compiler, Pipeline},
    plausibility::{LanguageRegistry, is_plausible},
    submission::Student,
    testing::TestExecutor,
};

/// Intake: unpack, identify, and verify student submissions.
#[derive(Debug, Parser)]
#[command(name = "intake")]
pub struct Cli {
    /// Config file. Defaults to `<config dir>/intake/config.toml`.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Unpack a submission archive, descending into nested archives.
    Extract {
        archive: PathBuf,
        out: PathBuf,

        /// Override the configured nesting depth.
        #[arg(long, allow_negative_numbers = true)]
        depth_limit: Option<i64>,
    },

    /// Pack a directory into an archive. Empty directories are left out.
    Pack { dir: PathBuf, archive: PathBuf },

    /// Print the content fingerprint of a directory tree.
    Fingerprint { dir: PathBuf },

    /// Check whether a tree holds any source file of a language.
    Plausible {
        dir: PathBuf,

        #[arg(long)]
        language: String,
    },

    /// Run verifier tests against compiled submission artifacts.
    Test {
        compiled: PathBuf,

        /// Verifier test root. Without it, no tests run.
        #[arg(long)]
        tests: Option<PathBuf>,
    },

    /// Take in an archive and verify it end to end.
    ///
    /// Compilation is external: pass the compiler's captured output with
    /// `--compiler-log`, or omit it when the build was silent.
    Verify {
        archive: PathBuf,

        /// Where to unpack the submission.
        #[arg(long)]
        tree: PathBuf,

        #[arg(long)]
        student: String,

        #[arg(long)]
        email: Option<String>,

        #[arg(long)]
        language: String,

        /// Compiled submission artifacts.
        #[arg(long)]
        compiled: PathBuf,

        #[arg(long)]
        tests: Option<PathBuf>,

        #[arg(long)]
        compiler_log: Option<PathBuf>,
    },
}

/// Run the CLI, returning an error message on failure.
pub fn run() -> Result<(), String> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).map_err(|e| e.to_string())?;

    match cli.command {
        Command::Extract {
            archive,
            out,
            depth_limit,
        } => cmd_extract(&config, &archive, &out, depth_limit),
        Command::Pack { dir, archive } => {
            let report = ZipHandler::new()
                .pack(&dir, &archive)
                .map_err(|e| format!("failed to pack {}: {e}", dir.display()))?;
            print_json(&report)
        }
        Command::Fingerprint { dir } => {
            let fp = fingerprint(&dir).map_err(|e| e.to_string())?;
            print_json(&json!({ "fingerprint": fp }))
        }
        Command::Plausible { dir, language } => {
            let registry =
                LanguageRegistry::with_overrides(&config.languages).map_err(|e| e.to_string())?;
            let plausible = is_plausible(&dir, &language, &registry).map_err(|e| e.to_string())?;
            print_json(&json!({ "plausible": plausible }))
        }
        Command::Test { compiled, tests } => {
            let executor =
                TestExecutor::from_settings(&config.executor).map_err(|e| e.to_string())?;
            let output = executor
                .run(&compiled, tests.as_deref())
                .map_err(|e| format!("testing failed: {e}"))?;
            print_json(&output)
        }
        Command::Verify {
            archive,
            tree,
            student,
            email,
            language,
            compiled,
            tests,
            compiler_log,
        } => {
            let mut student = Student::new(student);
            if let Some(email) = email {
                student = student.with_email(email);
            }
            let pipeline = Pipeline::from_config(&config).map_err(|e| e.to_string())?;
            let mut submission = pipeline
                .intake(&archive, &tree, student, &language)
                .map_err(|e| format!("intake failed: {e}"))?;

            let compiler = LoggedCompiler { log: compiler_log };
            pipeline.verify(&mut submission, &compiler, &compiled, tests.as_deref());
            print_json(&submission)
        }
    }
}

fn cmd_extract(
    config: &Config,
    archive: &Path,
    out: &Path,
    depth_limit: Option<i64>,
) -> Result<(), String> {
    let mut handler = ZipHandler::from_settings(&config.archive).map_err(|e| e.to_string())?;
    if let Some(limit) = depth_limit {
        handler.set_depth_limit(limit).map_err(|e| e.to_string())?;
    }

    let report = handler
        .extract(archive, out)
        .map_err(|e| format!("failed to extract {}: {e}", archive.display()))?;
    print_json(&report)
}

fn print_json(value: &impl Serialize) -> Result<(), String> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to serialize output: {e}"))?;
    println!("{json}");
    Ok(())
}

/// Stands in for a compiler whose output was captured beforehand.
///
/// No log means the compiler ran and printed nothing. An unreadable log
/// means its output stream broke.
struct LoggedCompiler {
    log: Option<PathBuf>,
}

impl Compiler for LoggedCompiler {
    fn compile(&self, _source: &Path, policy: CleanPolicy) -> CompilerOutput {
        let mut builder = CompilerOutputBuilder::new();
        builder.mark_invoked();

        let Some(log) = &self.log else {
            builder.mark_stream_complete();
            return builder.finish(policy);
        };

        match fs::read_to_string(log) {
            Ok(contents) => {
                builder.mark_stream_complete();
                if let Err(e) = split_javac_output(contents.lines(), &mut builder) {
                    builder.add_error(e.to_string());
                }
            }
            Err(e) => {
                tracing::error!(log = %log.display(), error = %e, "cannot read compiler output");
            }
        }
        builder.finish(policy)
    }
}
