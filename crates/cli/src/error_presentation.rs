use std::{io, path::PathBuf};

use anyhow::Context;
use miette::Report;

const SYNC_CONTEXT: &str = "while synchronizing record tables";
const FILE_READ_CONTEXT: &str = "while reading collections manifest";
const STDIN_READ_CONTEXT: &str = "while reading collections manifest from stdin";

pub(crate) type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug)]
pub(crate) enum CliError {
    MissingManifestInput,
    ReadFile {
        path: PathBuf,
        source: io::Error,
    },
    ReadStdin(io::Error),
    Manifest {
        origin: String,
        source: serde_yaml::Error,
    },
    DuplicateCollection {
        origin: String,
        name: String,
    },
    Core(recordsync_core::Error),
    #[cfg(not(any(feature = "postgres", feature = "sqlite")))]
    NoDialectsEnabled,
}

impl From<recordsync_core::Error> for CliError {
    fn from(value: recordsync_core::Error) -> Self {
        Self::Core(value)
    }
}

pub(crate) fn render_runtime_error(error: CliError) -> String {
    match error {
        CliError::MissingManifestInput => {
            format!("[usage] {}", missing_manifest_message())
        }
        CliError::ReadFile { path, source } => {
            let context = format!("{FILE_READ_CONTEXT} `{}`", path.display());
            let report = report_with_context(source, context);
            format!("[io] {report}")
        }
        CliError::ReadStdin(source) => {
            let report = report_with_context(source, STDIN_READ_CONTEXT);
            format!("[io] {report}")
        }
        CliError::Manifest { origin, source } => {
            let report = report_with_context(source, format!("while parsing {origin}"));
            format!("[manifest] {report}")
        }
        CliError::DuplicateCollection { origin, name } => {
            format!("[manifest] collection `{name}` is declared more than once in {origin}")
        }
        CliError::Core(source) => {
            let category = source.category();
            let report = report_with_context(source, SYNC_CONTEXT);
            format!("[{category}] {report}")
        }
        #[cfg(not(any(feature = "postgres", feature = "sqlite")))]
        CliError::NoDialectsEnabled => format!("[config] {}", no_dialects_enabled_message()),
    }
}

fn report_with_context<E, C>(source: E, context: C) -> Report
where
    E: std::error::Error + Send + Sync + 'static,
    C: Into<String>,
{
    let context = context.into();
    let anyhow_error = std::result::Result::<(), E>::Err(source)
        .context(context)
        .expect_err("context wrapping must produce an error");
    miette::miette!("{anyhow_error:#}")
}

fn missing_manifest_message() -> &'static str {
    "missing collections manifest: pass --file <PATH> or pipe YAML via stdin"
}

#[cfg(not(any(feature = "postgres", feature = "sqlite")))]
fn no_dialects_enabled_message() -> &'static str {
    "no dialect features are enabled for this build; enable at least one of postgres/sqlite"
}
