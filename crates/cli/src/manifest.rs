use std::{
    collections::BTreeSet,
    fs,
    io::{self, IsTerminal, Read},
    path::Path,
};

use recordsync_core::Collection;
use serde::Deserialize;

use crate::error_presentation::{CliError, CliResult};

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Manifest {
    #[serde(default)]
    pub(crate) collections: Vec<CollectionEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CollectionEntry {
    #[serde(flatten)]
    pub(crate) collection: Collection,
    /// Name the collection had in the previous manifest, when it was renamed.
    #[serde(default)]
    pub(crate) renamed_from: Option<String>,
}

impl CollectionEntry {
    fn previous_name(&self) -> &str {
        self.renamed_from
            .as_deref()
            .unwrap_or(&self.collection.name)
    }
}

impl Manifest {
    /// Previously synchronized shape of `entry`, looked up by its prior name.
    pub(crate) fn previous_of(&self, entry: &CollectionEntry) -> Option<&Collection> {
        let name = entry.previous_name();
        self.collections
            .iter()
            .map(|candidate| &candidate.collection)
            .find(|candidate| candidate.name.eq_ignore_ascii_case(name))
    }
}

/// Reads the desired manifest from `path`, or from stdin when no path is given.
pub(crate) fn read_desired(path: Option<&Path>) -> CliResult<Manifest> {
    match path {
        Some(path) => read_file(path),
        None => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                return Err(CliError::MissingManifestInput);
            }

            let mut raw = String::new();
            stdin
                .lock()
                .read_to_string(&mut raw)
                .map_err(CliError::ReadStdin)?;
            parse(&raw, "stdin")
        }
    }
}

pub(crate) fn read_file(path: &Path) -> CliResult<Manifest> {
    let raw = fs::read_to_string(path).map_err(|source| CliError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse(&raw, &format!("`{}`", path.display()))
}

fn parse(raw: &str, origin: &str) -> CliResult<Manifest> {
    if raw.trim().is_empty() {
        return Ok(Manifest::default());
    }

    let manifest: Manifest = serde_yaml::from_str(raw).map_err(|source| CliError::Manifest {
        origin: origin.to_string(),
        source,
    })?;

    let mut seen = BTreeSet::new();
    for entry in &manifest.collections {
        if !seen.insert(entry.collection.name.to_lowercase()) {
            return Err(CliError::DuplicateCollection {
                origin: origin.to_string(),
                name: entry.collection.name.clone(),
            });
        }
    }

    Ok(manifest)
}
