//! The catalog of processes offered by a service.

use std::{fmt, sync::Arc};

use hashbrown::{HashMap, HashSet};

use crate::{
    error::Error,
    model::{Capabilities, ProcessDescriptor},
    sanitize::sanitize,
    transport::Transport,
};

#[cfg(test)]
mod tests;

/// Which processes to select from a catalog.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub enum Selection {
    #[default]
    All,
    Names(Vec<String>),
}

impl From<&str> for Selection {
    fn from(value: &str) -> Self {
        Self::Names(vec![value.to_string()])
    }
}

impl From<String> for Selection {
    fn from(value: String) -> Self {
        Self::Names(vec![value])
    }
}

impl From<Vec<String>> for Selection {
    fn from(value: Vec<String>) -> Self {
        Self::Names(value)
    }
}

impl From<&[&str]> for Selection {
    fn from(value: &[&str]) -> Self {
        Self::Names(value.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Selection {
    fn from(value: [&str; N]) -> Self {
        Self::from(&value[..])
    }
}

impl<T> From<Option<T>> for Selection
where
    T: Into<Selection>,
{
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Self::All)
    }
}

/// Processes offered by a service, with their full descriptions fetched
/// lazily and cached.
pub struct Catalog {
    transport: Arc<dyn Transport>,
    capabilities: Capabilities,
    /// Lower case identifier to canonical identifier.
    canonical: HashMap<String, String>,
    descriptors: HashMap<String, Arc<ProcessDescriptor>>,
}

impl Catalog {
    /// Fetches the capabilities of the service behind `transport`.
    pub fn load(transport: Arc<dyn Transport>) -> Result<Self, Error> {
        let capabilities = transport.capabilities()?;
        let canonical = index_identifiers(&capabilities)?;
        log::debug!(
            "Service offers {} processes.",
            capabilities.processes.len()
        );
        Ok(Self {
            transport,
            capabilities,
            canonical,
            descriptors: HashMap::new(),
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn list_process_ids(&self) -> Vec<&str> {
        self.capabilities
            .processes
            .iter()
            .map(|summary| summary.identifier.as_str())
            .collect()
    }

    /// Resolves `requested` against the catalog, case-insensitively. Returns
    /// the canonical identifier for each requested name, in order. Fails
    /// listing every name that did not match.
    pub fn select(&self, requested: impl Into<Selection>) -> Result<Vec<String>, Error> {
        let names = match requested.into() {
            Selection::All => {
                return Ok(self
                    .list_process_ids()
                    .into_iter()
                    .map(str::to_owned)
                    .collect());
            }
            Selection::Names(names) => names,
        };

        let ids = self.list_process_ids();
        let (found, missing) = filter_case_insensitive(&names, &ids);
        if !missing.is_empty() {
            return Err(Error::UnknownProcesses { names: missing });
        }
        Ok(found
            .iter()
            .filter_map(|name| self.canonical_id(name))
            .map(str::to_owned)
            .collect())
    }

    /// Returns the canonical identifier of `name`, matched case-insensitively.
    pub fn canonical_id(&self, name: &str) -> Option<&str> {
        self.canonical.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Returns the full description of process `id`, fetching it on first
    /// access.
    pub fn describe(&mut self, id: &str) -> Result<Arc<ProcessDescriptor>, Error> {
        let canonical = self
            .canonical_id(id)
            .ok_or_else(|| Error::UnknownProcesses {
                names: vec![id.to_string()],
            })?
            .to_string();

        if let Some(descriptor) = self.descriptors.get(&canonical) {
            return Ok(descriptor.clone());
        }

        log::debug!("Describing process {canonical:?}.");
        let descriptor = self.transport.describe_process(&canonical)?;
        validate(&descriptor)?;
        let descriptor = Arc::new(descriptor);
        self.descriptors.insert(canonical, descriptor.clone());
        Ok(descriptor)
    }

    /// Returns the description of `id` if it has already been fetched.
    pub fn cached(&self, id: &str) -> Option<&Arc<ProcessDescriptor>> {
        self.canonical_id(id)
            .and_then(|canonical| self.descriptors.get(canonical))
    }

    /// Discards cached descriptions and re-fetches the capabilities.
    pub fn invalidate(&mut self) -> Result<(), Error> {
        let capabilities = self.transport.capabilities()?;
        self.canonical = index_identifiers(&capabilities)?;
        self.capabilities = capabilities;
        self.descriptors.clear();
        Ok(())
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("base_url", &self.transport.base_url())
            .field("processes", &self.list_process_ids())
            .field("described", &self.descriptors.len())
            .finish()
    }
}

fn index_identifiers(capabilities: &Capabilities) -> Result<HashMap<String, String>, Error> {
    let mut canonical: HashMap<String, String> = HashMap::new();
    for summary in &capabilities.processes {
        let key = summary.identifier.to_lowercase();
        if let Some(existing) = canonical.get(&key) {
            return Err(Error::DuplicateProcess {
                first: existing.clone(),
                second: summary.identifier.clone(),
            });
        }
        canonical.insert(key, summary.identifier.clone());
    }
    Ok(canonical)
}

fn validate(descriptor: &ProcessDescriptor) -> Result<(), Error> {
    let invalid = |reason: String| Error::InvalidDescriptor {
        process: descriptor.identifier.clone(),
        reason,
    };

    let mut names: HashSet<String> = HashSet::new();
    for input in &descriptor.inputs {
        if input.max_occurs < input.min_occurs {
            return Err(invalid(format!(
                "input {:?} has max_occurs {} below min_occurs {}",
                input.identifier, input.max_occurs, input.min_occurs
            )));
        }
        if !names.insert(sanitize(&input.identifier)) {
            return Err(invalid(format!(
                "input {:?} collides with another input once sanitized",
                input.identifier
            )));
        }
    }
    Ok(())
}

/// Splits `names` into those that case-insensitively match one of
/// `complete`, and those that do not. Order within each is preserved.
pub fn filter_case_insensitive<S>(names: &[S], complete: &[&str]) -> (Vec<String>, Vec<String>)
where
    S: AsRef<str>,
{
    let lowered: HashSet<String> = complete.iter().map(|s| s.to_lowercase()).collect();
    names
        .iter()
        .map(|name| name.as_ref().to_string())
        .partition(|name| lowered.contains(&name.to_lowercase()))
}
