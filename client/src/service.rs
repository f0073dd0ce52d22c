//! A client bound to the processes of one service.

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    binding::{Binding, Invocation, doc},
    catalog::{Catalog, Selection},
    convert::ConverterRegistry,
    error::Error,
    execution::{DEFAULT_POLL_INTERVAL, Engine, ExecutionContext},
    model::{Capabilities, Languages},
    result::ExecutionResult,
    sanitize::sanitize,
    transport::Transport,
};

pub struct WpsClientBuilder {
    transport: Arc<dyn Transport>,
    processes: Selection,
    interactive: bool,
    poll_interval: Duration,
    converters: Option<ConverterRegistry>,
    scratch_dir: Option<PathBuf>,
}

impl WpsClientBuilder {
    /// Restricts the client to the named processes, matched
    /// case-insensitively.
    pub fn processes(mut self, processes: impl Into<Selection>) -> Self {
        self.processes = processes.into();
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn converters(mut self, converters: ConverterRegistry) -> Self {
        self.converters = Some(converters);
        self
    }

    pub fn scratch_dir(mut self, scratch_dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(scratch_dir.into());
        self
    }

    /// Fetches the capabilities, describes every selected process and
    /// creates its binding.
    pub fn build(self) -> Result<WpsClient, Error> {
        let catalog = Catalog::load(self.transport.clone())?;
        let selected = catalog.select(self.processes)?;
        let engine = Engine::new(self.transport)
            .with_interactive(self.interactive)
            .with_poll_interval(self.poll_interval);
        let context = Arc::new(ExecutionContext {
            engine,
            converters: self.converters.unwrap_or_default(),
            scratch_dir: self.scratch_dir,
        });

        let mut client = WpsClient {
            catalog,
            context,
            selected,
            bindings: Vec::new(),
        };
        client.bind_selected()?;
        Ok(client)
    }
}

pub struct WpsClient {
    catalog: Catalog,
    context: Arc<ExecutionContext>,
    selected: Vec<String>,
    bindings: Vec<Binding>,
}

impl WpsClient {
    pub fn builder(transport: Arc<dyn Transport>) -> WpsClientBuilder {
        WpsClientBuilder {
            transport,
            processes: Selection::All,
            interactive: false,
            poll_interval: DEFAULT_POLL_INTERVAL,
            converters: None,
            scratch_dir: None,
        }
    }

    /// A non-interactive client bound to every process of the service.
    pub fn new(transport: Arc<dyn Transport>) -> Result<Self, Error> {
        Self::builder(transport).build()
    }

    fn bind_selected(&mut self) -> Result<(), Error> {
        let mut bindings: Vec<Binding> = Vec::with_capacity(self.selected.len());
        for id in &self.selected {
            if bindings.iter().any(|binding| binding.identifier() == id) {
                continue;
            }
            let descriptor = self.catalog.describe(id)?;
            let binding = Binding::new(descriptor, self.context.clone());
            if let Some(existing) = bindings.iter().find(|b| b.name() == binding.name()) {
                log::warn!(
                    "Processes {:?} and {:?} share the name {:?}, keeping the first.",
                    existing.identifier(),
                    id,
                    binding.name()
                );
                continue;
            }
            bindings.push(binding);
        }
        self.bindings = bindings;
        Ok(())
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn capabilities(&self) -> &Capabilities {
        self.catalog.capabilities()
    }

    pub fn languages(&self) -> &Languages {
        &self.catalog.capabilities().languages
    }

    pub fn context(&self) -> &Arc<ExecutionContext> {
        &self.context
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// The binding for a process, by sanitized name or identifier.
    pub fn binding(&self, name: &str) -> Option<&Binding> {
        let sanitized = sanitize(name);
        self.bindings
            .iter()
            .find(|binding| binding.identifier() == name || binding.name() == sanitized)
    }

    /// Calls the process `name` with `invocation`.
    pub fn call(&self, name: &str, invocation: Invocation) -> Result<ExecutionResult, Error> {
        self.binding(name)
            .ok_or_else(|| Error::UnknownProcesses {
                names: vec![name.to_string()],
            })?
            .call(invocation)
    }

    /// Help text listing the bound processes.
    pub fn doc(&self) -> String {
        doc::client_doc(
            self.capabilities().abstract_.as_deref(),
            self.bindings.iter().map(|binding| {
                (
                    binding.identifier(),
                    binding.descriptor().abstract_.as_deref(),
                )
            }),
        )
    }

    /// Re-fetches the capabilities and descriptions, and rebinds the same
    /// processes.
    pub fn reload(&mut self) -> Result<(), Error> {
        self.catalog.invalidate()?;
        self.bind_selected()
    }
}
