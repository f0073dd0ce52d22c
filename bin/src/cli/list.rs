use std::{io::Write, sync::Arc};

use anyhow::{Context, Result};
use client::{Transport, catalog::Catalog};

/// Prints the identifier and title of every process offered by the service.
pub fn run(transport: Arc<dyn Transport>, out: &mut dyn Write) -> Result<()> {
    let catalog = Catalog::load(transport).with_context(|| "listing processes")?;
    let processes = &catalog.capabilities().processes;

    let width = processes
        .iter()
        .map(|process| process.identifier.len())
        .max()
        .unwrap_or(0);
    for process in processes {
        match &process.title {
            Some(title) => writeln!(out, "{:width$}  {title}", process.identifier)?,
            None => writeln!(out, "{}", process.identifier)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests;
