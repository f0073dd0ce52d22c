use std::{io::Write, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Args;
use client::{Transport, catalog::Catalog};

/// Shows the language of the service's responses. Without options, prints
/// the active language.
#[derive(Args, Debug)]
pub struct Command {
    /// List the languages supported by the service.
    #[arg(long)]
    supported: bool,

    /// Check that the service supports a language, to then pass it with
    /// --language or WPS_LANGUAGE.
    #[arg(long, value_name = "LANGUAGE")]
    set: Option<String>,
}

/// `active` is the language requested through the configuration, if any.
pub fn run(
    cmd: &Command,
    active: Option<&str>,
    transport: Arc<dyn Transport>,
    out: &mut dyn Write,
) -> Result<()> {
    let catalog = Catalog::load(transport).with_context(|| "fetching service languages")?;
    let languages = &catalog.capabilities().languages;
    if languages.supported.is_empty() && languages.default.is_none() {
        bail!("The wps service does not support the language parameter");
    }

    if let Some(language) = &cmd.set {
        let Some(found) = languages
            .supported
            .iter()
            .find(|supported| supported.eq_ignore_ascii_case(language))
        else {
            bail!(
                "The wps service does not support the language {language:?}. \
                 Supported languages: {}",
                languages.supported.join(", ")
            );
        };
        writeln!(out, "Changed active language to : {found}")?;
    } else if cmd.supported {
        writeln!(
            out,
            "This wps service supports the following languages : {}",
            languages.supported.join(", ")
        )?;
    } else {
        let active = active.or(languages.default.as_deref()).unwrap_or_default();
        writeln!(out, "Active language : {active}")?;
    }
    Ok(())
}
