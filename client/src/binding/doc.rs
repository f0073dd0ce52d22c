//! Help text for processes and clients, in numpy docstring layout.

use std::fmt::Write;

use crate::{
    model::{AllowedValues, DataKind, InputDescriptor, OutputDescriptor, ProcessDescriptor},
    sanitize::sanitize,
    typebridge,
};

/// Number of allowed values or CRSs enumerated before eliding the rest.
const MAX_ENUMERATED: usize = 10;

/// Renders the help text of a process.
pub fn process_doc(descriptor: &ProcessDescriptor) -> String {
    let mut doc = vec![
        descriptor.abstract_.clone().unwrap_or_default(),
        String::new(),
    ];

    if !descriptor.inputs.is_empty() {
        doc.push("Parameters".to_string());
        doc.push("----------".to_string());
        for input in &descriptor.inputs {
            doc.push(format!(
                "{} : {}",
                sanitize(&input.identifier),
                input_type(input)
            ));
            doc.push(format!(
                "    {}",
                describe(input.abstract_.as_deref(), input.title.as_deref())
            ));
        }
    }

    if !descriptor.outputs.is_empty() {
        doc.push(String::new());
        doc.push("Returns".to_string());
        doc.push("-------".to_string());
        for output in &descriptor.outputs {
            doc.push(format!(
                "{} : {}",
                sanitize(&output.identifier),
                output_type(output)
            ));
            doc.push(format!(
                "    {}",
                describe(output.abstract_.as_deref(), output.title.as_deref())
            ));
        }
    }

    doc.push(String::new());
    doc.join("\n")
}

/// Renders the help text of a client bound to `processes`, given as
/// `(identifier, abstract)` pairs.
pub fn client_doc<'a>(
    abstract_: Option<&str>,
    processes: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> String {
    let mut doc = String::new();
    doc.push_str(abstract_.unwrap_or_default());
    doc.push_str("\n\nProcesses\n---------\n\n");

    let mut any = false;
    for (identifier, process_abstract) in processes {
        any = true;
        let _ = writeln!(
            doc,
            "{}\n    {}\n",
            sanitize(identifier),
            process_abstract.unwrap_or("(No description)")
        );
    }
    if !any {
        doc.push_str("There aren't any available processes.\n");
    }
    doc
}

fn describe<'a>(abstract_: Option<&'a str>, title: Option<&'a str>) -> &'a str {
    abstract_
        .filter(|s| !s.is_empty())
        .or(title)
        .unwrap_or_default()
}

/// Type description of an input: allowed values, kind hints, optionality,
/// default and units.
pub fn input_type(input: &InputDescriptor) -> String {
    let mut doc = String::new();
    if let AllowedValues::Values(values) = &input.allowed_values {
        let quoted: Vec<String> = values.iter().map(|v| format!("'{v}'")).collect();
        doc.push('{');
        doc.push_str(&elide(&quoted));
        doc.push_str("} ");
    }
    doc.push_str(&kind_type(&input.kind));
    if input.is_optional() {
        doc.push_str(", optional");
    }
    // Defaults that do not parse are ignored by the binding too.
    if let Ok(Some(default)) = typebridge::from_wire(input.default_value.as_deref(), &input.kind) {
        let _ = write!(doc, ", default:{default}");
    }
    doc.push_str(&units(&input.kind));
    doc
}

pub fn output_type(output: &OutputDescriptor) -> String {
    let mut doc = kind_type(&output.kind);
    doc.push_str(&units(&output.kind));
    doc
}

fn kind_type(kind: &DataKind) -> String {
    match kind {
        DataKind::Literal { subtype, .. } => subtype.to_string(),
        DataKind::Complex(formats) => {
            let mimetypes: Vec<String> = formats
                .mimetypes()
                .into_iter()
                .map(|m| format!(":mimetype:`{m}`"))
                .collect();
            format!("ComplexData{}", mimetypes.join(", "))
        }
        DataKind::BoundingBox { crss } => format!("BoundingBoxData[{}]", elide(crss)),
    }
}

fn units(kind: &DataKind) -> String {
    match kind {
        DataKind::Literal { uoms, .. } if !uoms.is_empty() => {
            format!(", units:[{}]", uoms.join(", "))
        }
        _ => String::new(),
    }
}

fn elide(items: &[String]) -> String {
    let mut joined = items
        .iter()
        .take(MAX_ENUMERATED)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if items.len() > MAX_ENUMERATED {
        joined.push_str(", ...");
    }
    joined
}
