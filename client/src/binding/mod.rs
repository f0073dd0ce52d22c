//! Native callables synthesized from process descriptions.
//!
//! A [Binding] closes over one [ProcessDescriptor] and the shared
//! [ExecutionContext]. Its parameter list mirrors the process inputs and is
//! used to resolve an [Invocation] and to render help text; no code is
//! generated at runtime.

use std::sync::Arc;

use crate::{
    error::{ArgumentError, Error},
    execution::{ExecutionContext, LogEvents},
    model::{InputDescriptor, ProcessDescriptor},
    result::ExecutionResult,
    sanitize::sanitize,
    typebridge,
    value::{InputValue, LiteralValue},
};

pub mod doc;
mod invocation;

pub use invocation::{Arg, BoundArgs, Invocation, OutputFormat, OutputFormats};

/// Name of the trailing parameter that overrides how outputs are returned.
pub const OUTPUT_FORMATS_PARAM: &str = "output_formats";

/// One parameter of a binding, derived from a process input.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameter {
    /// Sanitized name.
    pub name: String,
    /// Identifier of the input on the service.
    pub identifier: String,
    pub default: Option<LiteralValue>,
    pub required: bool,
    pub min_occurs: u32,
    pub max_occurs: u32,
}

impl Parameter {
    fn from_input(process: &str, input: &InputDescriptor) -> Self {
        let default = match typebridge::from_wire(input.default_value.as_deref(), &input.kind) {
            Ok(default) => default,
            Err(err) => {
                log::warn!(
                    "Ignoring default of input {:?} of process {process:?}: {err}.",
                    input.identifier
                );
                None
            }
        };
        Self {
            name: sanitize(&input.identifier),
            identifier: input.identifier.clone(),
            required: input.min_occurs >= 1 && default.is_none(),
            default,
            min_occurs: input.min_occurs,
            max_occurs: input.max_occurs,
        }
    }

    fn bucket(&self, input: &InputDescriptor) -> u8 {
        match (input.min_occurs >= 1, self.default.is_some()) {
            (true, false) => 0,
            (true, true) => 1,
            (false, _) => 2,
        }
    }
}

/// Derives the parameters of a process, in signature order.
///
/// Inputs are grouped into required inputs without a default, required
/// inputs with a default, and optional inputs. The original order is kept
/// within each group.
pub fn parameters(descriptor: &ProcessDescriptor) -> Vec<Parameter> {
    let mut parameters: Vec<(u8, Parameter)> = descriptor
        .inputs
        .iter()
        .map(|input| {
            let parameter = Parameter::from_input(&descriptor.identifier, input);
            (parameter.bucket(input), parameter)
        })
        .collect();
    parameters.sort_by_key(|(bucket, _)| *bucket);
    parameters.into_iter().map(|(_, p)| p).collect()
}

/// A callable stand-in for one remote process.
pub struct Binding {
    name: String,
    descriptor: Arc<ProcessDescriptor>,
    parameters: Vec<Parameter>,
    doc: String,
    context: Arc<ExecutionContext>,
}

impl Binding {
    pub fn new(descriptor: Arc<ProcessDescriptor>, context: Arc<ExecutionContext>) -> Self {
        let parameters = parameters(&descriptor);
        let doc = doc::process_doc(&descriptor);
        Self {
            name: sanitize(&descriptor.identifier),
            descriptor,
            parameters,
            doc,
            context,
        }
    }

    /// Sanitized name of the process.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn identifier(&self) -> &str {
        &self.descriptor.identifier
    }

    pub fn descriptor(&self) -> &Arc<ProcessDescriptor> {
        &self.descriptor
    }

    /// Parameters in signature order, excluding the trailing output format
    /// override.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Help text in numpy docstring layout.
    pub fn doc(&self) -> &str {
        &self.doc
    }

    /// One line rendering of the parameter list, e.g.
    /// `inout(string, int=7, output_formats=None)`.
    pub fn signature(&self) -> String {
        let mut params: Vec<String> = self
            .parameters
            .iter()
            .map(|parameter| match (&parameter.default, parameter.required) {
                (Some(LiteralValue::String(default)), _) => {
                    format!("{}={default:?}", parameter.name)
                }
                (Some(default), _) => format!("{}={default}", parameter.name),
                (None, true) => parameter.name.clone(),
                (None, false) => format!("{}=None", parameter.name),
            })
            .collect();
        params.push(format!("{OUTPUT_FORMATS_PARAM}=None"));
        format!("{}({})", self.name, params.join(", "))
    }

    /// Resolves `invocation` against the parameter list, applying defaults.
    pub fn bind(&self, invocation: Invocation) -> Result<BoundArgs, ArgumentError> {
        let Invocation {
            positional,
            keyword,
            output_formats,
        } = invocation;

        if positional.len() > self.parameters.len() {
            return Err(ArgumentError::TooManyPositional {
                binding: self.name.clone(),
                max: self.parameters.len(),
                got: positional.len(),
            });
        }
        let mut slots: Vec<Option<Arg>> = vec![None; self.parameters.len()];
        for (slot, arg) in slots.iter_mut().zip(positional) {
            *slot = Some(arg);
        }

        for (name, arg) in keyword {
            let index = self
                .parameters
                .iter()
                .position(|p| p.name == name || p.identifier == name)
                .ok_or_else(|| ArgumentError::UnknownParameter {
                    binding: self.name.clone(),
                    name: name.clone(),
                })?;
            if slots[index].is_some() {
                return Err(ArgumentError::DuplicateArgument {
                    binding: self.name.clone(),
                    name: self.parameters[index].name.clone(),
                });
            }
            slots[index] = Some(arg);
        }

        let mut values = Vec::new();
        for (parameter, slot) in self.parameters.iter().zip(slots) {
            let given = match (slot, &parameter.default) {
                (Some(arg), _) => {
                    let given = arg.into_values();
                    if parameter.required && given.is_empty() {
                        return Err(ArgumentError::MissingArgument {
                            binding: self.name.clone(),
                            name: parameter.name.clone(),
                        });
                    }
                    if given.len() < parameter.min_occurs as usize {
                        return Err(ArgumentError::TooFewValues {
                            binding: self.name.clone(),
                            name: parameter.name.clone(),
                            min: parameter.min_occurs,
                            got: given.len(),
                        });
                    }
                    given
                }
                (None, Some(default)) => vec![InputValue::Literal(default.clone())],
                (None, None) if parameter.required => {
                    return Err(ArgumentError::MissingArgument {
                        binding: self.name.clone(),
                        name: parameter.name.clone(),
                    });
                }
                (None, None) => continue,
            };
            if given.len() > parameter.max_occurs as usize {
                return Err(ArgumentError::TooManyValues {
                    binding: self.name.clone(),
                    name: parameter.name.clone(),
                    max: parameter.max_occurs,
                    got: given.len(),
                });
            }
            if !given.is_empty() {
                values.push((parameter.identifier.clone(), given));
            }
        }

        Ok(BoundArgs {
            values,
            output_formats,
        })
    }

    /// Starts an execution and returns without waiting for it to finish.
    pub fn submit(&self, invocation: Invocation) -> Result<ExecutionResult, Error> {
        let bound = self.bind(invocation)?;
        let engine = &self.context.engine;
        let inputs = engine.build_inputs(&self.descriptor, &bound)?;
        let outputs = engine.choose_outputs(&self.descriptor, bound.output_formats.as_ref());
        let mode = engine.select_mode(&self.descriptor);
        let handle = engine.submit(&self.descriptor.identifier, inputs, outputs, mode)?;
        Ok(ExecutionResult::new(
            handle,
            self.descriptor.clone(),
            self.context.clone(),
        ))
    }

    /// Executes the process. In interactive mode an asynchronous execution
    /// is waited on, logging its progress.
    pub fn call(&self, invocation: Invocation) -> Result<ExecutionResult, Error> {
        let mut result = self.submit(invocation)?;
        if self.context.engine.is_interactive() && !result.is_complete() {
            result.wait(&mut LogEvents::new(&self.descriptor.identifier))?;
        }
        Ok(result)
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("name", &self.name)
            .field("parameters", &self.parameters)
            .finish_non_exhaustive()
    }
}
