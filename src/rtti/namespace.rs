//! Class namespace creation

use super::metadata::ClassName;
use super::ParseError;
use crate::program::{HostError, NamespaceId, Program, SourceType};

fn already_defined(name: &ClassName, err: HostError) -> ParseError {
    match err {
        HostError::DuplicateName { .. } => ParseError::AlreadyDefined(name.to_string()),
        other => ParseError::Host(other),
    }
}

/// Create the class namespace under the global namespace.
///
/// A class that already exists is refused rather than reused.
pub fn materialise<P: Program + ?Sized>(
    program: &mut P,
    name: &ClassName,
) -> Result<NamespaceId, ParseError> {
    let global = program.global_namespace();
    let namespace = program
        .get_or_create_namespace(global, name.as_str(), SourceType::UserDefined)
        .map_err(|e| already_defined(name, e))?;

    program
        .convert_namespace_to_class(namespace)
        .map_err(|e| already_defined(name, e))?
        .ok_or_else(|| ParseError::NamespaceNull(name.to_string()))
}
