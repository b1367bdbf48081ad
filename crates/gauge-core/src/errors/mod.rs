pub mod diagnostic;

pub use diagnostic::{codes, Diagnostic};

/// Downcast an anyhow error chain to a structured Diagnostic, if one is present.
pub fn try_map_error(e: &anyhow::Error) -> Option<&Diagnostic> {
    e.chain().find_map(|cause| cause.downcast_ref::<Diagnostic>())
}
