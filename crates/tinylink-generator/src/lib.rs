pub mod hash;

pub use hash::{HashGenerator, HashGeneratorSettings};

/// Trait for generating short codes.
///
/// Implementations are pure functions of their input and keep no shared
/// sequential state, so concurrent callers never coordinate through them.
/// Storage is never consulted; collision handling belongs to the caller.
pub trait Generator: Send + Sync + 'static {
    /// Produces the code for `original_url` on the given retry `attempt`.
    ///
    /// The same `(original_url, attempt)` always yields the same code.
    /// Attempts greater than zero salt the input so the caller can step
    /// away from a colliding code.
    fn generate(&self, original_url: &str, attempt: u32) -> String;
}
