//! Core element trait.

use crate::buffer::Buffer;
use crate::error::Result;

/// A transform element: receives buffers and passes them on.
///
/// # Return Values
///
/// - `Ok(Some(buffer))`: Emit a buffer downstream
/// - `Ok(None)`: Drop this buffer (filter it out)
/// - `Err(...)`: Signal an error
///
/// # Example
///
/// ```rust,ignore
/// struct Tagger;
///
/// impl Element for Tagger {
///     fn process(&mut self, mut buffer: Buffer) -> Result<Option<Buffer>> {
///         buffer.add_meta(/* ... */);
///         Ok(Some(buffer))
///     }
/// }
/// ```
pub trait Element: Send {
    /// Process an input buffer and optionally produce an output buffer.
    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>>;

    /// Get the name of this element (for debugging/logging).
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

impl<E: Element + ?Sized> Element for Box<E> {
    fn process(&mut self, buffer: Buffer) -> Result<Option<Buffer>> {
        (**self).process(buffer)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
