//! Attachment loader capability injected into the binary reader.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::Error;

/// Opaque renderer-side handle (texture region, GPU resource id, ...) bound to an attachment.
#[derive(Clone)]
pub struct RendererObject(pub Arc<dyn Any + Send + Sync>);

impl RendererObject {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for RendererObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RendererObject(..)")
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum AttachmentKind {
    Region,
    BoundingBox,
    Mesh,
    LinkedMesh,
    Path,
    Point,
    Clipping,
}

impl AttachmentKind {
    /// Decodes the attachment type byte.
    pub fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(Self::Region),
            1 => Ok(Self::BoundingBox),
            2 => Ok(Self::Mesh),
            3 => Ok(Self::LinkedMesh),
            4 => Ok(Self::Path),
            5 => Ok(Self::Point),
            6 => Ok(Self::Clipping),
            tag => Err(Error::UnsupportedAttachmentType { tag }),
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct AttachmentRequest<'a> {
    pub skin: &'a str,
    pub name: &'a str,
    /// Region path. Equal to `name` unless the export overrides it.
    pub path: &'a str,
    pub kind: AttachmentKind,
}

#[derive(Clone, Debug)]
pub enum Binding {
    /// Leave the attachment out of the skin.
    Skip,
    /// Keep the attachment without a renderer object.
    Unbound,
    Bound(RendererObject),
}

/// Resolves attachments to renderer resources while a skeleton is read.
pub trait AttachmentLoader {
    fn new_attachment(&mut self, request: &AttachmentRequest<'_>) -> Result<Binding, Error>;
}

impl<F> AttachmentLoader for F
where
    F: FnMut(&AttachmentRequest<'_>) -> Result<Binding, Error>,
{
    fn new_attachment(&mut self, request: &AttachmentRequest<'_>) -> Result<Binding, Error> {
        self(request)
    }
}

/// Keeps every attachment and binds nothing.
#[derive(Copy, Clone, Debug, Default)]
pub struct NullAttachmentLoader;

impl AttachmentLoader for NullAttachmentLoader {
    fn new_attachment(&mut self, _request: &AttachmentRequest<'_>) -> Result<Binding, Error> {
        Ok(Binding::Unbound)
    }
}
