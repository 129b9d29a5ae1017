use std::{ops::Deref, rc::Rc};

/// A page of memory that has been read from the guest virtual machine.
///
/// Pages are reference counted, so cloning one is cheap.
#[derive(Debug, Clone)]
pub struct VmiMappedPage(Rc<[u8]>);

impl VmiMappedPage {
    /// Creates a new mapped page.
    pub fn new(content: impl Into<Rc<[u8]>>) -> Self {
        Self(content.into())
    }
}

impl Deref for VmiMappedPage {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<[u8]> for VmiMappedPage {
    fn as_ref(&self) -> &[u8] {
        self.deref()
    }
}
