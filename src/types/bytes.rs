//! Shared, immutable byte blob.

use std::ops::Deref;
use std::sync::Arc;

/// Reference-counted bytes.
///
/// The resource collaborator owns the bytecode of the running part; the VM
/// keeps a clone of the handle plus a plain offset, so cloning never copies
/// the program.
#[derive(Debug, Default, Eq, PartialEq)]
pub struct Bytes(Arc<[u8]>);

impl Bytes {
    pub fn new(data: impl AsRef<[u8]>) -> Self {
        Self(Arc::from(data.as_ref()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    /// Returns true when both handles point at the same allocation.
    pub fn ptr_eq(&self, other: &Bytes) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Clone for Bytes {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl Deref for Bytes {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(v: Vec<u8>) -> Self {
        Self(Arc::from(v))
    }
}

impl From<&[u8]> for Bytes {
    fn from(s: &[u8]) -> Self {
        Self::new(s)
    }
}

impl<const N: usize> From<[u8; N]> for Bytes {
    fn from(arr: [u8; N]) -> Self {
        Self::new(arr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clone_shares_allocation() {
        let a = Bytes::from(vec![1u8, 2, 3]);
        let b = a.clone();
        assert!(a.ptr_eq(&b));
        assert_eq!(&*b, &[1, 2, 3]);
    }

    #[test]
    fn equal_contents_distinct_allocations() {
        let a = Bytes::from([4u8, 5]);
        let b = Bytes::new([4u8, 5]);
        assert_eq!(a, b);
        assert!(!a.ptr_eq(&b));
    }
}
