//! Ownership of byte buffers handed out to the host.

use std::collections::HashMap;
use std::num::NonZeroU64;

use crate::error::{BridgeError, Result};

/// Opaque identifier of a published buffer. Tokens are never reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BufferHandle(NonZeroU64);

impl BufferHandle {
    pub fn token(self) -> u64 {
        self.0.get()
    }
}

/// Buffers published to the host and not yet released.
#[derive(Debug)]
pub struct BufferRegistry {
    next: u64,
    live: HashMap<BufferHandle, Box<[u8]>>,
    by_address: HashMap<usize, BufferHandle>,
}

impl Default for BufferRegistry {
    fn default() -> Self {
        Self {
            next: 1,
            live: HashMap::new(),
            by_address: HashMap::new(),
        }
    }
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies `bytes` into a new buffer owned by the registry.
    ///
    /// Empty payloads publish nothing and return `None`.
    pub fn publish(&mut self, bytes: &[u8]) -> Option<BufferHandle> {
        if bytes.is_empty() {
            return None;
        }

        let handle = BufferHandle(NonZeroU64::new(self.next)?);
        self.next += 1;

        let buffer: Box<[u8]> = bytes.into();
        self.by_address.insert(buffer.as_ptr() as usize, handle);
        self.live.insert(handle, buffer);
        Some(handle)
    }

    pub fn get(&self, handle: BufferHandle) -> Option<&[u8]> {
        self.live.get(&handle).map(|buffer| &buffer[..])
    }

    /// Handle of the live buffer whose first byte is at `address`.
    pub fn lookup_address(&self, address: *const u8) -> Option<BufferHandle> {
        self.by_address.get(&(address as usize)).copied()
    }

    pub fn release(&mut self, handle: BufferHandle) -> Result<()> {
        let buffer = self.live.remove(&handle).ok_or(BridgeError::HandleNotFound)?;
        self.by_address.remove(&(buffer.as_ptr() as usize));
        Ok(())
    }

    pub fn release_address(&mut self, address: *const u8) -> Result<()> {
        let handle = self
            .lookup_address(address)
            .ok_or(BridgeError::HandleNotFound)?;
        self.release(handle)
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }
}
