//! Byte-addressable memory as seen by the core's typed load/store primitives.
//!
//! The backing representation is owned by an external collaborator (e.g. the hex memory-file
//! loader); this module only defines the interface the execution semantics require of it, plus a
//! flat, `Vec<u8>`-backed implementation used by tests.

use thiserror::Error;

/// Outcome of a typed memory access: either the value, or an exception code to trap with.
pub type LoadResult<T> = Result<T, MemoryError>;

/// Errors a [`Memory`] implementation can report for a single typed access.
#[derive(Error, Debug, Copy, Clone, Eq, PartialEq)]
pub enum MemoryError {
    /// The address is not naturally aligned to the access width.
    #[error("misaligned memory access")]
    MisalignedAccess,
    /// The address (or some byte of the access) is outside of backing storage.
    #[error("memory access fault")]
    AccessFault,
}

/// Byte-addressable memory with typed 8/16/32/64-bit read and write operations.
///
/// Implementations serialize multi-byte values in little-endian order, per the RISC-V memory
/// model.
pub trait Memory: std::fmt::Debug {
    fn read_u8(&self, address: u64) -> LoadResult<u8>;
    fn read_u16(&self, address: u64) -> LoadResult<u16>;
    fn read_u32(&self, address: u64) -> LoadResult<u32>;
    fn read_u64(&self, address: u64) -> LoadResult<u64>;

    fn write_u8(&mut self, address: u64, value: u8) -> LoadResult<()>;
    fn write_u16(&mut self, address: u64, value: u16) -> LoadResult<()>;
    fn write_u32(&mut self, address: u64, value: u32) -> LoadResult<()>;
    fn write_u64(&mut self, address: u64, value: u64) -> LoadResult<()>;
}

/// A flat, fixed-size, zero-initialized memory backed by a `Vec<u8>`.
///
/// Stands in for the out-of-scope hex memory-file loader in tests.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    bytes: Vec<u8>,
}

impl FlatMemory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn with_image(image: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: image.into(),
        }
    }

    fn slice(&self, address: u64, len: usize) -> LoadResult<&[u8]> {
        let start = usize::try_from(address).map_err(|_| MemoryError::AccessFault)?;
        let end = start.checked_add(len).ok_or(MemoryError::AccessFault)?;
        self.bytes.get(start..end).ok_or(MemoryError::AccessFault)
    }

    fn slice_mut(&mut self, address: u64, len: usize) -> LoadResult<&mut [u8]> {
        let start = usize::try_from(address).map_err(|_| MemoryError::AccessFault)?;
        let end = start.checked_add(len).ok_or(MemoryError::AccessFault)?;
        self.bytes
            .get_mut(start..end)
            .ok_or(MemoryError::AccessFault)
    }
}

macro_rules! access_fns {
    ( $( $read_fn:ident, $write_fn:ident => $u:ident ),* $(,)? ) => {
        $(
            fn $read_fn(&self, address: u64) -> LoadResult<$u> {
                let bytes = self.slice(address, std::mem::size_of::<$u>())?;
                Ok($u::from_le_bytes(bytes.try_into().unwrap()))
            }

            fn $write_fn(&mut self, address: u64, value: $u) -> LoadResult<()> {
                let bytes = self.slice_mut(address, std::mem::size_of::<$u>())?;
                bytes.copy_from_slice(&value.to_le_bytes());
                Ok(())
            }
        )*
    };
}

impl Memory for FlatMemory {
    access_fns! {
        read_u8, write_u8 => u8,
        read_u16, write_u16 => u16,
        read_u32, write_u32 => u32,
        read_u64, write_u64 => u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut mem = FlatMemory::new(16);
        mem.write_u32(4, 0xDEAD_BEEF).unwrap();
        assert_eq!(0xDEAD_BEEF, mem.read_u32(4).unwrap());
        assert_eq!(0xEF, mem.read_u8(4).unwrap());
        assert_eq!(0xBEEF, mem.read_u16(6).unwrap());
    }

    #[test]
    fn test_out_of_bounds() {
        let mem = FlatMemory::new(4);
        assert_eq!(Err(MemoryError::AccessFault), mem.read_u32(1));
        assert_eq!(Err(MemoryError::AccessFault), mem.read_u64(0));
    }

    #[test]
    fn test_u64_round_trip() {
        let mut mem = FlatMemory::new(16);
        mem.write_u64(0, 0x0123_4567_89AB_CDEF).unwrap();
        assert_eq!(0x0123_4567_89AB_CDEF, mem.read_u64(0).unwrap());
    }
}
