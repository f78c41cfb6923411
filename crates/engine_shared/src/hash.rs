// crates/engine_shared/src/hash.rs

use core::mem::{align_of, size_of};

const OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a.
///
/// Used for every identity that has to agree across independently compiled
/// modules (event categories, plugin keys, services). `TypeId` is not an
/// option there: it is only stable within one compilation.
pub const fn fnv1a(bytes: &[u8]) -> u64 {
    fnv1a_extend(OFFSET_BASIS, bytes)
}

/// Continues an FNV-1a hash with more bytes.
pub const fn fnv1a_extend(mut hash: u64, bytes: &[u8]) -> u64 {
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

/// Identity of `T` as every module sees it: its stable name plus its size
/// and alignment.
///
/// Two builds of the same type agree on this even when their `TypeId`s
/// differ. A type whose layout changed under the same name does not.
pub const fn layout_fingerprint<T>(name: &str) -> u64 {
    let hash = fnv1a(name.as_bytes());
    let hash = fnv1a_extend(hash, &(size_of::<T>() as u64).to_le_bytes());
    fnv1a_extend(hash, &(align_of::<T>() as u64).to_le_bytes())
}
