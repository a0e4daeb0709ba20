//! Dispatch tables from a one-octet type code to the strategy that decodes it.
//!
//! A [TypeRegistry] is built by a `const fn` from an explicit list of
//! `(code, strategy)` pairs and lives in a `static`, so it is complete before
//! any datagram is decoded and can be read from any thread without locking.
//! Registering one code twice is rejected at compile time.
//!
//! ```rust
//! use netcodec::wire::TypeRegistry;
//!
//! static LENGTHS: TypeRegistry<u8, usize> = TypeRegistry::new(&[(2, 4), (3, 3)]);
//!
//! assert_eq!(LENGTHS.get(3), Some(&3));
//! assert_eq!(LENGTHS.get(9), None);
//! assert_eq!(LENGTHS.codes().collect::<Vec<_>>(), vec![2, 3]);
//! ```

use core::marker::PhantomData;

/// A table mapping every possible value of a one-octet type code `K` to an
/// optional strategy `V`.
///
/// A missing entry means the code is unregistered; callers fall back to the
/// opaque variant of their family.
pub struct TypeRegistry<K, V: 'static> {
    table: [Option<V>; 256],
    kind: PhantomData<fn(K)>,
}

impl<K, V: Copy + 'static> TypeRegistry<K, V> {
    /// Build the table from `(code, strategy)` pairs.
    ///
    /// # Panics
    /// Panics (at compile time, when used to initialize a `static`) if a code
    /// appears twice.
    pub const fn new(entries: &[(u8, V)]) -> TypeRegistry<K, V> {
        let mut table = [None; 256];
        let mut index = 0;
        while index < entries.len() {
            let (code, strategy) = entries[index];
            assert!(table[code as usize].is_none(), "type code registered twice");
            table[code as usize] = Some(strategy);
            index += 1;
        }
        TypeRegistry {
            table,
            kind: PhantomData,
        }
    }

    /// Look up the strategy for a type code.
    #[inline]
    pub fn get(&self, code: K) -> Option<&V>
    where
        K: Into<u8>,
    {
        self.get_raw(code.into())
    }

    /// Look up the strategy for the raw octet of a type code.
    #[inline]
    pub fn get_raw(&self, code: u8) -> Option<&V> {
        self.table[code as usize].as_ref()
    }

    /// Whether a strategy is registered for the type code.
    pub fn contains(&self, code: K) -> bool
    where
        K: Into<u8>,
    {
        self.get(code).is_some()
    }

    /// The registered type codes, in ascending order.
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.table
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.is_some())
            .map(|(code, _)| code as u8)
    }
}

impl<K, V: core::fmt::Debug + 'static> core::fmt::Debug for TypeRegistry<K, V> {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_map()
            .entries(
                self.table
                    .iter()
                    .enumerate()
                    .filter_map(|(code, entry)| entry.as_ref().map(|entry| (code, entry))),
            )
            .finish()
    }
}
