//! The binder descriptor shared by the term and theorem tables.

use mm0k_util::SortId;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U64, Unaligned};

/// bound mask: `10000000_00000000_00000000_00000000_00000000_00000000_00000000_00000000`
pub const TYPE_BOUND_MASK: u64 = 1 << 63;

/// deps mask: `00000000_11111111_11111111_11111111_11111111_11111111_11111111_11111111`
pub const TYPE_DEPS_MASK: u64 = (1 << 56) - 1;

/// An argument binder in a term or axiom/theorem.
/// * Bit 63 (the high bit of the high byte) is 1 if this is a bound variable.
/// * Bits 56-62 (the low 7 bits of the high byte) give the sort of the variable.
/// * Bits 0-55 (the low 7 bytes) are a bitset over the bound variables
///   earlier in the list. For a regular variable these are the bound variables it is
///   allowed to depend on; for a bound variable of a theorem they are the bound
///   variables it must be kept disjoint from.
#[repr(transparent)]
#[derive(
  Clone, Copy, PartialEq, Eq, Hash, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct Arg(U64<LE>);

impl std::fmt::Debug for Arg {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let kind = if self.bound() { "bound" } else { "reg" };
    write!(f, "{kind}({:?}, {:#x})", self.sort(), self.deps())
  }
}

impl From<u64> for Arg {
  fn from(n: u64) -> Arg { Arg(U64::new(n)) }
}

impl Arg {
  /// Get the u64 comprising a type
  #[must_use]
  pub fn into_inner(self) -> u64 { self.0.get() }

  /// Make a regular argument of sort `sort` depending on the bound variables in `deps`.
  #[must_use]
  pub fn reg(sort: SortId, deps: u64) -> Self {
    Arg::from((u64::from(sort.0) << 56) | (deps & TYPE_DEPS_MASK))
  }

  /// Make a bound argument of sort `sort`, disjoint from the bound variables in `dv`.
  #[must_use]
  pub fn bound_var(sort: SortId, dv: u64) -> Self {
    Arg::from(TYPE_BOUND_MASK | (u64::from(sort.0) << 56) | (dv & TYPE_DEPS_MASK))
  }

  /// True if this argument is a bound variable.
  #[inline]
  #[must_use]
  pub fn bound(self) -> bool { self.0.get() & TYPE_BOUND_MASK != 0 }

  /// The sort of this variable.
  #[allow(clippy::cast_possible_truncation)]
  #[inline]
  #[must_use]
  pub fn sort(self) -> SortId { SortId(((self.0.get() >> 56) & 0x7F) as u8) }

  /// The low 56 bits: dependencies for a regular variable,
  /// disjointness partners for a bound variable.
  #[inline]
  #[must_use]
  pub fn deps(self) -> u64 { self.0.get() & TYPE_DEPS_MASK }

  /// Does this type depend on the `bv_idx`-th bound variable?
  ///
  /// This is 0 indexed.
  #[must_use]
  pub fn depends_on(self, bv_idx: u64) -> bool { self.deps() & (1 << bv_idx) != 0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arg_fields() {
    let a = Arg::reg(SortId(3), 0b101);
    assert!(!a.bound());
    assert_eq!(a.sort(), SortId(3));
    assert!(a.depends_on(2) && !a.depends_on(1));
    let b = Arg::bound_var(SortId(0x7F), 1);
    assert!(b.bound());
    assert_eq!(b.sort(), SortId(0x7F));
    assert_eq!(b.deps(), 1);
  }
}
