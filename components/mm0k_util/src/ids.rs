//! Primitive kernel types that consuming crates will probably want.

use std::fmt;
use std::iter::FromIterator;
use std::ops::{Deref, DerefMut, Index, IndexMut};

macro_rules! id_wrapper {
  ($id:ident: $ty:ty, $vec:ident) => {
    id_wrapper!($id: $ty, $vec,
      concat!("An index into a [`", stringify!($vec), "`]"));
  };
  ($id:ident: $ty:ty, $vec:ident, $svec:expr) => {
    #[doc=$svec]
    #[derive(Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Default)]
    pub struct $id(pub $ty);

    impl $id {
      /// Convert this newtyped integer into its underlying integer.
      #[must_use]
      pub fn into_inner(self) -> $ty { self.0 }
    }

    impl fmt::Debug for $id {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
    }

    impl fmt::Display for $id {
      fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { self.0.fmt(f) }
    }

    /// A vector wrapper with a strongly typed index interface.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct $vec<T>(pub Vec<T>);

    #[allow(dead_code)]
    impl<T> $vec<T> {
      /// Get a reference to the element at the given index.
      #[must_use]
      pub fn get(&self, i: $id) -> Option<&T> { self.0.get(i.0 as usize) }

      /// Get a mutable reference to the element at the given index.
      #[must_use]
      pub fn get_mut(&mut self, i: $id) -> Option<&mut T> { self.0.get_mut(i.0 as usize) }

      /// The index that the next call to [`push`](Self::push) will return,
      /// or `None` if the index space is exhausted.
      #[must_use]
      pub fn next_id(&self) -> Option<$id> { self.0.len().try_into().ok().map($id) }

      /// Push a new element, returning its index.
      pub fn push(&mut self, t: T) -> $id {
        let id = self.next_id().expect("overflow");
        self.0.push(t);
        id
      }

      /// Returns the equivalent of `iter().enumerate()` but with the right indexing type.
      pub fn enum_iter(&self) -> impl Iterator<Item=($id, &T)> {
        self.0.iter().enumerate().map(|(i, t)| ($id(i as $ty), t))
      }
    }

    impl<T> Default for $vec<T> {
      fn default() -> $vec<T> { $vec(Vec::new()) }
    }

    impl<T> Index<$id> for $vec<T> {
      type Output = T;
      fn index(&self, i: $id) -> &T { &self.0[i.0 as usize] }
    }

    impl<T> IndexMut<$id> for $vec<T> {
      fn index_mut(&mut self, i: $id) -> &mut T { &mut self.0[i.0 as usize] }
    }

    impl<T> Deref for $vec<T> {
      type Target = Vec<T>;
      fn deref(&self) -> &Vec<T> { &self.0 }
    }

    impl<T> DerefMut for $vec<T> {
      fn deref_mut(&mut self) -> &mut Vec<T> { &mut self.0 }
    }

    impl<T> FromIterator<T> for $vec<T> {
      fn from_iter<I: IntoIterator<Item=T>>(iter: I) -> Self { $vec(Vec::from_iter(iter)) }
    }
  };
}

id_wrapper!(SortId: u8, SortVec);
id_wrapper!(TermId: u32, TermVec);
id_wrapper!(ThmId: u32, ThmVec);

bitflags! {
  /// Sort modifiers.
  #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
  pub struct Modifiers: u8 {
    // Note: These particular values are important because they are used in the binary format.

    /// The `pure` sort modifier: variables of this sort may be bound
    /// (as binders or dummies) and participate in disjointness constraints.
    const PURE = 1;

    /// The `strict` sort modifier: no term constructor may target this sort,
    /// so its expressions are always variables.
    const STRICT = 2;

    /// The `provable` sort modifier, used to indicate that this sort
    /// can appear as the sort of hypotheses and conclusions of
    /// `axiom` and `theorem` declarations.
    const PROVABLE = 4;

    /// The `free` sort modifier: expressions of this sort may not contain
    /// bound variables at all.
    const FREE = 8;
  }
}

impl Modifiers {
  /// The null modifier set. Modifiers are represented as bitfields, so this is the same as `0`.
  pub const NONE: Modifiers = Self::empty();

  /// Construct a [`Modifiers`] from a byte, keeping any unknown bits so that
  /// [`Modifiers::is_sort_data`] can reject them.
  #[must_use]
  pub fn new(bits: u8) -> Self { Self::from_bits_retain(bits) }

  /// The set of all valid sort modifiers. One can check if a modifier set is valid for a sort
  /// using `sort_data().contains(m)`.
  #[must_use]
  pub fn sort_data() -> Modifiers {
    Modifiers::PURE | Modifiers::STRICT | Modifiers::PROVABLE | Modifiers::FREE
  }

  /// True if this modifier set is a valid sort modifier set.
  #[must_use]
  pub fn is_sort_data(self) -> bool { Self::sort_data().contains(self) }

  /// Parses a string into a singleton [`Modifiers`], or [`NONE`](Self::NONE) if the string is not valid.
  #[must_use]
  pub fn from_name(s: &[u8]) -> Modifiers {
    match s {
      b"pure" => Modifiers::PURE,
      b"strict" => Modifiers::STRICT,
      b"provable" => Modifiers::PROVABLE,
      b"free" => Modifiers::FREE,
      _ => Modifiers::NONE
    }
  }
}

impl fmt::Display for Modifiers {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut first = true;
    for (name, m) in [
      ("pure", Modifiers::PURE),
      ("strict", Modifiers::STRICT),
      ("provable", Modifiers::PROVABLE),
      ("free", Modifiers::FREE),
    ] {
      if self.contains(m) {
        if !first { write!(f, " ")? }
        write!(f, "{name}")?;
        first = false
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn modifier_names() {
    let m = Modifiers::from_name(b"pure") | Modifiers::from_name(b"provable");
    assert_eq!(m, Modifiers::PURE | Modifiers::PROVABLE);
    assert_eq!(m.to_string(), "pure provable");
    assert_eq!(Modifiers::from_name(b"pub"), Modifiers::NONE);
    assert!(m.is_sort_data());
    assert!(!Modifiers::new(0x10).is_sort_data());
  }

  #[test]
  fn typed_push() {
    let mut v = TermVec::default();
    assert_eq!(v.push("a"), TermId(0));
    assert_eq!(v.push("b"), TermId(1));
    assert_eq!(v[TermId(1)], "b");
    assert_eq!(v.next_id(), Some(TermId(2)));
    let ids: Vec<_> = v.enum_iter().map(|(i, _)| i).collect();
    assert_eq!(ids, [TermId(0), TermId(1)]);
  }
}
