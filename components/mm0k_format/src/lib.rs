//! Import and export functionality for the binary proof format.
//!
//! A file consists of a [`Header`], a sort table, a term table, a theorem table,
//! the argument lists and statement streams of the terms and theorems, a declaration
//! stream containing the proofs, and an optional name index.

// rust lints we want
#![warn(
  bare_trait_objects,
  elided_lifetimes_in_paths,
  missing_copy_implementations,
  missing_debug_implementations,
  future_incompatible,
  rust_2018_idioms,
  trivial_numeric_casts,
  variant_size_differences,
  unreachable_pub,
  unused,
  missing_docs
)]
#![deny(unsafe_op_in_unsafe_fn)]
// all the clippy
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// all the clippy::restriction lints we want
#![warn(
  clippy::else_if_without_else,
  clippy::float_arithmetic,
  clippy::get_unwrap,
  clippy::inline_asm_x86_att_syntax,
  clippy::integer_division,
  clippy::rc_buffer,
  clippy::rest_pat_in_fully_bound_structs,
  clippy::string_add,
  clippy::undocumented_unsafe_blocks,
  clippy::unwrap_used
)]
// all the clippy lints we don't want
#![allow(
  clippy::cognitive_complexity,
  clippy::comparison_chain,
  clippy::default_trait_access,
  clippy::inline_always,
  clippy::manual_filter_map,
  clippy::map_err_ignore,
  clippy::missing_const_for_fn,
  clippy::missing_errors_doc,
  clippy::missing_panics_doc,
  clippy::module_name_repetitions,
  clippy::multiple_crate_versions,
  clippy::option_if_let_else,
  clippy::redundant_pub_crate,
  clippy::semicolon_if_nothing_returned,
  clippy::shadow_unrelated,
  clippy::too_many_lines,
  clippy::use_self
)]

mod parser;
mod ty;
mod write;

use std::ffi::CStr;
use std::mem::size_of;

use mm0k_util::{Modifiers, SortId, TermId, ThmId};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, LE, U16, U32, U64, Unaligned};

pub use mm0k_util::u32_as_usize;
pub use {parser::*, ty::*, write::*};

/// The maximum number of bound variables supported by the format.
pub const MAX_BOUND_VARS: usize = 55;

/// The maximum number of sorts supported by the format.
pub const MAX_SORTS: usize = 128;

/// Constants used in the binary format.
pub mod cmd {
  /// `MM0K_MAGIC = "MM0K"`: Magic number signalling the binary format is in use.
  pub const MM0K_MAGIC: [u8; 4] = *b"MM0K";
  /// `MM0K_VERSION = 1`, maximum supported version
  pub const MM0K_VERSION: u8 = 1;

  /// `DATA_8 = 0x40`, used as a command mask for an 8 bit data field
  pub const DATA_8: u8 = 0x40;
  /// `DATA_16 = 0x80`, used as a command mask for a 16 bit data field
  pub const DATA_16: u8 = 0x80;
  /// `DATA_32 = 0xC0`, used as a command mask for a 32 bit data field
  pub const DATA_32: u8 = 0xC0;
  /// `DATA_MASK = 0xC0`, selects one of `DATA_8`, `DATA_16`, or `DATA_32` for data size
  pub const DATA_MASK: u8 = 0xC0;

  /// `CMD_END = 0x00`, ends a proof stream, a statement stream, or the declaration stream
  pub const CMD_END: u8 = 0x00;

  /// `STMT_AXIOM = 0x02`, starts an `axiom` declaration
  pub const STMT_AXIOM: u8 = 0x02;
  /// `STMT_SORT = 0x04`, starts a `sort` declaration
  pub const STMT_SORT: u8 = 0x04;
  /// `STMT_TERM = 0x05`, starts a `term` declaration
  pub const STMT_TERM: u8 = 0x05;
  /// `STMT_THM = 0x06`, starts a `theorem` declaration
  pub const STMT_THM: u8 = 0x06;

  /// `PROOF_TERM = 0x10`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_TERM: u8 = 0x10;
  /// `PROOF_REF = 0x12`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_REF: u8 = 0x12;
  /// `PROOF_DUMMY = 0x13`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_DUMMY: u8 = 0x13;
  /// `PROOF_THM = 0x14`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_THM: u8 = 0x14;
  /// `PROOF_HYP = 0x16`: See [`ExprCmd`](super::ExprCmd).
  pub const PROOF_HYP: u8 = 0x16;
  /// `PROOF_SAVE = 0x1F`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_SAVE: u8 = 0x1F;
  /// `PROOF_SORRY = 0x20`: See [`ProofCmd`](super::ProofCmd).
  pub const PROOF_SORRY: u8 = 0x20;

  /// `"Name"` is the magic number for the name table.
  pub const INDEX_NAME: [u8; 4] = *b"Name";
}

#[inline]
fn u64_as_usize(n: U64<LE>) -> usize {
  n.get().try_into().expect("here's a nickel, get a better computer")
}

/// Construct a <code>&amp;[CStr]</code> from a prefix byte slice, by terminating at
/// the first nul character. The second output is the remainder of the slice.
#[must_use]
pub fn cstr_from_bytes_prefix(bytes: &[u8]) -> Option<(&CStr, &[u8])> {
  let mid = memchr::memchr(0, bytes)? + 1;
  let (left, right) = bytes.split_at(mid);
  let cstr = CStr::from_bytes_with_nul(left).ok()?;
  Some((cstr, right))
}

/// The main part of the proof consists of a sequence of declarations,
/// and these commands denote the different kind of declaration that can
/// be introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtCmd {
  /// A new sort. This is followed by no data, as the sort data is stored in the header.
  Sort,
  /// A new axiom. This is followed by an optional statement script, a proof
  /// stream whose result is the axiom's conclusion as an expression.
  Axiom,
  /// A new term. This is followed by no data, as the signature is in the term table.
  Term,
  /// A new theorem. This is followed by a proof stream whose result is a proof of
  /// the conclusion.
  Thm,
}

/// [`StmtCmd`] aware of its position (represented by a typesafe integer)
/// in the file relative to other declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumdStmtCmd {
  /// A new sort.
  Sort {
    /// The sort ID, the index into the sort table
    sort_id: SortId,
  },
  /// A new axiom.
  Axiom {
    /// The theorem ID, the index into the axiom/theorem table
    thm_id: ThmId,
  },
  /// A new term.
  Term {
    /// The term ID, the index into the term table
    term_id: TermId,
  },
  /// A new theorem.
  Thm {
    /// The theorem ID, the index into the axiom/theorem table
    thm_id: ThmId,
  },
}

impl TryFrom<u8> for StmtCmd {
  type Error = ParseError;
  fn try_from(cmd: u8) -> Result<Self, Self::Error> {
    Ok(match cmd {
      cmd::STMT_SORT => StmtCmd::Sort,
      cmd::STMT_AXIOM => StmtCmd::Axiom,
      cmd::STMT_TERM => StmtCmd::Term,
      cmd::STMT_THM => StmtCmd::Thm,
      _ => return Err(ParseError::StmtCmdConv(cmd)),
    })
  }
}

impl From<StmtCmd> for u8 {
  fn from(s: StmtCmd) -> u8 {
    match s {
      StmtCmd::Sort => cmd::STMT_SORT,
      StmtCmd::Axiom => cmd::STMT_AXIOM,
      StmtCmd::Term => cmd::STMT_TERM,
      StmtCmd::Thm => cmd::STMT_THM,
    }
  }
}

/// A proof command, which acts on a stack machine with the following components:
///
/// * `H: Vec<StackEl>`: a "heap" consisting of indexable elements that can be copied
///   onto the stack using [`Ref`](ProofCmd::Ref). It starts out holding the
///   variables and then the hypotheses of the declaration being checked.
/// * `S: Stack<StackEl>`: The main stack, which most operations push and pop from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProofCmd {
  /// ```text
  /// Term t: H; S, e1, ..., en --> H; S, (t e1 .. en)
  /// ```
  /// Pop `n` elements from the stack (where `n` is the arity of `t`)
  /// and push the term `t` applied to those expressions.
  Term(TermId),
  /// ```text
  /// Ref i: H; S --> H; S, Hi
  /// ```
  /// Push a copy of the `i`-th heap element.
  Ref(u32),
  /// ```text
  /// Dummy s: H; S --> H, x; S, x    alloc(x:s)
  /// ```
  /// Allocate a new bound variable `x` of sort `s`, and push it to the stack and the heap.
  Dummy(SortId),
  /// ```text
  /// Thm T: H; S, e1, ..., en, |- h1, ..., |- hm --> H; S, |- T[e/x]
  /// ```
  /// Pop the arguments and hypothesis proofs of `T`, check them against
  /// `T`'s binders, hypotheses and disjointness conditions, and push
  /// the substituted conclusion as a proven statement.
  Thm(ThmId),
  /// ```text
  /// Save: H; S, s --> H, s; S, s
  /// ```
  /// Save the top of the stack to the heap, without popping it.
  Save,
  /// ```text
  /// Sorry: S --> S, ?
  /// ```
  /// Push a placeholder that stands for any proof. This step exists only for
  /// incomplete proofs; a proof that uses it is never accepted.
  Sorry,
  /// ```text
  /// End: S, s --> .
  /// ```
  /// Finish the proof: the stack must contain exactly the conclusion.
  End,
}

impl TryFrom<(u8, u32)> for ProofCmd {
  type Error = ParseError;
  fn try_from((cmd, data): (u8, u32)) -> Result<Self, Self::Error> {
    Ok(match cmd {
      cmd::CMD_END if data == 0 => ProofCmd::End,
      cmd::PROOF_TERM => ProofCmd::Term(TermId(data)),
      cmd::PROOF_REF => ProofCmd::Ref(data),
      cmd::PROOF_DUMMY =>
        ProofCmd::Dummy(SortId(data.try_into().map_err(|_| ParseError::ProofCmdConv(cmd, data))?)),
      cmd::PROOF_THM => ProofCmd::Thm(ThmId(data)),
      cmd::PROOF_SAVE => ProofCmd::Save,
      cmd::PROOF_SORRY => ProofCmd::Sorry,
      _ => return Err(ParseError::ProofCmdConv(cmd, data)),
    })
  }
}

/// A command in a statement stream.
///
/// Statement streams appear in the theorem table after the argument list. They build
/// the hypotheses and then the conclusion of the theorem in postfix order:
///
/// * `S: Stack<Expr>`: expressions under construction.
/// * `HS: Vec<Expr>`: the hypotheses collected so far.
///
/// When the stream ends, `S` must contain exactly the conclusion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprCmd {
  /// ```text
  /// Ref i: S --> S, xi
  /// ```
  /// Push the `i`-th variable of the theorem.
  Ref(u32),
  /// ```text
  /// Term t: S, e1, ..., en --> S, (t e1 .. en)
  /// ```
  /// Pop the arguments of `t` and push the application.
  Term(TermId),
  /// ```text
  /// Hyp: HS; S, e --> HS, e; S
  /// ```
  /// Pop a finished expression and record it as the next hypothesis.
  Hyp,
}

impl TryFrom<(u8, u32)> for ExprCmd {
  type Error = ParseError;
  fn try_from((cmd, data): (u8, u32)) -> Result<Self, Self::Error> {
    Ok(match cmd {
      cmd::PROOF_REF => ExprCmd::Ref(data),
      cmd::PROOF_TERM => ExprCmd::Term(TermId(data)),
      cmd::PROOF_HYP if data == 0 => ExprCmd::Hyp,
      _ => return Err(ParseError::ExprCmdConv(cmd, data)),
    })
  }
}

/// The header of a binary proof file, which is always in the first bytes of the file.
/// It is followed by a <code>sorts: [[SortData]; num_sorts]</code> array
/// (which we keep separate because of the dependency).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct Header {
  /// The magic number, which is used to identify this as a proof file. Must be
  /// equal to [`MM0K_MAGIC`](cmd::MM0K_MAGIC) = `"MM0K"`.
  pub magic: [u8; 4],
  /// The format version number. Must equal [`MM0K_VERSION`](cmd::MM0K_VERSION) = 1.
  pub version: u8,
  /// The number of sorts in the file. This is limited to 128.
  pub num_sorts: u8,
  /// Padding.
  pub reserved: [u8; 2],
  /// The number of terms in the file.
  pub num_terms: U32<LE>,
  /// The number of axioms and theorems in the file.
  pub num_thms: U32<LE>,
  /// The pointer to the term table of type <code>[[TermEntry]; num_terms]</code>.
  pub p_terms: U32<LE>,
  /// The pointer to the theorem table of type <code>[[ThmEntry]; num_thms]</code>.
  pub p_thms: U32<LE>,
  /// The pointer to the declaration stream.
  pub p_proof: U32<LE>,
  /// Padding.
  pub reserved2: [u8; 4],
  /// The pointer to the index header, an array of [`TableEntry`] preceded by its length,
  /// or 0 if there is no index.
  pub p_index: U64<LE>,
}

impl Header {
  /// On top of the magic number and version checks, make sure that the tables
  /// the header points to are laid out in order and inside the file.
  pub fn check(&self, buf: &[u8]) -> Result<(), ParseError> {
    use crate::cmd::{MM0K_MAGIC, MM0K_VERSION};

    if self.magic != MM0K_MAGIC {
      return Err(ParseError::BadMagic { parsed_magic: self.magic })
    }
    if self.version != MM0K_VERSION {
      return Err(ParseError::BadVersion { parsed_version: self.version })
    }
    if usize::from(self.num_sorts) > MAX_SORTS {
      return Err(ParseError::SuspectHeader)
    }

    let p_terms = u32_as_usize(self.p_terms.get());
    let p_thms = u32_as_usize(self.p_thms.get());
    let p_proof = u32_as_usize(self.p_proof.get());
    let p_index = u64_as_usize(self.p_index);
    let headerspace = size_of::<Header>();
    let sortspace = usize::from(self.num_sorts);
    let termspace = size_of::<TermEntry>().checked_mul(u32_as_usize(self.num_terms.get()));
    let thmspace = size_of::<ThmEntry>().checked_mul(u32_as_usize(self.num_thms.get()));
    let (Some(termspace), Some(thmspace)) = (termspace, thmspace) else {
      return Err(ParseError::SuspectHeader)
    };
    if headerspace + sortspace <= p_terms
      && p_terms.checked_add(termspace).is_some_and(|n| n <= p_thms)
      && p_thms.checked_add(thmspace).is_some_and(|n| n <= p_proof)
      && p_proof < buf.len()
      && (p_index == 0 || p_proof < p_index && p_index <= buf.len())
    {
      Ok(())
    } else {
      Err(ParseError::SuspectHeader)
    }
  }
}

/// A sort entry in the file header.
///
/// Each sort is one byte, which can be any combination
/// of the modifiers in [`Modifiers::sort_data`]: [`PURE`](Modifiers::PURE),
/// [`STRICT`](Modifiers::STRICT), [`PROVABLE`](Modifiers::PROVABLE), [`FREE`](Modifiers::FREE).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct SortData(pub u8);

impl From<SortData> for Modifiers {
  #[inline]
  fn from(s: SortData) -> Modifiers { Modifiers::new(s.0) }
}

impl From<Modifiers> for SortData {
  #[inline]
  fn from(m: Modifiers) -> SortData { SortData(m.bits()) }
}

/// An entry in the term table, which describes the "signature" of the term,
/// the information needed to apply the term and use it in theorems.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TermEntry {
  /// The number of arguments to the term.
  pub num_args: U16<LE>,
  /// The return sort of the term.
  pub sort: u8,
  /// Flags, currently required to be zero.
  pub flags: u8,
  /// The pointer to an <code>args: [[Arg]; num_args + 1]</code> array.
  /// `args[num_args]` is the return type and dependencies,
  /// and `args[..num_args]` are the actual arguments.
  pub p_args: U32<LE>,
}

/// An entry in the theorem table, which describes the "signature" of the axiom/theorem,
/// the information needed to apply the theorem to use it in other theorems.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ThmEntry {
  /// The number of arguments to the theorem (exprs, not hyps).
  pub num_args: U16<LE>,
  /// Padding.
  pub reserved: [u8; 2],
  /// The pointer to an <code>args: [[Arg]; num_args]</code> array, followed by the
  /// theorem's statement stream (see [`ExprCmd`]).
  pub p_args: U32<LE>,
}

/// An index table entry, which is essentially an ID describing the table format, and some
/// additional data to find the actual table.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct TableEntry {
  /// A magic number that identifies this table entry, and determines the interpretation of the
  /// rest of the data.
  pub id: [u8; 4],
  /// A 4 byte data field whose interpretation depends on the entry type.
  pub data: U32<LE>,
  /// An 8 byte data field whose interpretation depends on the entry type, but is generally a
  /// pointer to the actual table data.
  pub ptr: U64<LE>,
}

/// An individual symbol name entry in the index.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct NameEntry {
  /// A pointer to the location in the proof stream which introduced this entity.
  pub p_proof: U64<LE>,
  /// A pointer to the entity's name as a UTF-8 C string, or 0 if it has no name.
  pub p_name: U64<LE>,
}
