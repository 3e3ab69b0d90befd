//! The decoded form of a proof artifact, shared by the binary and textual formats.

use mm0k_format::ProofCmd;
use mm0k_util::{Modifiers, SortId};

use crate::environment::{Expr, Frame, Type};

/// A proof or statement script: a sequence of stack machine commands ending in
/// [`ProofCmd::End`].
#[derive(Clone, Debug, Default)]
pub struct Proof {
  /// The commands.
  pub cmds: Box<[ProofCmd]>,
  /// The byte offset of each command in the source, if decoded from a file.
  pub pos: Option<Box<[usize]>>,
}

impl Proof {
  /// A proof with no position information.
  #[must_use]
  pub fn new(cmds: impl IntoIterator<Item=ProofCmd>) -> Proof {
    Proof { cmds: cmds.into_iter().collect(), pos: None }
  }

  /// The byte offset of command `i`, if known.
  #[must_use]
  pub fn pos_of(&self, i: usize) -> Option<usize> { self.pos.as_ref()?.get(i).copied() }
}

/// Proofs are compared by their commands only.
impl PartialEq for Proof {
  fn eq(&self, other: &Self) -> bool { self.cmds == other.cmds }
}
impl Eq for Proof {}

/// The content of a declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Stmt {
  /// A sort with its modifiers.
  Sort(Modifiers),
  /// A term constructor with its binders and result.
  Term(Box<[Type]>, (SortId, u64)),
  /// An axiom, with an optional statement script.
  Axiom(Frame, Expr, Option<Proof>),
  /// A theorem with its proof.
  Thm(Frame, Expr, Proof),
}

/// A declaration in an artifact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decl {
  /// The name, if the artifact provides one.
  pub name: Option<Box<str>>,
  /// The byte offset of the declaration in the source.
  pub pos: usize,
  /// The content.
  pub stmt: Stmt,
}

/// A decoded artifact: its declarations in order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Artifact {
  /// The declarations.
  pub decls: Vec<Decl>,
}
