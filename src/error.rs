//! The errors reported by the kernel.

use std::fmt;

use mm0k_format::ParseError;
use mm0k_util::{SortId, TermId, ThmId};

use crate::environment::MAX_EXPR_DEPTH;

/// The kind of a declaration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclKind {
  /// A sort declaration.
  Sort,
  /// A term constructor.
  Term,
  /// An axiom.
  Axiom,
  /// A theorem.
  Thm,
}

impl fmt::Display for DeclKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      DeclKind::Sort => "sort",
      DeclKind::Term => "term",
      DeclKind::Axiom => "axiom",
      DeclKind::Thm => "theorem",
    })
  }
}

/// Identifies the declaration an error belongs to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclInfo {
  /// The kind of declaration.
  pub kind: DeclKind,
  /// The identifier it has or would have received.
  pub id: u32,
  /// The name, if it has one.
  pub name: Option<Box<str>>,
}

impl fmt::Display for DeclInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "{} {name} (#{})", self.kind, self.id),
      None => write!(f, "{} #{}", self.kind, self.id),
    }
  }
}

/// What was declared twice, or referenced before being declared.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Redeclaration {
  /// The name is already taken.
  Name(Box<str>),
  /// The sort is used before its declaration.
  ForwardSort(SortId),
  /// The term is used in a statement before its declaration.
  ForwardTerm(TermId),
}

/// The ways an application can fail to match its signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mismatch {
  /// Expected `expected` arguments, got `found`.
  Arity {
    /// The signature's argument count
    expected: usize,
    /// The number of arguments supplied
    found: usize,
  },
  /// Argument `slot` has the wrong sort.
  Sort {
    /// The argument position
    slot: usize,
    /// The sort in the signature
    expected: SortId,
    /// The sort of the argument
    found: SortId,
  },
  /// Argument `slot` is a bound binder, but the argument is not a bound variable.
  ExpectedBound(usize),
  /// Argument `slot` should be an expression, but is a proof.
  ExpectedExpr(usize),
  /// Hypothesis slot `slot` should be a proof, but is an expression.
  ExpectedProof(usize),
}

/// The ways a disjointness condition can be violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disjointness {
  /// Argument `slot` does not depend on bound slot `bound_slot`, but contains its variable.
  Binding {
    /// The regular argument position
    slot: usize,
    /// The bound argument position
    bound_slot: usize,
  },
  /// The pair `(x, y)` was substituted by expressions sharing the local variable `var`.
  Capture {
    /// The disjointness pair
    pair: (u32, u32),
    /// The ordinal of the shared local bound variable
    var: usize,
  },
  /// The pair `(x, y)` requires local variables `u` and `v` to be disjoint,
  /// which the current context does not provide.
  Missing {
    /// The disjointness pair
    pair: (u32, u32),
    /// The two local bound variables, by ordinal
    vars: (usize, usize),
  },
}

/// The taxonomy of kernel errors.
#[derive(Debug)]
pub enum ErrorKind {
  /// The binary artifact could not be decoded.
  MalformedBinary(ParseError),
  /// A command sequence without an `End`, or with commands after it.
  MalformedProof(&'static str),
  /// A name was declared twice, or a sort or term was used before its declaration.
  Redeclaration(Redeclaration),
  /// A proof references a term which is not (yet) declared.
  UnknownTerm(TermId),
  /// A proof references a theorem which is not (yet) declared.
  UnknownTheorem(ThmId),
  /// A `Ref` out of range of the heap.
  HeapIndex(u32),
  /// Too few entries on the stack.
  StackUnderflow,
  /// A binder or expression violates the modifiers of its sort.
  SortAttribute(SortId, &'static str),
  /// An application does not match the shape of its signature.
  ArityOrSortMismatch(Mismatch),
  /// A disjointness condition was violated.
  DisjointnessViolation(Disjointness),
  /// The proof supplied for hypothesis `i` proves something else.
  HypothesisMismatch(usize),
  /// The final stack does not hold exactly the conclusion.
  ConclusionMismatch,
  /// The proof uses `Sorry`.
  IncompleteProof,
  /// Too many bound variables in one declaration.
  MaxBoundVars,
  /// A binder depends on a bound variable that does not precede it.
  DepsOutOfBounds,
  /// The frame is malformed.
  BadFrame(&'static str),
  /// An identifier space is exhausted.
  Overflow,
  /// An expression nests term applications deeper than [`MAX_EXPR_DEPTH`].
  ExprTooDeep,
}

impl fmt::Display for ErrorKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ErrorKind::MalformedBinary(e) => write!(f, "malformed binary: {e}"),
      ErrorKind::MalformedProof(msg) => write!(f, "malformed proof: {msg}"),
      ErrorKind::Redeclaration(Redeclaration::Name(n)) => write!(f, "'{n}' is already declared"),
      ErrorKind::Redeclaration(Redeclaration::ForwardSort(s)) =>
        write!(f, "sort {s} is used before it is declared"),
      ErrorKind::Redeclaration(Redeclaration::ForwardTerm(t)) =>
        write!(f, "term {t} is used before it is declared"),
      ErrorKind::UnknownTerm(t) => write!(f, "unknown term {t}"),
      ErrorKind::UnknownTheorem(t) => write!(f, "unknown theorem {t}"),
      ErrorKind::HeapIndex(i) => write!(f, "heap reference {i} out of range"),
      ErrorKind::StackUnderflow => write!(f, "stack underflow"),
      ErrorKind::SortAttribute(s, msg) => write!(f, "sort {s}: {msg}"),
      ErrorKind::ArityOrSortMismatch(m) => match *m {
        Mismatch::Arity { expected, found } =>
          write!(f, "expected {expected} arguments, got {found}"),
        Mismatch::Sort { slot, expected, found } =>
          write!(f, "argument {slot}: expected sort {expected}, got {found}"),
        Mismatch::ExpectedBound(slot) =>
          write!(f, "argument {slot}: expected a bound variable, got an expression"),
        Mismatch::ExpectedExpr(slot) => write!(f, "argument {slot}: expected an expression"),
        Mismatch::ExpectedProof(slot) => write!(f, "argument {slot}: expected a proof"),
      },
      ErrorKind::DisjointnessViolation(d) => match *d {
        Disjointness::Binding { slot, bound_slot } => write!(f,
          "disjoint variable violation: argument {slot} contains the variable of argument {bound_slot}"),
        Disjointness::Capture { pair: (x, y), var } => write!(f,
          "disjoint variable violation: binders {x} and {y} both contain bound variable {var}"),
        Disjointness::Missing { pair: (x, y), vars: (u, v) } => write!(f,
          "disjoint variable violation: binders {x} and {y} need bound variables {u} and {v} \
          to be disjoint"),
      },
      ErrorKind::HypothesisMismatch(i) => write!(f, "hypothesis {i} does not match its proof"),
      ErrorKind::ConclusionMismatch =>
        write!(f, "the proof does not end with exactly the conclusion"),
      ErrorKind::IncompleteProof => write!(f, "the proof uses sorry"),
      ErrorKind::MaxBoundVars => write!(f, "too many bound variables"),
      ErrorKind::DepsOutOfBounds => write!(f, "dependency on an undeclared bound variable"),
      ErrorKind::BadFrame(msg) => write!(f, "bad frame: {msg}"),
      ErrorKind::Overflow => write!(f, "too many declarations"),
      ErrorKind::ExprTooDeep =>
        write!(f, "expression is nested more than {MAX_EXPR_DEPTH} terms deep"),
    }
  }
}

/// A kernel error, with the context in which it happened.
#[derive(Debug)]
pub struct KernelError {
  /// The declaration being checked, if any.
  pub decl: Option<DeclInfo>,
  /// The index of the failing command in the declaration's proof.
  pub cmd: Option<usize>,
  /// The byte offset of the failing command or declaration, when known.
  pub pos: Option<usize>,
  /// What went wrong.
  pub kind: ErrorKind,
}

impl KernelError {
  /// An error with no context.
  #[must_use]
  pub fn new(kind: ErrorKind) -> Self { KernelError { decl: None, cmd: None, pos: None, kind } }

  /// Attach the declaration.
  #[must_use]
  pub fn in_decl(self, decl: DeclInfo) -> Self { KernelError { decl: Some(decl), ..self } }

  /// Attach the command index and, if known, its position.
  #[must_use]
  pub fn at_cmd(self, cmd: usize, pos: Option<usize>) -> Self {
    KernelError { cmd: Some(cmd), pos: pos.or(self.pos), ..self }
  }

  /// Attach a position, unless there already is one.
  #[must_use]
  pub fn or_pos(self, pos: usize) -> Self { KernelError { pos: self.pos.or(Some(pos)), ..self } }
}

impl fmt::Display for KernelError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(decl) = &self.decl { write!(f, "{decl}: ")? }
    if let Some(cmd) = self.cmd { write!(f, "command {cmd}: ")? }
    if let Some(pos) = self.pos { write!(f, "(at byte {pos}) ")? }
    write!(f, "{}", self.kind)
  }
}

impl std::error::Error for KernelError {}

impl From<ParseError> for KernelError {
  fn from(e: ParseError) -> Self { KernelError::new(ErrorKind::MalformedBinary(e)) }
}
