//! The declaration store, an append-only sequence of sorts, terms, axioms and theorems.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mm0k_format::MAX_SORTS;
use mm0k_util::{
  u32_as_usize, HashMapExt, Modifiers, SortId, SortVec, TermId, TermVec, ThmId, ThmVec,
};

use crate::artifact::{Artifact, Decl, Proof, Stmt};
use crate::error::{DeclInfo, DeclKind, ErrorKind, KernelError, Redeclaration};
use crate::subst::Bound;
use crate::verify::Mode;

/// The type of a binder in a term or theorem signature.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Type {
  /// A bound variable of the given sort.
  Bound(SortId),
  /// A regular variable of the given sort, which may depend on the bound
  /// variables in the bitset (bit `k` is the `k`-th bound binder).
  Reg(SortId, u64),
}

impl Type {
  /// The sort of this binder.
  #[must_use]
  pub fn sort(self) -> SortId {
    match self {
      Type::Bound(s) | Type::Reg(s, _) => s,
    }
  }

  /// True if this is a bound variable.
  #[must_use]
  pub fn bound(self) -> bool { matches!(self, Type::Bound(_)) }
}

/// The maximum nesting of term applications in an expression. Expressions are
/// traversed recursively, so deeper ones are rejected before they are built.
pub const MAX_EXPR_DEPTH: usize = 1024;

/// An expression, the content of a statement.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum Expr {
  /// A variable, by binder position. Positions past the end of the binder list
  /// are dummy variables allocated by a proof.
  Var(u32),
  /// A term constructor applied to a list of arguments.
  App(TermId, Arc<[Expr]>),
}

impl Expr {
  /// Construct an application.
  #[must_use]
  pub fn app(t: TermId, args: impl IntoIterator<Item=Expr>) -> Expr {
    Expr::App(t, args.into_iter().collect())
  }

  /// Replace every variable `i` by `sub[i]`. The caller guarantees that all
  /// variables are in range.
  #[must_use]
  pub fn subst(&self, sub: &[Expr]) -> Expr {
    match self {
      &Expr::Var(i) => sub[u32_as_usize(i)].clone(),
      Expr::App(t, args) => Expr::App(*t, args.iter().map(|e| e.subst(sub)).collect()),
    }
  }
}

impl fmt::Debug for Expr {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Expr::Var(i) => write!(f, "v{i}"),
      Expr::App(t, args) => {
        write!(f, "(t{t}")?;
        for e in &**args { write!(f, " {e:?}")? }
        write!(f, ")")
      }
    }
  }
}

/// The binders, hypotheses and disjointness conditions of an axiom or theorem.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Frame {
  /// The variable binders.
  pub args: Box<[Type]>,
  /// The hypotheses, expressions over the binders.
  pub hyps: Box<[Expr]>,
  /// Pairs of binder positions of bound variables that may not be substituted
  /// by overlapping expressions. Stored with `x < y`, sorted and deduplicated.
  pub dv: Box<[(u32, u32)]>,
}

impl Frame {
  /// Construct a frame, normalizing the disjointness pairs.
  #[must_use]
  pub fn new(args: Vec<Type>, hyps: Vec<Expr>, dv: impl IntoIterator<Item=(u32, u32)>) -> Frame {
    let mut dv = dv.into_iter().map(|(x, y)| (x.min(y), x.max(y))).collect::<Vec<_>>();
    dv.sort_unstable();
    dv.dedup();
    Frame { args: args.into(), hyps: hyps.into(), dv: dv.into() }
  }
}

/// A sort declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Sort {
  /// The name of the sort, if any.
  pub name: Option<Box<str>>,
  /// The sort modifiers.
  pub mods: Modifiers,
}

/// A term constructor declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Term {
  /// The name of the term, if any.
  pub name: Option<Box<str>>,
  /// The argument binders.
  pub args: Box<[Type]>,
  /// The result sort and the bound arguments the result depends on.
  pub ret: (SortId, u64),
}

/// The kind-specific content of a [`Thm`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ThmKind {
  /// An axiom, with its statement script if it had one.
  Axiom(Option<Proof>),
  /// A theorem, with its proof.
  Thm(Proof),
}

/// An axiom or theorem declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Thm {
  /// The name of the theorem, if any.
  pub name: Option<Box<str>>,
  /// The binders, hypotheses and disjointness conditions.
  pub frame: Frame,
  /// The conclusion.
  pub ret: Expr,
  /// Whether this is an axiom or a theorem, and the stored proof.
  pub kind: ThmKind,
  /// The declarations that were available when this was checked.
  pub bound: Bound,
}

impl Thm {
  /// The stored proof or statement script, together with how it is to be run.
  #[must_use]
  pub fn script(&self) -> Option<(&Proof, Mode)> {
    match &self.kind {
      ThmKind::Axiom(script) => script.as_ref().map(|p| (p, Mode::Statement)),
      ThmKind::Thm(proof) => Some((proof, Mode::Proof)),
    }
  }
}

/// A reference to a declaration in the store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeclKey {
  /// A sort.
  Sort(SortId),
  /// A term constructor.
  Term(TermId),
  /// An axiom or theorem.
  Thm(ThmId),
}

/// The declaration store. Identifiers are dense and assigned in declaration
/// order, one space each for sorts, terms and theorems; axioms and theorems share
/// a space. Nothing is ever removed or changed after it is added.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Environment {
  /// The sort map, which is a vector because sort names are allocated in order.
  pub sorts: SortVec<Sort>,
  /// The dictionary of known terms.
  pub terms: TermVec<Term>,
  /// The dictionary of known axioms and theorems.
  pub thms: ThmVec<Thm>,
  /// The map from names to declarations.
  pub names: HashMap<Box<str>, DeclKey>,
  /// The order in which declarations were added.
  pub stmts: Vec<DeclKey>,
}

fn decl_error(kind: DeclKind, id: usize, name: Option<&str>) -> impl Fn(ErrorKind) -> KernelError + '_ {
  #[allow(clippy::cast_possible_truncation)] // ids are bounded by u32 spaces
  let info = move || DeclInfo { kind, id: id as u32, name: name.map(Into::into) };
  move |e| KernelError::new(e).in_decl(info())
}

impl Environment {
  /// Create a new empty environment.
  #[must_use]
  pub fn new() -> Environment { Environment::default() }

  /// The bound containing everything currently in the store.
  #[must_use]
  pub fn bound(&self) -> Bound {
    #[allow(clippy::cast_possible_truncation)] // at most MAX_SORTS sorts
    let sort = SortId(self.sorts.len() as u8);
    #[allow(clippy::cast_possible_truncation)] // ids are u32
    let (term, thm) = (TermId(self.terms.len() as u32), ThmId(self.thms.len() as u32));
    Bound { sort, term, thm }
  }

  /// Look up a declaration by name.
  #[must_use]
  pub fn get(&self, name: &str) -> Option<DeclKey> { self.names.get(name).copied() }

  /// The name of a declaration, if it has one.
  #[must_use]
  pub fn name(&self, k: DeclKey) -> Option<&str> {
    match k {
      DeclKey::Sort(s) => self.sorts.get(s)?.name.as_deref(),
      DeclKey::Term(t) => self.terms.get(t)?.name.as_deref(),
      DeclKey::Thm(t) => self.thms.get(t)?.name.as_deref(),
    }
  }

  fn check_name(&self, name: Option<&str>) -> Result<(), ErrorKind> {
    match name {
      Some(name) if self.names.contains_key(name) =>
        Err(ErrorKind::Redeclaration(Redeclaration::Name(name.into()))),
      _ => Ok(()),
    }
  }

  /// Record the name and position of a new declaration. Fails without side effects.
  fn register(&mut self, name: Option<&str>, key: DeclKey) -> Result<(), ErrorKind> {
    if let Some(name) = name {
      if let Some((_, e)) = self.names.try_insert_ext(name.into(), key) {
        return Err(ErrorKind::Redeclaration(Redeclaration::Name(e.key().clone())))
      }
    }
    self.stmts.push(key);
    Ok(())
  }

  /// Add a sort with the given modifiers.
  pub fn add_sort(&mut self, name: Option<&str>, mods: Modifiers) -> Result<SortId, KernelError> {
    let err = decl_error(DeclKind::Sort, self.sorts.len(), name);
    let id = self.sorts.next_id().filter(|s| usize::from(s.0) < MAX_SORTS)
      .ok_or_else(|| err(ErrorKind::Overflow))?;
    if !mods.is_sort_data() {
      return Err(err(ErrorKind::SortAttribute(id, "unknown sort modifier")))
    }
    self.register(name, DeclKey::Sort(id)).map_err(&err)?;
    self.sorts.push(Sort { name: name.map(Into::into), mods });
    debug!("sort {id}: {}", name.unwrap_or("_"));
    Ok(id)
  }

  /// Add a term constructor with the given signature.
  pub fn add_term(
    &mut self, name: Option<&str>, args: Box<[Type]>, ret: (SortId, u64),
  ) -> Result<TermId, KernelError> {
    let err = decl_error(DeclKind::Term, self.terms.len(), name);
    let id = self.terms.next_id().ok_or_else(|| err(ErrorKind::Overflow))?;
    self.check_name(name).map_err(&err)?;
    self.check_term_sig(&self.bound(), &args, ret).map_err(&err)?;
    self.register(name, DeclKey::Term(id)).map_err(&err)?;
    self.terms.push(Term { name: name.map(Into::into), args, ret });
    debug!("term {id}: {}", name.unwrap_or("_"));
    Ok(id)
  }

  /// Add an axiom. If a statement script is given, it must build the conclusion.
  pub fn add_axiom(
    &mut self, name: Option<&str>, frame: Frame, ret: Expr, script: Option<Proof>,
  ) -> Result<ThmId, KernelError> {
    let id = self.thms.next_id();
    let err = decl_error(DeclKind::Axiom, self.thms.len(), name);
    let id = id.ok_or_else(|| err(ErrorKind::Overflow))?;
    let bound = self.bound();
    self.check_decl(DeclKind::Axiom, name, &bound, &frame, &ret, script.as_ref())?;
    let thm = Thm { name: name.map(Into::into), frame, ret, kind: ThmKind::Axiom(script), bound };
    self.push_thm(id, thm)
  }

  /// Add a theorem, after checking its proof.
  pub fn add_thm(
    &mut self, name: Option<&str>, frame: Frame, ret: Expr, proof: Proof,
  ) -> Result<ThmId, KernelError> {
    let err = decl_error(DeclKind::Thm, self.thms.len(), name);
    let id = self.thms.next_id().ok_or_else(|| err(ErrorKind::Overflow))?;
    let bound = self.bound();
    self.check_decl(DeclKind::Thm, name, &bound, &frame, &ret, Some(&proof))?;
    let thm = Thm { name: name.map(Into::into), frame, ret, kind: ThmKind::Thm(proof), bound };
    self.push_thm(id, thm)
  }

  /// Check an axiom or theorem against this store without adding it. The name
  /// must be free, the frame well formed, and the script (if any) must verify
  /// using only declarations below `bound`.
  pub fn check_decl(
    &self, kind: DeclKind, name: Option<&str>, bound: &Bound,
    frame: &Frame, ret: &Expr, script: Option<&Proof>,
  ) -> Result<(), KernelError> {
    let err = decl_error(kind, u32_as_usize(bound.thm.0), name);
    self.check_name(name).map_err(&err)?;
    let mode = if kind == DeclKind::Thm { Mode::Proof } else { Mode::Statement };
    match script {
      None => {
        debug_assert!(kind == DeclKind::Axiom);
        self.check_frame(bound, frame, ret).map_err(&err)?;
      }
      Some(pf) => {
        self.run_proof(bound, frame, ret, mode, &pf.cmds).map_err(|(i, e)| {
          let e = err(e);
          match i {
            Some(i) => e.at_cmd(i, pf.pos_of(i)),
            None => e,
          }
        })?;
      }
    }
    Ok(())
  }

  /// Append an already checked axiom or theorem. Fails only if the name was
  /// taken in the meantime.
  pub(crate) fn push_thm(&mut self, id: ThmId, thm: Thm) -> Result<ThmId, KernelError> {
    let kind = if matches!(thm.kind, ThmKind::Axiom(_)) { DeclKind::Axiom } else { DeclKind::Thm };
    debug_assert_eq!(self.thms.next_id(), Some(id));
    self.register(thm.name.as_deref(), DeclKey::Thm(id))
      .map_err(decl_error(kind, u32_as_usize(id.0), thm.name.as_deref()))?;
    debug!("{} {id}: {}", kind, thm.name.as_deref().unwrap_or("_"));
    Ok(self.thms.push(thm))
  }

  /// Check a stored axiom or theorem again, against the declarations that were
  /// available when it was added.
  pub fn reverify(&self, id: ThmId) -> Result<(), KernelError> {
    let thm = self.thms.get(id).ok_or_else(|| KernelError::new(ErrorKind::UnknownTheorem(id)))?;
    let kind = if matches!(thm.kind, ThmKind::Axiom(_)) { DeclKind::Axiom } else { DeclKind::Thm };
    let err = decl_error(kind, u32_as_usize(id.0), thm.name.as_deref());
    match thm.script() {
      None => self.check_frame(&thm.bound, &thm.frame, &thm.ret).map(drop).map_err(err),
      Some((pf, mode)) => self.run_proof(&thm.bound, &thm.frame, &thm.ret, mode, &pf.cmds)
        .map(drop)
        .map_err(|(i, e)| match i {
          Some(i) => err(e).at_cmd(i, pf.pos_of(i)),
          None => err(e),
        }),
    }
  }

  /// Add a single declaration from an artifact.
  pub fn add_decl(&mut self, decl: &Decl) -> Result<DeclKey, KernelError> {
    let name = decl.name.as_deref();
    let res = match &decl.stmt {
      &Stmt::Sort(mods) => self.add_sort(name, mods).map(DeclKey::Sort),
      Stmt::Term(args, ret) => self.add_term(name, args.clone(), *ret).map(DeclKey::Term),
      Stmt::Axiom(frame, ret, script) =>
        self.add_axiom(name, frame.clone(), ret.clone(), script.clone()).map(DeclKey::Thm),
      Stmt::Thm(frame, ret, proof) =>
        self.add_thm(name, frame.clone(), ret.clone(), proof.clone()).map(DeclKey::Thm),
    };
    res.map_err(|e| e.or_pos(decl.pos))
  }

  /// Add all declarations of an artifact in order, stopping at the first failure.
  /// Declarations before the failing one stay in the store.
  pub fn load_into(&mut self, art: &Artifact) -> Result<(), KernelError> {
    for decl in &art.decls { self.add_decl(decl)?; }
    info!("loaded {} declarations", art.decls.len());
    Ok(())
  }

  /// Build a store from an artifact.
  pub fn load(art: &Artifact) -> Result<Environment, KernelError> {
    let mut env = Environment::new();
    env.load_into(art)?;
    Ok(env)
  }
}
