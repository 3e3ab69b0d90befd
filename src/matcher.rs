//! Checking a loaded store against a specification artifact.
//!
//! The specification lists the sorts, terms, axioms and theorem statements a
//! proof file must provide. Matching is by name: ids may differ between the
//! two files, so sorts and terms are compared through their names.

use std::collections::HashMap;
use std::fmt;

use mm0k_util::{u32_as_usize, SortId, TermId};

use crate::artifact::{Artifact, Stmt};
use crate::environment::{DeclKey, Environment, Expr, Frame, ThmKind, Type};
use crate::error::DeclKind;

/// A difference between the specification and the proof file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SpecError {
  /// A declaration of the specification is missing from the proof file.
  Missing(DeclKind, Box<str>),
  /// The proof file declares the name with a different kind.
  KindMismatch {
    /// The name
    name: Box<str>,
    /// The kind in the specification
    expected: DeclKind,
    /// The kind in the proof file
    found: DeclKind,
  },
  /// The proof file declares the name with a different statement.
  Mismatch(DeclKind, Box<str>),
  /// A sort, term or axiom of the proof file that is not in the specification.
  Extra(DeclKind, Option<Box<str>>),
}

impl fmt::Display for SpecError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SpecError::Missing(k, n) => write!(f, "{k} {n} is not declared in the proof file"),
      SpecError::KindMismatch { name, expected, found } =>
        write!(f, "{name} is declared as a {found}, but the specification has a {expected}"),
      SpecError::Mismatch(k, n) => write!(f, "{k} {n} does not match the specification"),
      SpecError::Extra(k, Some(n)) => write!(f, "{k} {n} is not in the specification"),
      SpecError::Extra(k, None) => write!(f, "anonymous {k} is not in the specification"),
    }
  }
}

impl std::error::Error for SpecError {}

fn decl_kind(env: &Environment, k: DeclKey) -> DeclKind {
  match k {
    DeclKey::Sort(_) => DeclKind::Sort,
    DeclKey::Term(_) => DeclKind::Term,
    DeclKey::Thm(t) => match env.thms[t].kind {
      ThmKind::Axiom(_) => DeclKind::Axiom,
      ThmKind::Thm(_) => DeclKind::Thm,
    },
  }
}

/// The names of the sorts and terms of the specification, by id.
#[derive(Debug, Default)]
struct SpecNames<'a> {
  sorts: Vec<&'a str>,
  terms: Vec<&'a str>,
}

struct Matcher<'a> {
  env: &'a Environment,
  spec: SpecNames<'a>,
}

impl Matcher<'_> {
  fn sort(&self, s: SortId, es: SortId) -> bool {
    self.spec.sorts.get(usize::from(s.0)).copied() == self.env.sorts[es].name.as_deref()
  }

  fn term(&self, t: TermId, et: TermId) -> bool {
    self.spec.terms.get(u32_as_usize(t.0)).copied() == self.env.terms[et].name.as_deref()
  }

  fn ty(&self, a: Type, b: Type) -> bool {
    match (a, b) {
      (Type::Bound(s), Type::Bound(es)) => self.sort(s, es),
      (Type::Reg(s, d), Type::Reg(es, ed)) => d == ed && self.sort(s, es),
      _ => false,
    }
  }

  fn args(&self, a: &[Type], b: &[Type]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&a, &b)| self.ty(a, b))
  }

  fn expr(&self, a: &Expr, b: &Expr) -> bool {
    match (a, b) {
      (Expr::Var(i), Expr::Var(j)) => i == j,
      (Expr::App(t, es), Expr::App(et, ees)) =>
        self.term(*t, *et) && es.len() == ees.len() &&
        es.iter().zip(&**ees).all(|(a, b)| self.expr(a, b)),
      _ => false,
    }
  }

  fn frame(&self, (f, r): (&Frame, &Expr), (ef, er): (&Frame, &Expr)) -> bool {
    self.args(&f.args, &ef.args) && f.dv == ef.dv &&
    f.hyps.len() == ef.hyps.len() &&
    f.hyps.iter().zip(&*ef.hyps).all(|(a, b)| self.expr(a, b)) &&
    self.expr(r, er)
  }
}

/// Check `env` against the specification `spec`, returning every difference.
/// Every declaration of the specification must be in `env` with the same name,
/// kind and statement; every sort, term and axiom of `env` must be in the
/// specification. Theorems not in the specification are allowed.
pub fn match_spec(env: &Environment, spec: &Artifact) -> Result<(), Vec<SpecError>> {
  let mut errs = vec![];
  let mut m = Matcher { env, spec: SpecNames::default() };
  let mut seen = HashMap::new();
  for d in &spec.decls {
    let name = d.name.as_deref().unwrap_or("_");
    let kind = match d.stmt {
      Stmt::Sort(_) => { m.spec.sorts.push(name); DeclKind::Sort }
      Stmt::Term(..) => { m.spec.terms.push(name); DeclKind::Term }
      Stmt::Axiom(..) => DeclKind::Axiom,
      Stmt::Thm(..) => DeclKind::Thm,
    };
    seen.insert(name, kind);
    let Some(key) = env.get(name) else {
      errs.push(SpecError::Missing(kind, name.into()));
      continue
    };
    let found = decl_kind(env, key);
    if found != kind {
      errs.push(SpecError::KindMismatch { name: name.into(), expected: kind, found });
      continue
    }
    let ok = match (&d.stmt, key) {
      (&Stmt::Sort(mods), DeclKey::Sort(s)) => env.sorts[s].mods == mods,
      (Stmt::Term(args, ret), DeclKey::Term(t)) => {
        let td = &env.terms[t];
        m.args(args, &td.args) && ret.1 == td.ret.1 && m.sort(ret.0, td.ret.0)
      }
      (Stmt::Axiom(f, r, _) | Stmt::Thm(f, r, _), DeclKey::Thm(t)) => {
        let td = &env.thms[t];
        m.frame((f, r), (&td.frame, &td.ret))
      }
      _ => false,
    };
    if !ok { errs.push(SpecError::Mismatch(kind, name.into())) }
  }
  for &key in &env.stmts {
    let kind = decl_kind(env, key);
    if kind == DeclKind::Thm { continue }
    let name = env.name(key);
    if name.and_then(|n| seen.get(n)) != Some(&kind) {
      errs.push(SpecError::Extra(kind, name.map(Into::into)))
    }
  }
  if errs.is_empty() { Ok(()) } else { Err(errs) }
}
