//! The frame and substitution engine: checking applications of terms and
//! theorems against their signatures, and tracking disjointness of bound variables.

use mm0k_format::MAX_BOUND_VARS;
use mm0k_util::{u32_as_usize, Modifiers, SortId, TermId, ThmId};

use crate::environment::{Environment, Expr, Frame, Thm, Type, MAX_EXPR_DEPTH};
use crate::error::{Disjointness, ErrorKind, Mismatch, Redeclaration};

/// An upper bound on the sorts/terms/theorems that can be used in a declaration.
/// Everything strictly below the bound is available.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Bound {
  /// Sorts strictly before this one are available.
  pub sort: SortId,
  /// Terms strictly before this one are available.
  pub term: TermId,
  /// Theorems strictly before this one are available.
  pub thm: ThmId,
}

impl Bound {
  pub(crate) fn check_sort(&self, s: SortId) -> Result<(), ErrorKind> {
    vassert!(s < self.sort, ErrorKind::Redeclaration(Redeclaration::ForwardSort(s)));
    Ok(())
  }

  pub(crate) fn check_stmt_term(&self, t: TermId) -> Result<(), ErrorKind> {
    vassert!(t < self.term, ErrorKind::Redeclaration(Redeclaration::ForwardTerm(t)));
    Ok(())
  }

  pub(crate) fn check_term(&self, t: TermId) -> Result<(), ErrorKind> {
    vassert!(t < self.term, ErrorKind::UnknownTerm(t));
    Ok(())
  }

  pub(crate) fn check_thm(&self, t: ThmId) -> Result<(), ErrorKind> {
    vassert!(t < self.thm, ErrorKind::UnknownTheorem(t));
    Ok(())
  }
}

/// An expression together with its sort and the local bound variables that may occur in it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Typed {
  /// The expression.
  pub expr: Expr,
  /// Its sort.
  pub sort: SortId,
  /// True if the expression is a bare bound variable.
  pub bound: bool,
  /// The bitset of local bound variables, by ordinal, that may occur in the expression.
  pub deps: u64,
  /// The nesting depth of term applications, at most [`MAX_EXPR_DEPTH`].
  pub depth: usize,
}

/// An entry of the stack or heap of the stack machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StackEl {
  /// An expression.
  Expr(Typed),
  /// A proof of an expression.
  Proof(Expr),
  /// A placeholder standing for any proof.
  Sorry,
}

/// The disjointness relation over the local bound variables of a declaration,
/// indexed by ordinal.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LocalDv(Vec<u64>);

impl LocalDv {
  /// The number of local bound variables.
  #[must_use]
  pub fn len(&self) -> usize { self.0.len() }

  /// True if there are no local bound variables.
  #[must_use]
  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Allocate a bound variable, returning its singleton bitset.
  pub fn push_var(&mut self) -> Result<u64, ErrorKind> {
    let n = self.0.len();
    vassert!(n < MAX_BOUND_VARS, ErrorKind::MaxBoundVars);
    self.0.push(0);
    Ok(1 << n)
  }

  /// Allocate a bound variable disjoint from all existing ones.
  pub fn push_fresh(&mut self) -> Result<u64, ErrorKind> {
    let bit = self.push_var()?;
    let (last, rest) = self.0.split_last_mut().ok_or(ErrorKind::MaxBoundVars)?;
    for dv in rest { *dv |= bit }
    *last = bit - 1;
    Ok(bit)
  }

  /// Record that `a` and `b` are disjoint.
  pub fn insert(&mut self, a: usize, b: usize) {
    self.0[a] |= 1 << b;
    self.0[b] |= 1 << a;
  }

  /// True if `a` and `b` are known to be disjoint.
  #[must_use]
  pub fn contains(&self, a: usize, b: usize) -> bool {
    self.0.get(a).is_some_and(|dv| dv & (1 << b) != 0)
  }
}

/// The positions of the set bits.
fn bits(mut n: u64) -> impl Iterator<Item=usize> {
  std::iter::from_fn(move || {
    if n == 0 { return None }
    let i = n.trailing_zeros();
    n &= n - 1;
    Some(i as usize)
  })
}

fn check_slots(params: &[Type], args: &[Typed]) -> Result<(), ErrorKind> {
  vassert!(params.len() == args.len(), ErrorKind::ArityOrSortMismatch(
    Mismatch::Arity { expected: params.len(), found: args.len() }));
  for (slot, (&ty, a)) in params.iter().zip(args).enumerate() {
    check_slot(slot, ty, a)?
  }
  Ok(())
}

fn check_slot(slot: usize, ty: Type, a: &Typed) -> Result<(), ErrorKind> {
  vassert!(a.sort == ty.sort(), ErrorKind::ArityOrSortMismatch(
    Mismatch::Sort { slot, expected: ty.sort(), found: a.sort }));
  vassert!(!ty.bound() || a.bound, ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedBound(slot)));
  Ok(())
}

/// A regular argument that does not depend on a bound slot may not contain
/// the variable substituted for it.
fn check_binding_deps(params: &[Type], args: &[Typed]) -> Result<(), ErrorKind> {
  let bvs = params.iter().zip(args).enumerate()
    .filter(|(_, (ty, _))| ty.bound())
    .map(|(k, (_, a))| (k, a.deps))
    .collect::<Vec<_>>();
  for (slot, (&ty, a)) in params.iter().zip(args).enumerate() {
    if let Type::Reg(_, deps) = ty {
      for (i, &(bound_slot, d)) in bvs.iter().enumerate() {
        vassert!(deps & (1 << i) != 0 || a.deps & d == 0,
          ErrorKind::DisjointnessViolation(Disjointness::Binding { slot, bound_slot }));
      }
    }
  }
  Ok(())
}

impl Environment {
  fn mods(&self, s: SortId) -> Modifiers { self.sorts[s].mods }

  /// A bound variable or dummy needs a pure sort that is not free.
  pub(crate) fn check_bindable(&self, s: SortId) -> Result<(), ErrorKind> {
    let mods = self.mods(s);
    vassert!(mods.contains(Modifiers::PURE),
      ErrorKind::SortAttribute(s, "bound variable in a sort that is not pure"));
    vassert!(!mods.contains(Modifiers::FREE),
      ErrorKind::SortAttribute(s, "bound variable in a free sort"));
    Ok(())
  }

  fn check_provable(&self, s: SortId) -> Result<(), ErrorKind> {
    vassert!(self.mods(s).contains(Modifiers::PROVABLE),
      ErrorKind::SortAttribute(s, "hypothesis or conclusion in a sort that is not provable"));
    Ok(())
  }

  /// Check a binder list, returning the variables it introduces and the
  /// local disjointness relation (with no pairs yet).
  pub(crate) fn load_args(
    &self, bound: &Bound, args: &[Type],
  ) -> Result<(Vec<Typed>, LocalDv), ErrorKind> {
    let mut vars = Vec::with_capacity(args.len());
    let mut dv = LocalDv::default();
    for (i, &ty) in args.iter().enumerate() {
      let expr = Expr::Var(u32::try_from(i).map_err(|_| ErrorKind::Overflow)?);
      match ty {
        Type::Bound(sort) => {
          bound.check_sort(sort)?;
          self.check_bindable(sort)?;
          let deps = dv.push_var()?;
          vars.push(Typed { expr, sort, bound: true, deps, depth: 0 })
        }
        Type::Reg(sort, deps) => {
          bound.check_sort(sort)?;
          vassert!(deps >> dv.len() == 0, ErrorKind::DepsOutOfBounds);
          vassert!(deps == 0 || !self.mods(sort).contains(Modifiers::FREE),
            ErrorKind::SortAttribute(sort, "dependent variable in a free sort"));
          vars.push(Typed { expr, sort, bound: false, deps, depth: 0 })
        }
      }
    }
    Ok((vars, dv))
  }

  /// Check the signature of a new term constructor.
  pub(crate) fn check_term_sig(
    &self, bound: &Bound, args: &[Type], (sort, deps): (SortId, u64),
  ) -> Result<(), ErrorKind> {
    let (_, dv) = self.load_args(bound, args)?;
    bound.check_sort(sort)?;
    vassert!(!self.mods(sort).contains(Modifiers::STRICT),
      ErrorKind::SortAttribute(sort, "term constructor targeting a strict sort"));
    vassert!(deps >> dv.len() == 0, ErrorKind::DepsOutOfBounds);
    vassert!(deps == 0 || !self.mods(sort).contains(Modifiers::FREE),
      ErrorKind::SortAttribute(sort, "dependent result in a free sort"));
    Ok(())
  }

  /// Apply term `t` to the given arguments. The caller checks that `t` is in bound.
  pub fn apply_term(&self, t: TermId, args: Vec<Typed>) -> Result<Typed, ErrorKind> {
    let td = &self.terms[t];
    check_slots(&td.args, &args)?;
    check_binding_deps(&td.args, &args)?;
    let mut bvs = vec![];
    let mut accum = 0;
    for (&ty, a) in td.args.iter().zip(&args) {
      match ty {
        Type::Bound(_) => bvs.push(a.deps),
        Type::Reg(_, deps) => {
          let mut d = a.deps;
          for (i, &dep) in bvs.iter().enumerate() {
            if deps & (1 << i) != 0 { d &= !dep }
          }
          accum |= d
        }
      }
    }
    for (i, &dep) in bvs.iter().enumerate() {
      if td.ret.1 & (1 << i) != 0 { accum |= dep }
    }
    let depth = args.iter().map(|a| a.depth).max().unwrap_or(0) + 1;
    vassert!(depth <= MAX_EXPR_DEPTH, ErrorKind::ExprTooDeep);
    let sort = td.ret.0;
    vassert!(accum == 0 || !self.mods(sort).contains(Modifiers::FREE),
      ErrorKind::SortAttribute(sort, "bound variable in an expression of a free sort"));
    let expr = Expr::app(t, args.into_iter().map(|a| a.expr));
    Ok(Typed { expr, sort, bound: false, deps: accum, depth })
  }

  /// Apply theorem `td` to the given arguments and hypothesis proofs, in the
  /// context of the local disjointness relation `dv`. Checks, in order: the
  /// kind and sort of each slot, binding dependencies, the disjointness pairs,
  /// and the hypotheses. Returns the instantiated conclusion.
  pub fn apply_thm(
    &self, td: &Thm, args: &[Typed], hyps: &[StackEl], dv: &LocalDv,
  ) -> Result<Expr, ErrorKind> {
    let Frame { args: params, hyps: thyps, dv: tdv } = &td.frame;
    check_slots(params, args)?;
    vassert!(thyps.len() == hyps.len(), ErrorKind::ArityOrSortMismatch(
      Mismatch::Arity { expected: params.len() + thyps.len(), found: args.len() + hyps.len() }));
    for (j, h) in hyps.iter().enumerate() {
      vassert!(!matches!(h, StackEl::Expr(_)),
        ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedProof(args.len() + j)));
    }
    check_binding_deps(params, args)?;
    for &(x, y) in &**tdv {
      let (dx, dy) = (args[u32_as_usize(x)].deps, args[u32_as_usize(y)].deps);
      for u in bits(dx) {
        for v in bits(dy) {
          vassert!(u != v,
            ErrorKind::DisjointnessViolation(Disjointness::Capture { pair: (x, y), var: u }));
          vassert!(dv.contains(u, v),
            ErrorKind::DisjointnessViolation(Disjointness::Missing { pair: (x, y), vars: (u, v) }));
        }
      }
    }
    let sub = args.iter().map(|a| a.expr.clone()).collect::<Vec<_>>();
    for (j, (h, pf)) in thyps.iter().zip(hyps).enumerate() {
      if let StackEl::Proof(e) = pf {
        vassert!(h.subst(&sub) == *e, ErrorKind::HypothesisMismatch(j));
      }
    }
    Ok(td.ret.subst(&sub))
  }

  /// Type an expression of a statement, over the variables `vars`. `level` is
  /// the number of applications enclosing `e`.
  fn type_expr(
    &self, bound: &Bound, vars: &[Typed], e: &Expr, level: usize,
  ) -> Result<Typed, ErrorKind> {
    match e {
      &Expr::Var(i) => vars.get(u32_as_usize(i)).cloned()
        .ok_or(ErrorKind::BadFrame("variable out of range")),
      Expr::App(t, es) => {
        bound.check_stmt_term(*t)?;
        vassert!(level < MAX_EXPR_DEPTH, ErrorKind::ExprTooDeep);
        let args = es.iter().map(|e| self.type_expr(bound, vars, e, level + 1))
          .collect::<Result<_, _>>()?;
        self.apply_term(*t, args)
      }
    }
  }

  /// Check the frame and conclusion of an axiom or theorem. Returns the
  /// variables and the local disjointness relation, seeded with the frame's pairs.
  pub fn check_frame(
    &self, bound: &Bound, frame: &Frame, ret: &Expr,
  ) -> Result<(Vec<Typed>, LocalDv), ErrorKind> {
    let (vars, mut dv) = self.load_args(bound, &frame.args)?;
    for &(x, y) in &*frame.dv {
      let (Some(a), Some(b)) = (vars.get(u32_as_usize(x)), vars.get(u32_as_usize(y))) else {
        return Err(ErrorKind::BadFrame("disjointness pair out of range"))
      };
      vassert!(x != y && a.bound && b.bound,
        ErrorKind::BadFrame("disjointness pair on a regular or repeated binder"));
      dv.insert(a.deps.trailing_zeros() as usize, b.deps.trailing_zeros() as usize);
    }
    for h in &*frame.hyps {
      self.check_provable(self.type_expr(bound, &vars, h, 0)?.sort)?
    }
    self.check_provable(self.type_expr(bound, &vars, ret, 0)?.sort)?;
    Ok((vars, dv))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bit_positions() {
    assert_eq!(bits(0b1010_0001).collect::<Vec<_>>(), [0, 5, 7]);
    assert_eq!(bits(0).count(), 0);
  }

  #[test]
  fn fresh_vars_are_disjoint() {
    let mut dv = LocalDv::default();
    assert_eq!(dv.push_var().unwrap(), 1);
    assert_eq!(dv.push_var().unwrap(), 2);
    assert!(!dv.contains(0, 1));
    assert_eq!(dv.push_fresh().unwrap(), 4);
    assert!(dv.contains(0, 2) && dv.contains(2, 1) && !dv.contains(1, 0));
    dv.insert(0, 1);
    assert!(dv.contains(1, 0));
  }

  #[test]
  fn bound_var_limit() {
    let mut dv = LocalDv::default();
    for _ in 0..MAX_BOUND_VARS { dv.push_fresh().unwrap(); }
    assert!(matches!(dv.push_fresh(), Err(ErrorKind::MaxBoundVars)));
  }

  fn setup() -> (Environment, SortId, SortId, TermId) {
    let mut env = Environment::new();
    let set = env.add_sort(Some("set"), Modifiers::PURE).unwrap();
    let wff = env.add_sort(Some("wff"), Modifiers::PROVABLE).unwrap();
    // all x ph, where ph may depend on x
    let all = env.add_term(Some("all"),
      [Type::Bound(set), Type::Reg(wff, 1)].into(), (wff, 0)).unwrap();
    (env, set, wff, all)
  }

  #[test]
  fn term_deps_drop_bound_variable() {
    let (env, set, wff, all) = setup();
    let x = Typed { expr: Expr::Var(0), sort: set, bound: true, deps: 1, depth: 0 };
    let ph = Typed { expr: Expr::Var(1), sort: wff, bound: false, deps: 0b11, depth: 0 };
    let r = env.apply_term(all, vec![x, ph]).unwrap();
    assert_eq!(r.sort, wff);
    assert_eq!(r.deps, 0b10);
    assert_eq!(r.expr, Expr::app(all, [Expr::Var(0), Expr::Var(1)]));
  }

  #[test]
  fn term_bound_slot_needs_variable() {
    let (env, set, wff, all) = setup();
    let e = Typed { expr: Expr::Var(0), sort: set, bound: false, deps: 1, depth: 0 };
    let ph = Typed { expr: Expr::Var(1), sort: wff, bound: false, deps: 0, depth: 0 };
    assert!(matches!(env.apply_term(all, vec![e, ph.clone()]),
      Err(ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedBound(0)))));
    assert!(matches!(env.apply_term(all, vec![ph]),
      Err(ErrorKind::ArityOrSortMismatch(Mismatch::Arity { expected: 2, found: 1 }))));
  }

  #[test]
  fn strict_and_free_sorts() {
    let mut env = Environment::new();
    let st = env.add_sort(Some("st"), Modifiers::STRICT).unwrap();
    let fr = env.add_sort(Some("fr"), Modifiers::PURE | Modifiers::FREE).unwrap();
    let e = env.add_term(Some("c"), [].into(), (st, 0)).unwrap_err();
    assert!(matches!(e.kind, ErrorKind::SortAttribute(s, _) if s == st));
    let e = env.add_term(Some("b"), [Type::Bound(fr)].into(), (fr, 0)).unwrap_err();
    assert!(matches!(e.kind, ErrorKind::SortAttribute(s, _) if s == fr));
    let e = env.add_term(Some("d"), [Type::Reg(fr, 0)].into(), (fr, 1)).unwrap_err();
    assert!(matches!(e.kind, ErrorKind::DepsOutOfBounds));
  }

  #[test]
  fn expression_depth_limit() {
    let mut env = Environment::new();
    let wff = env.add_sort(Some("wff"), Modifiers::PROVABLE).unwrap();
    let neg = env.add_term(Some("neg"), [Type::Reg(wff, 0)].into(), (wff, 0)).unwrap();
    let mut e = Typed { expr: Expr::Var(0), sort: wff, bound: false, deps: 0, depth: 0 };
    for _ in 0..MAX_EXPR_DEPTH { e = env.apply_term(neg, vec![e]).unwrap() }
    assert_eq!(e.depth, MAX_EXPR_DEPTH);
    let deep = Expr::app(neg, [e.expr.clone()]);
    assert!(matches!(env.apply_term(neg, vec![e]), Err(ErrorKind::ExprTooDeep)));
    // the same bound applies to statements
    let frame = Frame::new(vec![Type::Reg(wff, 0)], vec![], []);
    let err = env.add_axiom(Some("deep"), frame, deep, None).unwrap_err();
    assert!(matches!(err.kind, ErrorKind::ExprTooDeep));
  }

  #[test]
  fn forward_sort() {
    let env = Environment::new();
    let e = env.check_term_sig(&env.bound(), &[], (SortId(0), 0)).unwrap_err();
    assert!(matches!(e, ErrorKind::Redeclaration(Redeclaration::ForwardSort(SortId(0)))));
  }
}
