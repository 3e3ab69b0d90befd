//! The stack machine that replays a proof stream against a declaration's frame.
//!
//! The machine state is a [`Machine`]: a heap, seeded with the frame's variables
//! and hypotheses, a stack of [`StackEl`] entries, and the local disjointness
//! relation. It is created fresh for every declaration and dropped afterwards.

use mm0k_format::ProofCmd;
use mm0k_util::{u32_as_usize, SortId, TermId, ThmId};

use crate::environment::{Environment, Expr, Frame};
use crate::error::{ErrorKind, Mismatch};
use crate::subst::{Bound, LocalDv, StackEl, Typed};

/// What the final stack entry of a run must be.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
  /// A proof of the conclusion (or `Sorry`), for theorems.
  Proof,
  /// The conclusion as an expression, for axiom statement scripts.
  Statement,
}

/// A failure of the stack machine, with the index of the command that caused it.
/// Errors in the frame itself have no command index.
pub type MachineError = (Option<usize>, ErrorKind);

#[derive(Debug)]
struct Machine<'a> {
  env: &'a Environment,
  bound: &'a Bound,
  nargs: usize,
  heap: Vec<StackEl>,
  stack: Vec<StackEl>,
  dv: LocalDv,
  dummies: u32,
  sorry: bool,
}

#[allow(clippy::wrong_self_convention)]
impl StackEl {
  fn as_expr(self, slot: usize) -> Result<Typed, ErrorKind> {
    if let StackEl::Expr(e) = self { return Ok(e) }
    Err(ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedExpr(slot)))
  }
}

impl Machine<'_> {
  fn pop_n(&mut self, n: usize) -> Result<Vec<StackEl>, ErrorKind> {
    let len = self.stack.len().checked_sub(n).ok_or(ErrorKind::StackUnderflow)?;
    Ok(self.stack.split_off(len))
  }

  fn term(&mut self, t: TermId) -> Result<(), ErrorKind> {
    self.bound.check_term(t)?;
    let env = self.env;
    let td = &env.terms[t];
    let args = self.pop_n(td.args.len())?.into_iter().enumerate()
      .map(|(i, e)| e.as_expr(i)).collect::<Result<Vec<_>, _>>()?;
    let e = env.apply_term(t, args)?;
    self.stack.push(StackEl::Expr(e));
    Ok(())
  }

  fn thm(&mut self, t: ThmId) -> Result<(), ErrorKind> {
    self.bound.check_thm(t)?;
    let env = self.env;
    let td = &env.thms[t];
    let nargs = td.frame.args.len();
    let mut els = self.pop_n(nargs + td.frame.hyps.len())?;
    let hyps = els.split_off(nargs);
    let args = els.into_iter().enumerate()
      .map(|(i, e)| e.as_expr(i)).collect::<Result<Vec<_>, _>>()?;
    let e = env.apply_thm(td, &args, &hyps, &self.dv)?;
    self.stack.push(StackEl::Proof(e));
    Ok(())
  }

  fn dummy(&mut self, sort: SortId) -> Result<(), ErrorKind> {
    self.bound.check_sort(sort)?;
    self.env.check_bindable(sort)?;
    let deps = self.dv.push_fresh()?;
    let i = u32::try_from(self.nargs).ok()
      .and_then(|n| n.checked_add(self.dummies)).ok_or(ErrorKind::Overflow)?;
    self.dummies += 1;
    let e = StackEl::Expr(Typed { expr: Expr::Var(i), sort, bound: true, deps, depth: 0 });
    self.heap.push(e.clone());
    self.stack.push(e);
    Ok(())
  }

  fn step(&mut self, cmd: ProofCmd) -> Result<(), ErrorKind> {
    match cmd {
      ProofCmd::Term(t) => self.term(t)?,
      ProofCmd::Ref(i) => {
        let e = self.heap.get(u32_as_usize(i)).ok_or(ErrorKind::HeapIndex(i))?.clone();
        self.stack.push(e)
      }
      ProofCmd::Dummy(s) => self.dummy(s)?,
      ProofCmd::Thm(t) => self.thm(t)?,
      ProofCmd::Save => {
        let e = self.stack.last().ok_or(ErrorKind::StackUnderflow)?.clone();
        self.heap.push(e)
      }
      ProofCmd::Sorry => { self.sorry = true; self.stack.push(StackEl::Sorry) }
      ProofCmd::End => unreachable!("end is handled by the caller"),
    }
    Ok(())
  }

  fn finish(mut self, mode: Mode, ret: &Expr) -> Result<Expr, ErrorKind> {
    let e = self.stack.pop().ok_or(ErrorKind::StackUnderflow)?;
    vassert!(self.stack.is_empty(), ErrorKind::ConclusionMismatch);
    match (mode, e) {
      (Mode::Proof, StackEl::Proof(e)) if e == *ret => {}
      (Mode::Proof, StackEl::Sorry) => {}
      (Mode::Statement, StackEl::Expr(e)) if e.expr == *ret => {}
      _ => return Err(ErrorKind::ConclusionMismatch),
    }
    vassert!(!self.sorry, ErrorKind::IncompleteProof);
    Ok(ret.clone())
  }
}

/// Find the `End` command, which must be the last command and occur only once.
fn check_shape(cmds: &[ProofCmd]) -> Result<usize, MachineError> {
  match cmds.iter().position(|&c| c == ProofCmd::End) {
    None => Err((Some(cmds.len()), ErrorKind::MalformedProof("proof does not end"))),
    Some(i) if i + 1 != cmds.len() =>
      Err((Some(i + 1), ErrorKind::MalformedProof("commands after the end of the proof"))),
    Some(i) => Ok(i),
  }
}

impl Environment {
  /// Check the frame of a declaration, then run `cmds` against it, using only
  /// the declarations below `bound`. Returns the final expression, which is
  /// the conclusion `ret`.
  pub fn run_proof(
    &self, bound: &Bound, frame: &Frame, ret: &Expr, mode: Mode, cmds: &[ProofCmd],
  ) -> Result<Expr, MachineError> {
    let end = check_shape(cmds)?;
    let (vars, dv) = self.check_frame(bound, frame, ret).map_err(|e| (None, e))?;
    let mut heap = vars.into_iter().map(StackEl::Expr).collect::<Vec<_>>();
    heap.extend(frame.hyps.iter().cloned().map(StackEl::Proof));
    let mut m = Machine {
      env: self, bound, nargs: frame.args.len(), heap, stack: vec![], dv, dummies: 0, sorry: false,
    };
    for (i, &cmd) in cmds[..end].iter().enumerate() {
      m.step(cmd).map_err(|e| (Some(i), e))?
    }
    let e = m.finish(mode, ret).map_err(|e| (Some(end), e))?;
    trace!("proof checked: {} commands", cmds.len());
    Ok(e)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::environment::Type;
  use crate::error::Disjointness;
  use mm0k_util::Modifiers;
  use ProofCmd::*;

  struct Ctx { env: Environment, wff: SortId, imp: TermId, mp: ThmId }

  fn ctx() -> Ctx {
    let mut env = Environment::new();
    let wff = env.add_sort(Some("wff"), Modifiers::PROVABLE).unwrap();
    let imp = env.add_term(Some("imp"),
      [Type::Reg(wff, 0), Type::Reg(wff, 0)].into(), (wff, 0)).unwrap();
    let frame = Frame::new(vec![Type::Reg(wff, 0), Type::Reg(wff, 0)],
      vec![Expr::Var(0), Expr::app(imp, [Expr::Var(0), Expr::Var(1)])], []);
    let mp = env.add_axiom(Some("ax_mp"), frame, Expr::Var(1), None).unwrap();
    Ctx { env, wff, imp, mp }
  }

  fn run(c: &Ctx, frame: &Frame, ret: &Expr, mode: Mode, cmds: &[ProofCmd]) -> MachineError {
    c.env.run_proof(&c.env.bound(), frame, ret, mode, cmds).unwrap_err()
  }

  #[test]
  fn statement_script() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0); 2], vec![], []);
    let ret = Expr::app(c.imp, [Expr::Var(0), Expr::Var(1)]);
    let e = c.env.run_proof(&c.env.bound(), &frame, &ret, Mode::Statement,
      &[Ref(0), Ref(1), Term(c.imp), End]).unwrap();
    assert_eq!(e, ret);
  }

  #[test]
  fn modus_ponens_with_save() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0); 2],
      vec![Expr::Var(0), Expr::app(c.imp, [Expr::Var(0), Expr::Var(1)])], []);
    // heap: v0 v1 h0 h1
    let cmds = [Ref(0), Save, Ref(1), Ref(2), Ref(3), Thm(c.mp), End];
    let e = c.env.run_proof(&c.env.bound(), &frame, &Expr::Var(1), Mode::Proof, &cmds).unwrap();
    assert_eq!(e, Expr::Var(1));
    let (i, e) = run(&c, &frame, &Expr::Var(1), Mode::Proof, &[Ref(0), Ref(1), Ref(3), Ref(3), Thm(c.mp), End]);
    assert_eq!(i, Some(4));
    assert!(matches!(e, ErrorKind::HypothesisMismatch(0)));
  }

  #[test]
  fn shape_errors() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0)], vec![], []);
    let ret = Expr::Var(0);
    let (i, e) = run(&c, &frame, &ret, Mode::Statement, &[Ref(0)]);
    assert_eq!(i, Some(1));
    assert!(matches!(e, ErrorKind::MalformedProof(_)));
    let (i, e) = run(&c, &frame, &ret, Mode::Statement, &[Ref(0), End, Ref(0)]);
    assert_eq!(i, Some(2));
    assert!(matches!(e, ErrorKind::MalformedProof(_)));
  }

  #[test]
  fn stack_errors() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0)], vec![], []);
    let ret = Expr::Var(0);
    assert!(matches!(run(&c, &frame, &ret, Mode::Statement, &[End]), (Some(0), ErrorKind::StackUnderflow)));
    assert!(matches!(run(&c, &frame, &ret, Mode::Statement, &[Save, End]), (Some(0), ErrorKind::StackUnderflow)));
    assert!(matches!(run(&c, &frame, &ret, Mode::Statement, &[Ref(0), Term(c.imp), End]),
      (Some(1), ErrorKind::StackUnderflow)));
    assert!(matches!(run(&c, &frame, &ret, Mode::Statement, &[Ref(1), End]),
      (Some(0), ErrorKind::HeapIndex(1))));
    assert!(matches!(run(&c, &frame, &ret, Mode::Statement, &[Ref(0), Ref(0), End]),
      (Some(2), ErrorKind::ConclusionMismatch)));
    assert!(matches!(run(&c, &frame, &ret, Mode::Proof, &[Ref(0), End]),
      (Some(1), ErrorKind::ConclusionMismatch)));
  }

  #[test]
  fn sorry_is_incomplete() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0)], vec![], []);
    let (i, e) = run(&c, &frame, &Expr::Var(0), Mode::Proof, &[Sorry, End]);
    assert_eq!(i, Some(1));
    assert!(matches!(e, ErrorKind::IncompleteProof));
    // a sorry can stand in for a hypothesis, but still fails the proof
    let frame = Frame::new(vec![Type::Reg(c.wff, 0); 2], vec![Expr::Var(0)], []);
    let (_, e) = run(&c, &frame, &Expr::Var(1), Mode::Proof, &[Ref(0), Ref(1), Ref(2), Sorry, Thm(c.mp), End]);
    assert!(matches!(e, ErrorKind::IncompleteProof));
  }

  #[test]
  fn forward_references_in_proofs() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0)], vec![], []);
    let (i, e) = run(&c, &frame, &Expr::Var(0), Mode::Proof, &[Thm(ThmId(1)), End]);
    assert_eq!(i, Some(0));
    assert!(matches!(e, ErrorKind::UnknownTheorem(ThmId(1))));
    let (_, e) = run(&c, &frame, &Expr::Var(0), Mode::Proof, &[Term(TermId(7)), End]);
    assert!(matches!(e, ErrorKind::UnknownTerm(TermId(7))));
  }

  #[test]
  fn proof_in_expression_slot() {
    let c = ctx();
    let frame = Frame::new(vec![Type::Reg(c.wff, 0)], vec![Expr::Var(0)], []);
    let (_, e) = run(&c, &frame, &Expr::Var(0), Mode::Statement, &[Ref(1), Ref(0), Term(c.imp), End]);
    assert!(matches!(e, ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedExpr(0))));
  }

  #[test]
  fn theorem_slots_are_expressions_before_sorts() {
    let mut c = ctx();
    let nat = c.env.add_sort(Some("nat"), Modifiers::NONE).unwrap();
    let frame = Frame::new(vec![Type::Reg(nat, 0), Type::Reg(c.wff, 0)], vec![Expr::Var(1)], []);
    // heap: v0 v1 h0
    let (i, e) = run(&c, &frame, &Expr::Var(1), Mode::Proof,
      &[Ref(0), Ref(2), Ref(2), Ref(2), Thm(c.mp), End]);
    assert_eq!(i, Some(4));
    assert!(matches!(e, ErrorKind::ArityOrSortMismatch(Mismatch::ExpectedExpr(1))));
    let (_, e) = run(&c, &frame, &Expr::Var(1), Mode::Proof,
      &[Ref(1), Ref(0), Ref(2), Ref(2), Thm(c.mp), End]);
    assert!(matches!(e, ErrorKind::ArityOrSortMismatch(
      Mismatch::Sort { slot: 1, expected, found }) if expected == c.wff && found == nat));
  }

  #[test]
  fn dummies_are_fresh() {
    let mut env = Environment::new();
    let set = env.add_sort(Some("set"), Modifiers::PURE).unwrap();
    let wff = env.add_sort(Some("wff"), Modifiers::PROVABLE).unwrap();
    let tru = env.add_term(Some("tru"), [].into(), (wff, 0)).unwrap();
    let dvf = Frame::new(vec![Type::Bound(set), Type::Bound(set)], vec![], [(0, 1)]);
    let ax = env.add_axiom(Some("ax"), dvf, Expr::app(tru, []), None).unwrap();
    let ret = Expr::app(tru, []);
    let frame = Frame::default();
    env.run_proof(&env.bound(), &frame, &ret, Mode::Proof,
      &[Dummy(set), Dummy(set), Thm(ax), End]).unwrap();
    let (i, e) = env.run_proof(&env.bound(), &frame, &ret, Mode::Proof,
      &[Dummy(set), Ref(0), Thm(ax), End]).unwrap_err();
    assert_eq!(i, Some(2));
    assert!(matches!(e, ErrorKind::DisjointnessViolation(Disjointness::Capture { pair: (0, 1), var: 0 })));
    let (_, e) = env.run_proof(&env.bound(), &frame, &ret, Mode::Proof, &[Dummy(wff), End]).unwrap_err();
    assert!(matches!(e, ErrorKind::SortAttribute(s, _) if s == wff));
    // frame variables are only disjoint when the frame says so
    let frame = Frame::new(vec![Type::Bound(set), Type::Bound(set)], vec![], []);
    let (_, e) = env.run_proof(&env.bound(), &frame, &ret, Mode::Proof,
      &[Ref(0), Ref(1), Thm(ax), End]).unwrap_err();
    assert!(matches!(e,
      ErrorKind::DisjointnessViolation(Disjointness::Missing { pair: (0, 1), vars: (0, 1) })));
    let frame = Frame::new(vec![Type::Bound(set), Type::Bound(set)], vec![], [(1, 0)]);
    env.run_proof(&env.bound(), &frame, &ret, Mode::Proof, &[Ref(0), Ref(1), Thm(ax), End]).unwrap();
  }
}
