//! Importer for binary proof files into an [`Artifact`].
//!
//! The whole file is decoded before anything is handed to the kernel, so a
//! malformed file never results in a partially loaded store.

use mm0k_format::{Arg, BasicMmkFile, ExprCmd, NumdStmtCmd, ParseError, ProofIter, ThmRef};
use mm0k_util::Modifiers;

use crate::artifact::{Artifact, Decl, Proof, Stmt};
use crate::environment::{Expr, Frame, Type, MAX_EXPR_DEPTH};

type Result<T> = std::result::Result<T, ParseError>;

fn binder(a: Arg) -> Type {
  if a.bound() { Type::Bound(a.sort()) } else { Type::Reg(a.sort(), a.deps()) }
}

/// Decode the binders of a theorem, turning the per-binder disjointness sets
/// into pairs of binder positions.
fn parse_frame_args(args: &[Arg], pos: usize) -> Result<(Vec<Type>, Vec<(u32, u32)>)> {
  let mut bvs = vec![];
  let mut dv = vec![];
  for (i, &a) in args.iter().enumerate() {
    let i = u32::try_from(i).map_err(|_| ParseError::StrError("too many binders", pos))?;
    if a.bound() {
      let mut d = a.deps();
      while d != 0 {
        let k = d.trailing_zeros() as usize;
        d &= d - 1;
        let &j = bvs.get(k).ok_or(ParseError::StrError("disjointness with a later binder", pos))?;
        dv.push((j, i));
      }
      bvs.push(i);
    }
  }
  Ok((args.iter().map(|&a| binder(a)).collect(), dv))
}

/// Decode the statement stream of a theorem into its hypotheses and conclusion.
/// The stack holds each expression with its nesting depth.
fn parse_stmt(file: &BasicMmkFile<'_>, th: &ThmRef<'_>, pos: usize) -> Result<(Vec<Expr>, Expr)> {
  use ParseError::StrError;
  let mut stack: Vec<(Expr, usize)> = vec![];
  let mut hyps = vec![];
  for cmd in th.stmt() {
    match cmd? {
      ExprCmd::Ref(i) => stack.push((Expr::Var(i), 0)),
      ExprCmd::Term(t) => {
        let n = file.term(t).ok_or(StrError("unknown term in statement", pos))?.args().len();
        let len = stack.len().checked_sub(n).ok_or(StrError("statement stack underflow", pos))?;
        let depth = stack[len..].iter().map(|e| e.1).max().unwrap_or(0) + 1;
        if depth > MAX_EXPR_DEPTH { return Err(StrError("statement nested too deeply", pos)) }
        let e = Expr::app(t, stack.drain(len..).map(|e| e.0));
        stack.push((e, depth))
      }
      ExprCmd::Hyp => hyps.push(stack.pop().ok_or(StrError("statement stack underflow", pos))?.0),
    }
  }
  let (ret, _) = stack.pop().ok_or(StrError("statement has no conclusion", pos))?;
  if !stack.is_empty() { return Err(StrError("unused statement entries", pos)) }
  Ok((hyps, ret))
}

fn parse_proof(mut it: ProofIter<'_>) -> Result<Option<Proof>> {
  if it.is_null() { return Ok(None) }
  let (mut cmds, mut pos) = (vec![], vec![]);
  loop {
    pos.push(it.pos);
    match it.next() {
      Some(cmd) => cmds.push(cmd?),
      None => { pos.pop(); break }
    }
  }
  Ok(Some(Proof { cmds: cmds.into(), pos: Some(pos.into()) }))
}

/// Decode a binary proof file.
pub fn parse(buf: &[u8]) -> Result<Artifact> {
  use ParseError::StrError;
  let file = BasicMmkFile::parse(buf)?;
  let mut it = file.proof();
  let mut decls = vec![];
  loop {
    let pos = it.pos;
    let Some(res) = it.next() else { break };
    let (stmt, pf) = res?;
    let name = file.try_stmt_name(stmt)?.map(Into::into);
    let stmt = match stmt {
      NumdStmtCmd::Sort { sort_id } => {
        if !pf.is_null() { return Err(StrError("sort with a proof", pos)) }
        Stmt::Sort(Modifiers::new(file.sort(sort_id).ok_or(StrError("sort out of range", pos))?.0))
      }
      NumdStmtCmd::Term { term_id } => {
        if !pf.is_null() { return Err(StrError("term with a proof", pos)) }
        let t = file.term(term_id).ok_or(StrError("term out of range", pos))?;
        if t.flags() != 0 { return Err(StrError("unknown term flags", pos)) }
        let ret = t.ret();
        if ret.bound() || ret.sort() != t.sort() { return Err(StrError("bad term result", pos)) }
        Stmt::Term(t.args().iter().map(|&a| binder(a)).collect(), (ret.sort(), ret.deps()))
      }
      NumdStmtCmd::Axiom { thm_id } | NumdStmtCmd::Thm { thm_id } => {
        let th = file.thm(thm_id).ok_or(StrError("theorem out of range", pos))?;
        let (args, dv) = parse_frame_args(th.args(), pos)?;
        let (hyps, ret) = parse_stmt(&file, &th, pos)?;
        let frame = Frame::new(args, hyps, dv);
        let proof = parse_proof(pf)?;
        if let NumdStmtCmd::Axiom { .. } = stmt {
          Stmt::Axiom(frame, ret, proof)
        } else {
          Stmt::Thm(frame, ret, proof.ok_or(StrError("theorem without a proof", pos))?)
        }
      }
    };
    decls.push(Decl { name, pos, stmt })
  }
  if decls.len() != file.sorts.len() + file.terms.len() + file.thms.len() {
    return Err(StrError("declaration count does not match the tables", buf.len()))
  }
  debug!("decoded {} declarations", decls.len());
  Ok(Artifact { decls })
}
