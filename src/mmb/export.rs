//! Exporter from an [`Environment`] to the binary proof format.

use std::io::{self, Write};

use mm0k_format::{Arg, ExprCmd, Mm0Writer, ProofCmd, Reopen, SortData};
use mm0k_util::u32_as_usize;

use crate::environment::{DeclKey, Environment, Expr, Frame, ThmKind, Type};

/// The encoded binders of a frame. A bound binder records the earlier bound
/// binders it must be disjoint from.
fn frame_args(frame: &Frame) -> Vec<Arg> {
  let mut ordinal = vec![None; frame.args.len()];
  let mut n = 0;
  for (i, ty) in frame.args.iter().enumerate() {
    if ty.bound() { ordinal[i] = Some(n); n += 1 }
  }
  frame.args.iter().enumerate().map(|(i, &ty)| match ty {
    Type::Reg(s, deps) => Arg::reg(s, deps),
    Type::Bound(s) => {
      let dv = frame.dv.iter()
        .filter(|&&(_, y)| u32_as_usize(y) == i)
        .filter_map(|&(x, _)| ordinal[u32_as_usize(x)])
        .fold(0, |dv, k| dv | (1 << k));
      Arg::bound_var(s, dv)
    }
  }).collect()
}

fn binder_args(args: &[Type]) -> Vec<Arg> {
  args.iter().map(|&ty| match ty {
    Type::Bound(s) => Arg::bound_var(s, 0),
    Type::Reg(s, deps) => Arg::reg(s, deps),
  }).collect()
}

fn write_expr(w: &mut impl Write, e: &Expr) -> io::Result<()> {
  match e {
    &Expr::Var(i) => ExprCmd::Ref(i).write_to(w),
    Expr::App(t, args) => {
      for e in &**args { write_expr(w, e)? }
      ExprCmd::Term(*t).write_to(w)
    }
  }
}

/// Write the store to `proof` as an [`Mm0Writer`] declaration stream, then the
/// finished file to `w`.
pub fn export_with<W: Reopen>(env: &Environment, proof: W, w: &mut impl Write) -> io::Result<()> {
  let mut mw = Mm0Writer::new(proof);
  for &key in &env.stmts {
    match key {
      DeclKey::Sort(s) => {
        let sd = &env.sorts[s];
        mw.add_sort(sd.name.as_deref(), SortData(sd.mods.bits()))?;
      }
      DeclKey::Term(t) => {
        let td = &env.terms[t];
        mw.add_term(td.name.as_deref(), &binder_args(&td.args), Arg::reg(td.ret.0, td.ret.1))?;
      }
      DeclKey::Thm(t) => {
        let td = &env.thms[t];
        let args = frame_args(&td.frame);
        let (mut b, script) = match &td.kind {
          ThmKind::Axiom(script) => (mw.add_axiom(td.name.as_deref(), &args)?, script.as_ref()),
          ThmKind::Thm(proof) => (mw.add_thm(td.name.as_deref(), &args)?, Some(proof)),
        };
        for h in &*td.frame.hyps {
          write_expr(b.stmt(), h)?;
          ExprCmd::Hyp.write_to(b.stmt())?;
        }
        write_expr(b.stmt(), &td.ret)?;
        for &cmd in script.into_iter().flat_map(|pf| &*pf.cmds) {
          if cmd != ProofCmd::End { cmd.write_to(b.proof())? }
        }
        b.finish()?;
      }
    }
  }
  mw.finish(w)
}

/// Write the store as a binary proof file, buffering the declaration stream in memory.
pub fn export(env: &Environment, w: &mut impl Write) -> io::Result<()> {
  export_with(env, vec![], w)
}
