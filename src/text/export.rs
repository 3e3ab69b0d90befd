//! Exporter from an [`Environment`] to `.mmt` text files.
//!
//! Variables are printed as `v0, v1, ...` and hypotheses as `h0, h1, ...`;
//! proofs refer to the heap by index. Declarations that are anonymous, or whose
//! name is not a text identifier, are printed as `s{n}`, `t{n}` and `T{n}`,
//! with `_` appended until the name is unused.

use std::borrow::Cow;
use std::collections::HashSet;
use std::io::{self, Write};

use itertools::Itertools;
use mm0k_format::ProofCmd;
use mm0k_util::{SortId, SortVec, TermId, TermVec, ThmId, ThmVec};

use crate::environment::{DeclKey, Environment, Expr, Frame, ThmKind, Type};
use crate::text::import::is_ident;

fn bound_names(args: &[Type]) -> Vec<usize> {
  args.iter().enumerate().filter(|(_, ty)| ty.bound()).map(|(i, _)| i).collect()
}

/// The store, with the name under which each declaration is printed.
/// Names are distinct across all kinds, as in the store.
struct Exporter<'a> {
  env: &'a Environment,
  sorts: SortVec<Cow<'a, str>>,
  terms: TermVec<Cow<'a, str>>,
  thms: ThmVec<Cow<'a, str>>,
}

impl<'a> Exporter<'a> {
  fn new(env: &'a Environment) -> Self {
    let mut taken = env.sorts.iter().map(|d| d.name.as_deref())
      .chain(env.terms.iter().map(|d| d.name.as_deref()))
      .chain(env.thms.iter().map(|d| d.name.as_deref()))
      .flatten().filter(|n| is_ident(n)).map(Cow::Borrowed).collect::<HashSet<_>>();
    let mut name = |given: Option<&'a str>, prefix: char, n: u32| -> Cow<'a, str> {
      match given {
        Some(name) if is_ident(name) => Cow::Borrowed(name),
        _ => {
          let mut fresh = format!("{prefix}{n}");
          while taken.contains(fresh.as_str()) { fresh.push('_') }
          taken.insert(Cow::Owned(fresh.clone()));
          Cow::Owned(fresh)
        }
      }
    };
    let sorts = env.sorts.enum_iter().map(|(s, d)| name(d.name.as_deref(), 's', s.0.into())).collect();
    let terms = env.terms.enum_iter().map(|(t, d)| name(d.name.as_deref(), 't', t.0)).collect();
    let thms = env.thms.enum_iter().map(|(t, d)| name(d.name.as_deref(), 'T', t.0)).collect();
    Exporter { env, sorts, terms, thms }
  }

  fn sort_name(&self, s: SortId) -> &str { &self.sorts[s] }
  fn term_name(&self, t: TermId) -> &str { &self.terms[t] }
  fn thm_name(&self, t: ThmId) -> &str { &self.thms[t] }

  fn write_deps(&self, w: &mut impl Write, bvs: &[usize], deps: u64) -> io::Result<()> {
    for (k, i) in bvs.iter().enumerate() {
      if deps & (1 << k) != 0 { write!(w, " v{i}")? }
    }
    Ok(())
  }

  fn write_binders(&self, w: &mut impl Write, args: &[Type]) -> io::Result<()> {
    let bvs = bound_names(args);
    write!(w, "(")?;
    for (i, &ty) in args.iter().enumerate() {
      if i != 0 { write!(w, " ")? }
      match ty {
        Type::Bound(s) => write!(w, "{{v{i} {}}}", self.sort_name(s))?,
        Type::Reg(s, deps) => {
          write!(w, "(v{i} {}", self.sort_name(s))?;
          self.write_deps(w, &bvs, deps)?;
          write!(w, ")")?
        }
      }
    }
    write!(w, ")")
  }

  fn write_expr(&self, w: &mut impl Write, e: &Expr) -> io::Result<()> {
    match e {
      Expr::Var(i) => write!(w, "v{i}"),
      Expr::App(t, args) => {
        write!(w, "({}", self.term_name(*t))?;
        for e in &**args { write!(w, " ")?; self.write_expr(w, e)? }
        write!(w, ")")
      }
    }
  }

  fn write_frame(&self, w: &mut impl Write, frame: &Frame, ret: &Expr) -> io::Result<()> {
    self.write_binders(w, &frame.args)?;
    write!(w, " (")?;
    for (j, h) in frame.hyps.iter().enumerate() {
      if j != 0 { write!(w, " ")? }
      write!(w, "(h{j} ")?;
      self.write_expr(w, h)?;
      write!(w, ")")?
    }
    write!(w, ") ({}) ", frame.dv.iter().format_with(" ", |(x, y), f| f(&format_args!("(v{x} v{y})"))))?;
    self.write_expr(w, ret)
  }

  fn write_proof(&self, w: &mut impl Write, cmds: &[ProofCmd]) -> io::Result<()> {
    write!(w, "\n  (proof")?;
    for &cmd in cmds {
      match cmd {
        ProofCmd::Term(t) => write!(w, " (term {})", self.term_name(t))?,
        ProofCmd::Ref(i) => write!(w, " (ref {i})")?,
        ProofCmd::Dummy(s) => write!(w, " (dummy {})", self.sort_name(s))?,
        ProofCmd::Thm(t) => write!(w, " (thm {})", self.thm_name(t))?,
        ProofCmd::Save => write!(w, " save")?,
        ProofCmd::Sorry => write!(w, " sorry")?,
        ProofCmd::End => break,
      }
    }
    write!(w, ")")
  }

  fn export(&self, w: &mut impl Write) -> io::Result<()> {
    for &key in &self.env.stmts {
      match key {
        DeclKey::Sort(s) => {
          let mods = self.env.sorts[s].mods;
          if mods.is_empty() {
            writeln!(w, "(sort {})", self.sort_name(s))?
          } else {
            writeln!(w, "(sort {} {mods})", self.sort_name(s))?
          }
        }
        DeclKey::Term(t) => {
          let td = &self.env.terms[t];
          write!(w, "(term {} ", self.term_name(t))?;
          self.write_binders(w, &td.args)?;
          let (s, deps) = td.ret;
          if deps == 0 {
            writeln!(w, " {})", self.sort_name(s))?
          } else {
            write!(w, " ({}", self.sort_name(s))?;
            self.write_deps(w, &bound_names(&td.args), deps)?;
            writeln!(w, "))")?
          }
        }
        DeclKey::Thm(t) => {
          let td = &self.env.thms[t];
          let kw = if let ThmKind::Axiom(_) = td.kind { "axiom" } else { "theorem" };
          write!(w, "({kw} {} ", self.thm_name(t))?;
          self.write_frame(w, &td.frame, &td.ret)?;
          if let Some((pf, _)) = td.script() { self.write_proof(w, &pf.cmds)? }
          writeln!(w, ")")?
        }
      }
    }
    Ok(())
  }
}

impl Environment {
  /// Write the store as a `.mmt` text file.
  pub fn export_text(&self, w: &mut impl Write) -> io::Result<()> { Exporter::new(self).export(w) }
}

/// Write the store as a `.mmt` text file.
pub fn export(env: &Environment, w: &mut impl Write) -> io::Result<()> { env.export_text(w) }
