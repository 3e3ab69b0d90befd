//! Importer for `.mmt` text files, which produces an [`Artifact`].
//!
//! Names are resolved while parsing, so every reference must point to an
//! earlier declaration. Everything else (sorts, arities, disjointness) is left
//! for the kernel to check.

use std::collections::HashMap;
use std::fmt;

use annotate_snippets::{Level, Renderer, Snippet};
use mm0k_format::ProofCmd;
use mm0k_util::{Modifiers, SortId, Span, TermId, ThmId};

use crate::artifact::{Artifact, Decl, Proof, Stmt};
use crate::environment::{Expr, Frame, Type, MAX_EXPR_DEPTH};

/// A syntax or name resolution error in a text file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseError {
  /// The location of the error, as a byte range.
  pub span: Span,
  /// The error message.
  pub msg: String,
}

impl ParseError {
  fn new(span: impl Into<Span>, msg: impl Into<String>) -> Self {
    ParseError { span: span.into(), msg: msg.into() }
  }

  /// Render the error with the offending source line, for display on a terminal.
  #[must_use]
  pub fn render(&self, path: &str, src: &str) -> String {
    let mut range = self.span.range();
    range.end = range.end.min(src.len());
    while !src.is_char_boundary(range.end) { range.end += 1 }
    range.start = range.start.min(range.end);
    while !src.is_char_boundary(range.start) { range.start -= 1 }
    let msg = Level::Error.title(&self.msg).snippet(
      Snippet::source(src).origin(path).fold(true)
        .annotation(Level::Error.span(range).label(&self.msg)));
    Renderer::plain().render(msg).to_string()
  }
}

impl fmt::Display for ParseError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} (at {}..{})", self.msg, self.span.start, self.span.end)
  }
}

impl std::error::Error for ParseError {}

type Result<T> = std::result::Result<T, ParseError>;

fn ident_char(c: u8) -> bool {
  c.is_ascii_alphanumeric() || b"_.-'!*+/<=>?^~".contains(&c)
}

/// True if `s` reads back as a single identifier.
pub(crate) fn is_ident(s: &str) -> bool {
  !s.is_empty() && !s.starts_with("--") && s.bytes().all(ident_char)
}

/// The local names of an axiom or theorem.
#[derive(Debug, Default)]
struct Locals<'a> {
  vars: Vec<&'a str>,
  bvs: Vec<&'a str>,
  hyps: Vec<&'a str>,
}

impl Locals<'_> {
  fn var(&self, x: &str) -> Option<u32> {
    u32::try_from(self.vars.iter().position(|&v| v == x)?).ok()
  }
}

/// The importer, which reads the input `.mmt` file and builds an [`Artifact`].
#[derive(Debug)]
pub struct Importer<'a> {
  /// The input source text
  source: &'a str,
  /// The position in the input
  idx: usize,
  sorts: HashMap<&'a str, SortId>,
  terms: HashMap<&'a str, TermId>,
  thms: HashMap<&'a str, ThmId>,
  num_sorts: usize,
  num_terms: u32,
  num_thms: u32,
  decls: Vec<Decl>,
}

impl<'a> Importer<'a> {
  /// Construct a new importer over the given source.
  #[must_use]
  pub fn new(source: &'a str) -> Self {
    Importer {
      source, idx: 0,
      sorts: HashMap::new(), terms: HashMap::new(), thms: HashMap::new(),
      num_sorts: 0, num_terms: 0, num_thms: 0,
      decls: vec![],
    }
  }

  fn bytes(&self) -> &'a [u8] { self.source.as_bytes() }
  fn cur_opt(&self) -> Option<u8> { self.bytes().get(self.idx).copied() }

  fn ws(&mut self) {
    while let Some(c) = self.cur_opt() {
      if c.is_ascii_whitespace() { self.idx += 1; continue }
      if c == b'-' && self.bytes().get(self.idx + 1) == Some(&b'-') {
        self.idx = match memchr::memchr(b'\n', &self.bytes()[self.idx..]) {
          Some(n) => self.idx + n + 1,
          None => self.source.len(),
        }
      } else { break }
    }
  }

  /// An error at the current character.
  fn err(&self, msg: impl Into<String>) -> ParseError {
    let len = self.source[self.idx..].chars().next().map_or(0, char::len_utf8);
    ParseError::new(self.idx..self.idx + len, msg)
  }

  fn ident(&mut self) -> Option<(Span, &'a str)> {
    let start = self.idx;
    while self.cur_opt().is_some_and(ident_char) { self.idx += 1 }
    if self.idx == start { return None }
    let sp = Span::from(start..self.idx);
    let s = &self.source[start..self.idx];
    self.ws();
    Some((sp, s))
  }

  fn ident_err(&mut self) -> Result<(Span, &'a str)> {
    self.ident().ok_or_else(|| self.err("expecting identifier"))
  }

  fn chr(&mut self, c: u8) -> Option<usize> {
    if self.cur_opt()? != c { return None }
    let start = self.idx;
    self.idx += 1;
    self.ws();
    Some(start)
  }

  fn chr_err(&mut self, c: u8) -> Result<usize> {
    self.chr(c).ok_or_else(|| self.err(format!("expecting '{}'", c as char)))
  }

  fn open(&mut self) -> Option<usize> { self.chr(b'(') }
  fn close(&mut self) -> Option<usize> { self.chr(b')') }
  fn open_err(&mut self) -> Result<usize> { self.chr_err(b'(') }
  fn close_err(&mut self) -> Result<usize> { self.chr_err(b')') }

  fn sort_err(&mut self) -> Result<SortId> {
    let (sp, s) = self.ident_err()?;
    self.sorts.get(s).copied().ok_or_else(|| ParseError::new(sp, format!("unknown sort '{s}'")))
  }

  fn term_err(&mut self) -> Result<TermId> {
    let (sp, s) = self.ident_err()?;
    self.terms.get(s).copied().ok_or_else(|| ParseError::new(sp, format!("unknown term '{s}'")))
  }

  fn thm_err(&mut self) -> Result<ThmId> {
    let (sp, s) = self.ident_err()?;
    self.thms.get(s).copied().ok_or_else(|| ParseError::new(sp, format!("unknown theorem '{s}'")))
  }

  /// Parse dependencies up to the closing parenthesis.
  fn deps(&mut self, bvs: &[&str]) -> Result<u64> {
    let mut deps = 0;
    while self.close().is_none() {
      let (sp, z) = self.ident_err()?;
      let k = bvs.iter().position(|&b| b == z)
        .ok_or_else(|| ParseError::new(sp, format!("expecting bound variable, got '{z}'")))?;
      deps |= u32::try_from(k).ok().and_then(|k| 1_u64.checked_shl(k))
        .ok_or_else(|| ParseError::new(sp, "too many bound variables"))?;
    }
    Ok(deps)
  }

  fn binders(&mut self, locals: &mut Locals<'a>) -> Result<Vec<Type>> {
    self.open_err()?;
    let mut args = vec![];
    while self.close().is_none() {
      let (sp, x, ty) = if self.chr(b'{').is_some() {
        let (sp, x) = self.ident_err()?;
        let s = self.sort_err()?;
        self.chr_err(b'}')?;
        locals.bvs.push(x);
        (sp, x, Type::Bound(s))
      } else {
        self.open_err()?;
        let (sp, x) = self.ident_err()?;
        let s = self.sort_err()?;
        (sp, x, Type::Reg(s, self.deps(&locals.bvs)?))
      };
      if locals.vars.contains(&x) {
        return Err(ParseError::new(sp, format!("duplicate variable '{x}'")))
      }
      locals.vars.push(x);
      args.push(ty)
    }
    Ok(args)
  }

  /// Parse an expression inside `level` enclosing applications.
  fn expr(&mut self, locals: &Locals<'a>, level: usize) -> Result<Expr> {
    if let Some(start) = self.open() {
      if level >= MAX_EXPR_DEPTH {
        return Err(ParseError::new(start..start + 1,
          format!("expression is nested more than {MAX_EXPR_DEPTH} terms deep")))
      }
      let t = self.term_err()?;
      let mut args = vec![];
      while self.close().is_none() { args.push(self.expr(locals, level + 1)?) }
      Ok(Expr::app(t, args))
    } else {
      let (sp, x) = self.ident_err()?;
      locals.var(x).map(Expr::Var)
        .ok_or_else(|| ParseError::new(sp, format!("unknown variable '{x}'")))
    }
  }

  fn hyps(&mut self, locals: &mut Locals<'a>) -> Result<Vec<Expr>> {
    self.open_err()?;
    let mut hyps = vec![];
    while self.close().is_none() {
      self.open_err()?;
      let (sp, h) = self.ident_err()?;
      if locals.vars.contains(&h) || locals.hyps.contains(&h) {
        return Err(ParseError::new(sp, format!("duplicate variable '{h}'")))
      }
      hyps.push(self.expr(locals, 0)?);
      locals.hyps.push(h);
      self.close_err()?;
    }
    Ok(hyps)
  }

  fn dv_pairs(&mut self, locals: &Locals<'a>) -> Result<Vec<(u32, u32)>> {
    self.open_err()?;
    let mut dv = vec![];
    while self.close().is_none() {
      self.open_err()?;
      let mut var = || -> Result<u32> {
        let (sp, x) = self.ident_err()?;
        locals.var(x).ok_or_else(|| ParseError::new(sp, format!("unknown variable '{x}'")))
      };
      let (x, y) = (var()?, var()?);
      dv.push((x, y));
      self.close_err()?;
    }
    Ok(dv)
  }

  fn heap_ref(&mut self, locals: &Locals<'a>) -> Result<u32> {
    let (sp, x) = self.ident_err()?;
    if x.bytes().all(|c| c.is_ascii_digit()) {
      return x.parse().map_err(|_| ParseError::new(sp, "heap index too large"))
    }
    if let Some(i) = locals.var(x) { return Ok(i) }
    let j = locals.hyps.iter().position(|&h| h == x)
      .ok_or_else(|| ParseError::new(sp, format!("unknown variable '{x}'")))?;
    u32::try_from(locals.vars.len() + j).map_err(|_| ParseError::new(sp, "heap index too large"))
  }

  fn proof(&mut self, locals: &Locals<'a>) -> Result<Proof> {
    self.open_err()?;
    let (sp, kw) = self.ident_err()?;
    if kw != "proof" { return Err(ParseError::new(sp, "expecting 'proof'")) }
    let (mut cmds, mut pos) = (vec![], vec![]);
    loop {
      let start = self.idx;
      let cmd = if self.close().is_some() {
        ProofCmd::End
      } else if self.open().is_some() {
        let (sp, kw) = self.ident_err()?;
        let cmd = match kw {
          "ref" => ProofCmd::Ref(self.heap_ref(locals)?),
          "term" => ProofCmd::Term(self.term_err()?),
          "thm" => ProofCmd::Thm(self.thm_err()?),
          "dummy" => ProofCmd::Dummy(self.sort_err()?),
          _ => return Err(ParseError::new(sp, format!("unknown proof command '{kw}'"))),
        };
        self.close_err()?;
        cmd
      } else {
        match self.ident_err()? {
          (_, "save") => ProofCmd::Save,
          (_, "sorry") => ProofCmd::Sorry,
          (sp, kw) => return Err(ParseError::new(sp, format!("unknown proof command '{kw}'"))),
        }
      };
      cmds.push(cmd);
      pos.push(start);
      if cmd == ProofCmd::End { break }
    }
    Ok(Proof { cmds: cmds.into(), pos: Some(pos.into()) })
  }

  fn new_name<V>(map: &mut HashMap<&'a str, V>, name: &'a str, v: V) {
    // a duplicate keeps resolving to the first declaration; the kernel rejects the second
    map.entry(name).or_insert(v);
  }

  fn decl(&mut self) -> Result<()> {
    let pos = self.open_err()?;
    let (sp, kw) = self.ident_err()?;
    let (_, name) = self.ident_err()?;
    let stmt = match kw {
      "sort" => {
        let mut mods = Modifiers::NONE;
        while self.close().is_none() {
          let (sp, m) = self.ident_err()?;
          let m = Modifiers::from_name(m.as_bytes());
          if m.is_empty() { return Err(ParseError::new(sp, "unknown sort modifier")) }
          mods |= m
        }
        let id = u8::try_from(self.num_sorts).map_err(|_| ParseError::new(sp, "too many sorts"))?;
        self.num_sorts += 1;
        Self::new_name(&mut self.sorts, name, SortId(id));
        Stmt::Sort(mods)
      }
      "term" => {
        let mut locals = Locals::default();
        let args = self.binders(&mut locals)?;
        let ret = if self.open().is_some() {
          let s = self.sort_err()?;
          (s, self.deps(&locals.bvs)?)
        } else {
          (self.sort_err()?, 0)
        };
        self.close_err()?;
        let id = TermId(self.num_terms);
        self.num_terms = self.num_terms.checked_add(1)
          .ok_or_else(|| ParseError::new(sp, "too many terms"))?;
        Self::new_name(&mut self.terms, name, id);
        Stmt::Term(args.into(), ret)
      }
      "axiom" | "theorem" => {
        let mut locals = Locals::default();
        let args = self.binders(&mut locals)?;
        let hyps = self.hyps(&mut locals)?;
        let dv = self.dv_pairs(&locals)?;
        let ret = self.expr(&locals, 0)?;
        let frame = Frame::new(args, hyps, dv);
        let stmt = if kw == "axiom" {
          let script = if self.close().is_some() { None } else {
            let pf = self.proof(&locals)?;
            self.close_err()?;
            Some(pf)
          };
          Stmt::Axiom(frame, ret, script)
        } else if self.close().is_some() {
          // a bare statement, as in a specification file
          Stmt::Thm(frame, ret, Proof::default())
        } else {
          let pf = self.proof(&locals)?;
          self.close_err()?;
          Stmt::Thm(frame, ret, pf)
        };
        let id = ThmId(self.num_thms);
        self.num_thms = self.num_thms.checked_add(1)
          .ok_or_else(|| ParseError::new(sp, "too many theorems"))?;
        Self::new_name(&mut self.thms, name, id);
        stmt
      }
      _ => return Err(ParseError::new(sp, format!("unknown declaration keyword '{kw}'"))),
    };
    self.decls.push(Decl { name: Some(name.into()), pos, stmt });
    Ok(())
  }

  /// Parse the whole input.
  pub fn run(mut self) -> Result<Artifact> {
    self.ws();
    while self.idx < self.source.len() { self.decl()? }
    debug!("parsed {} declarations", self.decls.len());
    Ok(Artifact { decls: self.decls })
  }
}

/// Parse a `.mmt` file.
pub fn parse(source: &str) -> Result<Artifact> { Importer::new(source).run() }
