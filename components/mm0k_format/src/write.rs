#[allow(clippy::wildcard_imports)]
use crate::cmd::*;
use crate::{Arg, ExprCmd, Header, ProofCmd, SortData, TableEntry, TermEntry, ThmEntry, MAX_SORTS};
use byteorder::{WriteBytesExt, LE};
use mm0k_util::{SortId, SortVec, TermId, TermVec, ThmId, ThmVec};
use std::io::{self, Cursor, Read, Write};
use zerocopy::{IntoBytes, U16, U32};

/// Encode the command `cmd` (one of the `STMT_*` or `PROOF_*` commands
/// in this module, which are all 6 bit numbers) with the given `data` field
/// according to the following scheme:
///
///   * `cmd | 0x00` for `data = 0`
///   * `cmd | 0x40, data:u8` for 8 bit `data`
///   * `cmd | 0x80, data:u16` for 16 bit `data`
///   * `cmd | 0xC0, data:u32` for 32 bit `data`
///
/// where we select the shortest available encoding given the value of `data`.
pub fn write_cmd(w: &mut impl Write, cmd: u8, data: u32) -> io::Result<()> {
  if data == 0 {
    w.write_u8(cmd)
  } else if let Ok(data) = u8::try_from(data) {
    w.write_u8(cmd | DATA_8)?;
    w.write_u8(data)
  } else if let Ok(data) = u16::try_from(data) {
    w.write_u8(cmd | DATA_16)?;
    w.write_u16::<LE>(data)
  } else {
    w.write_u8(cmd | DATA_32)?;
    w.write_u32::<LE>(data)
  }
}

/// This is like [`write_cmd`], but it is followed by
/// the byte array `buf`, and the initial `data` field is the length of the entire
/// record (the initial command byte, the `data` field, and the buffer).
/// This can't be expressed with `write_cmd` directly because of the circular
/// dependency where the value of `data` determines the size of the initial command,
/// which affects the value of `data`.
pub fn write_cmd_bytes(w: &mut impl Write, cmd: u8, buf: &[u8]) -> io::Result<()> {
  if let Ok(data) = (buf.len() + 2).try_into() {
    w.write_u8(cmd | DATA_8)?;
    w.write_u8(data)?;
  } else if let Ok(data) = (buf.len() + 3).try_into() {
    w.write_u8(cmd | DATA_16)?;
    w.write_u16::<LE>(data)?;
  } else {
    let data = (buf.len() + 5)
      .try_into()
      .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "too large for format"))?;
    w.write_u8(cmd | DATA_32)?;
    w.write_u32::<LE>(data)?;
  }
  w.write_all(buf)
}

impl ExprCmd {
  /// Serialize an [`ExprCmd`] to the given writer.
  #[inline]
  pub fn write_to(self, w: &mut impl Write) -> io::Result<()> {
    match self {
      ExprCmd::Ref(n) => write_cmd(w, PROOF_REF, n),
      ExprCmd::Term(tid) => write_cmd(w, PROOF_TERM, tid.0),
      ExprCmd::Hyp => w.write_u8(PROOF_HYP),
    }
  }
}

impl ProofCmd {
  /// Serialize a [`ProofCmd`] to the given writer. Uses the `PROOF_*` commands in
  /// [`cmd`](super::cmd).
  #[inline]
  pub fn write_to(self, w: &mut impl Write) -> io::Result<()> {
    match self {
      ProofCmd::Term(tid) => write_cmd(w, PROOF_TERM, tid.0),
      ProofCmd::Ref(n) => write_cmd(w, PROOF_REF, n),
      ProofCmd::Dummy(sid) => write_cmd(w, PROOF_DUMMY, sid.0.into()),
      ProofCmd::Thm(tid) => write_cmd(w, PROOF_THM, tid.0),
      ProofCmd::Save => w.write_u8(PROOF_SAVE),
      ProofCmd::Sorry => w.write_u8(PROOF_SORRY),
      ProofCmd::End => w.write_u8(CMD_END),
    }
  }
}

/// An implementation of `Reopen` is a writer that can be closed and reopened to read what was just
/// written.
pub trait Reopen: Write {
  /// The type returned by `reopen`, which must implement `Read`.
  type Reopened: Read;
  /// Consume this writer and reopen it as another type `Self::Reopened`, which supports reading to
  /// read what was just written.
  fn reopen(self) -> io::Result<Self::Reopened>;
}

impl Reopen for Vec<u8> {
  type Reopened = Cursor<Self>;
  fn reopen(self) -> io::Result<Self::Reopened> { Ok(Cursor::new(self)) }
}

#[derive(Debug)]
struct TrackSize<W>(W, usize);

impl<W: Write> Write for TrackSize<W> {
  fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
    let n = self.0.write(buf)?;
    self.1 += n;
    Ok(n)
  }

  fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
    self.0.write_all(buf)?;
    self.1 += buf.len();
    Ok(())
  }

  fn flush(&mut self) -> io::Result<()> { self.0.flush() }
}

fn overflow(what: &'static str) -> io::Error { io::Error::new(io::ErrorKind::InvalidInput, what) }

/// An `Mm0Writer` is a buffer for constructing a binary proof file when the total number of
/// sorts/terms/theorems is not yet known. It renders as much of the file as it can, so that the
/// actual file write consists mostly of `memcpy`s.
///
/// The declaration stream is handled separately, since it is much larger than the other parts.
/// The provided writer `W` must implement the `Reopen` trait, which allows it to be written to and
/// then reopened and read back into the target file.
#[derive(Debug)]
#[must_use = "dropping an Mm0Writer will not produce a proof file"]
pub struct Mm0Writer<W> {
  sorts: SortVec<SortData>,
  terms: TermVec<TermEntry>,
  thms: ThmVec<ThmEntry>,
  term_thm_buf: Vec<u8>,
  proof: TrackSize<W>,
  names_buf: Vec<u8>,
  sort_names: SortVec<(usize, usize)>,
  term_names: TermVec<(usize, usize)>,
  thm_names: ThmVec<(usize, usize)>,
}

fn push_name(buf: &mut Vec<u8>, name: Option<&str>) -> usize {
  if let Some(name) = name {
    let n = buf.len();
    let s = name.as_bytes();
    assert!(memchr::memchr(0, s).is_none(), "names may not contain nul bytes");
    buf.extend_from_slice(s);
    buf.push(0);
    n
  } else {
    usize::MAX
  }
}

fn pad_to(pos: usize, n: u8) -> (usize, usize) {
  #[allow(clippy::cast_possible_truncation)] // actual truncation
  let i = (n.wrapping_sub(pos as u8) & (n - 1)).into();
  (i, pos + i)
}

impl<W: Reopen> Mm0Writer<W> {
  /// Create a new empty `Mm0Writer`. Takes as input a writer for the declaration stream
  /// (which is typically larger than the other components, and can be set to a temporary file or
  /// an in-memory buffer).
  pub fn new(proof: W) -> Mm0Writer<W> {
    Mm0Writer {
      sorts: Default::default(),
      terms: Default::default(),
      thms: Default::default(),
      term_thm_buf: Default::default(),
      proof: TrackSize(proof, 0),
      names_buf: Default::default(),
      sort_names: Default::default(),
      term_names: Default::default(),
      thm_names: Default::default(),
    }
  }

  fn p_args(&self) -> io::Result<U32<zerocopy::LE>> {
    Ok(U32::new(self.term_thm_buf.len().try_into().map_err(|_| overflow("term section overflow"))?))
  }

  /// Add a new sort with the given name and sort modifiers. Returns the ID of the new sort.
  pub fn add_sort(&mut self, name: Option<&str>, data: SortData) -> io::Result<SortId> {
    if self.sorts.len() >= MAX_SORTS {
      return Err(overflow("too many sorts (max 128)"))
    }
    let n = self.sorts.push(data);
    self.sort_names.push((self.proof.1, push_name(&mut self.names_buf, name)));
    write_cmd_bytes(&mut self.proof, STMT_SORT, &[])?;
    Ok(n)
  }

  /// Add a new term with the given name and arguments. Returns the ID of the new term.
  pub fn add_term(&mut self, name: Option<&str>, args: &[Arg], ret: Arg) -> io::Result<TermId> {
    let num_args: u16 = args.len().try_into().map_err(|_| overflow("too many arguments"))?;
    let entry =
      TermEntry { num_args: U16::new(num_args), sort: ret.sort().0, flags: 0, p_args: self.p_args()? };
    let n = self.terms.next_id().ok_or_else(|| overflow("too many terms"))?;
    self.terms.push(entry);
    self.term_names.push((self.proof.1, push_name(&mut self.names_buf, name)));
    self.term_thm_buf.extend_from_slice(args.as_bytes());
    self.term_thm_buf.extend_from_slice(ret.as_bytes());
    write_cmd_bytes(&mut self.proof, STMT_TERM, &[])?;
    Ok(n)
  }

  fn add_thm_core(&mut self, cmd: u8, name: Option<&str>, args: &[Arg]) -> io::Result<ThmBuilder<'_, W>> {
    let num_args: u16 = args.len().try_into().map_err(|_| overflow("too many arguments"))?;
    let entry = ThmEntry { num_args: U16::new(num_args), reserved: [0; 2], p_args: self.p_args()? };
    let n = self.thms.next_id().ok_or_else(|| overflow("too many theorems"))?;
    self.thms.push(entry);
    self.thm_names.push((self.proof.1, push_name(&mut self.names_buf, name)));
    self.term_thm_buf.extend_from_slice(args.as_bytes());
    Ok(ThmBuilder { w: self, cmd, buf: vec![], id: n })
  }

  /// Begin construction of a new axiom with the given name and arguments.
  /// The returned `ThmBuilder` contains references to the statement and proof streams, where the
  /// statement of the axiom (and optionally a statement script) should be inserted.
  pub fn add_axiom(&mut self, name: Option<&str>, args: &[Arg]) -> io::Result<ThmBuilder<'_, W>> {
    self.add_thm_core(STMT_AXIOM, name, args)
  }

  /// Begin construction of a new theorem with the given name and arguments.
  /// The returned `ThmBuilder` contains references to the statement and proof streams, where the
  /// statement and proof of the theorem should be inserted.
  pub fn add_thm(&mut self, name: Option<&str>, args: &[Arg]) -> io::Result<ThmBuilder<'_, W>> {
    self.add_thm_core(STMT_THM, name, args)
  }

  /// This function consumes the `Mm0Writer` instance and actually writes the file data to the
  /// given writer, reading back the data just written to the declaration stream.
  pub fn finish(self, w: &mut impl Write) -> io::Result<()> {
    use std::mem::size_of;
    let Mm0Writer {
      sorts,
      mut terms,
      mut thms,
      term_thm_buf,
      mut proof,
      names_buf,
      sort_names,
      term_names,
      thm_names,
    } = self;
    proof.write_u8(0)?;
    let (mut proof, proof_size) = (proof.0.reopen()?, proof.1);
    let num_sorts = sorts.len();
    let num_terms = terms.len();
    let num_thms = thms.len();
    let (pad1, p_terms) = pad_to(size_of::<Header>() + num_sorts * size_of::<SortData>(), 8);
    let p_thms = p_terms + num_terms * size_of::<TermEntry>();
    let p_term_thm_buf = p_thms + num_thms * size_of::<ThmEntry>();
    let p_proof = p_term_thm_buf + term_thm_buf.len();
    let (pad2, p_index) = pad_to(p_proof + proof_size, 8);
    let p_proof: u32 = p_proof.try_into().map_err(|_| overflow("term section overflow"))?;
    #[allow(clippy::cast_possible_truncation)] // impossible because p_proof fits
    let p_term_thm_buf = p_term_thm_buf as u32;

    // adjust offsets
    for t in &mut terms.0 {
      t.p_args.set(t.p_args.get() + p_term_thm_buf)
    }
    for t in &mut thms.0 {
      t.p_args.set(t.p_args.get() + p_term_thm_buf)
    }

    // header
    w.write_all(&MM0K_MAGIC)?; // magic
    #[allow(clippy::cast_possible_truncation)] // checked in add_sort
    w.write_all(&[MM0K_VERSION, num_sorts as u8, 0, 0])?; // two bytes reserved
    w.write_u32::<LE>(num_terms.try_into().map_err(|_| overflow("too many terms"))?)?;
    w.write_u32::<LE>(num_thms.try_into().map_err(|_| overflow("too many thms"))?)?;
    #[allow(clippy::cast_possible_truncation)] // impossible
    w.write_u32::<LE>(p_terms as u32)?;
    #[allow(clippy::cast_possible_truncation)] // p_thms < p_proof
    w.write_u32::<LE>(p_thms as u32)?;
    w.write_u32::<LE>(p_proof)?;
    w.write_u32::<LE>(0)?;
    w.write_u64::<LE>(p_index as u64)?;

    w.write_all(sorts.as_bytes())?; // sort data
    w.write_all(&vec![0; pad1])?; // term header padding
    w.write_all(terms.as_bytes())?; // term header
    w.write_all(thms.as_bytes())?; // theorem header
    w.write_all(&term_thm_buf)?; // term/theorem data
    io::copy(&mut proof, w)?; // declaration stream

    let num_entries = 1;
    let p_names_buf = p_index + 8 + num_entries * size_of::<TableEntry>();
    let p_names = p_names_buf + names_buf.len();
    let p_names_buf = p_names_buf as u64;
    let index = [(INDEX_NAME, p_names)];
    w.write_all(&vec![0; pad2])?; // index padding
    w.write_u64::<LE>(num_entries as u64)?; // index size
    for (ty, p) in index {
      w.write_all(&ty)?; // type
      w.write_u32::<LE>(0)?; // data (padding, unused)
      w.write_u64::<LE>(p as u64)?; // ptr
    }

    w.write_all(&names_buf)?; // name string data
    let p_proof = u64::from(p_proof);
    let mut write = |vec: Vec<(usize, usize)>| -> io::Result<()> {
      let offset = |off, i| match i {
        usize::MAX => 0,
        _ => off + i as u64,
      };
      for (decl, name) in vec {
        w.write_u64::<LE>(offset(p_proof, decl))?;
        w.write_u64::<LE>(offset(p_names_buf, name))?;
      }
      Ok(())
    };
    write(sort_names.0)?; // sort name data
    write(term_names.0)?; // term name data
    write(thm_names.0)?; // thm name data
    Ok(())
  }
}

/// An unfinished axiom or theorem. The `stmt` and `proof` streams should be used to write
/// statement and proof commands, respectively, and when completed the `finish` function will
/// finalize the streams and return the `ThmId` of the new theorem.
#[derive(Debug)]
#[must_use = "discarding a ThmBuilder will result in a corrupted file"]
pub struct ThmBuilder<'a, W> {
  w: &'a mut Mm0Writer<W>,
  cmd: u8,
  buf: Vec<u8>,
  id: ThmId,
}

impl<'a, W: Reopen> ThmBuilder<'a, W> {
  /// A reference to the statement stream for this theorem. Use [`ExprCmd::write_to`] to add
  /// commands to this stream. Do not add an `END` command at the end; [`finish`](Self::finish)
  /// will handle that.
  pub fn stmt(&mut self) -> &mut impl Write { &mut self.w.term_thm_buf }

  /// A reference to the proof stream for this theorem. Use [`ProofCmd::write_to`] to add
  /// commands to this stream. Do not add an `END` command at the end; [`finish`](Self::finish)
  /// will handle that.
  pub fn proof(&mut self) -> &mut impl Write { &mut self.buf }

  /// Finish the statement and proof streams for this theorem, and finalize the theorem addition.
  /// An axiom whose proof stream is empty gets no proof stream at all.
  /// Returns the ID of the newly created theorem.
  pub fn finish(mut self) -> io::Result<ThmId> {
    self.w.term_thm_buf.write_u8(CMD_END)?;
    if self.cmd != STMT_AXIOM || !self.buf.is_empty() {
      self.buf.write_u8(CMD_END)?;
    }
    write_cmd_bytes(&mut self.w.proof, self.cmd, &self.buf)?;
    Ok(self.id)
  }
}
