//! Parser for binary proof files.
use crate::{
  cmd, cstr_from_bytes_prefix, exhausted, u32_as_usize, u64_as_usize, Arg, ExprCmd, Header,
  NameEntry, NumdStmtCmd, ProofCmd, SortData, StmtCmd, TableEntry, TermEntry, ThmEntry,
};
use mm0k_util::{SortId, TermId, ThmId};
use std::borrow::Cow;
use std::mem::size_of;
use std::ops::Range;
use zerocopy::{FromBytes, Immutable, KnownLayout, LE, U16, U32, U64};

/// A parsed binary proof file, as a borrowed type. This does only shallow parsing;
/// additional parsing is done on demand via functions on this type.
#[derive(Debug, Default)]
#[non_exhaustive]
pub struct MmkFile<'a, X = Option<SymbolNames<'a>>> {
  /// The file's header.
  pub header: Header,
  /// The full file
  pub buf: &'a [u8],
  /// The sort table
  pub sorts: &'a [SortData],
  /// The term table
  pub terms: &'a [TermEntry],
  /// The theorem table
  pub thms: &'a [ThmEntry],
  /// The index, if provided.
  pub index: X,
}

/// A file parser with a basic index, usable for getting names of declarations.
pub type BasicMmkFile<'a> = MmkFile<'a, Option<SymbolNames<'a>>>;
/// A file parser with no index parser.
pub type BareMmkFile<'a> = MmkFile<'a, ()>;

/// A trait for populating the `index` field of an [`MmkFile`] given a table entry.
pub trait MmkIndexBuilder<'a>: Default {
  /// Implementors are expected to match on the [`TableEntry::id`] field, and use the data if it
  /// matches a particular name.
  fn build<X>(&mut self, f: &mut MmkFile<'a, X>, e: &'a TableEntry) -> Result<(), ParseError>;
}

impl<'a> MmkIndexBuilder<'a> for () {
  #[inline]
  fn build<X>(&mut self, _: &mut MmkFile<'a, X>, _: &'a TableEntry) -> Result<(), ParseError> {
    Ok(())
  }
}

/// This index subcomponent supplies names for sorts, terms, and theorems.
#[derive(Debug)]
pub struct SymbolNames<'a> {
  /// Pointers to the index entries for the sorts
  sorts: &'a [NameEntry],
  /// Pointers to the index entries for the terms
  terms: &'a [NameEntry],
  /// Pointers to the index entries for the theorems
  thms: &'a [NameEntry],
}

impl<'a> MmkIndexBuilder<'a> for Option<SymbolNames<'a>> {
  fn build<X>(&mut self, f: &mut MmkFile<'a, X>, e: &'a TableEntry) -> Result<(), ParseError> {
    if e.id == cmd::INDEX_NAME {
      let rest = f.buf.get(u64_as_usize(e.ptr)..).ok_or_else(|| f.bad_index_parse())?;
      let (sorts, rest) =
        new_slice_prefix(rest, f.sorts.len()).ok_or_else(|| f.bad_index_parse())?;
      let (terms, rest) =
        new_slice_prefix(rest, f.terms.len()).ok_or_else(|| f.bad_index_parse())?;
      let (thms, _) = new_slice_prefix(rest, f.thms.len()).ok_or_else(|| f.bad_index_parse())?;
      if self.replace(SymbolNames { sorts, terms, thms }).is_some() {
        return Err(ParseError::DuplicateIndexTable {
          p_index: u64_as_usize(f.header.p_index),
          id: e.id,
        })
      }
    }
    Ok(())
  }
}

/// A trait for looking up the symbol names in the index data.
pub trait HasSymbolNames<'a> {
  /// Get shared access to the symbol names, if they were parsed.
  fn get_symbol_names(&self) -> Option<&SymbolNames<'a>>;
}

impl<'a> HasSymbolNames<'a> for () {
  #[inline]
  fn get_symbol_names(&self) -> Option<&SymbolNames<'a>> { None }
}

impl<'a> HasSymbolNames<'a> for Option<SymbolNames<'a>> {
  #[inline]
  fn get_symbol_names(&self) -> Option<&SymbolNames<'a>> { self.as_ref() }
}

/// Return the raw command data (a pair `[(u8, u32)]`), or `None` if
/// the command at this position is the `0` end command.
pub fn try_next_cmd(buf: &[u8], start_at: usize) -> Result<Option<(u8, u32, usize)>, ParseError> {
  let (cmd, data, new_start_at) = parse_cmd(buf, start_at)?;
  if cmd == 0 && data == 0 {
    return Ok(None)
  }
  debug_assert!(new_start_at > start_at);
  Ok(Some((cmd, data, new_start_at)))
}

/// From a (full) file and a start position, parse the raw data
/// for a command, which is a `[(u8, u32)]` pair of `(cmd, data)`.
/// Also returns the new start position, which is the old position
/// plus the size of `cmd`, and the size of `data` _which varies_
/// despite ending up as a `u32`.
///
/// For [`ExprCmd`] and [`ProofCmd`], the `(u8, u32)` pair is used to make the corresponding cmd.
///
/// For [`DeclIter`], the `u8` is a [`StmtCmd`], and the `u32` is the length of the
/// declaration record, including the command itself.
pub fn parse_cmd(buf: &[u8], starts_at: usize) -> Result<(u8, u32, usize), ParseError> {
  use super::cmd::{DATA_16, DATA_32, DATA_8, DATA_MASK};
  match buf.get(starts_at..) {
    None | Some([]) => Err(exhausted!()),
    Some([cmd, tl @ ..]) => {
      let val = cmd & !DATA_MASK;
      match cmd & DATA_MASK {
        0 => Ok((val, 0, starts_at + size_of::<u8>())),
        DATA_8 => tl
          .first()
          .map(|&n| (val, n.into(), starts_at + size_of::<u8>() + size_of::<u8>()))
          .ok_or_else(|| exhausted!()),
        DATA_16 => U16::<LE>::ref_from_prefix(tl)
          .map(|(n, _)| (val, n.get().into(), starts_at + size_of::<u8>() + size_of::<u16>()))
          .map_err(|_| exhausted!()),
        DATA_32 => U32::<LE>::ref_from_prefix(tl)
          .map(|(n, _)| (val, n.get(), starts_at + size_of::<u8>() + size_of::<u32>()))
          .map_err(|_| exhausted!()),
        _ => unreachable!(),
      }
    }
  }
}

/// An iterator over a proof command stream. The last command it produces is
/// [`ProofCmd::End`], which must sit on the last byte of the declaration record.
#[must_use]
#[derive(Debug, Clone)]
pub struct ProofIter<'a> {
  /// The full file
  buf: &'a [u8],
  /// The index of the current proof command in the file.
  pub pos: usize,
  /// The position at which the proof stream ends.
  pub ends_at: usize,
}

impl<'a> ProofIter<'a> {
  /// True if this iterator is "null", meaning that it has zero commands.
  /// This is not the same as being empty, which happens when there is one command
  /// which is the terminating `CMD_END` command.
  #[must_use]
  pub fn is_null(&self) -> bool { self.pos == self.ends_at }

  fn fail(&mut self, e: ParseError) -> Option<Result<ProofCmd, ParseError>> {
    self.pos = self.ends_at;
    Some(Err(e))
  }
}

impl<'a> Iterator for ProofIter<'a> {
  type Item = Result<ProofCmd, ParseError>;
  fn next(&mut self) -> Option<Self::Item> {
    if self.is_null() {
      return None
    }
    let start = self.pos;
    match parse_cmd(self.buf, start) {
      Err(e) => self.fail(e),
      // the stream ran into the end of the record without an end command
      Ok((_, _, rest)) if rest > self.ends_at => self.fail(ParseError::MissingEnd(start)),
      // an end command at the wrong position
      Ok((0, 0, rest)) if rest != self.ends_at => self.fail(ParseError::BadProofLen(start)),
      Ok((cmd, data, rest)) => match ProofCmd::try_from((cmd, data)) {
        Err(e) => self.fail(e),
        Ok(ProofCmd::End) => {
          self.pos = rest;
          Some(Ok(ProofCmd::End))
        }
        Ok(_) if rest == self.ends_at => self.fail(ParseError::MissingEnd(start)),
        Ok(proof_cmd) => {
          self.pos = rest;
          Some(Ok(proof_cmd))
        }
      },
    }
  }
}

/// An iterator over a statement stream. It stops (returning `None`)
/// on the `0` end command, without producing it.
#[must_use]
#[derive(Debug, Clone)]
pub struct ExprIter<'a> {
  /// The full file.
  buf: &'a [u8],
  /// The index of the current command in the file.
  pub pos: usize,
  done: bool,
}

impl<'a> ExprIter<'a> {
  #[inline]
  fn new((buf, pos): (&'a [u8], usize)) -> ExprIter<'a> { Self { buf, pos, done: false } }
}

impl<'a> Iterator for ExprIter<'a> {
  type Item = Result<ExprCmd, ParseError>;
  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None
    }
    match try_next_cmd(self.buf, self.pos) {
      Err(e) => {
        self.done = true;
        Some(Err(e))
      }
      Ok(None) => {
        self.done = true;
        None
      }
      Ok(Some((cmd, data, rest))) => match ExprCmd::try_from((cmd, data)) {
        Err(e) => {
          self.done = true;
          Some(Err(e))
        }
        Ok(expr_cmd) => {
          self.pos = rest;
          Some(Ok(expr_cmd))
        }
      },
    }
  }
}

/// A reference to an entry in the term table.
#[derive(Debug, Clone, Copy)]
pub struct TermRef<'a> {
  /// The index into the term table.
  pub tid: TermId,
  /// The sort of the term.
  sort: u8,
  /// The flags byte of the term.
  flags: u8,
  /// The array of arguments, including the `ret` element at the end.
  args_and_ret: &'a [Arg],
}

/// A reference to an entry in the theorem table.
#[derive(Debug, Clone, Copy)]
pub struct ThmRef<'a> {
  /// The index into the theorem table.
  pub tid: ThmId,
  /// The array of arguments.
  args: &'a [Arg],
  /// The pointer to the start of the statement stream.
  stmt: (&'a [u8], usize),
}

/// An error during parsing of a binary proof file.
#[derive(Debug)]
pub enum ParseError {
  /// A declaration record whose length is too small to contain its own header,
  /// or whose end command is not at the end of the record.
  BadProofLen(usize),
  /// A proof stream that reached the end of its record without an end command.
  MissingEnd(usize),
  /// The u8 could not be converted to a [`StmtCmd`] via TryFrom
  StmtCmdConv(u8),
  /// The pair could not be converted to a [`ProofCmd`] via TryFrom
  ProofCmdConv(u8, u32),
  /// The pair could not be converted to an [`ExprCmd`] via TryFrom
  ExprCmdConv(u8, u32),
  /// Something using a proof file unexpectedly exhausted its input source.
  Exhausted(&'static str, u32),
  /// The parser wasn't able to find the magic number in the expected location.
  BadMagic {
    /// The magic value that we actually found
    parsed_magic: [u8; 4],
  },
  /// The header parsed "correctly", but the data in the header indicates that
  /// either the header's numbers are off, or the rest of the file is bad.
  /// For example, a header stating that the term declarations begin at a
  /// position greater than the length of the file.
  SuspectHeader,
  /// Used in cases where the parser fails trying to get the header, because there
  /// were too few bytes in the file to form a full header.
  IncompleteHeader {
    /// The file length
    file_len: usize,
  },
  /// The version is unrecognized.
  BadVersion {
    /// The file version, different from [`MM0K_VERSION`](crate::cmd::MM0K_VERSION)
    parsed_version: u8,
  },
  /// The portion of the file that's supposed to contain sorts was malformed.
  BadSorts(Range<usize>),
  /// The portion of the file that's supposed to contain terms was malformed.
  BadTerms(Range<usize>),
  /// The portion of the file that's supposed to contain thms was malformed.
  BadThms(Range<usize>),
  /// There was an issue parsing the index
  BadIndexParse {
    /// The (ostensible) location of the index in the file
    p_index: usize,
  },
  /// An index table ID was used more than once, for an ID that does not accept duplicates
  DuplicateIndexTable {
    /// The location of the index in the file
    p_index: usize,
    /// The duplicate ID
    id: [u8; 4],
  },
  /// A name in the index is not a nul-terminated UTF-8 string.
  BadName(usize),
  /// An error with the provided message and location.
  StrError(&'static str, usize),
}

/// Something using a proof file unexpectedly exhausted its input source.
#[macro_export]
macro_rules! exhausted {
  () => {
    ParseError::Exhausted(file!(), line!())
  };
}

const HEADER_CAVEAT: &str = "\
    Be advised that the given position(s) may be the result of an \
    untrustworthy header, and should therefore be considered \
    suggestions for where to begin troubleshooting.";

impl std::fmt::Display for ParseError {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    use crate::cmd::{MM0K_MAGIC, MM0K_VERSION};
    match self {
      ParseError::BadProofLen(start) =>
        write!(f, "proof starting at byte {start} has an incorrect length"),
      ParseError::MissingEnd(start) =>
        write!(f, "proof stream is truncated; the command at byte {start} is not followed by an end"),
      ParseError::StmtCmdConv(cmd) =>
        write!(f, "bad StmtCmd conversion (`TryFrom`); cmd was {cmd}"),
      ParseError::ProofCmdConv(cmd, data) =>
        write!(f, "bad ProofCmd conversion (`TryFrom`). data: ({cmd}, {data})"),
      ParseError::ExprCmdConv(cmd, data) =>
        write!(f, "bad ExprCmd conversion (`TryFrom`). data: ({cmd}, {data})"),
      ParseError::Exhausted(file, line) =>
        write!(f, "parser was prematurely exhausted at {file} : {line}"),
      ParseError::BadSorts(range) => write!(
        f,
        "Failed to parse list of sorts. \
        According to the header, `sorts` should inhabit {range:?}. {HEADER_CAVEAT}"
      ),
      ParseError::BadTerms(range) => write!(
        f,
        "Failed to parse list of terms. \
        According to the header, `terms` should inhabit {range:?}. {HEADER_CAVEAT}"
      ),
      ParseError::BadThms(range) => write!(
        f,
        "Failed to parse list of thms. \
        According to the header, `thms` should inhabit {range:?}. {HEADER_CAVEAT}"
      ),
      ParseError::BadMagic { parsed_magic } => write!(
        f,
        "Bad header; unable to find magic number at expected location \
        (magic number is {MM0K_MAGIC:?} ('MM0K' in bytes), found {parsed_magic:?})"
      ),
      ParseError::SuspectHeader => write!(
        f,
        "The file's header parsed correctly, \
        but the parsed header indicates an improperly constructed file."
      ),
      ParseError::IncompleteHeader { file_len } => write!(
        f,
        "Received a file with length {file_len} bytes. \
        This is too short to contain a header, and cannot be well-formed"
      ),
      ParseError::BadVersion { parsed_version } => write!(
        f,
        "version mismatch: File header specifies version {parsed_version}, \
        but verifier version is {MM0K_VERSION}"
      ),
      ParseError::BadIndexParse { p_index } => write!(
        f,
        "index is malformed. According to the header, it begins at byte {p_index}. \
        {HEADER_CAVEAT}",
      ),
      ParseError::DuplicateIndexTable { p_index, id } => {
        write!(f, "index at {p_index} contains a duplicate index entry for key = ")?;
        match std::str::from_utf8(id) {
          Ok(s) => write!(f, "'{s}'")?,
          Err(_) => write!(f, "{id:?}")?,
        }
        write!(f, ". {HEADER_CAVEAT}")
      }
      ParseError::BadName(p) => write!(f, "the name at byte {p} is not valid UTF-8"),
      ParseError::StrError(s, p) => write!(f, "{s} (at byte {p})"),
    }
  }
}

impl std::error::Error for ParseError {}

#[inline]
fn new_slice_prefix<T: FromBytes + KnownLayout + Immutable>(
  bytes: &[u8], n: usize,
) -> Option<(&[T], &[u8])> {
  <[T]>::ref_from_prefix_with_elems(bytes, n).ok()
}

impl<'a, X> MmkFile<'a, X> {
  /// Returns a bad index parse error, for error reporting during index parsing.
  pub fn bad_index_parse(&self) -> ParseError {
    ParseError::BadIndexParse { p_index: u64_as_usize(self.header.p_index) }
  }
}

impl<'a, X: MmkIndexBuilder<'a>> MmkFile<'a, X> {
  /// Parse a [`MmkFile`] from a file, provided as a byte slice.
  /// This does the minimum checking to construct the parsed object,
  /// it is not a verifier.
  pub fn parse(buf: &'a [u8]) -> Result<Self, ParseError> {
    use ParseError::{BadIndexParse, BadSorts, BadTerms, BadThms};
    let (header, _) = Header::ref_from_prefix(buf)
      .map_err(|_| ParseError::IncompleteHeader { file_len: buf.len() })?;
    header.check(buf)?;
    let p_sorts = size_of::<Header>();
    let p_terms = u32_as_usize(header.p_terms.get());
    let p_thms = u32_as_usize(header.p_thms.get());
    let p_proof = u32_as_usize(header.p_proof.get());
    let sorts = buf
      .get(p_sorts..p_sorts + usize::from(header.num_sorts))
      .and_then(|s| <[SortData]>::ref_from_bytes(s).ok())
      .ok_or(BadSorts(p_sorts..p_terms))?;
    let terms = buf
      .get(p_terms..)
      .and_then(|s| new_slice_prefix(s, u32_as_usize(header.num_terms.get())))
      .ok_or(BadTerms(p_terms..p_thms))?
      .0;
    let thms = buf
      .get(p_thms..)
      .and_then(|s| new_slice_prefix(s, u32_as_usize(header.num_thms.get())))
      .ok_or(BadThms(p_thms..p_proof))?
      .0;
    let mut file = MmkFile { header: *header, buf, sorts, terms, thms, index: X::default() };
    let n = u64_as_usize(header.p_index);
    if n != 0 {
      let entries = (|| -> Option<&'a [TableEntry]> {
        let (num_entries, rest) = U64::<LE>::ref_from_prefix(buf.get(n..)?).ok()?;
        Some(new_slice_prefix(rest, num_entries.get().try_into().ok()?)?.0)
      })()
      .ok_or(BadIndexParse { p_index: n })?;
      let mut index = X::default();
      for e in entries {
        index.build(&mut file, e)?
      }
      file.index = index;
    }
    Ok(file)
  }
}

#[inline]
fn term_ref(buf: &[u8], t: TermEntry, tid: TermId) -> Option<TermRef<'_>> {
  let (args_and_ret, _) =
    new_slice_prefix(buf.get(u32_as_usize(t.p_args.get())..)?, usize::from(t.num_args.get()) + 1)?;
  Some(TermRef { tid, sort: t.sort, flags: t.flags, args_and_ret })
}

#[inline]
fn thm_ref(buf: &[u8], t: ThmEntry, tid: ThmId) -> Option<ThmRef<'_>> {
  let (args, stmt) =
    new_slice_prefix(buf.get(u32_as_usize(t.p_args.get())..)?, t.num_args.get().into())?;
  let stmt = (buf, buf.len() - stmt.len());
  Some(ThmRef { tid, args, stmt })
}

impl<'a, X> MmkFile<'a, X> {
  /// Get the sort data for a [`SortId`].
  #[inline]
  #[must_use]
  pub fn sort(&self, n: SortId) -> Option<SortData> { self.sorts.get(usize::from(n.0)).copied() }

  /// Get the term data for a [`TermId`].
  #[inline]
  #[must_use]
  pub fn term(&self, n: TermId) -> Option<TermRef<'a>> {
    term_ref(self.buf, *self.terms.get(u32_as_usize(n.0))?, n)
  }

  /// Get the theorem data for a [`ThmId`].
  #[inline]
  #[must_use]
  pub fn thm(&self, n: ThmId) -> Option<ThmRef<'a>> {
    thm_ref(self.buf, *self.thms.get(u32_as_usize(n.0))?, n)
  }

  /// Get the declaration stream for the file.
  #[inline]
  pub fn proof(&self) -> DeclIter<'a> {
    DeclIter {
      buf: self.buf,
      pos: u32_as_usize(self.header.p_proof.get()),
      done: false,
      next_sort_id: 0_u8,
      next_term_id: 0_u32,
      next_thm_id: 0_u32,
    }
  }
}

/// A handle to a symbol name entry in the index.
#[derive(Debug, Clone, Copy)]
#[non_exhaustive]
pub struct NameEntryRef<'a> {
  /// The full file
  pub buf: &'a [u8],
  /// The proof stream index
  pub p_proof: U64<LE>,
  /// The name pointer, 0 if the entity is anonymous.
  pub p_name: usize,
}

impl<'a> NameEntryRef<'a> {
  /// Extract the name of this index entry as a `&str`, or `None` for an anonymous entity.
  pub fn value(&self) -> Result<Option<&'a str>, ParseError> {
    if self.p_name == 0 {
      return Ok(None)
    }
    let bytes = self.buf.get(self.p_name..).ok_or(ParseError::BadName(self.p_name))?;
    let (cstr, _) = cstr_from_bytes_prefix(bytes).ok_or(ParseError::BadName(self.p_name))?;
    cstr.to_str().map(Some).map_err(|_| ParseError::BadName(self.p_name))
  }

  /// The statement that sourced this entry.
  pub fn decl(&self) -> Result<Option<(StmtCmd, ProofIter<'a>)>, ParseError> {
    try_next_decl(self.buf, u64_as_usize(self.p_proof))
  }
}

#[inline]
fn name_entry_ref(buf: &[u8], NameEntry { p_proof, p_name }: NameEntry) -> NameEntryRef<'_> {
  NameEntryRef { buf, p_proof, p_name: u64_as_usize(p_name) }
}

impl<'a, X: HasSymbolNames<'a>> MmkFile<'a, X> {
  /// Get the index entry for a sort.
  #[must_use]
  pub fn sort_index(&self, n: SortId) -> Option<NameEntryRef<'a>> {
    Some(name_entry_ref(self.buf, *self.index.get_symbol_names()?.sorts.get(usize::from(n.0))?))
  }

  /// Get the index entry for a term.
  #[must_use]
  pub fn term_index(&self, n: TermId) -> Option<NameEntryRef<'a>> {
    Some(name_entry_ref(self.buf, *self.index.get_symbol_names()?.terms.get(u32_as_usize(n.0))?))
  }

  /// Get the index entry for a theorem.
  #[must_use]
  pub fn thm_index(&self, n: ThmId) -> Option<NameEntryRef<'a>> {
    Some(name_entry_ref(self.buf, *self.index.get_symbol_names()?.thms.get(u32_as_usize(n.0))?))
  }

  /// Convenience function for getting an index without having to destructure
  /// the [`NumdStmtCmd`] every time.
  #[must_use]
  pub fn stmt_index(&self, stmt: NumdStmtCmd) -> Option<NameEntryRef<'a>> {
    match stmt {
      NumdStmtCmd::Sort { sort_id } => self.sort_index(sort_id),
      NumdStmtCmd::Axiom { thm_id } | NumdStmtCmd::Thm { thm_id } => self.thm_index(thm_id),
      NumdStmtCmd::Term { term_id } => self.term_index(term_id),
    }
  }

  /// Get the name of a declaration, if present. An index that is present but
  /// holds an invalid name is an error.
  pub fn try_stmt_name(&self, stmt: NumdStmtCmd) -> Result<Option<&'a str>, ParseError> {
    match self.stmt_index(stmt) {
      Some(e) => e.value(),
      None => Ok(None),
    }
  }

  /// Get the name of a declaration, supplying a default name of the form
  /// `s123`, `t123` or `T123` if the index is not present.
  pub fn stmt_name(&self, stmt: NumdStmtCmd) -> Result<Cow<'a, str>, ParseError> {
    Ok(match self.try_stmt_name(stmt)? {
      Some(v) => Cow::Borrowed(v),
      None => Cow::Owned(match stmt {
        NumdStmtCmd::Sort { sort_id } => format!("s{}", sort_id.0),
        NumdStmtCmd::Term { term_id } => format!("t{}", term_id.0),
        NumdStmtCmd::Axiom { thm_id } | NumdStmtCmd::Thm { thm_id } => format!("T{}", thm_id.0),
      }),
    })
  }
}

impl<'a> TermRef<'a> {
  /// The return sort of this term.
  #[inline]
  #[must_use]
  pub fn sort(&self) -> SortId { SortId(self.sort) }

  /// The flags byte of this term (currently always zero in a valid file).
  #[inline]
  #[must_use]
  pub fn flags(&self) -> u8 { self.flags }

  /// The list of arguments of this term, not including the return.
  #[inline]
  #[must_use]
  pub fn args(&self) -> &'a [Arg] { &self.args_and_ret[..self.args_and_ret.len() - 1] }

  /// The return sort and dependencies.
  #[inline]
  #[must_use]
  pub fn ret(&self) -> Arg { self.args_and_ret[self.args_and_ret.len() - 1] }
}

impl<'a> ThmRef<'a> {
  /// The list of arguments of this axiom/theorem.
  #[inline]
  #[must_use]
  pub fn args(&self) -> &'a [Arg] { self.args }

  /// The beginning of the statement stream.
  #[inline]
  pub fn stmt(&self) -> ExprIter<'a> { ExprIter::new(self.stmt) }
}

/// Try to parse the next declaration in the file; in this case, a
/// declaration is represented by a pair `[(StmtCmd, ProofIter)]`.
fn try_next_decl(buf: &[u8], pos: usize) -> Result<Option<(StmtCmd, ProofIter<'_>)>, ParseError> {
  // The `data` u32 you get back from try_next_cmd is (in this context)
  // the length of the declaration record. `proof_starts_at` is just
  // the position after the (u8, u32) pair in the stream.
  let Some((stmt_cmd, proof_len, proof_starts_at)) = try_next_cmd(buf, pos)? else {
    return Ok(None)
  };

  let proof_ends_at = pos + u32_as_usize(proof_len);

  if proof_ends_at < proof_starts_at || proof_ends_at > buf.len() {
    return Err(ParseError::BadProofLen(pos))
  }

  let pr = ProofIter { buf, pos: proof_starts_at, ends_at: proof_ends_at };

  Ok(Some((StmtCmd::try_from(stmt_cmd)?, pr)))
}

/// An iterator over the declaration stream.
#[must_use]
#[derive(Debug, Clone)]
pub struct DeclIter<'a> {
  /// The full source file.
  buf: &'a [u8],
  /// The index of the current declaration in the file.
  pub pos: usize,
  done: bool,
  next_sort_id: u8,
  next_term_id: u32,
  next_thm_id: u32,
}

impl<'a> DeclIter<'a> {
  fn number(&mut self, stmt: StmtCmd) -> Result<NumdStmtCmd, ParseError> {
    let overflow = || ParseError::StrError("too many declarations", self.pos);
    Ok(match stmt {
      StmtCmd::Sort => {
        let out = NumdStmtCmd::Sort { sort_id: SortId(self.next_sort_id) };
        self.next_sort_id = self.next_sort_id.checked_add(1).ok_or_else(overflow)?;
        out
      }
      StmtCmd::Term => {
        let out = NumdStmtCmd::Term { term_id: TermId(self.next_term_id) };
        self.next_term_id = self.next_term_id.checked_add(1).ok_or_else(overflow)?;
        out
      }
      StmtCmd::Axiom | StmtCmd::Thm => {
        let thm_id = ThmId(self.next_thm_id);
        self.next_thm_id = self.next_thm_id.checked_add(1).ok_or_else(overflow)?;
        if stmt == StmtCmd::Axiom {
          NumdStmtCmd::Axiom { thm_id }
        } else {
          NumdStmtCmd::Thm { thm_id }
        }
      }
    })
  }
}

impl<'a> Iterator for DeclIter<'a> {
  type Item = Result<(NumdStmtCmd, ProofIter<'a>), ParseError>;
  fn next(&mut self) -> Option<Self::Item> {
    if self.done {
      return None
    }
    let res = match try_next_decl(self.buf, self.pos) {
      Err(e) => Err(e),
      Ok(None) => {
        self.done = true;
        return None
      }
      Ok(Some((stmt, proof_iter))) => self.number(stmt).map(|cmd| {
        self.pos = proof_iter.ends_at;
        (cmd, proof_iter)
      }),
    };
    if res.is_err() {
      self.done = true
    }
    Some(res)
  }
}
