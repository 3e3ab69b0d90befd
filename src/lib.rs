//! A small proof checking kernel. See [`README.md`] for overall documentation.
//!
//! ```text
//! USAGE:
//! mm0k <SUBCOMMAND>
//!
//! SUBCOMMANDS:
//!     verify     Verify a proof file, optionally against a specification
//!     convert    Verify a proof file and write it out in another format
//!     help       Print this message or the help of the given subcommand(s)
//! ```
//!
//! The kernel is split into the declaration store ([`Environment`]), the frame and
//! substitution engine ([`subst`]), the stack machine that replays proofs ([`verify`]),
//! and importers and exporters for the binary ([`mmb`]) and textual ([`text`]) formats.
//!
//! [`README.md`]: https://github.com/digama0/mm0/blob/master/mm0k/README.md

// rust lints we want
#![warn(bare_trait_objects, elided_lifetimes_in_paths,
  missing_copy_implementations, missing_debug_implementations, future_incompatible,
  rust_2018_idioms, trivial_numeric_casts, variant_size_differences, unreachable_pub,
  unused, missing_docs)]
// all the clippy
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
// all the clippy::restriction lints we want
#![warn(clippy::float_arithmetic,
  clippy::get_unwrap, clippy::inline_asm_x86_att_syntax, clippy::integer_division,
  clippy::rc_buffer, clippy::rest_pat_in_fully_bound_structs,
  clippy::string_add, clippy::unwrap_used)]
// all the clippy lints we don't want
#![allow(clippy::cognitive_complexity, clippy::comparison_chain,
  clippy::default_trait_access, clippy::enum_glob_use, clippy::inline_always,
  clippy::manual_map, clippy::map_err_ignore, clippy::missing_const_for_fn,
  clippy::missing_errors_doc, clippy::missing_panics_doc, clippy::module_name_repetitions,
  clippy::multiple_crate_versions, clippy::option_if_let_else, clippy::redundant_pub_crate,
  clippy::semicolon_if_nothing_returned, clippy::shadow_unrelated, clippy::too_many_lines,
  clippy::use_self)]

#[macro_use] extern crate log;

macro_rules! vassert { ($e:expr, $v:expr) => { if !$e { return Err($v) } }}

pub mod artifact;
pub mod batch;
pub mod environment;
pub mod error;
pub mod matcher;
pub mod subst;
pub mod verify;
/// Import and export functionality for the binary proof format.
///
/// See the [`mm0k_format`] crate for a description of the layout.
pub mod mmb { pub mod export; pub mod import; }
/// Import and export functionality for the textual proof format.
///
/// A `.mmt` file is a sequence of s-expressions, one per declaration:
///
/// ```text
/// (sort wff provable)
/// (term imp ((a wff) (b wff)) wff)
/// (axiom ax_mp ((a wff) (b wff)) ((h1 a) (h2 (imp a b))) () b)
/// (theorem id ((a wff)) ((h a)) () a (proof (ref h)))
/// ```
pub mod text { pub mod export; pub mod import; }

pub use artifact::{Artifact, Decl, Proof, Stmt};
pub use environment::{DeclKey, Environment, Expr, Frame, Sort, Term, Thm, ThmKind, Type};
pub use error::{DeclInfo, DeclKind, ErrorKind, KernelError};
pub use mm0k_format::ProofCmd;
pub use mm0k_util::{Modifiers, SortId, TermId, ThmId};
pub use subst::Bound;

/// Decode an artifact, detecting its format from its first bytes. Binary files
/// start with the `MM0K` magic number; anything else is read as text.
pub fn parse_artifact(path: &str, buf: &[u8]) -> Result<Artifact, String> {
  if buf.starts_with(&mm0k_format::cmd::MM0K_MAGIC) {
    mmb::import::parse(buf).map_err(|e| format!("{path}: {}", KernelError::from(e)))
  } else {
    let src = std::str::from_utf8(buf).map_err(|e| format!("{path}: {e}"))?;
    text::import::parse(src).map_err(|e| e.render(path, src))
  }
}
