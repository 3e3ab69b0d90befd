use mm0k_format::{
  cmd, Arg, BareMmkFile, BasicMmkFile, ExprCmd, Mm0Writer, NumdStmtCmd, ParseError, ProofCmd,
  SortData,
};
use mm0k_util::{Modifiers, SortId, TermId, ThmId};

fn header(num_sorts: u8, p_proof: u8) -> Vec<u8> {
  let mut v = b"MM0K".to_vec();
  v.extend_from_slice(&[cmd::MM0K_VERSION, num_sorts, 0, 0]);
  v.extend_from_slice(&[0; 8]); // num_terms, num_thms
  for _ in 0..3 {
    v.extend_from_slice(&[p_proof, 0, 0, 0]); // p_terms, p_thms, p_proof
  }
  v.extend_from_slice(&[0; 12]); // reserved2, p_index
  assert_eq!(v.len(), 40);
  v
}

#[test]
fn try_next_decl_infinite_loop() {
  let mut filedata = header(0, 40);
  filedata.extend_from_slice(&[6, 0, 0, 0, 0]);
  let mut iter = BareMmkFile::parse(&filedata).unwrap().proof();
  assert!(matches!(iter.next().unwrap().unwrap_err(), ParseError::BadProofLen(40)));
  assert!(iter.next().is_none());
}

#[test]
fn bad_magic_and_short_header() {
  let mut filedata = header(0, 40);
  filedata.push(0);
  filedata[3] = b'B';
  assert!(matches!(
    BareMmkFile::parse(&filedata).unwrap_err(),
    ParseError::BadMagic { parsed_magic: [b'M', b'M', b'0', b'B'] }
  ));
  assert!(matches!(
    BareMmkFile::parse(&filedata[..20]).unwrap_err(),
    ParseError::IncompleteHeader { file_len: 20 }
  ));
}

#[test]
fn header_out_of_bounds() {
  // the declaration stream starts past the end of the file
  let filedata = header(0, 60);
  assert!(matches!(BareMmkFile::parse(&filedata).unwrap_err(), ParseError::SuspectHeader));
}

#[test]
fn proof_without_end() {
  let mut filedata = header(0, 40);
  // theorem record of length 4: `Ref 0` and no end command
  filedata.extend_from_slice(&[cmd::STMT_THM | cmd::DATA_8, 4, cmd::PROOF_REF | cmd::DATA_8, 0]);
  filedata.push(0);
  let file = BareMmkFile::parse(&filedata).unwrap();
  let mut decls = file.proof();
  let (stmt, mut proof) = decls.next().unwrap().unwrap();
  assert_eq!(stmt, NumdStmtCmd::Thm { thm_id: ThmId(0) });
  assert!(matches!(proof.next(), Some(Err(ParseError::MissingEnd(42)))));
  assert!(proof.next().is_none());
  assert!(decls.next().is_none());
}

#[test]
fn end_in_the_middle() {
  let mut filedata = header(0, 40);
  filedata.extend_from_slice(&[cmd::STMT_THM | cmd::DATA_8, 5, 0, cmd::PROOF_SORRY, 0]);
  filedata.push(0);
  let file = BareMmkFile::parse(&filedata).unwrap();
  let (_, mut proof) = file.proof().next().unwrap().unwrap();
  assert!(matches!(proof.next(), Some(Err(ParseError::BadProofLen(42)))));
}

fn sample() -> Vec<u8> {
  let mut w = Mm0Writer::new(vec![]);
  let wff = w.add_sort(Some("wff"), SortData::from(Modifiers::PROVABLE)).unwrap();
  let wff_arg = Arg::reg(wff, 0);
  let imp = w.add_term(Some("imp"), &[wff_arg, wff_arg], wff_arg).unwrap();
  let mut ax = w.add_axiom(Some("ax_mp"), &[wff_arg, wff_arg]).unwrap();
  ExprCmd::Ref(0).write_to(ax.stmt()).unwrap();
  ExprCmd::Hyp.write_to(ax.stmt()).unwrap();
  ExprCmd::Ref(0).write_to(ax.stmt()).unwrap();
  ExprCmd::Ref(1).write_to(ax.stmt()).unwrap();
  ExprCmd::Term(imp).write_to(ax.stmt()).unwrap();
  ExprCmd::Hyp.write_to(ax.stmt()).unwrap();
  ExprCmd::Ref(1).write_to(ax.stmt()).unwrap();
  let mp = ax.finish().unwrap();
  let mut th = w.add_thm(None, &[wff_arg]).unwrap();
  ExprCmd::Ref(0).write_to(th.stmt()).unwrap();
  ExprCmd::Hyp.write_to(th.stmt()).unwrap();
  ExprCmd::Ref(0).write_to(th.stmt()).unwrap();
  for c in [ProofCmd::Ref(1), ProofCmd::Save] {
    c.write_to(th.proof()).unwrap();
  }
  assert_eq!(th.finish().unwrap(), ThmId(1));
  assert_eq!(mp, ThmId(0));
  let mut out = vec![];
  w.finish(&mut out).unwrap();
  out
}

#[test]
fn written_file_parses() {
  let buf = sample();
  let file = BasicMmkFile::parse(&buf).unwrap();
  assert_eq!(file.sorts, &[SortData(Modifiers::PROVABLE.bits())]);
  let imp = file.term(TermId(0)).unwrap();
  assert_eq!(imp.sort(), SortId(0));
  assert_eq!(imp.args().len(), 2);
  assert!(!imp.ret().bound());

  let mp = file.thm(ThmId(0)).unwrap();
  assert_eq!(mp.args().len(), 2);
  let stmt = mp.stmt().collect::<Result<Vec<_>, _>>().unwrap();
  assert_eq!(stmt, [
    ExprCmd::Ref(0),
    ExprCmd::Hyp,
    ExprCmd::Ref(0),
    ExprCmd::Ref(1),
    ExprCmd::Term(TermId(0)),
    ExprCmd::Hyp,
    ExprCmd::Ref(1),
  ]);

  let decls = file.proof().collect::<Result<Vec<_>, _>>().unwrap();
  let stmts = decls.iter().map(|d| d.0).collect::<Vec<_>>();
  assert_eq!(stmts, [
    NumdStmtCmd::Sort { sort_id: SortId(0) },
    NumdStmtCmd::Term { term_id: TermId(0) },
    NumdStmtCmd::Axiom { thm_id: ThmId(0) },
    NumdStmtCmd::Thm { thm_id: ThmId(1) },
  ]);
  // only the theorem carries a proof
  assert!(decls[..3].iter().all(|d| d.1.is_null()));
  let proof = decls[3].1.clone().collect::<Result<Vec<_>, _>>().unwrap();
  assert_eq!(proof, [ProofCmd::Ref(1), ProofCmd::Save, ProofCmd::End]);

  assert_eq!(file.stmt_name(stmts[0]).unwrap(), "wff");
  assert_eq!(file.stmt_name(stmts[1]).unwrap(), "imp");
  assert_eq!(file.stmt_name(stmts[2]).unwrap(), "ax_mp");
  assert_eq!(file.try_stmt_name(stmts[3]).unwrap(), None);
  assert_eq!(file.stmt_name(stmts[3]).unwrap(), "T1");
}

#[test]
fn bare_file_has_no_names() {
  let buf = sample();
  let file = BareMmkFile::parse(&buf).unwrap();
  assert_eq!(file.stmt_name(NumdStmtCmd::Term { term_id: TermId(0) }).unwrap(), "t0");
}

#[test]
fn name_entry_points_at_decl() {
  let buf = sample();
  let file = BasicMmkFile::parse(&buf).unwrap();
  let entry = file.term_index(TermId(0)).unwrap();
  let (stmt, proof) = entry.decl().unwrap().unwrap();
  assert_eq!(stmt, mm0k_format::StmtCmd::Term);
  assert!(proof.is_null());
}
