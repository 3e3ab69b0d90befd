use mm0k::batch::Verifier;
use mm0k::environment::MAX_EXPR_DEPTH;
use mm0k::error::{Disjointness, Mismatch, Redeclaration};
use mm0k::matcher::{match_spec, SpecError};
use mm0k::text::import::parse;
use mm0k::verify::Mode;
use mm0k::{
  mmb, parse_artifact, text, Artifact, Decl, DeclKey, DeclKind, Environment, ErrorKind, Expr,
  Frame, KernelError, Modifiers, Proof, ProofCmd, SortId, Stmt, TermId, ThmId, ThmKind, Type,
};
use mm0k_format::{cmd, Arg, BasicMmkFile, ExprCmd, Mm0Writer, NumdStmtCmd, ParseError, SortData};

const BASE: &str = "
  -- propositional fragment
  (sort wff provable)
  (sort set pure)
  (sort nat)
  (term imp ((a wff) (b wff)) wff)
  (term tru () wff)
  (axiom ax-mp ((h1 wff) (h2 wff)) () () (imp h1 h2) (proof (ref 0) (ref 1) (term imp)))
  (axiom mp ((a wff) (b wff)) ((min a) (maj (imp a b))) () b)
  (axiom ax-1 ((a wff) (b wff)) () () (imp a (imp b a)))
  (axiom ax-dv ({x set} {y set}) () ((x y)) tru)
  (theorem a1i ((a wff) (b wff)) ((h a)) () (imp b a)
    (proof (ref a) (ref b) (ref a) (term imp) (ref h) (ref a) (ref b) (thm ax-1) (thm mp)))
  (theorem dv-ok () () () tru (proof (dummy set) (dummy set) (thm ax-dv)))
";

fn art(src: &str) -> Artifact { parse(&format!("{BASE}{src}")).unwrap() }
fn load(src: &str) -> Environment { Environment::load(&art(src)).unwrap() }
fn fails(src: &str) -> KernelError { Environment::load(&art(src)).unwrap_err() }

fn thm_id(env: &Environment, name: &str) -> ThmId {
  let Some(DeclKey::Thm(t)) = env.get(name) else { panic!("{name} is not a theorem") };
  t
}

fn binary(env: &Environment) -> Vec<u8> {
  let mut buf = vec![];
  mmb::export::export(env, &mut buf).unwrap();
  buf
}

#[test]
fn statement_script_builds_conclusion() {
  let env = load("");
  let td = &env.thms[thm_id(&env, "ax-mp")];
  let (pf, mode) = td.script().unwrap();
  assert_eq!(mode, Mode::Statement);
  assert_eq!(&*pf.cmds, &[ProofCmd::Ref(0), ProofCmd::Ref(1), ProofCmd::Term(TermId(0)), ProofCmd::End]);
  let e = env.run_proof(&td.bound, &td.frame, &td.ret, mode, &pf.cmds).unwrap();
  assert_eq!(e, Expr::app(TermId(0), [Expr::Var(0), Expr::Var(1)]));
}

#[test]
fn dummy_for_both_disjoint_binders() {
  let e = fails("(theorem dv-bad () () () tru (proof (dummy set) (ref 0) (thm ax-dv)))");
  assert!(matches!(e.kind,
    ErrorKind::DisjointnessViolation(Disjointness::Capture { pair: (0, 1), var: 0 })));
  assert_eq!(e.cmd, Some(2));
  let decl = e.decl.unwrap();
  assert_eq!((decl.kind, decl.id, decl.name.as_deref()), (DeclKind::Thm, 6, Some("dv-bad")));
  // the same holds for a bound variable of the frame
  let e = fails("(theorem dv-bad ({z set}) () () tru (proof (ref z) (ref z) (thm ax-dv)))");
  assert!(matches!(e.kind, ErrorKind::DisjointnessViolation(Disjointness::Capture { .. })));
}

#[test]
fn reference_to_own_or_later_theorem() {
  for t in [6, 7] {
    let mut a = art("(theorem self-ref () () () tru (proof (thm dv-ok)))");
    let Some(Decl { stmt: Stmt::Thm(_, _, pf), .. }) = a.decls.last_mut() else { unreachable!() };
    *pf = Proof::new([ProofCmd::Thm(ThmId(t)), ProofCmd::End]);
    let e = Environment::load(&a).unwrap_err();
    assert!(matches!(e.kind, ErrorKind::UnknownTheorem(ThmId(n)) if n == t));
    assert_eq!(e.cmd, Some(0));
  }
}

#[test]
fn truncated_binary_proof() {
  let env = load("");
  let mut buf = binary(&env);
  let end = {
    let file = BasicMmkFile::parse(&buf).unwrap();
    let (_, pf) = file.proof().map(Result::unwrap)
      .filter(|(s, _)| matches!(s, NumdStmtCmd::Thm { .. }))
      .last().unwrap();
    pf.ends_at
  };
  assert_eq!(buf[end - 1], cmd::CMD_END);
  // replace the end command by another command, so the record runs out
  buf[end - 1] = cmd::PROOF_SAVE;
  let e = KernelError::from(mmb::import::parse(&buf).unwrap_err());
  assert!(matches!(e.kind, ErrorKind::MalformedBinary(ParseError::MissingEnd(p)) if p == end - 1));
}

#[test]
fn error_kinds() {
  let e = fails("(theorem stmt-only () () () tru)");
  assert!(matches!(e.kind, ErrorKind::MalformedProof(_)));
  let e = fails("(term tru () wff)");
  assert!(matches!(e.kind, ErrorKind::Redeclaration(Redeclaration::Name(ref n)) if &**n == "tru"));
  assert_eq!(e.decl.unwrap().kind, DeclKind::Term);
  let e = fails("(theorem t1 () () () tru (proof (ref 7)))");
  assert!(matches!(e.kind, ErrorKind::HeapIndex(7)));
  let e = fails("(theorem t2 ((a wff)) () () (imp a a) (proof (ref a) (term imp)))");
  assert!(matches!(e.kind, ErrorKind::StackUnderflow));
  let e = fails("(term bad ({x wff}) wff)");
  assert!(matches!(e.kind, ErrorKind::SortAttribute(SortId(0), _)));
  let e = fails("(theorem t3 ({x set}) () () tru (proof (ref x) (ref x) (term imp)))");
  assert!(matches!(e.kind, ErrorKind::ArityOrSortMismatch(
    Mismatch::Sort { slot: 0, expected: SortId(0), found: SortId(1) })));
  let e = fails("(theorem t4 ((a wff) (b wff)) ((h a)) () b
    (proof (ref a) (ref b) (ref h) (ref h) (thm mp)))");
  assert!(matches!(e.kind, ErrorKind::HypothesisMismatch(1)));
  let e = fails("(theorem t5 ((a wff)) ((h a)) () (imp a a) (proof (ref h)))");
  assert!(matches!(e.kind, ErrorKind::ConclusionMismatch));
  let e = fails("(theorem t6 ((a wff)) () () a (proof sorry))");
  assert!(matches!(e.kind, ErrorKind::IncompleteProof));
  let e = fails("(axiom t7 ((a wff) (b wff)) () ((a b)) a)");
  assert!(matches!(e.kind, ErrorKind::BadFrame(_)));

  let binders = (0..56).map(|i| format!("{{x{i} set}}")).collect::<Vec<_>>().join(" ");
  let e = fails(&format!("(term big ({binders}) wff)"));
  assert!(matches!(e.kind, ErrorKind::MaxBoundVars));

  let sorts = (0..126).map(|i| format!("(sort s{i})\n")).collect::<String>();
  let e = fails(&sorts);
  assert!(matches!(e.kind, ErrorKind::Overflow));
  assert_eq!(e.decl.unwrap().name.as_deref(), Some("s125"));
}

#[test]
fn error_kinds_without_text_syntax() {
  let tru = Expr::app(TermId(1), []);
  let with = |stmt| {
    let mut a = art("");
    a.decls.push(Decl { name: Some("late".into()), pos: 0, stmt });
    Environment::load(&a).unwrap_err().kind
  };
  assert!(matches!(with(Stmt::Term([].into(), (SortId(3), 0))),
    ErrorKind::Redeclaration(Redeclaration::ForwardSort(SortId(3)))));
  assert!(matches!(with(Stmt::Axiom(Frame::default(), Expr::app(TermId(2), []), None)),
    ErrorKind::Redeclaration(Redeclaration::ForwardTerm(TermId(2)))));
  assert!(matches!(
    with(Stmt::Thm(Frame::default(), tru, Proof::new([ProofCmd::Term(TermId(2)), ProofCmd::End]))),
    ErrorKind::UnknownTerm(TermId(2))));
  assert!(matches!(with(Stmt::Term([Type::Reg(SortId(0), 1)].into(), (SortId(0), 0))),
    ErrorKind::DepsOutOfBounds));
}

#[test]
fn deterministic() {
  assert_eq!(load(""), load(""));
  let bad = "(theorem t5 ((a wff)) ((h a)) () (imp a a) (proof (ref h)))";
  assert_eq!(fails(bad).to_string(), fails(bad).to_string());
}

#[test]
fn failures_keep_accepted_declarations() {
  let mut env = load("");
  let before = env.clone();
  let mut more = art("
    (theorem a1i-2 ((a wff) (b wff)) ((h a)) () (imp b a)
      (proof (ref a) (ref b) (ref h) (thm a1i)))
    (theorem bad ((a wff)) ((h a)) () (imp a a) (proof (ref h)))
    (theorem after () () () tru (proof (thm dv-ok)))
  ");
  more.decls.drain(..before.stmts.len());
  let e = env.load_into(&more).unwrap_err();
  assert_eq!(e.decl.unwrap().name.as_deref(), Some("bad"));
  assert_eq!(&env.stmts[..before.stmts.len()], &*before.stmts);
  for (id, thm) in before.thms.enum_iter() { assert_eq!(&env.thms[id], thm) }
  assert_eq!(env.sorts, before.sorts);
  assert_eq!(env.terms, before.terms);
  assert!(env.get("a1i-2").is_some());
  assert!(env.get("bad").is_none() && env.get("after").is_none());
}

#[test]
fn no_forward_references() {
  let env = load("");
  for (id, thm) in env.thms.enum_iter() {
    assert!(thm.bound.thm == id);
    let Some((pf, _)) = thm.script() else { continue };
    for &c in &*pf.cmds {
      match c {
        ProofCmd::Thm(t) => assert!(t < id),
        ProofCmd::Term(t) => assert!(t < thm.bound.term),
        ProofCmd::Dummy(s) => assert!(s < thm.bound.sort),
        _ => {}
      }
    }
  }
}

#[test]
fn reverification() {
  let env = load("");
  for (id, _) in env.thms.enum_iter() { env.reverify(id).unwrap() }
  assert!(matches!(env.reverify(ThmId(99)).unwrap_err().kind, ErrorKind::UnknownTheorem(_)));
}

#[test]
fn binary_round_trip() {
  let env = load("");
  let a = mmb::import::parse(&binary(&env)).unwrap();
  assert_eq!(a.decls.len(), env.stmts.len());
  assert!(a.decls.iter().all(|d| d.pos > 0));
  let Stmt::Thm(_, _, pf) = &a.decls[9].stmt else { panic!("expected a theorem") };
  assert_eq!(pf.pos.as_ref().map(|p| p.len()), Some(pf.cmds.len()));
  assert_eq!(Environment::load(&a).unwrap(), env);
}

#[test]
fn text_round_trip() {
  let env = load("");
  let mut out = vec![];
  text::export::export(&env, &mut out).unwrap();
  let src = String::from_utf8(out).unwrap();
  assert!(src.contains("(axiom ax-dv ({v0 set} {v1 set}) () ((v0 v1)) (tru))"), "{src}");
  assert_eq!(Environment::load(&parse(&src).unwrap()).unwrap(), env);
}

#[test]
fn text_export_renames_unprintable_declarations() {
  let mut env = Environment::new();
  let wff = env.add_sort(None, Modifiers::PROVABLE).unwrap();
  env.add_sort(Some("s0"), Modifiers::NONE).unwrap();
  env.add_sort(Some("has space"), Modifiers::PURE).unwrap();
  let t = env.add_term(Some("T0"), [].into(), (wff, 0)).unwrap();
  env.add_axiom(None, Frame::default(), Expr::app(t, []), None).unwrap();
  env.add_axiom(Some("--x"), Frame::default(), Expr::app(t, []), None).unwrap();
  let mut out = vec![];
  text::export::export(&env, &mut out).unwrap();
  let src = String::from_utf8(out).unwrap();
  assert!(src.contains("(sort s0_ provable)"), "{src}");
  let back = Environment::load(&parse(&src).unwrap()).unwrap();
  assert_eq!(back.get("s0_"), Some(DeclKey::Sort(SortId(0))));
  assert_eq!(back.get("s0"), Some(DeclKey::Sort(SortId(1))));
  assert_eq!(back.get("s2"), Some(DeclKey::Sort(SortId(2))));
  assert_eq!(back.get("T0"), Some(DeclKey::Term(TermId(0))));
  assert_eq!(back.get("T0_"), Some(DeclKey::Thm(ThmId(0))));
  assert_eq!(back.get("T1"), Some(DeclKey::Thm(ThmId(1))));
  assert_eq!(back.stmts, env.stmts);
  for (id, td) in env.thms.enum_iter() {
    assert_eq!((&back.thms[id].frame, &back.thms[id].ret), (&td.frame, &td.ret));
  }
  // once every name is printable the output is stable
  let mut again = vec![];
  text::export::export(&back, &mut again).unwrap();
  assert_eq!(String::from_utf8(again).unwrap(), src);
}

#[test]
fn binary_errors_have_positions() {
  let mut env = load("");
  let a1i = thm_id(&env, "a1i");
  env.thms[a1i].kind = ThmKind::Thm(Proof::new([ProofCmd::Ref(2), ProofCmd::End]));
  let a = mmb::import::parse(&binary(&env)).unwrap();
  let e = Environment::load(&a).unwrap_err();
  assert!(matches!(e.kind, ErrorKind::ConclusionMismatch));
  assert_eq!(e.cmd, Some(1));
  let Stmt::Thm(_, _, pf) = &a.decls[9].stmt else { panic!("expected a theorem") };
  assert_eq!(e.pos, pf.pos_of(1));
  assert!(e.pos.is_some());
}

const MORE: &str = "
  (theorem p1 ((a wff) (b wff)) ((h a)) () (imp b a)
    (proof (ref a) (ref b) (ref h) (thm a1i)))
  (theorem p2 ((a wff)) ((h a)) () (imp a a)
    (proof (ref a) (ref a) (ref h) (thm a1i)))
  (theorem p3 () () () tru (proof (thm dv-ok)))
  (theorem p4 ((a wff)) ((h a)) () (imp a (imp a a))
    (proof (ref a) (ref a) (term imp) (ref a) (ref a) (ref h) (thm p2) (thm p1)))
  (theorem p5 () () () tru (proof (dummy set) (dummy set) (thm ax-dv)))
";

#[test]
fn parallel_load_matches_sequential() {
  let a = art(MORE);
  let seq = Environment::load(&a).unwrap();
  for jobs in [0, 1, 2, 4] {
    let mut v = Verifier::new(jobs).unwrap();
    v.load(&a).unwrap();
    assert_eq!(v.into_env(), seq);
  }
}

#[test]
fn parallel_failure_matches_sequential() {
  let a = art("
    (theorem q1 ((a wff)) ((h a)) () (imp a a) (proof (ref a) (ref a) (ref h) (thm a1i)))
    (theorem q2 ((a wff)) ((h a)) () (imp a a) (proof (ref h)))
    (theorem q3 () () () tru (proof (thm dv-ok)))
  ");
  let mut seq = Environment::new();
  let e1 = seq.load_into(&a).unwrap_err();
  let mut v = Verifier::new(4).unwrap();
  let e2 = v.load(&a).unwrap_err();
  assert_eq!(e1.to_string(), e2.to_string());
  assert_eq!(v.env(), &seq);
  assert!(seq.get("q1").is_some() && seq.get("q3").is_none());
}

const SPEC: &str = "
  (sort wff provable)
  (sort set pure)
  (sort nat)
  (term imp ((p wff) (q wff)) wff)
  (term tru () wff)
  (axiom ax-mp ((p wff) (q wff)) () () (imp p q))
  (axiom mp ((p wff) (q wff)) ((h1 p) (h2 (imp p q))) () q)
  (axiom ax-1 ((p wff) (q wff)) () () (imp p (imp q p)))
  (axiom ax-dv ({x set} {y set}) () ((x y)) tru)
  (theorem a1i ((a wff) (b wff)) ((h a)) () (imp b a))
";

#[test]
fn binary_proof_against_text_spec() {
  let buf = binary(&load(MORE));
  let proof = parse_artifact("proof.mmk", &buf).unwrap();
  let env = Environment::load(&proof).unwrap();
  let spec = parse_artifact("spec.mmt", SPEC.as_bytes()).unwrap();
  match_spec(&env, &spec).unwrap();

  let spec = parse_artifact("spec.mmt", SPEC.replace("(sort nat)", "").as_bytes()).unwrap();
  assert_eq!(match_spec(&env, &spec).unwrap_err(), [SpecError::Extra(DeclKind::Sort, Some("nat".into()))]);
}

#[test]
fn artifact_detection() {
  let e = parse_artifact("bad.mmt", b"(sort wff").unwrap_err();
  assert!(e.contains("bad.mmt"), "{e}");
  let e = parse_artifact("bad.mmk", b"MM0K\x01").unwrap_err();
  assert!(e.starts_with("bad.mmk: malformed binary"), "{e}");
  assert!(parse_artifact("empty.mmt", b"").unwrap().decls.is_empty());
  let e = parse_artifact("accent.mmt", "é".as_bytes()).unwrap_err();
  assert!(e.contains("accent.mmt") && e.contains("expecting '('"), "{e}");
}

#[test]
fn frame_literal_matches_parser() {
  let a = art("");
  let Stmt::Axiom(frame, _, None) = &a.decls[8].stmt else { panic!("expected ax-dv") };
  assert_eq!(*frame, Frame::new(vec![Type::Bound(SortId(1)); 2], vec![], [(0, 1)]));
}

#[test]
fn deep_expressions_are_rejected() {
  const N: usize = 50_000;
  let text = format!("(sort wff provable) (term neg ((a wff)) wff)
    (axiom deep ((a wff)) () () {}a{})", "(neg ".repeat(N), ")".repeat(N));
  let e = parse_artifact("deep.mmt", text.as_bytes()).unwrap_err();
  assert!(e.contains("nested more than"), "{e}");

  // a statement script can only build the expression one level at a time
  let mut a = art("(term neg ((a wff)) wff) (axiom deep ((a wff)) () () (neg a) (proof (ref a) (term neg)))");
  let Some(Decl { stmt: Stmt::Axiom(_, _, Some(pf)), .. }) = a.decls.last_mut() else { unreachable!() };
  let neg = ProofCmd::Term(TermId(2));
  *pf = Proof::new([ProofCmd::Ref(0)].into_iter()
    .chain(std::iter::repeat_n(neg, N)).chain([ProofCmd::End]));
  let e = Environment::load(&a).unwrap_err();
  assert!(matches!(e.kind, ErrorKind::ExprTooDeep));
  assert_eq!(e.cmd, Some(MAX_EXPR_DEPTH + 1));

  let mut mw = Mm0Writer::new(vec![]);
  let wff = mw.add_sort(Some("wff"), SortData(Modifiers::PROVABLE.bits())).unwrap();
  let neg = mw.add_term(Some("neg"), &[Arg::reg(wff, 0)], Arg::reg(wff, 0)).unwrap();
  let mut b = mw.add_axiom(Some("deep"), &[Arg::reg(wff, 0)]).unwrap();
  ExprCmd::Ref(0).write_to(b.stmt()).unwrap();
  for _ in 0..N { ExprCmd::Term(neg).write_to(b.stmt()).unwrap() }
  b.finish().unwrap();
  let mut buf = vec![];
  mw.finish(&mut buf).unwrap();
  assert!(matches!(mmb::import::parse(&buf), Err(ParseError::StrError("statement nested too deeply", _))));
}
