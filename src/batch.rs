//! Loading an artifact with independent theorems checked in parallel.
//!
//! A run of consecutive theorems that do not refer to one another is checked
//! concurrently on a thread pool, against a shared snapshot of the store. The
//! results are then appended in declaration order, so the store ends up the same
//! as after a sequential load, and the error (if any) is the one a sequential
//! load would report.

use std::collections::HashSet;
use std::io;
use std::sync::Arc;

use futures::executor::{block_on, ThreadPool};
use futures::future::{self, join_all, Either};
use futures::task::SpawnExt;
use mm0k_format::ProofCmd;
use mm0k_util::ThmId;

use crate::artifact::{Artifact, Decl, Proof, Stmt};
use crate::environment::{Environment, Expr, Frame, Thm, ThmKind};
use crate::error::{DeclKind, KernelError};
use crate::subst::Bound;

fn thm_parts(d: &Decl) -> Option<(&Frame, &Expr, &Proof)> {
  if let Stmt::Thm(frame, ret, proof) = &d.stmt { Some((frame, ret, proof)) } else { None }
}

/// Check theorem `d` as if it were declared with identifier `id`, directly
/// after the declarations in `env`.
fn check_thm(env: &Environment, id: ThmId, d: &Decl) -> Result<Thm, KernelError> {
  let (frame, ret, proof) = thm_parts(d).expect("not a theorem");
  let bound = Bound { thm: id, ..env.bound() };
  env.check_decl(DeclKind::Thm, d.name.as_deref(), &bound, frame, ret, Some(proof))
    .map_err(|e| e.or_pos(d.pos))?;
  Ok(Thm {
    name: d.name.clone(),
    frame: frame.clone(),
    ret: ret.clone(),
    kind: ThmKind::Thm(proof.clone()),
    bound,
  })
}

/// A declaration store together with the thread pool used to check it.
#[derive(Debug)]
pub struct Verifier {
  env: Arc<Environment>,
  pool: Option<ThreadPool>,
}

impl Verifier {
  /// Create a verifier with an empty store. `threads = 0` uses the default
  /// pool size, `threads = 1` checks everything on the current thread.
  pub fn new(threads: usize) -> io::Result<Verifier> {
    let pool = match threads {
      0 => Some(ThreadPool::new()?),
      1 => None,
      n => Some(ThreadPool::builder().pool_size(n).name_prefix("mm0k-").create()?),
    };
    Ok(Verifier { env: Arc::default(), pool })
  }

  /// The store as checked so far.
  #[must_use]
  pub fn env(&self) -> &Environment { &self.env }

  /// Take the store out of the verifier.
  #[must_use]
  pub fn into_env(self) -> Environment {
    Arc::try_unwrap(self.env).unwrap_or_else(|env| (*env).clone())
  }

  /// The length of the run of theorems at the start of `decls` that can be
  /// checked together: none refers to another, and their names are distinct.
  fn group_len(&self, decls: &[Decl]) -> usize {
    let start = self.env.bound().thm;
    let mut names = HashSet::new();
    decls.iter().take_while(|d| thm_parts(d).is_some_and(|(_, _, pf)| {
      pf.cmds.iter().all(|c| !matches!(*c, ProofCmd::Thm(t) if t >= start)) &&
        d.name.as_deref().is_none_or(|n| names.insert(n))
    })).count().max(1)
  }

  fn check_group(&mut self, pool: &ThreadPool, group: &[Decl]) -> Result<(), KernelError> {
    let start = self.env.bound().thm.0;
    trace!("checking {} theorems from #{start}", group.len());
    let jobs = group.iter().enumerate().map(|(k, d)| {
      #[allow(clippy::cast_possible_truncation)] // group size is bounded by the artifact
      let id = ThmId(start + k as u32);
      let (env, d2) = (self.env.clone(), d.clone());
      match pool.spawn_with_handle(async move { check_thm(&env, id, &d2) }) {
        Ok(h) => Either::Left(h),
        Err(_) => Either::Right(future::ready(check_thm(&self.env, id, d))),
      }
    }).collect::<Vec<_>>();
    let results = block_on(join_all(jobs));
    let env = Arc::make_mut(&mut self.env);
    for res in results {
      let thm = res?;
      let id = env.bound().thm;
      env.push_thm(id, thm)?;
    }
    Ok(())
  }

  fn load_decls(&mut self, pool: Option<&ThreadPool>, mut decls: &[Decl]) -> Result<(), KernelError> {
    while let Some(d) = decls.first() {
      match pool {
        Some(pool) if thm_parts(d).is_some() => {
          let (group, rest) = decls.split_at(self.group_len(decls));
          self.check_group(pool, group)?;
          decls = rest
        }
        _ => {
          Arc::make_mut(&mut self.env).add_decl(d)?;
          decls = &decls[1..]
        }
      }
    }
    Ok(())
  }

  /// Add all declarations of an artifact in order, stopping at the first failure.
  /// Declarations before the failing one stay in the store.
  pub fn load(&mut self, art: &Artifact) -> Result<(), KernelError> {
    let pool = self.pool.take();
    let res = self.load_decls(pool.as_ref(), &art.decls);
    self.pool = pool;
    res?;
    info!("loaded {} declarations", art.decls.len());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::text::import::parse;

  const SRC: &str = "
    (sort wff provable)
    (term imp ((a wff) (b wff)) wff)
    (axiom ax_mp ((a wff) (b wff)) ((h1 a) (h2 (imp a b))) () b)
    (theorem t1 ((a wff) (b wff)) ((h1 a) (h2 (imp a b))) () b
      (proof (ref a) (ref b) (ref h1) (ref h2) (thm ax_mp)))
    (theorem t2 ((a wff) (b wff)) ((h1 a) (h2 (imp a b))) () b
      (proof (ref a) (ref b) (ref h1) (ref h2) (thm ax_mp)))
    (theorem t3 ((a wff) (b wff)) ((h1 a) (h2 (imp a b))) () b
      (proof (ref a) (ref b) (ref h1) (ref h2) (thm t1)))
  ";

  #[test]
  fn grouping() {
    let art = parse(SRC).unwrap();
    let mut v = Verifier::new(2).unwrap();
    v.load(&Artifact { decls: art.decls[..3].to_vec() }).unwrap();
    // t3 refers to t1, so it starts a new group
    assert_eq!(v.group_len(&art.decls[3..]), 2);
    assert_eq!(v.group_len(&art.decls[5..]), 1);
    assert_eq!(v.group_len(&art.decls[2..]), 1);
  }

  #[test]
  fn parallel_matches_sequential() {
    let art = parse(SRC).unwrap();
    let seq = Environment::load(&art).unwrap();
    for threads in [0, 1, 3] {
      let mut v = Verifier::new(threads).unwrap();
      v.load(&art).unwrap();
      assert_eq!(v.into_env(), seq);
    }
  }
}
