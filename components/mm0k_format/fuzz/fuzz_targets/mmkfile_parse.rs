#![no_main]
#[macro_use] extern crate libfuzzer_sys;

use mm0k_format::BasicMmkFile;
use mm0k_util::{TermId, ThmId};

fuzz_target!(|data: &[u8]| {
    if let Ok(mmk) = BasicMmkFile::parse(data) {
        for i in 0..mmk.terms.len() {
            let _ = mmk.term(TermId(i as u32));
        }
        for i in 0..mmk.thms.len() {
            if let Some(thm) = mmk.thm(ThmId(i as u32)) {
                for cmd in thm.stmt() { let _ = cmd; }
            }
        }
        for decl in mmk.proof() {
            let Ok((stmt, proof)) = decl else { break };
            let _ = mmk.try_stmt_name(stmt);
            for cmd in proof { let _ = cmd; }
        }
    }
});
