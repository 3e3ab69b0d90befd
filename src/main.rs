use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::{Parser, Subcommand};
use memmap::Mmap;
use simplelog::{ColorChoice, Config, LevelFilter, TermLogger, TerminalMode, WriteLogger};

use mm0k::batch::Verifier;
use mm0k::{matcher, mmb, parse_artifact, text, Artifact, Environment};

#[derive(Debug, Parser)]
#[command(name = "mm0k", version, about = "A small proof checking kernel")]
struct Cli {
  #[command(subcommand)]
  cmd: Command,
  /// Increase logging verbosity (-v for info, -vv for debug)
  #[arg(short, long, action = clap::ArgAction::Count, global = true)]
  verbose: u8,
  /// Write the log to FILE instead of stderr
  #[arg(long, value_name = "FILE", global = true)]
  log: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Command {
  /// Verify a proof file, optionally against a specification
  Verify {
    /// The proof file (binary or .mmt)
    proof: PathBuf,
    /// The specification the proof file must implement
    spec: Option<PathBuf>,
    /// Number of verification threads (0 for the default, 1 for sequential)
    #[arg(short, long, default_value_t = 0)]
    jobs: usize,
  },
  /// Verify a proof file and write it out in another format
  Convert {
    /// The proof file to read
    input: PathBuf,
    /// The output file (.mmk for binary, text otherwise)
    output: PathBuf,
  },
}

fn init_log(verbose: u8, log: Option<&Path>) -> io::Result<()> {
  let level = match verbose {
    0 => LevelFilter::Warn,
    1 => LevelFilter::Info,
    _ => LevelFilter::Debug,
  };
  // a logger can only be set once, and failing to is harmless
  let _ = match log {
    Some(path) => WriteLogger::init(level, Config::default(), File::create(path)?),
    None => TermLogger::init(level, Config::default(), TerminalMode::Stderr, ColorChoice::Auto),
  };
  Ok(())
}

/// Map `path` into memory and decode it.
fn read_artifact(path: &Path) -> io::Result<Result<Artifact, String>> {
  let file = File::open(path)?;
  let name = path.display().to_string();
  // zero length files cannot be mapped
  if file.metadata()?.len() == 0 { return Ok(parse_artifact(&name, &[])) }
  let data = unsafe { Mmap::map(&file)? };
  Ok(parse_artifact(&name, &data))
}

fn fail(lines: impl IntoIterator<Item = String>) -> ! {
  for line in lines { eprintln!("{line}") }
  exit(1)
}

fn load(path: &Path, jobs: usize) -> io::Result<Environment> {
  let art = read_artifact(path)?.unwrap_or_else(|e| fail([e]));
  let mut v = Verifier::new(jobs)?;
  if let Err(e) = v.load(&art) {
    fail([format!("{}: {e}", path.display())])
  }
  Ok(v.into_env())
}

fn main() -> io::Result<()> {
  let cli = Cli::parse();
  init_log(cli.verbose, cli.log.as_deref())?;
  match cli.cmd {
    Command::Verify { proof, spec, jobs } => {
      let env = load(&proof, jobs)?;
      if let Some(spec) = spec {
        let art = read_artifact(&spec)?.unwrap_or_else(|e| fail([e]));
        if let Err(errs) = matcher::match_spec(&env, &art) {
          fail(errs.iter().map(|e| format!("{}: {e}", spec.display())))
        }
      }
      println!("OK")
    }
    Command::Convert { input, output } => {
      let env = load(&input, 0)?;
      let mut w = BufWriter::new(File::create(&output)?);
      if output.extension().is_some_and(|ext| ext == "mmk") {
        mmb::export::export(&env, &mut w)?
      } else {
        text::export::export(&env, &mut w)?
      }
      w.flush()?
    }
  }
  Ok(())
}
