//! # Tester
//!
//! Runs a series of editing scenarios, comparing the resulting modules to the "blessed" expected words.
//! Those tests are mainly *integration tests.* The editor's unit tests reside in its local
//! `spv-editor/tests` directory.
//!
//! Usage: `spv-tester [bless] [--input <file.spv>] <scenario>...`

use std::{
    collections::HashMap,
    io::{BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};
use spv_editor::rspirv::spirv::Word;

///Builds a small compute shader from nothing.
mod empty_module;
///Moves every resource one descriptor set up.
mod rebind;
///Injects a named specialization constant.
mod spec_constant;
///Removes all debug names.
mod strip_names;

mod spirv_tools;
mod test_runs;

use test_runs::{TestError, TestRun};

const BLESSED_FILE: &'static str = "BlessedTests.json";

#[derive(Serialize, Deserialize)]
pub struct BlessedDB {
    //true if this run blesses the BlessedDB.
    bless: bool,
    blessed_results: HashMap<String, Vec<u32>>,
}

impl BlessedDB {
    ///Blesses `words` as the result of `name`, or compares them to the blessed result when not
    /// blessing.
    pub fn check(&mut self, name: &str, words: &[Word]) -> Result<(), TestError> {
        if let Err(e) = spirv_tools::validate(words) {
            log::error!("{} produced an invalid module: {}", name, e);
            if self.bless {
                return Err(TestError::Invalid(e));
            }
        }

        if self.bless {
            let _old = self
                .blessed_results
                .insert(name.to_string(), words.to_vec());
            return Ok(());
        }

        match self.blessed_results.get(name) {
            Some(blessed) if blessed.as_slice() == words => {
                log::info!("{} matches blessed result", name);
                Ok(())
            }
            Some(blessed) => {
                let first_difference = blessed
                    .iter()
                    .zip(words.iter())
                    .position(|(a, b)| a != b)
                    .unwrap_or(blessed.len().min(words.len()));
                log::error!(
                    "{} differs at word {}:\n{}",
                    name,
                    first_difference,
                    spirv_tools::disassemble_around(words, first_difference)
                );
                Err(TestError::Mismatch {
                    name: name.to_string(),
                    first_difference,
                })
            }
            None => {
                log::error!("Could not test result, there is no blessed result for {}!", name);
                Ok(())
            }
        }
    }
}

fn load_input(path: &str) -> Result<Vec<Word>, TestError> {
    let bytes = std::fs::read(path)?;
    let words = spv_editor::words_from_bytes(&bytes).map_err(spv_editor::EditorError::from)?;
    log::info!("Loaded {} words from {}", words.len(), path);
    Ok(words)
}

fn main() {
    simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Trace)
        .init()
        .unwrap();

    //try to load blessed results
    let mut blessed_db = if Path::new(BLESSED_FILE).exists() {
        if let Ok(f) = std::fs::OpenOptions::new().read(true).open(BLESSED_FILE) {
            let reader = BufReader::new(f);
            serde_json::from_reader(reader).expect("Could not parse blessed file!")
        } else {
            log::error!("Failed to open blessed file");
            BlessedDB {
                bless: false,
                blessed_results: HashMap::default(),
            }
        }
    } else {
        log::error!("Could not find blessed file");
        BlessedDB {
            bless: true,
            blessed_results: HashMap::default(),
        }
    };

    let mut args = std::env::args();
    let _prog = args.next();
    let mut input = None;
    let mut names = Vec::new();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "bless" => {
                log::info!("Blessing db in this run");
                blessed_db.bless = true;
            }
            "--input" => match args.next() {
                Some(path) => match load_input(&path) {
                    Ok(words) => input = Some((path, words)),
                    Err(e) => {
                        log::error!("Failed to load input {}: {}", path, e);
                        std::process::exit(1);
                    }
                },
                None => {
                    log::error!("--input needs a file");
                    std::process::exit(1);
                }
            },
            _ => names.push(arg),
        }
    }

    //Read args and parse to test runs
    let mut runs: Vec<Box<dyn TestRun>> = Vec::new();
    for name in &names {
        if let Some(testrun) = test_runs::parse_test_run(name) {
            log::trace!("Found: {}", name);
            runs.push(testrun);
        }
    }

    let mut failed = 0;
    for run in &mut runs {
        log::info!("Running: {}", run.name());
        let input_words = input.as_ref().map(|(_, words)| words.as_slice());
        let result = run.run(input_words).and_then(|words| {
            //results on user input are blessed per input file
            let key = match &input {
                Some((path, _)) => format!("{}@{}", run.name(), path),
                None => run.name().to_string(),
            };
            blessed_db.check(&key, &words)
        });
        if let Err(e) = result {
            log::error!("Failed to run test {}: {}", run.name(), e);
            failed += 1;
        }
    }

    if blessed_db.bless {
        if Path::new(BLESSED_FILE).exists() {
            let _ = std::fs::remove_file(BLESSED_FILE);
        }
        let file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(BLESSED_FILE)
            .unwrap();
        serde_json::to_writer(BufWriter::new(file), &blessed_db).unwrap();
    }

    if failed > 0 {
        log::error!("{} of {} tests failed", failed, runs.len());
        std::process::exit(1);
    }
}
