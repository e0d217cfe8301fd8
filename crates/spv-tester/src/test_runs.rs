//! Collects all pre defined tests.

use spv_editor::{rspirv::spirv::Word, EditorError};
use thiserror::Error;

use crate::{
    empty_module::EmptyModuleTest, rebind::RebindTest, spec_constant::SpecConstantTest,
    strip_names::StripNamesTest,
};

#[derive(Debug, Error)]
pub enum TestError {
    #[error("Editor failed: {0}")]
    Editor(#[from] EditorError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Result check failed: {0}")]
    Check(String),
    #[error("Module did not validate: {0}")]
    Invalid(String),
    #[error("Result of {name} differs from blessed result at word {first_difference}")]
    Mismatch {
        name: String,
        first_difference: usize,
    },
}

///Fails with [TestError::Check] if `condition` does not hold.
pub fn ensure(condition: bool, msg: impl FnOnce() -> String) -> Result<(), TestError> {
    if condition {
        Ok(())
    } else {
        Err(TestError::Check(msg()))
    }
}

pub trait TestRun {
    ///Human readable name of the test. Also used to find blessed result.
    fn name(&self) -> &'static str;
    ///Runs the test on `input`, or on a built-in module if there is none, and returns the edited
    /// module.
    fn run(&mut self, input: Option<&[Word]>) -> Result<Vec<Word>, TestError>;
}

///Module scenarios without `--input` work on.
pub fn default_input() -> Result<Vec<Word>, TestError> {
    let mut words = Vec::new();
    EmptyModuleTest::build(&mut words)?;
    Ok(words)
}

///Tries to parse a `name` to a test run.
pub fn parse_test_run(name: &str) -> Option<Box<dyn TestRun>> {
    match name {
        "empty_module" => Some(Box::new(EmptyModuleTest)),
        "rebind" => Some(Box::new(RebindTest { set_offset: 1 })),
        "spec_constant" => Some(Box::new(SpecConstantTest {
            value: 42,
            spec_id: 7,
        })),
        "strip_names" => Some(Box::new(StripNamesTest)),
        _ => {
            log::error!("No test named \"{}\" found!", name);
            None
        }
    }
}
