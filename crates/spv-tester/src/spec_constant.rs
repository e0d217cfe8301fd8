use spv_editor::{rspirv::spirv::Word, Editor, EditorConfig};

use crate::test_runs::{default_input, ensure, TestError, TestRun};

const CONSTANT_NAME: &str = "injected_constant";

pub struct SpecConstantTest {
    pub value: u32,
    pub spec_id: u32,
}

impl TestRun for SpecConstantTest {
    fn name(&self) -> &'static str {
        "spec_constant"
    }

    fn run(&mut self, input: Option<&[Word]>) -> Result<Vec<Word>, TestError> {
        let mut words = match input {
            Some(words) => words.to_vec(),
            None => default_input()?,
        };
        let mut editor = Editor::prepare(&mut words, EditorConfig::default())?;

        let id = editor.add_spec_constant_immediate(self.value, self.spec_id)?;
        editor.set_name(id, CONSTANT_NAME)?;
        log::info!("Declared spec constant {} with SpecId {}", id, self.spec_id);

        ensure(editor.find_by_name(CONSTANT_NAME) == Some(id), || {
            format!("{} is not named {}", id, CONSTANT_NAME)
        })?;
        let declared = match editor.locate(id) {
            Some(at) => editor.operation(at)?.operand(2),
            None => None,
        };
        ensure(declared == Some(self.value), || {
            format!("{} holds {:?}", id, declared)
        })?;

        Ok(editor.words().to_vec())
    }
}
