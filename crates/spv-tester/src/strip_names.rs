use spv_editor::{
    rspirv::spirv::{Op, Word},
    Editor, EditorConfig, Section,
};

use crate::test_runs::{default_input, ensure, TestError, TestRun};

///Removes every `OpName`. Member names are kept.
pub struct StripNamesTest;

impl TestRun for StripNamesTest {
    fn name(&self) -> &'static str {
        "strip_names"
    }

    fn run(&mut self, input: Option<&[Word]>) -> Result<Vec<Word>, TestError> {
        let mut words = match input {
            Some(words) => words.to_vec(),
            None => default_input()?,
        };
        let mut editor = Editor::prepare(&mut words, EditorConfig::default())?;

        let names: Vec<_> = editor
            .iter(Section::DebugNames)
            .filter(|inst| inst.op() == Some(Op::Name))
            .map(|inst| (inst.location(), inst.string_operand(1).unwrap_or_default()))
            .collect();

        for (at, _) in &names {
            editor.remove(*at)?;
        }
        log::info!("Removed {} names", names.len());

        for (_, name) in &names {
            ensure(editor.find_by_name(name).is_none(), || {
                format!("{} is still declared", name)
            })?;
        }

        Ok(editor.words().to_vec())
    }
}
