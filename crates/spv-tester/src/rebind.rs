use spv_editor::{
    rspirv::spirv::{Decoration, Op, Word},
    Editor, EditorConfig, Section,
};

use crate::test_runs::{default_input, ensure, TestError, TestRun};

///Moves every resource `set_offset` descriptor sets up, by editing the `DescriptorSet`
/// decorations in place.
pub struct RebindTest {
    pub set_offset: u32,
}

impl TestRun for RebindTest {
    fn name(&self) -> &'static str {
        "rebind"
    }

    fn run(&mut self, input: Option<&[Word]>) -> Result<Vec<Word>, TestError> {
        let mut words = match input {
            Some(words) => words.to_vec(),
            None => default_input()?,
        };
        let mut editor = Editor::prepare(&mut words, EditorConfig::default())?;
        let before: Vec<_> = editor.bindings().collect();
        let len = editor.words().len();

        let decorations: Vec<_> = editor
            .iter(Section::Annotations)
            .filter(|inst| {
                inst.op() == Some(Op::Decorate)
                    && inst.operand(1) == Some(Decoration::DescriptorSet as u32)
            })
            .map(|inst| inst.location())
            .collect();

        let offset = self.set_offset;
        for at in &decorations {
            editor.modify(*at, |operands| operands[2] += offset)?;
        }
        log::info!("Rebound {} resources", decorations.len());

        ensure(editor.words().len() == len, || {
            "in place edit changed the module length".to_string()
        })?;
        for (id, binding) in before {
            let now = editor.binding(id);
            ensure(
                now.set == binding.set + offset && now.binding == binding.binding,
                || format!("{} moved from {:?} to {:?}", id, binding, now),
            )?;
        }

        Ok(editor.words().to_vec())
    }
}
