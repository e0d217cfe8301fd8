use spv_editor::{
    rspirv::spirv::{
        AddressingModel, Capability, Decoration, ExecutionMode, ExecutionModel, FunctionControl,
        MemoryModel, Op, StorageClass, Word,
    },
    Binding, Editor, EditorConfig, FunctionType, Operation, OperationList, Pointer, Scalar,
    Section, Vector,
};

use crate::test_runs::{ensure, TestError, TestRun};

///Generator magic written into modules this tester creates.
const GENERATOR: Word = 0x5350_0001;

///Builds a compute shader with a single `vec4` uniform at set 0, binding 2 into an empty buffer.
pub struct EmptyModuleTest;

impl EmptyModuleTest {
    pub fn build(words: &mut Vec<Word>) -> Result<(), TestError> {
        let mut editor = Editor::create_empty(
            words,
            1,
            3,
            EditorConfig {
                generator: GENERATOR,
                ..Default::default()
            },
        );

        editor.add_capability(Capability::Shader)?;
        let at = editor.section_end(Section::MemoryModel);
        editor.insert(
            at,
            Operation::new(
                Op::MemoryModel,
                [AddressingModel::Logical as u32, MemoryModel::GLSL450 as u32],
            ),
        )?;

        let float = editor.declare_type(Scalar::float(32))?;
        let vec4 = editor.declare_type(Vector::new(Scalar::float(32), 4))?;
        let ptr = editor.declare_type(Pointer::new(vec4, StorageClass::Uniform))?;
        let var_id = editor.new_id()?;
        let ubo = editor.add_variable(Operation::variable(
            ptr,
            var_id,
            StorageClass::Uniform,
            None,
        ))?;
        editor.add_decoration(Operation::decorate(ubo, Decoration::DescriptorSet, [0]))?;
        editor.add_decoration(Operation::decorate(ubo, Decoration::Binding, [2]))?;
        editor.set_name(ubo, "ubo")?;

        ensure(editor.binding(ubo) == Binding::new(0, 2), || {
            format!("ubo is bound at {:?}", editor.binding(ubo))
        })?;

        //redeclaring the chain must neither allocate nor insert anything
        let len = editor.words().len();
        let bound = editor.bound();
        ensure(
            editor.declare_type(Scalar::float(32))? == float
                && editor.declare_type(Vector::new(Scalar::float(32), 4))? == vec4
                && editor.declare_type(Pointer::new(vec4, StorageClass::Uniform))? == ptr,
            || "redeclaration returned new ids".to_string(),
        )?;
        ensure(editor.words().len() == len && editor.bound() == bound, || {
            "redeclaration changed the module".to_string()
        })?;

        let void = editor.declare_type(Scalar::Void)?;
        let function_type = editor.declare_type(FunctionType::new(void, []))?;
        let main = editor.new_id()?;
        let label = editor.new_id()?;
        let mut body = OperationList::new();
        body.add(Operation::function(
            void,
            main,
            FunctionControl::NONE,
            function_type,
        ));
        body.add(Operation::label(label));
        body.add(Operation::new(Op::Return, []));
        body.add(Operation::new(Op::FunctionEnd, []));
        editor.add_function(&body)?;

        let at = editor.section_end(Section::EntryPoints);
        editor.insert(
            at,
            Operation::entry_point(ExecutionModel::GLCompute, main, "main", []),
        )?;
        editor.add_execution_mode(Operation::execution_mode(
            main,
            ExecutionMode::LocalSize,
            [1, 1, 1],
        ))?;
        editor.set_name(main, "main")?;

        log::info!(
            "Built module of {} words with bound {}",
            editor.words().len(),
            editor.bound()
        );
        Ok(())
    }
}

impl TestRun for EmptyModuleTest {
    fn name(&self) -> &'static str {
        "empty_module"
    }

    fn run(&mut self, input: Option<&[Word]>) -> Result<Vec<Word>, TestError> {
        if input.is_some() {
            log::warn!("{} ignores its input", self.name());
        }
        let mut words = Vec::new();
        Self::build(&mut words)?;
        Ok(words)
    }
}
