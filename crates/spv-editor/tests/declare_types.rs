use spv_editor::{
    rspirv::spirv::{Decoration, Dim, ImageFormat, Op, StorageClass},
    Binding, Editor, EditorConfig, EditorError, FunctionType, Image, Matrix, MissingType,
    Operation, Pointer, SampledImage, Sampler, Scalar, Section, StructDedup, TypeCategory,
    TypeKey, Vector,
};

fn empty_module(words: &mut Vec<u32>) -> Editor<'_> {
    Editor::create_empty(words, 1, 3, EditorConfig::default())
}

#[test]
fn declaring_twice_is_a_noop() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let float = editor.declare_type(Scalar::float(32)).unwrap();
    let vec4 = editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap();
    let len = editor.words().len();
    let bound = editor.bound();

    assert_eq!(editor.declare_type(Scalar::float(32)).unwrap(), float);
    assert_eq!(
        editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap(),
        vec4
    );
    assert_eq!(editor.words().len(), len, "redeclaration inserted words");
    assert_eq!(editor.bound(), bound, "redeclaration allocated an id");
}

#[test]
fn distinct_keys_get_distinct_ids() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let float = editor.declare_type(Scalar::float(32)).unwrap();
    let double = editor.declare_type(Scalar::float(64)).unwrap();
    let int = editor.declare_type(Scalar::int(32, true)).unwrap();
    let uint = editor.declare_type(Scalar::int(32, false)).unwrap();
    let vec3 = editor.declare_type(Vector::new(Scalar::float(32), 3)).unwrap();
    let vec4 = editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap();
    let mat4 = editor
        .declare_type(Matrix::new(Vector::new(Scalar::float(32), 4), 4))
        .unwrap();
    let uniform_ptr = editor
        .declare_type(Pointer::new(vec4, StorageClass::Uniform))
        .unwrap();
    let private_ptr = editor
        .declare_type(Pointer::new(vec4, StorageClass::Private))
        .unwrap();

    let ids = [
        float,
        double,
        int,
        uint,
        vec3,
        vec4,
        mat4,
        uniform_ptr,
        private_ptr,
    ];
    for (i, a) in ids.iter().enumerate() {
        for b in &ids[i + 1..] {
            assert_ne!(a, b);
        }
    }

    assert_eq!(editor.get_type(Scalar::float(32)), Some(float));
    assert_eq!(editor.get_type(Scalar::float(16)), None);
    assert_eq!(editor.declared_types(TypeCategory::Scalar).len(), 4);
    assert_eq!(editor.declared_types(TypeCategory::Pointer).len(), 2);
}

#[test]
fn constants_are_not_deduplicated() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let a = editor.add_constant_immediate(7u32).unwrap();
    let b = editor.add_constant_immediate(7u32).unwrap();
    assert_ne!(a, b);

    let uint = editor.get_type(Scalar::int(32, false)).unwrap();
    for id in [a, b] {
        let at = editor.locate(id).unwrap();
        let inst = editor.operation(at).unwrap();
        assert_eq!(inst.op(), Some(Op::Constant));
        assert_eq!(inst.result_type(), Some(uint));
        assert_eq!(inst.operand(2), Some(7));
    }
    assert_eq!(editor.declared_types(TypeCategory::Scalar).len(), 1);
}

#[test]
fn wide_constants_are_split_low_word_first() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let id = editor
        .add_constant_immediate(0x0000_0001_0000_0002u64)
        .unwrap();
    let inst = editor.operation(editor.locate(id).unwrap()).unwrap();
    assert_eq!(inst.word_count(), 5);
    assert_eq!(&inst.operands()[2..], &[2, 1]);
    assert_eq!(
        editor.type_key(inst.result_type().unwrap()),
        Some(&TypeKey::from(Scalar::int(64, false)))
    );
}

#[test]
fn spec_constants_carry_their_spec_id() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let id = editor.add_spec_constant_immediate(1.5f32, 42).unwrap();
    let inst = editor.operation(editor.locate(id).unwrap()).unwrap();
    assert_eq!(inst.op(), Some(Op::SpecConstant));
    assert_eq!(inst.operand(2), Some(1.5f32.to_bits()));

    let decoration = editor
        .iter(Section::Annotations)
        .find(|i| i.operand(0) == Some(id.value()))
        .expect("SpecId decoration missing");
    assert_eq!(decoration.op(), Some(Op::Decorate));
    assert_eq!(decoration.operand(1), Some(Decoration::SpecId as u32));
    assert_eq!(decoration.operand(2), Some(42));
}

#[test]
fn missing_constituents_abort_the_session() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let err = editor
        .declare_type(Vector::new(Scalar::float(32), 4))
        .unwrap_err();
    assert!(matches!(
        err,
        EditorError::MissingDependency {
            missing: MissingType::Scalar(Scalar::Float { width: 32 }),
            ..
        }
    ));
    assert!(editor.is_aborted());
    assert!(matches!(
        editor.declare_type(Scalar::float(32)),
        Err(EditorError::Aborted)
    ));
}

#[test]
fn pointer_to_undefined_id_is_rejected() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let dangling = editor.new_id().unwrap();
    let err = editor
        .declare_type(Pointer::new(dangling, StorageClass::Function))
        .unwrap_err();
    assert!(matches!(
        err,
        EditorError::MissingDependency {
            missing: MissingType::Id(id),
            ..
        } if id == dangling
    ));
}

#[test]
fn image_and_function_types() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let void = editor.declare_type(Scalar::Void).unwrap();
    editor.declare_type(Scalar::float(32)).unwrap();
    let image = Image {
        sampled_type: Scalar::float(32),
        dim: Dim::Dim2D,
        depth: 0,
        arrayed: false,
        multisampled: false,
        sampled: 1,
        format: ImageFormat::Unknown,
    };
    let image_id = editor.declare_type(image).unwrap();
    let sampler = editor.declare_type(Sampler).unwrap();
    let combined = editor
        .declare_type(SampledImage { image: image_id })
        .unwrap();
    let storage_image = editor
        .declare_type(Image {
            sampled: 2,
            format: ImageFormat::Rgba8,
            ..image
        })
        .unwrap();
    assert_ne!(image_id, storage_image);
    assert_ne!(sampler, combined);

    let main_ty = editor
        .declare_type(FunctionType::new(void, []))
        .unwrap();
    let helper_ty = editor
        .declare_type(FunctionType::new(void, [combined]))
        .unwrap();
    assert_ne!(main_ty, helper_ty);
    assert_eq!(
        editor.declare_type(FunctionType::new(void, [])).unwrap(),
        main_ty
    );
    assert_eq!(editor.get_type(image), Some(image_id));
}

#[test]
fn struct_policy() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);
    let float = editor.declare_type(Scalar::float(32)).unwrap();
    let a = editor.declare_struct_type(&[float, float]).unwrap();
    let b = editor.declare_struct_type(&[float, float]).unwrap();
    assert_ne!(a, b, "structs are not deduplicated by default");

    let mut words = Vec::new();
    let mut editor = Editor::create_empty(
        &mut words,
        1,
        3,
        EditorConfig {
            struct_dedup: StructDedup::ByMembers,
            ..Default::default()
        },
    );
    let float = editor.declare_type(Scalar::float(32)).unwrap();
    let a = editor.declare_struct_type(&[float, float]).unwrap();
    let b = editor.declare_struct_type(&[float, float]).unwrap();
    let c = editor.declare_struct_type(&[float]).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);
}

///Declares `vec4` uniform buffer variable bound to set 0, binding 2 in a fresh module and checks
/// that the declaration chain is fully deduplicated afterwards.
#[test]
fn uniform_variable_scenario() {
    let mut words = Vec::new();
    let mut editor = empty_module(&mut words);

    let float = editor.declare_type(Scalar::float(32)).unwrap();
    let vec4 = editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap();
    let ptr = editor
        .declare_type(Pointer::new(vec4, StorageClass::Uniform))
        .unwrap();
    let var_id = editor.new_id().unwrap();
    let var = editor
        .add_variable(Operation::variable(ptr, var_id, StorageClass::Uniform, None))
        .unwrap();
    assert_eq!(var, var_id);

    editor
        .add_decoration(Operation::decorate(var, Decoration::DescriptorSet, [0]))
        .unwrap();
    editor
        .add_decoration(Operation::decorate(var, Decoration::Binding, [2]))
        .unwrap();
    assert_eq!(editor.binding(var), Binding::new(0, 2));
    assert!(editor.binding(var).is_bound());
    assert!(!editor.binding(float).is_bound());

    let len = editor.words().len();
    assert_eq!(editor.declare_type(Scalar::float(32)).unwrap(), float);
    assert_eq!(
        editor.declare_type(Vector::new(Scalar::float(32), 4)).unwrap(),
        vec4
    );
    assert_eq!(
        editor
            .declare_type(Pointer::new(vec4, StorageClass::Uniform))
            .unwrap(),
        ptr
    );
    assert_eq!(editor.words().len(), len);
    assert!(editor.sections().is_contiguous(len));
    drop(editor);

    //the result must be loadable by an independent SPIR-V reader
    let module = spv_editor::rspirv::dr::load_words(&words).unwrap();
    assert_eq!(module.types_global_values.len(), 4);
    assert_eq!(module.annotations.len(), 2);
    assert_eq!(module.header.as_ref().map(|h| h.bound), Some(var.value() + 1));
}
