//! # Type keys and deduplication tables
//!
//! Every structural type category has a key that fully describes a type of that category. Two
//! keys compare equal exactly when the declared types are identical, so a key can be used to
//! look up whether a type was already declared.
//!
//! Keys embed their constituent *scalar* types by value (a `vec4<f32>` key carries the `f32`
//! key), but reference every other constituent by [Id]. Declaring a key therefore requires all
//! its constituents to already be declared.

use std::{cmp::Ordering, collections::BTreeMap};

use ahash::AHashMap;
use rspirv::spirv::{Dim, ImageFormat, Op, StorageClass, Word};
use smallvec::SmallVec;

use crate::operation::{Id, Operation, OperationRef};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scalar {
    Void,
    Bool,
    Int { width: u32, signed: bool },
    Float { width: u32 },
}

impl Scalar {
    pub fn int(width: u32, signed: bool) -> Self {
        Scalar::Int { width, signed }
    }

    pub fn float(width: u32) -> Self {
        Scalar::Float { width }
    }

    ///Byte size of a value of this type.
    pub fn size(&self) -> u32 {
        match self {
            Scalar::Void => 0,
            Scalar::Bool => 4,
            Scalar::Int { width, .. } | Scalar::Float { width } => width / 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Vector {
    pub scalar: Scalar,
    pub count: u32,
}

impl Vector {
    pub fn new(scalar: Scalar, count: u32) -> Self {
        Vector { scalar, count }
    }
}

///Matrix of `count` columns of type `column`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Matrix {
    pub column: Vector,
    pub count: u32,
}

impl Matrix {
    pub fn new(column: Vector, count: u32) -> Self {
        Matrix { column, count }
    }
}

///Pointer to `base` in the given storage class. Pointers to the same type in different storage
/// classes are different types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Pointer {
    pub base: Id,
    pub storage: StorageClass,
}

impl Pointer {
    pub fn new(base: Id, storage: StorageClass) -> Self {
        Pointer { base, storage }
    }
}

impl Ord for Pointer {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.base, self.storage as u32).cmp(&(other.base, other.storage as u32))
    }
}

impl PartialOrd for Pointer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Image {
    pub sampled_type: Scalar,
    pub dim: Dim,
    ///0 = not a depth image, 1 = depth image, 2 = unknown.
    pub depth: u32,
    pub arrayed: bool,
    pub multisampled: bool,
    ///0 = known at runtime, 1 = used with a sampler, 2 = storage image.
    pub sampled: u32,
    pub format: ImageFormat,
}

impl Image {
    fn ord_key(&self) -> (Scalar, u32, u32, bool, bool, u32, u32) {
        (
            self.sampled_type,
            self.dim as u32,
            self.depth,
            self.arrayed,
            self.multisampled,
            self.sampled,
            self.format as u32,
        )
    }
}

impl Ord for Image {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ord_key().cmp(&other.ord_key())
    }
}

impl PartialOrd for Image {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Sampler;

///Image combined with a sampler. `image` is the id of an `OpTypeImage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampledImage {
    pub image: Id,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctionType {
    pub return_type: Id,
    pub arguments: SmallVec<[Id; 4]>,
}

impl FunctionType {
    pub fn new(return_type: Id, arguments: impl IntoIterator<Item = Id>) -> Self {
        FunctionType {
            return_type,
            arguments: arguments.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeCategory {
    Scalar,
    Vector,
    Matrix,
    Pointer,
    Image,
    Sampler,
    SampledImage,
    Function,
}

///Key of one deduplicated type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeKey {
    Scalar(Scalar),
    Vector(Vector),
    Matrix(Matrix),
    Pointer(Pointer),
    Image(Image),
    Sampler(Sampler),
    SampledImage(SampledImage),
    Function(FunctionType),
}

impl TypeKey {
    pub fn category(&self) -> TypeCategory {
        match self {
            TypeKey::Scalar(_) => TypeCategory::Scalar,
            TypeKey::Vector(_) => TypeCategory::Vector,
            TypeKey::Matrix(_) => TypeCategory::Matrix,
            TypeKey::Pointer(_) => TypeCategory::Pointer,
            TypeKey::Image(_) => TypeCategory::Image,
            TypeKey::Sampler(_) => TypeCategory::Sampler,
            TypeKey::SampledImage(_) => TypeCategory::SampledImage,
            TypeKey::Function(_) => TypeCategory::Function,
        }
    }
}

macro_rules! impl_into_key {
    ($($ty:ident),*) => {
        $(impl From<$ty> for TypeKey {
            fn from(value: $ty) -> Self {
                TypeKey::$ty(value)
            }
        })*
    };
}

impl_into_key!(Scalar, Vector, Matrix, Pointer, Image, Sampler, SampledImage);

impl From<FunctionType> for TypeKey {
    fn from(value: FunctionType) -> Self {
        TypeKey::Function(value)
    }
}

///A constituent of a key that has not been declared yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingType {
    Scalar(Scalar),
    Vector(Vector),
    ///A constituent referenced by id that is not defined in the module.
    Id(Id),
}

///One ordered table per type category, plus a reverse index from id to key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeTables {
    scalars: BTreeMap<Scalar, Id>,
    vectors: BTreeMap<Vector, Id>,
    matrices: BTreeMap<Matrix, Id>,
    pointers: BTreeMap<Pointer, Id>,
    images: BTreeMap<Image, Id>,
    samplers: BTreeMap<Sampler, Id>,
    sampled_images: BTreeMap<SampledImage, Id>,
    functions: BTreeMap<FunctionType, Id>,
    ///Structs by member sequence. Only filled if struct deduplication is enabled.
    structs: BTreeMap<SmallVec<[Id; 4]>, Id>,
    by_id: AHashMap<Id, TypeKey>,
}

impl TypeTables {
    pub fn get(&self, key: &TypeKey) -> Option<Id> {
        match key {
            TypeKey::Scalar(k) => self.scalars.get(k),
            TypeKey::Vector(k) => self.vectors.get(k),
            TypeKey::Matrix(k) => self.matrices.get(k),
            TypeKey::Pointer(k) => self.pointers.get(k),
            TypeKey::Image(k) => self.images.get(k),
            TypeKey::Sampler(k) => self.samplers.get(k),
            TypeKey::SampledImage(k) => self.sampled_images.get(k),
            TypeKey::Function(k) => self.functions.get(k),
        }
        .copied()
    }

    ///Key an already declared id was registered under.
    pub fn key_of(&self, id: Id) -> Option<&TypeKey> {
        self.by_id.get(&id)
    }

    ///Adds `key -> id`. If the key is already known the first declaration stays the canonical one
    /// and `false` is returned.
    pub(crate) fn insert(&mut self, key: TypeKey, id: Id) -> bool {
        fn put<K: Ord>(table: &mut BTreeMap<K, Id>, key: K, id: Id) -> bool {
            match table.entry(key) {
                std::collections::btree_map::Entry::Vacant(v) => {
                    v.insert(id);
                    true
                }
                std::collections::btree_map::Entry::Occupied(_) => false,
            }
        }

        let inserted = match key.clone() {
            TypeKey::Scalar(k) => put(&mut self.scalars, k, id),
            TypeKey::Vector(k) => put(&mut self.vectors, k, id),
            TypeKey::Matrix(k) => put(&mut self.matrices, k, id),
            TypeKey::Pointer(k) => put(&mut self.pointers, k, id),
            TypeKey::Image(k) => put(&mut self.images, k, id),
            TypeKey::Sampler(k) => put(&mut self.samplers, k, id),
            TypeKey::SampledImage(k) => put(&mut self.sampled_images, k, id),
            TypeKey::Function(k) => put(&mut self.functions, k, id),
        };

        if inserted {
            self.by_id.insert(id, key);
        }
        inserted
    }

    ///Forgets `id`. The key is only dropped from its table if it still maps to `id`.
    pub(crate) fn remove(&mut self, id: Id) -> Option<TypeKey> {
        fn take<K: Ord>(table: &mut BTreeMap<K, Id>, key: &K, id: Id) {
            if table.get(key) == Some(&id) {
                table.remove(key);
            }
        }

        let key = self.by_id.remove(&id)?;
        match &key {
            TypeKey::Scalar(k) => take(&mut self.scalars, k, id),
            TypeKey::Vector(k) => take(&mut self.vectors, k, id),
            TypeKey::Matrix(k) => take(&mut self.matrices, k, id),
            TypeKey::Pointer(k) => take(&mut self.pointers, k, id),
            TypeKey::Image(k) => take(&mut self.images, k, id),
            TypeKey::Sampler(k) => take(&mut self.samplers, k, id),
            TypeKey::SampledImage(k) => take(&mut self.sampled_images, k, id),
            TypeKey::Function(k) => take(&mut self.functions, k, id),
        }
        Some(key)
    }

    pub fn get_struct(&self, members: &[Id]) -> Option<Id> {
        self.structs.get(members).copied()
    }

    pub(crate) fn insert_struct(&mut self, members: SmallVec<[Id; 4]>, id: Id) -> bool {
        if self.structs.contains_key(&members) {
            return false;
        }
        self.structs.insert(members, id);
        true
    }

    pub(crate) fn remove_struct(&mut self, members: &[Id], id: Id) {
        if self.structs.get(members) == Some(&id) {
            self.structs.remove(members);
        }
    }

    ///All declared types of one category, in key order.
    pub fn entries(&self, category: TypeCategory) -> Vec<(TypeKey, Id)> {
        fn collect<K: Clone + Into<TypeKey>>(table: &BTreeMap<K, Id>) -> Vec<(TypeKey, Id)> {
            table.iter().map(|(k, id)| (k.clone().into(), *id)).collect()
        }

        match category {
            TypeCategory::Scalar => collect(&self.scalars),
            TypeCategory::Vector => collect(&self.vectors),
            TypeCategory::Matrix => collect(&self.matrices),
            TypeCategory::Pointer => collect(&self.pointers),
            TypeCategory::Image => collect(&self.images),
            TypeCategory::Sampler => collect(&self.samplers),
            TypeCategory::SampledImage => collect(&self.sampled_images),
            TypeCategory::Function => collect(&self.functions),
        }
    }

    fn scalar_id(&self, scalar: Scalar) -> Result<Id, MissingType> {
        self.scalars
            .get(&scalar)
            .copied()
            .ok_or(MissingType::Scalar(scalar))
    }

    fn scalar_of(&self, id: Id) -> Option<Scalar> {
        match self.by_id.get(&id) {
            Some(TypeKey::Scalar(s)) => Some(*s),
            _ => None,
        }
    }

    ///Builds the declaring instruction for `key`, with `id` as result. Fails if a scalar or vector
    /// constituent has not been declared.
    pub(crate) fn declaration(&self, key: &TypeKey, id: Id) -> Result<Operation, MissingType> {
        let id = id.value();
        let op = match key {
            TypeKey::Scalar(Scalar::Void) => Operation::new(Op::TypeVoid, [id]),
            TypeKey::Scalar(Scalar::Bool) => Operation::new(Op::TypeBool, [id]),
            TypeKey::Scalar(Scalar::Int { width, signed }) => {
                Operation::new(Op::TypeInt, [id, *width, *signed as Word])
            }
            TypeKey::Scalar(Scalar::Float { width }) => {
                Operation::new(Op::TypeFloat, [id, *width])
            }
            TypeKey::Vector(v) => {
                let component = self.scalar_id(v.scalar)?;
                Operation::new(Op::TypeVector, [id, component.value(), v.count])
            }
            TypeKey::Matrix(m) => {
                let column = self
                    .vectors
                    .get(&m.column)
                    .ok_or(MissingType::Vector(m.column))?;
                Operation::new(Op::TypeMatrix, [id, column.value(), m.count])
            }
            TypeKey::Pointer(p) => {
                Operation::new(Op::TypePointer, [id, p.storage as Word, p.base.value()])
            }
            TypeKey::Image(i) => {
                let sampled_type = self.scalar_id(i.sampled_type)?;
                Operation::new(
                    Op::TypeImage,
                    [
                        id,
                        sampled_type.value(),
                        i.dim as Word,
                        i.depth,
                        i.arrayed as Word,
                        i.multisampled as Word,
                        i.sampled,
                        i.format as Word,
                    ],
                )
            }
            TypeKey::Sampler(_) => Operation::new(Op::TypeSampler, [id]),
            TypeKey::SampledImage(s) => Operation::new(Op::TypeSampledImage, [id, s.image.value()]),
            TypeKey::Function(f) => {
                let mut op = Operation::new(Op::TypeFunction, [id, f.return_type.value()]);
                op.operands_mut()
                    .extend(f.arguments.iter().map(|a| a.value()));
                op
            }
        };

        Ok(op)
    }

    ///Decodes the key a type declaration in the module describes. Returns `None` for instructions
    /// that are not deduplicated types, or whose constituents are unknown.
    pub(crate) fn decode(&self, inst: &OperationRef) -> Option<TypeKey> {
        let operand = |idx: usize| inst.operand(idx);
        let id_operand = |idx: usize| inst.operand(idx).and_then(Id::new);

        let key = match inst.op()? {
            Op::TypeVoid => TypeKey::Scalar(Scalar::Void),
            Op::TypeBool => TypeKey::Scalar(Scalar::Bool),
            Op::TypeInt => TypeKey::Scalar(Scalar::Int {
                width: operand(1)?,
                signed: operand(2)? != 0,
            }),
            Op::TypeFloat => {
                //trailing floating point encoding operand is not part of the key
                if inst.operands().len() > 2 {
                    return None;
                }
                TypeKey::Scalar(Scalar::Float { width: operand(1)? })
            }
            Op::TypeVector => TypeKey::Vector(Vector {
                scalar: self.scalar_of(id_operand(1)?)?,
                count: operand(2)?,
            }),
            Op::TypeMatrix => {
                let column = match self.by_id.get(&id_operand(1)?) {
                    Some(TypeKey::Vector(v)) => *v,
                    _ => return None,
                };
                TypeKey::Matrix(Matrix {
                    column,
                    count: operand(2)?,
                })
            }
            Op::TypePointer => TypeKey::Pointer(Pointer {
                storage: StorageClass::from_u32(operand(1)?)?,
                base: id_operand(2)?,
            }),
            Op::TypeImage => {
                //access qualified (kernel) images are not deduplicated
                if inst.operands().len() > 8 {
                    return None;
                }
                TypeKey::Image(Image {
                    sampled_type: self.scalar_of(id_operand(1)?)?,
                    dim: Dim::from_u32(operand(2)?)?,
                    depth: operand(3)?,
                    arrayed: operand(4)? != 0,
                    multisampled: operand(5)? != 0,
                    sampled: operand(6)?,
                    format: ImageFormat::from_u32(operand(7)?)?,
                })
            }
            Op::TypeSampler => TypeKey::Sampler(Sampler),
            Op::TypeSampledImage => TypeKey::SampledImage(SampledImage {
                image: id_operand(1)?,
            }),
            Op::TypeFunction => TypeKey::Function(FunctionType {
                return_type: id_operand(1)?,
                arguments: inst.operands()[2..]
                    .iter()
                    .map(|w| Id::new(*w))
                    .collect::<Option<_>>()?,
            }),
            _ => return None,
        };

        Some(key)
    }
}

///Values that can be declared as immediate constants.
///
/// The raw bytes of the value are packed into words, least significant word first. Values
/// narrower than a word are padded to a whole word: signed integers are sign extended, everything
/// else is zero padded.
pub trait ImmediateValue: bytemuck::NoUninit {
    fn scalar() -> Scalar;

    fn to_words(&self) -> SmallVec<[Word; 2]> {
        let bytes = bytemuck::bytes_of(self);
        let mut words: SmallVec<[Word; 2]> = bytes
            .chunks(4)
            .map(|chunk| {
                let mut word = [0u8; 4];
                word[..chunk.len()].copy_from_slice(chunk);
                u32::from_le_bytes(word)
            })
            .collect();

        if let Scalar::Int {
            width,
            signed: true,
        } = Self::scalar()
        {
            if width < 32 {
                let unused = 32 - width;
                for word in words.iter_mut() {
                    *word = (((*word << unused) as i32) >> unused) as u32;
                }
            }
        }
        words
    }
}

macro_rules! impl_immediate {
    ($($ty:ty => $scalar:expr),*) => {
        $(impl ImmediateValue for $ty {
            fn scalar() -> Scalar {
                $scalar
            }
        })*
    };
}

impl_immediate!(
    u8 => Scalar::int(8, false),
    i8 => Scalar::int(8, true),
    u16 => Scalar::int(16, false),
    i16 => Scalar::int(16, true),
    u32 => Scalar::int(32, false),
    i32 => Scalar::int(32, true),
    u64 => Scalar::int(64, false),
    i64 => Scalar::int(64, true),
    f32 => Scalar::float(32),
    f64 => Scalar::float(64)
);

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u32) -> Id {
        Id::new(v).unwrap()
    }

    #[test]
    fn pointer_keys_include_storage_class() {
        let a = TypeKey::from(Pointer::new(id(4), StorageClass::Uniform));
        let b = TypeKey::from(Pointer::new(id(4), StorageClass::Function));
        assert_ne!(a, b);

        let mut tables = TypeTables::default();
        assert!(tables.insert(a.clone(), id(10)));
        assert_eq!(tables.get(&a), Some(id(10)));
        assert_eq!(tables.get(&b), None);
    }

    #[test]
    fn first_declaration_stays_canonical() {
        let mut tables = TypeTables::default();
        let key = TypeKey::from(Scalar::float(32));
        assert!(tables.insert(key.clone(), id(2)));
        assert!(!tables.insert(key.clone(), id(3)));
        assert_eq!(tables.get(&key), Some(id(2)));

        //removing the duplicate must not forget the canonical id
        assert_eq!(tables.remove(id(3)), None);
        assert_eq!(tables.get(&key), Some(id(2)));
        assert_eq!(tables.remove(id(2)), Some(key.clone()));
        assert_eq!(tables.get(&key), None);
    }

    #[test]
    fn declaration_needs_constituents() {
        let tables = TypeTables::default();
        let vec4 = TypeKey::from(Vector::new(Scalar::float(32), 4));
        assert_eq!(
            tables.declaration(&vec4, id(5)),
            Err(MissingType::Scalar(Scalar::float(32)))
        );
    }

    #[test]
    fn immediate_words() {
        assert_eq!(7u32.to_words().as_slice(), &[7]);
        assert_eq!(
            0x1122_3344_5566_7788u64.to_words().as_slice(),
            &[0x5566_7788, 0x1122_3344]
        );
        assert_eq!(0xabu8.to_words().as_slice(), &[0xab]);
        assert_eq!(1.0f32.to_words().as_slice(), &[0x3f80_0000]);
        assert_eq!(<i16 as ImmediateValue>::scalar(), Scalar::int(16, true));
    }

    #[test]
    fn narrow_signed_values_are_sign_extended() {
        assert_eq!((-1i8).to_words().as_slice(), &[0xffff_ffff]);
        assert_eq!((-2i16).to_words().as_slice(), &[0xffff_fffe]);
        assert_eq!(5i8.to_words().as_slice(), &[5]);
        assert_eq!(0xffu8.to_words().as_slice(), &[0xff]);
        assert_eq!(0x8000u16.to_words().as_slice(), &[0x8000]);
        assert_eq!((-1i32).to_words().as_slice(), &[0xffff_ffff]);
        assert_eq!(
            (-1i64).to_words().as_slice(),
            &[0xffff_ffff, 0xffff_ffff]
        );
    }
}
