// Closed registry of DIALS column element types and their fixed-width layouts.
use std::fmt;

/// Numeric interpretation of one component of a row.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Scalar {
    F64,
    I32,
    U64,
    Bool,
}

impl Scalar {
    pub const fn size(self) -> usize {
        match self {
            Scalar::F64 | Scalar::U64 => 8,
            Scalar::I32 => 4,
            Scalar::Bool => 1,
        }
    }

    /// numpy dtype string for one component.
    pub const fn numpy(self) -> &'static str {
        match self {
            Scalar::F64 => "<f8",
            Scalar::I32 => "<i4",
            Scalar::U64 => "<u8",
            Scalar::Bool => "?",
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Dtype {
    Double,
    Int,
    Bool,
    SizeT,
    Int6,
    Vec3Double,
    MillerIndex,
}

impl Dtype {
    pub const ALL: [Dtype; 7] = [
        Dtype::Double,
        Dtype::Int,
        Dtype::Bool,
        Dtype::SizeT,
        Dtype::Int6,
        Dtype::Vec3Double,
        Dtype::MillerIndex,
    ];

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|dtype| dtype.tag() == tag)
    }

    pub fn from_tag_bytes(tag: &[u8]) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|dtype| dtype.tag().as_bytes() == tag)
    }

    pub const fn tag(self) -> &'static str {
        match self {
            Dtype::Double => "double",
            Dtype::Int => "int",
            Dtype::Bool => "bool",
            Dtype::SizeT => "std::size_t",
            Dtype::Int6 => "int6",
            Dtype::Vec3Double => "vec3<double>",
            Dtype::MillerIndex => "cctbx::miller::index<>",
        }
    }

    pub const fn scalar(self) -> Scalar {
        match self {
            Dtype::Double | Dtype::Vec3Double => Scalar::F64,
            Dtype::Int | Dtype::Int6 | Dtype::MillerIndex => Scalar::I32,
            Dtype::Bool => Scalar::Bool,
            Dtype::SizeT => Scalar::U64,
        }
    }

    /// Components per row; 1 for scalar columns.
    pub const fn components(self) -> usize {
        match self {
            Dtype::Int6 => 6,
            Dtype::Vec3Double | Dtype::MillerIndex => 3,
            _ => 1,
        }
    }

    pub const fn is_vector(self) -> bool {
        self.components() > 1
    }

    pub const fn elem_size(self) -> usize {
        self.components() * self.scalar().size()
    }

    /// Array shape for `rows` rows: `[rows]` or `[rows, components]`.
    pub fn shape(self, rows: usize) -> Vec<usize> {
        if self.is_vector() {
            vec![rows, self.components()]
        } else {
            vec![rows]
        }
    }

    /// Byte length of `count` rows, or `None` on overflow.
    pub fn byte_len(self, count: u64) -> Option<u64> {
        count.checked_mul(self.elem_size() as u64)
    }
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}
