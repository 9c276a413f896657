use crate::error::SymdiffError;

/// Shape of a value
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Shape(Box<[usize]>);

impl Shape {
    /// Get shape's rank
    #[must_use]
    pub const fn rank(&self) -> usize {
        self.0.len()
    }

    /// Get number of elements in value with this shape
    /// (a product of it's dimensions).
    #[must_use]
    pub fn numel(&self) -> usize {
        self.0.iter().product()
    }

    /// Iter
    pub fn iter(&self) -> impl Iterator<Item = &usize> {
        self.into_iter()
    }

    /// Dimensions as slice
    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Broadcast self with other.
    ///
    /// Shapes are right aligned and the shorter one is padded with ones.
    /// Each pair of dimensions must be equal, or one of them must be 1.
    pub fn broadcast(&self, other: &Shape) -> Result<Shape, SymdiffError> {
        let rank = self.rank().max(other.rank());
        let mut dims = Vec::with_capacity(rank);
        for i in 0..rank {
            let x = padded_dim(self, rank, i);
            let y = padded_dim(other, rank, i);
            dims.push(match (x, y) {
                (x, y) if x == y => x,
                (1, y) => y,
                (x, 1) => x,
                _ => {
                    return Err(SymdiffError::shape_error(format!(
                        "shapes {self} and {other} can not be broadcasted, dimension {i} is {x} vs {y}"
                    )))
                }
            });
        }
        Ok(Shape(dims.into()))
    }

    /// Shape after summing over the leading axis.
    ///
    /// Rank 1 shapes collapse into `(1,)`, scalars can not be reduced.
    pub fn reduce_axis_zero(&self) -> Result<Shape, SymdiffError> {
        match self.rank() {
            0 => Err(SymdiffError::shape_error(
                "can not sum over axis 0 of a rank 0 value",
            )),
            1 => Ok(Shape::from(1)),
            _ => Ok(Shape(self.0[1..].into())),
        }
    }

    /// Shape of `op(self) @ op(other)`, where op optionally transposes its operand.
    pub fn matmul(
        &self,
        other: &Shape,
        transpose_a: bool,
        transpose_b: bool,
    ) -> Result<Shape, SymdiffError> {
        if self.rank() != 2 || other.rank() != 2 {
            return Err(SymdiffError::shape_error(format!(
                "matrix multiply requires rank 2 operands, got {self} and {other}"
            )));
        }
        let (m, k) = if transpose_a {
            (self.0[1], self.0[0])
        } else {
            (self.0[0], self.0[1])
        };
        let (k2, n) = if transpose_b {
            (other.0[1], other.0[0])
        } else {
            (other.0[0], other.0[1])
        };
        if k != k2 {
            return Err(SymdiffError::shape_error(format!(
                "matrix multiply inner dimensions differ, {self} (transposed: {transpose_a}) and {other} (transposed: {transpose_b})"
            )));
        }
        Ok(Shape([m, n].into()))
    }
}

fn padded_dim(shape: &Shape, rank: usize, i: usize) -> usize {
    let pad = rank - shape.rank();
    if i < pad {
        1
    } else {
        shape.0[i - pad]
    }
}

impl core::fmt::Display for Shape {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            f.write_fmt(format_args!("{d}"))?;
        }
        if self.rank() == 1 {
            f.write_str(",")?;
        }
        f.write_str(")")
    }
}

impl core::ops::Index<usize> for Shape {
    type Output = usize;
    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

impl From<Vec<usize>> for Shape {
    fn from(value: Vec<usize>) -> Self {
        Shape(value.into())
    }
}

impl From<&[usize]> for Shape {
    fn from(value: &[usize]) -> Self {
        Shape(value.into())
    }
}

impl From<usize> for Shape {
    fn from(value: usize) -> Self {
        Shape(Box::new([value]))
    }
}

impl<const N: usize> From<[usize; N]> for Shape {
    fn from(value: [usize; N]) -> Self {
        Shape(value.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a Shape {
    type IntoIter = <&'a [usize] as IntoIterator>::IntoIter;
    type Item = &'a usize;
    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
