use crate::consts::BYTES_PER_LENGTH_OFFSET;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Size {
    Fixed { size: usize },
    Variable { minimum_size: usize },
}

impl Size {
    /// Size of the object in the fixed part of its parent.
    ///
    /// Variable-size objects are represented by offsets in the fixed part.
    #[inline]
    #[must_use]
    pub const fn fixed_part(self) -> usize {
        match self {
            Self::Fixed { size } => size,
            Self::Variable { .. } => BYTES_PER_LENGTH_OFFSET,
        }
    }

    /// Exact size of a fixed-size object.
    ///
    /// # Panics
    ///
    /// Panics if `self` is [`Size::Variable`].
    #[inline]
    #[must_use]
    pub const fn get(self) -> usize {
        match self {
            Self::Fixed { size } => size,
            Self::Variable { .. } => panic!("size of a variable-size object is not known statically"),
        }
    }

    #[must_use]
    pub const fn for_container<const N: usize>(field_sizes: [Self; N]) -> Self {
        let mut all_fixed = true;
        let mut size = 0;
        let mut index = 0;

        // `for` loops are not allowed in `const fn`s as of Rust 1.87.0.
        while index < N {
            match field_sizes[index] {
                Self::Fixed { size: field_size } => size += field_size,
                Self::Variable { minimum_size } => {
                    all_fixed = false;
                    size += BYTES_PER_LENGTH_OFFSET + minimum_size;
                }
            }

            index += 1;
        }

        if all_fixed {
            Self::Fixed { size }
        } else {
            Self::Variable { minimum_size: size }
        }
    }

    #[must_use]
    pub const fn for_vector(element_size: Self, length: usize) -> Self {
        match element_size {
            Self::Fixed { size } => Self::Fixed {
                size: size * length,
            },
            Self::Variable { minimum_size } => Self::Variable {
                minimum_size: (BYTES_PER_LENGTH_OFFSET + minimum_size) * length,
            },
        }
    }

    /// Size of an untagged union of `N` objects.
    ///
    /// The variants cannot be told apart by size alone, so the union is variable-size with the
    /// smallest variant as its minimum.
    #[must_use]
    pub const fn for_untagged_union<const N: usize>(variant_sizes: [Self; N]) -> Self {
        assert!(N > 0);

        let mut minimum_size = usize::MAX;
        let mut index = 0;

        // `for` loops are not allowed in `const fn`s as of Rust 1.87.0.
        while index < N {
            let variant_minimum = match variant_sizes[index] {
                Self::Fixed { size } => size,
                Self::Variable { minimum_size: minimum } => minimum,
            };

            if variant_minimum < minimum_size {
                minimum_size = variant_minimum;
            }

            index += 1;
        }

        Self::Variable { minimum_size }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_of_fixed_fields_is_fixed() {
        let actual = Size::for_container([Size::Fixed { size: 8 }, Size::Fixed { size: 32 }]);
        assert_eq!(actual, Size::Fixed { size: 40 });
    }

    #[test]
    fn container_with_variable_field_counts_offsets_toward_minimum() {
        let actual = Size::for_container([
            Size::Fixed { size: 8 },
            Size::Variable { minimum_size: 1 },
            Size::Variable { minimum_size: 0 },
        ]);

        assert_eq!(actual, Size::Variable { minimum_size: 17 });
    }

    #[test]
    fn vector_of_variable_elements_reserves_an_offset_per_element() {
        let element = Size::Variable { minimum_size: 3 };
        assert_eq!(
            Size::for_vector(element, 5),
            Size::Variable { minimum_size: 35 },
        );
    }

    #[test]
    fn untagged_union_takes_minimum_over_variants() {
        let actual = Size::for_untagged_union([
            Size::Fixed { size: 40 },
            Size::Variable { minimum_size: 24 },
        ]);

        assert_eq!(actual, Size::Variable { minimum_size: 24 });
    }
}
