//! Tuple implementation helper.
//!
//! The tuple-facing traits (`ComponentSet`, `Query`) need one impl per tuple
//! arity. [`impl_for_tuples!`] invokes a given macro once per supported
//! arity, from one element up to twelve. Twelve is the largest tuple the
//! standard library implements `Copy` and friends for, and the view
//! machinery's column-pointer tuples rely on `Copy`.

/// Invokes `$m` with a type-parameter list for every supported tuple arity.
#[macro_export]
macro_rules! impl_for_tuples {
    ($m:ident) => {
        $m!(A);
        $m!(A, B);
        $m!(A, B, C);
        $m!(A, B, C, D);
        $m!(A, B, C, D, E);
        $m!(A, B, C, D, E, F);
        $m!(A, B, C, D, E, F, G);
        $m!(A, B, C, D, E, F, G, H);
        $m!(A, B, C, D, E, F, G, H, I);
        $m!(A, B, C, D, E, F, G, H, I, J);
        $m!(A, B, C, D, E, F, G, H, I, J, K);
        $m!(A, B, C, D, E, F, G, H, I, J, K, L);
    };
}

#[cfg(test)]
mod tests {
    /// Implemented for every tuple the helper expands over.
    trait Arity {
        const COUNT: usize;
    }

    macro_rules! arity_impl {
        ($($name:ident),*) => {
            impl<$($name),*> Arity for ($($name,)*) {
                const COUNT: usize = [$(stringify!($name)),*].len();
            }
        };
    }

    crate::impl_for_tuples!(arity_impl);

    #[test]
    fn expands_from_one_to_twelve() {
        // Then - both ends of the generated range exist
        assert_eq!(<(u8,)>::COUNT, 1);
        assert_eq!(<(u8, u16)>::COUNT, 2);
        assert_eq!(
            <(u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8, u8)>::COUNT,
            12
        );
    }

    #[test]
    fn heterogeneous_tuples_are_covered() {
        // Then - the impls are generic, not tied to one element type
        assert_eq!(<(u8, String, Vec<i32>)>::COUNT, 3);
    }
}
