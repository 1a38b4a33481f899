/// Asserts that two floats differ by less than `$prec`.
#[macro_export]
macro_rules! assert_almost_eq {
    ($a:expr, $b:expr, $prec:expr $(,)?) => {
        if !$crate::numeric::almost_eq($a, $b, $prec) {
            panic!(
                "assertion failed: `abs(left - right) < {:e}`, (left: `{}`, right: `{}`)",
                $prec, $a, $b
            );
        }
    };
}
pub use assert_almost_eq;

/// Use this to define a unique type which will be used as a key to retrieve
/// an independent rng stream from a `RandomSource`.
#[macro_export]
macro_rules! define_rng {
    ($random_id:ident) => {
        #[derive(Copy, Clone, Debug)]
        pub struct $random_id;

        impl $crate::random::RngId for $random_id {
            type RngType = $crate::rand::rngs::StdRng;

            fn get_name() -> &'static str {
                stringify!($random_id)
            }
        }
    };
}
pub use define_rng;

/// Use this macro to define a unique report row type
#[macro_export]
macro_rules! define_report {
    ($name:ident, $file_name:expr) => {
        impl $crate::report::Report for $name {
            fn name() -> &'static str {
                $file_name
            }
        }
    };
}
pub use define_report;
