#![allow(dead_code, unused_imports)]

pub use tickdag_test_utils::builders;
pub use tickdag_test_utils::{
    TestWorld, init_tracing, record, record_exclusive, with_timeout,
};
