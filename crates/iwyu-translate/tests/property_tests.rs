//! Property-based tests for the tokenizer and flag filter.
//!
//! Run with: cargo test -p iwyu-translate --test `property_tests`

use iwyu_translate::{filter_compiler_flags, filter_flags, join_command, tokenize, translate};
use iwyu_translate::{TranslateOptions, PCH_IN_CODE_FLAG};
use proptest::prelude::*;

// ============================================================================
// Arbitrary generators
// ============================================================================

fn arb_plain_token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./=+:-]{1,12}"
}

fn arb_spaced_token() -> impl Strategy<Value = String> {
    "[A-Za-z0-9_./=-]{1,6}( [A-Za-z0-9_./=-]{1,6}){1,3}"
}

fn arb_token() -> impl Strategy<Value = String> {
    prop_oneof![4 => arb_plain_token(), 1 => arb_spaced_token()]
}

fn arb_flag() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("-c".to_string()),
        Just("--".to_string()),
        Just("/Yc".to_string()),
        Just("/Yupch.h".to_string()),
        Just("-Fppch.pch".to_string()),
        Just("/FI".to_string()),
        Just("-FIforce.h".to_string()),
        Just("-include-pch".to_string()),
        Just("-o".to_string()),
        Just("/Foout.obj".to_string()),
        Just("-Wall".to_string()),
        Just("-DNAME=1".to_string()),
        Just("-I/usr/include".to_string()),
        Just("main.cpp".to_string()),
        arb_plain_token(),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #[test]
    fn prop_tokenize_join_round_trip(tokens in prop::collection::vec(arb_token(), 0..12)) {
        let joined = join_command(&tokens);
        prop_assert_eq!(tokenize(&joined), tokens);
    }

    #[test]
    fn prop_tokenize_never_panics(input in ".{0,80}") {
        let tokens = tokenize(&input);
        prop_assert!(tokens.iter().all(|t| !t.is_empty()));
    }

    #[test]
    fn prop_filter_is_idempotent(flags in prop::collection::vec(arb_flag(), 0..16)) {
        let once = filter_compiler_flags(flags);
        let twice = filter_compiler_flags(once.flags.clone());
        prop_assert_eq!(&twice.flags, &once.flags);
        prop_assert!(!twice.pch_in_use);
    }

    #[test]
    fn prop_driver_mode_output_is_stable(flags in prop::collection::vec(arb_flag(), 0..16)) {
        let mut tokens = vec!["clang-cl.exe".to_string()];
        tokens.extend(flags);
        let once = filter_flags(tokens);
        let twice = filter_compiler_flags(once.flags.clone());
        prop_assert_eq!(twice.flags, once.flags);
    }

    #[test]
    fn prop_pch_flag_emitted_at_most_once(flags in prop::collection::vec(arb_flag(), 0..16)) {
        let command = format!("cl {}", join_command(&flags));
        let args = translate(&command, &TranslateOptions::new("/proj"));
        let count = args.iter().filter(|a| *a == PCH_IN_CODE_FLAG).count();
        prop_assert!(count <= 1);
    }
}
