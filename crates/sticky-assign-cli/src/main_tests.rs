// crates/sticky-assign-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and the bucket preview.
// Purpose: Ensure variant arguments parse strictly and previews are stable.
// Dependencies: sticky-assign-cli main helpers
// ============================================================================

//! ## Overview
//! Validates `parse_variant` and `bucket_preview` without spawning the binary.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::Parser;
use sticky_assign_core::Variant;
use sticky_assign_core::stable_hash;

use super::BucketCommand;
use super::Cli;
use super::Commands;
use super::bucket_preview;
use super::parse_variant;

// ============================================================================
// SECTION: Tests
// ============================================================================

#[test]
fn parse_variant_accepts_key_and_weight() {
    assert_eq!(parse_variant("A=50").unwrap(), Variant::new("A", 50));
    assert_eq!(parse_variant(" control = 3 ").unwrap(), Variant::new("control", 3));
}

#[test]
fn parse_variant_splits_on_last_equals() {
    assert_eq!(parse_variant("a=b=7").unwrap(), Variant::new("a=b", 7));
}

#[test]
fn parse_variant_keeps_non_positive_weights() {
    assert_eq!(parse_variant("off=0").unwrap(), Variant::new("off", 0));
    assert_eq!(parse_variant("neg=-4").unwrap(), Variant::new("neg", -4));
}

#[test]
fn parse_variant_rejects_malformed_input() {
    for raw in ["A", "=5", "  =5", "A=", "A=five", "A=1.5"] {
        assert!(parse_variant(raw).is_err(), "accepted {raw}");
    }
}

#[test]
fn bucket_command_parses_repeated_variants() {
    let cli = Cli::try_parse_from([
        "sticky-assign",
        "bucket",
        "--experiment",
        "exp1",
        "--user",
        "u1",
        "--variant",
        "A=50",
        "--variant",
        "B=50",
    ])
    .unwrap();
    let Commands::Bucket(command) = cli.command else {
        panic!("expected bucket command");
    };
    assert_eq!(command.variants, vec![Variant::new("A", 50), Variant::new("B", 50)]);
}

#[test]
fn bucket_command_requires_a_variant() {
    let result =
        Cli::try_parse_from(["sticky-assign", "bucket", "--experiment", "exp1", "--user", "u1"]);
    assert!(result.is_err());
}

#[test]
fn bucket_preview_trims_and_hashes() {
    let command = BucketCommand {
        experiment: " exp1 ".to_string(),
        user: "u1".to_string(),
        variants: vec![Variant::new("A", 50), Variant::new("B", 50)],
    };
    let preview = bucket_preview(&command).unwrap();
    assert_eq!(preview.assignment.experiment_id.as_str(), "exp1");
    assert_eq!(preview.hash, stable_hash("exp1", "u1"));
    let expected = if stable_hash("exp1", "u1") % 100 < 50 { "A" } else { "B" };
    assert_eq!(preview.assignment.variant_key.as_str(), expected);
}

#[test]
fn bucket_preview_reports_empty_variant_space() {
    let command = BucketCommand {
        experiment: "exp1".to_string(),
        user: "u1".to_string(),
        variants: vec![Variant::new("A", 0)],
    };
    let err = bucket_preview(&command).err().unwrap();
    assert!(err.to_string().starts_with("bucketing failed"));
}
