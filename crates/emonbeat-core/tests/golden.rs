use std::fs;
use std::path::Path;

use emonbeat_core::frame::FrameDecoder;
use emonbeat_core::{DecodeReport, decode_capture_file};

fn load_expected_report(dir: &str) -> DecodeReport {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let expected_path = root.join(dir).join("expected_report.json");

    let expected_json = fs::read_to_string(&expected_path).expect("read expected_report.json");
    serde_json::from_str(&expected_json).expect("parse expected report")
}

fn run_golden(dir: &str) {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let input = root.join(dir).join("input.txt");
    let expected = load_expected_report(dir);

    let mut actual = decode_capture_file(&input, &FrameDecoder::default()).expect("decode capture");
    actual.input.path = expected.input.path.clone();
    actual.tool.version = expected.tool.version.clone();

    let actual_value = serde_json::to_value(actual).expect("serialize actual");
    let expected_value = serde_json::to_value(expected).expect("serialize expected");

    assert_eq!(actual_value, expected_value, "golden mismatch in {dir}");
}

#[test]
fn golden_reference() {
    run_golden("tests/golden/reference");
}

#[test]
fn golden_mixed() {
    run_golden("tests/golden/mixed");
}

#[test]
fn golden_foreign_only() {
    run_golden("tests/golden/foreign_only");
}

#[test]
fn golden_mixed_has_wide_fields() {
    let report = load_expected_report("tests/golden/mixed");
    let reading = &report.readings[1];
    assert_eq!(reading.power1, 10_000);
    assert_eq!(reading.power3, u16::MAX);
    assert_eq!(report.errors[0].line, 5);
}

#[test]
fn foreign_node_capture_decodes_with_matching_node() {
    let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("..");
    let input = root.join("tests/golden/foreign_only/input.txt");
    let report = decode_capture_file(&input, &FrameDecoder::new(7)).expect("decode capture");
    assert_eq!(report.summary.readings, 1);
    assert_eq!(report.readings[0].node, 7);
}
