use chrono::{TimeZone, Utc};
use domain::{DiscoveryStep, Frame, StepAction};

#[test]
fn frame_length_counts_characters() {
    let frame = Frame::at("ST,+0012.5kg", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap());
    assert_eq!(frame.char_len(), 12);
    assert_eq!(Frame::new("\u{00b0}C").char_len(), 2);
}

#[test]
fn discovery_step_serializes_action_in_snake_case() {
    let step = DiscoveryStep {
        step_number: 2,
        action: StepAction::AddWeight,
        expected_weight: Some(1.0),
        frames: vec!["  1.000".to_string()],
        captured_at: Utc::now(),
    };
    let json = serde_json::to_value(&step).unwrap();
    assert_eq!(json["action"], "add_weight");
    assert_eq!(json["step_number"], 2);
}
