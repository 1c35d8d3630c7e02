use today::output::{format_human, HumanOutput};

#[test]
fn format_human_includes_sections() {
    let mut human = HumanOutput::new("today show: 2024-01-03");
    human.push_summary("timeline", "2 items");
    human.push_summary("untimed", "1 item");
    human.push_detail("09:00-09:30 Standup");
    human.push_warning("event sink failed: disk full");
    human.push_next_step("today widget");

    let rendered = format_human(&human);
    assert!(rendered.starts_with("today show: 2024-01-03\n"));
    assert!(rendered.contains("\n  timeline  2 items\n  untimed   1 item\n"));
    assert!(rendered.contains("\n\n  09:00-09:30 Standup\n"));
    assert!(rendered.contains("\n\nwarning: event sink failed: disk full\n"));
    assert!(rendered.ends_with("next: today widget"));
}

#[test]
fn format_human_omits_empty_sections() {
    let human = HumanOutput::new("today init: already initialized");
    let rendered = format_human(&human);
    assert_eq!(rendered, "today init: already initialized");
}
