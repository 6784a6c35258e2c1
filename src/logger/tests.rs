use super::*;
use chrono::TimeZone;

fn at() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 5).unwrap() + chrono::TimeDelta::milliseconds(42) }

#[test]
fn test_line_layout() {
    let rendered = line("32", "INFO", at(), format_args!("armed after {} s", 3));
    assert_eq!(rendered, "\x1b[32m[INFO] [09:30:05.042]\x1b[0m armed after 3 s");
}

#[test]
fn test_levels_share_one_column() {
    let info = line("32", "INFO", at(), format_args!("x"));
    let error = line("31", "ERROR", at(), format_args!("x"));
    assert_eq!(info.find("[09:30"), error.find("[09:30"));
    assert_eq!(line("1;34", "CMD", at(), format_args!("x")), "\x1b[1;34m[CMD]  [09:30:05.042]\x1b[0m x");
}

#[test]
fn test_macros_render_message() {
    let rendered = crate::console_line!("36", "EVENT", "tick {}", 7);
    assert!(rendered.starts_with("\x1b[36m[EVENT]["));
    assert!(rendered.ends_with("\x1b[0m tick 7"));
}
